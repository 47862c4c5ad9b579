use iced::widget::{button, column, container, row, scrollable, text};
use iced::{Element, Length, Padding};

use crate::components::{chip_style, hidden_vertical_scrollbar_style};
use crate::media::{
    ListingKind, ListingQuery, LoadingState, Message, Taxonomy, TEXT_GRAY, TEXT_WHITE, TYPE_LISTS,
};
use crate::router::Route;
use crate::Phimx;

const CARDS_PER_ROW: usize = 6;

fn taxonomy_name(items: &[Taxonomy], slug: &str) -> String {
    items
        .iter()
        .find(|t| t.slug == slug)
        .map_or_else(|| slug.to_string(), |t| t.name.clone())
}

impl Phimx {
    fn listing_heading(&self, query: &ListingQuery) -> String {
        match query.kind {
            ListingKind::Latest => String::from("Recently updated"),
            ListingKind::Category => taxonomy_name(&self.categories, &query.key),
            ListingKind::Country => taxonomy_name(&self.countries, &query.key),
            ListingKind::Year => format!("Released in {}", query.key),
            ListingKind::Type => TYPE_LISTS
                .iter()
                .find(|(slug, _)| *slug == query.key)
                .map_or_else(|| query.key.clone(), |(_, label)| label.to_string()),
        }
    }

    pub fn view_listing<'a>(&'a self, query: &'a ListingQuery) -> Element<'a, Message> {
        let heading = self.listing_heading(query);
        let pager = self.view_pager(query.page, |page| {
            Route::Listing(query.with_page(page))
        });
        self.view_browse_page(heading, pager)
    }

    pub fn view_search<'a>(&'a self, keyword: &'a str, page: u32) -> Element<'a, Message> {
        if keyword.trim().is_empty() {
            return container(text("Type a title to search").size(18).color(TEXT_GRAY))
                .width(Length::Fill)
                .padding(64)
                .center_x(Length::Fill)
                .into();
        }
        let heading = format!("Results for \"{}\"", keyword);
        let pager = self.view_pager(page, |page| Route::Search {
            keyword: keyword.to_string(),
            page,
        });
        self.view_browse_page(heading, pager)
    }

    fn view_browse_page<'a>(
        &'a self,
        heading: String,
        pager: Element<'a, Message>,
    ) -> Element<'a, Message> {
        let body: Element<'a, Message> = match &self.listing_state {
            LoadingState::Loading => self.view_skeleton_grid(),
            LoadingState::Error(error) => self.view_error_state(error, None),
            LoadingState::Idle if self.listing.items.is_empty() => {
                text("No titles found").size(16).color(TEXT_GRAY).into()
            }
            LoadingState::Idle => {
                let cards = self
                    .listing
                    .items
                    .iter()
                    .map(|item| self.view_title_card(item))
                    .collect();
                self.view_card_grid(cards, CARDS_PER_ROW)
            }
        };

        let content = column![
            text(heading)
                .size(26)
                .color(TEXT_WHITE)
                .shaping(text::Shaping::Advanced)
                .font(iced::Font {
                    weight: iced::font::Weight::Bold,
                    ..Default::default()
                }),
            body,
            pager,
        ]
        .spacing(24)
        .padding(Padding::new(32.0).left(48.0).right(48.0))
        .width(Length::Fill);

        scrollable(content)
            .direction(scrollable::Direction::Vertical(
                scrollable::Scrollbar::new().width(0).scroller_width(0),
            ))
            .width(Length::Fill)
            .height(Length::Fill)
            .style(hidden_vertical_scrollbar_style)
            .into()
    }

    fn view_pager<'a>(
        &'a self,
        page: u32,
        route_for: impl Fn(u32) -> Route,
    ) -> Element<'a, Message> {
        if self.listing_state != LoadingState::Idle || self.listing.items.is_empty() {
            return row![].into();
        }
        let total = self.listing.total_pages.max(page);

        let previous = button(text("Previous").size(14))
            .padding(Padding::new(8.0).left(16.0).right(16.0))
            .style(chip_style(false))
            .on_press_maybe((page > 1).then(|| Message::Navigate(route_for(page - 1))));
        let next = button(text("Next").size(14))
            .padding(Padding::new(8.0).left(16.0).right(16.0))
            .style(chip_style(false))
            .on_press_maybe((page < total).then(|| Message::Navigate(route_for(page + 1))));

        row![
            previous,
            text(format!("Page {} / {}", page, total)).size(14).color(TEXT_GRAY),
            next
        ]
        .spacing(16)
        .align_y(iced::Alignment::Center)
        .into()
    }
}
