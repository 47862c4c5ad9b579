use iced::widget::image::Handle;
use iced::widget::{
    button, column, container, pick_list, row, scrollable, text, text_input, Column, Row, Space,
};
use iced::{Border, Color, Element, Length, Padding, Shadow};

use crate::catalog::image_url;
use crate::media::{
    ListingKind, Message, Taxonomy, TitleSummary, ACCENT_ORANGE, ERROR_RED, FIRST_LISTED_YEAR,
    SURFACE_DARK_GRAY, TEXT_GRAY, TEXT_WHITE, TYPE_LISTS,
};
use crate::router::Route;
use crate::Phimx;

pub const ICON_ARROW_LEFT: char = '\u{F12F}';
pub const ICON_ARROW_RIGHT: char = '\u{F138}';
pub const ICON_CLOCK_HISTORY: char = '\u{F292}';
pub const ICON_FILM: char = '\u{F3C3}';
pub const ICON_PLAY_FILL: char = '\u{F4F4}';
pub const ICON_SEARCH: char = '\u{F52A}';
pub const ICON_TRASH: char = '\u{F5DE}';
pub const ICON_X_LG: char = '\u{F659}';

pub const CARD_WIDTH: f32 = 160.0;
pub const CARD_HEIGHT: f32 = 240.0;

pub fn icon(icon_char: char) -> iced::widget::Text<'static> {
    text(icon_char.to_string()).font(iced::Font {
        family: iced::font::Family::Name("bootstrap-icons"),
        ..Default::default()
    })
}

pub fn hidden_vertical_scrollbar_style(
    _theme: &iced::Theme,
    _status: scrollable::Status,
) -> scrollable::Style {
    let rail = || scrollable::Rail {
        background: None,
        border: Border::default(),
        scroller: scrollable::Scroller {
            background: iced::Background::Color(Color::TRANSPARENT),
            border: Border::default(),
        },
    };
    scrollable::Style {
        container: container::Style::default(),
        vertical_rail: rail(),
        horizontal_rail: rail(),
        gap: None,
        auto_scroll: scrollable::AutoScroll {
            background: iced::Background::Color(Color::TRANSPARENT),
            border: Border::default(),
            shadow: Shadow::default(),
            icon: Color::TRANSPARENT,
        },
    }
}

/// Rounded button used for tabs, episode chips and pagination.
pub fn chip_style(is_active: bool) -> impl Fn(&iced::Theme, button::Status) -> button::Style {
    move |_theme, status| {
        let background = match status {
            _ if is_active => ACCENT_ORANGE,
            button::Status::Hovered => Color::from_rgba(1.0, 1.0, 1.0, 0.2),
            button::Status::Disabled => Color::from_rgba(1.0, 1.0, 1.0, 0.03),
            _ => Color::from_rgba(1.0, 1.0, 1.0, 0.1),
        };
        let text_color = match status {
            button::Status::Disabled => TEXT_GRAY,
            _ => TEXT_WHITE,
        };
        button::Style {
            background: Some(iced::Background::Color(background)),
            text_color,
            border: Border {
                color: Color::from_rgba(1.0, 1.0, 1.0, 0.2),
                width: if is_active { 0.0 } else { 1.0 },
                radius: 4.0.into(),
            },
            shadow: Shadow::default(),
            snap: false,
        }
    }
}

pub fn ghost_button_style(_theme: &iced::Theme, status: button::Status) -> button::Style {
    let text_color = match status {
        button::Status::Hovered => TEXT_WHITE,
        button::Status::Disabled => Color::from_rgba(1.0, 1.0, 1.0, 0.25),
        _ => TEXT_GRAY,
    };
    button::Style {
        background: Some(iced::Background::Color(Color::TRANSPARENT)),
        text_color,
        border: Border::default(),
        shadow: Shadow::default(),
        snap: false,
    }
}

fn pick_list_style(_theme: &iced::Theme, _status: pick_list::Status) -> pick_list::Style {
    pick_list::Style {
        text_color: TEXT_WHITE,
        placeholder_color: TEXT_GRAY,
        handle_color: TEXT_WHITE,
        background: iced::Background::Color(Color::from_rgba(1.0, 1.0, 1.0, 0.1)),
        border: Border {
            color: Color::from_rgba(1.0, 1.0, 1.0, 0.2),
            width: 1.0,
            radius: 4.0.into(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypeOption {
    slug: &'static str,
    label: &'static str,
}

impl std::fmt::Display for TypeOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label)
    }
}

impl Phimx {
    /// Handle for an already-loaded poster or thumbnail.
    pub fn cached_image(&self, path: &str) -> Option<&Handle> {
        self.image_cache
            .get(&image_url(&self.settings.image_base_url, path))
    }

    /// Key of the listing currently shown, when it is of `kind`.
    fn active_listing_key(&self, kind: ListingKind) -> Option<&str> {
        match self.router.current() {
            Route::Listing(query) if query.kind == kind => Some(query.key.as_str()),
            _ => None,
        }
    }

    pub fn view_header(&self) -> Element<'_, Message> {
        let logo = button(
            text("Phimx")
                .size(26)
                .color(ACCENT_ORANGE)
                .font(iced::Font {
                    weight: iced::font::Weight::Bold,
                    ..Default::default()
                }),
        )
        .padding(0)
        .style(ghost_button_style)
        .on_press(Message::Navigate(Route::default()));

        let back = button(icon(ICON_ARROW_LEFT).size(18))
            .padding(6)
            .style(ghost_button_style)
            .on_press_maybe(self.router.can_go_back().then_some(Message::Back));
        let forward = button(icon(ICON_ARROW_RIGHT).size(18))
            .padding(6)
            .style(ghost_button_style)
            .on_press_maybe(self.router.can_go_forward().then_some(Message::Forward));

        let history_link = button(
            row![icon(ICON_CLOCK_HISTORY).size(14), text("History").size(14)]
                .spacing(6)
                .align_y(iced::Alignment::Center),
        )
        .padding(Padding::new(8.0).left(12.0).right(12.0))
        .style(ghost_button_style)
        .on_press(Message::Navigate(Route::History));

        let left_section = row![row![back, forward].spacing(4), logo, self.view_filters()]
            .spacing(24)
            .align_y(iced::Alignment::Center);

        let right_section = row![self.view_search_bar(), history_link]
            .spacing(16)
            .align_y(iced::Alignment::Center);

        let header_row = row![left_section, Space::new().width(Length::Fill), right_section]
            .padding(Padding::new(16.0).left(32.0).right(32.0))
            .align_y(iced::Alignment::Center);

        let mut header = column![header_row].width(Length::Fill);
        if let Some(status) = &self.status_message {
            header = header.push(
                container(text(status).size(13).color(TEXT_WHITE))
                    .width(Length::Fill)
                    .padding(Padding::new(6.0).left(32.0))
                    .style(|_theme| container::Style {
                        background: Some(iced::Background::Color(ERROR_RED)),
                        ..Default::default()
                    }),
            );
        }

        container(header)
            .width(Length::Fill)
            .style(|_theme| container::Style {
                background: Some(iced::Background::Color(SURFACE_DARK_GRAY)),
                ..Default::default()
            })
            .into()
    }

    fn view_filters(&self) -> Element<'_, Message> {
        let selected_taxonomy = |items: &[Taxonomy], kind| {
            self.active_listing_key(kind)
                .and_then(|key| items.iter().find(|t| t.slug == key).cloned())
        };

        let categories = pick_list(
            self.categories.as_slice(),
            selected_taxonomy(&self.categories, ListingKind::Category),
            Message::PickCategory,
        )
        .placeholder("Genre")
        .text_size(13)
        .padding(Padding::new(6.0).left(10.0).right(10.0))
        .style(pick_list_style);

        let countries = pick_list(
            self.countries.as_slice(),
            selected_taxonomy(&self.countries, ListingKind::Country),
            Message::PickCountry,
        )
        .placeholder("Country")
        .text_size(13)
        .padding(Padding::new(6.0).left(10.0).right(10.0))
        .style(pick_list_style);

        let current_year = chrono::Datelike::year(&chrono::Utc::now());
        let years: Vec<i32> = (FIRST_LISTED_YEAR..=current_year).rev().collect();
        let selected_year = self
            .active_listing_key(ListingKind::Year)
            .and_then(|key| key.parse::<i32>().ok());
        let years = pick_list(years, selected_year, Message::PickYear)
            .placeholder("Year")
            .text_size(13)
            .padding(Padding::new(6.0).left(10.0).right(10.0))
            .style(pick_list_style);

        let types: Vec<TypeOption> = TYPE_LISTS
            .iter()
            .map(|&(slug, label)| TypeOption { slug, label })
            .collect();
        let selected_type = self
            .active_listing_key(ListingKind::Type)
            .and_then(|key| types.iter().copied().find(|t| t.slug == key));
        let types = pick_list(types, selected_type, |option: TypeOption| {
            Message::PickType(option.slug.to_string())
        })
        .placeholder("Type")
        .text_size(13)
        .padding(Padding::new(6.0).left(10.0).right(10.0))
        .style(pick_list_style);

        row![types, categories, countries, years]
            .spacing(8)
            .align_y(iced::Alignment::Center)
            .into()
    }

    fn view_search_bar(&self) -> Element<'_, Message> {
        let search_icon = icon(ICON_SEARCH).size(14).color(TEXT_GRAY);

        let search_input = text_input("Search titles...", &self.search_query)
            .on_input(Message::SearchQueryChanged)
            .on_submit(Message::SearchSubmit)
            .padding(8)
            .width(Length::Fixed(200.0))
            .style(|_theme, _status| text_input::Style {
                background: iced::Background::Color(Color::TRANSPARENT),
                border: Border::default(),
                icon: TEXT_GRAY,
                placeholder: TEXT_GRAY,
                value: TEXT_WHITE,
                selection: ACCENT_ORANGE,
            });

        container(
            row![search_icon, search_input]
                .spacing(8)
                .align_y(iced::Alignment::Center),
        )
        .padding(Padding::new(4.0).left(12.0).right(8.0))
        .style(|_theme| container::Style {
            background: Some(iced::Background::Color(Color::from_rgba(0.0, 0.0, 0.0, 0.7))),
            border: Border {
                color: TEXT_GRAY,
                width: 1.0,
                radius: 24.0.into(),
            },
            ..Default::default()
        })
        .into()
    }

    pub fn view_poster(&self, path: Option<&str>, width: f32, height: f32) -> Element<'_, Message> {
        match path.and_then(|p| self.cached_image(p)) {
            Some(handle) => iced::widget::image(handle.clone())
                .width(Length::Fixed(width))
                .height(Length::Fixed(height))
                .content_fit(iced::ContentFit::Cover)
                .into(),
            None => container(icon(ICON_FILM).size(40).color(TEXT_GRAY))
                .width(Length::Fixed(width))
                .height(Length::Fixed(height))
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .style(|_theme| container::Style {
                    background: Some(iced::Background::Color(SURFACE_DARK_GRAY)),
                    ..Default::default()
                })
                .into(),
        }
    }

    pub fn view_title_card<'a>(&'a self, item: &'a TitleSummary) -> Element<'a, Message> {
        let poster = self.view_poster(
            item.thumb_url.as_deref().or(item.poster_url.as_deref()),
            CARD_WIDTH,
            CARD_HEIGHT,
        );

        let mut badges = Row::new().spacing(4);
        for badge in [&item.quality, &item.language] {
            if badge.is_empty() {
                continue;
            }
            badges = badges.push(
                container(text(badge.as_str()).size(10).color(TEXT_WHITE))
                    .padding(Padding::new(2.0).left(6.0).right(6.0))
                    .style(|_theme| container::Style {
                        background: Some(iced::Background::Color(ACCENT_ORANGE)),
                        border: Border {
                            radius: 3.0.into(),
                            ..Default::default()
                        },
                        ..Default::default()
                    }),
            );
        }

        let subtitle = match item.year {
            Some(year) if !item.episode_current.is_empty() => {
                format!("{} · {}", year, item.episode_current)
            }
            Some(year) => year.to_string(),
            None => item.episode_current.clone(),
        };

        let card = column![
            poster,
            badges,
            text(item.name.as_str())
                .size(14)
                .color(TEXT_WHITE)
                .shaping(text::Shaping::Advanced),
            text(subtitle)
                .size(12)
                .color(TEXT_GRAY)
                .shaping(text::Shaping::Advanced),
        ]
        .spacing(6)
        .width(Length::Fixed(CARD_WIDTH));

        button(card)
            .padding(0)
            .style(|_theme, status| button::Style {
                background: Some(iced::Background::Color(Color::TRANSPARENT)),
                text_color: TEXT_WHITE,
                border: Border::default(),
                shadow: match status {
                    button::Status::Hovered => Shadow {
                        color: Color::from_rgba(0.96, 0.55, 0.11, 0.4),
                        offset: iced::Vector::new(0.0, 4.0),
                        blur_radius: 12.0,
                    },
                    _ => Shadow::default(),
                },
                snap: false,
            })
            .on_press(Message::Navigate(Route::Title(
                crate::locator::PlaybackLocator::new(item.id.clone()),
            )))
            .into()
    }

    /// Wraps cards into rows of `per_row`.
    pub fn view_card_grid<'a>(
        &'a self,
        cards: Vec<Element<'a, Message>>,
        per_row: usize,
    ) -> Element<'a, Message> {
        let mut rows = Column::new().spacing(24);
        let mut current = Row::new().spacing(16);
        let mut in_row = 0;
        for card in cards {
            current = current.push(card);
            in_row += 1;
            if in_row == per_row {
                rows = rows.push(current);
                current = Row::new().spacing(16);
                in_row = 0;
            }
        }
        if in_row > 0 {
            rows = rows.push(current);
        }
        rows.into()
    }

    pub fn view_skeleton_grid(&self) -> Element<'_, Message> {
        let cards = (0..12)
            .map(|_| {
                container(Space::new().width(CARD_WIDTH).height(CARD_HEIGHT))
                    .style(|_theme| container::Style {
                        background: Some(iced::Background::Color(Color::from_rgba(
                            0.2, 0.2, 0.2, 0.5,
                        ))),
                        border: Border {
                            radius: 8.0.into(),
                            ..Default::default()
                        },
                        ..Default::default()
                    })
                    .into()
            })
            .collect();
        self.view_card_grid(cards, 6)
    }

    pub fn view_error_state<'a>(
        &'a self,
        error_message: &'a str,
        retry: Option<Message>,
    ) -> Element<'a, Message> {
        let mut content = column![text(error_message).size(18).color(ERROR_RED)]
            .spacing(16)
            .align_x(iced::Alignment::Center);

        if let Some(retry) = retry {
            content = content.push(
                button(text("Retry").size(16).color(TEXT_WHITE))
                    .padding(Padding::new(12.0).left(24.0).right(24.0))
                    .style(chip_style(true))
                    .on_press(retry),
            );
        }

        container(content)
            .width(Length::Fill)
            .padding(64)
            .center_x(Length::Fill)
            .into()
    }
}
