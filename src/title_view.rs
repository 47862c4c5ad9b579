use iced::widget::{button, column, container, row, scrollable, text, Column, Row, Space};
use iced::{Color, Element, Length, Padding};

use crate::components::{
    chip_style, hidden_vertical_scrollbar_style, icon, ICON_CLOCK_HISTORY, ICON_PLAY_FILL,
};
use crate::history::HistoryEntry;
use crate::media::{
    strip_markup, truncate_description, Message, TitleDetail, ACCENT_ORANGE, SURFACE_DARK_GRAY,
    TEXT_GRAY, TEXT_WHITE,
};
use crate::page::{PageState, TitlePage};
use crate::player_handlers::MAIN_SCROLL_ID;
use crate::player_view::format_time;
use crate::Phimx;

const EPISODES_PER_ROW: usize = 10;
const BANNER_HEIGHT: f32 = 420.0;

impl Phimx {
    pub fn view_title_page(&self) -> Element<'_, Message> {
        let Some(page) = self.title_page.as_ref() else {
            return self.view_skeleton_grid();
        };

        let body: Element<'_, Message> = match (page.state(), page.detail()) {
            (PageState::Loading, _) => container(text("Loading...").size(20).color(TEXT_GRAY))
                .width(Length::Fill)
                .padding(64)
                .center_x(Length::Fill)
                .into(),
            (PageState::Failed(error), _) => {
                self.view_error_state(error, Some(Message::RetryTitle))
            }
            (PageState::Ready(_), Some(detail)) => self.view_title_ready(page, detail),
            (PageState::Ready(_), None) => Space::new().into(),
        };

        scrollable(body)
            .id(iced::widget::Id::new(MAIN_SCROLL_ID))
            .direction(scrollable::Direction::Vertical(
                scrollable::Scrollbar::new().width(0).scroller_width(0),
            ))
            .width(Length::Fill)
            .height(Length::Fill)
            .style(hidden_vertical_scrollbar_style)
            .into()
    }

    /// Most recent snapshot entry for the page's title.
    fn last_watched(&self, title_id: &str) -> Option<&HistoryEntry> {
        self.history_entries.iter().find(|e| e.title_id == title_id)
    }

    fn view_title_ready<'a>(
        &'a self,
        page: &'a TitlePage,
        detail: &'a TitleDetail,
    ) -> Element<'a, Message> {
        let top = match self.session.target() {
            Some(target) if page.is_playing() => self.view_player(target),
            _ => self.view_banner(page, detail),
        };

        column![
            top,
            self.view_title_info(detail),
            self.view_server_tabs(page),
            self.view_episode_grid(page, detail),
        ]
        .spacing(24)
        .padding(Padding::new(0.0).bottom(48.0))
        .width(Length::Fill)
        .into()
    }

    fn view_banner<'a>(&'a self, page: &'a TitlePage, detail: &'a TitleDetail) -> Element<'a, Message> {
        let title = &detail.title;
        let backdrop: Element<'a, Message> = match title
            .thumb_url
            .as_deref()
            .or(title.poster_url.as_deref())
            .and_then(|path| self.cached_image(path))
        {
            Some(handle) => iced::widget::image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fixed(BANNER_HEIGHT))
                .content_fit(iced::ContentFit::Cover)
                .into(),
            None => container(Space::new())
                .width(Length::Fill)
                .height(Length::Fixed(BANNER_HEIGHT))
                .style(|_theme| container::Style {
                    background: Some(iced::Background::Color(SURFACE_DARK_GRAY)),
                    ..Default::default()
                })
                .into(),
        };

        let server_index = page.active_server();
        let can_watch = page
            .servers()
            .get(server_index)
            .is_some_and(|s| !s.episodes.is_empty());

        let watch_button = button(
            row![icon(ICON_PLAY_FILL).size(16), text("Watch").size(16)]
                .spacing(8)
                .align_y(iced::Alignment::Center),
        )
        .padding(Padding::new(12.0).left(24.0).right(24.0))
        .style(chip_style(true))
        .on_press_maybe(can_watch.then_some(Message::SelectEpisode(server_index, 0)));

        let mut buttons = Row::new()
            .push(watch_button)
            .spacing(12)
            .align_y(iced::Alignment::Center);

        if let Some(entry) = self.last_watched(&title.id) {
            let label = if entry.position_seconds > 0.0 {
                format!(
                    "Continue {} at {}",
                    entry.episode_label,
                    format_time(entry.position_seconds)
                )
            } else {
                format!("Continue {}", entry.episode_label)
            };
            buttons = buttons.push(
                button(
                    row![icon(ICON_CLOCK_HISTORY).size(16), text(label).size(16)]
                        .spacing(8)
                        .align_y(iced::Alignment::Center),
                )
                .padding(Padding::new(12.0).left(24.0).right(24.0))
                .style(chip_style(false))
                .on_press(Message::ContinueWatching(entry.locator())),
            );
        }

        let overlay = container(
            column![
                text(title.name.as_str())
                    .size(40)
                    .color(TEXT_WHITE)
                    .shaping(text::Shaping::Advanced)
                    .font(iced::Font {
                        weight: iced::font::Weight::Bold,
                        ..Default::default()
                    }),
                text(title.origin_name.as_str())
                    .size(16)
                    .color(TEXT_GRAY)
                    .shaping(text::Shaping::Advanced),
                buttons,
            ]
            .spacing(16)
            .max_width(640.0)
            .padding(Padding::new(48.0)),
        )
        .width(Length::Fill)
        .height(Length::Fixed(BANNER_HEIGHT))
        .align_y(iced::alignment::Vertical::Bottom)
        .style(|_theme| container::Style {
            background: Some(iced::Background::Gradient(iced::Gradient::Linear(
                iced::gradient::Linear::new(0.0)
                    .add_stop(0.0, Color::from_rgba(0.0, 0.0, 0.0, 0.95))
                    .add_stop(0.5, Color::from_rgba(0.0, 0.0, 0.0, 0.6))
                    .add_stop(1.0, Color::from_rgba(0.0, 0.0, 0.0, 0.1)),
            ))),
            ..Default::default()
        });

        iced::widget::stack![backdrop, overlay]
            .width(Length::Fill)
            .height(Length::Fixed(BANNER_HEIGHT))
            .into()
    }

    fn view_title_info<'a>(&'a self, detail: &'a TitleDetail) -> Element<'a, Message> {
        let title = &detail.title;

        let meta: Vec<String> = [
            title.year.map(|y| y.to_string()),
            Some(title.quality.clone()),
            Some(title.language.clone()),
            Some(title.runtime.clone()),
            Some(title.episode_current.clone()),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

        let join_names = |items: &[crate::media::Taxonomy]| {
            items
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut facts = Column::new().spacing(6);
        for (label, value) in [
            ("Genres", join_names(&title.categories)),
            ("Countries", join_names(&title.countries)),
            ("Cast", title.cast.join(", ")),
        ] {
            if value.is_empty() {
                continue;
            }
            facts = facts.push(
                row![
                    text(label).size(13).color(TEXT_GRAY).width(Length::Fixed(90.0)),
                    text(value)
                        .size(13)
                        .color(TEXT_WHITE)
                        .shaping(text::Shaping::Advanced),
                ]
                .spacing(8),
            );
        }

        column![
            text(meta.join("  ·  "))
                .size(14)
                .color(ACCENT_ORANGE)
                .shaping(text::Shaping::Advanced),
            text(truncate_description(&strip_markup(&title.synopsis), 600))
                .size(15)
                .color(TEXT_WHITE)
                .shaping(text::Shaping::Advanced),
            facts,
        ]
        .spacing(12)
        .padding(Padding::new(0.0).left(48.0).right(48.0))
        .into()
    }

    fn view_server_tabs<'a>(&'a self, page: &'a TitlePage) -> Element<'a, Message> {
        let active = page.active_server();
        let tabs = page.servers().iter().enumerate().map(|(index, server)| {
            button(
                text(server.name.as_str())
                    .size(14)
                    .shaping(text::Shaping::Advanced),
            )
            .padding(Padding::new(8.0).left(16.0).right(16.0))
            .style(chip_style(index == active))
            .on_press(Message::SelectServer(index))
            .into()
        });

        Row::with_children(tabs)
            .spacing(8)
            .padding(Padding::new(0.0).left(48.0).right(48.0))
            .into()
    }

    fn view_episode_grid<'a>(
        &'a self,
        page: &'a TitlePage,
        detail: &'a TitleDetail,
    ) -> Element<'a, Message> {
        let server_index = page.active_server();
        let Some(server) = page.servers().get(server_index) else {
            return container(text("No servers available").size(14).color(TEXT_GRAY))
                .padding(Padding::new(0.0).left(48.0))
                .into();
        };
        if server.episodes.is_empty() {
            return container(text("No episodes yet").size(14).color(TEXT_GRAY))
                .padding(Padding::new(0.0).left(48.0))
                .into();
        }

        let playing = page.resolution().and_then(|r| r.episode_index());
        let chips: Vec<Element<'a, Message>> = server
            .episodes
            .iter()
            .enumerate()
            .map(|(index, episode)| {
                let watched = self
                    .history_entries
                    .iter()
                    .any(|e| e.is_for(&detail.title.id, &episode.name));
                let label = text(episode.name.as_str())
                    .size(13)
                    .shaping(text::Shaping::Advanced)
                    .color(if watched && playing != Some(index) {
                        TEXT_GRAY
                    } else {
                        TEXT_WHITE
                    });
                button(container(label).center_x(Length::Fill))
                    .width(Length::Fixed(72.0))
                    .padding(Padding::new(8.0))
                    .style(chip_style(playing == Some(index)))
                    .on_press(Message::SelectEpisode(server_index, index))
                    .into()
            })
            .collect();

        let mut grid = Column::new().spacing(8);
        let mut chips = chips.into_iter().peekable();
        while chips.peek().is_some() {
            grid = grid.push(Row::with_children(chips.by_ref().take(EPISODES_PER_ROW)).spacing(8));
        }

        container(
            column![
                text("Episodes")
                    .size(20)
                    .color(TEXT_WHITE)
                    .font(iced::Font {
                        weight: iced::font::Weight::Bold,
                        ..Default::default()
                    }),
                grid
            ]
            .spacing(12),
        )
        .padding(Padding::new(16.0).left(48.0).right(48.0))
        .into()
    }
}
