use iced::widget::{button, column, container, row, scrollable, text, Column, Space};
use iced::{Border, Color, Element, Length, Padding};

use crate::components::{
    chip_style, ghost_button_style, hidden_vertical_scrollbar_style, icon, ICON_PLAY_FILL,
    ICON_TRASH,
};
use crate::history::HistoryEntry;
use crate::media::{Message, SURFACE_DARK_GRAY, TEXT_GRAY, TEXT_WHITE};
use crate::player_view::format_time;
use crate::Phimx;

fn format_watched_at(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|at| {
            at.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_default()
}

impl Phimx {
    pub fn view_history(&self) -> Element<'_, Message> {
        let clear = button(
            row![icon(ICON_TRASH).size(14), text("Clear all").size(14)]
                .spacing(6)
                .align_y(iced::Alignment::Center),
        )
        .padding(Padding::new(8.0).left(16.0).right(16.0))
        .style(chip_style(false))
        .on_press_maybe((!self.history_entries.is_empty()).then_some(Message::HistoryClear));

        let heading = row![
            text("Continue watching")
                .size(26)
                .color(TEXT_WHITE)
                .font(iced::Font {
                    weight: iced::font::Weight::Bold,
                    ..Default::default()
                }),
            Space::new().width(Length::Fill),
            clear
        ]
        .align_y(iced::Alignment::Center);

        let body: Element<'_, Message> = if self.history_entries.is_empty() {
            text("Nothing watched yet").size(16).color(TEXT_GRAY).into()
        } else {
            Column::with_children(
                self.history_entries
                    .iter()
                    .map(|entry| self.view_history_entry(entry)),
            )
            .spacing(12)
            .into()
        };

        scrollable(
            column![heading, body]
                .spacing(24)
                .padding(Padding::new(32.0).left(48.0).right(48.0))
                .width(Length::Fill),
        )
        .direction(scrollable::Direction::Vertical(
            scrollable::Scrollbar::new().width(0).scroller_width(0),
        ))
        .width(Length::Fill)
        .height(Length::Fill)
        .style(hidden_vertical_scrollbar_style)
        .into()
    }

    fn view_history_entry<'a>(&'a self, entry: &'a HistoryEntry) -> Element<'a, Message> {
        let poster = self.view_poster(entry.poster_ref.as_deref(), 64.0, 96.0);

        let progress = if entry.position_seconds > 0.0 {
            format!(
                "{} · {} · at {}",
                entry.server_label,
                entry.episode_label,
                format_time(entry.position_seconds)
            )
        } else {
            format!("{} · {}", entry.server_label, entry.episode_label)
        };

        let details = column![
            text(entry.display_name.as_str())
                .size(16)
                .color(TEXT_WHITE)
                .shaping(text::Shaping::Advanced),
            text(progress)
                .size(13)
                .color(TEXT_GRAY)
                .shaping(text::Shaping::Advanced),
            text(format_watched_at(entry.updated_at_epoch_ms))
                .size(12)
                .color(TEXT_GRAY),
        ]
        .spacing(4)
        .width(Length::Fill);

        let resume = button(
            row![icon(ICON_PLAY_FILL).size(14), text("Resume").size(14)]
                .spacing(6)
                .align_y(iced::Alignment::Center),
        )
        .padding(Padding::new(8.0).left(16.0).right(16.0))
        .style(chip_style(true))
        .on_press(Message::ContinueWatching(entry.locator()));

        let remove = button(icon(ICON_TRASH).size(16))
            .padding(8)
            .style(ghost_button_style)
            .on_press(Message::HistoryRemove(
                entry.title_id.clone(),
                entry.episode_label.clone(),
            ));

        container(
            row![poster, details, resume, remove]
                .spacing(16)
                .align_y(iced::Alignment::Center),
        )
        .padding(12)
        .width(Length::Fill)
        .style(|_theme| container::Style {
            background: Some(iced::Background::Color(SURFACE_DARK_GRAY)),
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 8.0.into(),
            },
            ..Default::default()
        })
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::format_watched_at;

    #[test]
    fn watched_at_is_formatted_as_local_minutes() {
        let formatted = format_watched_at(1_700_000_000_000);
        assert_eq!(formatted.len(), "2023-11-14 22:13".len());
        assert!(formatted.starts_with("2023-11-1"));
    }
}
