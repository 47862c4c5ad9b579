use iced::widget::{button, column, container, row, slider, text, Space};
use iced::{Border, Color, Element, Length, Padding, Shadow};

use crate::components::{icon, ICON_X_LG};
use crate::media::{Message, ACCENT_ORANGE, ERROR_RED, TEXT_GRAY, TEXT_WHITE};
use crate::session::{PlaybackTarget, SessionState, SEEK_STEP_SECONDS};
use crate::Phimx;

const ICON_PLAY_FILL: char = '\u{F4F4}';
const ICON_PAUSE_FILL: char = '\u{F4C3}';
const ICON_SKIP_BACKWARD_FILL: char = '\u{F552}';
const ICON_SKIP_FORWARD_FILL: char = '\u{F555}';
const ICON_VOLUME_UP_FILL: char = '\u{F611}';
const ICON_VOLUME_MUTE_FILL: char = '\u{F608}';

const PLAYER_HEIGHT: f32 = 540.0;

pub fn format_time(secs: f64) -> String {
    let t = secs.max(0.0) as u64;
    let h = t / 3600;
    let m = (t % 3600) / 60;
    let s = t % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn slider_style(fill: Color, radius: f32) -> impl Fn(&iced::Theme, slider::Status) -> slider::Style {
    move |_, _| slider::Style {
        rail: slider::Rail {
            backgrounds: (
                iced::Background::Color(fill),
                iced::Background::Color(Color::from_rgba(1.0, 1.0, 1.0, 0.3)),
            ),
            width: 4.0,
            border: Border::default(),
        },
        handle: slider::Handle {
            shape: slider::HandleShape::Circle { radius },
            background: iced::Background::Color(TEXT_WHITE),
            border_width: 0.0,
            border_color: Color::TRANSPARENT,
        },
    }
}

impl Phimx {
    /// Inline player for the episode the session is bound to.
    pub fn view_player<'a>(&'a self, target: &'a PlaybackTarget) -> Element<'a, Message> {
        let video = self.view_player_video(target);
        let controls = self.view_player_controls(target);

        column![video, controls].width(Length::Fill).into()
    }

    fn view_player_video<'a>(&'a self, target: &'a PlaybackTarget) -> Element<'a, Message> {
        let content: Element<'a, Message> = if let Some(err) = &self.player_error {
            column![
                text("Failed to play").size(24).color(ERROR_RED),
                text(err.as_str()).size(14).color(TEXT_GRAY),
                text(format!("{} · {}", target.display_name, target.episode_label))
                    .size(16)
                    .color(TEXT_WHITE)
                    .shaping(text::Shaping::Advanced),
            ]
            .spacing(12)
            .align_x(iced::Alignment::Center)
            .into()
        } else if let Some(handle) = &self.player_frame {
            iced::widget::image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .content_fit(iced::ContentFit::Contain)
                .into()
        } else {
            let status = match self.session.state() {
                SessionState::Ended => "Finished",
                _ => "Loading...",
            };
            column![
                text(status).size(24).color(TEXT_WHITE),
                text(target.display_name.as_str())
                    .size(16)
                    .color(TEXT_GRAY)
                    .shaping(text::Shaping::Advanced),
            ]
            .spacing(8)
            .align_x(iced::Alignment::Center)
            .into()
        };

        container(content)
            .width(Length::Fill)
            .height(Length::Fixed(PLAYER_HEIGHT))
            .center_x(Length::Fill)
            .center_y(Length::Fixed(PLAYER_HEIGHT))
            .style(|_| container::Style {
                background: Some(iced::Background::Color(Color::BLACK)),
                ..Default::default()
            })
            .into()
    }

    fn view_player_controls<'a>(&'a self, target: &'a PlaybackTarget) -> Element<'a, Message> {
        let position = self.session.position();
        let duration = self.session.duration();

        let seek_slider = slider(0.0..=duration.max(1.0), position, Message::PlayerSeek)
            .width(Length::Fill)
            .height(4.0)
            .style(slider_style(ACCENT_ORANGE, 6.0));

        let progress_row = row![
            text(format_time(position)).size(12).color(TEXT_WHITE),
            seek_slider,
            text(format_time(duration)).size(12).color(TEXT_WHITE)
        ]
        .spacing(12)
        .align_y(iced::Alignment::Center);

        let playing = self.session.state() == &SessionState::Playing && !self.session.is_paused();
        let play_icon = if playing {
            ICON_PAUSE_FILL
        } else {
            ICON_PLAY_FILL
        };
        let volume_icon = if self.session.is_muted() {
            ICON_VOLUME_MUTE_FILL
        } else {
            ICON_VOLUME_UP_FILL
        };

        let volume_slider = slider(0.0..=1.0, self.session.volume(), Message::PlayerSetVolume)
            .step(0.05)
            .width(Length::Fixed(80.0))
            .height(4.0)
            .style(slider_style(TEXT_WHITE, 5.0));

        let left = row![
            self.ctrl_btn(play_icon, Message::PlayerTogglePlay),
            self.ctrl_btn(
                ICON_SKIP_BACKWARD_FILL,
                Message::PlayerSeekRelative(-SEEK_STEP_SECONDS)
            ),
            self.ctrl_btn(
                ICON_SKIP_FORWARD_FILL,
                Message::PlayerSeekRelative(SEEK_STEP_SECONDS)
            ),
            self.ctrl_btn(volume_icon, Message::PlayerToggleMute),
            volume_slider
        ]
        .spacing(4)
        .align_y(iced::Alignment::Center);

        let center = container(
            text(format!(
                "{} · {} · {}",
                target.display_name, target.server_label, target.episode_label
            ))
            .size(14)
            .color(TEXT_WHITE)
            .shaping(text::Shaping::Advanced),
        )
        .width(Length::Fill)
        .center_x(Length::Fill);

        let right = self.ctrl_btn(ICON_X_LG, Message::PlayerClose);

        container(
            column![
                progress_row,
                row![left, center, right]
                    .align_y(iced::Alignment::Center)
                    .width(Length::Fill),
                Space::new().height(4),
            ]
            .spacing(8)
            .width(Length::Fill),
        )
        .width(Length::Fill)
        .padding(Padding::new(12.0).left(20.0).right(20.0))
        .style(|_| container::Style {
            background: Some(iced::Background::Color(Color::from_rgba(0.0, 0.0, 0.0, 0.9))),
            ..Default::default()
        })
        .into()
    }

    fn ctrl_btn(&self, ic: char, msg: Message) -> Element<'_, Message> {
        button(icon(ic).size(18).color(TEXT_WHITE))
            .padding(Padding::new(8.0))
            .style(|_, status| button::Style {
                background: Some(iced::Background::Color(Color::from_rgba(
                    1.0,
                    1.0,
                    1.0,
                    if matches!(status, button::Status::Hovered) {
                        0.2
                    } else {
                        0.0
                    },
                ))),
                text_color: TEXT_WHITE,
                border: Border {
                    radius: 16.0.into(),
                    ..Default::default()
                },
                shadow: Shadow::default(),
                snap: false,
            })
            .on_press(msg)
            .into()
    }
}
