use std::time::Instant;

use iced::widget::image::Handle;
use iced::Task;
use tracing::{debug, info};

use crate::catalog::{image_url, CatalogError};
use crate::handlers::{after_history_write, load_image_url, navigate};
use crate::history::{now_epoch_ms, HistoryEntry};
use crate::locator::PlaybackLocator;
use crate::media::{Message, TitleDetail};
use crate::page::TitlePage;
use crate::router::Route;
use crate::session::{Checkpoint, ResumePoint, SessionState};
use crate::Phimx;

pub const MAIN_SCROLL_ID: &str = "main-scroll";

/// Mounts the title page for `locator`, reusing the current page when only
/// the query part changed.
pub fn enter_title(app: &mut Phimx, locator: PlaybackLocator) -> Task<Message> {
    let last = app.history.latest_for_title(&locator.title_id);

    if let Some(page) = app.title_page.as_mut() {
        if page.relocate(locator.clone(), last.as_ref()) {
            sync_session(app);
            return Task::none();
        }
    }

    close_session(app);
    app.next_generation += 1;
    app.title_page = Some(TitlePage::open(locator, app.next_generation));
    fetch_title(app)
}

/// Unmounts the title page and stops whatever was playing.
pub fn leave_title(app: &mut Phimx) {
    close_session(app);
    app.title_page = None;
}

fn fetch_title(app: &Phimx) -> Task<Message> {
    let Some(page) = app.title_page.as_ref() else {
        return Task::none();
    };
    let generation = page.generation();
    let title_id = page.title_id().to_string();
    let catalog = app.catalog.clone();
    Task::perform(
        async move { catalog.fetch_title_detail(&title_id).await },
        move |result| Message::TitleLoaded(generation, Box::new(result)),
    )
}

pub fn handle_title_loaded(
    app: &mut Phimx,
    generation: u64,
    result: Result<TitleDetail, CatalogError>,
) -> Task<Message> {
    let Some(title_id) = app.title_page.as_ref().map(|p| p.title_id().to_string()) else {
        debug!(generation, "title response arrived without a page");
        return Task::none();
    };
    let last = app.history.latest_for_title(&title_id);
    let Some(page) = app.title_page.as_mut() else {
        return Task::none();
    };
    if !page.on_title_loaded(generation, result, last.as_ref()) {
        return Task::none();
    }

    let poster = page
        .detail()
        .and_then(|d| d.title.thumb_url.clone().or_else(|| d.title.poster_url.clone()));
    sync_session(app);

    match poster {
        Some(poster) => {
            let url = image_url(&app.settings.image_base_url, &poster);
            load_image_url(app, &url)
        }
        None => Task::none(),
    }
}

pub fn handle_retry_title(app: &mut Phimx) -> Task<Message> {
    app.next_generation += 1;
    let generation = app.next_generation;
    let Some(page) = app.title_page.as_mut() else {
        return Task::none();
    };
    info!(title = %page.title_id(), "retrying title fetch");
    page.reload(generation);
    fetch_title(app)
}

pub fn handle_select_server(app: &mut Phimx, server_index: usize) -> Task<Message> {
    let Some(locator) = app
        .title_page
        .as_ref()
        .and_then(|page| page.select_server(server_index))
    else {
        return Task::none();
    };
    navigate(app, Route::Title(locator))
}

pub fn handle_select_episode(
    app: &mut Phimx,
    server_index: usize,
    episode_index: usize,
) -> Task<Message> {
    let Some(locator) = app
        .title_page
        .as_ref()
        .and_then(|page| page.select_episode(server_index, episode_index))
    else {
        return Task::none();
    };
    let id = iced::widget::Id::new(MAIN_SCROLL_ID);
    let offset = iced::widget::scrollable::AbsoluteOffset { x: 0.0, y: 0.0 };
    Task::batch([
        navigate(app, Route::Title(locator)),
        iced::widget::operation::scroll_to(id, offset),
    ])
}

/// Closing the player returns to the title's banner.
pub fn handle_player_close(app: &mut Phimx) -> Task<Message> {
    let Some(title_id) = app.title_page.as_ref().map(|p| p.title_id().to_string()) else {
        return Task::none();
    };
    navigate(app, Route::Title(PlaybackLocator::new(title_id)))
}

pub fn handle_player_tick(app: &mut Phimx) -> Task<Message> {
    handle_player_tick_at(app, Instant::now())
}

pub fn handle_player_tick_at(app: &mut Phimx, now: Instant) -> Task<Message> {
    let update = app.session.tick(now);

    if let Some(frame) = update.frame {
        app.player_frame = Some(Handle::from_rgba(frame.width, frame.height, frame.data));
    }
    if let Some(checkpoint) = update.checkpoint {
        record_checkpoint(app, &checkpoint);
    }
    if let Some(reason) = update.failed {
        app.player_frame = None;
        app.player_error = Some(reason);
    }
    if update.ended {
        let next = app.title_page.as_ref().and_then(|page| page.next_episode());
        if let Some(next) = next {
            info!(next = %next, "advancing to next episode");
            return navigate(app, Route::Title(next));
        }
    }
    Task::none()
}

/// Brings the session in line with the page's resolved episode.
fn sync_session(app: &mut Phimx) {
    let target = app.title_page.as_ref().and_then(|page| page.playback_target());
    let Some(target) = target else {
        close_session(app);
        return;
    };
    if app.session.is_attached_to(&target) {
        return;
    }

    let saved = app.history.find(&target.title_id, &target.episode_label);
    let resume = saved.as_ref().map(ResumePoint::from_entry);
    app.player_frame = None;
    app.player_error = None;
    if let Some(last) = app.session.attach(target.clone(), resume) {
        record_checkpoint(app, &last);
    }
    if let SessionState::Failed(reason) = app.session.state() {
        app.player_error = Some(reason.clone());
    }

    let selected = Checkpoint {
        target,
        current_time: saved.map_or(0.0, |entry| entry.position_seconds),
    };
    record_checkpoint(app, &selected);
}

fn close_session(app: &mut Phimx) {
    if let Some(last) = app.session.detach() {
        record_checkpoint(app, &last);
    }
    app.player_frame = None;
    app.player_error = None;
}

fn record_checkpoint(app: &mut Phimx, checkpoint: &Checkpoint) {
    let entry = HistoryEntry::from_checkpoint(checkpoint, now_epoch_ms());
    let result = app.history.upsert(entry);
    after_history_write(app, result);
}
