use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::catalog::{Catalog, CatalogError};
use crate::engine::mock::MockFactory;
use crate::engine::EngineEvent;
use crate::handlers::handle_message;
use crate::history::{HistoryEntry, HistoryStore, MemoryBackend};
use crate::locator::PlaybackLocator;
use crate::media::{
    Episode, Listing, ListingQuery, Message, ServerGroup, Taxonomy, Title, TitleDetail,
};
use crate::page::PageState;
use crate::player_handlers::handle_player_tick_at;
use crate::resolver::Resolution;
use crate::router::Route;
use crate::session::SessionState;
use crate::settings::AppSettings;
use crate::Phimx;

fn detail(id: &str) -> TitleDetail {
    let episodes = |server: &str| -> Vec<Episode> {
        ["01", "02", "03"]
            .iter()
            .map(|n| Episode {
                name: n.to_string(),
                stream_url: format!("https://cdn.example/{}/{}/{}.m3u8", id, server, n),
            })
            .collect()
    };
    TitleDetail {
        title: Title {
            id: id.to_string(),
            name: format!("Title {}", id),
            origin_name: String::new(),
            synopsis: String::new(),
            year: Some(2024),
            quality: String::from("HD"),
            language: String::from("Vietsub"),
            runtime: String::new(),
            episode_current: String::new(),
            poster_url: Some(format!("https://phimimg.com/upload/vod/{}.jpg", id)),
            thumb_url: None,
            cast: Vec::new(),
            categories: Vec::new(),
            countries: Vec::new(),
        },
        servers: vec![
            ServerGroup {
                name: String::from("S1"),
                episodes: episodes("s1"),
            },
            ServerGroup {
                name: String::from("S2"),
                episodes: episodes("s2"),
            },
        ],
    }
}

struct FakeCatalog;

#[async_trait]
impl Catalog for FakeCatalog {
    async fn fetch_title_detail(&self, title_id: &str) -> Result<TitleDetail, CatalogError> {
        if title_id == "missing" {
            return Err(CatalogError::NotFound(title_id.to_string()));
        }
        Ok(detail(title_id))
    }

    async fn fetch_listing(&self, _query: &ListingQuery) -> Result<Listing, CatalogError> {
        Ok(Listing::default())
    }

    async fn search(&self, _keyword: &str, _page: u32) -> Result<Listing, CatalogError> {
        Ok(Listing::default())
    }

    async fn fetch_categories(&self) -> Result<Vec<Taxonomy>, CatalogError> {
        Ok(Vec::new())
    }

    async fn fetch_countries(&self) -> Result<Vec<Taxonomy>, CatalogError> {
        Ok(Vec::new())
    }
}

struct Harness {
    app: Phimx,
    engines: MockFactory,
}

impl Harness {
    fn new() -> Self {
        Self::with_history(HistoryStore::new(Box::new(MemoryBackend::new()), 50))
    }

    fn with_history(history: HistoryStore) -> Self {
        Self::starting_at(history, Route::default())
    }

    fn starting_at(history: HistoryStore, start: Route) -> Self {
        let engines = MockFactory::new();
        let app = Phimx::with_parts(
            AppSettings::default(),
            Arc::new(FakeCatalog),
            Box::new(engines.clone()),
            history,
        )
        .starting_at(start);
        Self { app, engines }
    }

    fn send(&mut self, message: Message) {
        let _ = handle_message(&mut self.app, message);
    }

    /// Starts the app at `address`, as if it had been given on the command line.
    fn launched_at(address: &str) -> Self {
        let args = ["phimx", address].map(String::from).into_iter().skip(1);
        let mut h = Self::starting_at(
            HistoryStore::new(Box::new(MemoryBackend::new()), 50),
            crate::launch_route(args),
        );
        let _ = h.app.start();
        h.answer_title_fetch();
        h
    }

    /// Navigates to `address` and answers the title fetch it starts.
    fn open(&mut self, address: &str) {
        self.send(Message::Navigate(Route::parse(address)));
        self.answer_title_fetch();
    }

    fn answer_title_fetch(&mut self) {
        let id = self
            .app
            .title_page
            .as_ref()
            .map(|p| p.title_id().to_string())
            .unwrap();
        let generation = self.app.next_generation;
        self.send(Message::TitleLoaded(generation, Box::new(Ok(detail(&id)))));
    }

    fn path(&self) -> String {
        self.app.router.current().to_path()
    }

    fn resolution(&self) -> Option<Resolution> {
        self.app.title_page.as_ref().and_then(|p| p.resolution())
    }

    fn tick(&mut self, now: Instant) {
        let _ = handle_player_tick_at(&mut self.app, now);
    }

    fn start_playing(&mut self, now: Instant) {
        self.engines.push_event(EngineEvent::ManifestParsed);
        self.engines
            .push_event(EngineEvent::MetadataLoaded { duration: 1400.0 });
        self.engines.push_event(EngineEvent::Playing);
        self.tick(now);
    }

    fn saved_position(&self, title_id: &str, episode: &str) -> Option<f64> {
        self.app
            .history
            .find(title_id, episode)
            .map(|e| e.position_seconds)
    }
}

#[test]
fn fresh_watch_checkpoints_and_advances() {
    let mut h = Harness::new();
    let t0 = Instant::now();

    h.open("/title/t1");
    assert_eq!(h.resolution(), Some(Resolution::Banner { server_index: 0 }));
    assert_eq!(h.engines.constructed(), 0);
    assert!(!h.app.session.has_engine());

    h.send(Message::SelectEpisode(0, 0));
    assert_eq!(h.path(), "/title/t1?s1&01");
    assert_eq!(h.engines.constructed(), 1);
    assert_eq!(h.engines.loaded(), vec!["https://cdn.example/t1/s1/01.m3u8"]);
    assert_eq!(h.saved_position("t1", "01"), Some(0.0));

    h.start_playing(t0);
    assert_eq!(h.app.session.state(), &SessionState::Playing);

    h.engines.push_event(EngineEvent::TimeUpdate { position: 42.0 });
    h.tick(t0 + Duration::from_secs(4));
    assert_eq!(h.saved_position("t1", "01"), Some(0.0));

    h.tick(t0 + Duration::from_secs(5));
    assert_eq!(h.saved_position("t1", "01"), Some(42.0));
    assert_eq!(h.app.history_entries[0].episode_label, "01");

    h.engines.push_event(EngineEvent::Ended);
    h.tick(t0 + Duration::from_secs(6));
    assert_eq!(h.path(), "/title/t1?s1&02");
    assert_eq!(h.engines.constructed(), 2);
    assert_eq!(h.engines.destroyed(), 1);
    assert_eq!(
        h.engines.loaded().last().map(String::as_str),
        Some("https://cdn.example/t1/s1/02.m3u8")
    );
}

#[test]
fn last_episode_end_does_not_advance() {
    let mut h = Harness::new();
    let t0 = Instant::now();
    h.open("/title/t1?s1&03");
    h.start_playing(t0);

    h.engines.push_event(EngineEvent::Ended);
    h.tick(t0 + Duration::from_secs(1));

    assert_eq!(h.path(), "/title/t1?s1&03");
    assert_eq!(h.engines.constructed(), 1);
    assert_eq!(h.app.session.state(), &SessionState::Ended);
}

#[test]
fn continue_watching_resumes_saved_position() {
    let mut store = HistoryStore::new(Box::new(MemoryBackend::new()), 50);
    store
        .upsert(HistoryEntry {
            title_id: String::from("t1"),
            episode_label: String::from("02"),
            server_label: String::from("S2"),
            poster_ref: None,
            display_name: String::from("Title t1"),
            position_seconds: 300.0,
            updated_at_epoch_ms: 1,
        })
        .unwrap();
    let mut h = Harness::with_history(store);

    h.open("/title/t1");
    assert_eq!(h.resolution(), Some(Resolution::Banner { server_index: 1 }));

    let entry = h.app.history_entries[0].clone();
    h.send(Message::ContinueWatching(entry.locator()));
    assert_eq!(h.path(), "/title/t1?s2&02");
    assert_eq!(h.saved_position("t1", "02"), Some(300.0));

    h.start_playing(Instant::now());
    assert_eq!(h.engines.seeks(), vec![300.0]);
}

#[test]
fn resume_is_not_applied_to_another_episode() {
    let mut store = HistoryStore::new(Box::new(MemoryBackend::new()), 50);
    store
        .upsert(HistoryEntry {
            title_id: String::from("t1"),
            episode_label: String::from("01"),
            server_label: String::from("S1"),
            poster_ref: None,
            display_name: String::from("Title t1"),
            position_seconds: 120.0,
            updated_at_epoch_ms: 1,
        })
        .unwrap();
    let mut h = Harness::with_history(store);

    h.open("/title/t1?s1&02");
    h.start_playing(Instant::now());
    assert!(h.engines.seeks().is_empty());
    assert_eq!(h.saved_position("t1", "01"), Some(120.0));
}

#[test]
fn rapid_switching_keeps_one_engine_alive() {
    let mut h = Harness::new();
    h.open("/title/t1?s1&01");
    h.send(Message::SelectEpisode(0, 1));
    h.send(Message::SelectEpisode(0, 2));
    h.send(Message::SelectEpisode(1, 0));

    assert_eq!(h.engines.constructed(), 4);
    assert_eq!(h.engines.destroyed(), 3);
    assert_eq!(h.engines.live(), 1);
    assert_eq!(h.path(), "/title/t1?s2&01");

    h.send(Message::Navigate(Route::History));
    assert_eq!(h.engines.live(), 0);
    assert!(h.app.title_page.is_none());
}

#[test]
fn leaving_mid_play_writes_final_position() {
    let mut h = Harness::new();
    let t0 = Instant::now();
    h.open("/title/t1?s1&01");
    h.start_playing(t0);
    h.engines.push_event(EngineEvent::TimeUpdate { position: 90.0 });
    h.tick(t0 + Duration::from_millis(500));

    h.send(Message::Navigate(Route::History));
    assert_eq!(h.saved_position("t1", "01"), Some(90.0));
    assert_eq!(h.app.history_entries.len(), 1);
}

#[test]
fn closing_player_returns_to_banner() {
    let mut h = Harness::new();
    h.open("/title/t1?s2&02");
    assert!(h.app.session.has_engine());

    h.send(Message::PlayerClose);
    assert_eq!(h.path(), "/title/t1");
    assert_eq!(h.engines.live(), 0);
    assert!(matches!(h.resolution(), Some(Resolution::Banner { .. })));
}

#[test]
fn back_reuses_loaded_page() {
    let mut h = Harness::new();
    h.open("/title/t1");
    h.send(Message::SelectEpisode(0, 0));
    assert_eq!(h.engines.live(), 1);
    let generation = h.app.next_generation;

    h.send(Message::Back);
    assert_eq!(h.path(), "/title/t1");
    assert_eq!(h.engines.live(), 0);
    assert_eq!(h.app.next_generation, generation);
    assert!(matches!(
        h.app.title_page.as_ref().map(|p| p.state()),
        Some(PageState::Ready(_))
    ));

    h.send(Message::Forward);
    assert_eq!(h.path(), "/title/t1?s1&01");
    assert_eq!(h.engines.live(), 1);
}

#[test]
fn unknown_tokens_fall_back_to_first_episode() {
    let mut h = Harness::new();
    h.open("/title/t1?zz&99");
    assert_eq!(
        h.resolution(),
        Some(Resolution::Episode {
            server_index: 0,
            episode_index: 0
        })
    );
    assert_eq!(h.engines.loaded(), vec!["https://cdn.example/t1/s1/01.m3u8"]);
}

#[test]
fn stale_title_response_is_ignored() {
    let mut h = Harness::new();
    h.send(Message::Navigate(Route::parse("/title/t1")));
    let first = h.app.next_generation;
    h.send(Message::Navigate(Route::parse("/title/t2?s1&01")));
    let second = h.app.next_generation;

    h.send(Message::TitleLoaded(first, Box::new(Ok(detail("t1")))));
    let page = h.app.title_page.as_ref().unwrap();
    assert_eq!(page.title_id(), "t2");
    assert_eq!(page.state(), &PageState::Loading);
    assert_eq!(h.engines.constructed(), 0);

    h.send(Message::TitleLoaded(second, Box::new(Ok(detail("t2")))));
    assert_eq!(h.engines.loaded(), vec!["https://cdn.example/t2/s1/01.m3u8"]);
}

#[test]
fn failed_fetch_can_be_retried() {
    let mut h = Harness::new();
    h.send(Message::Navigate(Route::parse("/title/t1?s1&01")));
    let generation = h.app.next_generation;
    h.send(Message::TitleLoaded(
        generation,
        Box::new(Err(CatalogError::Network(String::from("offline")))),
    ));
    assert!(matches!(
        h.app.title_page.as_ref().map(|p| p.state()),
        Some(PageState::Failed(_))
    ));
    assert_eq!(h.engines.constructed(), 0);

    h.send(Message::RetryTitle);
    assert_eq!(h.app.next_generation, generation + 1);
    h.send(Message::TitleLoaded(
        generation + 1,
        Box::new(Ok(detail("t1"))),
    ));
    assert_eq!(h.engines.constructed(), 1);
}

#[test]
fn playback_error_is_surfaced_and_engine_released() {
    let mut h = Harness::new();
    h.open("/title/t1?s1&01");
    h.engines
        .push_event(EngineEvent::Error(String::from("manifest unreachable")));
    h.tick(Instant::now());

    assert_eq!(h.app.player_error.as_deref(), Some("manifest unreachable"));
    assert_eq!(h.engines.live(), 0);
    assert_eq!(h.path(), "/title/t1?s1&01");
}

#[test]
fn history_keeps_fifty_most_recent_titles() {
    let mut h = Harness::new();
    for i in 0..51 {
        h.open(&format!("/title/t{}?s1&01", i));
    }
    h.send(Message::Navigate(Route::History));

    assert_eq!(h.app.history_entries.len(), 50);
    assert_eq!(h.app.history_entries[0].title_id, "t50");
    assert!(h.app.history.find("t0", "01").is_none());
    assert_eq!(h.engines.live(), 0);
}

#[test]
fn removing_and_clearing_history_refreshes_snapshot() {
    let mut h = Harness::new();
    h.open("/title/t1?s1&01");
    h.open("/title/t2?s1&02");
    h.send(Message::Navigate(Route::History));
    assert_eq!(h.app.history_entries.len(), 2);

    h.send(Message::HistoryRemove(String::from("t1"), String::from("01")));
    assert_eq!(h.app.history_entries.len(), 1);
    assert_eq!(h.app.history_entries[0].title_id, "t2");

    h.send(Message::HistoryClear);
    assert!(h.app.history_entries.is_empty());
}

#[tokio::test]
async fn fetched_detail_feeds_the_title_page() {
    let mut h = Harness::new();
    h.send(Message::Navigate(Route::parse("/title/t7?s2")));
    let generation = h.app.next_generation;

    let result = h.app.catalog.fetch_title_detail("t7").await;
    h.send(Message::TitleLoaded(generation, Box::new(result)));

    assert_eq!(
        h.resolution(),
        Some(Resolution::Episode {
            server_index: 1,
            episode_index: 0
        })
    );
    assert_eq!(h.engines.loaded(), vec!["https://cdn.example/t7/s2/01.m3u8"]);

    h.send(Message::Navigate(Route::parse("/title/missing")));
    let generation = h.app.next_generation;
    let result = h.app.catalog.fetch_title_detail("missing").await;
    h.send(Message::TitleLoaded(generation, Box::new(result)));
    assert!(matches!(
        h.app.title_page.as_ref().map(|p| p.state()),
        Some(PageState::Failed(_))
    ));
    assert_eq!(h.engines.live(), 0);
}

#[test]
fn launch_address_plays_that_episode() {
    let mut h = Harness::launched_at("/title/t1?s2&02");

    assert_eq!(h.path(), "/title/t1?s2&02");
    assert_eq!(
        h.resolution(),
        Some(Resolution::Episode {
            server_index: 1,
            episode_index: 1,
        })
    );
    assert_eq!(h.engines.constructed(), 1);
    assert_eq!(h.engines.loaded(), vec!["https://cdn.example/t1/s2/02.m3u8"]);

    h.start_playing(Instant::now());
    assert_eq!(h.app.session.state(), &SessionState::Playing);
}

#[test]
fn launch_without_address_opens_latest() {
    let h = Harness::starting_at(
        HistoryStore::new(Box::new(MemoryBackend::new()), 50),
        crate::launch_route(std::iter::empty()),
    );
    assert_eq!(h.app.router.current(), &Route::default());
    assert!(h.app.title_page.is_none());
}

#[test]
fn failed_poster_is_not_requested_again() {
    let mut h = Harness::new();
    let url = String::from("https://phimimg.com/upload/vod/t1.jpg");

    h.send(Message::LoadImage(url.clone()));
    assert!(!h.app.image_cache.wants(&url));

    h.send(Message::ImageLoaded(url.clone(), Err(String::from("HTTP 404"))));
    assert!(!h.app.image_cache.wants(&url));
    assert!(h.app.image_cache.get(&url).is_none());

    h.open("/title/t1");
    h.send(Message::LoadImage(url.clone()));
    assert!(!h.app.image_cache.wants(&url));
    assert!(h.app.image_cache.get(&url).is_none());
}
