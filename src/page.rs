use tracing::{info, warn};

use crate::catalog::CatalogError;
use crate::history::HistoryEntry;
use crate::locator::PlaybackLocator;
use crate::media::{Episode, ServerGroup, TitleDetail};
use crate::resolver::{resolve, Resolution};
use crate::session::PlaybackTarget;
use crate::slug::unique_tokens;

#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    Loading,
    Ready(Resolution),
    Failed(String),
}

/// State of one mounted title page.
///
/// A page lives for exactly one title id. Address changes that keep the id
/// are applied with [`TitlePage::relocate`]; any other id needs a new page.
#[derive(Debug, Clone)]
pub struct TitlePage {
    locator: PlaybackLocator,
    generation: u64,
    detail: Option<TitleDetail>,
    state: PageState,
}

impl TitlePage {
    pub fn open(locator: PlaybackLocator, generation: u64) -> Self {
        info!(title = %locator.title_id, generation, "opening title page");
        Self {
            locator,
            generation,
            detail: None,
            state: PageState::Loading,
        }
    }

    pub fn title_id(&self) -> &str {
        &self.locator.title_id
    }

    pub fn locator(&self) -> &PlaybackLocator {
        &self.locator
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn detail(&self) -> Option<&TitleDetail> {
        self.detail.as_ref()
    }

    pub fn servers(&self) -> &[ServerGroup] {
        self.detail
            .as_ref()
            .map(|d| d.servers.as_slice())
            .unwrap_or_default()
    }

    /// Starts a fresh fetch cycle for the same title, e.g. after a failure.
    pub fn reload(&mut self, generation: u64) {
        self.generation = generation;
        self.detail = None;
        self.state = PageState::Loading;
    }

    /// Applies a fetch result. Results from a superseded generation are
    /// dropped and `false` is returned.
    pub fn on_title_loaded(
        &mut self,
        generation: u64,
        result: Result<TitleDetail, CatalogError>,
        last_watched: Option<&HistoryEntry>,
    ) -> bool {
        if generation != self.generation {
            info!(
                generation,
                current = self.generation,
                "ignoring stale title response"
            );
            return false;
        }
        match result {
            Ok(detail) => {
                self.state = PageState::Ready(resolve(&self.locator, &detail.servers, last_watched));
                self.detail = Some(detail);
            }
            Err(e) => {
                warn!(title = %self.locator.title_id, error = %e, "title fetch failed");
                self.state = PageState::Failed(e.to_string());
            }
        }
        true
    }

    /// Re-resolves after an address change within the same title.
    /// Returns false when the locator names a different title.
    pub fn relocate(&mut self, locator: PlaybackLocator, last_watched: Option<&HistoryEntry>) -> bool {
        if locator.title_id != self.locator.title_id {
            return false;
        }
        self.locator = locator;
        if let (Some(detail), PageState::Ready(_)) = (&self.detail, &self.state) {
            self.state = PageState::Ready(resolve(&self.locator, &detail.servers, last_watched));
        }
        true
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self.state {
            PageState::Ready(resolution) => Some(resolution),
            _ => None,
        }
    }

    /// Server tab currently highlighted.
    pub fn active_server(&self) -> usize {
        self.resolution().map_or(0, |r| r.server_index())
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.resolution(), Some(Resolution::Episode { .. }))
    }

    pub fn selected_episode(&self) -> Option<(&ServerGroup, &Episode)> {
        let Resolution::Episode {
            server_index,
            episode_index,
        } = self.resolution()?
        else {
            return None;
        };
        let server = self.servers().get(server_index)?;
        let episode = server.episodes.get(episode_index)?;
        Some((server, episode))
    }

    /// Address that plays the given episode.
    pub fn select_episode(&self, server_index: usize, episode_index: usize) -> Option<PlaybackLocator> {
        let server = self.servers().get(server_index)?;
        server.episodes.get(episode_index)?;
        let episode_token = unique_tokens(server.episodes.iter().map(|e| e.name.as_str()))
            .swap_remove(episode_index);
        Some(PlaybackLocator::with_tokens(
            &self.locator.title_id,
            self.server_token(server_index)?,
            Some(episode_token),
        ))
    }

    /// Address carrying only the server token; resolves to its first episode.
    pub fn select_server(&self, server_index: usize) -> Option<PlaybackLocator> {
        Some(PlaybackLocator::with_tokens(
            &self.locator.title_id,
            self.server_token(server_index)?,
            None,
        ))
    }

    fn server_token(&self, server_index: usize) -> Option<String> {
        self.servers().get(server_index)?;
        Some(
            unique_tokens(self.servers().iter().map(|s| s.name.as_str()))
                .swap_remove(server_index),
        )
    }

    /// Address of the episode after the current one on the same server.
    /// `None` on the last episode.
    pub fn next_episode(&self) -> Option<PlaybackLocator> {
        let Resolution::Episode {
            server_index,
            episode_index,
        } = self.resolution()?
        else {
            return None;
        };
        self.select_episode(server_index, episode_index + 1)
    }

    pub fn playback_target(&self) -> Option<PlaybackTarget> {
        let detail = self.detail.as_ref()?;
        let (server, episode) = self.selected_episode()?;
        Some(PlaybackTarget {
            title_id: detail.title.id.clone(),
            display_name: detail.title.name.clone(),
            poster_ref: detail
                .title
                .poster_url
                .clone()
                .or_else(|| detail.title.thumb_url.clone()),
            server_label: server.name.clone(),
            episode_label: episode.name.clone(),
            stream_url: episode.stream_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Title;

    fn detail(id: &str) -> TitleDetail {
        let episodes = |prefix: &str| -> Vec<Episode> {
            ["01", "02", "03"]
                .iter()
                .map(|n| Episode {
                    name: n.to_string(),
                    stream_url: format!("https://cdn.example/{}/{}.m3u8", prefix, n),
                })
                .collect()
        };
        TitleDetail {
            title: Title {
                id: id.to_string(),
                name: String::from("Title One"),
                origin_name: String::from("Title One"),
                synopsis: String::new(),
                year: Some(2024),
                quality: String::from("HD"),
                language: String::from("Vietsub"),
                runtime: String::from("24 phút"),
                episode_current: String::from("Hoàn Tất (3/3)"),
                poster_url: Some(String::from("https://phimimg.com/upload/vod/p.jpg")),
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

    fn ready_page(query: &str) -> TitlePage {
        let mut page = TitlePage::open(PlaybackLocator::from_query("t1", query), 1);
        assert!(page.on_title_loaded(1, Ok(detail("t1")), None));
        page
    }

    #[test]
    fn starts_loading_then_shows_banner() {
        let mut page = TitlePage::open(PlaybackLocator::new("t1"), 1);
        assert_eq!(page.state(), &PageState::Loading);
        page.on_title_loaded(1, Ok(detail("t1")), None);
        assert_eq!(
            page.state(),
            &PageState::Ready(Resolution::Banner { server_index: 0 })
        );
        assert!(page.playback_target().is_none());
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut page = TitlePage::open(PlaybackLocator::new("t1"), 2);
        assert!(!page.on_title_loaded(1, Ok(detail("t1")), None));
        assert_eq!(page.state(), &PageState::Loading);
    }

    #[test]
    fn fetch_failure_is_visible() {
        let mut page = TitlePage::open(PlaybackLocator::new("t1"), 1);
        page.on_title_loaded(1, Err(CatalogError::NotFound(String::from("t1"))), None);
        assert!(matches!(page.state(), PageState::Failed(_)));

        page.reload(2);
        assert_eq!(page.state(), &PageState::Loading);
        assert!(page.on_title_loaded(2, Ok(detail("t1")), None));
    }

    #[test]
    fn selecting_episode_builds_address() {
        let page = ready_page("");
        let locator = page.select_episode(0, 0).unwrap();
        assert_eq!(locator.path(), "/title/t1?s1&01");
        assert!(page.select_episode(0, 9).is_none());
    }

    #[test]
    fn selecting_server_carries_one_token() {
        let page = ready_page("");
        assert_eq!(page.select_server(1).unwrap().path(), "/title/t1?s2");
    }

    #[test]
    fn relocate_re_resolves_within_title() {
        let mut page = ready_page("");
        assert!(page.relocate(PlaybackLocator::from_query("t1", "s2&03"), None));
        let target = page.playback_target().unwrap();
        assert_eq!(target.server_label, "S2");
        assert_eq!(target.episode_label, "03");
        assert_eq!(target.stream_url, "https://cdn.example/s2/03.m3u8");

        assert!(!page.relocate(PlaybackLocator::new("t2"), None));
    }

    #[test]
    fn colliding_labels_stay_selectable() {
        let mut collided = detail("t1");
        collided.servers[0].episodes[1].name = String::from("01");
        collided.servers[1].name = String::from("s1");
        let mut page = TitlePage::open(PlaybackLocator::new("t1"), 1);
        assert!(page.on_title_loaded(1, Ok(collided), None));

        let second = page.select_episode(0, 1).unwrap();
        assert_eq!(second.path(), "/title/t1?s1&01-2");
        assert!(page.relocate(second, None));
        assert_eq!(
            page.resolution(),
            Some(Resolution::Episode {
                server_index: 0,
                episode_index: 1
            })
        );
        assert_eq!(
            page.playback_target().unwrap().stream_url,
            "https://cdn.example/s1/02.m3u8"
        );

        let other_server = page.select_server(1).unwrap();
        assert_eq!(other_server.path(), "/title/t1?s1-2");
        assert!(page.relocate(other_server, None));
        assert_eq!(page.active_server(), 1);
    }

    #[test]
    fn next_episode_advances_without_wraparound() {
        let page = ready_page("s1&02");
        assert_eq!(page.next_episode().unwrap().path(), "/title/t1?s1&03");

        let last = ready_page("s1&03");
        assert!(last.next_episode().is_none());

        let banner = ready_page("");
        assert!(banner.next_episode().is_none());
    }
}
