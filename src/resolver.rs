use tracing::debug;

use crate::history::HistoryEntry;
use crate::locator::PlaybackLocator;
use crate::media::ServerGroup;
use crate::slug;

/// What the title page should show for a given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No episode is selected; the banner is shown with this server tab active.
    Banner { server_index: usize },
    Episode {
        server_index: usize,
        episode_index: usize,
    },
}

impl Resolution {
    pub fn server_index(&self) -> usize {
        match *self {
            Resolution::Banner { server_index } | Resolution::Episode { server_index, .. } => {
                server_index
            }
        }
    }

    pub fn episode_index(&self) -> Option<usize> {
        match *self {
            Resolution::Banner { .. } => None,
            Resolution::Episode { episode_index, .. } => Some(episode_index),
        }
    }
}

/// Maps an address onto concrete server and episode indices.
///
/// The address always wins: history only influences which server tab is
/// highlighted when the address carries no tokens. Tokens that do not match a
/// live label fall back to index 0. Any token at all selects an episode, so a
/// server-only address plays the first episode of that server.
pub fn resolve(
    locator: &PlaybackLocator,
    servers: &[ServerGroup],
    last_watched: Option<&HistoryEntry>,
) -> Resolution {
    if servers.is_empty() {
        return Resolution::Banner { server_index: 0 };
    }

    if !locator.has_tokens() {
        let server_index = last_watched
            .filter(|entry| entry.title_id == locator.title_id)
            .and_then(|entry| {
                servers
                    .iter()
                    .position(|s| s.name == entry.server_label)
                    .or_else(|| {
                        let token = slug::normalize(&entry.server_label);
                        slug::position_of(servers.iter().map(|s| s.name.as_str()), &token)
                    })
            })
            .unwrap_or(0);
        return Resolution::Banner { server_index };
    }

    let server_index = match locator.server_token.as_deref() {
        Some(token) => slug::position_of(servers.iter().map(|s| s.name.as_str()), token)
            .unwrap_or_else(|| {
                debug!(token, title = %locator.title_id, "no server matches token, using first");
                0
            }),
        None => 0,
    };

    let episodes = &servers[server_index].episodes;
    if episodes.is_empty() {
        return Resolution::Banner { server_index };
    }

    let episode_index = match locator.episode_token.as_deref() {
        Some(token) => slug::position_of(episodes.iter().map(|e| e.name.as_str()), token)
            .unwrap_or_else(|| {
                debug!(token, title = %locator.title_id, "no episode matches token, using first");
                0
            }),
        None => 0,
    };

    Resolution::Episode {
        server_index,
        episode_index,
    }
}
