use tracing::debug;

use crate::locator::{PlaybackLocator, TITLE_PREFIX};
use crate::media::{ListingKind, ListingQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Listing(ListingQuery),
    Search { keyword: String, page: u32 },
    History,
    Title(PlaybackLocator),
}

impl Default for Route {
    fn default() -> Self {
        Route::Listing(ListingQuery::latest(1))
    }
}

impl Route {
    /// Parses an in-app address. Unknown paths land on the latest listing.
    pub fn parse(address: &str) -> Self {
        let (path, query) = address.split_once('?').unwrap_or((address, ""));
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Route::default(),
            ["history"] => Route::History,
            ["search"] => Route::Search {
                keyword: query_param(query, "keyword").unwrap_or_default(),
                page: page_param(query),
            },
            [prefix, id] if *prefix == TITLE_PREFIX => {
                let id = decode(id);
                if id.is_empty() {
                    Route::default()
                } else {
                    Route::Title(PlaybackLocator::from_query(id, query))
                }
            }
            ["latest"] => Route::Listing(ListingQuery::latest(page_param(query))),
            [kind, key] => match ListingKind::from_path_segment(kind) {
                Some(kind) if kind != ListingKind::Latest => {
                    Route::Listing(ListingQuery::new(kind, decode(key), page_param(query)))
                }
                _ => {
                    debug!(address, "unknown route");
                    Route::default()
                }
            },
            _ => {
                debug!(address, "unknown route");
                Route::default()
            }
        }
    }

    pub fn to_path(&self) -> String {
        match self {
            Route::Listing(q) if q.kind == ListingKind::Latest => {
                format!("/latest?page={}", q.page)
            }
            Route::Listing(q) => format!(
                "/{}/{}?page={}",
                q.kind.path_segment(),
                urlencoding::encode(&q.key),
                q.page
            ),
            Route::Search { keyword, page } => format!(
                "/search?keyword={}&page={}",
                urlencoding::encode(keyword),
                page
            ),
            Route::History => String::from("/history"),
            Route::Title(locator) => locator.path(),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| decode(&value.replace('+', " ")))
}

fn page_param(query: &str) -> u32 {
    query_param(query, "page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1)
        .max(1)
}

/// Oldest entries are dropped past this many.
const MAX_ENTRIES: usize = 100;

/// In-app navigation history with back/forward.
#[derive(Debug, Clone)]
pub struct Router {
    entries: Vec<Route>,
    cursor: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Route::default())
    }
}

impl Router {
    pub fn new(start: Route) -> Self {
        Self {
            entries: vec![start],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Route {
        &self.entries[self.cursor]
    }

    /// Pushes a route, dropping any forward entries. Returns false when the
    /// route equals the current one.
    pub fn push(&mut self, route: Route) -> bool {
        if *self.current() == route {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(route);
        if self.entries.len() > MAX_ENTRIES {
            self.entries.remove(0);
        } else {
            self.cursor += 1;
        }
        true
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn back(&mut self) -> Option<&Route> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<&Route> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }
}
