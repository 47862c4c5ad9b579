use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use iced::widget::image::Handle;
use iced::Color;

use crate::catalog::CatalogError;
use crate::locator::PlaybackLocator;
use crate::router::Route;

fn simple_hash(s: &str) -> String {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    format!("{:016x}", hash)
}

fn get_cache_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".cache")
            .join("phimx")
            .join("images")
    })
}

pub const BACKGROUND_BLACK: Color = Color::from_rgb(0.0, 0.0, 0.0);
pub const SURFACE_DARK_GRAY: Color = Color::from_rgb(0.078, 0.078, 0.078);
pub const ACCENT_ORANGE: Color = Color::from_rgb(0.96, 0.55, 0.11);
pub const ERROR_RED: Color = Color::from_rgb(0.898, 0.035, 0.078);
pub const TEXT_WHITE: Color = Color::from_rgb(1.0, 1.0, 1.0);
pub const TEXT_GRAY: Color = Color::from_rgb(0.702, 0.702, 0.702);

pub type TitleId = String;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadingState {
    Idle,
    Loading,
    Error(String),
}

/// A category or country term as served by the taxonomy endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    pub name: String,
    pub slug: String,
}

impl std::fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Latest,
    Category,
    Country,
    Year,
    Type,
}

impl ListingKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            ListingKind::Latest => "latest",
            ListingKind::Category => "category",
            ListingKind::Country => "country",
            ListingKind::Year => "year",
            ListingKind::Type => "list",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "latest" => Some(ListingKind::Latest),
            "category" => Some(ListingKind::Category),
            "country" => Some(ListingKind::Country),
            "year" => Some(ListingKind::Year),
            "list" => Some(ListingKind::Type),
            _ => None,
        }
    }
}

/// Provider list slugs offered by the type picker.
pub const TYPE_LISTS: [(&str, &str); 7] = [
    ("phim-bo", "Series"),
    ("phim-le", "Movies"),
    ("tv-shows", "TV Shows"),
    ("hoat-hinh", "Animation"),
    ("phim-vietsub", "Vietsub"),
    ("phim-thuyet-minh", "Voice-over"),
    ("phim-long-tieng", "Dubbed"),
];

pub const FIRST_LISTED_YEAR: i32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingQuery {
    pub kind: ListingKind,
    pub key: String,
    pub page: u32,
}

impl ListingQuery {
    pub fn latest(page: u32) -> Self {
        Self {
            kind: ListingKind::Latest,
            key: String::new(),
            page: page.max(1),
        }
    }

    pub fn new(kind: ListingKind, key: impl Into<String>, page: u32) -> Self {
        Self {
            kind,
            key: key.into(),
            page: page.max(1),
        }
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }
}

/// One card in a listing or search result page.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleSummary {
    pub id: TitleId,
    pub name: String,
    pub origin_name: String,
    pub poster_url: Option<String>,
    pub thumb_url: Option<String>,
    pub year: Option<u32>,
    pub quality: String,
    pub language: String,
    pub episode_current: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Listing {
    pub items: Vec<TitleSummary>,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub id: TitleId,
    pub name: String,
    pub origin_name: String,
    pub synopsis: String,
    pub year: Option<u32>,
    pub quality: String,
    pub language: String,
    pub runtime: String,
    pub episode_current: String,
    pub poster_url: Option<String>,
    pub thumb_url: Option<String>,
    pub cast: Vec<String>,
    pub categories: Vec<Taxonomy>,
    pub countries: Vec<Taxonomy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub name: String,
    pub stream_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerGroup {
    pub name: String,
    pub episodes: Vec<Episode>,
}

/// A fetched title together with its ordered server groups.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleDetail {
    pub title: Title,
    pub servers: Vec<ServerGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageCache {
    cache: HashMap<String, Handle>,
    pending: HashSet<String>,
    /// URLs that failed once; not requested again this run.
    failed: HashSet<String>,
    cache_directory: Option<PathBuf>,
}

impl ImageCache {
    pub fn new() -> Self {
        let cache_directory = get_cache_dir();
        if let Some(ref dir) = cache_directory {
            let _ = std::fs::create_dir_all(dir);
        }
        Self {
            cache: HashMap::new(),
            pending: HashSet::new(),
            failed: HashSet::new(),
            cache_directory,
        }
    }

    pub fn get(&self, url: &str) -> Option<&Handle> {
        self.cache.get(url)
    }

    pub fn insert(&mut self, url: String, handle: Handle) {
        self.pending.remove(&url);
        self.cache.insert(url, handle);
    }

    pub fn fail(&mut self, url: &str) {
        self.pending.remove(url);
        self.failed.insert(url.to_string());
    }

    /// True when `url` is neither loaded, in flight, nor known to fail.
    pub fn wants(&self, url: &str) -> bool {
        !self.cache.contains_key(url) && !self.pending.contains(url) && !self.failed.contains(url)
    }

    pub fn mark_pending(&mut self, url: String) {
        self.pending.insert(url);
    }

    pub fn get_cache_path(&self, url: &str) -> Option<PathBuf> {
        self.cache_directory
            .as_ref()
            .map(|dir| dir.join(simple_hash(url)))
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    Navigate(Route),
    Back,
    Forward,
    SearchQueryChanged(String),
    SearchSubmit,
    PickCategory(Taxonomy),
    PickCountry(Taxonomy),
    PickYear(i32),
    PickType(String),
    CategoriesLoaded(Result<Vec<Taxonomy>, CatalogError>),
    CountriesLoaded(Result<Vec<Taxonomy>, CatalogError>),
    ListingLoaded(u64, Result<Listing, CatalogError>),
    TitleLoaded(u64, Box<Result<TitleDetail, CatalogError>>),
    RetryTitle,
    SelectServer(usize),
    SelectEpisode(usize, usize),
    ContinueWatching(PlaybackLocator),
    PlayerFrameTick,
    PlayerTogglePlay,
    PlayerSeek(f64),
    PlayerSeekRelative(f64),
    PlayerSetVolume(f64),
    PlayerToggleMute,
    PlayerClose,
    HistoryRemove(TitleId, String),
    HistoryClear,
    LoadImage(String),
    ImageLoaded(String, Result<Handle, String>),
}

pub fn truncate_description(description: &str, max_length: usize) -> String {
    if description.chars().count() <= max_length {
        return description.to_string();
    }
    let truncated: String = description.chars().take(max_length).collect();
    format!(
        "{}...",
        truncated.rfind(' ').map_or(truncated.as_str(), |i| &truncated[..i])
    )
}

/// Drops the HTML tags the provider embeds in synopses.
pub fn strip_markup(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_images_are_not_wanted_again() {
        let mut cache = ImageCache::default();
        let url = "https://phimimg.com/upload/vod/a.jpg";
        assert!(cache.wants(url));

        cache.mark_pending(url.to_string());
        assert!(!cache.wants(url));

        cache.fail(url);
        assert!(!cache.wants(url));
        assert!(cache.wants("https://phimimg.com/upload/vod/b.jpg"));
    }

    #[test]
    fn loaded_images_are_not_wanted_again() {
        let mut cache = ImageCache::default();
        let url = "https://phimimg.com/upload/vod/a.jpg";
        cache.mark_pending(url.to_string());
        cache.insert(url.to_string(), Handle::from_rgba(1, 1, vec![0, 0, 0, 255]));
        assert!(!cache.wants(url));
        assert!(cache.get(url).is_some());
    }

    #[test]
    fn truncate_description_cuts_on_word_boundary() {
        assert_eq!(truncate_description("short", 10), "short");
        assert_eq!(
            truncate_description("một hai ba bốn năm", 10),
            "một hai..."
        );
    }

    #[test]
    fn strip_markup_removes_tags_and_entities() {
        assert_eq!(
            strip_markup("<p>Phim&nbsp;hay <b>nhất</b></p>"),
            "Phim hay nhất"
        );
    }

    #[test]
    fn listing_query_pages_start_at_one() {
        assert_eq!(ListingQuery::latest(0).page, 1);
        assert_eq!(
            ListingQuery::new(ListingKind::Year, "2024", 3).with_page(0).page,
            1
        );
    }
}
