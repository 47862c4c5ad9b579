use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::media::{
    strip_markup, Episode, Listing, ListingKind, ListingQuery, ServerGroup, Taxonomy, Title,
    TitleDetail, TitleSummary,
};
use crate::settings::AppSettings;

pub const DEFAULT_API_BASE: &str = "https://phimapi.com";
pub const DEFAULT_IMAGE_BASE: &str = "https://phimimg.com";

const CACHE_TTL_SECONDS: u64 = 300;
const REQUEST_TIMEOUT_SECONDS: u64 = 30;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("title not found: {0}")]
    NotFound(String),
}

/// Read-only access to the content provider.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_title_detail(&self, title_id: &str) -> Result<TitleDetail, CatalogError>;
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Listing, CatalogError>;
    async fn search(&self, keyword: &str, page: u32) -> Result<Listing, CatalogError>;
    async fn fetch_categories(&self) -> Result<Vec<Taxonomy>, CatalogError>;
    async fn fetch_countries(&self) -> Result<Vec<Taxonomy>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    status: Option<bool>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default, deserialize_with = "object_or_none")]
    movie: Option<MovieDto>,
    #[serde(default)]
    episodes: Vec<ServerDto>,
}

#[derive(Debug, Default, Deserialize)]
struct MovieDto {
    #[serde(default)]
    slug: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    origin_name: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    poster_url: Option<String>,
    #[serde(default)]
    thumb_url: Option<String>,
    #[serde(default)]
    year: Option<serde_json::Value>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    episode_current: Option<String>,
    #[serde(default)]
    actor: Vec<String>,
    #[serde(default)]
    category: Vec<TaxonomyDto>,
    #[serde(default)]
    country: Vec<TaxonomyDto>,
}

#[derive(Debug, Deserialize)]
struct ServerDto {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    server_data: Vec<EpisodeDto>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    link_m3u8: String,
}

#[derive(Debug, Deserialize)]
struct TaxonomyDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    items: Vec<MovieDto>,
    #[serde(default)]
    pagination: Option<PaginationDto>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    items: Vec<MovieDto>,
    #[serde(default)]
    params: Option<ListParams>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    pagination: Option<PaginationDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationDto {
    #[serde(default)]
    total_pages: Option<u32>,
}

fn year_of(value: &Option<serde_json::Value>) -> Option<u32> {
    let year: u32 = match value.as_ref()? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|y| u32::try_from(y).ok())?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (year > 0).then_some(year)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Joins a relative poster path onto the image CDN; absolute URLs pass through.
pub fn image_url(image_base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            image_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl MovieDto {
    fn into_summary(self, image_base: &str) -> TitleSummary {
        TitleSummary {
            year: year_of(&self.year),
            id: self.slug,
            name: self.name,
            origin_name: self.origin_name,
            poster_url: non_empty(self.poster_url).map(|p| image_url(image_base, &p)),
            thumb_url: non_empty(self.thumb_url).map(|p| image_url(image_base, &p)),
            quality: self.quality.unwrap_or_default(),
            language: self.lang.unwrap_or_default(),
            episode_current: self.episode_current.unwrap_or_default(),
        }
    }

    fn into_title(self, image_base: &str) -> Title {
        Title {
            year: year_of(&self.year),
            id: self.slug,
            name: self.name,
            origin_name: self.origin_name,
            synopsis: self.content.as_deref().map(strip_markup).unwrap_or_default(),
            quality: self.quality.unwrap_or_default(),
            language: self.lang.unwrap_or_default(),
            runtime: self.time.unwrap_or_default(),
            episode_current: self.episode_current.unwrap_or_default(),
            poster_url: non_empty(self.poster_url).map(|p| image_url(image_base, &p)),
            thumb_url: non_empty(self.thumb_url).map(|p| image_url(image_base, &p)),
            cast: self
                .actor
                .into_iter()
                .filter(|a| !a.trim().is_empty())
                .collect(),
            categories: self.category.into_iter().map(Taxonomy::from).collect(),
            countries: self.country.into_iter().map(Taxonomy::from).collect(),
        }
    }
}

impl From<TaxonomyDto> for Taxonomy {
    fn from(dto: TaxonomyDto) -> Self {
        Taxonomy {
            name: dto.name,
            slug: dto.slug,
        }
    }
}

/// The provider sends `"movie": []` for unknown titles.
fn object_or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match serde_json::Value::deserialize(deserializer)? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

pub(crate) fn parse_title_detail(
    title_id: &str,
    body: &str,
    image_base: &str,
) -> Result<TitleDetail, CatalogError> {
    let response: DetailResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))?;
    let movie = match (response.status, response.movie) {
        (Some(false), _) | (_, None) => {
            debug!(title_id, msg = ?response.msg, "provider reported missing title");
            return Err(CatalogError::NotFound(title_id.to_string()));
        }
        (_, Some(movie)) => movie,
    };

    let mut title = movie.into_title(image_base);
    if title.id.is_empty() {
        title.id = title_id.to_string();
    }
    let servers = response
        .episodes
        .into_iter()
        .map(|server| ServerGroup {
            name: server.server_name,
            episodes: server
                .server_data
                .into_iter()
                .filter(|e| !e.link_m3u8.is_empty())
                .map(|e| Episode {
                    name: e.name,
                    stream_url: e.link_m3u8,
                })
                .collect(),
        })
        .collect();
    Ok(TitleDetail { title, servers })
}

pub(crate) fn parse_latest(body: &str, image_base: &str) -> Result<Listing, CatalogError> {
    let response: LatestResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))?;
    Ok(Listing {
        items: response
            .items
            .into_iter()
            .map(|m| m.into_summary(image_base))
            .collect(),
        total_pages: response
            .pagination
            .and_then(|p| p.total_pages)
            .unwrap_or(1)
            .max(1),
    })
}

pub(crate) fn parse_listing(body: &str, image_base: &str) -> Result<Listing, CatalogError> {
    let response: ListResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))?;
    let Some(data) = response.data else {
        return Ok(Listing {
            items: Vec::new(),
            total_pages: 1,
        });
    };
    Ok(Listing {
        items: data
            .items
            .into_iter()
            .map(|m| m.into_summary(image_base))
            .collect(),
        total_pages: data
            .params
            .and_then(|p| p.pagination)
            .and_then(|p| p.total_pages)
            .unwrap_or(1)
            .max(1),
    })
}

pub(crate) fn parse_taxonomy(body: &str) -> Result<Vec<Taxonomy>, CatalogError> {
    let items: Vec<TaxonomyDto> =
        serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))?;
    Ok(items
        .into_iter()
        .filter(|t| !t.slug.is_empty())
        .map(Taxonomy::from)
        .collect())
}

pub async fn fetch_image_bytes(url: String) -> Result<Vec<u8>, String> {
    reqwest::get(&url)
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| e.to_string())
}

struct CacheEntry<T> {
    data: T,
    created_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            created_at: Instant::now(),
        }
    }

    fn is_valid(&self) -> bool {
        self.created_at.elapsed() < Duration::from_secs(CACHE_TTL_SECONDS)
    }
}

type Cache<T> = Arc<RwLock<HashMap<String, CacheEntry<T>>>>;

fn cache_get<T: Clone>(cache: &Cache<T>, key: &str) -> Option<T> {
    let hit = cache
        .read()
        .ok()?
        .get(key)
        .filter(|e| e.is_valid())
        .map(|e| e.data.clone());
    if hit.is_some() {
        debug!(key, "cache hit");
    }
    hit
}

fn cache_put<T: Clone>(cache: &Cache<T>, key: String, data: T) {
    if let Ok(mut cache) = cache.write() {
        cache.insert(key, CacheEntry::new(data));
    }
}

#[derive(Clone)]
pub struct CatalogClient {
    base_url: String,
    image_base_url: String,
    http_client: Arc<reqwest::Client>,
    listing_cache: Cache<Listing>,
    detail_cache: Cache<TitleDetail>,
    taxonomy_cache: Cache<Vec<Taxonomy>>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, image_base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            image_base_url: image_base_url.into(),
            http_client: Arc::new(http_client),
            listing_cache: Arc::new(RwLock::new(HashMap::new())),
            detail_cache: Arc::new(RwLock::new(HashMap::new())),
            taxonomy_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(&settings.api_base_url, &settings.image_base_url)
    }

    fn listing_url(&self, query: &ListingQuery) -> String {
        let key = urlencoding::encode(&query.key);
        match query.kind {
            ListingKind::Latest => format!(
                "{}/danh-sach/phim-moi-cap-nhat-v3?page={}",
                self.base_url, query.page
            ),
            ListingKind::Category => {
                format!("{}/v1/api/the-loai/{}?page={}", self.base_url, key, query.page)
            }
            ListingKind::Country => {
                format!("{}/v1/api/quoc-gia/{}?page={}", self.base_url, key, query.page)
            }
            ListingKind::Year => {
                format!("{}/v1/api/nam/{}?page={}", self.base_url, key, query.page)
            }
            ListingKind::Type => {
                format!("{}/v1/api/danh-sach/{}?page={}", self.base_url, key, query.page)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, CatalogError> {
        debug!(url, "fetching");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        match response.status().as_u16() {
            s if s >= 400 => Err(CatalogError::Status(s)),
            _ => response
                .text()
                .await
                .map_err(|e| CatalogError::Network(e.to_string())),
        }
    }

    async fn fetch_taxonomy(&self, path: &str) -> Result<Vec<Taxonomy>, CatalogError> {
        if let Some(cached) = cache_get(&self.taxonomy_cache, path) {
            return Ok(cached);
        }
        let body = self.fetch_text(&format!("{}/{}", self.base_url, path)).await?;
        let items = parse_taxonomy(&body)?;
        cache_put(&self.taxonomy_cache, path.to_string(), items.clone());
        Ok(items)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn fetch_title_detail(&self, title_id: &str) -> Result<TitleDetail, CatalogError> {
        if let Some(cached) = cache_get(&self.detail_cache, title_id) {
            return Ok(cached);
        }
        let url = format!("{}/phim/{}", self.base_url, urlencoding::encode(title_id));
        let body = match self.fetch_text(&url).await {
            Err(CatalogError::Status(404)) => {
                return Err(CatalogError::NotFound(title_id.to_string()))
            }
            other => other?,
        };
        let detail = parse_title_detail(title_id, &body, &self.image_base_url)?;
        cache_put(&self.detail_cache, title_id.to_string(), detail.clone());
        Ok(detail)
    }

    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Listing, CatalogError> {
        let url = self.listing_url(query);
        if let Some(cached) = cache_get(&self.listing_cache, &url) {
            return Ok(cached);
        }
        let body = self.fetch_text(&url).await?;
        let listing = match query.kind {
            ListingKind::Latest => parse_latest(&body, &self.image_base_url)?,
            _ => parse_listing(&body, &self.image_base_url)?,
        };
        cache_put(&self.listing_cache, url, listing.clone());
        Ok(listing)
    }

    async fn search(&self, keyword: &str, page: u32) -> Result<Listing, CatalogError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Listing {
                items: Vec::new(),
                total_pages: 1,
            });
        }
        let url = format!(
            "{}/v1/api/tim-kiem?keyword={}&page={}",
            self.base_url,
            urlencoding::encode(keyword),
            page.max(1)
        );
        if let Some(cached) = cache_get(&self.listing_cache, &url) {
            return Ok(cached);
        }
        let body = self.fetch_text(&url).await?;
        let listing = parse_listing(&body, &self.image_base_url)?;
        cache_put(&self.listing_cache, url, listing.clone());
        Ok(listing)
    }

    async fn fetch_categories(&self) -> Result<Vec<Taxonomy>, CatalogError> {
        self.fetch_taxonomy("the-loai").await
    }

    async fn fetch_countries(&self) -> Result<Vec<Taxonomy>, CatalogError> {
        self.fetch_taxonomy("quoc-gia").await
    }
}
