//! Remote community catalog: the service interface, its HTTP client and
//! the page payload format

use crate::types::{Genres, LevelMetadata, WorldId};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Deserializer};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldsRequest {
    pub first: usize,
    pub count: usize,
    pub sort_by: String,
    pub sort_dir: String,
    pub date_range: String,
    pub keywords: String,
    pub creator: Option<String>,
}

/// Full content of a world plus its thumbnail bytes
#[derive(Debug, Clone, Default)]
pub struct WorldData {
    pub content: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

/// Asynchronous access to the community catalog
pub trait CatalogService: Send + Sync + 'static {
    /// Fetch one page; resolves to the raw JSON payload
    fn get_worlds(&self, request: WorldsRequest) -> BoxFuture<'static, ServiceResult<String>>;

    fn get_world_data(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<WorldData>>;

    fn get_thumbnail(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<Vec<u8>>>;

    fn delete_world(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<()>>;
}

/// [`CatalogService`] over the community REST endpoints
#[derive(Clone)]
pub struct HttpCatalogService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn world_url(&self, id: WorldId, suffix: &str) -> String {
        format!("{}/worlds/{}{}", self.base_url, id, suffix)
    }

    async fn get_bytes(client: reqwest::Client, url: String) -> ServiceResult<Vec<u8>> {
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl CatalogService for HttpCatalogService {
    fn get_worlds(&self, request: WorldsRequest) -> BoxFuture<'static, ServiceResult<String>> {
        let client = self.client.clone();
        let url = format!("{}/worlds", self.base_url);
        async move {
            let mut query: Vec<(&str, String)> = vec![
                ("first", request.first.to_string()),
                ("count", request.count.to_string()),
                ("sortBy", request.sort_by),
                ("sortDir", request.sort_dir),
                ("dateRange", request.date_range),
                ("keywords", request.keywords),
            ];
            if let Some(creator) = request.creator {
                query.push(("creator", creator));
            }

            debug!(url = %url, first = request.first, "Requesting page of worlds");
            let response = client.get(&url).query(&query).send().await?;
            if !response.status().is_success() {
                return Err(ServiceError::Status(response.status().as_u16()));
            }
            Ok(response.text().await?)
        }
        .boxed()
    }

    fn get_world_data(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<WorldData>> {
        let data = Self::get_bytes(self.client.clone(), self.world_url(id, "/data"));
        let thumb = Self::get_bytes(self.client.clone(), self.world_url(id, "/thumbnail"));
        async move {
            let (content, thumbnail) = futures::join!(data, thumb);
            Ok(WorldData {
                content: content?,
                // A world without a thumbnail is still a usable download.
                thumbnail: thumbnail.unwrap_or_default(),
            })
        }
        .boxed()
    }

    fn get_thumbnail(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<Vec<u8>>> {
        Self::get_bytes(self.client.clone(), self.world_url(id, "/thumbnail")).boxed()
    }

    fn delete_world(&self, id: WorldId) -> BoxFuture<'static, ServiceResult<()>> {
        let client = self.client.clone();
        let url = self.world_url(id, "");
        async move {
            let response = client.delete(&url).send().await?;
            if !response.status().is_success() {
                return Err(ServiceError::Status(response.status().as_u16()));
            }
            Ok(())
        }
        .boxed()
    }
}

/// One entry of a page payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteWorld {
    pub world_id: WorldId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub checksum: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub creator: String,
    #[serde(default)]
    pub downloads: i32,
    #[serde(deserialize_with = "service_time")]
    pub modified: DateTime<Utc>,
    #[serde(deserialize_with = "service_time")]
    pub last_write_time: DateTime<Utc>,
}

impl RemoteWorld {
    pub fn into_level(self) -> LevelMetadata {
        let mut level = LevelMetadata::new(self.world_id, self.name);
        level.description = self.description;
        level.checksum = self.checksum;
        level.creator = self.creator;
        level.downloads = self.downloads;
        level.sort_time = self.modified;
        level.last_write_time = self.last_write_time;
        level.genres = Genres::SHARED;
        level
    }
}

/// Parse a page payload. Anything but a JSON array of worlds is an error.
pub fn parse_page(payload: &str) -> ServiceResult<Vec<RemoteWorld>> {
    Ok(serde_json::from_str(payload)?)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamps come with or without an offset; bare ones are UTC
fn service_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
