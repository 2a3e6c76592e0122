//! Elasticsearch stream fact collector
//!
//! Facts for a data stream are assembled from three sources:
//!
//! * a `size: 0` search with `min`/`max` aggregations over the timestamp field
//! * the data stream API, for the names of the backing indices
//! * the `_cat/indices` API, for the bytes each backing index occupies
//!
//! Backing indices mounted from a searchable snapshot live on as
//! `partial-restored-<index>`. When enabled, those copies are found with a
//! `HEAD` request and their bytes are added to the stream.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use byte_unit::Byte;
use dsaudit_metrics::StreamFacts;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, trace};

use super::{Collector, ConnectivityError, FetchError};

/// Prefix Elasticsearch gives to indices restored from a searchable snapshot.
const RESTORED_PREFIX: &str = "partial-restored-";
/// Maximum number of indices named in one `_cat/indices` request.
const CAT_CHUNK: usize = 64;
/// Timestamps outside of these years are considered garbage.
const SANE_YEARS: std::ops::RangeInclusive<i32> = 1970..=2100;

/// Errors produced by [`Elasticsearch::new`] and [`Config::validate`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The cluster URL could not be parsed or is not HTTP.
    #[error("Invalid cluster url {url:?}: {reason}")]
    Url {
        /// The rejected url
        url: String,
        /// Why it was rejected
        reason: String,
    },
    /// The timestamp field name is empty.
    #[error("timestamp_field must not be empty")]
    TimestampField,
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_include_restored() -> bool {
    true
}

#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`Elasticsearch`]
pub struct Config {
    /// Base URL of the cluster
    #[serde(default = "default_url")]
    pub url: String,
    /// User for HTTP basic authentication. No authentication if unset.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for HTTP basic authentication
    #[serde(default)]
    pub password: Option<String>,
    /// Timeout applied to every request
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Event time field aggregated for the time bounds of a stream
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Whether to count `partial-restored-` copies of backing indices
    #[serde(default = "default_include_restored")]
    pub include_restored: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            timestamp_field: default_timestamp_field(),
            include_restored: default_include_restored(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("timestamp_field", &self.timestamp_field)
            .field("include_restored", &self.include_restored)
            .finish()
    }
}

impl Config {
    /// Check the configuration without building a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the url is not an absolute `http` or `https` url or
    /// the timestamp field is empty.
    pub fn validate(&self) -> Result<(), Error> {
        let url = reqwest::Url::parse(&self.url).map_err(|err| Error::Url {
            url: self.url.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Url {
                url: self.url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.timestamp_field.trim().is_empty() {
            return Err(Error::TimestampField);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DataStreams {
    data_streams: Vec<DataStream>,
}

#[derive(Debug, Deserialize)]
struct DataStream {
    name: String,
    #[serde(default)]
    indices: Vec<BackingIndex>,
}

#[derive(Debug, Deserialize)]
struct BackingIndex {
    index_name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    oldest: Extremum,
    newest: Extremum,
}

#[derive(Debug, Default, Deserialize)]
struct Extremum {
    value: Option<f64>,
    value_as_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
    #[serde(rename = "dataset.size")]
    dataset_size: Option<String>,
    #[serde(rename = "store.size")]
    store_size: Option<String>,
}

struct Credentials {
    username: String,
    password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// The Elasticsearch [`Collector`].
#[derive(Debug)]
pub struct Elasticsearch {
    client: reqwest::Client,
    base: String,
    credentials: Option<Credentials>,
    timestamp_field: String,
    include_restored: bool,
}

impl Elasticsearch {
    /// Create a new [`Elasticsearch`] collector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base: config.url.trim_end_matches('/').to_string(),
            credentials: config.username.map(|username| Credentials {
                username,
                password: config.password,
            }),
            timestamp_field: config.timestamp_field,
            include_restored: config.include_restored,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base));
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, credentials.password.as_ref())
            }
            None => builder,
        }
    }

    async fn send_json<T>(request: RequestBuilder, endpoint: &str) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        trace!("requesting {endpoint}");
        let response = request.send().await.map_err(|source| FetchError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        response.json::<T>().await.map_err(|source| FetchError::Http {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn time_bounds(
        &self,
        name: &str,
    ) -> Result<(Option<OffsetDateTime>, Option<OffsetDateTime>), FetchError> {
        let endpoint = format!("/{name}/_search");
        let body = json!({
            "size": 0,
            "aggs": {
                "oldest": { "min": { "field": self.timestamp_field } },
                "newest": { "max": { "field": self.timestamp_field } },
            }
        });
        let request = self.request(Method::POST, &endpoint).json(&body);
        let response: SearchResponse = Self::send_json(request, &endpoint).await?;
        let Some(aggregations) = response.aggregations else {
            return Ok((None, None));
        };

        match (
            timestamp(&aggregations.oldest),
            timestamp(&aggregations.newest),
        ) {
            (Some(oldest), Some(newest)) => Ok((Some(oldest), Some(newest))),
            (None, None) => Ok((None, None)),
            _ => {
                debug!("{name}: only one time bound is usable, treating stream as empty");
                Ok((None, None))
            }
        }
    }

    async fn backing_indices(&self, name: &str) -> Result<Vec<String>, FetchError> {
        let endpoint = format!("/_data_stream/{name}");
        let request = self.request(Method::GET, &endpoint);
        let response: DataStreams = Self::send_json(request, &endpoint).await?;
        let stream = response
            .data_streams
            .into_iter()
            .find(|stream| stream.name == name)
            .ok_or_else(|| FetchError::UnknownStream(name.to_string()))?;
        Ok(stream
            .indices
            .into_iter()
            .map(|index| index.index_name)
            .collect())
    }

    async fn store_bytes(&self, indices: &[String]) -> Result<u64, FetchError> {
        let mut total: u64 = 0;
        for chunk in indices.chunks(CAT_CHUNK) {
            let endpoint = format!("/_cat/indices/{}", chunk.join(","));
            let request = self.request(Method::GET, &endpoint).query(&[
                ("format", "json"),
                ("bytes", "b"),
                ("h", "index,dataset.size,store.size"),
            ]);
            let rows: Vec<CatIndex> = Self::send_json(request, &endpoint).await?;
            for row in rows {
                let Some(raw) = row.dataset_size.as_deref().or(row.store_size.as_deref()) else {
                    debug!("{index}: no size reported", index = row.index);
                    continue;
                };
                let bytes = parse_size(raw).ok_or_else(|| FetchError::Size {
                    index: row.index.clone(),
                    value: raw.to_string(),
                })?;
                trace!("{index}: {bytes} bytes", index = row.index);
                total = total.saturating_add(bytes);
            }
        }
        Ok(total)
    }

    async fn restored_indices(&self, indices: &[String]) -> Result<Vec<String>, FetchError> {
        let mut restored = Vec::new();
        for index in indices {
            let candidate = format!("{RESTORED_PREFIX}{index}");
            let endpoint = format!("/{candidate}");
            let response = self
                .request(Method::HEAD, &endpoint)
                .send()
                .await
                .map_err(|source| FetchError::Http {
                    endpoint: endpoint.clone(),
                    source,
                })?;
            match response.status() {
                StatusCode::OK => restored.push(candidate),
                StatusCode::NOT_FOUND => {}
                status => return Err(FetchError::Status { endpoint, status }),
            }
        }
        Ok(restored)
    }
}

#[async_trait]
impl Collector for Elasticsearch {
    async fn list_streams(&self) -> Result<Vec<String>, ConnectivityError> {
        let endpoint = "/_data_stream";
        let response = self
            .request(Method::GET, endpoint)
            .send()
            .await
            .map_err(|source| ConnectivityError::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectivityError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        let streams: DataStreams = response
            .json()
            .await
            .map_err(|source| ConnectivityError::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(streams
            .data_streams
            .into_iter()
            .map(|stream| stream.name)
            .collect())
    }

    async fn fetch_facts(&self, name: &str) -> Result<StreamFacts, FetchError> {
        let (min_timestamp, max_timestamp) = self.time_bounds(name).await?;
        let indices = self.backing_indices(name).await?;
        let mut store_bytes = self.store_bytes(&indices).await?;
        if self.include_restored {
            let restored = self.restored_indices(&indices).await?;
            if !restored.is_empty() {
                debug!("{name}: {count} restored indices", count = restored.len());
                store_bytes = store_bytes.saturating_add(self.store_bytes(&restored).await?);
            }
        }
        debug!(
            "{name}: {count} backing indices, {store_bytes} bytes",
            count = indices.len()
        );
        Ok(StreamFacts {
            name: name.to_string(),
            min_timestamp,
            max_timestamp,
            store_bytes,
        })
    }
}

/// Read a time bound from a `min`/`max` aggregation.
///
/// The numeric `value` holds epoch milliseconds for date fields. The string
/// rendering is only consulted when the number is missing.
fn timestamp(extremum: &Extremum) -> Option<OffsetDateTime> {
    extremum
        .value
        .and_then(from_epoch_millis)
        .or_else(|| {
            extremum
                .value_as_string
                .as_deref()
                .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
        })
        .filter(|timestamp| SANE_YEARS.contains(&timestamp.year()))
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_millis(millis: f64) -> Option<OffsetDateTime> {
    if !millis.is_finite() {
        return None;
    }
    let nanos = (millis * 1_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Parse a size reported by `_cat/indices`.
///
/// Plain integers are bytes. Human readable sizes such as `1.5gb` follow the
/// Elasticsearch convention of 1024-based units.
pub(crate) fn parse_size(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(bytes) = trimmed.parse::<u64>() {
        return Some(bytes);
    }
    let lower = trimmed.to_ascii_lowercase();
    let binary = match lower.strip_suffix('b') {
        Some(prefix) if prefix.ends_with(['k', 'm', 'g', 't', 'p']) => format!("{prefix}ib"),
        _ => lower,
    };
    Byte::parse_str(&binary, true).ok().map(|byte| byte.as_u64())
}
