//! Package registry client
//!
//! The crawl pipeline only needs three capabilities per package name:
//! raw metadata, the daily download series, and the dependent-name list.
//! The HTTP implementation talks to an npm-compatible registry; tests
//! substitute in-memory fakes through the [`RegistryClient`] trait.

use crate::aggregate::DownloadSample;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug)]
pub enum RegistryError {
    /// The registry does not know the package.
    NotFound(String),
    /// Transport failure or non-success status.
    Unavailable(String),
    /// The response body did not decode into the expected shape.
    Malformed(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotFound(name) => write!(f, "Package not found: {}", name),
            RegistryError::Unavailable(msg) => write!(f, "Registry unavailable: {}", msg),
            RegistryError::Malformed(msg) => write!(f, "Malformed registry response: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Read-only view of the package registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Raw metadata payload for a package (versions, time, users, ...).
    async fn fetch_metadata(&self, name: &str) -> Result<Value, RegistryError>;

    /// Daily download counts, oldest first.
    async fn fetch_downloads(&self, name: &str) -> Result<Vec<DownloadSample>, RegistryError>;

    /// Names of packages that declare `name` as a dependency.
    async fn fetch_dependents(&self, name: &str) -> Result<Vec<String>, RegistryError>;
}

/// npm downloads-range API payload
#[derive(Debug, Deserialize)]
struct DownloadsRangeResponse {
    downloads: Vec<DownloadsRangeDay>,
}

#[derive(Debug, Deserialize)]
struct DownloadsRangeDay {
    day: NaiveDate,
    downloads: u64,
}

/// CouchDB `dependedUpon` view payload
#[derive(Debug, Deserialize)]
struct DependedUponResponse {
    rows: Vec<DependedUponRow>,
}

#[derive(Debug, Deserialize)]
struct DependedUponRow {
    key: Vec<Value>,
}

/// HTTP client for an npm-compatible registry
pub struct HttpRegistryClient {
    client: reqwest::Client,
    registry_url: String,
    downloads_url: String,
    /// How far back the download series is requested, derived from the
    /// configured year-bucket count.
    history_days: i64,
}

impl HttpRegistryClient {
    pub fn new(
        registry_url: &str,
        downloads_url: &str,
        timeout_secs: u64,
        history_years: usize,
    ) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            registry_url: registry_url.trim_end_matches('/').to_string(),
            downloads_url: downloads_url.trim_end_matches('/').to_string(),
            history_days: history_years as i64 * 366,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        name: &str,
    ) -> Result<T, RegistryError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch_metadata(&self, name: &str) -> Result<Value, RegistryError> {
        let url = format!("{}/{}", self.registry_url, name);
        self.get_json(&url, name).await
    }

    async fn fetch_downloads(&self, name: &str) -> Result<Vec<DownloadSample>, RegistryError> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(self.history_days);
        let url = format!(
            "{}/downloads/range/{}:{}/{}",
            self.downloads_url, from, to, name
        );

        let payload: DownloadsRangeResponse = self.get_json(&url, name).await?;

        Ok(payload
            .downloads
            .into_iter()
            .map(|d| DownloadSample {
                day: d.day,
                value: d.downloads,
            })
            .collect())
    }

    async fn fetch_dependents(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        // CouchDB view keyed by [package, dependent]; group_level=2 gives
        // one row per dependent
        let url = format!(
            "{}/-/_view/dependedUpon?group_level=2&start_key=[\"{}\"]&end_key=[\"{}\",{{}}]",
            self.registry_url, name, name
        );

        let payload: DependedUponResponse = self.get_json(&url, name).await?;

        Ok(payload
            .rows
            .into_iter()
            .filter_map(|row| {
                row.key
                    .get(1)
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            })
            .collect())
    }
}
