//! Remote key package index and download endpoints.
//!
//! The distribution server publishes, per location, an index of available
//! day packages and, per day, an index of available hour packages:
//!
//! ```text
//! {base}/version/v1/diagnosis-keys/country/{loc}/date               -> ["2021-02-27", ...]
//! {base}/version/v1/diagnosis-keys/country/{loc}/date/{day}          -> package
//! {base}/version/v1/diagnosis-keys/country/{loc}/date/{day}/hour     -> [0, 1, ...]
//! {base}/version/v1/diagnosis-keys/country/{loc}/date/{day}/hour/{h} -> package
//! ```

use crate::error::DownloadError;
use crate::location::LocationCode;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::path::Path;

/// Metadata returned with a downloaded package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadInfo {
    /// Server-provided entity tag, stored as the package checksum
    pub etag: Option<String>,
}

/// Remote package index capability.
#[async_trait]
pub trait KeyServer: Send + Sync {
    /// Days for which a day package is available.
    async fn get_day_index(&self, location: &LocationCode) -> Result<Vec<NaiveDate>, DownloadError>;

    /// Hours of `day` for which an hour package is available.
    async fn get_hour_index(
        &self,
        location: &LocationCode,
        day: NaiveDate,
    ) -> Result<Vec<NaiveTime>, DownloadError>;

    /// Download one package and write it to `save_to`.
    async fn download_key_file(
        &self,
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        save_to: &Path,
    ) -> Result<DownloadInfo, DownloadError>;
}

/// Parse a day index body (`["2021-02-27", ...]`).
pub fn parse_day_index(body: &str) -> Result<Vec<NaiveDate>, DownloadError> {
    let raw: Vec<String> =
        serde_json::from_str(body).map_err(|e| DownloadError::InvalidResponse(e.to_string()))?;
    raw.iter()
        .map(|day| {
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map_err(|e| DownloadError::InvalidResponse(format!("Invalid day '{day}': {e}")))
        })
        .collect()
}

/// Parse an hour index body (`[0, 1, ...]`).
pub fn parse_hour_index(body: &str) -> Result<Vec<NaiveTime>, DownloadError> {
    let raw: Vec<u32> =
        serde_json::from_str(body).map_err(|e| DownloadError::InvalidResponse(e.to_string()))?;
    raw.iter()
        .map(|&hour| {
            NaiveTime::from_hms_opt(hour, 0, 0)
                .ok_or_else(|| DownloadError::InvalidResponse(format!("Invalid hour {hour}")))
        })
        .collect()
}

/// Key server configuration.
#[derive(Debug, Clone)]
pub struct KeyServerConfig {
    /// Base URL of the distribution server
    pub base_url: String,
    /// Per-request timeout
    pub timeout: std::time::Duration,
}

impl KeyServerConfig {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn location_url(&self, location: &LocationCode) -> String {
        format!(
            "{}/version/v1/diagnosis-keys/country/{}/date",
            self.base_url, location
        )
    }

    /// URL of the day index.
    pub fn day_index_url(&self, location: &LocationCode) -> String {
        self.location_url(location)
    }

    /// URL of the hour index for a day.
    pub fn hour_index_url(&self, location: &LocationCode, day: NaiveDate) -> String {
        format!("{}/{}/hour", self.location_url(location), day.format("%Y-%m-%d"))
    }

    /// URL of a day or hour package.
    pub fn package_url(
        &self,
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
    ) -> String {
        use chrono::Timelike;
        match hour {
            Some(hour) => format!("{}/{}", self.hour_index_url(location, day), hour.hour()),
            None => format!("{}/{}", self.location_url(location), day.format("%Y-%m-%d")),
        }
    }
}

/// HTTP client for the key distribution server.
#[cfg(feature = "http")]
pub struct HttpKeyServer {
    config: KeyServerConfig,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpKeyServer {
    /// Create a new HTTP key server client.
    pub fn new(config: KeyServerConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("exposure-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn map_error(e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout(e.to_string())
        } else {
            DownloadError::Network(e.to_string())
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        tracing::debug!(url, "GET");
        let response = self.client.get(url).send().await.map_err(Self::map_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DownloadError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl KeyServer for HttpKeyServer {
    async fn get_day_index(&self, location: &LocationCode) -> Result<Vec<NaiveDate>, DownloadError> {
        let body = self
            .get(&self.config.day_index_url(location))
            .await?
            .text()
            .await
            .map_err(Self::map_error)?;
        parse_day_index(&body)
    }

    async fn get_hour_index(
        &self,
        location: &LocationCode,
        day: NaiveDate,
    ) -> Result<Vec<NaiveTime>, DownloadError> {
        let body = self
            .get(&self.config.hour_index_url(location, day))
            .await?
            .text()
            .await
            .map_err(Self::map_error)?;
        parse_hour_index(&body)
    }

    async fn download_key_file(
        &self,
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        save_to: &Path,
    ) -> Result<DownloadInfo, DownloadError> {
        let response = self
            .get(&self.config.package_url(location, day, hour))
            .await?;

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        let bytes = response.bytes().await.map_err(Self::map_error)?;
        tokio::fs::write(save_to, &bytes).await?;

        tracing::debug!(path = ?save_to, size = bytes.len(), "Package written");
        Ok(DownloadInfo { etag })
    }
}
