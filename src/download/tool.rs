//! Package download with retry on transient network errors.

use crate::download::server::KeyServer;
use crate::error::{DownloadError, SyncError};
use crate::storage::{CachedKey, KeyCacheStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub initial_backoff: Duration,
    /// Upper bound for the delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries and no delay.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, DownloadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0;
    let mut backoff = policy.initial_backoff;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    what,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Downloads the artifact behind a freshly created cache entry.
pub struct KeyDownloadTool {
    server: Arc<dyn KeyServer>,
    cache: Arc<dyn KeyCacheStore>,
    retry: RetryPolicy,
}

impl KeyDownloadTool {
    pub fn new(server: Arc<dyn KeyServer>, cache: Arc<dyn KeyCacheStore>, retry: RetryPolicy) -> Self {
        Self {
            server,
            cache,
            retry,
        }
    }

    pub fn server(&self) -> &Arc<dyn KeyServer> {
        &self.server
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Download a package into its cache entry.
    ///
    /// Returns the completed key, or `None` if the download failed after all
    /// retries; in that case the incomplete entry is removed again. Local I/O
    /// failures are returned as errors.
    pub async fn download_key_file(&self, key: CachedKey) -> Result<Option<CachedKey>, SyncError> {
        let info = &key.info;
        let result = with_retry(&self.retry, &info.id, || {
            self.server
                .download_key_file(&info.location, info.day, info.hour, &key.path)
        })
        .await;

        match result {
            Ok(download) => {
                let completed = self.cache.mark_key_complete(info, download.etag).await?;
                tracing::debug!(id = %completed.id, "Download complete");
                Ok(Some(CachedKey::new(completed, key.path)))
            }
            Err(DownloadError::Io(e)) => {
                self.cache.delete_info_and_file(&[info.clone()]).await?;
                Err(SyncError::Io(e))
            }
            Err(e) => {
                tracing::error!(id = %info.id, error = %e, "Download failed");
                self.cache.delete_info_and_file(&[info.clone()]).await?;
                Ok(None)
            }
        }
    }
}
