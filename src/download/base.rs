//! Shared plumbing for the day and hour package sync tools.

use crate::download::tool::KeyDownloadTool;
use crate::error::SyncError;
use crate::location::LocationCode;
use crate::storage::{CacheType, CachedKey, CachedKeyInfo, KeyCacheStore};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;

/// Outcome of one granularity's sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// False if any required download or index lookup ultimately failed
    pub successful: bool,
    /// Packages obtained during this pass
    pub new_packages: Vec<CachedKey>,
}

impl SyncResult {
    pub fn success(new_packages: Vec<CachedKey>) -> Self {
        Self {
            successful: true,
            new_packages,
        }
    }

    pub fn failure(new_packages: Vec<CachedKey>) -> Self {
        Self {
            successful: false,
            new_packages,
        }
    }

    /// Fold another location's result into this one.
    pub fn merge(&mut self, other: SyncResult) {
        self.successful &= other.successful;
        self.new_packages.extend(other.new_packages);
    }
}

impl Default for SyncResult {
    fn default() -> Self {
        Self::success(Vec::new())
    }
}

/// Downloads day packages that are missing locally.
#[async_trait]
pub trait DayPackageSync: Send + Sync {
    async fn sync_missing_day_packages(
        &self,
        locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError>;
}

/// Downloads hour packages that are missing locally.
#[async_trait]
pub trait HourPackageSync: Send + Sync {
    async fn sync_missing_hour_packages(
        &self,
        locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError>;
}

/// Cache bookkeeping shared by both package sync tools.
pub struct BasePackageSyncTool {
    pub(crate) cache: Arc<dyn KeyCacheStore>,
    pub(crate) downloader: Arc<KeyDownloadTool>,
}

impl BasePackageSyncTool {
    pub fn new(cache: Arc<dyn KeyCacheStore>, downloader: Arc<KeyDownloadTool>) -> Self {
        Self { cache, downloader }
    }

    /// Completed entries with an existing artifact.
    ///
    /// Incomplete entries (interrupted downloads) and entries whose file has
    /// vanished are deleted so they get downloaded again.
    pub async fn get_completed_cached_keys(
        &self,
        location: &LocationCode,
        cache_type: CacheType,
    ) -> Result<Vec<CachedKey>, SyncError> {
        let (completed, broken): (Vec<CachedKey>, Vec<CachedKey>) = self
            .cache
            .get_entries_for_type(location, cache_type)
            .await?
            .into_iter()
            .partition(|key| key.info.is_download_complete && key.artifact_exists());

        if !broken.is_empty() {
            tracing::warn!(
                %location,
                ?cache_type,
                count = broken.len(),
                "Deleting incomplete cache entries"
            );
            let infos: Vec<CachedKeyInfo> = broken.into_iter().map(|key| key.info).collect();
            self.cache.delete_info_and_file(&infos).await?;
        }

        Ok(completed)
    }

    /// Remove packages the server no longer publishes.
    pub async fn revoke_cached_keys(&self, stale: Vec<CachedKeyInfo>) -> Result<(), SyncError> {
        if stale.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = stale.iter().map(|info| info.id.as_str()).collect();
        tracing::info!(?ids, "Deleting packages no longer published");
        self.cache.delete_info_and_file(&stale).await
    }

    /// Create and download an entry for each missing package.
    pub async fn download_missing(
        &self,
        location: &LocationCode,
        missing: Vec<(NaiveDate, Option<NaiveTime>)>,
        cache_type: CacheType,
    ) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult::default();
        if missing.is_empty() {
            return Ok(result);
        }
        tracing::info!(%location, ?cache_type, count = missing.len(), "Downloading missing packages");

        for (day, hour) in missing {
            let key = self
                .cache
                .create_cache_entry(location, day, hour, cache_type)
                .await?;
            match self.downloader.download_key_file(key).await? {
                Some(key) => result.new_packages.push(key),
                None => result.successful = false,
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut result = SyncResult::default();
        result.merge(SyncResult::failure(Vec::new()));
        result.merge(SyncResult::success(Vec::new()));
        assert!(!result.successful);
    }
}
