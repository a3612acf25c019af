//! Key package sync orchestration.
//!
//! One call to [`KeyPackageSyncTool::sync_key_files`] runs, strictly in order:
//!
//! ```text
//! reset (first run) → cleanup → day sync → metered check → hour sync → cleanup
//! ```
//!
//! Day and hour passes each bracket their delegate call with a `started`
//! and a `finished` update of their [`LastDownload`] record. If the delegate
//! fails or the call is cancelled, the record stays unfinished and the next
//! run force-syncs that granularity.

use crate::clock::Clock;
use crate::download::base::{DayPackageSync, HourPackageSync, SyncResult};
use crate::error::SyncError;
use crate::location::LocationCatalog;
use crate::network::NetworkStateProvider;
use crate::storage::{CachedKey, CachedKeyInfo, KeyCacheStore, LastDownload, SyncGranularity, SyncSettings};
use std::future::Future;
use std::sync::Arc;

/// Consolidated outcome of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncKeyFilesResult {
    /// Reserved for delta-only consumers; always empty
    pub delta_keys: Vec<CachedKey>,
    /// New day packages followed by new hour packages
    pub new_keys: Vec<CachedKey>,
    pub was_day_sync_successful: bool,
}

/// Coordinates day and hour package sync for all catalog locations.
pub struct KeyPackageSyncTool {
    catalog: LocationCatalog,
    key_cache: Arc<dyn KeyCacheStore>,
    day_sync: Arc<dyn DayPackageSync>,
    hour_sync: Arc<dyn HourPackageSync>,
    settings: Arc<SyncSettings>,
    clock: Arc<dyn Clock>,
    network: Arc<dyn NetworkStateProvider>,
}

impl KeyPackageSyncTool {
    pub fn new(
        catalog: LocationCatalog,
        key_cache: Arc<dyn KeyCacheStore>,
        day_sync: Arc<dyn DayPackageSync>,
        hour_sync: Arc<dyn HourPackageSync>,
        settings: Arc<SyncSettings>,
        clock: Arc<dyn Clock>,
        network: Arc<dyn NetworkStateProvider>,
    ) -> Self {
        Self {
            catalog,
            key_cache,
            day_sync,
            hour_sync,
            settings,
            clock,
            network,
        }
    }

    /// A missing or unsuccessful last attempt forces a full re-validation.
    pub fn requires_force_sync(last_download: Option<&LastDownload>) -> bool {
        last_download.map_or(true, |record| !record.is_successful())
    }

    /// Run one complete sync. At most one call may be in flight at a time.
    pub async fn sync_key_files(&self) -> Result<SyncKeyFilesResult, SyncError> {
        let locations = self.catalog.locations();

        if self.settings.last_download_days().is_none()
            || self.settings.last_download_hours().is_none()
        {
            tracing::info!("No previous download records, resetting sync state");
            self.settings
                .reset_all(Some(LastDownload::started(self.clock.now_utc())))?;
        }

        self.clean_up_stale_locations().await?;

        let day_result = self
            .sync_granularity(SyncGranularity::Day, |force| {
                self.day_sync.sync_missing_day_packages(locations, force)
            })
            .await?;

        let network_state = self.network.network_state().await;
        let hour_result = if network_state.is_metered_connection {
            tracing::info!("Metered connection, skipping hour sync");
            None
        } else {
            let result = self
                .sync_granularity(SyncGranularity::Hour, |force| {
                    self.hour_sync.sync_missing_hour_packages(locations, force)
                })
                .await?;
            Some(result)
        };

        self.clean_up_stale_locations().await?;

        let was_day_sync_successful = day_result.successful;
        let mut new_keys = day_result.new_packages;
        if let Some(hour_result) = hour_result {
            new_keys.extend(hour_result.new_packages);
        }

        tracing::info!(
            new_keys = new_keys.len(),
            was_day_sync_successful,
            "Key package sync finished"
        );

        Ok(SyncKeyFilesResult {
            delta_keys: Vec::new(),
            new_keys,
            was_day_sync_successful,
        })
    }

    async fn sync_granularity<F, Fut>(
        &self,
        granularity: SyncGranularity,
        sync: F,
    ) -> Result<SyncResult, SyncError>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<SyncResult, SyncError>>,
    {
        let last_download = self.settings.last_download(granularity);
        let force_sync = Self::requires_force_sync(last_download.as_ref());
        tracing::debug!(?granularity, ?last_download, force_sync, "Starting sync pass");

        let started_at = self.clock.now_utc();
        self.settings
            .update_last_download(granularity, |_| Some(LastDownload::started(started_at)))?;

        let result = sync(force_sync).await?;

        let finished_at = self.clock.now_utc();
        self.settings.update_last_download(granularity, |current| {
            let record = current.unwrap_or_else(|| LastDownload::started(started_at));
            Some(record.finished(finished_at, result.successful))
        })?;

        Ok(result)
    }

    /// Delete packages of locations that are no longer synced, and entries whose file is gone.
    async fn clean_up_stale_locations(&self) -> Result<(), SyncError> {
        let stale: Vec<CachedKeyInfo> = self
            .key_cache
            .get_all_cached_keys()
            .await?
            .into_iter()
            .filter(|key| !self.catalog.contains(&key.info.location) || !key.artifact_exists())
            .map(|key| key.info)
            .collect();

        if !stale.is_empty() {
            let ids: Vec<&str> = stale.iter().map(|info| info.id.as_str()).collect();
            tracing::info!(?ids, "Deleting stale cached packages");
            self.key_cache.delete_info_and_file(&stale).await?;
        }
        Ok(())
    }
}
