//! Day package sync.

use crate::clock::Clock;
use crate::download::base::{BasePackageSyncTool, DayPackageSync, SyncResult};
use crate::download::tool::with_retry;
use crate::error::SyncError;
use crate::location::LocationCode;
use crate::storage::{CacheType, CachedKey, CachedKeyInfo};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Keeps the cached day packages in line with the server's day index.
pub struct DayPackageSyncTool {
    base: BasePackageSyncTool,
    clock: Arc<dyn Clock>,
}

impl DayPackageSyncTool {
    pub fn new(base: BasePackageSyncTool, clock: Arc<dyn Clock>) -> Self {
        Self { base, clock }
    }

    async fn sync_location(
        &self,
        location: &LocationCode,
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        let today = self.clock.now_utc().date_naive();
        let cached = self
            .base
            .get_completed_cached_keys(location, CacheType::LocationDay)
            .await?;

        if !force_sync && !expect_new_day_packages(&cached, today) {
            tracing::debug!(%location, "Day packages are up to date");
            return Ok(SyncResult::default());
        }

        let downloader = &self.base.downloader;
        let available = match with_retry(downloader.retry_policy(), "day index", || {
            downloader.server().get_day_index(location)
        })
        .await
        {
            Ok(days) => days,
            Err(e) => {
                tracing::error!(%location, error = %e, "Failed to fetch day index");
                return Ok(SyncResult::failure(Vec::new()));
            }
        };

        let stale: Vec<CachedKeyInfo> = cached
            .iter()
            .filter(|key| !available.contains(&key.info.day))
            .map(|key| key.info.clone())
            .collect();
        self.base.revoke_cached_keys(stale).await?;

        let missing: Vec<_> = available
            .iter()
            .filter(|day| !cached.iter().any(|key| key.info.day == **day))
            .map(|day| (*day, None))
            .collect();

        self.base
            .download_missing(location, missing, CacheType::LocationDay)
            .await
    }
}

/// A new day package appears once per day; if yesterday's is cached there is nothing to fetch.
fn expect_new_day_packages(cached: &[CachedKey], today: NaiveDate) -> bool {
    let Some(yesterday) = today.pred_opt() else {
        return true;
    };
    match cached.iter().map(|key| key.info.day).max() {
        Some(latest) => latest < yesterday,
        None => true,
    }
}

#[async_trait]
impl DayPackageSync for DayPackageSyncTool {
    async fn sync_missing_day_packages(
        &self,
        locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        tracing::info!(?locations, force_sync, "Syncing day packages");

        let mut result = SyncResult::default();
        for location in locations {
            result.merge(self.sync_location(location, force_sync).await?);
        }

        tracing::info!(
            successful = result.successful,
            new_packages = result.new_packages.len(),
            "Day sync finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CachedKeyInfo;
    use chrono::Utc;
    use std::path::PathBuf;

    fn key_for(day: NaiveDate) -> CachedKey {
        CachedKey::new(
            CachedKeyInfo::new(
                LocationCode::new("EUR"),
                day,
                None,
                CacheType::LocationDay,
                Utc::now(),
            ),
            PathBuf::from("unused"),
        )
    }

    #[test]
    fn test_expect_new_day_packages() {
        let today = NaiveDate::from_ymd_opt(2021, 3, 10).unwrap();
        assert!(expect_new_day_packages(&[], today));
        assert!(expect_new_day_packages(
            &[key_for(NaiveDate::from_ymd_opt(2021, 3, 8).unwrap())],
            today
        ));
        assert!(!expect_new_day_packages(
            &[key_for(NaiveDate::from_ymd_opt(2021, 3, 9).unwrap())],
            today
        ));
    }
}
