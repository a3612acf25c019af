//! Hour package sync for the current day.
//!
//! Hour packages bridge the gap until today's day package is published.
//! Hour packages of earlier days are superseded by day packages and removed.

use crate::clock::Clock;
use crate::download::base::{BasePackageSyncTool, HourPackageSync, SyncResult};
use crate::download::tool::with_retry;
use crate::error::SyncError;
use crate::location::LocationCode;
use crate::storage::{CacheType, CachedKey, CachedKeyInfo};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::sync::Arc;

pub struct HourPackageSyncTool {
    base: BasePackageSyncTool,
    clock: Arc<dyn Clock>,
}

impl HourPackageSyncTool {
    pub fn new(base: BasePackageSyncTool, clock: Arc<dyn Clock>) -> Self {
        Self { base, clock }
    }

    async fn sync_location(
        &self,
        location: &LocationCode,
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        let now = self.clock.now_utc();
        let today = now.date_naive();

        let cached = self
            .base
            .get_completed_cached_keys(location, CacheType::LocationHour)
            .await?;
        let (today_hours, earlier_hours): (Vec<CachedKey>, Vec<CachedKey>) =
            cached.into_iter().partition(|key| key.info.day == today);

        if !earlier_hours.is_empty() {
            tracing::debug!(%location, count = earlier_hours.len(), "Removing hour packages of past days");
            self.base
                .revoke_cached_keys(earlier_hours.into_iter().map(|key| key.info).collect())
                .await?;
        }

        let today_day_package = self
            .base
            .get_completed_cached_keys(location, CacheType::LocationDay)
            .await?
            .into_iter()
            .any(|key| key.info.day == today);
        if today_day_package {
            tracing::debug!(%location, "Day package for today is cached, hours not needed");
            self.base
                .revoke_cached_keys(today_hours.into_iter().map(|key| key.info).collect())
                .await?;
            return Ok(SyncResult::default());
        }

        if !force_sync && !expect_new_hour_packages(&today_hours, now) {
            tracing::debug!(%location, "Hour packages are up to date");
            return Ok(SyncResult::default());
        }

        let downloader = &self.base.downloader;
        let available = match with_retry(downloader.retry_policy(), "hour index", || {
            downloader.server().get_hour_index(location, today)
        })
        .await
        {
            Ok(hours) => hours,
            Err(e) => {
                tracing::error!(%location, error = %e, "Failed to fetch hour index");
                return Ok(SyncResult::failure(Vec::new()));
            }
        };

        let stale: Vec<CachedKeyInfo> = today_hours
            .iter()
            .filter(|key| key.info.hour.map_or(true, |hour| !available.contains(&hour)))
            .map(|key| key.info.clone())
            .collect();
        self.base.revoke_cached_keys(stale).await?;

        let missing: Vec<_> = available
            .iter()
            .filter(|hour| !today_hours.iter().any(|key| key.info.hour == Some(**hour)))
            .map(|hour| (today, Some(*hour)))
            .collect();

        self.base
            .download_missing(location, missing, CacheType::LocationHour)
            .await
    }
}

/// The server publishes one package per completed hour.
fn expect_new_hour_packages(cached: &[CachedKey], now: DateTime<Utc>) -> bool {
    let previous_hour = truncate_to_hour(now.naive_utc()) - Duration::hours(1);
    let latest = cached
        .iter()
        .filter_map(|key| key.info.hour.map(|hour| key.info.day.and_time(hour)))
        .max();
    match latest {
        Some(latest) => latest < previous_hour,
        None => true,
    }
}

fn truncate_to_hour(time: NaiveDateTime) -> NaiveDateTime {
    let hour = NaiveTime::from_hms_opt(time.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
    time.date().and_time(hour)
}

#[async_trait]
impl HourPackageSync for HourPackageSyncTool {
    async fn sync_missing_hour_packages(
        &self,
        locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        tracing::info!(?locations, force_sync, "Syncing hour packages");

        let mut result = SyncResult::default();
        for location in locations {
            result.merge(self.sync_location(location, force_sync).await?);
        }

        tracing::info!(
            successful = result.successful,
            new_packages = result.new_packages.len(),
            "Hour sync finished"
        );
        Ok(result)
    }
}
