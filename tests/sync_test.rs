//! Integration tests for the key package sync orchestration

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use exposure_agent::clock::FixedClock;
use exposure_agent::download::{DayPackageSync, HourPackageSync, KeyPackageSyncTool, SyncResult};
use exposure_agent::error::SyncError;
use exposure_agent::location::{LocationCatalog, LocationCode};
use exposure_agent::network::StaticNetworkState;
use exposure_agent::storage::{
    CacheType, CachedKey, FileKeyCache, KeyCacheStore, LastDownload, SyncGranularity, SyncSettings,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 10, 30, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 2, d).unwrap()
}

#[derive(Clone, Copy)]
enum Outcome {
    Success,
    Failure,
    Error,
}

/// What a delegate saw when it was called.
#[derive(Debug)]
struct Call {
    force_sync: bool,
    record: Option<LastDownload>,
    cached_ids: Vec<String>,
}

struct FakeSync {
    granularity: SyncGranularity,
    outcome: Outcome,
    new_packages: Vec<CachedKey>,
    /// Location for which an entry without artifact is created during the call
    leaves_broken_entry: Option<LocationCode>,
    settings: Arc<SyncSettings>,
    cache: Arc<FileKeyCache>,
    calls: Mutex<Vec<Call>>,
    order: Arc<Mutex<Vec<SyncGranularity>>>,
}

impl FakeSync {
    async fn run(&self, force_sync: bool) -> Result<SyncResult, SyncError> {
        let cached_ids = self
            .cache
            .get_all_cached_keys()
            .await?
            .into_iter()
            .map(|key| key.info.id)
            .collect();
        self.calls.lock().unwrap().push(Call {
            force_sync,
            record: self.settings.last_download(self.granularity),
            cached_ids,
        });
        self.order.lock().unwrap().push(self.granularity);

        if let Some(ref location) = self.leaves_broken_entry {
            self.cache
                .create_cache_entry(location, day(27), None, CacheType::LocationDay)
                .await?;
        }

        match self.outcome {
            Outcome::Success => Ok(SyncResult::success(self.new_packages.clone())),
            Outcome::Failure => Ok(SyncResult::failure(Vec::new())),
            Outcome::Error => Err(SyncError::Settings("disk full".to_string())),
        }
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DayPackageSync for FakeSync {
    async fn sync_missing_day_packages(
        &self,
        _locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        self.run(force_sync).await
    }
}

#[async_trait]
impl HourPackageSync for FakeSync {
    async fn sync_missing_hour_packages(
        &self,
        _locations: &[LocationCode],
        force_sync: bool,
    ) -> Result<SyncResult, SyncError> {
        self.run(force_sync).await
    }
}

struct Harness {
    dir: TempDir,
    cache: Arc<FileKeyCache>,
    settings: Arc<SyncSettings>,
    clock: Arc<FixedClock>,
    order: Arc<Mutex<Vec<SyncGranularity>>>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(now()));
        let cache = Arc::new(FileKeyCache::open(dir.path(), clock.clone()).await.unwrap());
        Self {
            dir,
            cache,
            settings: Arc::new(SyncSettings::new()),
            clock,
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn fake(&self, granularity: SyncGranularity, outcome: Outcome) -> FakeSync {
        FakeSync {
            granularity,
            outcome,
            new_packages: Vec::new(),
            leaves_broken_entry: None,
            settings: self.settings.clone(),
            cache: self.cache.clone(),
            calls: Mutex::new(Vec::new()),
            order: self.order.clone(),
        }
    }

    fn tool(&self, day: &Arc<FakeSync>, hour: &Arc<FakeSync>, metered: bool) -> KeyPackageSyncTool {
        KeyPackageSyncTool::new(
            LocationCatalog::default(),
            self.cache.clone(),
            day.clone(),
            hour.clone(),
            self.settings.clone(),
            self.clock.clone(),
            Arc::new(StaticNetworkState::metered(metered)),
        )
    }

    fn set_records(&self, day_ok: bool, hour_ok: bool) {
        let earlier = now() - chrono::Duration::hours(2);
        let record = |ok| Some(LastDownload::started(earlier).finished(earlier, ok));
        self.settings
            .update_last_download(SyncGranularity::Day, |_| record(day_ok))
            .unwrap();
        self.settings
            .update_last_download(SyncGranularity::Hour, |_| record(hour_ok))
            .unwrap();
    }

    /// A completed entry with an artifact on disk.
    async fn cached_package(&self, location: &str, day: NaiveDate) -> CachedKey {
        let key = self
            .cache
            .create_cache_entry(&LocationCode::new(location), day, None, CacheType::LocationDay)
            .await
            .unwrap();
        std::fs::write(&key.path, b"PK").unwrap();
        let info = self.cache.mark_key_complete(&key.info, None).await.unwrap();
        CachedKey::new(info, key.path)
    }

    async fn cached_ids(&self) -> Vec<String> {
        self.cache
            .get_all_cached_keys()
            .await
            .unwrap()
            .into_iter()
            .map(|key| key.info.id)
            .collect()
    }
}

#[tokio::test]
async fn test_successful_records_sync_day_then_hour_without_force() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    let result = h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(result.was_day_sync_successful);
    assert_eq!(
        *h.order.lock().unwrap(),
        vec![SyncGranularity::Day, SyncGranularity::Hour]
    );
    assert!(!day_sync.calls()[0].force_sync);
    assert!(!hour_sync.calls()[0].force_sync);

    for record in [h.settings.last_download_days(), h.settings.last_download_hours()] {
        let record = record.unwrap();
        assert_eq!(record.started_at, now());
        assert_eq!(record.finished_at, Some(now()));
        assert!(record.is_successful());
    }
}

#[tokio::test]
async fn test_record_is_started_while_delegate_runs() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    for calls in [day_sync.calls(), hour_sync.calls()] {
        let record = calls[0].record.clone().unwrap();
        assert_eq!(record, LastDownload::started(now()));
    }
}

#[tokio::test]
async fn test_missing_records_reset_and_force_both() {
    let h = Harness::new().await;
    // Only one of the two records exists; both get reset.
    h.settings
        .update_last_download(SyncGranularity::Day, |_| {
            Some(LastDownload::started(now()).finished(now(), true))
        })
        .unwrap();
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(day_sync.calls()[0].force_sync);
    assert!(hour_sync.calls()[0].force_sync);
    assert!(h.settings.last_download_days().unwrap().is_successful());
    assert!(h.settings.last_download_hours().unwrap().is_successful());
}

#[tokio::test]
async fn test_damaged_settings_file_forces_both() {
    let mut h = Harness::new().await;
    let path = h.dir.path().join("download_settings.json");
    std::fs::write(&path, "{\"lastDownloadDays\": {\"startedAt\": \"2021-").unwrap();
    h.settings = Arc::new(SyncSettings::with_persistence(path.clone()).unwrap());
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(day_sync.calls()[0].force_sync);
    assert!(hour_sync.calls()[0].force_sync);
    let reloaded = SyncSettings::with_persistence(path).unwrap();
    assert!(reloaded.last_download_days().unwrap().is_successful());
    assert!(reloaded.last_download_hours().unwrap().is_successful());
}

#[tokio::test]
async fn test_failed_records_force_their_granularity() {
    let h = Harness::new().await;
    h.set_records(false, true);
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(day_sync.calls()[0].force_sync);
    assert!(!hour_sync.calls()[0].force_sync);
}

#[tokio::test]
async fn test_day_failure_still_runs_hour_sync() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Failure));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    let result = h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(!result.was_day_sync_successful);
    assert_eq!(hour_sync.calls().len(), 1);

    let day_record = h.settings.last_download_days().unwrap();
    assert_eq!(day_record.finished_at, Some(now()));
    assert_eq!(day_record.successful, Some(false));
    assert!(h.settings.last_download_hours().unwrap().is_successful());

    // The failed day pass is forced on the next run.
    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();
    assert!(day_sync.calls()[1].force_sync);
    assert!(!hour_sync.calls()[1].force_sync);
}

#[tokio::test]
async fn test_metered_connection_skips_hour_sync() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let hour_record_before = h.settings.last_download_hours();
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    let result = h.tool(&day_sync, &hour_sync, true).sync_key_files().await.unwrap();

    assert!(result.was_day_sync_successful);
    assert_eq!(day_sync.calls().len(), 1);
    assert!(hour_sync.calls().is_empty());
    assert_eq!(h.settings.last_download_hours(), hour_record_before);
}

#[tokio::test]
async fn test_new_keys_are_day_then_hour_and_delta_is_empty() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let day_key = h.cached_package("EUR", day(27)).await;
    let hour_key = h.cached_package("EUR", day(28)).await;

    let mut day_sync = h.fake(SyncGranularity::Day, Outcome::Success);
    day_sync.new_packages = vec![day_key.clone()];
    let mut hour_sync = h.fake(SyncGranularity::Hour, Outcome::Success);
    hour_sync.new_packages = vec![hour_key.clone()];

    let result = h
        .tool(&Arc::new(day_sync), &Arc::new(hour_sync), false)
        .sync_key_files()
        .await
        .unwrap();

    assert_eq!(result.new_keys, vec![day_key, hour_key]);
    assert!(result.delta_keys.is_empty());
}

#[tokio::test]
async fn test_stale_locations_removed_before_sync() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let kept = h.cached_package("EUR", day(27)).await;
    let stale = h.cached_package("DE", day(27)).await;
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    let seen = &day_sync.calls()[0].cached_ids;
    assert!(seen.contains(&kept.info.id));
    assert!(!seen.contains(&stale.info.id));
    assert!(!stale.path.exists());
    assert_eq!(h.cached_ids().await, vec![kept.info.id]);
}

#[tokio::test]
async fn test_stale_entries_removed_after_sync() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let mut day_sync = h.fake(SyncGranularity::Day, Outcome::Success);
    day_sync.leaves_broken_entry = Some(LocationCode::new("NL"));
    let day_sync = Arc::new(day_sync);
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    // Still there while the hour pass runs, gone once the run is over.
    assert_eq!(hour_sync.calls()[0].cached_ids, vec!["day_NL_2021-02-27".to_string()]);
    assert!(h.cached_ids().await.is_empty());
}

#[tokio::test]
async fn test_entry_without_artifact_is_removed() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let key = h.cached_package("EUR", day(26)).await;
    std::fs::remove_file(&key.path).unwrap();
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(day_sync.calls()[0].cached_ids.is_empty());
}

#[tokio::test]
async fn test_delegate_error_leaves_record_unfinished() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Error));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    let result = h.tool(&day_sync, &hour_sync, false).sync_key_files().await;

    assert!(matches!(result, Err(SyncError::Settings(_))));
    assert!(hour_sync.calls().is_empty());
    assert_eq!(
        h.settings.last_download_days(),
        Some(LastDownload::started(now()))
    );

    // An unfinished record forces the next run.
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();
    assert!(day_sync.calls()[0].force_sync);
    assert!(!hour_sync.calls()[0].force_sync);
}

#[tokio::test]
async fn test_settings_changes_are_observable() {
    let h = Harness::new().await;
    h.set_records(true, true);
    let mut rx = h.settings.subscribe();
    rx.borrow_and_update();
    let day_sync = Arc::new(h.fake(SyncGranularity::Day, Outcome::Success));
    let hour_sync = Arc::new(h.fake(SyncGranularity::Hour, Outcome::Success));

    h.tool(&day_sync, &hour_sync, false).sync_key_files().await.unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), h.settings.state());
}
