//! Cached key package metadata and the file-backed key cache.
//!
//! The cache is the single owner of [`CachedKeyInfo`] records. Callers never
//! mutate a record directly; every transition goes through a
//! [`KeyCacheStore`] method so the `is_download_complete` and
//! `checked_for_exposures` flags stay consistent with the files on disk.

use crate::clock::Clock;
use crate::error::SyncError;
use crate::location::LocationCode;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Name of the index file inside the cache directory.
const INDEX_FILE: &str = "cache_index.json";

/// Granularity of a key package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheType {
    LocationDay,
    LocationHour,
}

impl CacheType {
    fn tag(self) -> &'static str {
        match self {
            CacheType::LocationDay => "day",
            CacheType::LocationHour => "hour",
        }
    }
}

/// Metadata for one downloaded (or downloading) key package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedKeyInfo {
    pub id: String,
    pub cache_type: CacheType,
    pub location: LocationCode,
    pub day: NaiveDate,
    pub hour: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub checksum: Option<String>,
    pub is_download_complete: bool,
    pub checked_for_exposures: bool,
}

impl CachedKeyInfo {
    /// Create a fresh, incomplete entry.
    pub fn new(
        location: LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        cache_type: CacheType,
        created_at: DateTime<Utc>,
    ) -> Self {
        // Hour packages are addressed by full hours only.
        let hour = hour.and_then(|h| NaiveTime::from_hms_opt(h.hour(), 0, 0));
        Self {
            id: Self::calc_id(&location, day, hour, cache_type),
            cache_type,
            location,
            day,
            hour,
            created_at,
            checksum: None,
            is_download_complete: false,
            checked_for_exposures: false,
        }
    }

    /// Stable identifier for a package, also used as its file name.
    pub fn calc_id(
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        cache_type: CacheType,
    ) -> String {
        match hour {
            Some(hour) => format!(
                "{}_{}_{}_{:02}",
                cache_type.tag(),
                location,
                day.format("%Y-%m-%d"),
                hour.hour()
            ),
            None => format!("{}_{}_{}", cache_type.tag(), location, day.format("%Y-%m-%d")),
        }
    }

    pub fn to_download_completed(&self, checksum: Option<String>) -> Self {
        Self {
            checksum,
            is_download_complete: true,
            ..self.clone()
        }
    }

    /// Exposure checks only ever flip this flag from false to true.
    pub fn to_checked_for_exposures(&self) -> Self {
        Self {
            checked_for_exposures: true,
            ..self.clone()
        }
    }
}

/// A cache entry paired with its on-disk artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
    pub info: CachedKeyInfo,
    pub path: PathBuf,
}

impl CachedKey {
    pub fn new(info: CachedKeyInfo, path: PathBuf) -> Self {
        Self { info, path }
    }

    pub fn artifact_exists(&self) -> bool {
        self.path.exists()
    }
}

/// Storage capability for key packages.
#[async_trait]
pub trait KeyCacheStore: Send + Sync {
    /// All known entries, complete or not.
    async fn get_all_cached_keys(&self) -> Result<Vec<CachedKey>, SyncError>;

    /// Entries for one location and granularity.
    async fn get_entries_for_type(
        &self,
        location: &LocationCode,
        cache_type: CacheType,
    ) -> Result<Vec<CachedKey>, SyncError> {
        Ok(self
            .get_all_cached_keys()
            .await?
            .into_iter()
            .filter(|key| &key.info.location == location && key.info.cache_type == cache_type)
            .collect())
    }

    /// Register a package before its download starts, replacing any existing entry.
    async fn create_cache_entry(
        &self,
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        cache_type: CacheType,
    ) -> Result<CachedKey, SyncError>;

    /// Mark a package as fully written.
    async fn mark_key_complete(
        &self,
        info: &CachedKeyInfo,
        checksum: Option<String>,
    ) -> Result<CachedKeyInfo, SyncError>;

    /// Mark packages as consumed by an exposure detection pass.
    async fn mark_keys_checked(&self, ids: &[String]) -> Result<(), SyncError>;

    /// Remove entries together with their artifacts.
    async fn delete_info_and_file(&self, infos: &[CachedKeyInfo]) -> Result<(), SyncError>;
}

/// Key cache backed by a directory of package files and a JSON index.
pub struct FileKeyCache {
    cache_dir: PathBuf,
    entries: Mutex<BTreeMap<String, CachedKeyInfo>>,
    clock: Arc<dyn Clock>,
}

impl FileKeyCache {
    /// Open (or create) a cache in the given directory.
    pub async fn open(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, SyncError> {
        let cache_dir = cache_dir.into();
        tokio::fs::create_dir_all(&cache_dir).await?;

        let index_path = cache_dir.join(INDEX_FILE);
        let entries: BTreeMap<String, CachedKeyInfo> = if index_path.exists() {
            let content = tokio::fs::read_to_string(&index_path).await?;
            let infos: Vec<CachedKeyInfo> =
                serde_json::from_str(&content).map_err(|e| SyncError::CorruptCache {
                    path: index_path.clone(),
                    message: e.to_string(),
                })?;
            infos.into_iter().map(|info| (info.id.clone(), info)).collect()
        } else {
            BTreeMap::new()
        };

        tracing::debug!(dir = ?cache_dir, entries = entries.len(), "Opened key cache");

        Ok(Self {
            cache_dir,
            entries: Mutex::new(entries),
            clock,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path_for(&self, info: &CachedKeyInfo) -> PathBuf {
        self.cache_dir.join(format!("{}.zip", info.id))
    }

    async fn persist(&self, entries: &BTreeMap<String, CachedKeyInfo>) -> Result<(), SyncError> {
        let index_path = self.cache_dir.join(INDEX_FILE);
        let infos: Vec<&CachedKeyInfo> = entries.values().collect();
        let json = serde_json::to_string_pretty(&infos).map_err(|e| SyncError::CorruptCache {
            path: index_path.clone(),
            message: e.to_string(),
        })?;

        // Write-then-rename so a crash never leaves a half-written index.
        let tmp_path = self.cache_dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &index_path).await?;
        Ok(())
    }

    async fn remove_artifact(path: &Path) -> Result<(), SyncError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyCacheStore for FileKeyCache {
    async fn get_all_cached_keys(&self) -> Result<Vec<CachedKey>, SyncError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .values()
            .map(|info| CachedKey::new(info.clone(), self.path_for(info)))
            .collect())
    }

    async fn create_cache_entry(
        &self,
        location: &LocationCode,
        day: NaiveDate,
        hour: Option<NaiveTime>,
        cache_type: CacheType,
    ) -> Result<CachedKey, SyncError> {
        let info = CachedKeyInfo::new(
            location.clone(),
            day,
            hour,
            cache_type,
            self.clock.now_utc(),
        );
        let path = self.path_for(&info);

        let mut entries = self.entries.lock().await;
        if entries.remove(&info.id).is_some() {
            tracing::warn!(id = %info.id, "Replacing existing cache entry");
        }
        Self::remove_artifact(&path).await?;

        entries.insert(info.id.clone(), info.clone());
        self.persist(&entries).await?;

        tracing::debug!(id = %info.id, "Created cache entry");
        Ok(CachedKey::new(info, path))
    }

    async fn mark_key_complete(
        &self,
        info: &CachedKeyInfo,
        checksum: Option<String>,
    ) -> Result<CachedKeyInfo, SyncError> {
        let mut entries = self.entries.lock().await;
        let updated = info.to_download_completed(checksum);
        entries.insert(updated.id.clone(), updated.clone());
        self.persist(&entries).await?;
        Ok(updated)
    }

    async fn mark_keys_checked(&self, ids: &[String]) -> Result<(), SyncError> {
        let mut entries = self.entries.lock().await;
        for id in ids {
            if let Some(info) = entries.get_mut(id) {
                *info = info.to_checked_for_exposures();
            }
        }
        self.persist(&entries).await
    }

    async fn delete_info_and_file(&self, infos: &[CachedKeyInfo]) -> Result<(), SyncError> {
        if infos.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        for info in infos {
            Self::remove_artifact(&self.path_for(info)).await?;
        }

        // Entries only leave the index once every artifact is gone; a partial
        // failure leaves orphans that the next completed-key lookup drops.
        let mut remaining = entries.clone();
        for info in infos {
            if remaining.remove(&info.id).is_some() {
                tracing::debug!(id = %info.id, "Deleted cache entry");
            }
        }
        self.persist(&remaining).await?;
        *entries = remaining;
        Ok(())
    }
}
