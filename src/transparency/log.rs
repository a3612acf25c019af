//! Activity log for the agent.
//!
//! Counts what the agent did (syncs, downloads, scored windows) without
//! recording any key material or exposure details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current and previous sessions.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of sync runs started
    sync_runs: AtomicU64,
    /// Number of sync runs where the day sync failed
    failed_syncs: AtomicU64,
    /// Number of key packages downloaded
    packages_downloaded: AtomicU64,
    /// Number of exposure windows scored
    windows_evaluated: AtomicU64,
    /// Number of exposure windows filtered out or rejected
    windows_dropped: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Time of the last sync run
    last_sync: std::sync::Mutex<Option<DateTime<Utc>>>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            sync_runs: AtomicU64::new(0),
            failed_syncs: AtomicU64::new(0),
            packages_downloaded: AtomicU64::new(0),
            windows_evaluated: AtomicU64::new(0),
            windows_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
            last_sync: std::sync::Mutex::new(None),
            persist_path: None,
        }
    }

    /// Create a log that loads and saves its counters at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "Could not load previous activity stats");
        }

        log
    }

    /// Record a finished sync run.
    pub fn record_sync(&self, day_sync_successful: bool, packages: u64) {
        self.sync_runs.fetch_add(1, Ordering::Relaxed);
        if !day_sync_successful {
            self.failed_syncs.fetch_add(1, Ordering::Relaxed);
        }
        self.packages_downloaded.fetch_add(packages, Ordering::Relaxed);
        if let Ok(mut last) = self.last_sync.lock() {
            *last = Some(Utc::now());
        }
    }

    /// Record a scoring pass over `evaluated` windows of which `dropped` did not count.
    pub fn record_evaluation(&self, evaluated: u64, dropped: u64) {
        self.windows_evaluated.fetch_add(evaluated, Ordering::Relaxed);
        self.windows_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            sync_runs: self.sync_runs.load(Ordering::Relaxed),
            failed_syncs: self.failed_syncs.load(Ordering::Relaxed),
            packages_downloaded: self.packages_downloaded.load(Ordering::Relaxed),
            windows_evaluated: self.windows_evaluated.load(Ordering::Relaxed),
            windows_dropped: self.windows_dropped.load(Ordering::Relaxed),
            last_sync: self.last_sync.lock().ok().and_then(|last| *last),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let last_sync = stats
            .last_sync
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Activity:\n\
             - Sync runs: {} ({} with failed day sync)\n\
             - Last sync: {}\n\
             - Key packages downloaded: {}\n\
             - Exposure windows evaluated: {}\n\
             - Exposure windows dropped: {}\n\
             \n\
             Only counters are recorded here; no keys or exposure details.",
            stats.sync_runs,
            stats.failed_syncs,
            last_sync,
            stats.packages_downloaded,
            stats.windows_evaluated,
            stats.windows_dropped,
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sync_runs: stats.sync_runs,
                failed_syncs: stats.failed_syncs,
                packages_downloaded: stats.packages_downloaded,
                windows_evaluated: stats.windows_evaluated,
                windows_dropped: stats.windows_dropped,
                last_sync: stats.last_sync,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sync_runs.store(persisted.sync_runs, Ordering::Relaxed);
                self.failed_syncs
                    .store(persisted.failed_syncs, Ordering::Relaxed);
                self.packages_downloaded
                    .store(persisted.packages_downloaded, Ordering::Relaxed);
                self.windows_evaluated
                    .store(persisted.windows_evaluated, Ordering::Relaxed);
                self.windows_dropped
                    .store(persisted.windows_dropped, Ordering::Relaxed);
                *self.last_sync.get_mut().map_err(|_| {
                    std::io::Error::other("activity log lock poisoned")
                })? = persisted.last_sync;
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.sync_runs.store(0, Ordering::Relaxed);
        self.failed_syncs.store(0, Ordering::Relaxed);
        self.packages_downloaded.store(0, Ordering::Relaxed);
        self.windows_evaluated.store(0, Ordering::Relaxed);
        self.windows_dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the activity counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub sync_runs: u64,
    pub failed_syncs: u64,
    pub packages_downloaded: u64,
    pub windows_evaluated: u64,
    pub windows_dropped: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sync_runs: u64,
    #[serde(default)]
    failed_syncs: u64,
    packages_downloaded: u64,
    windows_evaluated: u64,
    windows_dropped: u64,
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared activity log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
