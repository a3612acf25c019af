//! Persisted state of the last key package downloads.
//!
//! The sync orchestrator is the only writer. Every update runs under one
//! lock and is written to disk before the lock is released, so a reader never
//! observes a record that was not persisted.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Granularity of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncGranularity {
    Day,
    Hour,
}

/// Record of one sync attempt.
///
/// `finished_at` and `successful` stay `None` while the attempt is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDownload {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub successful: Option<bool>,
}

impl LastDownload {
    /// A record for an attempt that just started.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            finished_at: None,
            successful: None,
        }
    }

    /// This record, closed out with the attempt's outcome.
    pub fn finished(&self, now: DateTime<Utc>, successful: bool) -> Self {
        Self {
            started_at: self.started_at,
            finished_at: Some(now),
            successful: Some(successful),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }
}

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSettingsState {
    pub last_download_days: Option<LastDownload>,
    pub last_download_hours: Option<LastDownload>,
}

impl DownloadSettingsState {
    fn slot_mut(&mut self, granularity: SyncGranularity) -> &mut Option<LastDownload> {
        match granularity {
            SyncGranularity::Day => &mut self.last_download_days,
            SyncGranularity::Hour => &mut self.last_download_hours,
        }
    }

    fn slot(&self, granularity: SyncGranularity) -> &Option<LastDownload> {
        match granularity {
            SyncGranularity::Day => &self.last_download_days,
            SyncGranularity::Hour => &self.last_download_hours,
        }
    }
}

/// State store for the day and hour download records.
#[derive(Debug)]
pub struct SyncSettings {
    state: Mutex<DownloadSettingsState>,
    persist_path: Option<PathBuf>,
    notifier: watch::Sender<DownloadSettingsState>,
}

impl SyncSettings {
    /// Create an in-memory settings store.
    pub fn new() -> Self {
        Self::with_state(DownloadSettingsState::default(), None)
    }

    /// Create a settings store backed by a JSON file, loading existing state.
    ///
    /// A file that does not parse is treated like a missing one: both
    /// records start absent and the next sync resets and forces them.
    pub fn with_persistence(path: PathBuf) -> Result<Self, SyncError> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = ?path, error = %e, "Discarding unreadable download settings");
                DownloadSettingsState::default()
            })
        } else {
            DownloadSettingsState::default()
        };
        Ok(Self::with_state(state, Some(path)))
    }

    fn with_state(state: DownloadSettingsState, persist_path: Option<PathBuf>) -> Self {
        let (notifier, _) = watch::channel(state.clone());
        Self {
            state: Mutex::new(state),
            persist_path,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DownloadSettingsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current record for a granularity.
    pub fn last_download(&self, granularity: SyncGranularity) -> Option<LastDownload> {
        self.lock().slot(granularity).clone()
    }

    pub fn last_download_days(&self) -> Option<LastDownload> {
        self.last_download(SyncGranularity::Day)
    }

    pub fn last_download_hours(&self) -> Option<LastDownload> {
        self.last_download(SyncGranularity::Hour)
    }

    /// Atomically replace a record with `f(old)` and persist the result.
    pub fn update_last_download<F>(
        &self,
        granularity: SyncGranularity,
        f: F,
    ) -> Result<Option<LastDownload>, SyncError>
    where
        F: FnOnce(Option<LastDownload>) -> Option<LastDownload>,
    {
        let mut state = self.lock();
        let mut next = state.clone();
        let slot = next.slot_mut(granularity);
        *slot = f(slot.take());
        let updated = slot.clone();

        self.save(&next)?;
        *state = next.clone();
        drop(state);

        self.notifier.send_replace(next);
        Ok(updated)
    }

    /// Atomically replace both records in one write.
    pub fn reset_all(&self, value: Option<LastDownload>) -> Result<(), SyncError> {
        let mut state = self.lock();
        let next = DownloadSettingsState {
            last_download_days: value.clone(),
            last_download_hours: value,
        };
        self.save(&next)?;
        *state = next.clone();
        drop(state);

        self.notifier.send_replace(next);
        Ok(())
    }

    /// Snapshot of both records.
    pub fn state(&self) -> DownloadSettingsState {
        self.lock().clone()
    }

    /// Subscribe to record changes.
    pub fn subscribe(&self) -> watch::Receiver<DownloadSettingsState> {
        self.notifier.subscribe()
    }

    fn save(&self, state: &DownloadSettingsState) -> Result<(), SyncError> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(state)
                .map_err(|e| SyncError::Settings(e.to_string()))?;

            // Write-then-rename so a crash never leaves a half-written file.
            let mut tmp_path = path.clone().into_os_string();
            tmp_path.push(".tmp");
            std::fs::write(&tmp_path, json)?;
            std::fs::rename(&tmp_path, path)?;
        }
        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new()
    }
}
