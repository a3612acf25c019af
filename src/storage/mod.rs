//! Local state owned by the agent: cached key packages and sync settings.

pub mod cache;
pub mod settings;

pub use cache::{CacheType, CachedKey, CachedKeyInfo, FileKeyCache, KeyCacheStore};
pub use settings::{DownloadSettingsState, LastDownload, SyncGranularity, SyncSettings};
