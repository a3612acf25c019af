//! Exposure Agent - key package sync and exposure risk scoring.
//!
//! This library keeps a local cache of diagnosis key packages in line with
//! the key server, and turns exposure windows into a per-day and overall
//! risk assessment.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Exposure Agent                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │ KeyPackage   │──▶│  Day / Hour  │──▶│ KeyDownload  │──▶ KeyServer
//! │  │  SyncTool    │   │  SyncTools   │   │    Tool      │      │
//! │  └──────────────┘   └──────────────┘   └──────────────┘      │
//! │     │       │                                  │             │
//! │     ▼       ▼                                  ▼             │
//! │  ┌────────┐ ┌──────────┐               ┌──────────────┐      │
//! │  │Settings│ │ Network  │               │  Key cache   │      │
//! │  └────────┘ └──────────┘               └──────────────┘      │
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │  AppConfig   │──▶│ RiskLevels   │──▶│  Aggregated  │      │
//! │  │  Provider    │   │ (per window) │   │  risk result │      │
//! │  └──────────────┘   └──────────────┘   └──────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use exposure_agent::risk::{
//!     aggregate_results, calculate_risk, ExposureWindow, RiskCalculationParameters,
//! };
//!
//! let params = RiskCalculationParameters::default();
//! let windows: Vec<ExposureWindow> = Vec::new();
//! let scored: Vec<_> = windows
//!     .iter()
//!     .filter_map(|w| calculate_risk(&params, w, Utc::now()).ok().flatten().map(|r| (w.clone(), r)))
//!     .collect();
//! let aggregated = aggregate_results(&params, &scored);
//! assert!(aggregated.is_low_risk());
//! ```

pub mod appconfig;
pub mod clock;
pub mod config;
pub mod download;
pub mod error;
pub mod location;
pub mod network;
pub mod risk;
pub mod storage;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use appconfig::{AppConfigProvider, FileAppConfigProvider};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use download::{
    BasePackageSyncTool, DayPackageSyncTool, HourPackageSyncTool, KeyDownloadTool,
    KeyPackageSyncTool, KeyServer, SyncKeyFilesResult,
};
pub use error::{ConfigError, DownloadError, RiskError, SyncError};
pub use location::{LocationCatalog, LocationCode};
pub use network::{NetworkState, NetworkStateProvider, StaticNetworkState};
pub use risk::{DefaultRiskLevels, EwAggregatedRiskResult, ExposureWindow, RiskLevel, RiskLevels};
pub use storage::{FileKeyCache, KeyCacheStore, SyncSettings};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "http")]
pub use download::HttpKeyServer;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
