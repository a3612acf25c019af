//! Diagnosis key package download and sync.

pub mod base;
pub mod day;
pub mod hour;
pub mod server;
pub mod sync;
pub mod tool;

pub use base::{BasePackageSyncTool, DayPackageSync, HourPackageSync, SyncResult};
pub use day::DayPackageSyncTool;
pub use hour::HourPackageSyncTool;
#[cfg(feature = "http")]
pub use server::HttpKeyServer;
pub use server::{DownloadInfo, KeyServer, KeyServerConfig};
pub use sync::{KeyPackageSyncTool, SyncKeyFilesResult};
pub use tool::{with_retry, KeyDownloadTool, RetryPolicy};
