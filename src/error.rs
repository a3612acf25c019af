//! Error types for the exposure agent.
//!
//! Transient download failures are retried inside the package sync tools and
//! surface as `successful = false`. Everything that reaches the caller of
//! [`crate::download::KeyPackageSyncTool::sync_key_files`] is a [`SyncError`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a key package sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local I/O failure (disk full, permissions, missing directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache index on disk could not be read or written
    #[error("Corrupt key cache index at {path:?}: {message}")]
    CorruptCache { path: PathBuf, message: String },

    /// Sync settings could not be persisted
    #[error("Settings error: {0}")]
    Settings(String),

    /// A download failed in a way that retrying cannot fix
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),
}

/// Errors raised while talking to the key distribution server.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection failure or reset
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server returned an error status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body could not be parsed
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Writing the downloaded package failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Network(_) | DownloadError::Timeout(_) => true,
            DownloadError::Server { status, .. } => *status >= 500 || *status == 429,
            DownloadError::InvalidResponse(_) | DownloadError::Io(_) => false,
        }
    }
}

/// Configuration inconsistencies detected while scoring an exposure window.
///
/// These are data contract violations and are never silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// The window carries a report type that has no offset in the encoding
    #[error("Unknown report type: {0}")]
    UnknownReportType(String),

    /// No transmission risk value is configured for the computed level
    #[error("No transmission risk value mapping for transmission risk level {0}")]
    UnknownTransmissionRiskLevel(i32),
}

/// Agent configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DownloadError::Network("reset".into()).is_transient());
        assert!(DownloadError::Timeout("30s".into()).is_transient());
        assert!(DownloadError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!DownloadError::Server {
            status: 404,
            message: "not found".into()
        }
        .is_transient());
        assert!(!DownloadError::InvalidResponse("garbage".into()).is_transient());
    }

    #[test]
    fn test_download_error_converts_into_sync_error() {
        let err: SyncError = DownloadError::Network("down".into()).into();
        assert!(err.to_string().contains("down"));
    }
}
