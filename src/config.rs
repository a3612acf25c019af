//! Configuration for the exposure agent.

use crate::download::RetryPolicy;
use crate::error::ConfigError;
use crate::location::{LocationCatalog, DEFAULT_LOCATION};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the key distribution server
    pub server_url: String,

    /// Locations whose key packages are synced
    pub locations: Vec<String>,

    /// Treat the connection as metered (skips hour sync)
    pub metered: bool,

    /// Path for state, settings and statistics
    pub data_path: PathBuf,

    /// Path for downloaded key packages
    pub cache_path: PathBuf,

    /// Risk calculation parameters file (defaults are used if missing)
    pub risk_parameters_path: PathBuf,

    /// Retries per download after the first attempt
    pub download_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_serde")]
    pub retry_backoff: Duration,

    /// Per-request timeout
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Interval between syncs in `run` mode
    #[serde(with = "duration_serde")]
    pub sync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("exposure-agent");

        Self {
            server_url: "http://localhost:8003".to_string(),
            locations: vec![DEFAULT_LOCATION.to_string()],
            metered: false,
            cache_path: data_dir.join("keys"),
            risk_parameters_path: data_dir.join("risk_parameters.json"),
            data_path: data_dir,
            download_retries: 3,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(3600), // hourly
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("exposure-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.cache_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn location_catalog(&self) -> LocationCatalog {
        LocationCatalog::from_config(&self.locations)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.download_retries,
            initial_backoff: self.retry_backoff,
            ..RetryPolicy::default()
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_path.join("download_settings.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }
}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationCode;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.locations, vec!["EUR".to_string()]);
        assert!(!config.metered);
        assert_eq!(config.retry_policy().max_retries, 3);
        assert_eq!(config.sync_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"locations": ["de", "NL"], "retry_backoff": 5}"#).unwrap();
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
        assert_eq!(config.download_retries, 3);
        assert_eq!(
            config.location_catalog().locations(),
            &[LocationCode::new("DE"), LocationCode::new("NL")]
        );
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["request_timeout"], 30);
        assert_eq!(json["sync_interval"], 3600);
    }
}
