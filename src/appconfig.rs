//! App configuration provider supplying the risk calculation parameters.

use crate::error::ConfigError;
use crate::risk::RiskCalculationParameters;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Source of the current risk calculation configuration.
#[async_trait]
pub trait AppConfigProvider: Send + Sync {
    /// Current (or cached) configuration.
    async fn get_app_config(&self) -> Result<Arc<RiskCalculationParameters>, ConfigError>;

    /// Stream of configuration updates.
    fn current_config(&self) -> watch::Receiver<Arc<RiskCalculationParameters>>;
}

/// Provider reading the parameters from a JSON file.
///
/// Falls back to the built-in defaults when the file does not exist.
pub struct FileAppConfigProvider {
    path: Option<PathBuf>,
    sender: watch::Sender<Arc<RiskCalculationParameters>>,
}

impl FileAppConfigProvider {
    /// Load the configuration at `path`.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let params = Self::read(path.as_ref())?;
        let (sender, _) = watch::channel(Arc::new(params));
        Ok(Self { path, sender })
    }

    /// Provider with fixed parameters.
    pub fn from_parameters(params: RiskCalculationParameters) -> Self {
        let (sender, _) = watch::channel(Arc::new(params));
        Self { path: None, sender }
    }

    fn read(path: Option<&PathBuf>) -> Result<RiskCalculationParameters, ConfigError> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::IoError(e.to_string()))?;
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            Some(path) => {
                tracing::info!(?path, "No risk parameters file, using defaults");
                Ok(RiskCalculationParameters::default())
            }
            None => Ok(RiskCalculationParameters::default()),
        }
    }

    /// Re-read the file and notify watchers if the parameters changed.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let params = Self::read(self.path.as_ref())?;
        let changed = self.sender.send_if_modified(|current| {
            if **current == params {
                false
            } else {
                *current = Arc::new(params);
                true
            }
        });
        if changed {
            tracing::info!("Risk calculation parameters updated");
        }
        Ok(changed)
    }
}

#[async_trait]
impl AppConfigProvider for FileAppConfigProvider {
    async fn get_app_config(&self) -> Result<Arc<RiskCalculationParameters>, ConfigError> {
        Ok(self.sender.borrow().clone())
    }

    fn current_config(&self) -> watch::Receiver<Arc<RiskCalculationParameters>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileAppConfigProvider::load(Some(dir.path().join("risk.json"))).unwrap();
        let params = provider.get_app_config().await.unwrap();
        assert_eq!(*params, RiskCalculationParameters::default());
    }

    #[tokio::test]
    async fn test_reload_notifies_watchers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.json");
        let provider = FileAppConfigProvider::load(Some(path.clone())).unwrap();
        let mut rx = provider.current_config();

        assert!(!provider.reload().unwrap());

        let mut params = RiskCalculationParameters::default();
        params.transmission_risk_level_filters.clear();
        std::fs::write(&path, serde_json::to_string(&params).unwrap()).unwrap();

        assert!(provider.reload().unwrap());
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().transmission_risk_level_filters.is_empty());
        assert!(provider
            .get_app_config()
            .await
            .unwrap()
            .transmission_risk_level_filters
            .is_empty());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            FileAppConfigProvider::load(Some(path)),
            Err(ConfigError::ParseError(_))
        ));
    }
}
