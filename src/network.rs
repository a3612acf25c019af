//! Network state capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Snapshot of the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    /// Whether data usage on this connection is cost or quota constrained
    pub is_metered_connection: bool,
}

/// Supplies the current network state to the sync orchestrator.
#[async_trait]
pub trait NetworkStateProvider: Send + Sync {
    async fn network_state(&self) -> NetworkState;
}

/// Provider that always reports the same state, e.g. from a CLI flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticNetworkState {
    state: NetworkState,
}

impl StaticNetworkState {
    pub fn new(state: NetworkState) -> Self {
        Self { state }
    }

    pub fn metered(is_metered: bool) -> Self {
        Self::new(NetworkState {
            is_metered_connection: is_metered,
        })
    }
}

#[async_trait]
impl NetworkStateProvider for StaticNetworkState {
    async fn network_state(&self) -> NetworkState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_state() {
        let provider = StaticNetworkState::metered(true);
        let state = provider.network_state().await;
        assert!(state.is_metered_connection);
        assert_eq!(
            StaticNetworkState::default().network_state().await,
            NetworkState::default()
        );
    }
}
