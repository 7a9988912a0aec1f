//! Network-level metric queries: status, config, economics, ESDTs and
//! enable-epochs.
//!
//! These are pass-through fan-outs: the first successful observer reply is
//! returned shape-as-received, without reinterpretation.

use crate::errors::ProcessError;
use crate::routing::METACHAIN_SHARD_ID;

use super::BaseProcessor;

/// Network status path, completed with the shard identifier.
pub const NETWORK_STATUS_PATH: &str = "/network/status";
/// Network config path of the observer.
pub const NETWORK_CONFIG_PATH: &str = "/network/config";
/// Network economics path of the observer.
pub const NETWORK_ECONOMICS_PATH: &str = "/network/economics";
/// Issued-ESDTs path of the observer.
pub const NETWORK_ESDTS_PATH: &str = "/network/esdts";
/// Enable-epochs metrics path of the observer.
pub const ENABLE_EPOCHS_PATH: &str = "/enable-epochs";

/// Serves network metric queries from the observer fleet.
pub struct NetworkProcessor {
    base: BaseProcessor,
}

impl NetworkProcessor {
    #[must_use]
    pub fn new(base: BaseProcessor) -> Self {
        Self { base }
    }

    /// Network status metrics of one shard, from its own observers.
    ///
    /// # Errors
    ///
    /// Topology or exhaustion errors from the retry loop.
    pub async fn get_network_status(
        &self,
        shard_id: u32,
    ) -> Result<serde_json::Value, ProcessError> {
        let observers = self.base.pool.observers(shard_id)?;
        let path = format!("{NETWORK_STATUS_PATH}/{shard_id}");
        self.base.get_first_success(&observers, &path).await
    }

    /// Network configuration, answered identically by every shard; asked
    /// one observer per shard until one replies.
    ///
    /// # Errors
    ///
    /// [`ProcessError::SendingRequest`] when no observer replies.
    pub async fn get_network_config(&self) -> Result<serde_json::Value, ProcessError> {
        let observers = self.base.pool.observers_one_per_shard();
        self.base.get_first_success(&observers, NETWORK_CONFIG_PATH).await
    }

    /// Network economics, a metachain-owned metric.
    ///
    /// # Errors
    ///
    /// Topology or exhaustion errors from the retry loop.
    pub async fn get_economics(&self) -> Result<serde_json::Value, ProcessError> {
        let observers = self.base.pool.observers(METACHAIN_SHARD_ID)?;
        self.base.get_first_success(&observers, NETWORK_ECONOMICS_PATH).await
    }

    /// All issued ESDT tokens, registered on the metachain.
    ///
    /// # Errors
    ///
    /// Topology or exhaustion errors from the retry loop.
    pub async fn get_esdts(&self) -> Result<serde_json::Value, ProcessError> {
        let observers = self.base.pool.observers(METACHAIN_SHARD_ID)?;
        self.base.get_first_success(&observers, NETWORK_ESDTS_PATH).await
    }

    /// Enable-epochs metrics, answered identically by every shard.
    ///
    /// # Errors
    ///
    /// [`ProcessError::SendingRequest`] when no observer replies.
    pub async fn get_enable_epochs(&self) -> Result<serde_json::Value, ProcessError> {
        let observers = self.base.pool.observers_one_per_shard();
        self.base.get_first_success(&observers, ENABLE_EPOCHS_PATH).await
    }
}
