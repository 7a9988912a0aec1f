//! Account storage lookups.

use std::sync::Arc;

use crate::encoding::AddressCodec;
use crate::errors::ProcessError;
use crate::routing::ShardRouting;
use crate::types::{ApiEnvelope, ValueForKeyData};

use super::{decode_body, BaseProcessor};

/// Serves account queries from the account's owning shard.
pub struct AccountProcessor {
    base: BaseProcessor,
    codec: Arc<dyn AddressCodec>,
}

impl AccountProcessor {
    #[must_use]
    pub fn new(base: BaseProcessor, codec: Arc<dyn AddressCodec>) -> Self {
        Self { base, codec }
    }

    /// Reads one storage value of an account, identified by its hex key.
    ///
    /// # Errors
    ///
    /// [`ProcessError::EmptyKey`] for an empty key,
    /// [`ProcessError::InvalidAddress`] for an undecodable address,
    /// otherwise the retry-loop errors.
    pub async fn get_value_for_key(
        &self,
        address: &str,
        key: &str,
    ) -> Result<String, ProcessError> {
        if key.is_empty() {
            return Err(ProcessError::EmptyKey);
        }

        let address_bytes = self.codec.decode(address)?;
        let shard_id = self.base.router.compute_shard_id(&address_bytes)?;
        let observers = self.base.pool.observers(shard_id)?;

        let path = format!("/address/{address}/key/{key}");
        let body = self.base.get_first_success(&observers, &path).await?;
        let envelope: ApiEnvelope<ValueForKeyData> = decode_body(body)?;
        Ok(envelope.data.unwrap_or_default().value)
    }
}
