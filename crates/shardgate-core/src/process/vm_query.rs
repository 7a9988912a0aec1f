//! Read-only smart-contract queries.

use std::sync::Arc;

use crate::client::ObserverCaller;
use crate::encoding::AddressCodec;
use crate::errors::ProcessError;
use crate::routing::ShardRouting;
use crate::types::{ApiEnvelope, ScQuery, VmOutput, VmQueryData};

use super::{classify_reply, decode_body, BaseProcessor, ReplyVerdict};

/// VM query path of the observer.
pub const VM_VALUES_QUERY_PATH: &str = "/vm-values/query";

/// Forwards read-only VM queries to the contract's owning shard.
pub struct VmQueryProcessor {
    base: BaseProcessor,
    codec: Arc<dyn AddressCodec>,
}

impl VmQueryProcessor {
    #[must_use]
    pub fn new(base: BaseProcessor, codec: Arc<dyn AddressCodec>) -> Self {
        Self { base, codec }
    }

    /// Executes the query on the shard owning `sc_address`; the first
    /// authoritative observer reply wins. The returned output is passed
    /// through as received; presentation encodings (hex, string, big-int)
    /// belong to the HTTP layer.
    ///
    /// # Errors
    ///
    /// [`ProcessError::InvalidAddress`] for an undecodable contract
    /// address, otherwise the decision-table errors of the retry loop.
    pub async fn execute_query(&self, query: &ScQuery) -> Result<VmOutput, ProcessError> {
        let address_bytes = self.codec.decode(&query.sc_address)?;
        let shard_id = self.base.router.compute_shard_id(&address_bytes)?;
        let observers = self.base.pool.observers(shard_id)?;

        let body = serde_json::to_value(query).map_err(|e| ProcessError::Marshal(e.to_string()))?;

        for observer in &observers {
            let outcome = self.base.caller.post(&observer.address, VM_VALUES_QUERY_PATH, body.clone());
            match classify_reply(observer, VM_VALUES_QUERY_PATH, outcome.await) {
                ReplyVerdict::Success(reply) => {
                    let envelope: ApiEnvelope<VmQueryData> = decode_body(reply)?;
                    return Ok(envelope.data.unwrap_or_default().data);
                }
                ReplyVerdict::Skip => {}
                ReplyVerdict::Rejected(e) => return Err(e),
            }
        }

        Err(ProcessError::SendingRequest)
    }
}
