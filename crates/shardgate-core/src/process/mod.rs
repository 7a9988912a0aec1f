//! Request processors: the dispatch layer between client-facing handlers
//! and the observer fleet.
//!
//! Every processor follows the same discipline: compute the relevant
//! shard(s), walk that shard's observers in pool order, apply the
//! skip/authoritative decision table to each reply and post-process the
//! first authoritative answer. Skipped observers are always logged with
//! shard, address and failure cause.

pub mod account;
pub mod logs_merger;
pub mod network;
pub mod transaction;
pub mod validator;
pub mod vm_query;

use std::sync::Arc;

use crate::client::{is_observer_unavailable, CallError, ObserverCaller};
use crate::errors::ProcessError;
use crate::observer::{Observer, ObserverPool};
use crate::routing::ShardRouting;

pub use account::AccountProcessor;
pub use logs_merger::LogsMerger;
pub use network::NetworkProcessor;
pub use transaction::TransactionProcessor;
pub use validator::ValidatorProcessor;
pub use vm_query::VmQueryProcessor;

/// Shared dispatch context: the observer pool, the shard router and the
/// upstream caller. Cheap to clone; all fields are process-scoped.
#[derive(Clone)]
pub struct BaseProcessor {
    pub pool: Arc<ObserverPool>,
    pub router: Arc<dyn ShardRouting>,
    pub caller: Arc<dyn ObserverCaller>,
}

impl BaseProcessor {
    #[must_use]
    pub fn new(
        pool: Arc<ObserverPool>,
        router: Arc<dyn ShardRouting>,
        caller: Arc<dyn ObserverCaller>,
    ) -> Self {
        Self { pool, router, caller }
    }

    /// GETs `path` from the observers in order and returns the raw body of
    /// the first 2xx reply. Everything else is skip-class here; use this
    /// for read fan-outs where no observer answer is authoritative on
    /// failure.
    pub async fn get_first_success(
        &self,
        observers: &[Arc<Observer>],
        path: &str,
    ) -> Result<serde_json::Value, ProcessError> {
        for observer in observers {
            match self.caller.get(&observer.address, path).await {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) => log_skipped_status(observer, path, reply.status),
                Err(e) => log_skipped_transport(observer, path, &e),
            }
        }

        Err(ProcessError::SendingRequest)
    }
}

/// Applies the write-path decision table to one observer reply.
pub(crate) enum ReplyVerdict {
    /// 2xx: the reply body is the answer.
    Success(serde_json::Value),
    /// 404/408 or transport failure: try the next observer.
    Skip,
    /// Anything else is authoritative and short-circuits the retry loop.
    Rejected(ProcessError),
}

pub(crate) fn classify_reply(
    observer: &Observer,
    path: &str,
    outcome: Result<crate::client::ObserverReply, CallError>,
) -> ReplyVerdict {
    match outcome {
        Ok(reply) if reply.is_success() => ReplyVerdict::Success(reply.body),
        Ok(reply) if is_observer_unavailable(reply.status) => {
            log_skipped_status(observer, path, reply.status);
            ReplyVerdict::Skip
        }
        Ok(reply) => ReplyVerdict::Rejected(ProcessError::ObserverRejected {
            status: reply.status,
            message: reply.error_message(),
        }),
        Err(e) => {
            log_skipped_transport(observer, path, &e);
            ReplyVerdict::Skip
        }
    }
}

pub(crate) fn log_skipped_status(observer: &Observer, path: &str, status: u16) {
    tracing::warn!(
        shard = observer.shard_id,
        observer = %observer.address,
        path,
        status,
        "observer skipped"
    );
}

pub(crate) fn log_skipped_transport(observer: &Observer, path: &str, error: &CallError) {
    tracing::warn!(
        shard = observer.shard_id,
        observer = %observer.address,
        path,
        error = %error,
        "observer unreachable"
    );
}

/// Decodes an observer body into the expected envelope shape.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
) -> Result<T, ProcessError> {
    serde_json::from_value(body).map_err(|e| ProcessError::InvalidObserverResponse(e.to_string()))
}
