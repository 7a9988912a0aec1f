use thiserror::Error;

/// Errors produced by the request processors.
///
/// Each variant carries a fixed HTTP classification used by the outer HTTP
/// layer; see [`ProcessError::http_status`]. Validation errors never trigger
/// observer fan-out, and any authoritative observer reply short-circuits the
/// retry loop instead of surfacing one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    /// Address bytes could not be decoded or have the wrong length.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Transaction signature is not a valid hex string.
    #[error("invalid signature bytes: {0}")]
    InvalidSignatureBytes(String),

    /// Transaction value does not parse as a non-negative integer.
    #[error("invalid transaction value field: {0}")]
    InvalidTransactionValueField(String),

    /// Transaction rejected before dispatch.
    ///
    /// `message` names the offending field, `reason` carries the underlying
    /// decode error.
    #[error("invalid transaction fields: {message}: {reason}")]
    InvalidTxFields { message: String, reason: String },

    /// Every transaction in a batch failed field validation.
    #[error("no valid transaction to send")]
    NoValidTransactionToSend,

    /// The pool has no observers for the requested shard.
    #[error("no observers for shard {0}")]
    NoObserversForShard(u32),

    /// A shard required by the operation has no reachable observer.
    #[error("missing observer")]
    MissingObserver,

    /// Every observer in the retry sequence was unavailable (transport
    /// error, 404 or 408). Retry-eligible.
    #[error("sending request error")]
    SendingRequest,

    /// An observer answered authoritatively with a non-success status.
    ///
    /// Carries the observer's HTTP status and the error body it returned.
    #[error("observer replied {status}: {message}")]
    ObserverRejected { status: u16, message: String },

    /// No upstream observer knows the transaction.
    #[error("transaction not found")]
    TransactionNotFound,

    /// Upstream shards disagree on the transaction status and no sender
    /// hint is available to arbitrate.
    #[error("cannot get transaction status")]
    CannotGetTransactionStatus,

    /// The aggregated mempool view is empty.
    #[error("transactions not found in pool")]
    TransactionsNotFoundInPool,

    /// The sender has no nonce gaps recorded in the pool.
    #[error("nonce gaps not found in pool")]
    NonceGapsNotFoundInPool,

    /// The operation is disabled by configuration.
    #[error("operation not allowed")]
    OperationNotAllowed,

    /// No metachain observer produced an auction list.
    #[error("auction list not available")]
    AuctionListNotAvailable,

    /// The storage key parameter is empty.
    #[error("empty key")]
    EmptyKey,

    /// An observer reply decoded into an unexpected shape.
    #[error("invalid observer response: {0}")]
    InvalidObserverResponse(String),

    /// Marshalling the canonical transaction failed.
    #[error("cannot marshal transaction: {0}")]
    Marshal(String),
}

impl ProcessError {
    /// HTTP status the outer layer should answer with for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAddress(_) |
            Self::InvalidSignatureBytes(_) |
            Self::InvalidTransactionValueField(_) |
            Self::InvalidTxFields { .. } |
            Self::NoValidTransactionToSend |
            Self::EmptyKey => 400,
            Self::TransactionNotFound |
            Self::TransactionsNotFoundInPool |
            Self::NonceGapsNotFoundInPool => 404,
            Self::OperationNotAllowed => 403,
            Self::ObserverRejected { status, .. } => *status,
            _ => 500,
        }
    }

    /// `true` when the error reflects bad client input rather than an
    /// upstream or topology failure.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        self.http_status() < 500 && self.http_status() >= 400 && self.http_status() != 404
    }
}
