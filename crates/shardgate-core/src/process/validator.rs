//! Validator auction queries against the metachain.

use crate::client::ObserverCaller;
use crate::errors::ProcessError;
use crate::routing::METACHAIN_SHARD_ID;
use crate::types::{ApiEnvelope, AuctionListResponse};

use super::{decode_body, BaseProcessor};

/// Auction list path of the observer.
pub const AUCTION_LIST_PATH: &str = "/validator/auction";

/// Serves validator statistics from the metachain observers.
pub struct ValidatorProcessor {
    base: BaseProcessor,
}

impl ValidatorProcessor {
    #[must_use]
    pub fn new(base: BaseProcessor) -> Self {
        Self { base }
    }

    /// The current validator auction list: first metachain observer with a
    /// decodable reply wins.
    ///
    /// Failed observers are logged individually, with transport failures
    /// and undecodable replies kept apart.
    ///
    /// # Errors
    ///
    /// [`ProcessError::AuctionListNotAvailable`] when no metachain
    /// observer produced a usable reply.
    pub async fn get_auction_list(&self) -> Result<AuctionListResponse, ProcessError> {
        let observers = self
            .base
            .pool
            .observers(METACHAIN_SHARD_ID)
            .map_err(|_| ProcessError::AuctionListNotAvailable)?;

        for observer in &observers {
            match self.base.caller.get(&observer.address, AUCTION_LIST_PATH).await {
                Ok(reply) if reply.is_success() => {
                    match decode_body::<ApiEnvelope<AuctionListResponse>>(reply.body) {
                        Ok(envelope) => {
                            tracing::info!(
                                observer = %observer.address,
                                "auction list fetched"
                            );
                            return Ok(envelope.data.unwrap_or_default());
                        }
                        Err(e) => {
                            tracing::error!(
                                observer = %observer.address,
                                error = %e,
                                "auction list reply undecodable"
                            );
                        }
                    }
                }
                Ok(reply) => {
                    tracing::error!(
                        observer = %observer.address,
                        status = reply.status,
                        "auction list request rejected"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        observer = %observer.address,
                        error = %e,
                        "auction list observer unreachable"
                    );
                }
            }
        }

        Err(ProcessError::AuctionListNotAvailable)
    }
}
