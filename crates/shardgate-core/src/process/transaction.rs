//! Transaction submission, lookup, reconciliation and mempool views.
//!
//! This is the heart of the proxy. Write paths (send, send-multiple, cost,
//! simulate) validate fields before any dispatch, then walk the owning
//! shard's observers applying the decision table: 2xx wins, 404/408 and
//! transport failures skip to the next observer, anything else is an
//! authoritative rejection that stops the retry loop. Read paths fan out
//! across shards and reconcile partial replies, with the destination shard
//! authoritative for cross-shard transactions.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::client::ObserverCaller;
use crate::encoding::{
    parse_value, AddressCodec, CanonicalTransaction, Hasher, Marshaller,
};
use crate::errors::ProcessError;
use crate::observer::Observer;
use crate::outcome::{Outcome, OutcomeParser};
use crate::routing::{ShardRouting, METACHAIN_SHARD_ID};
use crate::types::{
    ApiEnvelope, FullTransaction, GetTransactionData, LastPoolNonceData,
    MultipleTransactionsData, PoolNonceGaps, PoolNonceGapsData, SendTransactionData,
    SimulationReply, SimulationResultData, Transaction, TransactionCostData,
    TransactionSimulation, TransactionStatusData, TransactionsPool, TransactionsPoolData,
    RECEIVER_SHARD_ROLE, SENDER_SHARD_ROLE, UNKNOWN_STATUS_TX,
};

use super::{
    classify_reply, decode_body, log_skipped_status, log_skipped_transport, BaseProcessor,
    LogsMerger, ReplyVerdict,
};

/// Single transaction send path of the observer.
pub const TRANSACTION_SEND_PATH: &str = "/transaction/send";
/// Batched transaction send path of the observer.
pub const MULTIPLE_TRANSACTIONS_PATH: &str = "/transaction/send-multiple";
/// Transaction cost estimation path of the observer.
pub const TRANSACTION_COST_PATH: &str = "/transaction/cost";
/// Transaction simulation path of the observer.
pub const TRANSACTION_SIMULATE_PATH: &str = "/transaction/simulate";
/// Mempool view path of the observer.
pub const TRANSACTION_POOL_PATH: &str = "/transaction/pool";

/// Processes transaction requests against the observer fleet.
pub struct TransactionProcessor {
    base: BaseProcessor,
    codec: Arc<dyn AddressCodec>,
    hasher: Arc<dyn Hasher>,
    marshaller: Arc<dyn Marshaller>,
    outcome_parser: OutcomeParser,
    logs_merger: LogsMerger,
    mempool_api_enabled: bool,
}

impl TransactionProcessor {
    #[must_use]
    pub fn new(
        base: BaseProcessor,
        codec: Arc<dyn AddressCodec>,
        hasher: Arc<dyn Hasher>,
        marshaller: Arc<dyn Marshaller>,
        outcome_parser: OutcomeParser,
        logs_merger: LogsMerger,
        mempool_api_enabled: bool,
    ) -> Self {
        Self { base, codec, hasher, marshaller, outcome_parser, logs_merger, mempool_api_enabled }
    }

    /// Relays a transaction to its owning shard and returns the hash the
    /// accepting observer assigned.
    ///
    /// # Errors
    ///
    /// [`ProcessError::InvalidTxFields`] before dispatch,
    /// [`ProcessError::ObserverRejected`] on an authoritative rejection,
    /// [`ProcessError::SendingRequest`] when every observer was
    /// unavailable.
    pub async fn send_transaction(&self, tx: &Transaction) -> Result<String, ProcessError> {
        self.check_transaction_fields(tx)?;

        let shard_id = self.shard_of_address(&tx.sender)?;
        let observers = self.base.pool.observers(shard_id)?;
        let body = to_json(tx)?;

        let (observer, reply) =
            self.post_first_authoritative(&observers, TRANSACTION_SEND_PATH, &body).await?;
        let envelope: ApiEnvelope<SendTransactionData> = decode_body(reply)?;
        let tx_hash = envelope.data.unwrap_or_default().tx_hash;

        tracing::info!(
            observer = %observer.address,
            shard = shard_id,
            tx_hash = %tx_hash,
            "transaction sent"
        );
        Ok(tx_hash)
    }

    /// Relays a batch of transactions, partitioned by sender shard.
    ///
    /// Invalid transactions are dropped (and logged); a shard whose
    /// observers all fail contributes zero accepted transactions without
    /// failing the overall call. Returned hashes are keyed by the indices
    /// of the original request.
    ///
    /// # Errors
    ///
    /// [`ProcessError::NoValidTransactionToSend`] when nothing survives
    /// validation, [`ProcessError::MissingObserver`] when a target shard
    /// has no observers at all.
    pub async fn send_multiple_transactions(
        &self,
        txs: &[Transaction],
    ) -> Result<MultipleTransactionsData, ProcessError> {
        let mut by_shard: BTreeMap<u32, Vec<(u64, &Transaction)>> = BTreeMap::new();
        for (index, tx) in txs.iter().enumerate() {
            if let Err(e) = self.check_transaction_fields(tx) {
                tracing::warn!(
                    sender = %tx.sender,
                    receiver = %tx.receiver,
                    error = %e,
                    "invalid tx received"
                );
                continue;
            }
            let Ok(shard_id) = self.shard_of_address(&tx.sender) else {
                continue;
            };
            by_shard.entry(shard_id).or_default().push((index as u64, tx));
        }

        if by_shard.is_empty() {
            return Err(ProcessError::NoValidTransactionToSend);
        }

        let mut total = MultipleTransactionsData::default();
        for (shard_id, group) in by_shard {
            let observers = self
                .base
                .pool
                .observers(shard_id)
                .map_err(|_| ProcessError::MissingObserver)?;
            let batch: Vec<&Transaction> = group.iter().map(|(_, tx)| *tx).collect();
            let body = to_json(&batch)?;

            for observer in &observers {
                let outcome =
                    self.base.caller.post(&observer.address, MULTIPLE_TRANSACTIONS_PATH, body.clone());
                match classify_reply(observer, MULTIPLE_TRANSACTIONS_PATH, outcome.await) {
                    ReplyVerdict::Success(reply) => {
                        let envelope: ApiEnvelope<MultipleTransactionsData> =
                            match decode_body(reply) {
                                Ok(envelope) => envelope,
                                Err(e) => {
                                    log_undecodable_reply(observer, &e);
                                    continue;
                                }
                            };
                        let data = envelope.data.unwrap_or_default();
                        tracing::info!(
                            observer = %observer.address,
                            shard = shard_id,
                            accepted = data.num_of_txs,
                            "transactions sent"
                        );
                        total.num_of_txs += data.num_of_txs;
                        for (local_index, hash) in data.txs_hashes {
                            if let Some((original_index, _)) = group.get(local_index as usize) {
                                total.txs_hashes.insert(*original_index, hash);
                            }
                        }
                        break;
                    }
                    // Unlike the single-send path, a rejection of the batch
                    // by one observer does not condemn the whole shard.
                    ReplyVerdict::Rejected(e) => {
                        tracing::warn!(
                            observer = %observer.address,
                            shard = shard_id,
                            error = %e,
                            "batch rejected by observer"
                        );
                    }
                    ReplyVerdict::Skip => {}
                }
            }
        }

        Ok(total)
    }

    /// Simulates a transaction without executing it.
    ///
    /// Intra-shard simulations answer with a single result; cross-shard
    /// simulations run on both the sender and the receiver shard in
    /// parallel and answer with one result per role. A side that fails
    /// entirely is reported through its `fail_reason` instead of failing
    /// the call.
    ///
    /// # Errors
    ///
    /// Same classes as [`TransactionProcessor::send_transaction`].
    pub async fn simulate_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<SimulationReply, ProcessError> {
        self.check_transaction_fields(tx)?;

        let sender_shard = self.shard_of_address(&tx.sender)?;
        let receiver_shard = self.shard_of_address(&tx.receiver)?;
        let body = to_json(tx)?;

        if sender_shard == receiver_shard {
            let result = self.simulate_on_shard(sender_shard, &body).await?;
            return Ok(SimulationReply::SingleShard { result });
        }

        let (sender_side, receiver_side) = tokio::join!(
            self.simulate_on_shard(sender_shard, &body),
            self.simulate_on_shard(receiver_shard, &body)
        );

        let mut result = std::collections::HashMap::new();
        result.insert(SENDER_SHARD_ROLE.to_string(), flatten_simulation(sender_side));
        result.insert(RECEIVER_SHARD_ROLE.to_string(), flatten_simulation(receiver_side));
        Ok(SimulationReply::CrossShard { result })
    }

    async fn simulate_on_shard(
        &self,
        shard_id: u32,
        body: &serde_json::Value,
    ) -> Result<TransactionSimulation, ProcessError> {
        let observers = self.base.pool.observers(shard_id)?;
        let (_, reply) =
            self.post_first_authoritative(&observers, TRANSACTION_SIMULATE_PATH, body).await?;
        let envelope: ApiEnvelope<SimulationResultData> = decode_body(reply)?;
        Ok(envelope.data.unwrap_or_default().result)
    }

    /// Estimates how many gas units a transaction costs.
    ///
    /// Cost estimation is not served by the metachain, so metachain
    /// observers are excluded from the retry sequence.
    ///
    /// # Errors
    ///
    /// Same classes as [`TransactionProcessor::send_transaction`].
    pub async fn transaction_cost(&self, tx: &Transaction) -> Result<String, ProcessError> {
        self.check_transaction_fields(tx)?;

        let observers: Vec<Arc<Observer>> = self
            .base
            .pool
            .all_observers()
            .into_iter()
            .filter(|observer| observer.shard_id != METACHAIN_SHARD_ID)
            .collect();
        let body = to_json(tx)?;

        let (observer, reply) =
            self.post_first_authoritative(&observers, TRANSACTION_COST_PATH, &body).await?;
        let envelope: ApiEnvelope<TransactionCostData> = decode_body(reply)?;

        tracing::info!(
            observer = %observer.address,
            shard = observer.shard_id,
            "transaction cost request served"
        );
        Ok(envelope.data.unwrap_or_default().tx_gas_units.to_string())
    }

    /// Looks up a transaction by hash across the shards.
    ///
    /// With a `sender_address` hint the sender's shard is scanned first.
    /// Within each shard full-history observers are preferred; transport
    /// failures advance to the next observer in the shard, while an
    /// authoritative miss advances to the next shard. For cross-shard
    /// transactions requested `with_results`, contract results and logs
    /// from both shards are merged (set-union by hash) and the destination
    /// shard's status is authoritative.
    ///
    /// # Errors
    ///
    /// [`ProcessError::TransactionNotFound`] when no observer knows the
    /// hash.
    pub async fn get_transaction(
        &self,
        tx_hash: &str,
        with_results: bool,
        sender_address: Option<&str>,
    ) -> Result<FullTransaction, ProcessError> {
        let path = format!("/transaction/{tx_hash}?withResults={with_results}");
        let shard_order = self.candidate_shard_order(sender_address)?;

        for shard_id in shard_order {
            let observers = self.observers_preferring_full_history(shard_id);
            let Some(candidate) = self.scan_shard_for_candidate(&observers, &path).await else {
                continue;
            };
            return Ok(self.complete_candidate(candidate, shard_id, with_results, &path).await);
        }

        Err(ProcessError::TransactionNotFound)
    }

    /// Decodes the smart-contract outcome of a completed transaction.
    ///
    /// Fetches the transaction with its execution artifacts (merged across
    /// shards for cross-shard transactions) and runs the outcome parser
    /// over the contract results, logs and sender. `None` means the
    /// outcome is not determinable from what the observers returned; that
    /// is a valid answer, not an error.
    ///
    /// # Errors
    ///
    /// [`ProcessError::TransactionNotFound`] when no observer knows the
    /// hash.
    pub async fn get_transaction_outcome(
        &self,
        tx_hash: &str,
        sender_address: Option<&str>,
    ) -> Result<Option<Outcome>, ProcessError> {
        let tx = self.get_transaction(tx_hash, true, sender_address).await?;
        Ok(self.outcome_parser.parse(&tx))
    }

    /// Reconciles the transaction status across shards.
    ///
    /// Each shard contributes the answer of its first responsive observer;
    /// `unknown` answers are dropped. Agreement wins; disagreement without
    /// a sender hint is an error; with a hint the destination shard's
    /// answer overrides the sender shard's, since destination-shard
    /// execution is authoritative for cross-shard finality.
    ///
    /// # Errors
    ///
    /// [`ProcessError::CannotGetTransactionStatus`] on unresolvable
    /// disagreement.
    pub async fn get_transaction_status(
        &self,
        tx_hash: &str,
        sender_address: Option<&str>,
    ) -> Result<String, ProcessError> {
        let sender_shard = match sender_address {
            Some(address) if !address.is_empty() => Some(self.shard_of_address(address)?),
            _ => None,
        };

        let path = format!("/transaction/{tx_hash}/status");
        let mut responses: Vec<(u32, String)> = Vec::new();
        for shard_id in self.base.pool.shard_ids() {
            let Ok(observers) = self.base.pool.observers(shard_id) else {
                continue;
            };
            let Ok(body) = self.base.get_first_success(&observers, &path).await else {
                continue;
            };
            if let Ok(envelope) = decode_body::<ApiEnvelope<TransactionStatusData>>(body) {
                if let Some(data) = envelope.data {
                    responses.push((shard_id, data.status));
                }
            }
        }

        resolve_status_responses(responses, sender_shard)
    }

    /// Computes the canonical hash a transaction will have on chain.
    ///
    /// # Errors
    ///
    /// [`ProcessError::InvalidTransactionValueField`],
    /// [`ProcessError::InvalidAddress`] or
    /// [`ProcessError::InvalidSignatureBytes`] for undecodable fields.
    pub fn compute_transaction_hash(&self, tx: &Transaction) -> Result<String, ProcessError> {
        let value = parse_value(&tx.value)?;
        let receiver = self.codec.decode(&tx.receiver)?;
        let sender = self.codec.decode(&tx.sender)?;
        let signature = hex::decode(&tx.signature)
            .map_err(|e| ProcessError::InvalidSignatureBytes(e.to_string()))?;

        let canonical = CanonicalTransaction {
            nonce: tx.nonce,
            value: value.to_string(),
            receiver,
            sender,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            data: tx.data.as_ref().map(|d| d.as_bytes().to_vec()),
            chain_id: tx.chain_id.as_bytes().to_vec(),
            version: tx.version,
            signature,
            options: tx.options,
        };

        let marshalled = self.marshaller.marshal(&canonical)?;
        Ok(hex::encode(self.hasher.hash(&marshalled)))
    }

    /// Aggregates the mempool view of every shard.
    ///
    /// # Errors
    ///
    /// [`ProcessError::OperationNotAllowed`] when the mempool API is
    /// disabled, [`ProcessError::TransactionsNotFoundInPool`] when every
    /// shard's pool is empty.
    pub async fn get_transactions_pool(
        &self,
        fields: &str,
    ) -> Result<TransactionsPool, ProcessError> {
        self.ensure_mempool_enabled()?;

        let path = pool_path(fields);
        let shards = self.base.pool.shard_ids();
        let fetches = shards.iter().map(|shard_id| self.pool_view_from_shard(*shard_id, &path));
        let views = futures::future::join_all(fetches).await;

        let mut pool = TransactionsPool::default();
        for view in views.into_iter().flatten() {
            pool.absorb(view);
        }

        if pool.is_empty() {
            return Err(ProcessError::TransactionsNotFoundInPool);
        }
        Ok(pool)
    }

    /// The mempool view of one shard: the first non-empty pool any of its
    /// observers reports.
    ///
    /// # Errors
    ///
    /// [`ProcessError::TransactionsNotFoundInPool`] when every observer
    /// reports an empty pool.
    pub async fn get_transactions_pool_for_shard(
        &self,
        shard_id: u32,
        fields: &str,
    ) -> Result<TransactionsPool, ProcessError> {
        self.ensure_mempool_enabled()?;

        let path = pool_path(fields);
        let observers = self.base.pool.observers(shard_id)?;
        for observer in &observers {
            match self.base.caller.get(&observer.address, &path).await {
                Ok(reply) if reply.is_success() => {
                    let Ok(envelope) = decode_body::<ApiEnvelope<TransactionsPoolData>>(reply.body)
                    else {
                        continue;
                    };
                    let pool = envelope.data.unwrap_or_default().transactions;
                    if !pool.is_empty() {
                        return Ok(pool);
                    }
                }
                Ok(reply) => log_skipped_status(observer, &path, reply.status),
                Err(e) => log_skipped_transport(observer, &path, &e),
            }
        }

        Err(ProcessError::TransactionsNotFoundInPool)
    }

    /// The pool transactions of one sender, served by its own shard.
    ///
    /// # Errors
    ///
    /// [`ProcessError::OperationNotAllowed`] when disabled; address and
    /// dispatch errors otherwise.
    pub async fn get_transactions_pool_for_sender(
        &self,
        sender: &str,
        fields: &str,
    ) -> Result<TransactionsPool, ProcessError> {
        self.ensure_mempool_enabled()?;

        let shard_id = self.shard_of_address(sender)?;
        let observers = self.base.pool.observers(shard_id)?;
        let path = if fields.is_empty() {
            format!("{TRANSACTION_POOL_PATH}?by-sender={sender}")
        } else {
            format!("{TRANSACTION_POOL_PATH}?by-sender={sender}&fields={fields}")
        };

        let body = self.base.get_first_success(&observers, &path).await?;
        let envelope: ApiEnvelope<TransactionsPoolData> = decode_body(body)?;
        Ok(envelope.data.unwrap_or_default().transactions)
    }

    /// The highest pool nonce of one sender. Zero is a valid answer, not
    /// an error.
    ///
    /// # Errors
    ///
    /// [`ProcessError::OperationNotAllowed`] when disabled; address and
    /// dispatch errors otherwise.
    pub async fn get_last_pool_nonce_for_sender(
        &self,
        sender: &str,
    ) -> Result<u64, ProcessError> {
        self.ensure_mempool_enabled()?;

        let shard_id = self.shard_of_address(sender)?;
        let observers = self.base.pool.observers(shard_id)?;
        let path = format!("{TRANSACTION_POOL_PATH}/last-nonce?by-sender={sender}");

        let body = self.base.get_first_success(&observers, &path).await?;
        let envelope: ApiEnvelope<LastPoolNonceData> = decode_body(body)?;
        Ok(envelope.data.unwrap_or_default().nonce)
    }

    /// The nonce gaps of one sender's pool entries.
    ///
    /// # Errors
    ///
    /// [`ProcessError::NonceGapsNotFoundInPool`] when the observer reply
    /// carries no gap data.
    pub async fn get_transactions_pool_nonce_gaps_for_sender(
        &self,
        sender: &str,
    ) -> Result<PoolNonceGaps, ProcessError> {
        self.ensure_mempool_enabled()?;

        let shard_id = self.shard_of_address(sender)?;
        let observers = self.base.pool.observers(shard_id)?;
        let path = format!("{TRANSACTION_POOL_PATH}/nonce-gaps?by-sender={sender}");

        let body = self.base.get_first_success(&observers, &path).await?;
        let envelope: ApiEnvelope<PoolNonceGapsData> = decode_body(body)?;
        envelope
            .data
            .map(|data| data.nonce_gaps)
            .ok_or(ProcessError::NonceGapsNotFoundInPool)
    }

    // --- internals ---

    fn ensure_mempool_enabled(&self) -> Result<(), ProcessError> {
        if self.mempool_api_enabled {
            Ok(())
        } else {
            Err(ProcessError::OperationNotAllowed)
        }
    }

    /// Field validation applied to every write path before dispatch.
    fn check_transaction_fields(&self, tx: &Transaction) -> Result<(), ProcessError> {
        if let Err(e) = self.codec.decode(&tx.sender) {
            return Err(invalid_field("invalid sender address", &e));
        }
        if let Err(e) = self.codec.decode(&tx.receiver) {
            return Err(invalid_field("invalid receiver address", &e));
        }
        if let Err(e) = hex::decode(&tx.signature) {
            return Err(ProcessError::InvalidTxFields {
                message: "invalid signature hex".to_string(),
                reason: e.to_string(),
            });
        }
        if let Err(e) = parse_value(&tx.value) {
            return Err(invalid_field("invalid transaction value", &e));
        }
        if tx.chain_id.is_empty() {
            return Err(ProcessError::InvalidTxFields {
                message: "transaction must contain a chain identifier".to_string(),
                reason: "empty chainID".to_string(),
            });
        }
        if tx.version == 0 {
            return Err(ProcessError::InvalidTxFields {
                message: "transaction must contain a positive version".to_string(),
                reason: "version is 0".to_string(),
            });
        }
        Ok(())
    }

    fn shard_of_address(&self, address: &str) -> Result<u32, ProcessError> {
        let bytes = self.codec.decode(address)?;
        self.base.router.compute_shard_id(&bytes)
    }

    /// POSTs `body` down the retry sequence, returning the first 2xx reply
    /// together with the observer that produced it.
    async fn post_first_authoritative(
        &self,
        observers: &[Arc<Observer>],
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(Arc<Observer>, serde_json::Value), ProcessError> {
        for observer in observers {
            let outcome = self.base.caller.post(&observer.address, path, body.clone()).await;
            match classify_reply(observer, path, outcome) {
                ReplyVerdict::Success(reply) => return Ok((Arc::clone(observer), reply)),
                ReplyVerdict::Skip => {}
                ReplyVerdict::Rejected(e) => return Err(e),
            }
        }

        Err(ProcessError::SendingRequest)
    }

    /// Shard scan order for a lookup: the sender's shard first when a hint
    /// is available, then the remaining shards in declared order.
    fn candidate_shard_order(
        &self,
        sender_address: Option<&str>,
    ) -> Result<Vec<u32>, ProcessError> {
        let shard_ids = self.base.pool.shard_ids();
        match sender_address {
            Some(address) if !address.is_empty() => {
                let sender_shard = self.shard_of_address(address)?;
                let mut order = vec![sender_shard];
                order.extend(shard_ids.into_iter().filter(|shard| *shard != sender_shard));
                Ok(order)
            }
            _ => Ok(shard_ids),
        }
    }

    fn observers_preferring_full_history(&self, shard_id: u32) -> Vec<Arc<Observer>> {
        self.base
            .pool
            .full_history_observers(shard_id)
            .or_else(|_| self.base.pool.observers(shard_id))
            .unwrap_or_default()
    }

    /// Walks one shard's observers looking for a non-empty transaction.
    ///
    /// Transport and decode failures advance to the next observer; an HTTP
    /// status or an empty body is that shard's authoritative answer and
    /// ends the scan.
    async fn scan_shard_for_candidate(
        &self,
        observers: &[Arc<Observer>],
        path: &str,
    ) -> Option<FullTransaction> {
        for observer in observers {
            match self.base.caller.get(&observer.address, path).await {
                Err(e) => log_skipped_transport(observer, path, &e),
                Ok(reply) if reply.is_success() => {
                    match decode_body::<ApiEnvelope<GetTransactionData>>(reply.body) {
                        Ok(envelope) => {
                            let tx = envelope.data.unwrap_or_default().transaction;
                            if tx.is_empty() {
                                return None;
                            }
                            return Some(tx);
                        }
                        Err(e) => log_undecodable_reply(observer, &e),
                    }
                }
                Ok(reply) => {
                    log_skipped_status(observer, path, reply.status);
                    return None;
                }
            }
        }
        None
    }

    /// Enriches a cross-shard candidate with the other shard's artifacts.
    async fn complete_candidate(
        &self,
        mut tx: FullTransaction,
        observed_shard: u32,
        with_results: bool,
        path: &str,
    ) -> FullTransaction {
        if !with_results || tx.source_shard == tx.destination_shard {
            return tx;
        }

        if observed_shard == tx.destination_shard {
            // Destination answer is authoritative; the source shard only
            // contributes additional contract results and logs.
            let observers = self.observers_preferring_full_history(tx.source_shard);
            if let Some(extra) = self.scan_shard_for_candidate(&observers, path).await {
                self.merge_execution_artifacts(&mut tx, extra);
            }
            tx
        } else {
            // Candidate came from the source shard; fetch the destination
            // answer and let it carry the status.
            let observers = self.observers_preferring_full_history(tx.destination_shard);
            match self.scan_shard_for_candidate(&observers, path).await {
                Some(mut destination_tx) => {
                    self.merge_execution_artifacts(&mut destination_tx, tx);
                    destination_tx
                }
                None => tx,
            }
        }
    }

    /// Set-union of contract results by hash plus deduplicated log merge.
    fn merge_execution_artifacts(&self, base: &mut FullTransaction, extra: FullTransaction) {
        let seen: HashSet<String> =
            base.sc_results.iter().map(|result| result.hash.clone()).collect();
        for result in extra.sc_results {
            if !seen.contains(&result.hash) {
                base.sc_results.push(result);
            }
        }
        base.logs = self.logs_merger.merge(base.logs.take(), extra.logs);
    }

    async fn pool_view_from_shard(
        &self,
        shard_id: u32,
        path: &str,
    ) -> Option<TransactionsPool> {
        let observers = self.base.pool.observers(shard_id).ok()?;
        let body = self.base.get_first_success(&observers, path).await.ok()?;
        let envelope: ApiEnvelope<TransactionsPoolData> = decode_body(body).ok()?;
        Some(envelope.data?.transactions)
    }
}

fn invalid_field(message: &str, cause: &ProcessError) -> ProcessError {
    ProcessError::InvalidTxFields { message: message.to_string(), reason: cause.to_string() }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ProcessError> {
    serde_json::to_value(value).map_err(|e| ProcessError::Marshal(e.to_string()))
}

fn pool_path(fields: &str) -> String {
    if fields.is_empty() {
        TRANSACTION_POOL_PATH.to_string()
    } else {
        format!("{TRANSACTION_POOL_PATH}?fields={fields}")
    }
}

fn flatten_simulation(side: Result<TransactionSimulation, ProcessError>) -> TransactionSimulation {
    match side {
        Ok(result) => result,
        Err(e) => TransactionSimulation {
            fail_reason: e.to_string(),
            ..TransactionSimulation::default()
        },
    }
}

/// Applies the status reconciliation rules to the per-shard answers.
fn resolve_status_responses(
    responses: Vec<(u32, String)>,
    sender_shard: Option<u32>,
) -> Result<String, ProcessError> {
    let mut determined: Vec<(u32, String)> = responses
        .into_iter()
        .filter(|(_, status)| status != UNKNOWN_STATUS_TX)
        .collect();

    match determined.len() {
        0 => Ok(UNKNOWN_STATUS_TX.to_string()),
        1 => Ok(determined.remove(0).1),
        _ => {
            let Some(sender_shard) = sender_shard else {
                return Err(ProcessError::CannotGetTransactionStatus);
            };

            // Destination-shard execution is authoritative; the sender
            // shard's answer is dropped from the conflict.
            let destination: Vec<String> = determined
                .into_iter()
                .filter(|(shard, _)| *shard != sender_shard)
                .map(|(_, status)| status)
                .collect();

            match destination.split_first() {
                Some((first, rest)) if rest.iter().all(|status| status == first) => {
                    Ok(first.clone())
                }
                _ => Err(ProcessError::CannotGetTransactionStatus),
            }
        }
    }
}

fn log_undecodable_reply(observer: &Observer, error: &ProcessError) {
    tracing::warn!(
        shard = observer.shard_id,
        observer = %observer.address,
        error = %error,
        "observer reply undecodable"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{HexAddressCodec, JsonMarshaller, Sha256Hasher};
    use crate::observer::{ObserverKind, ObserverPool};
    use crate::process::testing::{ok_reply, status_reply, StubCaller, StubRouter};
    use crate::types::SmartContractResult;
    use serde_json::json;

    const SENDER_SHARD_0: &str = "626262626262"; // hex of "bbbbbb"
    const SENDER_SHARD_1: &str = "636363636363"; // hex of "cccccc"

    fn observer(address: &str, shard_id: u32) -> Observer {
        Observer::new(address, shard_id, ObserverKind::Observer)
    }

    fn full_history(address: &str, shard_id: u32) -> Observer {
        Observer::new(address, shard_id, ObserverKind::FullHistoryObserver)
    }

    fn two_shard_router() -> StubRouter {
        StubRouter::with_table(&[(b"bbbbbb", 0), (b"cccccc", 1)])
    }

    fn processor(
        observers: Vec<Observer>,
        router: StubRouter,
        caller: Arc<StubCaller>,
        mempool_enabled: bool,
    ) -> TransactionProcessor {
        let hasher: Arc<dyn Hasher> = Arc::new(Sha256Hasher);
        let base = BaseProcessor::new(
            Arc::new(ObserverPool::new(observers)),
            Arc::new(router),
            caller,
        );
        TransactionProcessor::new(
            base,
            Arc::new(HexAddressCodec::lenient()),
            Arc::clone(&hasher),
            Arc::new(JsonMarshaller),
            OutcomeParser,
            LogsMerger::new(hasher),
            mempool_enabled,
        )
    }

    fn valid_tx(sender: &str) -> Transaction {
        Transaction {
            nonce: 1,
            value: "1000".to_string(),
            receiver: SENDER_SHARD_0.to_string(),
            sender: sender.to_string(),
            gas_price: 12,
            gas_limit: 13,
            data: None,
            signature: "abcdabcd".to_string(),
            chain_id: "chain".to_string(),
            version: 1,
            ..Transaction::default()
        }
    }

    // --- send_transaction ---

    #[tokio::test]
    async fn send_succeeds_after_first_observer_down() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0a" {
                status_reply(404, "")
            } else {
                ok_reply(json!({ "data": { "txHash": "HASH123" } }))
            }
        }));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let hash = tp.send_transaction(&valid_tx(SENDER_SHARD_0)).await.unwrap();
        assert_eq!(hash, "HASH123");
        assert_eq!(caller.contacted(), vec!["obs-0a", "obs-0b"]);
    }

    #[tokio::test]
    async fn send_returns_authoritative_rejection_without_retrying() {
        let caller = Arc::new(StubCaller::new(|_, _, _| status_reply(400, "bad nonce")));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let err = tp.send_transaction(&valid_tx(SENDER_SHARD_0)).await.unwrap_err();
        match err {
            ProcessError::ObserverRejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad nonce");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(caller.contacted(), vec!["obs-0a"]);
    }

    #[tokio::test]
    async fn send_fails_when_every_observer_is_unavailable() {
        let caller = Arc::new(StubCaller::new(|_, _, _| status_reply(408, "")));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let err = tp.send_transaction(&valid_tx(SENDER_SHARD_0)).await.unwrap_err();
        assert!(matches!(err, ProcessError::SendingRequest));
        assert_eq!(caller.contacted().len(), 2);
    }

    #[tokio::test]
    async fn send_rejects_invalid_fields_without_dispatch() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(
            vec![observer("obs-0a", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut bad_sender = valid_tx("not-hex!");
        bad_sender.sender = "not-hex!".to_string();
        assert!(matches!(
            tp.send_transaction(&bad_sender).await.unwrap_err(),
            ProcessError::InvalidTxFields { .. }
        ));

        let mut no_chain = valid_tx(SENDER_SHARD_0);
        no_chain.chain_id.clear();
        assert!(matches!(
            tp.send_transaction(&no_chain).await.unwrap_err(),
            ProcessError::InvalidTxFields { .. }
        ));

        let mut no_version = valid_tx(SENDER_SHARD_0);
        no_version.version = 0;
        assert!(matches!(
            tp.send_transaction(&no_version).await.unwrap_err(),
            ProcessError::InvalidTxFields { .. }
        ));

        let mut bad_value = valid_tx(SENDER_SHARD_0);
        bad_value.value = "12x".to_string();
        assert!(matches!(
            tp.send_transaction(&bad_value).await.unwrap_err(),
            ProcessError::InvalidTxFields { .. }
        ));

        assert!(caller.contacted().is_empty());
    }

    // --- send_multiple_transactions ---

    #[tokio::test]
    async fn multi_send_partitions_by_sender_shard_and_merges_hashes() {
        let caller = Arc::new(StubCaller::new(|_, _, body| {
            let batch = body.unwrap().as_array().unwrap();
            assert_eq!(batch.len(), 2);
            ok_reply(json!({
                "data": { "numOfTxs": 2, "txsHashes": { "0": "local0", "1": "local1" } }
            }))
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let txs = vec![
            valid_tx(SENDER_SHARD_0),
            valid_tx(SENDER_SHARD_0),
            valid_tx(SENDER_SHARD_1),
            valid_tx(SENDER_SHARD_1),
        ];
        let result = tp.send_multiple_transactions(&txs).await.unwrap();

        assert_eq!(result.num_of_txs, 4);
        assert_eq!(result.txs_hashes.len(), 4);
        assert_eq!(result.txs_hashes[&0], "local0");
        assert_eq!(result.txs_hashes[&1], "local1");
        assert_eq!(result.txs_hashes[&2], "local0");
        assert_eq!(result.txs_hashes[&3], "local1");
    }

    #[tokio::test]
    async fn multi_send_drops_invalid_transactions_but_continues() {
        let caller = Arc::new(StubCaller::new(|_, _, body| {
            let batch = body.unwrap().as_array().unwrap();
            ok_reply(json!({
                "data": { "numOfTxs": batch.len(), "txsHashes": { "0": "h" } }
            }))
        }));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut invalid = valid_tx(SENDER_SHARD_0);
        invalid.signature = "zz".to_string();
        let txs = vec![invalid, valid_tx(SENDER_SHARD_0)];

        let result = tp.send_multiple_transactions(&txs).await.unwrap();
        assert_eq!(result.num_of_txs, 1);
        // The surviving transaction had original index 1.
        assert_eq!(result.txs_hashes[&1], "h");
    }

    #[tokio::test]
    async fn multi_send_with_no_valid_transaction_fails() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut invalid = valid_tx(SENDER_SHARD_0);
        invalid.chain_id.clear();

        let err = tp.send_multiple_transactions(&[invalid]).await.unwrap_err();
        assert!(matches!(err, ProcessError::NoValidTransactionToSend));
        assert!(caller.contacted().is_empty());
    }

    #[tokio::test]
    async fn multi_send_failed_shard_contributes_zero() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                status_reply(500, "down")
            } else {
                ok_reply(json!({
                    "data": { "numOfTxs": 1, "txsHashes": { "0": "h1" } }
                }))
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let txs = vec![valid_tx(SENDER_SHARD_0), valid_tx(SENDER_SHARD_1)];
        let result = tp.send_multiple_transactions(&txs).await.unwrap();
        assert_eq!(result.num_of_txs, 1);
        assert_eq!(result.txs_hashes[&1], "h1");
        assert!(result.txs_hashes.get(&0).is_none());
    }

    // --- simulate_transaction ---

    #[tokio::test]
    async fn simulate_intra_shard_returns_single_result() {
        let caller = Arc::new(StubCaller::new(|_, path, _| {
            assert_eq!(path, TRANSACTION_SIMULATE_PATH);
            ok_reply(json!({ "data": { "result": { "failReason": "fail reason" } } }))
        }));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut tx = valid_tx(SENDER_SHARD_0);
        tx.receiver = SENDER_SHARD_0.to_string();

        match tp.simulate_transaction(&tx).await.unwrap() {
            SimulationReply::SingleShard { result } => {
                assert_eq!(result.fail_reason, "fail reason");
            }
            SimulationReply::CrossShard { .. } => panic!("expected single-shard reply"),
        }
    }

    #[tokio::test]
    async fn simulate_cross_shard_reports_both_roles() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(json!({ "data": { "result": { "status": "ok" } } }))
            } else {
                ok_reply(json!({
                    "data": { "result": { "status": "not ok", "failReason": "fail reason" } }
                }))
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut tx = valid_tx(SENDER_SHARD_0);
        tx.receiver = SENDER_SHARD_1.to_string();

        match tp.simulate_transaction(&tx).await.unwrap() {
            SimulationReply::CrossShard { result } => {
                assert_eq!(result[SENDER_SHARD_ROLE].status, "ok");
                assert_eq!(result[RECEIVER_SHARD_ROLE].status, "not ok");
                assert_eq!(result[RECEIVER_SHARD_ROLE].fail_reason, "fail reason");
            }
            SimulationReply::SingleShard { .. } => panic!("expected cross-shard reply"),
        }
    }

    #[tokio::test]
    async fn simulate_cross_shard_keeps_surviving_side_when_other_fails() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(json!({ "data": { "result": { "status": "ok" } } }))
            } else {
                Err(crate::client::CallError::Timeout)
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let mut tx = valid_tx(SENDER_SHARD_0);
        tx.receiver = SENDER_SHARD_1.to_string();

        match tp.simulate_transaction(&tx).await.unwrap() {
            SimulationReply::CrossShard { result } => {
                assert_eq!(result[SENDER_SHARD_ROLE].status, "ok");
                assert!(!result[RECEIVER_SHARD_ROLE].fail_reason.is_empty());
            }
            SimulationReply::SingleShard { .. } => panic!("expected cross-shard reply"),
        }
    }

    // --- transaction_cost ---

    #[tokio::test]
    async fn cost_request_skips_metachain_observers() {
        let caller = Arc::new(StubCaller::new(|address, path, _| {
            assert_eq!(path, TRANSACTION_COST_PATH);
            assert_ne!(address, "obs-meta");
            ok_reply(json!({ "data": { "txGasUnits": 6100 } }))
        }));
        let tp = processor(
            vec![observer("obs-meta", METACHAIN_SHARD_ID), observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let cost = tp.transaction_cost(&valid_tx(SENDER_SHARD_0)).await.unwrap();
        assert_eq!(cost, "6100");
        assert_eq!(caller.contacted(), vec!["obs-0"]);
    }

    // --- get_transaction ---

    fn tx_body(tx: &FullTransaction) -> serde_json::Value {
        json!({ "data": { "transaction": tx } })
    }

    #[tokio::test]
    async fn get_transaction_returns_first_candidate() {
        let found = FullTransaction {
            nonce: 37,
            sender: SENDER_SHARD_0.to_string(),
            ..FullTransaction::default()
        };
        let body = tx_body(&found);
        let caller = Arc::new(StubCaller::new(move |address, _, _| {
            if address == "obs-0" {
                ok_reply(body.clone())
            } else {
                status_reply(502, "")
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let tx = tp.get_transaction("hash0", false, None).await.unwrap();
        assert_eq!(tx.nonce, 37);
    }

    #[tokio::test]
    async fn get_transaction_tries_next_observer_on_transport_error() {
        let found = FullTransaction {
            nonce: 5,
            sender: SENDER_SHARD_0.to_string(),
            ..FullTransaction::default()
        };
        let body = tx_body(&found);
        let caller = Arc::new(StubCaller::new(move |address, _, _| {
            if address == "obs-0a" {
                Err(crate::client::CallError::Connection("refused".to_string()))
            } else {
                ok_reply(body.clone())
            }
        }));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let tx = tp.get_transaction("hash0", false, None).await.unwrap();
        assert_eq!(tx.nonce, 5);
        assert_eq!(caller.contacted(), vec!["obs-0a", "obs-0b"]);
    }

    #[tokio::test]
    async fn get_transaction_does_not_retry_within_shard_on_http_status() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            assert_ne!(address, "obs-0b", "second observer should not be called");
            status_reply(500, "")
        }));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let err = tp.get_transaction("hash0", false, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::TransactionNotFound));
        assert_eq!(caller.contacted(), vec!["obs-0a"]);
    }

    #[tokio::test]
    async fn get_transaction_merges_cross_shard_results() {
        let sc1 = SmartContractResult { hash: "scHash1".into(), ..SmartContractResult::default() };
        let sc2 = SmartContractResult { hash: "scHash2".into(), ..SmartContractResult::default() };
        let sc3 = SmartContractResult { hash: "scHash3".into(), ..SmartContractResult::default() };

        let destination_view = FullTransaction {
            nonce: 37,
            sender: SENDER_SHARD_0.to_string(),
            receiver: SENDER_SHARD_1.to_string(),
            source_shard: 0,
            destination_shard: 1,
            status: "success".to_string(),
            sc_results: vec![sc1, sc2.clone()],
            ..FullTransaction::default()
        };
        let source_view = FullTransaction {
            nonce: 37,
            sender: SENDER_SHARD_0.to_string(),
            source_shard: 0,
            destination_shard: 1,
            status: "pending".to_string(),
            sc_results: vec![sc2, sc3],
            ..FullTransaction::default()
        };

        let destination_body = tx_body(&destination_view);
        let source_body = tx_body(&source_view);
        let caller = Arc::new(StubCaller::new(move |address, path, _| {
            assert!(path.contains("withResults=true"));
            if address == "obs-1" {
                ok_reply(destination_body.clone())
            } else {
                ok_reply(source_body.clone())
            }
        }));

        // Declared shard order puts the destination shard first, as in the
        // scan that found the candidate there.
        let tp = processor(
            vec![full_history("obs-1", 1), full_history("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let tx = tp.get_transaction("hash0", true, None).await.unwrap();
        assert_eq!(tx.nonce, 37);
        assert_eq!(tx.sc_results.len(), 3);
        assert_eq!(tx.status, "success");
    }

    #[tokio::test]
    async fn get_transaction_with_sender_hint_scans_sender_shard_first() {
        let found = FullTransaction {
            nonce: 9,
            sender: SENDER_SHARD_1.to_string(),
            ..FullTransaction::default()
        };
        let body = tx_body(&found);
        let caller = Arc::new(StubCaller::new(move |address, _, _| {
            assert_eq!(address, "obs-1", "only the sender shard should be asked");
            ok_reply(body.clone())
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let tx = tp.get_transaction("hash0", false, Some(SENDER_SHARD_1)).await.unwrap();
        assert_eq!(tx.nonce, 9);
        assert_eq!(caller.contacted(), vec!["obs-1"]);
    }

    #[tokio::test]
    async fn get_transaction_outcome_decodes_a_signal_error() {
        let failed = FullTransaction {
            nonce: 7,
            sender: SENDER_SHARD_0.to_string(),
            receiver: SENDER_SHARD_0.to_string(),
            status: "fail".to_string(),
            logs: Some(crate::types::ApiLogs {
                address: SENDER_SHARD_0.to_string(),
                events: vec![crate::types::Event {
                    identifier: "signalError".to_string(),
                    topics: vec!["something happened".to_string()],
                    data: Some("@75736572206572726f72@07".to_string()),
                    ..crate::types::Event::default()
                }],
            }),
            ..FullTransaction::default()
        };
        let body = tx_body(&failed);
        let caller = Arc::new(StubCaller::new(move |_, path, _| {
            assert!(path.contains("withResults=true"));
            ok_reply(body.clone())
        }));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let outcome = tp.get_transaction_outcome("hash0", None).await.unwrap().unwrap();
        assert_eq!(outcome.return_code, crate::outcome::ReturnCode::UserError);
        assert_eq!(outcome.return_message, "something happened");
        assert_eq!(outcome.values, vec![b"07".to_vec()]);
    }

    #[tokio::test]
    async fn get_transaction_outcome_decodes_a_too_much_gas_warning() {
        let warning =
            "@too much gas provided for processing: gas provided = 596384500, gas used = 733010";
        let executed = FullTransaction {
            nonce: 8,
            sender: SENDER_SHARD_0.to_string(),
            receiver: SENDER_SHARD_0.to_string(),
            status: "success".to_string(),
            logs: Some(crate::types::ApiLogs {
                address: SENDER_SHARD_0.to_string(),
                events: vec![crate::types::Event {
                    identifier: "writeLog".to_string(),
                    topics: vec![warning.to_string()],
                    data: Some("@6f6b".to_string()),
                    ..crate::types::Event::default()
                }],
            }),
            ..FullTransaction::default()
        };
        let body = tx_body(&executed);
        let caller =
            Arc::new(StubCaller::new(move |_, _, _| ok_reply(body.clone())));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let outcome = tp.get_transaction_outcome("hash0", None).await.unwrap().unwrap();
        assert_eq!(outcome.return_code, crate::outcome::ReturnCode::Ok);
        assert_eq!(outcome.return_message, warning);
        assert!(outcome.values.is_empty());
    }

    #[tokio::test]
    async fn get_transaction_outcome_without_artifacts_is_undeterminable() {
        let plain = FullTransaction {
            nonce: 9,
            sender: SENDER_SHARD_0.to_string(),
            status: "success".to_string(),
            ..FullTransaction::default()
        };
        let body = tx_body(&plain);
        let caller =
            Arc::new(StubCaller::new(move |_, _, _| ok_reply(body.clone())));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        assert!(tp.get_transaction_outcome("hash0", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_transaction_not_found_anywhere() {
        let caller = Arc::new(StubCaller::new(|_, _, _| status_reply(404, "")));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let err = tp.get_transaction("hash0", false, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::TransactionNotFound));
    }

    // --- get_transaction_status ---

    fn status_body(status: &str) -> serde_json::Value {
        json!({ "data": { "status": status } })
    }

    #[tokio::test]
    async fn status_single_shard_answer_wins() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(status_body("executed"))
            } else {
                status_reply(502, "")
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let status = tp.get_transaction_status("hash0", None).await.unwrap();
        assert_eq!(status, "executed");
    }

    #[tokio::test]
    async fn status_unknown_answers_are_dropped() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(status_body(UNKNOWN_STATUS_TX))
            } else {
                ok_reply(status_body("partially-executed"))
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let status = tp.get_transaction_status("hash0", None).await.unwrap();
        assert_eq!(status, "partially-executed");
    }

    #[tokio::test]
    async fn status_all_unknown_resolves_to_unknown() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(status_body(UNKNOWN_STATUS_TX))));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let status = tp.get_transaction_status("hash0", None).await.unwrap();
        assert_eq!(status, UNKNOWN_STATUS_TX);
    }

    #[tokio::test]
    async fn status_conflict_without_hint_is_an_error() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(status_body("executed"))
            } else {
                ok_reply(status_body("invalid"))
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        let err = tp.get_transaction_status("hash0", None).await.unwrap_err();
        assert!(matches!(err, ProcessError::CannotGetTransactionStatus));
    }

    #[tokio::test]
    async fn status_conflict_with_sender_hint_trusts_destination_shard() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0" {
                ok_reply(status_body("executed"))
            } else {
                ok_reply(status_body("invalid"))
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        // The sender routes to shard 0, so shard 1 is the destination.
        let status =
            tp.get_transaction_status("hash0", Some(SENDER_SHARD_0)).await.unwrap();
        assert_eq!(status, "invalid");
    }

    // --- compute_transaction_hash ---

    #[test]
    fn compute_hash_is_deterministic_and_matches_marshalled_digest() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(vec![observer("obs-0", 0)], two_shard_router(), caller, false);

        let tx = Transaction {
            nonce: 1,
            value: "1000".to_string(),
            receiver: "7c3f38ab6d2f961de7e5ad914cdbd0b6361b5ddb".to_string(),
            sender: "7c3f38ab6d2f961de7e5ad914cdbd0b6361b5ddb".to_string(),
            gas_price: 12,
            gas_limit: 13,
            data: Some("aGVsbG8=".to_string()),
            signature: "5e97b3bb223acfe3a152bb8e7fec31909059c90f".to_string(),
            chain_id: "1".to_string(),
            version: 1,
            ..Transaction::default()
        };

        let expected = {
            let canonical = CanonicalTransaction {
                nonce: 1,
                value: "1000".to_string(),
                receiver: hex::decode("7c3f38ab6d2f961de7e5ad914cdbd0b6361b5ddb").unwrap(),
                sender: hex::decode("7c3f38ab6d2f961de7e5ad914cdbd0b6361b5ddb").unwrap(),
                gas_price: 12,
                gas_limit: 13,
                data: Some(b"aGVsbG8=".to_vec()),
                chain_id: b"1".to_vec(),
                version: 1,
                signature: hex::decode("5e97b3bb223acfe3a152bb8e7fec31909059c90f").unwrap(),
                options: None,
            };
            let marshalled = JsonMarshaller.marshal(&canonical).unwrap();
            hex::encode(Sha256Hasher.hash(&marshalled))
        };

        let first = tp.compute_transaction_hash(&tx).unwrap();
        let second = tp.compute_transaction_hash(&tx).unwrap();
        assert_eq!(first, expected);
        assert_eq!(first, second);
    }

    #[test]
    fn compute_hash_normalizes_the_value_field() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(vec![observer("obs-0", 0)], two_shard_router(), caller, false);

        let mut tx = valid_tx(SENDER_SHARD_0);
        tx.value = "0001000".to_string();
        let padded = tp.compute_transaction_hash(&tx).unwrap();

        tx.value = "1000".to_string();
        let plain = tp.compute_transaction_hash(&tx).unwrap();
        assert_eq!(padded, plain);
    }

    #[test]
    fn compute_hash_rejects_undecodable_fields() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(vec![observer("obs-0", 0)], two_shard_router(), caller, false);

        let mut bad_value = valid_tx(SENDER_SHARD_0);
        bad_value.value = "aaaa".to_string();
        assert!(matches!(
            tp.compute_transaction_hash(&bad_value).unwrap_err(),
            ProcessError::InvalidTransactionValueField(_)
        ));

        let mut bad_receiver = valid_tx(SENDER_SHARD_0);
        bad_receiver.receiver = "xx!".to_string();
        assert!(matches!(
            tp.compute_transaction_hash(&bad_receiver).unwrap_err(),
            ProcessError::InvalidAddress(_)
        ));

        let mut bad_signature = valid_tx(SENDER_SHARD_0);
        bad_signature.signature = "zzz".to_string();
        assert!(matches!(
            tp.compute_transaction_hash(&bad_signature).unwrap_err(),
            ProcessError::InvalidSignatureBytes(_)
        ));
    }

    // --- mempool views ---

    fn pool_body(sender: &str, nonce: u64, hash: &str) -> serde_json::Value {
        json!({
            "data": {
                "transactions": {
                    "regularTransactions": [{ "sender": sender, "nonce": nonce, "hash": hash }],
                    "smartContractResults": [],
                    "rewards": []
                }
            }
        })
    }

    fn empty_pool_body() -> serde_json::Value {
        json!({
            "data": {
                "transactions": {
                    "regularTransactions": [],
                    "smartContractResults": [],
                    "rewards": []
                }
            }
        })
    }

    #[tokio::test]
    async fn mempool_endpoints_are_gated_by_the_feature_flag() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({}))));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            false,
        );

        assert!(matches!(
            tp.get_transactions_pool("").await.unwrap_err(),
            ProcessError::OperationNotAllowed
        ));
        assert!(matches!(
            tp.get_transactions_pool_for_shard(0, "").await.unwrap_err(),
            ProcessError::OperationNotAllowed
        ));
        assert!(matches!(
            tp.get_transactions_pool_for_sender(SENDER_SHARD_0, "").await.unwrap_err(),
            ProcessError::OperationNotAllowed
        ));
        assert!(matches!(
            tp.get_last_pool_nonce_for_sender(SENDER_SHARD_0).await.unwrap_err(),
            ProcessError::OperationNotAllowed
        ));
        assert!(matches!(
            tp.get_transactions_pool_nonce_gaps_for_sender(SENDER_SHARD_0).await.unwrap_err(),
            ProcessError::OperationNotAllowed
        ));

        // Gating must short-circuit before any upstream call.
        assert!(caller.contacted().is_empty());
    }

    #[tokio::test]
    async fn pool_view_concatenates_shard_views() {
        let caller = Arc::new(StubCaller::new(|address, path, _| {
            assert!(path.starts_with(TRANSACTION_POOL_PATH));
            match address {
                "obs-0" => ok_reply(pool_body("aaaa", 101, "hash-sh0")),
                "obs-1" => ok_reply(pool_body("bbbb", 111, "hash-sh1")),
                _ => ok_reply(empty_pool_body()),
            }
        }));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1), observer("obs-2", 2)],
            two_shard_router(),
            Arc::clone(&caller),
            true,
        );

        let pool = tp.get_transactions_pool("sender,nonce").await.unwrap();
        assert_eq!(pool.regular_transactions.len(), 2);
        assert!(pool.smart_contract_results.is_empty());
        assert!(pool.rewards.is_empty());
    }

    #[tokio::test]
    async fn pool_view_empty_everywhere_is_not_found() {
        let caller = Arc::new(StubCaller::new(|_, _, _| ok_reply(empty_pool_body())));
        let tp = processor(
            vec![observer("obs-0", 0), observer("obs-1", 1)],
            two_shard_router(),
            Arc::clone(&caller),
            true,
        );

        let err = tp.get_transactions_pool("").await.unwrap_err();
        assert!(matches!(err, ProcessError::TransactionsNotFoundInPool));
    }

    #[tokio::test]
    async fn pool_for_shard_returns_first_non_empty_view() {
        let caller = Arc::new(StubCaller::new(|address, _, _| {
            if address == "obs-0a" {
                ok_reply(empty_pool_body())
            } else {
                ok_reply(pool_body("aaaa", 7, "hash7"))
            }
        }));
        let tp = processor(
            vec![observer("obs-0a", 0), observer("obs-0b", 0)],
            two_shard_router(),
            Arc::clone(&caller),
            true,
        );

        let pool = tp.get_transactions_pool_for_shard(0, "").await.unwrap();
        assert_eq!(pool.regular_transactions.len(), 1);
        assert_eq!(caller.contacted(), vec!["obs-0a", "obs-0b"]);
    }

    #[tokio::test]
    async fn last_pool_nonce_zero_is_a_valid_reply() {
        let caller = Arc::new(StubCaller::new(|_, path, _| {
            assert!(path.contains("last-nonce?by-sender="));
            ok_reply(json!({ "data": { "nonce": 0 } }))
        }));
        let tp = processor(vec![observer("obs-0", 0)], two_shard_router(), caller, true);

        let nonce = tp.get_last_pool_nonce_for_sender(SENDER_SHARD_0).await.unwrap();
        assert_eq!(nonce, 0);
    }

    #[tokio::test]
    async fn nonce_gaps_decode_and_absence_is_not_found() {
        let caller = Arc::new(StubCaller::new(|_, _, _| {
            ok_reply(json!({
                "data": { "nonceGaps": { "gaps": [{ "from": 3, "to": 5 }] } }
            }))
        }));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            caller,
            true,
        );
        let gaps = tp
            .get_transactions_pool_nonce_gaps_for_sender(SENDER_SHARD_0)
            .await
            .unwrap();
        assert_eq!(gaps.gaps, vec![crate::types::NonceGap { from: 3, to: 5 }]);

        let absent_caller =
            Arc::new(StubCaller::new(|_, _, _| ok_reply(json!({ "error": "", "code": "" }))));
        let tp = processor(
            vec![observer("obs-0", 0)],
            two_shard_router(),
            absent_caller,
            true,
        );
        let err = tp
            .get_transactions_pool_nonce_gaps_for_sender(SENDER_SHARD_0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NonceGapsNotFoundInPool));
    }
}
