//! Wire types shared between the proxy and the observer nodes.
//!
//! Every type here is request-scoped and immutable after construction. All
//! shapes tolerate unknown JSON fields: observers evolve their API faster
//! than the proxy, and the proxy must pass replies through unharmed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role keys used in a cross-shard simulation reply.
pub const SENDER_SHARD_ROLE: &str = "senderShard";
/// See [`SENDER_SHARD_ROLE`].
pub const RECEIVER_SHARD_ROLE: &str = "receiverShard";

/// Status string an observer reports for a transaction it has not executed.
pub const UNKNOWN_STATUS_TX: &str = "unknown";

/// A transaction as submitted by a client.
///
/// `value` must parse as a non-negative arbitrary-precision integer,
/// `sender` and `receiver` must decode through the address codec,
/// `signature` must be an even-length hex string, `chain_id` must be
/// non-empty and `version >= 1`. Validation happens in the transaction
/// processor before any dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub nonce: u64,
    pub value: String,
    pub receiver: String,
    pub sender: String,
    #[serde(rename = "senderUsername", skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(rename = "receiverUsername", skip_serializing_if = "Option::is_none")]
    pub receiver_username: Option<String>,
    #[serde(rename = "gasPrice")]
    pub gas_price: u64,
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    /// Opaque payload; forwarded byte-for-byte.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub signature: String,
    #[serde(rename = "chainID")]
    pub chain_id: String,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<u32>,
}

/// A transaction as reported back by an observer, including execution
/// artifacts gathered from its shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullTransaction {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub sender: String,
    #[serde(rename = "gasPrice", default)]
    pub gas_price: u64,
    #[serde(rename = "gasLimit", default)]
    pub gas_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(rename = "sourceShard", default)]
    pub source_shard: u32,
    #[serde(rename = "destinationShard", default)]
    pub destination_shard: u32,
    #[serde(rename = "blockNonce", default)]
    pub block_nonce: u64,
    #[serde(rename = "miniblockType", default, skip_serializing_if = "String::is_empty")]
    pub miniblock_type: String,
    #[serde(rename = "miniblockHash", default, skip_serializing_if = "String::is_empty")]
    pub miniblock_hash: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "smartContractResults", default, skip_serializing_if = "Vec::is_empty")]
    pub sc_results: Vec<SmartContractResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<ApiLogs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<serde_json::Value>,
}

impl FullTransaction {
    /// An observer that does not know the hash answers 200 with an empty
    /// transaction object; such a reply is not a candidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty() && self.receiver.is_empty() && self.nonce == 0
    }
}

/// An internal transaction produced by smart-contract execution.
///
/// Identity is `hash`: two results with equal hashes are the same result and
/// are deduplicated when merging replies from different shards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartContractResult {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "returnMessage", default)]
    pub return_message: String,
    #[serde(rename = "originalTxHash", default, skip_serializing_if = "String::is_empty")]
    pub original_tx_hash: String,
    #[serde(rename = "prevTxHash", default, skip_serializing_if = "String::is_empty")]
    pub prev_tx_hash: String,
    #[serde(rename = "callType", default)]
    pub call_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<ApiLogs>,
}

/// Event log container attached to a transaction or contract result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiLogs {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A single VM event.
///
/// Topics arrive either base64-encoded or raw depending on the observer
/// version; consumers must accept both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Generic observer reply envelope: `{ data, error, code }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub code: String,
}

/// `data` shape of `POST /transaction/send`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendTransactionData {
    #[serde(rename = "txHash", default)]
    pub tx_hash: String,
}

/// `data` shape of `POST /transaction/send-multiple`.
///
/// `txs_hashes` is keyed by the index of the transaction in the submitted
/// batch; when batches are partitioned by shard the proxy re-keys entries to
/// the indices of the original client request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipleTransactionsData {
    #[serde(rename = "numOfTxs", default)]
    pub num_of_txs: u64,
    #[serde(rename = "txsHashes", default)]
    pub txs_hashes: HashMap<u64, String>,
}

/// `data` shape of `POST /transaction/cost`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionCostData {
    #[serde(rename = "txGasUnits", default)]
    pub tx_gas_units: u64,
}

/// `data` shape of `GET /transaction/{hash}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTransactionData {
    #[serde(default)]
    pub transaction: FullTransaction,
}

/// `data` shape of `GET /transaction/{hash}/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionStatusData {
    #[serde(default)]
    pub status: String,
}

/// Result of simulating a transaction on one shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSimulation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(rename = "failReason", default, skip_serializing_if = "String::is_empty")]
    pub fail_reason: String,
    #[serde(rename = "scResults", default, skip_serializing_if = "Option::is_none")]
    pub sc_results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipts: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

/// `data` shape of `POST /transaction/simulate` as answered by one
/// observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationResultData {
    #[serde(default)]
    pub result: TransactionSimulation,
}

/// Simulation reply: intra-shard simulations carry a single result,
/// cross-shard simulations one result per role (`senderShard` /
/// `receiverShard`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimulationReply {
    CrossShard { result: HashMap<String, TransactionSimulation> },
    SingleShard { result: TransactionSimulation },
}

/// Aggregated mempool view: three disjoint transaction classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionsPool {
    #[serde(rename = "regularTransactions", default)]
    pub regular_transactions: Vec<WrappedTransaction>,
    #[serde(rename = "smartContractResults", default)]
    pub smart_contract_results: Vec<WrappedTransaction>,
    #[serde(default)]
    pub rewards: Vec<WrappedTransaction>,
}

impl TransactionsPool {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regular_transactions.is_empty() &&
            self.smart_contract_results.is_empty() &&
            self.rewards.is_empty()
    }

    /// Moves every entry of `other` into `self`.
    pub fn absorb(&mut self, other: TransactionsPool) {
        self.regular_transactions.extend(other.regular_transactions);
        self.smart_contract_results.extend(other.smart_contract_results);
        self.rewards.extend(other.rewards);
    }
}

/// A pool transaction as an ordered property bag.
///
/// The upstream schema for pool entries evolves independently of the proxy;
/// unknown keys are preserved and passed through in their original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedTransaction {
    pub tx_fields: serde_json::Map<String, serde_json::Value>,
}

/// `data` shape of `GET /transaction/pool`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionsPoolData {
    #[serde(default)]
    pub transactions: TransactionsPool,
}

/// `data` shape of `GET /transaction/pool/last-nonce`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastPoolNonceData {
    #[serde(default)]
    pub nonce: u64,
}

/// An inclusive nonce range missing from the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceGap {
    pub from: u64,
    pub to: u64,
}

/// Nonce gaps reported for one sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolNonceGaps {
    #[serde(default)]
    pub gaps: Vec<NonceGap>,
}

/// `data` shape of `GET /transaction/pool/nonce-gaps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolNonceGapsData {
    #[serde(rename = "nonceGaps", default)]
    pub nonce_gaps: PoolNonceGaps,
}

/// `data` shape of `GET /validator/auction`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionListResponse {
    #[serde(rename = "auctionList", default)]
    pub auction_list: Vec<serde_json::Value>,
}

/// A read-only smart-contract query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScQuery {
    #[serde(rename = "scAddress", default)]
    pub sc_address: String,
    #[serde(rename = "funcName", default)]
    pub func_name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// VM output of a read-only query, shape-as-received from the observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmOutput {
    #[serde(rename = "returnData", default)]
    pub return_data: Vec<String>,
    #[serde(rename = "returnCode", default)]
    pub return_code: String,
    #[serde(rename = "returnMessage", default)]
    pub return_message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `data` shape of `POST /vm-values/query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmQueryData {
    #[serde(default)]
    pub data: VmOutput,
}

/// `data` shape of `GET /address/{address}/key/{key}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueForKeyData {
    #[serde(default)]
    pub value: String,
}
