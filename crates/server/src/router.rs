//! Route table and request handlers.
//!
//! Handlers are thin: bind the request, call the injected processor,
//! wrap the answer in the gateway envelope. Network metric handlers pass
//! the observer reply through untouched.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::json;

use shardgate_core::errors::ProcessError;
use shardgate_core::outcome::Outcome;
use shardgate_core::process::{
    AccountProcessor, NetworkProcessor, TransactionProcessor, ValidatorProcessor,
    VmQueryProcessor,
};
use shardgate_core::types::{ScQuery, Transaction, VmOutput};

use crate::response::GatewayResult;

/// Explicitly injected processors; one instance per process.
pub struct AppState {
    pub transactions: TransactionProcessor,
    pub network: NetworkProcessor,
    pub validators: ValidatorProcessor,
    pub vm_queries: VmQueryProcessor,
    pub accounts: AccountProcessor,
}

/// Builds the client-facing route table.
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/transaction/send", post(send_transaction))
        .route("/transaction/send-multiple", post(send_multiple_transactions))
        .route("/transaction/cost", post(transaction_cost))
        .route("/transaction/simulate", post(simulate_transaction))
        .route("/transaction/pool", get(transactions_pool))
        .route("/transaction/pool/last-nonce", get(last_pool_nonce))
        .route("/transaction/pool/nonce-gaps", get(pool_nonce_gaps))
        .route("/transaction/:hash", get(get_transaction))
        .route("/transaction/:hash/status", get(get_transaction_status))
        .route("/transaction/:hash/outcome", get(get_transaction_outcome))
        .route("/network/status/:shard", get(network_status))
        .route("/network/config", get(network_config))
        .route("/network/economics", get(network_economics))
        .route("/network/esdts", get(network_esdts))
        .route("/enable-epochs", get(enable_epochs))
        .route("/validator/auction", get(auction_list))
        .route("/vm-values/query", post(vm_query))
        .route("/vm-values/hex", post(vm_value_hex))
        .route("/vm-values/string", post(vm_value_string))
        .route("/vm-values/int", post(vm_value_int))
        .route("/address/:address/key/:key", get(value_for_key))
        .with_state(state)
}

// --- transaction handlers ---

async fn send_transaction(
    State(state): State<Arc<AppState>>,
    Json(tx): Json<Transaction>,
) -> GatewayResult {
    state
        .transactions
        .send_transaction(&tx)
        .await
        .map(|hash| json!({ "txHash": hash }))
        .into()
}

async fn send_multiple_transactions(
    State(state): State<Arc<AppState>>,
    Json(txs): Json<Vec<Transaction>>,
) -> GatewayResult {
    state
        .transactions
        .send_multiple_transactions(&txs)
        .await
        .and_then(|data| {
            serde_json::to_value(data).map_err(|e| ProcessError::Marshal(e.to_string()))
        })
        .into()
}

async fn transaction_cost(
    State(state): State<Arc<AppState>>,
    Json(tx): Json<Transaction>,
) -> GatewayResult {
    state
        .transactions
        .transaction_cost(&tx)
        .await
        .map(|cost| json!({ "txGasUnits": cost }))
        .into()
}

async fn simulate_transaction(
    State(state): State<Arc<AppState>>,
    Json(tx): Json<Transaction>,
) -> GatewayResult {
    state
        .transactions
        .simulate_transaction(&tx)
        .await
        .and_then(|reply| {
            serde_json::to_value(reply).map_err(|e| ProcessError::Marshal(e.to_string()))
        })
        .into()
}

#[derive(Debug, Deserialize)]
struct GetTransactionQuery {
    #[serde(rename = "withResults", default)]
    with_results: bool,
    #[serde(default)]
    sender: Option<String>,
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<GetTransactionQuery>,
) -> GatewayResult {
    state
        .transactions
        .get_transaction(&hash, query.with_results, query.sender.as_deref())
        .await
        .map(|tx| json!({ "transaction": tx }))
        .into()
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    sender: Option<String>,
}

async fn get_transaction_status(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<StatusQuery>,
) -> GatewayResult {
    state
        .transactions
        .get_transaction_status(&hash, query.sender.as_deref())
        .await
        .map(|status| json!({ "status": status }))
        .into()
}

async fn get_transaction_outcome(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<StatusQuery>,
) -> GatewayResult {
    state
        .transactions
        .get_transaction_outcome(&hash, query.sender.as_deref())
        .await
        .map(|outcome| json!({ "outcome": outcome.map(present_outcome) }))
        .into()
}

/// Presentation of a parsed outcome: the return code as its status word,
/// value chunks base64-encoded.
fn present_outcome(outcome: Outcome) -> serde_json::Value {
    json!({
        "returnCode": outcome.return_code.as_str(),
        "returnMessage": outcome.return_message,
        "values": outcome
            .values
            .iter()
            .map(|value| base64::engine::general_purpose::STANDARD.encode(value))
            .collect::<Vec<_>>(),
    })
}

#[derive(Debug, Deserialize)]
struct PoolQuery {
    #[serde(rename = "shard-id", default)]
    shard_id: Option<u32>,
    #[serde(rename = "by-sender", default)]
    by_sender: Option<String>,
    #[serde(default)]
    fields: Option<String>,
}

async fn transactions_pool(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PoolQuery>,
) -> GatewayResult {
    let fields = query.fields.unwrap_or_default();
    let pool = match (query.by_sender, query.shard_id) {
        (Some(sender), _) => {
            state.transactions.get_transactions_pool_for_sender(&sender, &fields).await
        }
        (None, Some(shard_id)) => {
            state.transactions.get_transactions_pool_for_shard(shard_id, &fields).await
        }
        (None, None) => state.transactions.get_transactions_pool(&fields).await,
    };

    pool.map(|pool| json!({ "transactions": pool })).into()
}

#[derive(Debug, Deserialize)]
struct BySenderQuery {
    #[serde(rename = "by-sender")]
    by_sender: String,
}

async fn last_pool_nonce(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BySenderQuery>,
) -> GatewayResult {
    state
        .transactions
        .get_last_pool_nonce_for_sender(&query.by_sender)
        .await
        .map(|nonce| json!({ "nonce": nonce }))
        .into()
}

async fn pool_nonce_gaps(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BySenderQuery>,
) -> GatewayResult {
    state
        .transactions
        .get_transactions_pool_nonce_gaps_for_sender(&query.by_sender)
        .await
        .map(|gaps| json!({ "nonceGaps": gaps }))
        .into()
}

// --- network handlers (observer reply passed through untouched) ---

fn passthrough(result: Result<serde_json::Value, ProcessError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => GatewayResult(Err(e)).into_response(),
    }
}

async fn network_status(
    State(state): State<Arc<AppState>>,
    Path(shard): Path<u32>,
) -> Response {
    passthrough(state.network.get_network_status(shard).await)
}

async fn network_config(State(state): State<Arc<AppState>>) -> Response {
    passthrough(state.network.get_network_config().await)
}

async fn network_economics(State(state): State<Arc<AppState>>) -> Response {
    passthrough(state.network.get_economics().await)
}

async fn network_esdts(State(state): State<Arc<AppState>>) -> Response {
    passthrough(state.network.get_esdts().await)
}

async fn enable_epochs(State(state): State<Arc<AppState>>) -> Response {
    passthrough(state.network.get_enable_epochs().await)
}

// --- validator handlers ---

async fn auction_list(State(state): State<Arc<AppState>>) -> GatewayResult {
    state
        .validators
        .get_auction_list()
        .await
        .and_then(|auction| {
            serde_json::to_value(auction).map_err(|e| ProcessError::Marshal(e.to_string()))
        })
        .into()
}

// --- vm-values handlers ---

async fn vm_query(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ScQuery>,
) -> GatewayResult {
    state
        .vm_queries
        .execute_query(&query)
        .await
        .map(|output| json!({ "data": output }))
        .into()
}

async fn vm_value_hex(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ScQuery>,
) -> GatewayResult {
    state
        .vm_queries
        .execute_query(&query)
        .await
        .and_then(|output| first_return_bytes(&output))
        .map(|bytes| json!({ "data": hex::encode(bytes) }))
        .into()
}

async fn vm_value_string(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ScQuery>,
) -> GatewayResult {
    state
        .vm_queries
        .execute_query(&query)
        .await
        .and_then(|output| first_return_bytes(&output))
        .map(|bytes| json!({ "data": String::from_utf8_lossy(&bytes) }))
        .into()
}

async fn vm_value_int(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ScQuery>,
) -> GatewayResult {
    state
        .vm_queries
        .execute_query(&query)
        .await
        .and_then(|output| first_return_bytes(&output))
        .and_then(|bytes| {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            text.parse::<BigUint>().map_err(|_| {
                ProcessError::InvalidObserverResponse(format!(
                    "value {text} could not be converted to a big int"
                ))
            })
        })
        .map(|value| json!({ "data": value.to_string() }))
        .into()
}

/// The first return-data entry of a VM output, base64-decoded.
fn first_return_bytes(output: &VmOutput) -> Result<Vec<u8>, ProcessError> {
    let first = output.return_data.first().ok_or_else(|| {
        ProcessError::InvalidObserverResponse("vm output carries no return data".to_string())
    })?;
    base64::engine::general_purpose::STANDARD
        .decode(first)
        .map_err(|e| ProcessError::InvalidObserverResponse(e.to_string()))
}

// --- address handlers ---

async fn value_for_key(
    State(state): State<Arc<AppState>>,
    Path((address, key)): Path<(String, String)>,
) -> GatewayResult {
    state
        .accounts
        .get_value_for_key(&address, &key)
        .await
        .map(|value| json!({ "value": value }))
        .into()
}
