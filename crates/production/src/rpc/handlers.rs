//! HTTP handlers for the RPC API.
//!
//! Writes travel as client events into the runner and wait on a
//! correlated oneshot; reads come from the shared views and storage,
//! never touching the state machine.

use super::state::RpcState;
use super::types::*;
use crate::metrics;
use aegen_core::{ClientResponse, Event};
use aegen_types::{Address, BatchId, Hash, TokenId, TokenSpec, TransactionStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// How long a write call waits for the state machine to answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Dev chain id reported by the `eth_chainId` shim.
const ETH_CHAIN_ID: u64 = 1337;

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ═══════════════════════════════════════════════════════════════════════════
// Method dispatch
// ═══════════════════════════════════════════════════════════════════════════

/// `POST /api/v1/rpc`: method-dispatch entry point.
pub async fn rpc_handler(
    State(state): State<RpcState>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    metrics::record_rpc_request(&request.method);
    let result = match request.method.as_str() {
        "getChainInfo" => get_chain_info(&state).await,
        "getBalance" => get_balance(&state, request.params).await,
        "getNonce" => get_nonce(&state, request.params).await,
        "sendTransaction" => send_transaction(&state, request.params).await,
        "createFungible" => create_fungible(&state, request.params).await,
        "transfer" => transfer(&state, request.params).await,
        "get-balance" => token_balance(&state, request.params).await,
        "listTokens" => list_tokens(&state).await,
        "getBlock" => get_block(&state, request.params).await,
        "getBlocks" => get_blocks(&state, request.params).await,
        "getTransaction" => get_transaction(&state, request.params).await,
        "eth_chainId" => Ok(Value::String(format!("{ETH_CHAIN_ID:#x}"))),
        "eth_blockNumber" => {
            let height = state.chain.read().await.height;
            Ok(Value::String(format!("{height:#x}")))
        }
        other => Err(RpcError::new(
            RpcError::METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        )),
    };
    Json(match result {
        Ok(value) => RpcResponse::ok(value),
        Err(error) => RpcResponse::err(error),
    })
}

async fn get_chain_info(state: &RpcState) -> Result<Value, RpcError> {
    let chain = state.chain.read().await;
    Ok(to_value(&ChainInfo {
        network: chain.network.clone(),
        chain_id: chain.chain_id.clone(),
        height: chain.height,
        block_hash: chain.head_hash.to_hex(),
        state_root: chain.state_root.to_hex(),
        mempool_size: chain.mempool_size,
        batches: chain.batch_count,
        fault: chain.fault.clone(),
    }))
}

async fn get_balance(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: AccountParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let ledger = state.ledger.read().await;
    let balance = ledger
        .accounts
        .get(&Address::new(params.account.clone()))
        .map_or(0, |a| a.balance);
    Ok(to_value(&BalanceResult {
        account: params.account,
        balance,
    }))
}

async fn get_nonce(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: AccountParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let ledger = state.ledger.read().await;
    let nonce = ledger
        .accounts
        .get(&Address::new(params.account.clone()))
        .map_or(0, |a| a.nonce);
    Ok(to_value(&NonceResult {
        account: params.account,
        nonce,
    }))
}

async fn send_transaction(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: SendTransactionParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let tx = Arc::new(params.into_transaction());
    let request_key = tx.hash();

    let rx = state.pending.register_admission(request_key);
    if state
        .event_tx
        .send(Event::SubmitTransaction { tx })
        .await
        .is_err()
    {
        state.pending.forget_admission(&request_key);
        return Err(RpcError::new(RpcError::UNAVAILABLE, "node is shutting down"));
    }

    match timeout(REQUEST_TIMEOUT, rx).await {
        Ok(Ok(Ok(()))) => Ok(to_value(&SendTransactionResult {
            request_key: request_key.to_hex(),
            status: TransactionStatus::Pending,
        })),
        Ok(Ok(Err(rejection))) => Err(RpcError::new(RpcError::REJECTED, rejection.to_string())),
        Ok(Err(_)) | Err(_) => {
            state.pending.forget_admission(&request_key);
            Err(RpcError::new(
                RpcError::TIMEOUT,
                "timed out waiting for admission",
            ))
        }
    }
}

async fn create_fungible(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: CreateFungibleParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let spec = TokenSpec {
        name: params.name,
        symbol: params.symbol,
        precision: params.precision,
        initial_supply: params.initial_supply,
        creator: Address::new(params.creator),
    };

    let response = client_call(state, |request_id| Event::CreateToken { request_id, spec }).await?;
    match response {
        ClientResponse::TokenCreated(Ok(token)) => Ok(to_value(&TokenCreatedResult {
            token: token.to_string(),
        })),
        ClientResponse::TokenCreated(Err(error)) => {
            Err(RpcError::new(RpcError::REJECTED, error.to_string()))
        }
        other => {
            warn!(?other, "mismatched client response for createFungible");
            Err(RpcError::new(RpcError::UNAVAILABLE, "internal error"))
        }
    }
}

async fn transfer(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: TransferParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let token = TokenId(params.token);
    let sender = Address::new(params.sender);
    let receiver = Address::new(params.receiver);
    let amount = params.amount;

    let response = client_call(state, |request_id| Event::TransferToken {
        request_id,
        token,
        sender,
        receiver,
        amount,
    })
    .await?;
    match response {
        ClientResponse::TokenTransferred(Ok(transfer_key)) => Ok(to_value(&TransferResult {
            transfer_key: transfer_key.to_hex(),
        })),
        ClientResponse::TokenTransferred(Err(error)) => {
            Err(RpcError::new(RpcError::REJECTED, error.to_string()))
        }
        other => {
            warn!(?other, "mismatched client response for transfer");
            Err(RpcError::new(RpcError::UNAVAILABLE, "internal error"))
        }
    }
}

async fn token_balance(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: TokenBalanceParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let ledger = state.ledger.read().await;
    let key = (
        TokenId(params.token.clone()),
        Address::new(params.account.clone()),
    );
    let balance = ledger.token_balances.get(&key).copied().unwrap_or(0);
    Ok(to_value(&TokenBalanceResult {
        token: params.token,
        account: params.account,
        balance,
    }))
}

async fn list_tokens(state: &RpcState) -> Result<Value, RpcError> {
    let ledger = state.ledger.read().await;
    let tokens: Vec<TokenView> = ledger.tokens.values().map(TokenView::from).collect();
    Ok(to_value(&tokens))
}

async fn get_block(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: BlockParams = serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    match state
        .storage
        .get_block(aegen_types::BlockHeight(params.height))
    {
        Ok(Some(block)) => Ok(to_value(&BlockView::from(&block))),
        Ok(None) => Err(RpcError::new(RpcError::NOT_FOUND, "block not found")),
        Err(error) => {
            warn!(%error, "storage read failed");
            Err(RpcError::new(RpcError::UNAVAILABLE, "storage unavailable"))
        }
    }
}

async fn get_blocks(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: BlockRangeParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    if params.to < params.from {
        return Err(RpcError::invalid_params("to must be >= from"));
    }
    // Bounded so a single call cannot walk the whole chain.
    let to = params.to.min(params.from + 99);
    match state.storage.get_blocks_range(
        aegen_types::BlockHeight(params.from),
        aegen_types::BlockHeight(to),
    ) {
        Ok(blocks) => {
            let views: Vec<BlockView> = blocks.iter().map(BlockView::from).collect();
            Ok(to_value(&views))
        }
        Err(error) => {
            warn!(%error, "storage read failed");
            Err(RpcError::new(RpcError::UNAVAILABLE, "storage unavailable"))
        }
    }
}

async fn get_transaction(state: &RpcState, params: Value) -> Result<Value, RpcError> {
    let params: RequestKeyParams =
        serde_json::from_value(params).map_err(RpcError::invalid_params)?;
    let tx_hash = Hash::from_hex(&params.request_key)
        .map_err(|_| RpcError::invalid_params("malformed request key"))?;
    match state.storage.get_transaction(&tx_hash) {
        Ok(Some(record)) => Ok(to_value(&TransactionView::from(&record))),
        Ok(None) => {
            let cache = state.tx_status.read().await;
            match cache.get(&tx_hash) {
                Some(entry) => Ok(json!({
                    "requestKey": tx_hash.to_hex(),
                    "status": entry.status,
                })),
                None => Err(RpcError::new(RpcError::NOT_FOUND, "transaction not found")),
            }
        }
        Err(error) => {
            warn!(%error, "storage read failed");
            Err(RpcError::new(RpcError::UNAVAILABLE, "storage unavailable"))
        }
    }
}

/// Send a client event carrying a fresh request id and wait for the
/// correlated response.
async fn client_call(
    state: &RpcState,
    make_event: impl FnOnce(u64) -> Event,
) -> Result<ClientResponse, RpcError> {
    let (request_id, rx) = state.pending.register_call();
    if state.event_tx.send(make_event(request_id)).await.is_err() {
        state.pending.forget_call(request_id);
        return Err(RpcError::new(RpcError::UNAVAILABLE, "node is shutting down"));
    }
    match timeout(REQUEST_TIMEOUT, rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) | Err(_) => {
            state.pending.forget_call(request_id);
            Err(RpcError::new(
                RpcError::TIMEOUT,
                "timed out waiting for the node",
            ))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Probes and metrics
// ═══════════════════════════════════════════════════════════════════════════

pub async fn health_handler(State(state): State<RpcState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn ready_handler(State(state): State<RpcState>) -> impl IntoResponse {
    let ready = state.ready.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

pub async fn metrics_handler() -> impl IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(error) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {error}"),
        );
    }
    (
        StatusCode::OK,
        String::from_utf8_lossy(&buf).into_owned(),
    )
}

pub async fn status_handler(State(state): State<RpcState>) -> Json<Value> {
    let info = get_chain_info(&state).await.unwrap_or(Value::Null);
    Json(info)
}

// ═══════════════════════════════════════════════════════════════════════════
// Explorer reads
// ═══════════════════════════════════════════════════════════════════════════

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": what})))
}

fn storage_error(error: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    warn!(%error, "storage read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "storage unavailable"})),
    )
}

pub async fn get_block_handler(
    State(state): State<RpcState>,
    Path(height): Path<u64>,
) -> impl IntoResponse {
    match state.storage.get_block(aegen_types::BlockHeight(height)) {
        Ok(Some(block)) => (StatusCode::OK, Json(to_value(&BlockView::from(&block)))),
        Ok(None) => not_found("block not found"),
        Err(error) => storage_error(error),
    }
}

pub async fn get_transaction_handler(
    State(state): State<RpcState>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let Ok(tx_hash) = Hash::from_hex(&hash) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid request key"})),
        );
    };
    match state.storage.get_transaction(&tx_hash) {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(to_value(&TransactionView::from(&record))),
        ),
        Ok(None) => {
            // Not yet in a block; the status cache may still know it.
            let cache = state.tx_status.read().await;
            match cache.get(&tx_hash) {
                Some(entry) => (
                    StatusCode::OK,
                    Json(json!({
                        "requestKey": tx_hash.to_hex(),
                        "status": entry.status,
                    })),
                ),
                None => not_found("transaction not found"),
            }
        }
        Err(error) => storage_error(error),
    }
}

pub async fn list_batches_handler(State(state): State<RpcState>) -> impl IntoResponse {
    match state.storage.get_all_batches() {
        Ok(batches) => {
            let views: Vec<BatchView> = batches.iter().map(BatchView::from).collect();
            (StatusCode::OK, Json(to_value(&views)))
        }
        Err(error) => storage_error(error),
    }
}

pub async fn get_batch_handler(
    State(state): State<RpcState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(batch_id) = parse_batch_id(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid batch id"})),
        );
    };
    match state.storage.get_batch(batch_id) {
        Ok(Some(batch)) => (StatusCode::OK, Json(to_value(&BatchView::from(&batch)))),
        Ok(None) => not_found("batch not found"),
        Err(error) => storage_error(error),
    }
}

/// `POST /api/v1/batches/{id}/resubmit`: operator path out of Failed.
///
/// Accepted means the request reached the node; the state machine still
/// refuses batches that are not in the Failed state, so callers should
/// re-read the batch status afterwards.
pub async fn resubmit_batch_handler(
    State(state): State<RpcState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(batch_id) = parse_batch_id(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid batch id"})),
        );
    };
    match state.storage.get_batch(batch_id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("batch not found"),
        Err(error) => return storage_error(error),
    }
    if state
        .event_tx
        .send(Event::ResubmitBatch { batch_id })
        .await
        .is_err()
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "node is shutting down"})),
        );
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({"accepted": true, "batchId": batch_id.to_string()})),
    )
}

/// Accept both `BATCH-000007` and a bare sequence number.
fn parse_batch_id(s: &str) -> Option<BatchId> {
    if let Ok(n) = s.parse::<u64>() {
        return Some(BatchId(n));
    }
    BatchId::from_str(s).ok()
}
