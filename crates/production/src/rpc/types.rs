//! Request and response types for the RPC API.

use crate::storage::TransactionRecord;
use aegen_types::{Address, Batch, Block, Signature, TokenInfo, Transaction, TransactionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A method-dispatch RPC request: `{"method": "...", "params": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub const PARSE: i64 = -32602;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const REJECTED: i64 = -32001;
    pub const UNAVAILABLE: i64 = -32002;
    pub const TIMEOUT: i64 = -32003;
    pub const NOT_FOUND: i64 = -32004;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(Self::PARSE, format!("invalid params: {detail}"))
    }
}

/// RPC response envelope: exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: RpcError) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }
}

/// Result of `getChainInfo` and body of `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub network: String,
    pub chain_id: String,
    pub height: u64,
    pub block_hash: String,
    pub state_root: String,
    pub mempool_size: usize,
    pub batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountParams {
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResult {
    pub account: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResult {
    pub account: String,
    pub nonce: u64,
}

/// Parameters of `sendTransaction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionParams {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub nonce: u64,
    #[serde(default)]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: u64,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub signature: Option<Signature>,
}

impl SendTransactionParams {
    pub fn into_transaction(self) -> Transaction {
        let mut tx = Transaction::new(
            Address::new(self.sender),
            Address::new(self.receiver),
            self.amount,
            self.nonce,
        )
        .with_gas(self.gas_limit, self.gas_price);
        tx.data = self.data;
        tx.signature = self.signature;
        tx
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResult {
    pub request_key: String,
    pub status: TransactionStatus,
}

/// Parameters of `createFungible`; mirrors `TokenSpec`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFungibleParams {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_precision")]
    pub precision: u8,
    #[serde(default)]
    pub initial_supply: u64,
    pub creator: String,
}

fn default_precision() -> u8 {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreatedResult {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferParams {
    pub token: String,
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub transfer_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalanceParams {
    pub token: String,
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalanceResult {
    pub token: String,
    pub account: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockParams {
    pub height: u64,
}

/// Inclusive height range for `getBlocks`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRangeParams {
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestKeyParams {
    pub request_key: String,
}

/// Explorer view of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub height: u64,
    pub hash: String,
    pub timestamp: u64,
    pub previous_hash: String,
    pub state_root: String,
    pub tx_root: String,
    pub proposer: String,
    pub transactions: Vec<String>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height().0,
            hash: block.hash().to_hex(),
            timestamp: block.header.timestamp,
            previous_hash: block.header.previous_hash.to_hex(),
            state_root: block.header.state_root.to_hex(),
            tx_root: block.header.tx_root.to_hex(),
            proposer: block.header.proposer.to_string(),
            transactions: block
                .transactions
                .iter()
                .map(|tx| tx.hash().to_hex())
                .collect(),
        }
    }
}

/// Explorer view of a transaction and its current status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub request_key: String,
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub nonce: u64,
    pub fee: u64,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
}

impl From<&TransactionRecord> for TransactionView {
    fn from(record: &TransactionRecord) -> Self {
        let tx = &record.transaction;
        Self {
            request_key: tx.hash().to_hex(),
            sender: tx.sender.to_string(),
            receiver: tx.receiver.to_string(),
            amount: tx.amount,
            nonce: tx.nonce,
            fee: tx.fee(),
            status: TransactionStatus::Included,
            block_height: Some(record.receipt.block_height.0),
            gas_used: Some(record.receipt.gas_used),
        }
    }
}

/// Explorer view of a settlement batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub id: String,
    pub start_height: u64,
    pub end_height: u64,
    pub block_count: u64,
    pub state_root: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_key: Option<String>,
    pub created_at: u64,
}

impl From<&Batch> for BatchView {
    fn from(batch: &Batch) -> Self {
        Self {
            id: batch.id.to_string(),
            start_height: batch.start_height.0,
            end_height: batch.end_height.0,
            block_count: batch.block_count(),
            state_root: batch.state_root.to_hex(),
            status: batch.status.to_string(),
            request_key: batch.request_key.clone(),
            created_at: batch.created_at,
        }
    }
}

/// View of a token's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub precision: u8,
    pub total_supply: u64,
    pub creator: String,
}

impl From<&TokenInfo> for TokenView {
    fn from(info: &TokenInfo) -> Self {
        Self {
            id: info.id.to_string(),
            name: info.name.clone(),
            symbol: info.symbol.clone(),
            precision: info.precision,
            total_supply: info.total_supply,
            creator: info.creator.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_request_params_default_to_null() {
        let req: RpcRequest = serde_json::from_str(r#"{"method":"getChainInfo"}"#).unwrap();
        assert_eq!(req.method, "getChainInfo");
        assert!(req.params.is_null());
    }

    #[test]
    fn send_params_build_a_transaction() {
        let params: SendTransactionParams = serde_json::from_str(
            r#"{"sender":"alice","receiver":"bob","amount":500,"nonce":0,"gasLimit":21000,"gasPrice":1}"#,
        )
        .unwrap();
        let tx = params.into_transaction();
        assert_eq!(tx.amount, 500);
        assert_eq!(tx.fee(), 21_000);
        assert!(tx.signature.is_none());
    }

    #[test]
    fn response_envelope_is_exclusive() {
        let ok = RpcResponse::ok(serde_json::json!({"x": 1}));
        let rendered = serde_json::to_string(&ok).unwrap();
        assert!(rendered.contains("result"));
        assert!(!rendered.contains("error"));

        let err = RpcResponse::err(RpcError::new(RpcError::METHOD_NOT_FOUND, "nope"));
        let rendered = serde_json::to_string(&err).unwrap();
        assert!(!rendered.contains("result"));
        assert!(rendered.contains("-32601"));
    }
}
