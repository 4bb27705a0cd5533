//! Error taxonomy shared across the node.
//!
//! Admission and ledger errors are per-transaction and non-fatal. A
//! consistency fault halts production for the affected height. Bridge
//! errors are batch-scoped and never block block production.

use crate::{Address, BatchId, BlockHeight, Hash, TokenId};
use thiserror::Error;

/// Rejection at mempool admission time. No side effects on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("duplicate transaction for sender {sender} nonce {nonce}")]
    Duplicate { sender: Address, nonce: u64 },

    #[error("malformed transaction: {0}")]
    Malformed(String),

    #[error("invalid signature for sender {0}")]
    InvalidSignature(Address),

    #[error("nonce {got} not admissible for sender {sender} (next expected {expected})")]
    InvalidNonce {
        sender: Address,
        got: u64,
        expected: u64,
    },

    #[error("sender {sender} cannot cover queued amount {required} with balance {available}")]
    InsufficientFunds {
        sender: Address,
        required: u64,
        available: u64,
    },

    #[error("mempool is full ({capacity} transactions)")]
    PoolFull { capacity: usize },
}

/// Failure applying a transaction to the ledger. The transaction is
/// dropped from the block being built, nothing else is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid nonce for {sender}: got {got}, expected {expected}")]
    InvalidNonce {
        sender: Address,
        got: u64,
        expected: u64,
    },

    #[error("insufficient funds for {sender}: need {required}, have {available}")]
    InsufficientFunds {
        sender: Address,
        required: u64,
        available: u64,
    },

    #[error("token already exists for creator {creator} symbol {symbol}")]
    TokenAlreadyExists { creator: Address, symbol: String },

    #[error("unknown token {0}")]
    UnknownToken(TokenId),

    #[error("insufficient balance of token {token} for {account}: need {required}, have {available}")]
    InsufficientTokenBalance {
        token: TokenId,
        account: Address,
        required: u64,
        available: u64,
    },
}

/// Divergence between a proposer's announced state and local replay.
/// Fatal to this node's view of the affected height; committed state
/// is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFault {
    #[error("state root mismatch at height {height}: announced {announced}, computed {computed}")]
    StateRootMismatch {
        height: BlockHeight,
        announced: Hash,
        computed: Hash,
    },

    #[error("unexpected proposer for height {height}: got {got}, expected {expected}")]
    WrongProposer {
        height: BlockHeight,
        got: Address,
        expected: Address,
    },

    #[error("non-contiguous block at height {got}, expected {expected}")]
    HeightGap {
        got: BlockHeight,
        expected: BlockHeight,
    },
}

/// Failure in the settlement bridge. Batch-scoped; a Failed batch waits
/// for operator action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("submission of {batch_id} rejected by external chain: {reason}")]
    Rejected { batch_id: BatchId, reason: String },

    #[error("transient error submitting {batch_id}: {reason}")]
    Transient { batch_id: BatchId, reason: String },

    #[error("settlement of {batch_id} unconfirmed after {attempts} poll attempts")]
    SettlementTimeout { batch_id: BatchId, attempts: u32 },

    #[error("batch {0} is not in a resubmittable state")]
    NotResubmittable(BatchId),

    #[error("unknown batch {0}")]
    UnknownBatch(BatchId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_context() {
        let err = LedgerError::InvalidNonce {
            sender: Address::from("alice"),
            got: 3,
            expected: 1,
        };
        assert_eq!(err.to_string(), "invalid nonce for alice: got 3, expected 1");

        let err = BridgeError::SettlementTimeout {
            batch_id: BatchId(7),
            attempts: 10,
        };
        assert!(err.to_string().contains("BATCH-000007"));
    }
}
