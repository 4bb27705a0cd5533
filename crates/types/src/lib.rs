//! Core types for the Aegen L2 node.
//!
//! This crate provides the foundational types used throughout the node:
//!
//! - **Primitives**: Hash, signing keys and signatures
//! - **Identifiers**: Address, BlockHeight, TokenId, BatchId
//! - **Ledger types**: Transaction, Block, Receipt, TokenInfo
//! - **Settlement types**: Batch with its status lifecycle
//! - **Errors**: the admission/ledger/consistency/bridge taxonomy
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod account;
mod batch;
mod block;
mod crypto;
mod errors;
mod hash;
mod identifiers;
mod receipt;
mod token;
mod transaction;

pub use account::{AccountState, LedgerSnapshot};
pub use batch::{Batch, BatchId, BatchStatus, SettlementOutcome, SubmissionResult};
pub use block::{Block, BlockHeader};
pub use crypto::{KeyPair, PublicKey, Signature};
pub use errors::{AdmissionError, BridgeError, ConsistencyFault, LedgerError};
pub use hash::{Hash, HexError};
pub use identifiers::{Address, BlockHeight, TokenId};
pub use receipt::{Receipt, ReceiptStatus};
pub use token::{TokenInfo, TokenSpec};
pub use transaction::{sender_key, Transaction, TransactionStatus};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use std::sync::Arc;

    /// Create a simple zero-fee transfer.
    pub fn test_transfer(sender: &str, receiver: &str, amount: u64, nonce: u64) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            Address::from(sender),
            Address::from(receiver),
            amount,
            nonce,
        ))
    }

    /// Create a keypair from a seed byte, with its `k:` address.
    pub fn test_keyed_account(seed: u8) -> (KeyPair, Address) {
        let kp = KeyPair::from_seed([seed; 32]);
        let addr = Address::new(format!("k:{}", kp.public_key().to_hex()));
        (kp, addr)
    }

    /// Create a minimal sealed block at `height` with the given transactions.
    pub fn test_block(height: u64, transactions: Vec<Arc<Transaction>>) -> Block {
        Block {
            header: BlockHeader {
                height: BlockHeight(height),
                timestamp: 1_700_000_000_000 + height * 5_000,
                previous_hash: Hash::of(&height.saturating_sub(1).to_be_bytes()),
                state_root: Hash::of(&height.to_be_bytes()),
                tx_root: Hash::ZERO,
                proposer: Address::from("v0"),
                signature: None,
            },
            transactions,
        }
    }
}
