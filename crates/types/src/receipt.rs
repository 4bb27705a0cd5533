//! Transaction receipts.

use crate::{BlockHeight, Hash};
use serde::{Deserialize, Serialize};

/// Outcome of an applied transaction, recorded alongside the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub block_height: BlockHeight,
    /// Gas actually charged (the full `gas_limit` in this ledger model).
    pub gas_used: u64,
    pub status: ReceiptStatus,
    /// Human-readable detail for failures, empty on success.
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

impl Receipt {
    pub fn success(tx_hash: Hash, block_height: BlockHeight, gas_used: u64) -> Self {
        Self {
            tx_hash,
            block_height,
            gas_used,
            status: ReceiptStatus::Success,
            output: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}
