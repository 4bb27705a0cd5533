//! Fungible token metadata.

use crate::{Address, TokenId};
use serde::{Deserialize, Serialize};

/// Metadata for a fungible token created on the ledger.
///
/// `total_supply` is fixed at creation; transfers move balances between
/// accounts without ever changing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub id: TokenId,
    pub name: String,
    pub symbol: String,
    /// Number of decimal places (Kadena fungible-v2 terminology).
    pub precision: u8,
    pub total_supply: u64,
    pub creator: Address,
    /// Milliseconds since the unix epoch at creation.
    pub created_at: u64,
}

/// Parameters for creating a fungible token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_precision")]
    pub precision: u8,
    #[serde(default)]
    pub initial_supply: u64,
    pub creator: Address,
}

fn default_precision() -> u8 {
    12
}
