//! Account state and ledger snapshots.

use crate::{Address, TokenId, TokenInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance and nonce of a single account.
///
/// `nonce` is the next-expected transaction nonce; it increases by exactly
/// one per successfully applied transaction from this account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: u64,
    pub nonce: u64,
}

/// A full, serializable copy of ledger state.
///
/// BTreeMaps keep iteration order canonical, so hashing a snapshot is
/// deterministic across nodes and replays. Persisted on commit and used
/// for crash recovery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub accounts: BTreeMap<Address, AccountState>,
    pub tokens: BTreeMap<TokenId, TokenInfo>,
    /// Per-token account balances, keyed `(token, account)`.
    pub token_balances: BTreeMap<(TokenId, Address), u64>,
}
