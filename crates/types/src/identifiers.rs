//! Identifier newtypes used across the node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height in the chain (genesis is height 0).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub const GENESIS: BlockHeight = BlockHeight(0);

    pub fn next(&self) -> BlockHeight {
        BlockHeight(self.0 + 1)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account address.
///
/// Addresses are opaque strings in the external chain's account format
/// (typically `k:<pubkey-hex>`, with named accounts allowed on the dev chain).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Address(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Identifier of a fungible token.
///
/// Derived from the creating account and the token symbol so that a
/// `(creator, symbol)` pair maps to exactly one token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    /// Derive the token id for a creator/symbol pair.
    ///
    /// Uses a module-style name with a short content-hash suffix, so ids are
    /// stable across replays and unique per pair.
    pub fn derive(creator: &Address, symbol: &str) -> Self {
        let digest = crate::Hash::of(format!("{}:{}", creator, symbol).as_bytes());
        TokenId(format!("token.{}-{}", symbol.to_lowercase(), &digest.to_hex()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        TokenId(s.to_string())
    }
}
