//! 32-byte blake3 content hash.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash, used for transaction request keys, block hashes and
/// state commitments.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the genesis parent.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes with blake3.
    pub fn of(bytes: &[u8]) -> Self {
        Hash(*blake3::hash(bytes).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded form (64 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let bytes = hex::decode(s).map_err(|_| HexError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HexError::WrongLength)?;
        Ok(Hash(arr))
    }
}

/// Errors parsing a hash from hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("expected 32 bytes")]
    WrongLength,
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Hash({}..)", &self.to_hex()[..8])
    }
}
