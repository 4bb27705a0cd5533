//! Blocks and block headers.

use crate::{Address, BlockHeight, Hash, KeyPair, Signature, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header of a sealed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: BlockHeight,
    /// Milliseconds since the unix epoch at seal time.
    pub timestamp: u64,
    /// Hash of the previous block's header (`Hash::ZERO` for genesis).
    pub previous_hash: Hash,
    /// Commitment over the full ledger state after applying this block.
    pub state_root: Hash,
    /// Merkle root over the included transaction hashes.
    pub tx_root: Hash,
    /// Address of the proposing validator.
    pub proposer: Address,
    /// Proposer's signature over the header hash.
    ///
    /// Kept as a plain field (no serde skip) so binary encodings of
    /// persisted blocks have a stable layout.
    #[serde(default)]
    pub signature: Option<Signature>,
}

impl BlockHeader {
    /// Hash of the header contents, excluding the signature.
    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(&self.height.0.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(self.state_root.as_bytes());
        bytes.extend_from_slice(self.tx_root.as_bytes());
        bytes.extend_from_slice(self.proposer.as_str().as_bytes());
        Hash::of(&bytes)
    }

    /// Sign the header hash with the proposer's key.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.signature = Some(keypair.sign(self.hash().as_bytes()));
    }
}

/// A sealed block: header plus the ordered transactions it includes.
///
/// Immutable once sealed; history is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Arc<Transaction>>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    pub fn state_root(&self) -> Hash {
        self.header.state_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height: BlockHeight(height),
            timestamp: 1_700_000_000_000,
            previous_hash: Hash::ZERO,
            state_root: Hash::of(b"state"),
            tx_root: Hash::ZERO,
            proposer: Address::from("v0"),
            signature: None,
        }
    }

    #[test]
    fn header_hash_excludes_signature() {
        let mut h = header(1);
        let before = h.hash();
        h.sign(&KeyPair::generate());
        assert_eq!(h.hash(), before);
    }

    #[test]
    fn header_hash_covers_height_and_roots() {
        let base = header(1);
        assert_ne!(header(2).hash(), base.hash());

        let mut other = header(1);
        other.state_root = Hash::of(b"other");
        assert_ne!(other.hash(), base.hash());
    }
}
