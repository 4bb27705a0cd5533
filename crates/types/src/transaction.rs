//! Account transactions.

use crate::{Address, Hash, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A signed value transfer between two accounts.
///
/// Immutable once admitted to the mempool. Identified by its content hash
/// (the request key returned to the submitting client), which covers every
/// field except the signature.
#[derive(Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    /// Transfer amount in the native unit.
    pub amount: u64,
    /// Sender's next-expected nonce at apply time.
    pub nonce: u64,
    /// Gas ceiling; fee charged is `gas_limit * gas_price` (0 when unset).
    #[serde(default)]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: u64,
    /// Opaque payload, unused by the ledger.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub signature: Option<Signature>,
    /// Cached content hash.
    #[serde(skip)]
    cached_hash: OnceLock<Hash>,
}

impl Transaction {
    pub fn new(sender: Address, receiver: Address, amount: u64, nonce: u64) -> Self {
        Self {
            sender,
            receiver,
            amount,
            nonce,
            gas_limit: 0,
            gas_price: 0,
            data: None,
            signature: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn with_gas(mut self, gas_limit: u64, gas_price: u64) -> Self {
        self.gas_limit = gas_limit;
        self.gas_price = gas_price;
        self
    }

    /// Fee debited from the sender and credited to the block proposer.
    pub fn fee(&self) -> u64 {
        self.gas_limit.saturating_mul(self.gas_price)
    }

    /// The bytes covered by the content hash and the signature.
    ///
    /// Excludes the signature itself so signing does not change the hash.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(self.sender.as_str().as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(self.receiver.as_str().as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.gas_limit.to_be_bytes());
        bytes.extend_from_slice(&self.gas_price.to_be_bytes());
        if let Some(data) = &self.data {
            bytes.extend_from_slice(data.as_bytes());
        }
        bytes
    }

    /// Content hash, computed once and cached.
    pub fn hash(&self) -> Hash {
        *self
            .cached_hash
            .get_or_init(|| Hash::of(&self.signing_bytes()))
    }

    /// Sign with `keypair`, replacing any existing signature.
    pub fn sign(&mut self, keypair: &crate::KeyPair) {
        self.signature = Some(keypair.sign(&self.signing_bytes()));
    }

    /// Verify the attached signature against the sender's account key.
    ///
    /// Only `k:<pubkey-hex>` addresses carry a verifiable key; named dev
    /// accounts have no key material and always fail verification.
    pub fn verify_signature(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let Some(key) = sender_key(&self.sender) else {
            return false;
        };
        key.verify(&self.signing_bytes(), signature)
    }

    /// Structural well-formedness, checked at admission.
    pub fn is_well_formed(&self) -> bool {
        !self.sender.is_empty() && !self.receiver.is_empty()
    }
}

/// Extract the public key embedded in a `k:`-prefixed address.
pub fn sender_key(address: &Address) -> Option<PublicKey> {
    let hex_part = address.as_str().strip_prefix("k:")?;
    let bytes = hex::decode(hex_part).ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(PublicKey(arr))
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("hash", &self.hash())
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("amount", &self.amount)
            .field("nonce", &self.nonce)
            .field("fee", &self.fee())
            .finish()
    }
}

/// Lifecycle of a transaction as observed by clients.
///
/// ```text
/// Pending ──> Included
///    └──────> Dropped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Admitted to the mempool, not yet in a block.
    Pending,
    /// Included in a sealed block.
    Included,
    /// Removed without inclusion (apply-time failure or eviction).
    Dropped,
}

impl TransactionStatus {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!((self, next), (Pending, Included) | (Pending, Dropped))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Included => "included",
            TransactionStatus::Dropped => "dropped",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "included" => Ok(TransactionStatus::Included),
            "dropped" => Ok(TransactionStatus::Dropped),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}
