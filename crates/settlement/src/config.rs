//! Settlement configuration.

use aegen_types::KeyPair;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Problems turning configured credentials into a signing key.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("sender secret key is not valid hex: {0}")]
    MalformedSecretKey(#[from] hex::FromHexError),

    #[error("sender secret key must be 32 bytes, got {0}")]
    WrongKeyLength(usize),
}

/// Connection and transaction parameters for the Kadena Chainweb
/// Pact endpoint the bridge settles against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainwebConfig {
    /// Chainweb node base URL, e.g. `https://api.testnet.chainweb.com`.
    pub base_url: String,
    /// Chainweb network id, e.g. `testnet04`.
    pub network_id: String,
    /// Target chain within the network.
    pub chain_id: String,
    /// Pact account paying gas for settlement commands.
    pub sender_account: String,
    /// Hex public key of the sender account. Empty means unconfigured:
    /// the bridge runs in simulation mode and never touches the network.
    pub sender_public_key: String,
    /// Hex secret key of the sender account.
    #[serde(skip_serializing)]
    pub sender_secret_key: String,
    pub gas_limit: u64,
    pub gas_price: f64,
    /// Command time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for ChainwebConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.testnet.chainweb.com".into(),
            network_id: "testnet04".into(),
            chain_id: "0".into(),
            sender_account: String::new(),
            sender_public_key: String::new(),
            sender_secret_key: String::new(),
            gas_limit: 100_000,
            gas_price: 0.000_000_01,
            ttl_secs: 600,
        }
    }
}

impl ChainwebConfig {
    /// Whether real signing credentials are configured. Without them the
    /// bridge fabricates request keys locally instead of sending.
    pub fn has_credentials(&self) -> bool {
        !self.sender_public_key.is_empty() && !self.sender_secret_key.is_empty()
    }

    /// Decode the configured secret key into a signing keypair.
    ///
    /// `Ok(None)` when running without credentials (simulation mode).
    pub fn signing_key(&self) -> Result<Option<KeyPair>, CredentialError> {
        if !self.has_credentials() {
            return Ok(None);
        }
        let bytes = hex::decode(&self.sender_secret_key)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CredentialError::WrongKeyLength(v.len()))?;
        Ok(Some(KeyPair::from_seed(seed)))
    }

    /// The Pact `send` endpoint for this network and chain.
    pub fn send_url(&self) -> String {
        format!(
            "{}/chainweb/0.0/{}/chain/{}/pact/api/v1/send",
            self.base_url, self.network_id, self.chain_id
        )
    }

    /// The Pact `poll` endpoint for this network and chain.
    pub fn poll_url(&self) -> String {
        format!(
            "{}/chainweb/0.0/{}/chain/{}/pact/api/v1/poll",
            self.base_url, self.network_id, self.chain_id
        )
    }
}

/// Batching and retry policy for the settlement bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Sealed blocks accumulated before a batch closes.
    pub batch_threshold: u64,
    /// Submission attempts per batch, counting the first.
    pub submit_attempts: u32,
    /// Delay before retrying a transiently failed submission.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    /// Poll attempts per submitted batch before giving up.
    pub poll_attempts: u32,
    /// Delay between poll attempts.
    #[serde(with = "duration_secs")]
    pub poll_delay: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 2,
            submit_attempts: 3,
            retry_delay: Duration::from_secs(2),
            poll_attempts: 10,
            poll_delay: Duration::from_secs(3),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
