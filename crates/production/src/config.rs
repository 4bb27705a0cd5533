//! On-disk configuration for the production node.
//!
//! A single TOML file configures the whole node. Every field has a
//! default, so an empty file (or no file at all) yields a working
//! single-validator dev node settling in simulation mode.

use aegen_ledger::GenesisConfig;
use aegen_mempool::MempoolConfig;
use aegen_node::NodeConfig;
use aegen_producer::ProducerConfig;
use aegen_settlement::{ChainwebConfig, SettlementConfig};
use aegen_types::{Address, KeyPair};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid signing seed: expected 64 hex characters")]
    InvalidSigningSeed,
}

/// Full node configuration as loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOptions {
    pub node: NodeSection,
    pub genesis: GenesisConfig,
    pub mempool: MempoolSection,
    pub producer: ProducerSection,
    pub settlement: SettlementConfig,
    pub chainweb: ChainwebConfig,
}

/// The `[node]` section: identity, storage and serving addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub data_dir: PathBuf,
    pub rpc_listen: SocketAddr,
    /// This node's proposer address.
    pub validator_address: String,
    /// Full proposer rotation set. Empty means this node alone.
    pub validators: Vec<String>,
    /// Hex-encoded 32-byte seed for the block signing key. Unset means
    /// sealed headers go out unsigned.
    pub signing_seed: Option<String>,
    /// Log output format: `text` or `json`.
    pub log_format: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./aegen-data"),
            rpc_listen: SocketAddr::from(([0, 0, 0, 0], 8545)),
            validator_address: "validator-0".to_string(),
            validators: Vec::new(),
            signing_seed: None,
            log_format: "text".to_string(),
        }
    }
}

/// The `[mempool]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolSection {
    pub capacity: usize,
    pub require_signatures: bool,
}

impl Default for MempoolSection {
    fn default() -> Self {
        let defaults = MempoolConfig::default();
        Self {
            capacity: defaults.capacity,
            require_signatures: defaults.require_signatures,
        }
    }
}

/// The `[producer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSection {
    pub cadence_ms: u64,
    pub max_block_transactions: usize,
    pub max_block_gas: u64,
}

impl Default for ProducerSection {
    fn default() -> Self {
        let defaults = ProducerConfig::default();
        Self {
            cadence_ms: defaults.cadence.as_millis() as u64,
            max_block_transactions: defaults.max_block_transactions,
            max_block_gas: defaults.max_block_gas,
        }
    }
}

impl NodeOptions {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// The configuration that feeds the deterministic state machine.
    pub fn node_config(&self) -> NodeConfig {
        let local = Address::new(self.node.validator_address.clone());
        let validators = if self.node.validators.is_empty() {
            vec![local.clone()]
        } else {
            self.node
                .validators
                .iter()
                .map(|v| Address::new(v.clone()))
                .collect()
        };
        NodeConfig {
            genesis: self.genesis.clone(),
            validators,
            local_address: local,
            mempool: MempoolConfig {
                capacity: self.mempool.capacity,
                require_signatures: self.mempool.require_signatures,
            },
            producer: ProducerConfig {
                cadence: Duration::from_millis(self.producer.cadence_ms),
                max_block_transactions: self.producer.max_block_transactions,
                max_block_gas: self.producer.max_block_gas,
            },
            settlement: self.settlement.clone(),
        }
    }

    /// Parse the configured signing seed into a keypair, if set.
    pub fn signing_key(&self) -> Result<Option<KeyPair>, ConfigError> {
        let Some(seed_hex) = &self.node.signing_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed_hex).map_err(|_| ConfigError::InvalidSigningSeed)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidSigningSeed)?;
        Ok(Some(KeyPair::from_seed(seed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_dev_defaults() {
        let options: NodeOptions = toml::from_str("").unwrap();
        assert_eq!(options.node.rpc_listen.port(), 8545);
        assert_eq!(options.producer.cadence_ms, 5_000);
        assert_eq!(options.settlement.batch_threshold, 2);
        assert!(!options.chainweb.has_credentials());

        let config = options.node_config();
        assert_eq!(config.validators, vec![Address::from("validator-0")]);
        assert_eq!(config.producer.cadence, Duration::from_secs(5));
    }

    #[test]
    fn sections_override_defaults() {
        let options: NodeOptions = toml::from_str(
            r#"
            [node]
            validator_address = "validator-1"
            validators = ["validator-0", "validator-1"]
            rpc_listen = "127.0.0.1:9000"

            [producer]
            cadence_ms = 1000

            [mempool]
            capacity = 500

            [chainweb]
            network_id = "development"
            "#,
        )
        .unwrap();

        let config = options.node_config();
        assert_eq!(config.local_address, Address::from("validator-1"));
        assert_eq!(config.validators.len(), 2);
        assert_eq!(config.producer.cadence, Duration::from_secs(1));
        assert_eq!(config.mempool.capacity, 500);
        assert_eq!(options.chainweb.network_id, "development");
        assert_eq!(options.node.rpc_listen.port(), 9000);
    }

    #[test]
    fn signing_seed_round_trip() {
        let mut options = NodeOptions::default();
        assert!(options.signing_key().unwrap().is_none());

        options.node.signing_seed = Some(hex::encode([7u8; 32]));
        let key = options.signing_key().unwrap().unwrap();
        assert_eq!(key.public_key(), KeyPair::from_seed([7u8; 32]).public_key());

        options.node.signing_seed = Some("zz".into());
        assert!(options.signing_key().is_err());
    }
}
