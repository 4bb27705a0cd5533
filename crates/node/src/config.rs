//! Node-level configuration.

use aegen_ledger::GenesisConfig;
use aegen_mempool::MempoolConfig;
use aegen_producer::ProducerConfig;
use aegen_settlement::SettlementConfig;
use aegen_types::Address;

/// Everything the deterministic node state machine needs to start.
///
/// Transport and storage configuration stays with the runner; this
/// struct only carries what influences state transitions.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub genesis: GenesisConfig,
    /// Proposer rotation set. A single entry makes this node the sole
    /// producer, the default for development.
    pub validators: Vec<Address>,
    pub local_address: Address,
    pub mempool: MempoolConfig,
    pub producer: ProducerConfig,
    pub settlement: SettlementConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let local = Address::from("validator-0");
        Self {
            genesis: GenesisConfig::default(),
            validators: vec![local.clone()],
            local_address: local,
            mempool: MempoolConfig::default(),
            producer: ProducerConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}
