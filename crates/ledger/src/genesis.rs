//! Genesis configuration and initial state.

use crate::LedgerState;
use aegen_types::{Address, LedgerError, TokenSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Initial balance allocation and optional genesis token.
///
/// Applied at height 0 before any network activity, so integration
/// environments start from a known funded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Pre-funded accounts.
    #[serde(default)]
    pub alloc: BTreeMap<Address, u64>,

    /// A fungible token deployed at genesis, supply credited to its creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSpec>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let mut alloc = BTreeMap::new();
        alloc.insert(Address::from("alice"), 10_000_000);
        alloc.insert(Address::from("bob"), 10_000_000);
        Self {
            alloc,
            token: Some(TokenSpec {
                name: "Aegen Token".into(),
                symbol: "AE".into(),
                precision: 12,
                initial_supply: 1_000_000_000,
                creator: Address::from("k:genesis"),
            }),
        }
    }
}

impl GenesisConfig {
    /// An empty genesis, useful for tests that fund accounts explicitly.
    pub fn empty() -> Self {
        Self {
            alloc: BTreeMap::new(),
            token: None,
        }
    }

    pub fn with_account(mut self, address: impl Into<String>, balance: u64) -> Self {
        self.alloc.insert(Address::new(address), balance);
        self
    }

    /// Build the genesis ledger state.
    ///
    /// An error here points at the config file, not a runtime condition;
    /// callers surface it at boot.
    pub fn build(&self) -> Result<LedgerState, LedgerError> {
        let mut ledger = LedgerState::new();
        for (address, balance) in &self.alloc {
            ledger.credit(address, *balance);
        }
        if let Some(token) = &self.token {
            ledger.create_token(token, 0)?;
        }
        info!(
            accounts = self.alloc.len(),
            has_token = self.token.is_some(),
            state_root = %ledger.state_root(),
            "built genesis state"
        );
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_genesis_funds_dev_accounts() {
        let ledger = GenesisConfig::default().build().unwrap();
        assert_eq!(ledger.balance_of(&Address::from("alice")), 10_000_000);
        assert_eq!(ledger.balance_of(&Address::from("bob")), 10_000_000);
        assert_eq!(ledger.token_count(), 1);
    }

    #[test]
    fn genesis_is_deterministic() {
        let a = GenesisConfig::default().build().unwrap();
        let b = GenesisConfig::default().build().unwrap();
        assert_eq!(a.state_root(), b.state_root());
    }

    #[test]
    fn custom_allocation() {
        let ledger = GenesisConfig::empty()
            .with_account("alice", 100_000)
            .build()
            .unwrap();
        assert_eq!(ledger.balance_of(&Address::from("alice")), 100_000);
        assert_eq!(ledger.total_native_supply(), 100_000);
    }

    #[test]
    fn token_creation_errors_surface_instead_of_panicking() {
        let config = GenesisConfig::default();
        let spec = config.token.clone().unwrap();
        let mut ledger = config.build().unwrap();
        // Replaying the same spec against the built ledger reproduces the
        // failure mode build now propagates as an error.
        let err = ledger.create_token(&spec, 0).unwrap_err();
        assert!(matches!(err, LedgerError::TokenAlreadyExists { .. }));
    }
}
