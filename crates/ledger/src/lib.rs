//! Account ledger for the Aegen node.
//!
//! Deterministic state transitions over balances, nonces and fungible
//! tokens. The ledger performs no I/O and holds no locks; the block
//! producer applies transactions in block order inside the single-owner
//! state machine, and the production layer persists snapshots on commit.

mod genesis;
mod merkle;
mod state;

pub use genesis::GenesisConfig;
pub use merkle::transaction_root;
pub use state::LedgerState;
