//! The Aegen node: deterministic composition of ledger, mempool,
//! producer and settlement bridge behind a single [`StateMachine`].
//!
//! [`StateMachine`]: aegen_core::StateMachine

mod config;
mod state;

pub use config::NodeConfig;
pub use state::NodeStateMachine;
