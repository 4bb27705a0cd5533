//! Settlement of sealed blocks onto the Kadena Chainweb chain.
//!
//! Three pieces cooperate:
//!   - [`BatchAccumulator`] groups sealed blocks into contiguous batches
//!     once the configured threshold is reached.
//!   - [`BridgeState`] drives each batch through submission, bounded
//!     retry and confirmation polling, purely via actions and events.
//!   - [`PactClient`] is the I/O port the runner uses to execute the
//!     bridge's submit and poll actions against the Pact REST API.

mod accumulator;
mod bridge;
mod client;
mod config;

pub use accumulator::BatchAccumulator;
pub use bridge::BridgeState;
pub use client::{
    build_send_body, parse_poll_response, parse_send_response, settlement_code, HttpPactClient,
    PactClient,
};
pub use config::{ChainwebConfig, CredentialError, SettlementConfig};
