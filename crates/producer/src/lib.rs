//! Leader-driven block production.
//!
//! The producer seals a block at most once per tick, only when this node
//! leads the next height and the mempool holds work. Followers verify
//! announced blocks by replaying them and comparing state roots; any
//! divergence is surfaced as a consistency fault and halts local
//! production until resolved.

mod leader;
mod state;

pub use leader::leader_for;
pub use state::{ProducerConfig, ProducerPhase, ProducerState};
