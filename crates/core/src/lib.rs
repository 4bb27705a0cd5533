//! Core event and action types for the Aegen node.
//!
//! This crate provides the foundational types for the node architecture:
//!
//! - [`Event`]: All possible inputs to the state machine
//! - [`Action`]: All possible outputs from the state machine
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`StateMachine`]: The trait that all state machines implement
//!
//! # Architecture
//!
//! The core is built on a simple event-driven model:
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same actions
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the runner, which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions (timers, storage, external-chain calls)
//! 3. Converts action results back into events

mod action;
mod event;
mod traits;

pub use action::Action;
pub use event::{ClientResponse, Event, EventPriority};
pub use traits::StateMachine;

use aegen_types::BatchId;

/// Identifies a timer owned by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Fixed-cadence block production tick.
    ProductionTick,
    /// Delay before the next settlement poll for a batch.
    SettlementPoll(BatchId),
    /// Backoff before retrying a transiently failed submission.
    SubmissionRetry(BatchId),
}
