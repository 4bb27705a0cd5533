//! Production runner with async I/O.
//!
//! This crate wraps the deterministic node state machine with real I/O:
//!
//! - Timers via tokio tasks
//! - Persistence in RocksDB
//! - Settlement calls against the Chainweb Pact API
//! - An axum RPC server for clients, explorers and probes
//!
//! # Architecture
//!
//! Uses the event aggregator pattern: a single task owns the state
//! machine and receives events via channels, so no mutex guards the
//! node itself. RPC write calls travel as events and wait on correlated
//! oneshots; RPC reads come from views the runner refreshes after every
//! event.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Aegen Node                           │
//! │                                                              │
//! │  ProductionRunner (single task)                              │
//! │    └─ loop { event = recv(); actions = node.handle(event); } │
//! │            │                                                 │
//! │   ┌────────┼──────────────┬────────────────┐                 │
//! │   ▼        ▼              ▼                ▼                 │
//! │ Timers   RocksDB    Pact HTTP client   Shared views          │
//! │ (tokio)  (blocking  (spawned tasks,    (read by the          │
//! │           tasks)     callback events)   RPC server)          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod metrics;
pub mod rpc;
pub mod telemetry;

mod config;
mod runner;
mod storage;
mod timers;

pub use config::{ConfigError, NodeOptions};
pub use runner::{ProductionRunner, RunnerError, SharedViews, ShutdownHandle};
pub use storage::{
    RecoveredState, RocksDbConfig, RocksDbStorage, StorageError, TransactionRecord,
};
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig, TelemetryError};
pub use timers::TimerManager;
