//! Action types for the deterministic state machine.

use crate::{ClientResponse, Event, TimerId};
use aegen_types::{
    AdmissionError, Batch, BatchId, BatchStatus, Block, Hash, LedgerError, LedgerSnapshot, Receipt,
};
use std::sync::Arc;
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Announce a sealed block to peers.
    BroadcastBlock { block: Arc<Block> },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration. Replaces any timer with the
    /// same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    ///
    /// Internal events are processed at the same timestamp with higher
    /// priority than external events, preserving causality.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════════════════
    /// Persist a sealed block and the receipts of its transactions.
    PersistBlock {
        block: Arc<Block>,
        receipts: Vec<Receipt>,
    },

    /// Persist a batch record (created or status changed).
    PersistBatch { batch: Batch },

    /// Persist the post-commit ledger snapshot for crash recovery.
    PersistLedgerSnapshot { snapshot: LedgerSnapshot },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated Work (async, returns callback event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Submit a batch commitment to the external chain.
    ///
    /// Returns `Event::SubmissionCompleted` when the attempt finishes.
    /// `attempt` counts from 1 and covers retries of transient failures.
    SubmitBatch { batch: Batch, attempt: u32 },

    /// Poll the external chain for a submitted batch.
    ///
    /// Returns `Event::PollCompleted` when the attempt finishes.
    PollSettlement {
        batch_id: BatchId,
        request_key: String,
        attempt: u32,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Notifications (observed by the runner; no callback)
    // ═══════════════════════════════════════════════════════════════════════
    /// A block was sealed and applied at this node.
    EmitBlockSealed { block: Arc<Block> },

    /// A transaction passed admission; the request key is now trackable.
    EmitTransactionAdmitted { tx_hash: Hash },

    /// A transaction failed admission; surfaced to the submitting client.
    EmitTransactionRejected {
        tx_hash: Hash,
        error: AdmissionError,
    },

    /// A drained transaction failed at apply time and was dropped from
    /// the block being built.
    EmitTransactionDropped { tx_hash: Hash, error: LedgerError },

    /// A batch reached a settlement status worth reporting
    /// (Submitted, Confirmed or Failed).
    EmitBatchStatus {
        batch_id: BatchId,
        status: BatchStatus,
    },

    /// Reply to a waiting client call, correlated by request id.
    EmitClientResponse {
        request_id: u64,
        response: ClientResponse,
    },

    /// Production for the announced height diverged from the proposer;
    /// the node must not seal past this height until resolved.
    EmitConsistencyFault {
        fault: aegen_types::ConsistencyFault,
    },
}

impl Action {
    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::BroadcastBlock { .. } => "BroadcastBlock",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::PersistBlock { .. } => "PersistBlock",
            Action::PersistBatch { .. } => "PersistBatch",
            Action::PersistLedgerSnapshot { .. } => "PersistLedgerSnapshot",
            Action::SubmitBatch { .. } => "SubmitBatch",
            Action::PollSettlement { .. } => "PollSettlement",
            Action::EmitBlockSealed { .. } => "EmitBlockSealed",
            Action::EmitTransactionAdmitted { .. } => "EmitTransactionAdmitted",
            Action::EmitTransactionRejected { .. } => "EmitTransactionRejected",
            Action::EmitTransactionDropped { .. } => "EmitTransactionDropped",
            Action::EmitBatchStatus { .. } => "EmitBatchStatus",
            Action::EmitClientResponse { .. } => "EmitClientResponse",
            Action::EmitConsistencyFault { .. } => "EmitConsistencyFault",
        }
    }
}
