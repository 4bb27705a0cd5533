//! Event types for the deterministic state machine.

use aegen_types::{
    Batch, BatchId, Block, LedgerError, SettlementOutcome, SubmissionResult, TokenId, TokenSpec,
    Transaction,
};
use aegen_types::{Address, Hash};
use std::sync::Arc;

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    /// Processed first to maintain causality.
    Internal = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,

    /// Client events: external inputs from users.
    Client = 3,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// Time to produce a block (if this node is the leader for the
    /// next height).
    ProductionTick,

    /// Time to poll the external chain for a submitted batch.
    SettlementPollTimer { batch_id: BatchId },

    /// Time to retry a transiently failed batch submission.
    SubmissionRetryTimer { batch_id: BatchId },

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A peer announced a sealed block.
    ///
    /// Followers replay the block's transactions against their own ledger
    /// and verify the announced state root.
    BlockAnnounced { block: Arc<Block> },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal Events (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// A block was sealed locally (as leader) or accepted from a peer.
    ///
    /// Consumed by the batch accumulator.
    BlockSealed { block: Arc<Block> },

    /// The accumulator closed a batch; the bridge takes it from here.
    BatchClosed { batch: Batch },

    // ═══════════════════════════════════════════════════════════════════════
    // Async Callbacks (priority: Internal)
    // Results of bridge I/O performed by the runner
    // ═══════════════════════════════════════════════════════════════════════
    /// One submission attempt against the external chain finished.
    ///
    /// Callback from `Action::SubmitBatch`.
    SubmissionCompleted {
        batch_id: BatchId,
        /// Echo of the attempt number from the originating action.
        attempt: u32,
        result: SubmissionResult,
    },

    /// One settlement poll attempt finished.
    ///
    /// Callback from `Action::PollSettlement`.
    PollCompleted {
        batch_id: BatchId,
        /// Echo of the attempt number from the originating action.
        attempt: u32,
        outcome: SettlementOutcome,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Client Requests (priority: Client)
    // ═══════════════════════════════════════════════════════════════════════
    /// Client submitted a transaction for mempool admission.
    SubmitTransaction { tx: Arc<Transaction> },

    /// Client asked to create a fungible token.
    ///
    /// `request_id` correlates the response action with the caller.
    CreateToken { request_id: u64, spec: TokenSpec },

    /// Client asked to move token balance between accounts.
    TransferToken {
        request_id: u64,
        token: TokenId,
        sender: Address,
        receiver: Address,
        amount: u64,
    },

    /// Operator asked to resubmit a Failed batch.
    ///
    /// The only path out of the Failed terminal state.
    ResubmitBatch { batch_id: BatchId },
}

impl Event {
    /// Get the priority for this event type.
    ///
    /// Events at the same timestamp are processed in priority order,
    /// ensuring causality is preserved.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::BlockSealed { .. }
            | Event::BatchClosed { .. }
            | Event::SubmissionCompleted { .. }
            | Event::PollCompleted { .. } => EventPriority::Internal,

            Event::ProductionTick
            | Event::SettlementPollTimer { .. }
            | Event::SubmissionRetryTimer { .. } => EventPriority::Timer,

            Event::BlockAnnounced { .. } => EventPriority::Network,

            Event::SubmitTransaction { .. }
            | Event::CreateToken { .. }
            | Event::TransferToken { .. }
            | Event::ResubmitBatch { .. } => EventPriority::Client,
        }
    }

    /// Check if this is an internal event (consequence of prior processing).
    pub fn is_internal(&self) -> bool {
        self.priority() == EventPriority::Internal
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ProductionTick => "ProductionTick",
            Event::SettlementPollTimer { .. } => "SettlementPollTimer",
            Event::SubmissionRetryTimer { .. } => "SubmissionRetryTimer",
            Event::BlockAnnounced { .. } => "BlockAnnounced",
            Event::BlockSealed { .. } => "BlockSealed",
            Event::BatchClosed { .. } => "BatchClosed",
            Event::SubmissionCompleted { .. } => "SubmissionCompleted",
            Event::PollCompleted { .. } => "PollCompleted",
            Event::SubmitTransaction { .. } => "SubmitTransaction",
            Event::CreateToken { .. } => "CreateToken",
            Event::TransferToken { .. } => "TransferToken",
            Event::ResubmitBatch { .. } => "ResubmitBatch",
        }
    }
}

/// Responses delivered back to waiting RPC callers, correlated by the
/// request id carried on the originating client event.
#[derive(Debug, Clone)]
pub enum ClientResponse {
    TokenCreated(Result<TokenId, LedgerError>),
    TokenTransferred(Result<Hash, LedgerError>),
}
