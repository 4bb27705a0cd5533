//! Settlement batches.

use crate::{BlockHeight, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monotonic batch identifier, rendered as `BATCH-000001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl BatchId {
    pub fn next(&self) -> BatchId {
        BatchId(self.0 + 1)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BATCH-{:06}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("BATCH-")
            .ok_or_else(|| format!("missing BATCH- prefix: {s}"))?;
        let n = digits
            .parse::<u64>()
            .map_err(|_| format!("invalid batch sequence: {s}"))?;
        Ok(BatchId(n))
    }
}

/// Settlement status of a batch.
///
/// ```text
/// Pending ──> Submitted ──> Confirmed
///    └────────────┴───────> Failed
/// ```
///
/// Confirmed and Failed are terminal; a Failed batch leaves the terminal
/// state only through an explicit operator resubmission, which opens a new
/// Submitted attempt for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl BatchStatus {
    /// Whether a transition from `self` to `next` is legal without
    /// operator intervention.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted) | (Pending, Failed) | (Submitted, Confirmed) | (Submitted, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Confirmed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Submitted => "submitted",
            BatchStatus::Confirmed => "confirmed",
            BatchStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A contiguous range of sealed blocks committed together to the
/// external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub start_height: BlockHeight,
    pub end_height: BlockHeight,
    /// `state_root` of the last block in the range: the commitment
    /// actually settled on the external chain.
    pub state_root: Hash,
    pub status: BatchStatus,
    /// Request key returned by the external chain, once submitted.
    #[serde(default)]
    pub request_key: Option<String>,
    /// Milliseconds since the unix epoch when the batch was closed.
    pub created_at: u64,
}

impl Batch {
    pub fn new(
        id: BatchId,
        start_height: BlockHeight,
        end_height: BlockHeight,
        state_root: Hash,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            start_height,
            end_height,
            state_root,
            status: BatchStatus::Pending,
            request_key: None,
            created_at,
        }
    }

    pub fn block_count(&self) -> u64 {
        self.end_height.0 - self.start_height.0 + 1
    }

    pub fn mark_submitted(&mut self, request_key: String) {
        debug_assert!(self.status.can_transition_to(BatchStatus::Submitted));
        self.request_key = Some(request_key);
        self.status = BatchStatus::Submitted;
    }

    pub fn mark_confirmed(&mut self) {
        debug_assert!(self.status.can_transition_to(BatchStatus::Confirmed));
        self.status = BatchStatus::Confirmed;
    }

    pub fn mark_failed(&mut self) {
        debug_assert!(self.status.can_transition_to(BatchStatus::Failed));
        self.status = BatchStatus::Failed;
    }
}

/// Result of one submission attempt against the external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionResult {
    /// Accepted; poll with the returned request key.
    Accepted { request_key: String },
    /// The contract already holds this batch id. Benign: treat as settled.
    AlreadySettled,
    /// Structural rejection (malformed payload, unknown signer). Not retried.
    Rejected { reason: String },
    /// Transient connectivity failure. Retried up to the configured ceiling.
    Transient { reason: String },
}

/// Result of one settlement poll attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    /// Not yet confirmed; poll again after the configured delay.
    Pending,
    /// Durably recorded on the external chain.
    Confirmed,
    /// The external chain reported a definite failure.
    Failed { reason: String },
}
