//! Settlement bridge state machine.

use crate::SettlementConfig;
use aegen_core::{Action, TimerId};
use aegen_types::{
    Batch, BatchId, BatchStatus, BridgeError, SettlementOutcome, SubmissionResult,
};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Tracks every batch through submission and confirmation.
///
/// Submission and polling themselves are delegated to the runner through
/// `SubmitBatch` and `PollSettlement` actions; their results come back as
/// events. Transient submission failures retry up to the configured
/// ceiling; an exhausted or rejected batch ends `Failed` and stays there
/// until an operator resubmits it explicitly.
pub struct BridgeState {
    config: SettlementConfig,
    batches: BTreeMap<BatchId, Batch>,
    /// Poll attempts consumed per submitted batch.
    poll_attempts: BTreeMap<BatchId, u32>,
    /// Attempt number to use when the pending retry timer fires.
    retry_attempt: BTreeMap<BatchId, u32>,
}

impl BridgeState {
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            batches: BTreeMap::new(),
            poll_attempts: BTreeMap::new(),
            retry_attempt: BTreeMap::new(),
        }
    }

    /// Restore persisted batches after a restart. Batches left `Submitted`
    /// resume polling from a fresh attempt budget.
    pub fn recover(config: SettlementConfig, batches: Vec<Batch>) -> (Self, Vec<Action>) {
        let mut bridge = Self::new(config);
        let mut actions = Vec::new();
        for batch in batches {
            if batch.status == BatchStatus::Submitted {
                bridge.poll_attempts.insert(batch.id, 0);
                actions.push(Action::SetTimer {
                    id: TimerId::SettlementPoll(batch.id),
                    duration: bridge.config.poll_delay,
                });
            }
            bridge.batches.insert(batch.id, batch);
        }
        (bridge, actions)
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Highest batched height plus id position, for accumulator recovery.
    pub fn last_batch(&self) -> Option<&Batch> {
        self.batches.values().next_back()
    }

    /// A freshly closed batch enters the bridge and goes straight out for
    /// submission.
    #[instrument(skip_all, fields(batch_id = %batch.id))]
    pub fn on_batch_closed(&mut self, batch: Batch) -> Vec<Action> {
        let actions = vec![
            Action::PersistBatch {
                batch: batch.clone(),
            },
            Action::SubmitBatch {
                batch: batch.clone(),
                attempt: 1,
            },
        ];
        self.batches.insert(batch.id, batch);
        actions
    }

    /// Handle the outcome of one submission attempt.
    #[instrument(skip_all, fields(batch_id = %batch_id, attempt))]
    pub fn on_submission_completed(
        &mut self,
        batch_id: BatchId,
        attempt: u32,
        result: SubmissionResult,
    ) -> Vec<Action> {
        let Some(batch) = self.batches.get_mut(&batch_id) else {
            warn!("submission result for unknown batch");
            return vec![];
        };
        // A stale retry can race a batch that already reached a terminal
        // state; the first terminal outcome wins.
        if batch.status.is_terminal() {
            return vec![];
        }

        match result {
            SubmissionResult::Accepted { request_key } => {
                info!(%request_key, "batch accepted for settlement");
                batch.mark_submitted(request_key);
                self.poll_attempts.insert(batch_id, 0);
                vec![
                    Action::PersistBatch {
                        batch: batch.clone(),
                    },
                    Action::EmitBatchStatus {
                        batch_id,
                        status: BatchStatus::Submitted,
                    },
                    Action::SetTimer {
                        id: TimerId::SettlementPoll(batch_id),
                        duration: self.config.poll_delay,
                    },
                ]
            }
            SubmissionResult::AlreadySettled => {
                // The contract has seen this batch id before, so the
                // commitment is durable even though we hold no request key.
                info!("batch already settled on the external chain");
                if batch.status == BatchStatus::Pending {
                    batch.status = BatchStatus::Submitted;
                }
                batch.mark_confirmed();
                vec![
                    Action::PersistBatch {
                        batch: batch.clone(),
                    },
                    Action::EmitBatchStatus {
                        batch_id,
                        status: BatchStatus::Confirmed,
                    },
                ]
            }
            SubmissionResult::Rejected { reason } => {
                warn!(%reason, "batch rejected by the external chain");
                batch.mark_failed();
                vec![
                    Action::PersistBatch {
                        batch: batch.clone(),
                    },
                    Action::EmitBatchStatus {
                        batch_id,
                        status: BatchStatus::Failed,
                    },
                ]
            }
            SubmissionResult::Transient { reason } => {
                if attempt < self.config.submit_attempts {
                    warn!(%reason, "transient submission failure, will retry");
                    self.retry_attempt.insert(batch_id, attempt + 1);
                    vec![Action::SetTimer {
                        id: TimerId::SubmissionRetry(batch_id),
                        duration: self.config.retry_delay,
                    }]
                } else {
                    warn!(%reason, "submission attempts exhausted");
                    batch.mark_failed();
                    vec![
                        Action::PersistBatch {
                            batch: batch.clone(),
                        },
                        Action::EmitBatchStatus {
                            batch_id,
                            status: BatchStatus::Failed,
                        },
                    ]
                }
            }
        }
    }

    /// The retry timer fired; re-issue the submission with the next
    /// attempt number.
    pub fn on_submission_retry_timer(&mut self, batch_id: BatchId) -> Vec<Action> {
        let Some(attempt) = self.retry_attempt.remove(&batch_id) else {
            return vec![];
        };
        match self.batches.get(&batch_id) {
            Some(batch) if batch.status == BatchStatus::Pending => vec![Action::SubmitBatch {
                batch: batch.clone(),
                attempt,
            }],
            _ => vec![],
        }
    }

    /// The poll timer fired; issue the next poll attempt.
    pub fn on_settlement_poll_timer(&mut self, batch_id: BatchId) -> Vec<Action> {
        let Some(batch) = self.batches.get(&batch_id) else {
            return vec![];
        };
        if batch.status != BatchStatus::Submitted {
            return vec![];
        }
        let Some(request_key) = batch.request_key.clone() else {
            return vec![];
        };
        let attempt = self
            .poll_attempts
            .get(&batch_id)
            .copied()
            .unwrap_or(0)
            .saturating_add(1);
        self.poll_attempts.insert(batch_id, attempt);
        vec![Action::PollSettlement {
            batch_id,
            request_key,
            attempt,
        }]
    }

    /// Handle the outcome of one poll attempt.
    #[instrument(skip_all, fields(batch_id = %batch_id, attempt))]
    pub fn on_poll_completed(
        &mut self,
        batch_id: BatchId,
        attempt: u32,
        outcome: SettlementOutcome,
    ) -> Vec<Action> {
        let Some(batch) = self.batches.get_mut(&batch_id) else {
            warn!("poll result for unknown batch");
            return vec![];
        };
        if batch.status != BatchStatus::Submitted {
            return vec![];
        }

        match outcome {
            SettlementOutcome::Confirmed => {
                info!("batch settlement confirmed");
                batch.mark_confirmed();
                self.poll_attempts.remove(&batch_id);
                vec![
                    Action::PersistBatch {
                        batch: batch.clone(),
                    },
                    Action::EmitBatchStatus {
                        batch_id,
                        status: BatchStatus::Confirmed,
                    },
                ]
            }
            SettlementOutcome::Failed { reason } => {
                warn!(%reason, "batch settlement failed on the external chain");
                batch.mark_failed();
                self.poll_attempts.remove(&batch_id);
                vec![
                    Action::PersistBatch {
                        batch: batch.clone(),
                    },
                    Action::EmitBatchStatus {
                        batch_id,
                        status: BatchStatus::Failed,
                    },
                ]
            }
            SettlementOutcome::Pending => {
                if attempt < self.config.poll_attempts {
                    vec![Action::SetTimer {
                        id: TimerId::SettlementPoll(batch_id),
                        duration: self.config.poll_delay,
                    }]
                } else {
                    warn!("poll attempts exhausted without confirmation");
                    batch.mark_failed();
                    self.poll_attempts.remove(&batch_id);
                    vec![
                        Action::PersistBatch {
                            batch: batch.clone(),
                        },
                        Action::EmitBatchStatus {
                            batch_id,
                            status: BatchStatus::Failed,
                        },
                    ]
                }
            }
        }
    }

    /// Operator-initiated resubmission of a `Failed` batch.
    ///
    /// Reopens the batch as `Pending` with a fresh attempt budget and the
    /// original id, so the contract-side idempotency check still applies.
    pub fn resubmit(&mut self, batch_id: BatchId) -> Result<Vec<Action>, BridgeError> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(BridgeError::UnknownBatch(batch_id))?;
        if batch.status != BatchStatus::Failed {
            return Err(BridgeError::NotResubmittable(batch_id));
        }

        info!(batch_id = %batch_id, "operator resubmission");
        batch.status = BatchStatus::Pending;
        batch.request_key = None;
        self.poll_attempts.remove(&batch_id);
        Ok(vec![
            Action::PersistBatch {
                batch: batch.clone(),
            },
            Action::SubmitBatch {
                batch: batch.clone(),
                attempt: 1,
            },
        ])
    }
}
