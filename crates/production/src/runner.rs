//! Production runner wiring the deterministic node to real I/O.
//!
//! A single task owns the [`NodeStateMachine`] and receives every event
//! through channels, so no lock ever guards the state machine itself:
//!
//! ```text
//! timers ──────┐
//! callbacks ───┼──> loop { event = recv(); actions = node.handle(event); }
//! rpc clients ─┘                     │
//!                                    ▼
//!                    timers / storage / settlement I/O / notifications
//! ```
//!
//! Channels are drained in priority order (internal callbacks, then
//! timers, then client requests), mirroring event priorities. Storage
//! writes and settlement HTTP calls run on spawned tasks; their results
//! come back as internal events.

use crate::metrics;
use crate::rpc::{ChainView, PendingRequests, TransactionStatusCache};
use crate::storage::{RocksDbStorage, StorageError};
use crate::timers::TimerManager;
use aegen_core::{Action, Event, StateMachine};
use aegen_node::{NodeConfig, NodeStateMachine};
use aegen_settlement::PactClient;
use aegen_types::{
    AdmissionError, BatchId, BatchStatus, KeyPair, LedgerError, LedgerSnapshot, TransactionStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing required builder field: {0}")]
    MissingField(&'static str),

    #[error("storage error during startup: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid genesis configuration: {0}")]
    Genesis(#[from] LedgerError),
}

/// Views shared between the runner and the RPC server.
///
/// The runner writes, handlers read. All cheaply cloneable.
#[derive(Clone, Default)]
pub struct SharedViews {
    pub chain: Arc<RwLock<ChainView>>,
    pub ledger: Arc<RwLock<LedgerSnapshot>>,
    pub tx_status: Arc<RwLock<TransactionStatusCache>>,
    pub pending: Arc<PendingRequests>,
}

impl SharedViews {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle that stops the runner. Dropping it also shuts the runner down.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder for [`ProductionRunner`].
#[derive(Default)]
pub struct ProductionRunnerBuilder {
    node_config: Option<NodeConfig>,
    signing_key: Option<KeyPair>,
    storage: Option<Arc<RocksDbStorage>>,
    pact_client: Option<Arc<dyn PactClient>>,
    client_rx: Option<mpsc::Receiver<Event>>,
    views: Option<SharedViews>,
}

impl ProductionRunnerBuilder {
    pub fn node_config(mut self, config: NodeConfig) -> Self {
        self.node_config = Some(config);
        self
    }

    /// Key for signing sealed block headers. Optional.
    pub fn signing_key(mut self, key: KeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn storage(mut self, storage: Arc<RocksDbStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn pact_client(mut self, client: Arc<dyn PactClient>) -> Self {
        self.pact_client = Some(client);
        self
    }

    /// Receiver carrying client events from the RPC layer.
    pub fn client_events(mut self, rx: mpsc::Receiver<Event>) -> Self {
        self.client_rx = Some(rx);
        self
    }

    pub fn shared_views(mut self, views: SharedViews) -> Self {
        self.views = Some(views);
        self
    }

    /// Recover-or-genesis, then assemble the runner.
    pub fn build(self) -> Result<(ProductionRunner, ShutdownHandle), RunnerError> {
        let node_config = self
            .node_config
            .ok_or(RunnerError::MissingField("node_config"))?;
        let storage = self.storage.ok_or(RunnerError::MissingField("storage"))?;
        let pact_client = self
            .pact_client
            .ok_or(RunnerError::MissingField("pact_client"))?;
        let client_rx = self
            .client_rx
            .ok_or(RunnerError::MissingField("client_events"))?;
        let views = self.views.unwrap_or_default();

        let recovered = storage.load_recovered_state()?;
        let (node, mut startup_actions) = if let Some(snapshot) = recovered.snapshot {
            info!(
                head = %recovered.head_height,
                batches = recovered.batches.len(),
                "recovering node from persisted state"
            );
            NodeStateMachine::recover(
                node_config,
                self.signing_key,
                snapshot,
                recovered.head_height,
                recovered.head_hash,
                recovered.batches,
            )
        } else {
            info!("starting node from genesis");
            (
                NodeStateMachine::new(node_config, self.signing_key)?,
                vec![],
            )
        };
        startup_actions.extend(node.start());

        let (timer_tx, timer_rx) = mpsc::channel(16);
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = ProductionRunner {
            node,
            storage,
            pact_client,
            timer_manager: TimerManager::new(timer_tx),
            timer_rx,
            callback_tx,
            callback_rx,
            client_rx,
            shutdown_rx,
            views,
            startup_actions,
            batch_closed_at: HashMap::new(),
        };
        let handle = ShutdownHandle {
            tx: Some(shutdown_tx),
        };
        Ok((runner, handle))
    }
}

/// Owns the state machine and executes its actions.
pub struct ProductionRunner {
    node: NodeStateMachine,
    storage: Arc<RocksDbStorage>,
    pact_client: Arc<dyn PactClient>,
    timer_manager: TimerManager,
    timer_rx: mpsc::Receiver<Event>,
    callback_tx: mpsc::UnboundedSender<Event>,
    callback_rx: mpsc::UnboundedReceiver<Event>,
    client_rx: mpsc::Receiver<Event>,
    shutdown_rx: oneshot::Receiver<()>,
    views: SharedViews,
    startup_actions: Vec<Action>,
    /// Close time per batch, for settlement latency metrics.
    batch_closed_at: HashMap<BatchId, Instant>,
}

impl std::fmt::Debug for ProductionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionRunner").finish_non_exhaustive()
    }
}

impl ProductionRunner {
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::default()
    }

    /// Run until shut down.
    pub async fn run(mut self) {
        // Publish the boot-time ledger so reads work before the first block.
        *self.views.ledger.write().await = self.node.ledger_snapshot();
        self.refresh_views().await;

        let startup = std::mem::take(&mut self.startup_actions);
        for action in startup {
            self.process_action(action).await;
        }

        info!("production runner started");
        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("shutdown requested");
                    break;
                }

                Some(event) = self.callback_rx.recv() => {
                    self.dispatch(event).await;
                }

                Some(event) = self.timer_rx.recv() => {
                    self.dispatch(event).await;
                }

                Some(event) = self.client_rx.recv() => {
                    self.dispatch(event).await;
                }
            }
        }
        info!("production runner stopped");
    }

    async fn dispatch(&mut self, event: Event) {
        trace!(event = event.type_name(), "dispatching event");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        self.node.set_time(now);
        let actions = self.node.handle(event);
        for action in actions {
            self.process_action(action).await;
        }
        self.refresh_views().await;
    }

    async fn process_action(&mut self, action: Action) {
        trace!(action = action.type_name(), "processing action");
        match action {
            Action::BroadcastBlock { block } => {
                // Single-node deployment: there is no peer transport, and
                // the proposer has already applied its own block.
                debug!(height = %block.height(), "no peers configured; announcement skipped");
            }

            Action::SetTimer { id, duration } => {
                self.timer_manager.set_timer(id, duration);
            }
            Action::CancelTimer { id } => {
                self.timer_manager.cancel_timer(id);
            }

            Action::EnqueueInternal { event } => {
                let _ = self.callback_tx.send(event);
            }

            Action::PersistBlock { block, receipts } => {
                {
                    let mut cache = self.views.tx_status.write().await;
                    for receipt in &receipts {
                        cache.update(receipt.tx_hash, TransactionStatus::Included);
                    }
                }
                let storage = Arc::clone(&self.storage);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = storage.put_block(&block, &receipts) {
                        error!(height = %block.height(), error = %e, "failed to persist block");
                    }
                });
            }

            Action::PersistBatch { batch } => {
                if batch.status == BatchStatus::Pending {
                    self.batch_closed_at.entry(batch.id).or_insert_with(Instant::now);
                }
                let storage = Arc::clone(&self.storage);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = storage.put_batch(&batch) {
                        error!(batch_id = %batch.id, error = %e, "failed to persist batch");
                    }
                });
            }

            Action::PersistLedgerSnapshot { snapshot } => {
                *self.views.ledger.write().await = snapshot.clone();
                let storage = Arc::clone(&self.storage);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = storage.put_ledger_snapshot(&snapshot) {
                        error!(error = %e, "failed to persist ledger snapshot");
                    }
                });
            }

            Action::SubmitBatch { batch, attempt } => {
                let client = Arc::clone(&self.pact_client);
                let callback = self.callback_tx.clone();
                tokio::spawn(async move {
                    let batch_id = batch.id;
                    let result = client.submit(&batch).await;
                    let _ = callback.send(Event::SubmissionCompleted {
                        batch_id,
                        attempt,
                        result,
                    });
                });
            }

            Action::PollSettlement {
                batch_id,
                request_key,
                attempt,
            } => {
                metrics::record_settlement_poll();
                let client = Arc::clone(&self.pact_client);
                let callback = self.callback_tx.clone();
                tokio::spawn(async move {
                    let outcome = client.poll(&request_key).await;
                    let _ = callback.send(Event::PollCompleted {
                        batch_id,
                        attempt,
                        outcome,
                    });
                });
            }

            Action::EmitBlockSealed { block } => {
                metrics::record_block_sealed(block.height().0, block.transactions.len());
                info!(
                    height = %block.height(),
                    txs = block.transactions.len(),
                    state_root = %block.state_root(),
                    "block sealed"
                );
            }

            Action::EmitTransactionAdmitted { tx_hash } => {
                metrics::record_transaction_admitted();
                self.views
                    .tx_status
                    .write()
                    .await
                    .update(tx_hash, TransactionStatus::Pending);
                if !self.views.pending.complete_admission(&tx_hash, Ok(())) {
                    debug!(%tx_hash, "admitted with no waiting client");
                }
            }

            Action::EmitTransactionRejected { tx_hash, error } => {
                metrics::record_transaction_rejected(admission_reason(&error));
                debug!(%tx_hash, %error, "transaction rejected");
                self.views.pending.complete_admission(&tx_hash, Err(error));
            }

            Action::EmitTransactionDropped { tx_hash, error } => {
                metrics::record_transaction_dropped();
                warn!(%tx_hash, %error, "transaction dropped at apply time");
                self.views
                    .tx_status
                    .write()
                    .await
                    .update(tx_hash, TransactionStatus::Dropped);
            }

            Action::EmitBatchStatus { batch_id, status } => {
                metrics::record_batch_status(status);
                info!(%batch_id, %status, "batch status changed");
                if status.is_terminal() {
                    if let Some(closed_at) = self.batch_closed_at.remove(&batch_id) {
                        if status == BatchStatus::Confirmed {
                            metrics::record_settlement_latency(closed_at.elapsed().as_secs_f64());
                        }
                    }
                }
            }

            Action::EmitClientResponse {
                request_id,
                response,
            } => {
                if !self.views.pending.complete_call(request_id, response) {
                    debug!(request_id, "client response with no waiting caller");
                }
            }

            Action::EmitConsistencyFault { fault } => {
                metrics::record_consistency_fault();
                error!(%fault, "consistency fault; production halts at this height");
                self.views.chain.write().await.fault = Some(fault.to_string());
            }
        }
    }

    /// Push the node's current read surface into the shared views.
    async fn refresh_views(&mut self) {
        let mut chain = self.views.chain.write().await;
        chain.height = self.node.head_height().0;
        chain.head_hash = self.node.head_hash();
        chain.state_root = self.node.state_root();
        chain.mempool_size = self.node.mempool_size();
        chain.batch_count = self.node.batch_count();
        if chain.fault.is_none() {
            chain.fault = self.node.fault().map(|f| f.to_string());
        }
        metrics::set_mempool_size(chain.mempool_size);
    }
}

fn admission_reason(error: &AdmissionError) -> &'static str {
    match error {
        AdmissionError::Duplicate { .. } => "duplicate",
        AdmissionError::Malformed(_) => "malformed",
        AdmissionError::InvalidSignature(_) => "invalid_signature",
        AdmissionError::InvalidNonce { .. } => "invalid_nonce",
        AdmissionError::InsufficientFunds { .. } => "insufficient_funds",
        AdmissionError::PoolFull { .. } => "pool_full",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_settlement::HttpPactClient;

    #[test]
    fn builder_requires_core_fields() {
        let err = ProductionRunner::builder().build().unwrap_err();
        assert!(matches!(err, RunnerError::MissingField("node_config")));

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let err = ProductionRunner::builder()
            .node_config(NodeConfig::default())
            .storage(storage)
            .pact_client(Arc::new(HttpPactClient::new(Default::default())))
            .build()
            .unwrap_err();
        assert!(matches!(err, RunnerError::MissingField("client_events")));
    }

    #[tokio::test]
    async fn builder_assembles_fresh_node() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let (_tx, rx) = mpsc::channel(4);
        let (runner, handle) = ProductionRunner::builder()
            .node_config(NodeConfig::default())
            .storage(storage)
            .pact_client(Arc::new(HttpPactClient::new(Default::default())))
            .client_events(rx)
            .shared_views(SharedViews::new())
            .build()
            .unwrap();
        // Genesis start issues exactly the production timer arm.
        assert_eq!(runner.startup_actions.len(), 1);
        handle.shutdown();
    }
}
