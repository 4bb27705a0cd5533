//! The aggregate node state machine.

use crate::NodeConfig;
use aegen_core::{Action, ClientResponse, Event, StateMachine};
use aegen_ledger::LedgerState;
use aegen_mempool::MempoolState;
use aegen_producer::ProducerState;
use aegen_settlement::{BatchAccumulator, BridgeState};
use aegen_types::{
    Address, Batch, BatchId, Block, BlockHeight, ConsistencyFault, Hash, KeyPair, LedgerError,
    LedgerSnapshot, TokenId, TokenInfo,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The deterministic core of an Aegen node.
///
/// Owns the ledger, mempool, producer and settlement components and
/// routes every event to the right one. All I/O happens in the runner;
/// given the same event sequence and injected time, two nodes built from
/// the same config reach identical state roots.
pub struct NodeStateMachine {
    ledger: LedgerState,
    mempool: MempoolState,
    producer: ProducerState,
    accumulator: BatchAccumulator,
    bridge: BridgeState,
    now: Duration,
}

impl NodeStateMachine {
    /// Build a fresh node from genesis. Fails only on an invalid genesis
    /// configuration.
    pub fn new(config: NodeConfig, signing_key: Option<KeyPair>) -> Result<Self, LedgerError> {
        let ledger = config.genesis.build()?;
        Ok(Self {
            ledger,
            mempool: MempoolState::new(config.mempool),
            producer: ProducerState::new(
                config.producer,
                config.validators,
                config.local_address,
                signing_key,
            ),
            accumulator: BatchAccumulator::new(config.settlement.batch_threshold),
            bridge: BridgeState::new(config.settlement),
            now: Duration::ZERO,
        })
    }

    /// Rebuild the machine from persisted state after a restart.
    ///
    /// The returned actions re-arm polling for batches that were in
    /// flight; the caller still issues [`Self::start`] for the production
    /// timer.
    pub fn recover(
        config: NodeConfig,
        signing_key: Option<KeyPair>,
        snapshot: LedgerSnapshot,
        head_height: BlockHeight,
        head_hash: Hash,
        batches: Vec<Batch>,
    ) -> (Self, Vec<Action>) {
        let ledger = LedgerState::from_snapshot(snapshot);
        let mut producer = ProducerState::new(
            config.producer,
            config.validators,
            config.local_address,
            signing_key,
        );
        producer.recover_head(head_height, head_hash);

        let next_id = batches
            .iter()
            .map(|b| b.id)
            .max()
            .map_or(BatchId(1), |id| id.next());
        let last_batched = batches
            .iter()
            .map(|b| b.end_height)
            .max()
            .unwrap_or(BlockHeight::GENESIS);
        let accumulator = BatchAccumulator::recover(
            config.settlement.batch_threshold,
            next_id,
            last_batched,
            head_height,
            ledger.state_root(),
        );
        let (bridge, actions) = BridgeState::recover(config.settlement, batches);

        let node = Self {
            ledger,
            mempool: MempoolState::new(config.mempool),
            producer,
            accumulator,
            bridge,
            now: Duration::ZERO,
        };
        (node, actions)
    }

    /// Actions that start the production loop. Issued once at boot.
    pub fn start(&self) -> Vec<Action> {
        vec![self.producer.rearm_tick()]
    }

    fn now_ms(&self) -> u64 {
        self.now.as_millis() as u64
    }

    fn on_block_sealed(&mut self, block: &Block) -> Vec<Action> {
        match self.accumulator.on_block_sealed(block, self.now_ms()) {
            Some(batch) => vec![Action::EnqueueInternal {
                event: Event::BatchClosed { batch },
            }],
            None => vec![],
        }
    }

    fn on_create_token(&mut self, request_id: u64, spec: &aegen_types::TokenSpec) -> Vec<Action> {
        let now_ms = self.now_ms();
        let result = self.ledger.create_token(spec, now_ms);
        let mut actions = Vec::with_capacity(2);
        if result.is_ok() {
            actions.push(Action::PersistLedgerSnapshot {
                snapshot: self.ledger.snapshot(),
            });
        }
        actions.push(Action::EmitClientResponse {
            request_id,
            response: ClientResponse::TokenCreated(result),
        });
        actions
    }

    fn on_transfer_token(
        &mut self,
        request_id: u64,
        token: &TokenId,
        sender: &Address,
        receiver: &Address,
        amount: u64,
    ) -> Vec<Action> {
        let result = self
            .ledger
            .transfer_token(token, sender, receiver, amount)
            .map(|()| {
                // Synthetic hash identifying the transfer for callers;
                // token moves settle immediately, outside blocks.
                let mut bytes = Vec::with_capacity(96);
                bytes.extend_from_slice(token.as_str().as_bytes());
                bytes.extend_from_slice(sender.as_str().as_bytes());
                bytes.extend_from_slice(receiver.as_str().as_bytes());
                bytes.extend_from_slice(&amount.to_be_bytes());
                bytes.extend_from_slice(&self.now.as_nanos().to_be_bytes());
                Hash::of(&bytes)
            });
        let mut actions = Vec::with_capacity(2);
        if result.is_ok() {
            actions.push(Action::PersistLedgerSnapshot {
                snapshot: self.ledger.snapshot(),
            });
        }
        actions.push(Action::EmitClientResponse {
            request_id,
            response: ClientResponse::TokenTransferred(result),
        });
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Read surface for the RPC layer
    // ═══════════════════════════════════════════════════════════════════════

    pub fn head_height(&self) -> BlockHeight {
        self.producer.head_height()
    }

    pub fn head_hash(&self) -> Hash {
        self.producer.head_hash()
    }

    pub fn state_root(&self) -> Hash {
        self.ledger.state_root()
    }

    pub fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn balance_of(&self, address: &Address) -> u64 {
        self.ledger.balance_of(address)
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.ledger.nonce_of(address)
    }

    pub fn token_balance_of(&self, token: &TokenId, address: &Address) -> u64 {
        self.ledger.token_balance_of(token, address)
    }

    pub fn token_info(&self, token: &TokenId) -> Option<&TokenInfo> {
        self.ledger.token_info(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.ledger.tokens()
    }

    pub fn account_count(&self) -> usize {
        self.ledger.account_count()
    }

    pub fn mempool_size(&self) -> usize {
        self.mempool.size()
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.bridge.batch(id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.bridge.batches()
    }

    pub fn batch_count(&self) -> usize {
        self.bridge.batch_count()
    }

    pub fn fault(&self) -> Option<&ConsistencyFault> {
        self.producer.fault()
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::ProductionTick => self
                .producer
                .on_production_tick(&mut self.mempool, &mut self.ledger),
            Event::BlockAnnounced { block } => {
                self.producer
                    .on_block_announced(&block, &mut self.mempool, &mut self.ledger)
            }
            Event::BlockSealed { block } => self.on_block_sealed(&block),
            Event::BatchClosed { batch } => self.bridge.on_batch_closed(batch),
            Event::SubmissionCompleted {
                batch_id,
                attempt,
                result,
            } => self.bridge.on_submission_completed(batch_id, attempt, result),
            Event::PollCompleted {
                batch_id,
                attempt,
                outcome,
            } => self.bridge.on_poll_completed(batch_id, attempt, outcome),
            Event::SettlementPollTimer { batch_id } => {
                self.bridge.on_settlement_poll_timer(batch_id)
            }
            Event::SubmissionRetryTimer { batch_id } => {
                self.bridge.on_submission_retry_timer(batch_id)
            }
            Event::SubmitTransaction { tx } => {
                let tx_hash = tx.hash();
                match self.mempool.submit(Arc::clone(&tx), &self.ledger) {
                    Ok(_) => vec![Action::EmitTransactionAdmitted { tx_hash }],
                    Err(error) => vec![Action::EmitTransactionRejected { tx_hash, error }],
                }
            }
            Event::CreateToken { request_id, spec } => self.on_create_token(request_id, &spec),
            Event::TransferToken {
                request_id,
                token,
                sender,
                receiver,
                amount,
            } => self.on_transfer_token(request_id, &token, &sender, &receiver, amount),
            Event::ResubmitBatch { batch_id } => match self.bridge.resubmit(batch_id) {
                Ok(actions) => actions,
                Err(error) => {
                    warn!(%batch_id, %error, "resubmission refused");
                    vec![]
                }
            },
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.mempool.set_time(now);
        self.producer.set_time(now);
    }
}
