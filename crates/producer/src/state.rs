//! Block production state machine.

use crate::leader::leader_for;
use aegen_core::{Action, Event, TimerId};
use aegen_ledger::{transaction_root, LedgerState};
use aegen_mempool::MempoolState;
use aegen_types::{
    Address, Block, BlockHeader, BlockHeight, ConsistencyFault, Hash, KeyPair, Receipt,
    Transaction,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Block production configuration.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Interval between production ticks.
    pub cadence: Duration,
    /// Cap on transactions per block.
    pub max_block_transactions: usize,
    /// Cap on aggregate gas per block.
    pub max_block_gas: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(5),
            max_block_transactions: 100,
            max_block_gas: 30_000_000,
        }
    }
}

/// Production phase within a tick.
///
/// `Idle -> Proposing -> Sealed -> Idle`; non-leaders stay `Idle` and
/// verify announced blocks instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerPhase {
    #[default]
    Idle,
    Proposing,
    Sealed,
}

/// Leader-driven block producer and follower verifier.
///
/// On each tick the current leader drains the mempool, applies the drained
/// transactions in order (dropping apply-time failures without requeueing)
/// and seals a block carrying the resulting state root. Followers replay
/// announced blocks against their own ledger and reject on divergence.
pub struct ProducerState {
    config: ProducerConfig,
    /// Proposer addresses, indexed by `height % len` for leadership.
    validators: Vec<Address>,
    /// This node's proposer address.
    local: Address,
    /// Key for signing sealed headers, when this node leads.
    signing_key: Option<KeyPair>,

    phase: ProducerPhase,
    /// Set on the first consistency fault; production halts past the
    /// faulted height until operator resolution.
    fault: Option<ConsistencyFault>,

    /// Height and hash of the latest applied block (genesis = 0 / zero).
    head_height: BlockHeight,
    head_hash: Hash,

    now: Duration,
}

impl ProducerState {
    pub fn new(
        config: ProducerConfig,
        validators: Vec<Address>,
        local: Address,
        signing_key: Option<KeyPair>,
    ) -> Self {
        assert!(!validators.is_empty(), "validator set must be non-empty");
        Self {
            config,
            validators,
            local,
            signing_key,
            phase: ProducerPhase::Idle,
            fault: None,
            head_height: BlockHeight::GENESIS,
            head_hash: Hash::ZERO,
            now: Duration::ZERO,
        }
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn head_height(&self) -> BlockHeight {
        self.head_height
    }

    pub fn head_hash(&self) -> Hash {
        self.head_hash
    }

    pub fn phase(&self) -> ProducerPhase {
        self.phase
    }

    /// The consistency fault halting production, if any.
    pub fn fault(&self) -> Option<&ConsistencyFault> {
        self.fault.as_ref()
    }

    /// Restore the head pointer from persisted state after a restart.
    pub fn recover_head(&mut self, height: BlockHeight, hash: Hash) {
        self.head_height = height;
        self.head_hash = hash;
    }

    /// The timer action that keeps the production loop running.
    pub fn rearm_tick(&self) -> Action {
        Action::SetTimer {
            id: TimerId::ProductionTick,
            duration: self.config.cadence,
        }
    }

    fn is_leader_for(&self, height: BlockHeight) -> bool {
        leader_for(height, &self.validators) == &self.local
    }

    /// Handle the production tick.
    ///
    /// Always re-arms the tick timer; seals a block only when this node
    /// leads the next height and the mempool yields applicable
    /// transactions.
    #[instrument(skip_all, fields(height = self.head_height.0 + 1))]
    pub fn on_production_tick(
        &mut self,
        mempool: &mut MempoolState,
        ledger: &mut LedgerState,
    ) -> Vec<Action> {
        let mut actions = vec![self.rearm_tick()];

        if self.fault.is_some() {
            return actions;
        }

        let next = self.head_height.next();
        if !self.is_leader_for(next) {
            return actions;
        }
        if mempool.size() == 0 {
            return actions;
        }

        self.phase = ProducerPhase::Proposing;
        let drained = mempool.drain(
            self.config.max_block_transactions,
            self.config.max_block_gas,
        );

        let mut applied: Vec<Arc<Transaction>> = Vec::with_capacity(drained.len());
        let mut receipts: Vec<Receipt> = Vec::with_capacity(drained.len());
        for tx in drained {
            match ledger.apply(&tx, &self.local, next) {
                Ok(receipt) => {
                    receipts.push(receipt);
                    applied.push(tx);
                }
                Err(error) => {
                    // Lost a nonce or balance race since admission; the
                    // transaction is dropped, never requeued.
                    warn!(tx_hash = %tx.hash(), %error, "dropping transaction at apply time");
                    actions.push(Action::EmitTransactionDropped {
                        tx_hash: tx.hash(),
                        error,
                    });
                }
            }
        }

        if applied.is_empty() {
            self.phase = ProducerPhase::Idle;
            return actions;
        }

        let tx_hashes: Vec<Hash> = applied.iter().map(|tx| tx.hash()).collect();
        let mut header = BlockHeader {
            height: next,
            timestamp: self.now.as_millis() as u64,
            previous_hash: self.head_hash,
            state_root: ledger.state_root(),
            tx_root: transaction_root(&tx_hashes),
            proposer: self.local.clone(),
            signature: None,
        };
        if let Some(key) = &self.signing_key {
            header.sign(key);
        }

        let block = Arc::new(Block {
            header,
            transactions: applied,
        });
        self.phase = ProducerPhase::Sealed;
        self.head_height = next;
        self.head_hash = block.hash();
        mempool.on_block_applied(&block, ledger);

        info!(
            height = %next,
            txs = block.transactions.len(),
            state_root = %block.state_root(),
            "sealed block"
        );

        actions.push(Action::EnqueueInternal {
            event: Event::BlockSealed {
                block: Arc::clone(&block),
            },
        });
        actions.push(Action::BroadcastBlock {
            block: Arc::clone(&block),
        });
        actions.push(Action::PersistBlock {
            block: Arc::clone(&block),
            receipts,
        });
        actions.push(Action::PersistLedgerSnapshot {
            snapshot: ledger.snapshot(),
        });
        actions.push(Action::EmitBlockSealed { block });

        self.phase = ProducerPhase::Idle;
        actions
    }

    /// Handle a block announced by a peer.
    ///
    /// Verifies the expected proposer, replays the block's transactions
    /// against a scratch copy of the ledger and compares state roots.
    /// Divergence rejects the block, emits the fault and halts production
    /// for this node; committed state is never touched by a rejected block.
    #[instrument(skip_all, fields(height = block.height().0))]
    pub fn on_block_announced(
        &mut self,
        block: &Arc<Block>,
        mempool: &mut MempoolState,
        ledger: &mut LedgerState,
    ) -> Vec<Action> {
        if self.fault.is_some() {
            return vec![];
        }
        // Our own broadcast echoed back, or an old height.
        if block.header.proposer == self.local || block.height() <= self.head_height {
            return vec![];
        }

        let expected_height = self.head_height.next();
        if block.height() != expected_height {
            let fault = ConsistencyFault::HeightGap {
                got: block.height(),
                expected: expected_height,
            };
            warn!(%fault, "rejecting announced block");
            return vec![Action::EmitConsistencyFault { fault }];
        }

        let expected_leader = leader_for(block.height(), &self.validators).clone();
        if block.header.proposer != expected_leader {
            let fault = ConsistencyFault::WrongProposer {
                height: block.height(),
                got: block.header.proposer.clone(),
                expected: expected_leader,
            };
            warn!(%fault, "rejecting announced block");
            return vec![Action::EmitConsistencyFault { fault }];
        }

        // Replay on a scratch ledger; commit only a verified result.
        let mut scratch = ledger.clone();
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut replay_ok = true;
        for tx in &block.transactions {
            match scratch.apply(tx, &block.header.proposer, block.height()) {
                Ok(receipt) => receipts.push(receipt),
                Err(error) => {
                    debug!(tx_hash = %tx.hash(), %error, "announced block transaction fails replay");
                    replay_ok = false;
                    break;
                }
            }
        }

        let computed = scratch.state_root();
        if !replay_ok || computed != block.state_root() {
            let fault = ConsistencyFault::StateRootMismatch {
                height: block.height(),
                announced: block.state_root(),
                computed,
            };
            warn!(%fault, "state divergence, halting production at this height");
            self.fault = Some(fault.clone());
            return vec![Action::EmitConsistencyFault { fault }];
        }

        *ledger = scratch;
        self.head_height = block.height();
        self.head_hash = block.hash();
        mempool.on_block_applied(block, ledger);

        info!(height = %block.height(), txs = block.transactions.len(), "accepted announced block");

        vec![
            Action::EnqueueInternal {
                event: Event::BlockSealed {
                    block: Arc::clone(block),
                },
            },
            Action::PersistBlock {
                block: Arc::clone(block),
                receipts,
            },
            Action::PersistLedgerSnapshot {
                snapshot: ledger.snapshot(),
            },
            Action::EmitBlockSealed {
                block: Arc::clone(block),
            },
        ]
    }
}
