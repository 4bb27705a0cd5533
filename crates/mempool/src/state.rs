//! Mempool state.

use aegen_ledger::LedgerState;
use aegen_types::{AdmissionError, Address, Block, Hash, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Mempool configuration.
#[derive(Debug, Clone, Copy)]
pub struct MempoolConfig {
    /// Hard cap on pending transactions.
    pub capacity: usize,
    /// Reject transactions whose ed25519 signature does not verify
    /// against the sender's `k:` account key. Off by default to match
    /// the permissive dev chain.
    pub require_signatures: bool,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            require_signatures: false,
        }
    }
}

/// Entry in the transaction pool.
#[derive(Debug)]
struct PoolEntry {
    tx: Arc<Transaction>,
    /// Global admission sequence, drives drain interleaving.
    seq: u64,
    #[allow(dead_code)]
    added_at: Duration,
}

/// Pending-transaction admission and ordering buffer.
///
/// Admission enforces structural well-formedness, contiguous nonces per
/// sender (so multiple pending nonces queue in order) and balance
/// sufficiency over the whole queued amount. Access is serialized by the
/// owning state machine, so plain `HashMap`s suffice; admission can never
/// interleave with a drain.
pub struct MempoolState {
    config: MempoolConfig,

    /// Transaction pool keyed by request key.
    pool: HashMap<Hash, PoolEntry>,

    /// Per-sender queued nonces, kept contiguous from the ledger nonce.
    by_sender: HashMap<Address, BTreeMap<u64, Hash>>,

    /// Monotonic admission counter.
    next_seq: u64,

    /// Current time.
    now: Duration,
}

impl MempoolState {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            pool: HashMap::new(),
            by_sender: HashMap::new(),
            next_seq: 0,
            now: Duration::ZERO,
        }
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    pub fn size(&self) -> usize {
        self.pool.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.pool.contains_key(hash)
    }

    /// Next nonce this sender could submit, given the ledger and the queue.
    pub fn next_admissible_nonce(&self, sender: &Address, ledger: &LedgerState) -> u64 {
        let base = ledger.nonce_of(sender);
        let queued = self
            .by_sender
            .get(sender)
            .map_or(0, |q| q.range(base..).count() as u64);
        base + queued
    }

    /// Admit a transaction, returning its request key.
    #[instrument(skip(self, tx, ledger), fields(tx_hash = ?tx.hash()))]
    pub fn submit(
        &mut self,
        tx: Arc<Transaction>,
        ledger: &LedgerState,
    ) -> Result<Hash, AdmissionError> {
        if !tx.is_well_formed() {
            return Err(AdmissionError::Malformed(
                "sender and receiver must be non-empty".into(),
            ));
        }
        if self.config.require_signatures && !tx.verify_signature() {
            return Err(AdmissionError::InvalidSignature(tx.sender.clone()));
        }
        if self.pool.len() >= self.config.capacity {
            return Err(AdmissionError::PoolFull {
                capacity: self.config.capacity,
            });
        }

        if let Some(queue) = self.by_sender.get(&tx.sender) {
            if queue.contains_key(&tx.nonce) {
                return Err(AdmissionError::Duplicate {
                    sender: tx.sender.clone(),
                    nonce: tx.nonce,
                });
            }
        }

        let expected = self.next_admissible_nonce(&tx.sender, ledger);
        if tx.nonce != expected {
            return Err(AdmissionError::InvalidNonce {
                sender: tx.sender.clone(),
                got: tx.nonce,
                expected,
            });
        }

        // The sender must be able to cover everything it has queued plus
        // this transaction, or later drains would just shed it at apply time.
        let queued_total: u64 = self
            .by_sender
            .get(&tx.sender)
            .map_or(0, |q| {
                q.values()
                    .filter_map(|h| self.pool.get(h))
                    .map(|e| e.tx.amount.saturating_add(e.tx.fee()))
                    .sum()
            });
        let required = queued_total.saturating_add(tx.amount.saturating_add(tx.fee()));
        let available = ledger.balance_of(&tx.sender);
        if available < required {
            return Err(AdmissionError::InsufficientFunds {
                sender: tx.sender.clone(),
                required,
                available,
            });
        }

        let hash = tx.hash();
        self.by_sender
            .entry(tx.sender.clone())
            .or_default()
            .insert(tx.nonce, hash);
        self.pool.insert(
            hash,
            PoolEntry {
                tx,
                seq: self.next_seq,
                added_at: self.now,
            },
        );
        self.next_seq += 1;

        debug!(tx_hash = %hash, pool_size = self.pool.len(), "transaction admitted");
        Ok(hash)
    }

    /// Remove and return up to `max_count` transactions within `max_gas`.
    ///
    /// Ordered by admission sequence, which is per-sender nonce ascending
    /// by construction (a sender's nonce n+1 is only admissible after n),
    /// with senders interleaved in arrival order.
    pub fn drain(&mut self, max_count: usize, max_gas: u64) -> Vec<Arc<Transaction>> {
        let mut ordered: Vec<(u64, Hash)> =
            self.pool.iter().map(|(h, e)| (e.seq, *h)).collect();
        ordered.sort_unstable();

        let mut drained = Vec::new();
        let mut gas_used = 0u64;
        for (_, hash) in ordered {
            if drained.len() >= max_count {
                break;
            }
            let gas = self.pool[&hash].tx.gas_limit;
            if gas_used.saturating_add(gas) > max_gas {
                break;
            }
            gas_used += gas;
            if let Some(entry) = self.pool.remove(&hash) {
                if let Some(queue) = self.by_sender.get_mut(&entry.tx.sender) {
                    queue.remove(&entry.tx.nonce);
                    if queue.is_empty() {
                        self.by_sender.remove(&entry.tx.sender);
                    }
                }
                drained.push(entry.tx);
            }
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), remaining = self.pool.len(), "drained mempool");
        }
        drained
    }

    /// Drop entries superseded by an applied block: anything the block
    /// included, plus queued nonces now below the sender's ledger nonce.
    pub fn on_block_applied(&mut self, block: &Block, ledger: &LedgerState) {
        for tx in &block.transactions {
            self.remove(&tx.hash());
        }

        let stale: Vec<Hash> = self
            .by_sender
            .iter()
            .flat_map(|(sender, queue)| {
                let base = ledger.nonce_of(sender);
                queue
                    .range(..base)
                    .map(|(_, hash)| *hash)
                    .collect::<Vec<_>>()
            })
            .collect();
        for hash in stale {
            self.remove(&hash);
        }
    }

    fn remove(&mut self, hash: &Hash) {
        if let Some(entry) = self.pool.remove(hash) {
            if let Some(queue) = self.by_sender.get_mut(&entry.tx.sender) {
                queue.remove(&entry.tx.nonce);
                if queue.is_empty() {
                    self.by_sender.remove(&entry.tx.sender);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_ledger::GenesisConfig;
    use aegen_types::test_utils::test_transfer;

    fn ledger() -> LedgerState {
        GenesisConfig::empty()
            .with_account("alice", 100_000)
            .with_account("bob", 100_000)
            .build()
            .unwrap()
    }

    fn mempool() -> MempoolState {
        MempoolState::new(MempoolConfig::default())
    }

    #[test]
    fn admits_and_returns_request_key() {
        let ledger = ledger();
        let mut pool = mempool();
        let tx = test_transfer("alice", "bob", 500, 0);
        let key = pool.submit(Arc::clone(&tx), &ledger).unwrap();
        assert_eq!(key, tx.hash());
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn duplicate_nonce_rejected_pool_unchanged() {
        let ledger = ledger();
        let mut pool = mempool();
        pool.submit(test_transfer("alice", "bob", 500, 0), &ledger)
            .unwrap();

        let err = pool
            .submit(test_transfer("alice", "carol", 9, 0), &ledger)
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Duplicate { nonce: 0, .. }));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn queues_contiguous_nonces_and_rejects_gaps() {
        let ledger = ledger();
        let mut pool = mempool();
        pool.submit(test_transfer("alice", "bob", 1, 0), &ledger).unwrap();
        pool.submit(test_transfer("alice", "bob", 2, 1), &ledger).unwrap();

        let err = pool
            .submit(test_transfer("alice", "bob", 3, 5), &ledger)
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidNonce { expected: 2, got: 5, .. }));
    }

    #[test]
    fn rejects_malformed() {
        let ledger = ledger();
        let mut pool = mempool();
        let tx = Arc::new(Transaction::new(Address::from(""), Address::from("bob"), 1, 0));
        assert!(matches!(
            pool.submit(tx, &ledger),
            Err(AdmissionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_over_queued_balance() {
        let ledger = ledger();
        let mut pool = mempool();
        pool.submit(test_transfer("alice", "bob", 60_000, 0), &ledger)
            .unwrap();
        let err = pool
            .submit(test_transfer("alice", "bob", 60_000, 1), &ledger)
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InsufficientFunds { .. }));
    }

    #[test]
    fn drain_orders_per_sender_nonces() {
        let ledger = ledger();
        let mut pool = mempool();
        pool.submit(test_transfer("alice", "bob", 1, 0), &ledger).unwrap();
        pool.submit(test_transfer("bob", "alice", 2, 0), &ledger).unwrap();
        pool.submit(test_transfer("alice", "bob", 3, 1), &ledger).unwrap();

        let drained = pool.drain(10, u64::MAX);
        assert_eq!(drained.len(), 3);
        assert_eq!(pool.size(), 0);

        // Per-sender nonces ascend in drain order.
        let alice_nonces: Vec<u64> = drained
            .iter()
            .filter(|t| t.sender == Address::from("alice"))
            .map(|t| t.nonce)
            .collect();
        assert_eq!(alice_nonces, vec![0, 1]);

        // Senders interleave by arrival: alice(0), bob(0), alice(1).
        let senders: Vec<&str> = drained.iter().map(|t| t.sender.as_str()).collect();
        assert_eq!(senders, vec!["alice", "bob", "alice"]);
    }

    #[test]
    fn drain_honors_count_cap() {
        let ledger = ledger();
        let mut pool = mempool();
        for nonce in 0..5 {
            pool.submit(test_transfer("alice", "bob", 1, nonce), &ledger)
                .unwrap();
        }
        let drained = pool.drain(3, u64::MAX);
        assert_eq!(drained.len(), 3);
        assert_eq!(pool.size(), 2);
        // Remainder still drains in nonce order.
        let rest = pool.drain(10, u64::MAX);
        assert_eq!(rest[0].nonce, 3);
    }

    #[test]
    fn drain_honors_gas_cap() {
        let ledger = ledger();
        let mut pool = mempool();
        for nonce in 0..3 {
            let tx = Arc::new(
                Transaction::new(Address::from("alice"), Address::from("bob"), 1, nonce)
                    .with_gas(100, 0),
            );
            pool.submit(tx, &ledger).unwrap();
        }
        let drained = pool.drain(10, 250);
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn signature_requirement_enforced() {
        use aegen_types::test_utils::test_keyed_account;

        let (kp, addr) = test_keyed_account(9);
        let mut ledger = GenesisConfig::empty().build().unwrap();
        ledger.credit(&addr, 1_000);

        let mut pool = MempoolState::new(MempoolConfig {
            require_signatures: true,
            ..Default::default()
        });

        let unsigned = Arc::new(Transaction::new(addr.clone(), Address::from("bob"), 1, 0));
        assert!(matches!(
            pool.submit(unsigned, &ledger),
            Err(AdmissionError::InvalidSignature(_))
        ));

        let mut tx = Transaction::new(addr, Address::from("bob"), 1, 0);
        tx.sign(&kp);
        pool.submit(Arc::new(tx), &ledger).unwrap();
    }

    #[test]
    fn block_application_prunes_included() {
        let mut ledger = ledger();
        let mut pool = mempool();
        let tx = test_transfer("alice", "bob", 500, 0);
        pool.submit(Arc::clone(&tx), &ledger).unwrap();

        ledger
            .apply(&tx, &Address::from("v0"), aegen_types::BlockHeight(1))
            .unwrap();
        let block = aegen_types::test_utils::test_block(1, vec![tx]);
        pool.on_block_applied(&block, &ledger);
        assert_eq!(pool.size(), 0);
    }
}
