//! Shared state between the runner and the RPC handlers.

use crate::storage::RocksDbStorage;
use aegen_core::{ClientResponse, Event};
use aegen_types::{AdmissionError, Hash, LedgerSnapshot, TransactionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, RwLock};

/// Shared state for RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    /// Ready flag for the readiness probe.
    pub ready: Arc<AtomicBool>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    /// Chain head and counters, refreshed by the runner per event.
    pub chain: Arc<RwLock<ChainView>>,
    /// Latest committed ledger snapshot, for balance and nonce reads.
    pub ledger: Arc<RwLock<LedgerSnapshot>>,
    /// Transaction status cache, updated from runner notifications.
    pub tx_status: Arc<RwLock<TransactionStatusCache>>,
    /// Block, transaction and batch history.
    pub storage: Arc<RocksDbStorage>,
    /// Channel delivering client events to the runner.
    pub event_tx: mpsc::Sender<Event>,
    /// In-flight request correlation.
    pub pending: Arc<PendingRequests>,
}

/// Snapshot of chain-level status for RPC reads.
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    /// External network this node settles to, e.g. `testnet04`.
    pub network: String,
    /// External chain id within that network.
    pub chain_id: String,
    pub height: u64,
    pub head_hash: Hash,
    pub state_root: Hash,
    pub mempool_size: usize,
    pub batch_count: usize,
    /// Rendered consistency fault halting production, if any.
    pub fault: Option<String>,
}

/// Cached transaction status entry.
#[derive(Debug, Clone)]
pub struct CachedTransactionStatus {
    pub status: TransactionStatus,
    pub updated_at: Instant,
}

/// Cache of transaction statuses for RPC queries.
///
/// Updated by the runner on admission, inclusion and drop. Terminal
/// entries age out after a TTL so the cache stays bounded.
#[derive(Debug)]
pub struct TransactionStatusCache {
    entries: HashMap<Hash, CachedTransactionStatus>,
    max_entries: usize,
    terminal_ttl: Duration,
}

impl Default for TransactionStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionStatusCache {
    pub fn new() -> Self {
        Self::with_config(100_000, Duration::from_secs(300))
    }

    pub fn with_config(max_entries: usize, terminal_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            terminal_ttl,
        }
    }

    pub fn update(&mut self, tx_hash: Hash, status: TransactionStatus) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&tx_hash) {
            self.evict_old_entries();
        }
        self.entries.insert(
            tx_hash,
            CachedTransactionStatus {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<&CachedTransactionStatus> {
        self.entries.get(tx_hash)
    }

    fn evict_old_entries(&mut self) {
        let now = Instant::now();
        let ttl = self.terminal_ttl;
        self.entries.retain(|_, entry| {
            !(entry.status.is_terminal() && now.duration_since(entry.updated_at) > ttl)
        });

        if self.entries.len() >= self.max_entries {
            let mut terminal: Vec<_> = self
                .entries
                .iter()
                .filter(|(_, e)| e.status.is_terminal())
                .map(|(h, e)| (*h, e.updated_at))
                .collect();
            terminal.sort_by_key(|(_, t)| *t);

            // Oldest tenth goes, keeping headroom for new entries.
            let to_remove = terminal.len() / 10 + 1;
            for (hash, _) in terminal.into_iter().take(to_remove) {
                self.entries.remove(&hash);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Correlation table for requests waiting on the state machine.
///
/// Client calls register a oneshot before their event is sent; the
/// runner completes it when the matching notification action arrives.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    calls: Mutex<HashMap<u64, oneshot::Sender<ClientResponse>>>,
    admissions: Mutex<HashMap<Hash, oneshot::Sender<Result<(), AdmissionError>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and register a waiter for its response.
    pub fn register_call(&self) -> (u64, oneshot::Receiver<ClientResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_calls().insert(id, tx);
        (id, rx)
    }

    /// Deliver a response to a waiting call. False when the caller is gone.
    pub fn complete_call(&self, request_id: u64, response: ClientResponse) -> bool {
        match self.lock_calls().remove(&request_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop a waiter that timed out or disconnected.
    pub fn forget_call(&self, request_id: u64) {
        self.lock_calls().remove(&request_id);
    }

    /// Register a waiter for a transaction admission outcome.
    pub fn register_admission(
        &self,
        tx_hash: Hash,
    ) -> oneshot::Receiver<Result<(), AdmissionError>> {
        let (tx, rx) = oneshot::channel();
        self.lock_admissions().insert(tx_hash, tx);
        rx
    }

    /// Deliver an admission outcome. False when nobody is waiting.
    pub fn complete_admission(&self, tx_hash: &Hash, result: Result<(), AdmissionError>) -> bool {
        match self.lock_admissions().remove(tx_hash) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn forget_admission(&self, tx_hash: &Hash) {
        self.lock_admissions().remove(tx_hash);
    }

    fn lock_calls(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<ClientResponse>>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_admissions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Hash, oneshot::Sender<Result<(), AdmissionError>>>>
    {
        self.admissions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_types::TokenId;

    #[test]
    fn cache_update_and_get() {
        let mut cache = TransactionStatusCache::new();
        let hash = Hash::of(b"tx");
        assert!(cache.get(&hash).is_none());

        cache.update(hash, TransactionStatus::Pending);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&hash).unwrap().status, TransactionStatus::Pending);

        cache.update(hash, TransactionStatus::Included);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&hash).unwrap().status,
            TransactionStatus::Included
        );
    }

    #[test]
    fn cache_evicts_terminal_entries_at_capacity() {
        let mut cache = TransactionStatusCache::with_config(4, Duration::ZERO);
        for i in 0u8..4 {
            cache.update(Hash::of(&[i]), TransactionStatus::Included);
        }
        cache.update(Hash::of(b"new"), TransactionStatus::Pending);
        assert!(cache.len() <= 4);
        assert!(cache.get(&Hash::of(b"new")).is_some());
    }

    #[tokio::test]
    async fn pending_call_round_trip() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register_call();
        assert!(pending.complete_call(id, ClientResponse::TokenCreated(Ok(TokenId::from("t")))));
        assert!(matches!(
            rx.await.unwrap(),
            ClientResponse::TokenCreated(Ok(_))
        ));

        // Completing twice finds no waiter.
        assert!(!pending.complete_call(id, ClientResponse::TokenCreated(Ok(TokenId::from("t")))));
    }

    #[tokio::test]
    async fn pending_admission_round_trip() {
        let pending = PendingRequests::new();
        let hash = Hash::of(b"tx");
        let rx = pending.register_admission(hash);
        assert!(pending.complete_admission(&hash, Ok(())));
        assert!(rx.await.unwrap().is_ok());
        assert!(!pending.complete_admission(&hash, Ok(())));
    }
}
