//! Prometheus metrics for the production node.
//!
//! All metrics use the default registry and are exposed by the RPC
//! server's `/metrics` endpoint.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All node metrics.
pub struct Metrics {
    // === Production ===
    pub blocks_sealed: Counter,
    pub block_height: Gauge,
    pub block_transactions: Histogram,

    // === Mempool ===
    pub mempool_size: Gauge,
    pub transactions_admitted: Counter,
    pub transactions_rejected: CounterVec,
    pub transactions_dropped: Counter,

    // === Settlement ===
    pub batches_closed: Counter,
    pub batches_submitted: Counter,
    pub batches_confirmed: Counter,
    pub batches_failed: Counter,
    pub settlement_polls: Counter,
    pub settlement_latency: Histogram,

    // === Consistency ===
    pub consistency_faults: Counter,

    // === Storage ===
    pub storage_read_latency: Histogram,
    pub storage_write_latency: Histogram,

    // === RPC ===
    pub rpc_requests: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        // Latency buckets: 1ms to 60s
        let latency_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        Self {
            blocks_sealed: register_counter!(
                "aegen_blocks_sealed_total",
                "Total number of blocks sealed and committed"
            )
            .unwrap(),

            block_height: register_gauge!("aegen_block_height", "Current committed block height")
                .unwrap(),

            block_transactions: register_histogram!(
                "aegen_block_transactions",
                "Transactions included per sealed block",
                vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]
            )
            .unwrap(),

            mempool_size: register_gauge!(
                "aegen_mempool_size",
                "Number of pending transactions in the mempool"
            )
            .unwrap(),

            transactions_admitted: register_counter!(
                "aegen_transactions_admitted_total",
                "Total transactions admitted to the mempool"
            )
            .unwrap(),

            transactions_rejected: register_counter_vec!(
                "aegen_transactions_rejected_total",
                "Total transactions rejected at admission",
                &["reason"]
            )
            .unwrap(),

            transactions_dropped: register_counter!(
                "aegen_transactions_dropped_total",
                "Total transactions dropped at apply time"
            )
            .unwrap(),

            batches_closed: register_counter!(
                "aegen_batches_closed_total",
                "Total settlement batches closed by the accumulator"
            )
            .unwrap(),

            batches_submitted: register_counter!(
                "aegen_batches_submitted_total",
                "Total batches accepted by the external chain"
            )
            .unwrap(),

            batches_confirmed: register_counter!(
                "aegen_batches_confirmed_total",
                "Total batches confirmed on the external chain"
            )
            .unwrap(),

            batches_failed: register_counter!(
                "aegen_batches_failed_total",
                "Total batches that ended in the Failed state"
            )
            .unwrap(),

            settlement_polls: register_counter!(
                "aegen_settlement_polls_total",
                "Total settlement poll attempts"
            )
            .unwrap(),

            settlement_latency: register_histogram!(
                "aegen_settlement_latency_seconds",
                "Time from batch close to confirmation",
                latency_buckets.clone()
            )
            .unwrap(),

            consistency_faults: register_counter!(
                "aegen_consistency_faults_total",
                "Total consistency faults detected during replay"
            )
            .unwrap(),

            storage_read_latency: register_histogram!(
                "aegen_storage_read_latency_seconds",
                "RocksDB read latency",
                latency_buckets.clone()
            )
            .unwrap(),

            storage_write_latency: register_histogram!(
                "aegen_storage_write_latency_seconds",
                "RocksDB write latency",
                latency_buckets
            )
            .unwrap(),

            rpc_requests: register_counter_vec!(
                "aegen_rpc_requests_total",
                "Total RPC requests by method",
                &["method"]
            )
            .unwrap(),
        }
    }
}

/// Get or initialize the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record a sealed block.
pub fn record_block_sealed(height: u64, tx_count: usize) {
    let m = metrics();
    m.blocks_sealed.inc();
    m.block_height.set(height as f64);
    m.block_transactions.observe(tx_count as f64);
}

/// Update mempool size.
pub fn set_mempool_size(size: usize) {
    metrics().mempool_size.set(size as f64);
}

/// Record a transaction admitted to the mempool.
pub fn record_transaction_admitted() {
    metrics().transactions_admitted.inc();
}

/// Record a transaction rejected at admission.
pub fn record_transaction_rejected(reason: &str) {
    metrics()
        .transactions_rejected
        .with_label_values(&[reason])
        .inc();
}

/// Record a transaction dropped at apply time.
pub fn record_transaction_dropped() {
    metrics().transactions_dropped.inc();
}

/// Record a batch status change worth counting.
pub fn record_batch_status(status: aegen_types::BatchStatus) {
    let m = metrics();
    match status {
        aegen_types::BatchStatus::Pending => m.batches_closed.inc(),
        aegen_types::BatchStatus::Submitted => m.batches_submitted.inc(),
        aegen_types::BatchStatus::Confirmed => m.batches_confirmed.inc(),
        aegen_types::BatchStatus::Failed => m.batches_failed.inc(),
    }
}

/// Record one settlement poll attempt.
pub fn record_settlement_poll() {
    metrics().settlement_polls.inc();
}

/// Record close-to-confirmation latency for a batch.
pub fn record_settlement_latency(secs: f64) {
    metrics().settlement_latency.observe(secs);
}

/// Record a consistency fault.
pub fn record_consistency_fault() {
    metrics().consistency_faults.inc();
}

/// Record storage read latency.
pub fn record_storage_read(latency_secs: f64) {
    metrics().storage_read_latency.observe(latency_secs);
}

/// Record storage write latency.
pub fn record_storage_write(latency_secs: f64) {
    metrics().storage_write_latency.observe(latency_secs);
}

/// Record an RPC request.
pub fn record_rpc_request(method: &str) {
    metrics().rpc_requests.with_label_values(&[method]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_initialize_once() {
        let a = metrics() as *const Metrics;
        let b = metrics() as *const Metrics;
        assert_eq!(a, b);
    }

    #[test]
    fn counters_accumulate() {
        let before = metrics().blocks_sealed.get();
        record_block_sealed(7, 3);
        assert!(metrics().blocks_sealed.get() >= before + 1.0);
        assert_eq!(metrics().block_height.get(), 7.0);
    }
}
