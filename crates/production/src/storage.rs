//! RocksDB persistence for blocks, transactions, batches and ledger
//! snapshots.
//!
//! Storage is append-mostly: blocks and receipts are written once at
//! seal time, batches are rewritten on every status change, and the
//! ledger snapshot is overwritten on every commit. Recovery reads all
//! of it back in one pass at boot.

use crate::metrics;
use aegen_types::{Batch, BatchId, Block, BlockHeight, Hash, LedgerSnapshot, Receipt, Transaction};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Column family for block bodies, keyed by big-endian height.
const CF_BLOCKS: &str = "blocks";
/// Column family for transaction records, keyed by content hash.
const CF_TRANSACTIONS: &str = "transactions";
/// Column family for batch records, keyed by big-endian batch sequence.
const CF_BATCHES: &str = "batches";
/// Column family for the committed ledger snapshot.
const CF_LEDGER: &str = "ledger";

const KEY_COMMITTED_HEIGHT: &[u8] = b"chain:committed_height";
const KEY_COMMITTED_HASH: &[u8] = b"chain:committed_hash";
const KEY_SNAPSHOT: &[u8] = b"ledger:snapshot";

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("missing column family: {0}")]
    MissingColumnFamily(&'static str),

    #[error("corrupt record under key {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

/// Tuning knobs for the RocksDB instance.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Block cache size in bytes.
    pub block_cache_bytes: usize,
    /// Write buffer size in bytes.
    pub write_buffer_bytes: usize,
    /// Number of background jobs for compaction and flush.
    pub background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            block_cache_bytes: 128 * 1024 * 1024,
            write_buffer_bytes: 64 * 1024 * 1024,
            background_jobs: 2,
        }
    }
}

/// A transaction together with the receipt recorded at inclusion time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub receipt: Receipt,
}

/// Everything the node state machine needs to resume after a restart.
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    pub head_height: BlockHeight,
    pub head_hash: Hash,
    pub snapshot: Option<LedgerSnapshot>,
    pub batches: Vec<Batch>,
}

impl RecoveredState {
    /// True when the database held no committed chain at all.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }
}

/// RocksDB-backed node storage.
///
/// `DB` is internally synchronized; this type is shared behind an `Arc`
/// between the runner and the RPC read path.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open (or create) the database at `path` with default tuning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_config(path, RocksDbConfig::default())
    }

    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: RocksDbConfig,
    ) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(config.background_jobs);
        opts.set_write_buffer_size(config.write_buffer_bytes);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        let cache = rocksdb::Cache::new_lru_cache(config.block_cache_bytes);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(10.0, false);

        let cf = |name: &str| {
            let mut cf_opts = Options::default();
            cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            cf_opts.set_block_based_table_factory(&block_opts);
            ColumnFamilyDescriptor::new(name, cf_opts)
        };

        let db = DB::open_cf_descriptors(
            &opts,
            path,
            vec![
                cf("default"),
                cf(CF_BLOCKS),
                cf(CF_TRANSACTIONS),
                cf(CF_BATCHES),
                cf(CF_LEDGER),
            ],
        )?;
        info!("opened rocksdb storage");
        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Blocks and transactions
    // ═══════════════════════════════════════════════════════════════════════

    /// Persist a sealed block, its transaction records and the committed
    /// chain head, atomically.
    pub fn put_block(&self, block: &Block, receipts: &[Receipt]) -> Result<(), StorageError> {
        let start = Instant::now();
        let mut write = WriteBatch::default();

        let height = block.height();
        write.put_cf(
            self.cf(CF_BLOCKS)?,
            height.0.to_be_bytes(),
            bincode::serialize(block)?,
        );

        let tx_cf = self.cf(CF_TRANSACTIONS)?;
        for receipt in receipts {
            let Some(tx) = block
                .transactions
                .iter()
                .find(|tx| tx.hash() == receipt.tx_hash)
            else {
                continue;
            };
            let record = TransactionRecord {
                transaction: (**tx).clone(),
                receipt: receipt.clone(),
            };
            write.put_cf(tx_cf, receipt.tx_hash.as_bytes(), bincode::serialize(&record)?);
        }

        write.put(KEY_COMMITTED_HEIGHT, height.0.to_be_bytes());
        write.put(KEY_COMMITTED_HASH, block.hash().as_bytes());

        self.db.write(write)?;
        metrics::record_storage_write(start.elapsed().as_secs_f64());
        debug!(height = %height, txs = receipts.len(), "persisted block");
        Ok(())
    }

    pub fn get_block(&self, height: BlockHeight) -> Result<Option<Block>, StorageError> {
        let start = Instant::now();
        let bytes = self
            .db
            .get_cf(self.cf(CF_BLOCKS)?, height.0.to_be_bytes())?;
        metrics::record_storage_read(start.elapsed().as_secs_f64());
        bytes.map(|b| bincode::deserialize(&b)).transpose().map_err(Into::into)
    }

    /// Blocks in `[from, to]`, ascending. Missing heights are skipped.
    pub fn get_blocks_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();
        for height in from.0..=to.0 {
            if let Some(block) = self.get_block(BlockHeight(height))? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    pub fn get_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<TransactionRecord>, StorageError> {
        let start = Instant::now();
        let bytes = self.db.get_cf(self.cf(CF_TRANSACTIONS)?, hash.as_bytes())?;
        metrics::record_storage_read(start.elapsed().as_secs_f64());
        bytes.map(|b| bincode::deserialize(&b)).transpose().map_err(Into::into)
    }

    /// The committed chain head, if any block has been persisted.
    pub fn get_chain_head(&self) -> Result<Option<(BlockHeight, Hash)>, StorageError> {
        let Some(height_bytes) = self.db.get(KEY_COMMITTED_HEIGHT)? else {
            return Ok(None);
        };
        let Some(hash_bytes) = self.db.get(KEY_COMMITTED_HASH)? else {
            return Ok(None);
        };
        let height: [u8; 8] = height_bytes.try_into().map_err(|_| StorageError::Corrupt {
            key: "chain:committed_height".into(),
            detail: "expected 8 bytes".into(),
        })?;
        let hash: [u8; 32] = hash_bytes.try_into().map_err(|_| StorageError::Corrupt {
            key: "chain:committed_hash".into(),
            detail: "expected 32 bytes".into(),
        })?;
        Ok(Some((BlockHeight(u64::from_be_bytes(height)), Hash(hash))))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Batches
    // ═══════════════════════════════════════════════════════════════════════

    /// Persist a batch record. Called on creation and on every status
    /// change; the latest write wins.
    pub fn put_batch(&self, batch: &Batch) -> Result<(), StorageError> {
        let start = Instant::now();
        self.db.put_cf(
            self.cf(CF_BATCHES)?,
            batch.id.0.to_be_bytes(),
            bincode::serialize(batch)?,
        )?;
        metrics::record_storage_write(start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StorageError> {
        let bytes = self.db.get_cf(self.cf(CF_BATCHES)?, id.0.to_be_bytes())?;
        bytes.map(|b| bincode::deserialize(&b)).transpose().map_err(Into::into)
    }

    /// All persisted batches in id order.
    pub fn get_all_batches(&self) -> Result<Vec<Batch>, StorageError> {
        let mut batches = Vec::new();
        let iter = self
            .db
            .iterator_cf(self.cf(CF_BATCHES)?, rocksdb::IteratorMode::Start);
        for entry in iter {
            let (_, value) = entry?;
            batches.push(bincode::deserialize(&value)?);
        }
        Ok(batches)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ledger snapshot
    // ═══════════════════════════════════════════════════════════════════════

    pub fn put_ledger_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let start = Instant::now();
        self.db.put_cf(
            self.cf(CF_LEDGER)?,
            KEY_SNAPSHOT,
            bincode::serialize(snapshot)?,
        )?;
        metrics::record_storage_write(start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn get_ledger_snapshot(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        let bytes = self.db.get_cf(self.cf(CF_LEDGER)?, KEY_SNAPSHOT)?;
        bytes.map(|b| bincode::deserialize(&b)).transpose().map_err(Into::into)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Recovery
    // ═══════════════════════════════════════════════════════════════════════

    /// Read back everything needed to resume the node after a restart.
    pub fn load_recovered_state(&self) -> Result<RecoveredState, StorageError> {
        let snapshot = self.get_ledger_snapshot()?;
        let (head_height, head_hash) = self
            .get_chain_head()?
            .unwrap_or((BlockHeight::GENESIS, Hash::ZERO));
        let batches = self.get_all_batches()?;
        info!(
            head = %head_height,
            batches = batches.len(),
            has_snapshot = snapshot.is_some(),
            "loaded recovered state"
        );
        Ok(RecoveredState {
            head_height,
            head_hash,
            snapshot,
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_types::test_utils::{test_block, test_transfer};
    use aegen_types::BatchStatus;

    fn open_temp() -> (RocksDbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        (storage, dir)
    }

    #[test]
    fn block_round_trip_and_chain_head() {
        let (storage, _dir) = open_temp();
        let tx = test_transfer("alice", "bob", 100, 0);
        let block = test_block(1, vec![tx.clone()]);
        let receipt = Receipt::success(tx.hash(), BlockHeight(1), 0);

        storage.put_block(&block, &[receipt.clone()]).unwrap();

        let loaded = storage.get_block(BlockHeight(1)).unwrap().unwrap();
        assert_eq!(loaded.hash(), block.hash());
        assert_eq!(loaded.transactions.len(), 1);

        let (height, hash) = storage.get_chain_head().unwrap().unwrap();
        assert_eq!(height, BlockHeight(1));
        assert_eq!(hash, block.hash());

        let record = storage.get_transaction(&tx.hash()).unwrap().unwrap();
        assert_eq!(record.receipt, receipt);
        assert_eq!(record.transaction.hash(), tx.hash());
    }

    #[test]
    fn missing_block_is_none() {
        let (storage, _dir) = open_temp();
        assert!(storage.get_block(BlockHeight(42)).unwrap().is_none());
        assert!(storage.get_chain_head().unwrap().is_none());
    }

    #[test]
    fn blocks_range_skips_gaps() {
        let (storage, _dir) = open_temp();
        storage.put_block(&test_block(1, vec![]), &[]).unwrap();
        storage.put_block(&test_block(3, vec![]), &[]).unwrap();
        let blocks = storage
            .get_blocks_range(BlockHeight(1), BlockHeight(3))
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].height(), BlockHeight(1));
        assert_eq!(blocks[1].height(), BlockHeight(3));
    }

    #[test]
    fn batch_status_overwrite() {
        let (storage, _dir) = open_temp();
        let mut batch = Batch::new(BatchId(1), BlockHeight(1), BlockHeight(2), Hash::ZERO, 0);
        storage.put_batch(&batch).unwrap();
        batch.mark_submitted("req-key".into());
        storage.put_batch(&batch).unwrap();

        let loaded = storage.get_batch(BatchId(1)).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Submitted);
        assert_eq!(loaded.request_key.as_deref(), Some("req-key"));
        assert_eq!(storage.get_all_batches().unwrap().len(), 1);
    }

    #[test]
    fn snapshot_round_trip() {
        let (storage, _dir) = open_temp();
        assert!(storage.get_ledger_snapshot().unwrap().is_none());

        let mut snapshot = LedgerSnapshot::default();
        snapshot.accounts.insert(
            aegen_types::Address::from("alice"),
            aegen_types::AccountState {
                balance: 500,
                nonce: 3,
            },
        );
        storage.put_ledger_snapshot(&snapshot).unwrap();
        assert_eq!(storage.get_ledger_snapshot().unwrap().unwrap(), snapshot);
    }

    #[test]
    fn recovery_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let block = test_block(2, vec![]);
        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.put_block(&block, &[]).unwrap();
            storage
                .put_batch(&Batch::new(
                    BatchId(1),
                    BlockHeight(1),
                    BlockHeight(2),
                    Hash::ZERO,
                    0,
                ))
                .unwrap();
            storage
                .put_ledger_snapshot(&LedgerSnapshot::default())
                .unwrap();
        }

        let storage = RocksDbStorage::open(dir.path()).unwrap();
        let recovered = storage.load_recovered_state().unwrap();
        assert!(!recovered.is_empty());
        assert_eq!(recovered.head_height, BlockHeight(2));
        assert_eq!(recovered.head_hash, block.hash());
        assert_eq!(recovered.batches.len(), 1);
    }

    #[test]
    fn empty_database_recovers_empty() {
        let (storage, _dir) = open_temp();
        let recovered = storage.load_recovered_state().unwrap();
        assert!(recovered.is_empty());
        assert_eq!(recovered.head_height, BlockHeight::GENESIS);
        assert_eq!(recovered.head_hash, Hash::ZERO);
        assert!(recovered.batches.is_empty());
    }
}
