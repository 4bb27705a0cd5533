//! Batch accumulation over sealed blocks.

use aegen_types::{Batch, BatchId, Block, BlockHeight, Hash};
use tracing::info;

/// Groups contiguous sealed blocks into settlement batches.
///
/// Blocks arrive strictly in height order (the producer seals them that
/// way). Once `threshold` unbatched blocks exist, the accumulator closes a
/// batch covering `[last_batched + 1, head]` and carries the state root of
/// the head block as the settled commitment. Batch ids are monotonic and
/// never reused, including across restarts.
#[derive(Debug)]
pub struct BatchAccumulator {
    threshold: u64,
    next_id: BatchId,
    /// Highest height already covered by a closed batch.
    last_batched: BlockHeight,
    /// Highest sealed height seen so far.
    head: BlockHeight,
    /// State root of the head block.
    head_root: Hash,
}

impl BatchAccumulator {
    pub fn new(threshold: u64) -> Self {
        assert!(threshold >= 1, "batch threshold must be at least 1");
        Self {
            threshold,
            next_id: BatchId(1),
            last_batched: BlockHeight::GENESIS,
            head: BlockHeight::GENESIS,
            head_root: Hash::ZERO,
        }
    }

    /// Restore the accumulator position from persisted batches and the
    /// recovered chain head. Blocks sealed past the last batch before a
    /// crash fold into the next batch range.
    pub fn recover(
        threshold: u64,
        next_id: BatchId,
        last_batched: BlockHeight,
        head: BlockHeight,
        head_root: Hash,
    ) -> Self {
        debug_assert!(head >= last_batched);
        let mut acc = Self::new(threshold);
        acc.next_id = next_id;
        acc.last_batched = last_batched;
        acc.head = head;
        acc.head_root = head_root;
        acc
    }

    /// Sealed blocks not yet covered by a closed batch.
    pub fn unbatched(&self) -> u64 {
        self.head.0 - self.last_batched.0
    }

    pub fn next_id(&self) -> BatchId {
        self.next_id
    }

    /// Record a sealed block; returns the closed batch when the threshold
    /// is reached.
    pub fn on_block_sealed(&mut self, block: &Block, now_ms: u64) -> Option<Batch> {
        debug_assert_eq!(block.height(), self.head.next());
        self.head = block.height();
        self.head_root = block.state_root();

        if self.unbatched() < self.threshold {
            return None;
        }

        let batch = Batch::new(
            self.next_id,
            BlockHeight(self.last_batched.0 + 1),
            self.head,
            self.head_root,
            now_ms,
        );
        info!(
            batch_id = %batch.id,
            start = %batch.start_height,
            end = %batch.end_height,
            "closed settlement batch"
        );
        self.next_id = self.next_id.next();
        self.last_batched = self.head;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_types::test_utils::test_block;

    #[test]
    fn closes_consecutive_ranges_at_threshold() {
        let mut acc = BatchAccumulator::new(2);

        assert!(acc.on_block_sealed(&test_block(1, vec![]), 0).is_none());
        let first = acc.on_block_sealed(&test_block(2, vec![]), 0).unwrap();
        assert_eq!(first.id, BatchId(1));
        assert_eq!(first.start_height, BlockHeight(1));
        assert_eq!(first.end_height, BlockHeight(2));

        assert!(acc.on_block_sealed(&test_block(3, vec![]), 0).is_none());
        let second = acc.on_block_sealed(&test_block(4, vec![]), 0).unwrap();
        assert_eq!(second.id, BatchId(2));
        assert_eq!(second.start_height, BlockHeight(3));
        assert_eq!(second.end_height, BlockHeight(4));
    }

    #[test]
    fn carries_state_root_of_last_block_in_range() {
        let mut acc = BatchAccumulator::new(2);
        let b1 = test_block(1, vec![]);
        let b2 = test_block(2, vec![]);
        acc.on_block_sealed(&b1, 0);
        let batch = acc.on_block_sealed(&b2, 0).unwrap();
        assert_eq!(batch.state_root, b2.state_root());
    }

    #[test]
    fn threshold_one_closes_every_block() {
        let mut acc = BatchAccumulator::new(1);
        let batch = acc.on_block_sealed(&test_block(1, vec![]), 42).unwrap();
        assert_eq!(batch.start_height, batch.end_height);
        assert_eq!(batch.created_at, 42);
    }

    #[test]
    fn recovery_resumes_id_sequence() {
        let mut acc =
            BatchAccumulator::recover(2, BatchId(7), BlockHeight(12), BlockHeight(12), Hash::ZERO);
        assert!(acc.on_block_sealed(&test_block(13, vec![]), 0).is_none());
        let batch = acc.on_block_sealed(&test_block(14, vec![]), 0).unwrap();
        assert_eq!(batch.id, BatchId(7));
        assert_eq!(batch.start_height, BlockHeight(13));
    }

    #[test]
    fn recovery_counts_unbatched_sealed_blocks() {
        // Crashed after sealing block 13 but before batching it.
        let mut acc =
            BatchAccumulator::recover(2, BatchId(7), BlockHeight(12), BlockHeight(13), Hash::ZERO);
        assert_eq!(acc.unbatched(), 1);
        let batch = acc.on_block_sealed(&test_block(14, vec![]), 0).unwrap();
        assert_eq!(batch.start_height, BlockHeight(13));
        assert_eq!(batch.end_height, BlockHeight(14));
    }
}
