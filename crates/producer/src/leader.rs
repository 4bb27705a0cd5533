//! Leader schedule.

use aegen_types::{Address, BlockHeight};

/// Who proposes the block at `height`, round-robin over the validator set.
///
/// A pure function of the height and the set, so any node can verify the
/// expected proposer for a given height without consulting local state.
/// A single-validator set degenerates to a fixed leader.
pub fn leader_for(height: BlockHeight, validators: &[Address]) -> &Address {
    assert!(!validators.is_empty(), "validator set must be non-empty");
    &validators[(height.0 % validators.len() as u64) as usize]
}
