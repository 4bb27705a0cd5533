//! Binary merkle root over transaction hashes.

use aegen_types::Hash;

/// Compute the merkle root of an ordered list of transaction hashes.
///
/// Levels pair adjacent nodes, duplicating the last node of an odd level.
/// An empty list commits to `Hash::ZERO`.
pub fn transaction_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = *pair.get(1).unwrap_or(&left);
            let mut bytes = [0u8; 64];
            bytes[..32].copy_from_slice(left.as_bytes());
            bytes[32..].copy_from_slice(right.as_bytes());
            next.push(Hash::of(&bytes));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash {
        Hash::of(&[n])
    }

    #[test]
    fn empty_commits_to_zero() {
        assert_eq!(transaction_root(&[]), Hash::ZERO);
    }

    #[test]
    fn single_leaf_hashes_with_itself() {
        // One leaf is an odd level: it pairs with its own duplicate.
        let root = transaction_root(&[h(1)]);
        assert_ne!(root, h(1));
        assert_eq!(root, transaction_root(&[h(1)]));
    }

    #[test]
    fn order_matters() {
        let a = transaction_root(&[h(1), h(2)]);
        let b = transaction_root(&[h(2), h(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn odd_count_duplicates_last() {
        // [1,2,3] must equal [1,2,3,3] under last-leaf duplication.
        let odd = transaction_root(&[h(1), h(2), h(3)]);
        let padded = transaction_root(&[h(1), h(2), h(3), h(3)]);
        assert_eq!(odd, padded);
    }
}
