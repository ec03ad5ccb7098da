//! Append-only Merkle accumulator for peg bridge cycles
//!
//! Each bridge cycle collects burn leaves into a [`Tree`], publishes its root
//! and hands every leaf a [`Path`]. Redemptions are checked with
//! [`compute_root`], which needs no tree and mirrors the EVM verifier:
//! - Left-balanced shape: a pure function of leaf count and order
//! - Sorted-pair keccak256: parents do not depend on child order
//! - Lazy hashing: only dirty nodes are rehashed, without recursion

mod error;
mod hash;
mod hasher;
mod proof;
mod tree;

pub use error::AccumulatorError;
pub use hash::{HASH_LEN, Hash};
pub use hasher::{EMPTY_HASH, Keccak256Hasher, PairHash, keccak256, pair_hash};
pub use proof::{Direction, Path, PathStep, compute_root, verify};
pub use tree::{PENDING_BATCH, Tree};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_and_verifier_agree() {
        let leaves: Vec<Hash> = (1u8..=6).map(|i| keccak256(&[i])).collect();
        let mut tree = Tree::with_leaves(leaves.iter().copied());
        let root = tree.root().unwrap();

        let path = tree.path(4).unwrap();
        assert!(path.verify(&root).unwrap());

        // an independently assembled proof for leaf 4: sibling 5, then the
        // root of the first four leaves
        let left = pair_hash(&leaves[0], &leaves[1]).out;
        let right = pair_hash(&leaves[2], &leaves[3]).out;
        let first_four = pair_hash(&left, &right).out;
        assert_eq!(compute_root(&leaves[4], &[leaves[5], first_four]).unwrap(), root);
    }
}
