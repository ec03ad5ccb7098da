//! Inclusion paths and standalone root reconstruction

use serde::{Deserialize, Serialize};

use crate::{error::AccumulatorError, hash::Hash, hasher::Keccak256Hasher, tree::Tree};

/// Which child the walk descended into at one level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// The proven node is the left child; the sibling is on the right
    Left,
    /// The proven node is the right child; the sibling is on the left
    Right,
}

/// One level of an inclusion path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Hash of the other child at this level
    pub sibling: Hash,
    /// Side the proven node sits on
    pub direction: Direction,
    /// Swap bit of the parent node (diagnostic only)
    pub swap: bool,
}

/// Inclusion proof for one leaf, ordered from the leaf upward
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// The proven leaf
    pub leaf: Hash,
    /// Index of the leaf in the tree
    pub leaf_index: u64,
    /// Tree `max_index` when the path was extracted
    pub max_index: u64,
    /// Sibling hashes from the leaf up to the root
    pub steps: Vec<PathStep>,
}

impl Path {
    /// Sibling hashes in proof order, as handed to an external verifier
    pub fn siblings(&self) -> Vec<Hash> {
        self.steps.iter().map(|step| step.sibling).collect()
    }

    /// Number of levels between the leaf and the root
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` for a single-leaf tree
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Rebuild the root from the leaf and the siblings
    pub fn compute_root(&self) -> Result<Hash, AccumulatorError> {
        compute_root(&self.leaf, &self.siblings())
    }

    /// Check the path against an expected root
    pub fn verify(&self, root: &Hash) -> Result<bool, AccumulatorError> {
        Ok(self.compute_root()? == *root)
    }

    /// `true` when leaves were added to `tree` after this path was taken
    pub fn is_stale(&self, tree: &Tree) -> bool {
        self.max_index != tree.max_index()
    }
}

/// Reconstruct a root from a leaf and an unordered-pair proof.
///
/// This is the computation the on-chain verifier performs: at every level
/// the running branch and the proof element are sorted by byte value and
/// hashed. A proof element equal to the running branch is rejected.
pub fn compute_root(leaf: &Hash, proof: &[Hash]) -> Result<Hash, AccumulatorError> {
    let mut branch = *leaf;
    for (depth, sibling) in proof.iter().enumerate() {
        if *sibling == branch {
            return Err(AccumulatorError::DuplicateBranch { depth });
        }
        branch = Keccak256Hasher::hash_pair(&branch, sibling).out;
    }
    Ok(branch)
}

/// `compute_root(leaf, proof) == root`
pub fn verify(leaf: &Hash, proof: &[Hash], root: &Hash) -> Result<bool, AccumulatorError> {
    Ok(compute_root(leaf, proof)? == *root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::pair_hash;

    fn h(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    #[test]
    fn test_empty_proof_returns_leaf() {
        assert_eq!(compute_root(&h(5), &[]).unwrap(), h(5));
    }

    #[test]
    fn test_manual_proof() {
        let (l1, l2, l3) = (h(1), h(2), h(3));
        let inner = pair_hash(&l1, &l2).out;
        let root = pair_hash(&inner, &l3).out;

        assert_eq!(compute_root(&l1, &[l2, l3]).unwrap(), root);
        assert_eq!(compute_root(&l2, &[l1, l3]).unwrap(), root);
        assert_eq!(compute_root(&l3, &[inner]).unwrap(), root);
        assert!(verify(&l3, &[inner], &root).unwrap());
        assert!(!verify(&l3, &[l1], &root).unwrap());
    }

    #[test]
    fn test_duplicate_branch_rejected() {
        let leaf = h(7);
        assert_eq!(
            compute_root(&leaf, &[leaf]),
            Err(AccumulatorError::DuplicateBranch { depth: 0 })
        );

        let parent = pair_hash(&leaf, &h(8)).out;
        assert_eq!(
            compute_root(&leaf, &[h(8), parent]),
            Err(AccumulatorError::DuplicateBranch { depth: 1 })
        );
    }
}
