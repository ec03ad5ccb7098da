//! Keccak256 hashing and the sorted-pair rule used for tree nodes

use tiny_keccak::{Hasher, Keccak};

use crate::hash::Hash;

/// keccak256 of the empty input
pub const EMPTY_HASH: Hash = Hash::new([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Result of pairing two node hashes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairHash {
    /// Parent hash
    pub out: Hash,
    /// `true` when the right operand sorted before the left one
    pub swap: bool,
}

/// Keccak256 hasher
#[derive(Debug)]
pub struct Keccak256Hasher;

impl Keccak256Hasher {
    /// Hash arbitrary bytes
    pub fn hash(data: &[u8]) -> Hash {
        Self::hash_parts(&[data])
    }

    /// Hash the concatenation of several byte slices
    pub fn hash_parts(parts: &[&[u8]]) -> Hash {
        let mut hasher = Keccak::v256();
        for part in parts {
            hasher.update(part);
        }
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        Hash::new(output)
    }

    /// Combine two children in sorted order.
    ///
    /// The smaller operand (big-endian byte order) is hashed first, so an
    /// EVM verifier holding an unordered proof computes the same parent.
    pub fn hash_pair(left: &Hash, right: &Hash) -> PairHash {
        let swap = right < left;
        let (a, b) = if swap { (right, left) } else { (left, right) };
        PairHash {
            out: Self::hash_parts(&[a.as_bytes(), b.as_bytes()]),
            swap,
        }
    }
}

/// keccak256 of `data`
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256Hasher::hash(data)
}

/// Sorted-pair parent hash of `left` and `right`
pub fn pair_hash(left: &Hash, right: &Hash) -> PairHash {
    Keccak256Hasher::hash_pair(left, right)
}
