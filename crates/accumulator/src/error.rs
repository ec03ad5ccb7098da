//! Accumulator error types

/// Errors produced by hashes, trees and proof verification.
///
/// None of these leave a [`Tree`](crate::Tree) in a modified state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccumulatorError {
    /// Malformed hex or byte input for a [`Hash`](crate::Hash)
    #[error("decode error: {0}")]
    Decode(String),

    /// Root requested on a tree that never received a leaf
    #[error("tree has no leaves")]
    EmptyTree,

    /// Leaf or path index outside `[min, max]`
    #[error("index {index} out of range [{min}, {max}]")]
    IndexOutOfRange {
        /// Requested index
        index: u64,
        /// Smallest addressable index
        min: u64,
        /// Largest addressable index
        max: u64,
    },

    /// A proof element equals the running branch hash
    #[error("proof element {depth} duplicates the running branch")]
    DuplicateBranch {
        /// Position of the offending element in the proof
        depth: usize,
    },
}
