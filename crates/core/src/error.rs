//! Error types

use std::path::PathBuf;

use pegbridge_accumulator::{AccumulatorError, Hash};

use crate::{store::StoreKey, types::EventRef};

/// Leaf and instruction codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Hash decoding or proof reconstruction failed
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// Section values do not match the bridge's `peg_steps + micro_steps`
    #[error("expected {expected} fraction sections, got {actual}")]
    SectionCount {
        /// Configured count
        expected: usize,
        /// Supplied count
        actual: usize,
    },

    /// Section index exceeds the peg steps
    #[error("section {section} out of range for {peg_steps} peg steps")]
    SectionOutOfRange {
        /// Supplied section
        section: u32,
        /// Configured peg steps
        peg_steps: u32,
    },

    /// Section values overflow a u64 total
    #[error("fraction sections overflow u64")]
    ValueOverflow,

    /// Instruction bytes could not be parsed
    #[error("malformed instruction: {0}")]
    Malformed(String),

    /// Instruction does not parse past `dest_addr`, re-encode to the same
    /// bytes, or hash to its carried leaf
    #[error("instruction does not re-encode identically")]
    ReplayMismatch,

    /// The bridge's leaf codec produces a different leaf for the fields
    #[error("instruction fields do not encode to the carried leaf")]
    LeafMismatch,

    /// Proof leads to a root that was never published
    #[error("proof resolves to unpublished root {0}")]
    UnknownRoot(Hash),
}

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`Config`](crate::Config)
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Semantic validation failed
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Text record parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Record ended before `field`
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// `field` could not be parsed
    #[error("invalid {field}: {value:?}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Raw text
        value: String,
    },

    /// Extra fields after the last expected one
    #[error("{0} trailing fields")]
    TrailingFields(usize),
}

/// Receipt store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A batch tried to overwrite an existing key with a different value
    #[error("conflicting write for {0:?}")]
    Conflict(StoreKey),

    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Cycle receipt construction failures. Any of these aborts the whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// Leaf encoding failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Root or path extraction failed
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// Persistence failed; nothing was written
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored record could not be parsed
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The same burned output appeared twice in one cycle
    #[error("duplicate burn event {0}")]
    DuplicateEvent(EventRef),

    /// Two events produced the same leaf
    #[error("duplicate leaf {0}")]
    DuplicateLeaf(Hash),

    /// Nonce counter overflowed
    #[error("nonce overflow for bridge {0}")]
    NonceOverflow(Hash),
}
