//! Persistence port for cycle receipts

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::StoreError, types::Hash};

/// Keys written for a bridge cycle
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoreKey {
    /// `cycle -> set(bridge)`: bridges active in the cycle
    CycleBridges(Hash),
    /// `(cycle, bridge) -> "root:section"`
    BridgeRoot {
        /// Cycle identifier
        cycle: Hash,
        /// Bridge identifier
        bridge: Hash,
    },
    /// `(cycle, bridge) -> set(leaf_record)`
    BridgeLeaves {
        /// Cycle identifier
        cycle: Hash,
        /// Bridge identifier
        bridge: Hash,
    },
}

/// Stored value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreValue {
    /// Single text record
    Text(String),
    /// Set of text records
    Set(BTreeSet<String>),
}

/// All writes of one cycle, applied together or not at all
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    /// Key/value pairs in write order
    pub entries: Vec<(StoreKey, StoreValue)>,
}

impl WriteBatch {
    /// Queue a write
    pub fn put(&mut self, key: StoreKey, value: StoreValue) {
        self.entries.push((key, value));
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Key-value capability handed in by the node
pub trait ReceiptStore {
    /// Apply every write in `batch` atomically
    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Read a value
    fn get(&self, key: &StoreKey) -> Result<Option<StoreValue>, StoreError>;
}

/// In-memory store for tests and tooling
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<StoreKey, StoreValue>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReceiptStore for MemoryStore {
    /// Rewriting a key with the same value is allowed so a cycle can be
    /// retried; a different value rejects the whole batch.
    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        for (key, value) in &batch.entries {
            if self.entries.get(key).is_some_and(|existing| existing != value) {
                return Err(StoreError::Conflict(key.clone()));
            }
        }
        debug!(writes = batch.len(), "applying receipt batch");
        self.entries.extend(batch.entries);
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> Result<Option<StoreValue>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }
}
