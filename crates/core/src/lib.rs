//! Peg bridge cycle accounting
//!
//! Turns the burns of a bridge cycle into accumulator leaves, publishes one
//! root per bridge and hands out redemption receipts. Redemption
//! instructions are decoded here and checked against published roots.

pub mod config;
pub mod error;
pub mod instruction;
pub mod leaf;
pub mod receipt;
pub mod record;
mod script;
pub mod store;
pub mod types;

pub use config::{BridgeConfig, Config, DEFAULT_CYCLE_LENGTH, PEG_MAX_SUPPLY_INDEX};
pub use error::{CodecError, ConfigError, ReceiptError, RecordError, StoreError};
pub use instruction::{RedemptionInstruction, decode_and_validate};
pub use leaf::{BridgeLeafPreimage, WORD_LEN, encode_leaf};
pub use receipt::{
    BridgeCycle, BridgeCycleReceipt, BridgeNonces, CycleContext, CycleReceipts, ReceiptBuilder,
    load_leaf_records, load_published_root,
};
pub use record::{LeafRecord, RootRecord};
pub use store::{MemoryStore, ReceiptStore, StoreKey, StoreValue, WriteBatch};
pub use types::*;
