//! Common types

use std::fmt;

use serde::{Deserialize, Serialize};

pub use alloy_primitives::Address;
pub use pegbridge_accumulator::Hash;

/// Block height
pub type BlockNumber = u64;

/// Transaction output index
pub type OutputIndex = u32;

/// Reference to a transaction output (`txid:vout`)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventRef {
    /// Transaction hash
    pub txid: Hash,
    /// Output index within the transaction
    pub vout: OutputIndex,
}

impl EventRef {
    /// Create a new reference
    pub const fn new(txid: Hash, vout: OutputIndex) -> Self {
        Self { txid, vout }
    }

    /// `txid || vout` with `vout` as 4 big-endian bytes
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut bytes = [0u8; 36];
        bytes[..32].copy_from_slice(self.txid.as_bytes());
        bytes[32..].copy_from_slice(&self.vout.to_be_bytes());
        bytes
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Who initiated a bridge transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderRef {
    /// EVM-side sender address
    Address(Address),
    /// Spent output on this chain
    Output(EventRef),
}

/// A burn recorded while scanning a cycle's blocks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Burned output
    pub txid: Hash,
    /// Output index
    pub vout: OutputIndex,
    /// Block the burn was mined in
    pub height: BlockNumber,
    /// Position of the transaction in its block
    pub tx_index: u32,
    /// Bridge identifier
    pub bridge: Hash,
    /// EVM recipient
    pub dest_addr: Address,
    /// Peg-step values followed by micro-step values
    pub fractions: Vec<u64>,
    /// Origin of the burn
    pub sender_ref: SenderRef,
}

impl BurnEvent {
    /// Output reference this event is keyed by
    pub const fn event_ref(&self) -> EventRef {
        EventRef::new(self.txid, self.vout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ref_bytes_and_display() {
        let event = EventRef::new(Hash::new([0xab; 32]), 0x0102_0304);
        let bytes = event.to_bytes();
        assert_eq!(&bytes[..32], &[0xab; 32]);
        assert_eq!(&bytes[32..], &[1, 2, 3, 4]);
        assert_eq!(event.to_string(), format!("{}:{}", "ab".repeat(32), 0x0102_0304));
    }
}
