//! Bridge leaf codec
//!
//! A leaf commits to one bridge transfer. The preimage is ABI-style: one
//! 32-byte big-endian word per field, in the order
//! `(dest_addr, fractions..., section_index, nonce, sender_ref)`, hashed with
//! keccak256 so the EVM side can rebuild it with `abi.encode`.

use serde::{Deserialize, Serialize};

use pegbridge_accumulator::{Keccak256Hasher, keccak256};

use crate::{
    config::BridgeConfig,
    error::CodecError,
    types::{Address, Hash, SenderRef},
};

/// ABI word width
pub const WORD_LEN: usize = 32;

fn address_word(address: &Address) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - 20..].copy_from_slice(address.as_slice());
    word
}

fn uint_word(value: u64) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

impl SenderRef {
    /// 32-byte word committed in the leaf.
    ///
    /// Addresses are left-padded; outputs commit to
    /// `keccak256(txid || vout_be32)`.
    pub fn abi_word(&self) -> [u8; WORD_LEN] {
        match self {
            Self::Address(address) => address_word(address),
            Self::Output(output) => keccak256(&output.to_bytes()).into_bytes(),
        }
    }
}

/// Fields a bridge leaf commits to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeLeafPreimage {
    /// EVM recipient
    pub dest_addr: Address,
    /// Peg-step values followed by micro-step values
    pub fractions: Vec<u64>,
    /// Peg step the value split occurs at
    pub section_index: u32,
    /// Per-bridge transfer counter
    pub nonce: u64,
    /// Origin of the transfer
    pub sender_ref: SenderRef,
}

impl BridgeLeafPreimage {
    /// The exact bytes hashed into the leaf
    pub fn abi_encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.fractions.len() + 4) * WORD_LEN);
        out.extend_from_slice(&address_word(&self.dest_addr));
        for value in &self.fractions {
            out.extend_from_slice(&uint_word(*value));
        }
        out.extend_from_slice(&uint_word(u64::from(self.section_index)));
        out.extend_from_slice(&uint_word(self.nonce));
        out.extend_from_slice(&self.sender_ref.abi_word());
        out
    }

    /// keccak256 of [`Self::abi_encode`], without bridge checks
    pub fn leaf_hash(&self) -> Hash {
        Keccak256Hasher::hash(&self.abi_encode())
    }

    /// Sum of all section values
    pub fn total_value(&self) -> Result<u64, CodecError> {
        self.fractions
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            .ok_or(CodecError::ValueOverflow)
    }
}

impl BridgeConfig {
    /// Encode a leaf for this bridge.
    ///
    /// The preimage must carry exactly `peg_steps + micro_steps` values, a
    /// section no greater than `peg_steps`, and values whose total fits in a u64.
    pub fn encode_leaf(&self, preimage: &BridgeLeafPreimage) -> Result<Hash, CodecError> {
        if preimage.fractions.len() != self.fraction_count() {
            return Err(CodecError::SectionCount {
                expected: self.fraction_count(),
                actual: preimage.fractions.len(),
            });
        }
        if preimage.section_index > self.peg_steps {
            return Err(CodecError::SectionOutOfRange {
                section: preimage.section_index,
                peg_steps: self.peg_steps,
            });
        }
        preimage.total_value()?;
        Ok(preimage.leaf_hash())
    }
}

/// Encode a leaf from its parts
pub fn encode_leaf(
    bridge: &BridgeConfig,
    dest_addr: Address,
    fractions: &[u64],
    section_index: u32,
    nonce: u64,
    sender_ref: SenderRef,
) -> Result<Hash, CodecError> {
    bridge.encode_leaf(&BridgeLeafPreimage {
        dest_addr,
        fractions: fractions.to_vec(),
        section_index,
        nonce,
        sender_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRef;

    fn bridge() -> BridgeConfig {
        BridgeConfig {
            name: "eth".into(),
            hash: Hash::new([1; 32]),
            peg_steps: 2,
            micro_steps: 1,
        }
    }

    fn preimage() -> BridgeLeafPreimage {
        BridgeLeafPreimage {
            dest_addr: Address::from([0x22; 20]),
            fractions: vec![5, 0, 7],
            section_index: 1,
            nonce: 3,
            sender_ref: SenderRef::Address(Address::from([0x33; 20])),
        }
    }

    #[test]
    fn test_abi_layout() {
        let encoded = preimage().abi_encode();
        assert_eq!(encoded.len(), 7 * WORD_LEN);
        assert_eq!(&encoded[..12], &[0u8; 12]);
        assert_eq!(&encoded[12..32], &[0x22; 20]);
        assert_eq!(encoded[63], 5);
        assert_eq!(encoded[95], 0);
        assert_eq!(encoded[127], 7);
        assert_eq!(encoded[159], 1);
        assert_eq!(encoded[191], 3);
        assert_eq!(&encoded[204..], &[0x33; 20]);
    }

    #[test]
    fn test_encode_leaf_hashes_abi_bytes() {
        let p = preimage();
        let leaf = bridge().encode_leaf(&p).unwrap();
        assert_eq!(leaf, keccak256(&p.abi_encode()));
        assert_eq!(
            encode_leaf(&bridge(), p.dest_addr, &p.fractions, 1, 3, p.sender_ref).unwrap(),
            leaf
        );
    }

    #[test]
    fn test_leaf_depends_on_every_field() {
        let base = preimage().leaf_hash();
        let mut p = preimage();
        p.nonce = 4;
        assert_ne!(p.leaf_hash(), base);

        let mut p = preimage();
        p.fractions[2] = 8;
        assert_ne!(p.leaf_hash(), base);

        let mut p = preimage();
        p.sender_ref = SenderRef::Output(EventRef::new(Hash::new([0x33; 32]), 0));
        assert_ne!(p.leaf_hash(), base);
    }

    #[test]
    fn test_encode_leaf_checks_bridge_shape() {
        let mut p = preimage();
        p.fractions.push(1);
        assert!(matches!(
            bridge().encode_leaf(&p),
            Err(CodecError::SectionCount {
                expected: 3,
                actual: 4
            })
        ));

        // a fully drawn peg sits at section == peg_steps
        let mut p = preimage();
        p.section_index = 2;
        assert!(bridge().encode_leaf(&p).is_ok());

        p.section_index = 3;
        assert!(matches!(
            bridge().encode_leaf(&p),
            Err(CodecError::SectionOutOfRange {
                section: 3,
                peg_steps: 2
            })
        ));

        let mut p = preimage();
        p.fractions = vec![u64::MAX, 1, 0];
        assert!(matches!(bridge().encode_leaf(&p), Err(CodecError::ValueOverflow)));
    }

    #[test]
    fn test_output_sender_word() {
        let output = EventRef::new(Hash::new([0x44; 32]), 9);
        let word = SenderRef::Output(output).abi_word();
        assert_eq!(word, keccak256(&output.to_bytes()).into_bytes());
    }
}
