//! Redemption instructions
//!
//! An instruction carries a leaf preimage together with the leaf and its
//! proof. It is only acted on when it re-encodes to the exact input bytes,
//! its fields hash to the carried leaf, and the proof resolves to a
//! published cycle root.

use serde::{Deserialize, Serialize};
use tracing::debug;

use pegbridge_accumulator::{HASH_LEN, compute_root};

use crate::{
    config::BridgeConfig,
    error::CodecError,
    leaf::BridgeLeafPreimage,
    script::{Reader, push_data, push_num},
    types::{Address, EventRef, Hash, SenderRef},
};

const ADDRESS_LEN: usize = 20;
const OUTPUT_LEN: usize = HASH_LEN + 4;

/// Decoded redemption instruction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionInstruction {
    /// Fields committed in the leaf
    pub preimage: BridgeLeafPreimage,
    /// Claimed leaf
    pub leaf: Hash,
    /// Sibling hashes from the leaf upward
    pub proof: Vec<Hash>,
}

impl RedemptionInstruction {
    /// Positional encoding:
    /// `dest, count, values.., section, nonce, sender, leaf, proof_count, proof..`
    pub fn encode(&self) -> Vec<u8> {
        let p = &self.preimage;
        let mut out = Vec::with_capacity(64 + p.fractions.len() * 9 + self.proof.len() * 33);

        push_data(&mut out, p.dest_addr.as_slice());
        push_num(&mut out, p.fractions.len() as u64);
        for value in &p.fractions {
            push_num(&mut out, *value);
        }
        push_num(&mut out, u64::from(p.section_index));
        push_num(&mut out, p.nonce);
        match &p.sender_ref {
            SenderRef::Address(address) => push_data(&mut out, address.as_slice()),
            SenderRef::Output(output) => push_data(&mut out, &output.to_bytes()),
        }
        push_data(&mut out, self.leaf.as_bytes());
        push_num(&mut out, self.proof.len() as u64);
        for hash in &self.proof {
            push_data(&mut out, hash.as_bytes());
        }
        out
    }

    /// Parse without validation.
    ///
    /// Only a missing or broken `dest_addr` push is reported as
    /// [`CodecError::Malformed`]; once that frame is recognised, any failure
    /// to parse the rest is a [`CodecError::ReplayMismatch`].
    fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(raw);
        let dest_addr = read_address(&mut reader, "dest_addr")?;
        Self::parse_body(&mut reader, dest_addr, raw.len()).map_err(|err| {
            debug!(error = %err, "instruction body does not parse");
            CodecError::ReplayMismatch
        })
    }

    fn parse_body(
        reader: &mut Reader<'_>,
        dest_addr: Address,
        input_len: usize,
    ) -> Result<Self, CodecError> {
        let count = reader.read_num("fraction count")?;
        let mut fractions = Vec::with_capacity(bounded_capacity(count, input_len));
        for _ in 0..count {
            fractions.push(reader.read_num("fraction")?);
        }

        let section_index = u32::try_from(reader.read_num("section")?)
            .map_err(|_| CodecError::Malformed("section does not fit in u32".into()))?;
        let nonce = reader.read_num("nonce")?;

        let sender = reader.read_data("sender_ref")?;
        let sender_ref = match sender.len() {
            ADDRESS_LEN => SenderRef::Address(address_from(sender)?),
            OUTPUT_LEN => {
                let txid = Hash::from_bytes(&sender[..HASH_LEN])?;
                let vout = u32::from_be_bytes([sender[32], sender[33], sender[34], sender[35]]);
                SenderRef::Output(EventRef::new(txid, vout))
            }
            len => return Err(CodecError::Malformed(format!("sender_ref is {len} bytes"))),
        };

        let leaf = Hash::from_bytes(reader.read_exact(HASH_LEN, "leaf")?)?;

        let proof_count = reader.read_num("proof count")?;
        let mut proof = Vec::with_capacity(bounded_capacity(proof_count, input_len));
        for _ in 0..proof_count {
            proof.push(Hash::from_bytes(reader.read_exact(HASH_LEN, "proof")?)?);
        }

        Ok(Self {
            preimage: BridgeLeafPreimage {
                dest_addr,
                fractions,
                section_index,
                nonce,
                sender_ref,
            },
            leaf,
            proof,
        })
    }

    /// Decode an instruction and check it is canonical.
    ///
    /// Fails with [`CodecError::ReplayMismatch`] when the bytes after the
    /// `dest_addr` push do not parse, when re-encoding the parsed fields does
    /// not reproduce `raw` byte for byte (trailing data, non-minimal pushes),
    /// or when the fields do not hash to the carried leaf.
    pub fn decode_and_validate(raw: &[u8]) -> Result<Self, CodecError> {
        let instruction = Self::parse(raw)?;
        if instruction.encode() != raw {
            return Err(CodecError::ReplayMismatch);
        }
        if instruction.preimage.leaf_hash() != instruction.leaf {
            return Err(CodecError::ReplayMismatch);
        }
        Ok(instruction)
    }

    /// Check the instruction against a bridge and its published roots.
    ///
    /// Fails with [`CodecError::LeafMismatch`] when the bridge's leaf codec
    /// does not produce the carried leaf. Returns the root the proof
    /// resolves to.
    pub fn validate_against(
        &self,
        bridge: &BridgeConfig,
        published_roots: &[Hash],
    ) -> Result<Hash, CodecError> {
        if bridge.encode_leaf(&self.preimage)? != self.leaf {
            return Err(CodecError::LeafMismatch);
        }
        let root = compute_root(&self.leaf, &self.proof)?;
        if !published_roots.contains(&root) {
            return Err(CodecError::UnknownRoot(root));
        }
        Ok(root)
    }
}

/// Decode and validate a raw instruction
pub fn decode_and_validate(raw: &[u8]) -> Result<RedemptionInstruction, CodecError> {
    RedemptionInstruction::decode_and_validate(raw)
}

fn read_address(reader: &mut Reader<'_>, field: &str) -> Result<Address, CodecError> {
    address_from(reader.read_exact(ADDRESS_LEN, field)?)
}

fn address_from(bytes: &[u8]) -> Result<Address, CodecError> {
    let raw: [u8; ADDRESS_LEN] = bytes
        .try_into()
        .map_err(|_| CodecError::Malformed(format!("address is {} bytes", bytes.len())))?;
    Ok(Address::from(raw))
}

/// Every element takes at least one byte, so counts beyond the input length
/// are bogus and must not drive allocation.
fn bounded_capacity(count: u64, input_len: usize) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX).min(input_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pegbridge_accumulator::{Tree, pair_hash};

    fn bridge() -> BridgeConfig {
        BridgeConfig {
            name: "eth".into(),
            hash: Hash::new([1; 32]),
            peg_steps: 3,
            micro_steps: 2,
        }
    }

    fn sample(sender_ref: SenderRef) -> RedemptionInstruction {
        let preimage = BridgeLeafPreimage {
            dest_addr: Address::from([0xde; 20]),
            fractions: vec![0, 16, 17, 200, 1 << 40],
            section_index: 2,
            nonce: 129,
            sender_ref,
        };
        let leaf = preimage.leaf_hash();
        RedemptionInstruction {
            preimage,
            leaf,
            proof: vec![Hash::new([0x10; 32]), Hash::new([0xf0; 32])],
        }
    }

    #[test]
    fn test_round_trip() {
        for sender in [
            SenderRef::Address(Address::from([0x5a; 20])),
            SenderRef::Output(EventRef::new(Hash::new([0x77; 32]), 70_000)),
        ] {
            let instruction = sample(sender);
            let raw = instruction.encode();
            assert_eq!(decode_and_validate(&raw).unwrap(), instruction);
        }
    }

    #[test]
    fn test_layout_prefix() {
        let raw = sample(SenderRef::Address(Address::from([0x5a; 20]))).encode();
        assert_eq!(raw[0], 20);
        assert_eq!(&raw[1..21], &[0xde; 20]);
        // count 5, then 0 and 16 as opcodes, 17 as a one byte push
        assert_eq!(&raw[21..26], &[0x55, 0x00, 0x60, 0x01, 17]);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = sample(SenderRef::Address(Address::from([0x5a; 20]))).encode();
        raw.push(0x00);
        assert!(matches!(decode_and_validate(&raw), Err(CodecError::ReplayMismatch)));
    }

    #[test]
    fn test_non_minimal_number_rejected() {
        let instruction = sample(SenderRef::Address(Address::from([0x5a; 20])));
        let raw = instruction.encode();
        // fraction count 5 re-encoded as a one byte push instead of OP_5
        let mut tampered = raw[..21].to_vec();
        tampered.extend_from_slice(&[0x01, 0x05]);
        tampered.extend_from_slice(&raw[22..]);
        assert!(matches!(decode_and_validate(&tampered), Err(CodecError::ReplayMismatch)));
    }

    #[test]
    fn test_every_single_byte_tamper_rejected() {
        for sender in [
            SenderRef::Address(Address::from([0x5a; 20])),
            SenderRef::Output(EventRef::new(Hash::new([0x77; 32]), 70_000)),
        ] {
            let instruction = sample(sender);
            let raw = instruction.encode();
            // everything after the dest_addr prefix up to the end of the leaf;
            // proof bytes are checked against published roots instead
            let sections_end = raw.len() - 1 - instruction.proof.len() * (HASH_LEN + 1);
            for offset in 1..sections_end {
                for mask in [0x01u8, 0x80, 0xff] {
                    let mut tampered = raw.clone();
                    tampered[offset] ^= mask;
                    assert!(
                        matches!(decode_and_validate(&tampered), Err(CodecError::ReplayMismatch)),
                        "offset {offset} mask {mask:#04x}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_truncated_body_rejected() {
        let raw = sample(SenderRef::Address(Address::from([0x5a; 20]))).encode();
        for len in 21..raw.len() {
            assert!(
                matches!(decode_and_validate(&raw[..len]), Err(CodecError::ReplayMismatch)),
                "len {len}"
            );
        }
    }

    #[test]
    fn test_bad_sender_length() {
        let instruction = sample(SenderRef::Address(Address::from([0x5a; 20])));
        let p = &instruction.preimage;
        let mut raw = Vec::new();
        push_data(&mut raw, p.dest_addr.as_slice());
        push_num(&mut raw, 0);
        push_num(&mut raw, 0);
        push_num(&mut raw, 0);
        push_data(&mut raw, &[1, 2, 3]);
        assert!(matches!(decode_and_validate(&raw), Err(CodecError::ReplayMismatch)));
    }

    #[test]
    fn test_unrecognised_frame_is_malformed() {
        assert!(matches!(decode_and_validate(&[]), Err(CodecError::Malformed(_))));

        let mut raw = sample(SenderRef::Address(Address::from([0x5a; 20]))).encode();
        raw[0] = 19;
        assert!(matches!(decode_and_validate(&raw), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_validate_against_published_root() {
        let mut instruction = sample(SenderRef::Address(Address::from([0x5a; 20])));
        let other = Hash::new([0x42; 32]);
        let mut tree = Tree::with_leaves([instruction.leaf, other]);
        let root = tree.root().unwrap();
        instruction.proof = tree.path(0).unwrap().siblings();

        assert_eq!(instruction.validate_against(&bridge(), &[root]).unwrap(), root);
        assert_eq!(root, pair_hash(&instruction.leaf, &other).out);

        assert!(matches!(
            instruction.validate_against(&bridge(), &[other]),
            Err(CodecError::UnknownRoot(r)) if r == root
        ));

        let mut altered = instruction.clone();
        altered.preimage.nonce += 1;
        assert!(matches!(
            altered.validate_against(&bridge(), &[root]),
            Err(CodecError::LeafMismatch)
        ));

        let narrow = BridgeConfig {
            micro_steps: 1,
            ..bridge()
        };
        assert!(matches!(
            instruction.validate_against(&narrow, &[root]),
            Err(CodecError::SectionCount { .. })
        ));
    }

    #[test]
    fn test_validate_against_detects_duplicate_branch() {
        let mut instruction = sample(SenderRef::Address(Address::from([0x5a; 20])));
        instruction.proof = vec![instruction.leaf];
        assert!(matches!(
            instruction.validate_against(&bridge(), &[]),
            Err(CodecError::Accumulator(_))
        ));
    }
}
