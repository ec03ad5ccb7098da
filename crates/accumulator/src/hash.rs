//! 32-byte digest type

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AccumulatorError;

/// Hash width in bytes
pub const HASH_LEN: usize = 32;

/// Immutable 32-byte digest.
///
/// Ordering is big-endian byte order, the same order the pairing hash and
/// the on-chain verifier sort operands by.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// All-zero hash
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    /// Wrap raw bytes
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 32 bytes long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AccumulatorError> {
        let raw: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            AccumulatorError::Decode(format!("expected {HASH_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }

    /// Read 32 bytes starting at `offset`
    pub fn from_slice_at(buf: &[u8], offset: usize) -> Result<Self, AccumulatorError> {
        let end = offset
            .checked_add(HASH_LEN)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| {
                AccumulatorError::Decode(format!(
                    "buffer of {} bytes too short for hash at offset {offset}",
                    buf.len()
                ))
            })?;
        Self::from_bytes(&buf[offset..end])
    }

    /// Parse exactly 64 hex characters (either case, no prefix)
    pub fn from_hex(s: &str) -> Result<Self, AccumulatorError> {
        if s.len() != HASH_LEN * 2 {
            return Err(AccumulatorError::Decode(format!(
                "expected {} hex characters, got {}",
                HASH_LEN * 2,
                s.len()
            )));
        }
        let mut raw = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut raw)
            .map_err(|e| AccumulatorError::Decode(format!("invalid hex: {e}")))?;
        Ok(Self(raw))
    }

    /// Parse hex with an optional `0x` prefix, as found at the EVM boundary
    pub fn from_hex_prefixed(s: &str) -> Result<Self, AccumulatorError> {
        Self::from_hex(s.strip_prefix("0x").unwrap_or(s))
    }

    /// Hex of the first `num_bytes` bytes (clamped to 32)
    pub fn to_hex(&self, num_bytes: usize, lower_case: bool) -> String {
        let bytes = &self.0[..num_bytes.min(HASH_LEN)];
        if lower_case {
            hex::encode(bytes)
        } else {
            hex::encode_upper(bytes)
        }
    }

    /// Full lowercase hex with a `0x` prefix
    pub fn to_evm_hex(&self) -> String {
        format!("0x{}", self.to_hex(HASH_LEN, true))
    }

    /// Raw bytes
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Consume into raw bytes
    pub const fn into_bytes(self) -> [u8; HASH_LEN] {
        self.0
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LEN] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex(HASH_LEN, true))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = AccumulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex_prefixed(&s).map_err(serde::de::Error::custom)
    }
}
