//! Positional push encoding used by redemption instructions.
//!
//! Integers 0..=16 are single opcodes. Larger integers are minimal
//! little-endian sign-magnitude numbers pushed as data. Data pushes use the
//! shortest length prefix available.

use crate::error::CodecError;

pub(crate) const OP_0: u8 = 0x00;
pub(crate) const OP_PUSHDATA1: u8 = 0x4c;
pub(crate) const OP_PUSHDATA2: u8 = 0x4d;
pub(crate) const OP_PUSHDATA4: u8 = 0x4e;
pub(crate) const OP_1: u8 = 0x51;
pub(crate) const OP_16: u8 = 0x60;

/// Longest number push: eight value bytes plus a sign byte
const MAX_NUM_LEN: usize = 9;

/// Push `data` with the shortest length prefix
pub(crate) fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => out.push(OP_0),
        len @ 1..=75 => out.push(len as u8),
        len @ 76..=0xff => out.extend_from_slice(&[OP_PUSHDATA1, len as u8]),
        len @ 0x100..=0xffff => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
}

/// Push an unsigned integer in its minimal form
pub(crate) fn push_num(out: &mut Vec<u8>, value: u64) {
    match value {
        0 => out.push(OP_0),
        1..=16 => out.push(OP_1 - 1 + value as u8),
        _ => {
            let mut bytes = value.to_le_bytes().to_vec();
            while bytes.last() == Some(&0) {
                bytes.pop();
            }
            if bytes.last().is_some_and(|b| b & 0x80 != 0) {
                bytes.push(0);
            }
            push_data(out, &bytes);
        }
    }
}

/// One decoded element
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Item<'a> {
    /// `OP_1..=OP_16`
    Small(u8),
    /// Pushed bytes, empty for `OP_0`
    Data(&'a [u8]),
}

/// Sequential reader over an instruction
#[derive(Debug)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) const fn is_finished(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
        let pos = self.pos;
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| CodecError::Malformed(format!("truncated {what} at offset {pos}")))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn next_item(&mut self) -> Result<Item<'a>, CodecError> {
        let opcode = self.take(1, "opcode")?[0];
        let len = match opcode {
            OP_0 => return Ok(Item::Data(&[])),
            OP_1..=OP_16 => return Ok(Item::Small(opcode - OP_1 + 1)),
            1..=75 => opcode as usize,
            OP_PUSHDATA1 => self.take(1, "push length")?[0] as usize,
            OP_PUSHDATA2 => {
                let raw = self.take(2, "push length")?;
                u16::from_le_bytes([raw[0], raw[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let raw = self.take(4, "push length")?;
                u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
            }
            other => return Err(CodecError::Malformed(format!("unexpected opcode {other:#04x}"))),
        };
        self.take(len, "push data").map(Item::Data)
    }

    /// Read a number. Non-minimal encodings are accepted here and caught by
    /// the re-encoding check.
    pub(crate) fn read_num(&mut self, field: &str) -> Result<u64, CodecError> {
        match self.next_item()? {
            Item::Small(value) => Ok(u64::from(value)),
            Item::Data(bytes) if bytes.len() <= MAX_NUM_LEN => {
                let mut value: u128 = 0;
                for (i, byte) in bytes.iter().enumerate() {
                    value |= u128::from(*byte) << (8 * i);
                }
                u64::try_from(value)
                    .map_err(|_| CodecError::Malformed(format!("{field} does not fit in u64")))
            }
            Item::Data(bytes) => {
                Err(CodecError::Malformed(format!("{field} is {} bytes long", bytes.len())))
            }
        }
    }

    /// Read a data push of exactly `len` bytes
    pub(crate) fn read_exact(&mut self, len: usize, field: &str) -> Result<&'a [u8], CodecError> {
        match self.next_item()? {
            Item::Data(bytes) if bytes.len() == len => Ok(bytes),
            Item::Data(bytes) => Err(CodecError::Malformed(format!(
                "{field} is {} bytes, expected {len}",
                bytes.len()
            ))),
            Item::Small(_) => Err(CodecError::Malformed(format!("{field} is not a data push"))),
        }
    }

    /// Read a data push of any length
    pub(crate) fn read_data(&mut self, field: &str) -> Result<&'a [u8], CodecError> {
        match self.next_item()? {
            Item::Data(bytes) => Ok(bytes),
            Item::Small(_) => Err(CodecError::Malformed(format!("{field} is not a data push"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num_bytes(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        push_num(&mut out, value);
        out
    }

    #[test]
    fn test_small_numbers_use_opcodes() {
        assert_eq!(num_bytes(0), vec![OP_0]);
        assert_eq!(num_bytes(1), vec![OP_1]);
        assert_eq!(num_bytes(16), vec![OP_16]);
        assert_eq!(num_bytes(17), vec![1, 17]);
    }

    #[test]
    fn test_sign_byte_added_when_top_bit_set() {
        assert_eq!(num_bytes(0x7f), vec![1, 0x7f]);
        assert_eq!(num_bytes(0x80), vec![2, 0x80, 0x00]);
        assert_eq!(num_bytes(0x1234), vec![2, 0x34, 0x12]);
        assert_eq!(num_bytes(u64::MAX), [vec![9], vec![0xff; 8], vec![0]].concat());
    }

    #[test]
    fn test_read_num_values() {
        for value in [0u64, 1, 16, 17, 0x80, 0xffff, 1 << 40, u64::MAX] {
            let bytes = num_bytes(value);
            let mut reader = Reader::new(&bytes);
            assert_eq!(reader.read_num("n").unwrap(), value);
            assert!(reader.is_finished());
        }
    }

    #[test]
    fn test_read_num_rejects_oversized() {
        let mut out = Vec::new();
        push_data(&mut out, &[0xff; 10]);
        assert!(Reader::new(&out).read_num("n").is_err());

        let mut out = Vec::new();
        push_data(&mut out, &[0xff; 9]);
        assert!(Reader::new(&out).read_num("n").is_err());
    }

    #[test]
    fn test_push_data_prefixes() {
        let mut out = Vec::new();
        push_data(&mut out, &[7u8; 75]);
        assert_eq!(out[0], 75);

        let mut out = Vec::new();
        push_data(&mut out, &[7u8; 76]);
        assert_eq!(&out[..2], &[OP_PUSHDATA1, 76]);

        let mut out = Vec::new();
        push_data(&mut out, &[7u8; 300]);
        assert_eq!(&out[..3], &[OP_PUSHDATA2, 0x2c, 0x01]);
        assert_eq!(Reader::new(&out).read_data("d").unwrap().len(), 300);
    }

    #[test]
    fn test_truncated_push() {
        let bytes = [20u8, 1, 2, 3];
        assert!(matches!(Reader::new(&bytes).read_exact(20, "d"), Err(CodecError::Malformed(_))));
        assert!(Reader::new(&[0x4f]).next_item().is_err());
    }
}
