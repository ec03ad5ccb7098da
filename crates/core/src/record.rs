//! Colon-delimited text records persisted per bridge cycle.
//!
//! `root:section` for the cycle root, and
//! `txhash:output:dest_addr:N:v1..vN:M:h1..hM` for each burned output.
//! Hashes and addresses are lowercase hex without a `0x` prefix.

use std::{fmt, str::FromStr};

use crate::{
    error::RecordError,
    types::{Address, EventRef, Hash},
};

/// Cycle root and the section it was built at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootRecord {
    /// Published root
    pub root: Hash,
    /// Peg step of the cycle
    pub section: u32,
}

impl fmt::Display for RootRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root, self.section)
    }
}

impl FromStr for RootRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = Fields::new(s);
        let record = Self {
            root: fields.hash("root")?,
            section: fields.parse("section")?,
        };
        fields.finish()?;
        Ok(record)
    }
}

/// Receipt line for one burned output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRecord {
    /// Burned output
    pub event: EventRef,
    /// EVM recipient
    pub dest_addr: Address,
    /// Section values
    pub values: Vec<u64>,
    /// Sibling hashes from the leaf upward
    pub proof: Vec<Hash>,
}

impl fmt::Display for LeafRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.event.txid,
            self.event.vout,
            hex::encode(self.dest_addr.as_slice()),
            self.values.len()
        )?;
        for value in &self.values {
            write!(f, ":{value}")?;
        }
        write!(f, ":{}", self.proof.len())?;
        for hash in &self.proof {
            write!(f, ":{hash}")?;
        }
        Ok(())
    }
}

impl FromStr for LeafRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = Fields::new(s);
        let txid = fields.hash("txhash")?;
        let vout = fields.parse("output")?;

        let raw = fields.next("dest_addr")?;
        let mut addr = [0u8; 20];
        hex::decode_to_slice(raw, &mut addr).map_err(|_| RecordError::InvalidField {
            field: "dest_addr",
            value: raw.to_string(),
        })?;

        let count: usize = fields.parse("value count")?;
        let values = (0..count).map(|_| fields.parse("value")).collect::<Result<Vec<u64>, _>>()?;

        let count: usize = fields.parse("proof count")?;
        let proof = (0..count).map(|_| fields.hash("proof")).collect::<Result<Vec<_>, _>>()?;

        fields.finish()?;
        Ok(Self {
            event: EventRef::new(txid, vout),
            dest_addr: Address::from(addr),
            values,
            proof,
        })
    }
}

struct Fields<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(s: &'a str) -> Self {
        Self { inner: s.split(':') }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, RecordError> {
        self.inner.next().ok_or(RecordError::MissingField(field))
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, RecordError> {
        let raw = self.next(field)?;
        raw.parse().map_err(|_| RecordError::InvalidField {
            field,
            value: raw.to_string(),
        })
    }

    fn hash(&mut self, field: &'static str) -> Result<Hash, RecordError> {
        self.parse(field)
    }

    fn finish(self) -> Result<(), RecordError> {
        match self.inner.count() {
            0 => Ok(()),
            extra => Err(RecordError::TrailingFields(extra)),
        }
    }
}
