//! Configuration

use std::{collections::BTreeSet, env, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{BlockNumber, Hash},
};

/// Highest peg supply index the chain can reach
pub const PEG_MAX_SUPPLY_INDEX: u32 = 1198;

/// Default bridge cycle length in blocks
pub const DEFAULT_CYCLE_LENGTH: u64 = 2000;

/// Per-bridge settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Human readable name
    pub name: String,
    /// Bridge identifier
    pub hash: Hash,
    /// Number of peg steps values are split across
    pub peg_steps: u32,
    /// Number of micro steps following the peg steps
    pub micro_steps: u32,
}

impl BridgeConfig {
    /// Section values a leaf must carry
    pub const fn fraction_count(&self) -> usize {
        self.peg_steps as usize + self.micro_steps as usize
    }

    /// Peg step a burn falls in: `floor(index * peg_steps / max_index)`.
    ///
    /// Indexes above `max_index` are clamped to it, so the result lies in
    /// `0..=peg_steps`. A fully drawn peg yields `peg_steps` itself.
    pub fn section_for(&self, peg_supply_index: u32, max_index: u32) -> u32 {
        if max_index == 0 {
            return 0;
        }
        let index = u64::from(peg_supply_index.min(max_index));
        // index <= max_index, so the quotient is at most peg_steps
        (index * u64::from(self.peg_steps) / u64::from(max_index)) as u32
    }
}

/// Bridge accounting configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Highest peg supply index
    pub peg_max_supply_index: u32,
    /// Blocks per bridge cycle
    pub cycle_length: u64,
    /// Known bridges
    pub bridges: Vec<BridgeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peg_max_supply_index: PEG_MAX_SUPPLY_INDEX,
            cycle_length: DEFAULT_CYCLE_LENGTH,
            bridges: Vec::new(),
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables.
    ///
    /// `PEG_BRIDGE_CONFIG` names a JSON file; `PEG_MAX_SUPPLY_INDEX` and
    /// `BRIDGE_CYCLE_LENGTH` override its values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("PEG_BRIDGE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        config.peg_max_supply_index = env::var("PEG_MAX_SUPPLY_INDEX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.peg_max_supply_index);
        config.cycle_length = env::var("BRIDGE_CYCLE_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.cycle_length);

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the receipt builder relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peg_max_supply_index == 0 {
            return Err(ConfigError::Invalid("peg_max_supply_index must be positive".into()));
        }
        if self.cycle_length == 0 {
            return Err(ConfigError::Invalid("cycle_length must be positive".into()));
        }
        let mut seen = BTreeSet::new();
        for bridge in &self.bridges {
            if bridge.peg_steps == 0 {
                let reason = format!("bridge {} has no peg steps", bridge.name);
                return Err(ConfigError::Invalid(reason));
            }
            if !seen.insert(bridge.hash) {
                return Err(ConfigError::Invalid(format!("duplicate bridge {}", bridge.hash)));
            }
        }
        Ok(())
    }

    /// Look up a bridge by id
    pub fn bridge(&self, hash: &Hash) -> Option<&BridgeConfig> {
        self.bridges.iter().find(|b| b.hash == *hash)
    }

    /// First block of the cycle containing `height`.
    ///
    /// A zero `cycle_length` (rejected by [`Self::validate`]) makes every
    /// height its own cycle start.
    pub const fn cycle_start(&self, height: BlockNumber) -> BlockNumber {
        match height.checked_rem(self.cycle_length) {
            Some(offset) => height - offset,
            None => height,
        }
    }

    /// Half-open block range `[start, end)` of the cycle containing `height`
    pub const fn cycle_range(&self, height: BlockNumber) -> (BlockNumber, BlockNumber) {
        let start = self.cycle_start(height);
        (start, start.saturating_add(self.cycle_length))
    }
}
