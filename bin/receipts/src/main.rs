//! Receipts binary
//!
//! ```text
//! receipts build --cycle <json> [--config <json>] [--out <json>]
//! receipts verify --bridge <hash> --root <hash> --instruction <hex> [--config <json>]
//! ```
//!
//! Without `--config` the bridge configuration comes from `PEG_BRIDGE_CONFIG`.

use std::{collections::BTreeMap, env, fs};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use pegbridge_accumulator::Hash;
use pegbridge_core::{
    BridgeNonces, BurnEvent, Config, CycleContext, CycleReceipts, ReceiptBuilder, WriteBatch,
    decode_and_validate,
};

/// Input of `receipts build`
#[derive(Debug, Deserialize)]
struct CycleInput {
    context: CycleContext,
    events: Vec<BurnEvent>,
    #[serde(default)]
    nonces: BridgeNonces,
}

/// Output of `receipts build`
#[derive(Debug, Serialize)]
struct CycleOutput {
    cycle_hash: Hash,
    roots: BTreeMap<Hash, String>,
    next_nonces: BridgeNonces,
    batch: WriteBatch,
}

impl From<&CycleReceipts> for CycleOutput {
    fn from(receipts: &CycleReceipts) -> Self {
        Self {
            cycle_hash: receipts.cycle_hash,
            roots: receipts
                .bridges
                .iter()
                .map(|(bridge, cycle)| (*bridge, cycle.root_record().to_string()))
                .collect(),
            next_nonces: receipts.next_nonces.clone(),
            batch: receipts.write_batch(),
        }
    }
}

/// `--name value` pairs following the command
#[derive(Debug)]
struct Flags {
    values: BTreeMap<String, String>,
}

impl Flags {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut args = args;
        while let Some(flag) = args.next() {
            let name = flag
                .strip_prefix("--")
                .ok_or_else(|| anyhow!("unexpected argument {flag}"))?
                .to_string();
            let value = args.next().ok_or_else(|| anyhow!("missing value for --{name}"))?;
            values.insert(name, value);
        }
        Ok(Self { values })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| anyhow!("missing --{name}"))
    }

    fn config(&self) -> Result<Config> {
        let config = match self.get("config") {
            Some(path) => Config::from_file(path)?,
            None => Config::from_env()?,
        };
        Ok(config)
    }
}

fn build(flags: &Flags) -> Result<()> {
    let config = flags.config()?;
    let path = flags.require("cycle")?;
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let input: CycleInput =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {path}"))?;

    let receipts =
        ReceiptBuilder::new(&config).build(&input.context, &input.events, &input.nonces)?;
    for (bridge, cycle) in &receipts.bridges {
        info!(
            %bridge,
            root = %cycle.root,
            section = cycle.section,
            leaves = cycle.receipts.len(),
            "cycle root"
        );
    }

    let output = serde_json::to_string_pretty(&CycleOutput::from(&receipts))?;
    match flags.get("out") {
        Some(out) => {
            fs::write(out, output).with_context(|| format!("failed to write {out}"))?;
            info!(path = out, "wrote cycle batch");
        }
        None => println!("{output}"),
    }
    Ok(())
}

fn verify(flags: &Flags) -> Result<()> {
    let config = flags.config()?;
    let bridge_hash: Hash = flags.require("bridge")?.parse()?;
    let bridge = config
        .bridge(&bridge_hash)
        .ok_or_else(|| anyhow!("unknown bridge {bridge_hash}"))?;
    let roots = flags
        .require("root")?
        .split(',')
        .map(Hash::from_hex_prefixed)
        .collect::<Result<Vec<_>, _>>()?;

    let raw = flags.require("instruction")?;
    let raw =
        hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).context("instruction is not hex")?;

    let instruction = decode_and_validate(&raw)?;
    let root = instruction.validate_against(bridge, &roots)?;
    info!(
        bridge = %bridge.name,
        %root,
        nonce = instruction.preimage.nonce,
        dest = %instruction.preimage.dest_addr,
        "redemption instruction is valid"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next().unwrap_or_default();
    let flags = Flags::parse(args)?;

    match command.as_str() {
        "build" => build(&flags),
        "verify" => verify(&flags),
        other => bail!("unknown command {other:?}, expected build or verify"),
    }
}
