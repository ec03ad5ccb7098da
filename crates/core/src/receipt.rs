//! Bridge cycle receipt construction

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pegbridge_accumulator::Tree;

use crate::{
    config::{BridgeConfig, Config},
    error::ReceiptError,
    instruction::RedemptionInstruction,
    leaf::BridgeLeafPreimage,
    record::{LeafRecord, RootRecord},
    store::{ReceiptStore, StoreKey, StoreValue, WriteBatch},
    types::{BlockNumber, BurnEvent, EventRef, Hash},
};

/// Next nonce to assign, per bridge
pub type BridgeNonces = BTreeMap<Hash, u64>;

/// Chain state a cycle is built against
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleContext {
    /// Cycle identifier
    pub cycle_hash: Hash,
    /// First block of the cycle
    pub start_height: BlockNumber,
    /// One past the last block of the cycle
    pub end_height: BlockNumber,
    /// Peg supply index at the close of the cycle. Burns carry no peg state
    /// of their own, so this stands in for the burn-time peg state.
    pub peg_supply_index: u32,
}

impl CycleContext {
    /// `true` if `height` lies in `[start_height, end_height)`
    pub const fn contains(&self, height: BlockNumber) -> bool {
        height >= self.start_height && height < self.end_height
    }
}

/// Everything needed to redeem one burned output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCycleReceipt {
    /// Burned output
    pub event: EventRef,
    /// Leaf the burn was committed as
    pub leaf: Hash,
    /// Cycle root for the bridge
    pub root: Hash,
    /// Peg step of the cycle
    pub section: u32,
    /// Sibling hashes from the leaf upward
    pub proof: Vec<Hash>,
    /// Fields behind `leaf`
    pub preimage: BridgeLeafPreimage,
}

impl BridgeCycleReceipt {
    /// Text record persisted for this receipt
    pub fn record(&self) -> LeafRecord {
        LeafRecord {
            event: self.event,
            dest_addr: self.preimage.dest_addr,
            values: self.preimage.fractions.clone(),
            proof: self.proof.clone(),
        }
    }

    /// Redemption instruction proving this receipt
    pub fn instruction(&self) -> RedemptionInstruction {
        RedemptionInstruction {
            preimage: self.preimage.clone(),
            leaf: self.leaf,
            proof: self.proof.clone(),
        }
    }
}

/// One bridge's accumulator output for a cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCycle {
    /// Bridge identifier
    pub bridge: Hash,
    /// Published root
    pub root: Hash,
    /// Peg step of the cycle
    pub section: u32,
    /// Receipts keyed by burned output
    pub receipts: BTreeMap<EventRef, BridgeCycleReceipt>,
}

impl BridgeCycle {
    /// `root:section` record
    pub const fn root_record(&self) -> RootRecord {
        RootRecord {
            root: self.root,
            section: self.section,
        }
    }
}

/// Receipts of every bridge active in a cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReceipts {
    /// Cycle identifier
    pub cycle_hash: Hash,
    /// Active bridges
    pub bridges: BTreeMap<Hash, BridgeCycle>,
    /// Nonce counters after this cycle
    pub next_nonces: BridgeNonces,
}

impl CycleReceipts {
    /// Find the receipt for a burned output
    pub fn receipt(&self, event: &EventRef) -> Option<&BridgeCycleReceipt> {
        self.bridges.values().find_map(|cycle| cycle.receipts.get(event))
    }

    /// Every key/value write for this cycle
    pub fn write_batch(&self) -> WriteBatch {
        let cycle = self.cycle_hash;
        let mut batch = WriteBatch::default();

        let active = self.bridges.keys().map(ToString::to_string).collect();
        batch.put(StoreKey::CycleBridges(cycle), StoreValue::Set(active));

        for (bridge, bridge_cycle) in &self.bridges {
            let bridge = *bridge;
            batch.put(
                StoreKey::BridgeRoot { cycle, bridge },
                StoreValue::Text(bridge_cycle.root_record().to_string()),
            );
            let records: BTreeSet<String> =
                bridge_cycle.receipts.values().map(|r| r.record().to_string()).collect();
            batch.put(StoreKey::BridgeLeaves { cycle, bridge }, StoreValue::Set(records));
        }
        batch
    }

    /// Write the whole cycle in a single batch
    pub fn persist<S: ReceiptStore>(&self, store: &mut S) -> Result<(), ReceiptError> {
        let batch = self.write_batch();
        info!(
            cycle = %self.cycle_hash,
            writes = batch.len(),
            "persisting cycle receipts"
        );
        store.write_batch(batch)?;
        Ok(())
    }
}

/// Read back the published root of a bridge cycle
pub fn load_published_root<S: ReceiptStore>(
    store: &S,
    cycle: Hash,
    bridge: Hash,
) -> Result<Option<RootRecord>, ReceiptError> {
    match store.get(&StoreKey::BridgeRoot { cycle, bridge })? {
        Some(StoreValue::Text(text)) => Ok(Some(text.parse()?)),
        _ => Ok(None),
    }
}

/// Read back the leaf records of a bridge cycle
pub fn load_leaf_records<S: ReceiptStore>(
    store: &S,
    cycle: Hash,
    bridge: Hash,
) -> Result<Vec<LeafRecord>, ReceiptError> {
    match store.get(&StoreKey::BridgeLeaves { cycle, bridge })? {
        Some(StoreValue::Set(records)) => {
            Ok(records.iter().map(|r| r.parse()).collect::<Result<Vec<LeafRecord>, _>>()?)
        }
        _ => Ok(Vec::new()),
    }
}

/// Builds per-bridge accumulators for a cycle
#[derive(Debug)]
pub struct ReceiptBuilder<'a> {
    config: &'a Config,
}

impl<'a> ReceiptBuilder<'a> {
    /// Create a builder over the given bridge configuration
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build receipts for every bridge with burns in the cycle.
    ///
    /// Leaves go into each bridge's tree in ascending hash order, so the
    /// result does not depend on the order events were discovered in. Any
    /// failure aborts the whole cycle.
    pub fn build(
        &self,
        ctx: &CycleContext,
        events: &[BurnEvent],
        nonces: &BridgeNonces,
    ) -> Result<CycleReceipts, ReceiptError> {
        info!(
            cycle = %ctx.cycle_hash,
            start = ctx.start_height,
            end = ctx.end_height,
            events = events.len(),
            "building bridge cycle receipts"
        );

        let mut seen = BTreeSet::new();
        let mut by_bridge: BTreeMap<Hash, Vec<&BurnEvent>> = BTreeMap::new();
        for event in events {
            if !ctx.contains(event.height) {
                debug!(
                    event = %event.event_ref(),
                    height = event.height,
                    "burn outside cycle range"
                );
                continue;
            }
            if self.config.bridge(&event.bridge).is_none() {
                warn!(
                    event = %event.event_ref(),
                    bridge = %event.bridge,
                    "burn for unknown bridge"
                );
                continue;
            }
            if !seen.insert(event.event_ref()) {
                return Err(ReceiptError::DuplicateEvent(event.event_ref()));
            }
            by_bridge.entry(event.bridge).or_default().push(event);
        }

        let mut next_nonces = nonces.clone();
        let mut bridges = BTreeMap::new();
        for (hash, bridge_events) in by_bridge {
            let Some(bridge) = self.config.bridge(&hash) else {
                continue;
            };
            let next_nonce = next_nonces.entry(hash).or_insert(0);
            let cycle = self.build_bridge(ctx, bridge, bridge_events, next_nonce)?;
            bridges.insert(hash, cycle);
        }

        Ok(CycleReceipts {
            cycle_hash: ctx.cycle_hash,
            bridges,
            next_nonces,
        })
    }

    fn build_bridge(
        &self,
        ctx: &CycleContext,
        bridge: &BridgeConfig,
        mut events: Vec<&BurnEvent>,
        next_nonce: &mut u64,
    ) -> Result<BridgeCycle, ReceiptError> {
        let section = bridge.section_for(ctx.peg_supply_index, self.config.peg_max_supply_index);

        // nonces follow chain order, leaves follow hash order
        events.sort_by_key(|e| (e.height, e.tx_index, e.vout));
        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            let preimage = BridgeLeafPreimage {
                dest_addr: event.dest_addr,
                fractions: event.fractions.clone(),
                section_index: section,
                nonce: *next_nonce,
                sender_ref: event.sender_ref,
            };
            *next_nonce = next_nonce
                .checked_add(1)
                .ok_or(ReceiptError::NonceOverflow(bridge.hash))?;
            let leaf = bridge.encode_leaf(&preimage)?;
            entries.push((leaf, event.event_ref(), preimage));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ReceiptError::DuplicateLeaf(pair[0].0));
        }

        let mut tree = Tree::with_leaves(entries.iter().map(|(leaf, _, _)| *leaf));
        let root = tree.root()?;

        let mut receipts = BTreeMap::new();
        for (index, (leaf, event, preimage)) in entries.into_iter().enumerate() {
            let path = tree.path(index as u64)?;
            let receipt = BridgeCycleReceipt {
                event,
                leaf,
                root,
                section,
                proof: path.siblings(),
                preimage,
            };
            receipts.insert(event, receipt);
        }

        info!(
            bridge = %bridge.name,
            leaves = receipts.len(),
            %root,
            section,
            "bridge cycle root"
        );

        Ok(BridgeCycle {
            bridge: bridge.hash,
            root,
            section,
            receipts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CodecError,
        store::MemoryStore,
        types::{Address, SenderRef},
    };
    use pegbridge_accumulator::compute_root;

    fn bridge_hash() -> Hash {
        Hash::new([0xb1; 32])
    }

    fn config() -> Config {
        Config {
            bridges: vec![BridgeConfig {
                name: "eth".into(),
                hash: bridge_hash(),
                peg_steps: 4,
                micro_steps: 2,
            }],
            ..Config::default()
        }
    }

    fn ctx() -> CycleContext {
        CycleContext {
            cycle_hash: Hash::new([0xc0; 32]),
            start_height: 1000,
            end_height: 2000,
            peg_supply_index: 600,
        }
    }

    fn event(seed: u8, height: u64) -> BurnEvent {
        BurnEvent {
            txid: Hash::new([seed; 32]),
            vout: 0,
            height,
            tx_index: 1,
            bridge: bridge_hash(),
            dest_addr: Address::from([seed; 20]),
            fractions: vec![u64::from(seed), 0, 1, 2, 3, 4],
            sender_ref: SenderRef::Output(EventRef::new(Hash::new([seed; 32]), 1)),
        }
    }

    #[test]
    fn test_build_and_verify() {
        let config = config();
        let events: Vec<_> = (1..=5).map(|i| event(i, 1000 + u64::from(i))).collect();
        let receipts = ReceiptBuilder::new(&config)
            .build(&ctx(), &events, &BridgeNonces::new())
            .unwrap();

        let cycle = &receipts.bridges[&bridge_hash()];
        assert_eq!(cycle.receipts.len(), 5);
        assert_eq!(cycle.section, 2);
        assert_eq!(receipts.next_nonces[&bridge_hash()], 5);

        for receipt in cycle.receipts.values() {
            assert_eq!(compute_root(&receipt.leaf, &receipt.proof).unwrap(), cycle.root);
            assert_eq!(receipt.leaf, receipt.preimage.leaf_hash());
        }

        // nonces follow block order
        let first = receipts.receipt(&EventRef::new(Hash::new([1; 32]), 0)).unwrap();
        let last = receipts.receipt(&EventRef::new(Hash::new([5; 32]), 0)).unwrap();
        assert_eq!(first.preimage.nonce, 0);
        assert_eq!(last.preimage.nonce, 4);
    }

    #[test]
    fn test_discovery_order_does_not_matter() {
        let config = config();
        let events: Vec<_> = (1..=9).map(|i| event(i, 1500)).collect();
        let mut reversed = events.clone();
        reversed.reverse();

        let builder = ReceiptBuilder::new(&config);
        let nonces = BridgeNonces::from([(bridge_hash(), 40)]);
        let a = builder.build(&ctx(), &events, &nonces).unwrap();
        let b = builder.build(&ctx(), &reversed, &nonces).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.next_nonces[&bridge_hash()], 49);
    }

    #[test]
    fn test_skips_foreign_and_out_of_range_events() {
        let config = config();
        let mut foreign = event(3, 1500);
        foreign.bridge = Hash::new([0xff; 32]);
        let events = vec![event(1, 999), event(2, 2000), foreign];

        let receipts = ReceiptBuilder::new(&config)
            .build(&ctx(), &events, &BridgeNonces::new())
            .unwrap();
        assert!(receipts.bridges.is_empty());
        assert!(receipts.next_nonces.is_empty());
    }

    #[test]
    fn test_bad_event_aborts_cycle() {
        let config = config();
        let mut bad = event(2, 1500);
        bad.fractions.pop();
        let events = vec![event(1, 1500), bad];

        let err = ReceiptBuilder::new(&config)
            .build(&ctx(), &events, &BridgeNonces::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ReceiptError::Codec(CodecError::SectionCount {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_duplicate_event_rejected() {
        let config = config();
        let events = vec![event(1, 1500), event(1, 1501)];
        let err = ReceiptBuilder::new(&config)
            .build(&ctx(), &events, &BridgeNonces::new())
            .unwrap_err();
        assert!(matches!(err, ReceiptError::DuplicateEvent(_)));
    }

    #[test]
    fn test_persist_and_load() {
        let config = config();
        let events: Vec<_> = (1..=3).map(|i| event(i, 1200)).collect();
        let receipts = ReceiptBuilder::new(&config)
            .build(&ctx(), &events, &BridgeNonces::new())
            .unwrap();

        let mut store = MemoryStore::new();
        receipts.persist(&mut store).unwrap();
        assert_eq!(store.len(), 3);

        let cycle = &receipts.bridges[&bridge_hash()];
        let root = load_published_root(&store, ctx().cycle_hash, bridge_hash()).unwrap().unwrap();
        assert_eq!(root, cycle.root_record());

        let records = load_leaf_records(&store, ctx().cycle_hash, bridge_hash()).unwrap();
        assert_eq!(records.len(), 3);
        for record in records {
            let receipt = &cycle.receipts[&record.event];
            assert_eq!(record, receipt.record());
        }

        let bridges = store.get(&StoreKey::CycleBridges(ctx().cycle_hash)).unwrap();
        assert_eq!(
            bridges,
            Some(StoreValue::Set(BTreeSet::from([bridge_hash().to_string()])))
        );
    }
}
