use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use retailerp_core::{ActorId, AggregateId, ItemVariantId, LocationId};

use crate::kind::TransactionKind;
use crate::record::{StockKey, apply_floor_clamp};

/// A requested quantity change, as handed to the ledger mutator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub key: StockKey,
    pub delta: i64,
    pub kind: TransactionKind,
    /// Originating request (shipment, restock, plan, sale), if any.
    pub reference_id: Option<AggregateId>,
    pub actor: ActorId,
    pub memo: Option<String>,
}

impl StockChange {
    pub fn new(key: StockKey, delta: i64, kind: TransactionKind, actor: ActorId) -> Self {
        Self {
            key,
            delta,
            kind,
            reference_id: None,
            actor,
            memo: None,
        }
    }

    pub fn with_reference(mut self, reference_id: AggregateId) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// One immutable line of the transaction ledger.
///
/// Append-only: entries are never updated or deleted. `quantity_after` is the
/// record's quantity right after this entry was committed (post floor-clamp),
/// so the chain can be audited even when clamping made the deltas lossy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    /// Store-wide, strictly increasing commit position.
    pub sequence: u64,
    pub kind: TransactionKind,
    pub reference_id: Option<AggregateId>,
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub quantity_delta: i64,
    pub quantity_after: i64,
    pub actor: ActorId,
    pub memo: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.location_id, self.item_variant_id)
    }

    /// True when this entry's delta was (partially) swallowed by the floor.
    pub fn was_clamped(&self, quantity_before: i64) -> bool {
        quantity_before + self.quantity_delta != self.quantity_after
    }
}

/// A ledger entry whose recorded `quantity_after` does not follow from the
/// previous entry of the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub key: StockKey,
    pub sequence: u64,
    pub expected: i64,
    pub recorded: i64,
}

/// Replay the ledger and check every entry against the floor-clamp rule.
///
/// Entries may be interleaved across keys; they are grouped per key and walked
/// in `sequence` order starting from zero.
///
/// One corrupted entry is reported once. The entry after a break is accepted
/// if it follows from either the recorded or the replayed quantity of its
/// predecessor, so a tampered `quantity_after` and a tampered delta both
/// leave the next honest entry unflagged.
pub fn verify_chain<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Vec<ChainBreak> {
    let mut sorted: Vec<&LedgerEntry> = entries.into_iter().collect();
    sorted.sort_by_key(|e| e.sequence);

    // Per key: (recorded, replayed) quantity after the previous entry.
    let mut running: BTreeMap<StockKey, (i64, i64)> = BTreeMap::new();
    let mut breaks = Vec::new();

    for entry in sorted {
        let key = entry.key();
        let (recorded_before, replayed_before) = running.get(&key).copied().unwrap_or((0, 0));
        let expected = apply_floor_clamp(recorded_before, entry.quantity_delta).new_quantity;
        let replayed = apply_floor_clamp(replayed_before, entry.quantity_delta).new_quantity;

        if entry.quantity_after == expected || entry.quantity_after == replayed {
            running.insert(key, (entry.quantity_after, entry.quantity_after));
        } else {
            breaks.push(ChainBreak {
                key,
                sequence: entry.sequence,
                expected,
                recorded: entry.quantity_after,
            });
            running.insert(key, (entry.quantity_after, expected));
        }
    }

    breaks
}

/// Derive the inventory projection from the ledger: the last recorded
/// `quantity_after` per key.
pub fn rebuild_records<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> BTreeMap<StockKey, i64> {
    let mut latest: BTreeMap<StockKey, (u64, i64)> = BTreeMap::new();
    for entry in entries {
        let slot = latest.entry(entry.key()).or_insert((0, 0));
        if entry.sequence >= slot.0 {
            *slot = (entry.sequence, entry.quantity_after);
        }
    }
    latest.into_iter().map(|(k, (_, qty))| (k, qty)).collect()
}
