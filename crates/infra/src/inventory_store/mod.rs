//! Inventory store: the quantity projection plus the append-only ledger.
//!
//! Records and ledger entries are written together in one commit. The store
//! is injected as a trait object; nothing outside the ledger mutator writes
//! through it.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use retailerp_core::{AggregateId, ItemVariantId, LocationId};
use retailerp_inventory::{InventoryRecord, LedgerEntry, StockChange, StockKey, TransactionKind};

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record changed between the read and the commit.
    #[error("stale read on {key}: expected quantity {expected}, found {found}")]
    Conflict {
        key: StockKey,
        expected: i64,
        found: i64,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

/// One record upsert plus its ledger entry, committed atomically.
///
/// `quantity_before` is the value the mutator read under the gate; the store
/// rejects the commit if the record no longer holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCommit {
    pub change: StockChange,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Ledger read filter. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub location_id: Option<LocationId>,
    pub item_variant_id: Option<ItemVariantId>,
    pub reference_id: Option<AggregateId>,
    pub kind: Option<TransactionKind>,
    /// Only entries with a sequence strictly greater than this.
    pub after_sequence: Option<u64>,
    pub limit: Option<usize>,
}

impl LedgerFilter {
    pub fn for_key(key: StockKey) -> Self {
        Self {
            location_id: Some(key.location_id),
            item_variant_id: Some(key.item_variant_id),
            ..Self::default()
        }
    }

    pub fn for_reference(reference_id: AggregateId) -> Self {
        Self {
            reference_id: Some(reference_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.location_id.is_none_or(|l| l == entry.location_id)
            && self.item_variant_id.is_none_or(|i| i == entry.item_variant_id)
            && self.reference_id.is_none_or(|r| Some(r) == entry.reference_id)
            && self.kind.is_none_or(|k| k == entry.kind)
            && self.after_sequence.is_none_or(|s| entry.sequence > s)
    }
}

/// Durable per-key quantities and the ledger behind them.
pub trait InventoryStore: Send + Sync {
    /// Current quantity for `key`; 0 when no record exists yet.
    fn quantity(&self, key: &StockKey) -> Result<i64, StoreError>;

    /// Upsert the record and append the ledger entry, or do neither.
    fn commit(&self, commit: StockCommit) -> Result<LedgerEntry, StoreError>;

    fn record(&self, key: &StockKey) -> Result<Option<InventoryRecord>, StoreError>;

    fn records(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Ledger entries in sequence order.
    fn ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn quantity(&self, key: &StockKey) -> Result<i64, StoreError> {
        (**self).quantity(key)
    }

    fn commit(&self, commit: StockCommit) -> Result<LedgerEntry, StoreError> {
        (**self).commit(commit)
    }

    fn record(&self, key: &StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).record(key)
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).records()
    }

    fn ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).ledger(filter)
    }
}
