use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::instrument;
use uuid::Uuid;

use retailerp_inventory::{InventoryRecord, LedgerEntry, StockKey};

use super::{InventoryStore, LedgerFilter, StockCommit, StoreError};

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<StockKey, InventoryRecord>,
    ledger: Vec<LedgerEntry>,
}

/// In-memory inventory store for tests, dev and single-node runs.
///
/// One lock covers records and ledger, so a commit is all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("inventory store lock poisoned".to_string())
}

impl InventoryStore for InMemoryInventoryStore {
    fn quantity(&self, key: &StockKey) -> Result<i64, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.get(key).map(|r| r.quantity).unwrap_or(0))
    }

    #[instrument(skip(self, commit), fields(key = %commit.change.key), err)]
    fn commit(&self, commit: StockCommit) -> Result<LedgerEntry, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let key = commit.change.key;

        let found = state.records.get(&key).map(|r| r.quantity).unwrap_or(0);
        if found != commit.quantity_before {
            return Err(StoreError::Conflict {
                key,
                expected: commit.quantity_before,
                found,
            });
        }
        if commit.quantity_after < 0 {
            return Err(StoreError::Storage(format!(
                "refusing negative quantity {} for {key}",
                commit.quantity_after
            )));
        }

        let sequence = state.ledger.last().map(|e| e.sequence).unwrap_or(0) + 1;
        let change = commit.change;
        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            sequence,
            kind: change.kind,
            reference_id: change.reference_id,
            location_id: key.location_id,
            item_variant_id: key.item_variant_id,
            quantity_delta: change.delta,
            quantity_after: commit.quantity_after,
            actor: change.actor,
            memo: change.memo,
            recorded_at: commit.recorded_at,
        };

        state.records.insert(
            key,
            InventoryRecord {
                key,
                quantity: commit.quantity_after,
                updated_at: commit.recorded_at,
            },
        );
        state.ledger.push(entry.clone());

        Ok(entry)
    }

    fn record(&self, key: &StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.get(key).cloned())
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.values().cloned().collect())
    }

    fn ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let matching = state.ledger.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
