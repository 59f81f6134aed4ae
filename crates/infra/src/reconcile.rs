//! Ledger reconciliation: replay the ledger and compare it with the records.

use serde::Serialize;
use tracing::{info, instrument, warn};

use retailerp_inventory::{StockKey, rebuild_records, verify_chain};

use crate::inventory_store::{InventoryStore, LedgerFilter, StoreError};

/// A key whose record disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMismatch {
    pub key: StockKey,
    /// Quantity on the record; `None` when the ledger has entries but no record exists.
    pub recorded: Option<i64>,
    /// Quantity derived from the ledger; `None` when a record has no entries.
    pub replayed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreakReport {
    pub key: StockKey,
    pub sequence: u64,
    pub expected: i64,
    pub recorded: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub entries_checked: usize,
    pub keys_checked: usize,
    /// Entries whose `quantity_after` does not follow from the previous one.
    pub chain_breaks: Vec<ChainBreakReport>,
    pub mismatches: Vec<RecordMismatch>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.chain_breaks.is_empty() && self.mismatches.is_empty()
    }
}

/// Replay the whole ledger and check it against the inventory records.
#[instrument(skip(store), err)]
pub fn reconcile(store: &dyn InventoryStore) -> Result<ReconcileReport, StoreError> {
    let entries = store.ledger(&LedgerFilter::default())?;
    let records = store.records()?;

    let chain_breaks: Vec<ChainBreakReport> = verify_chain(&entries)
        .into_iter()
        .map(|b| ChainBreakReport {
            key: b.key,
            sequence: b.sequence,
            expected: b.expected,
            recorded: b.recorded,
        })
        .collect();

    let mut replayed = rebuild_records(&entries);
    let mut mismatches = Vec::new();
    for record in &records {
        let derived = replayed.remove(&record.key);
        if derived.unwrap_or(0) != record.quantity {
            mismatches.push(RecordMismatch {
                key: record.key,
                recorded: Some(record.quantity),
                replayed: derived,
            });
        }
    }
    for (key, quantity) in replayed {
        mismatches.push(RecordMismatch {
            key,
            recorded: None,
            replayed: Some(quantity),
        });
    }

    let report = ReconcileReport {
        entries_checked: entries.len(),
        keys_checked: records.len(),
        chain_breaks,
        mismatches,
    };

    if report.is_consistent() {
        info!(entries = report.entries_checked, keys = report.keys_checked, "ledger reconciled");
    } else {
        warn!(
            chain_breaks = report.chain_breaks.len(),
            mismatches = report.mismatches.len(),
            "ledger and records disagree"
        );
    }
    Ok(report)
}
