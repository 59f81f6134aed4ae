//! The single chokepoint for every inventory quantity change.
//!
//! `apply_change` holds the keyed gate for exactly one read-clamp-commit
//! cycle. It knows nothing about requests or workflows.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{Span, instrument, warn};

use retailerp_inventory::{StockChange, StockKey, apply_floor_clamp};

use crate::inventory_store::{InventoryStore, StockCommit, StoreError};
use crate::keyed_mutex::{InMemoryKeyedMutex, KeyedMutex, LockError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MutationError {
    /// Gate timeouts and stale-read conflicts may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            MutationError::Lock(e) => e.is_timeout(),
            MutationError::Store(StoreError::Conflict { .. }) => true,
            MutationError::Store(StoreError::Storage(_)) => false,
        }
    }
}

/// Object-safe view of the mutator, handed to workflows.
pub trait StockLedger: Send + Sync {
    fn apply_change(&self, change: StockChange) -> Result<i64, MutationError>;
}

impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    fn apply_change(&self, change: StockChange) -> Result<i64, MutationError> {
        (**self).apply_change(change)
    }
}

pub struct LedgerMutator<S, G = InMemoryKeyedMutex<StockKey>> {
    store: S,
    gate: G,
}

impl<S> LedgerMutator<S>
where
    S: InventoryStore,
{
    /// Mutator with an in-process gate using the default timeout.
    pub fn in_process(store: S) -> Self {
        Self::new(store, InMemoryKeyedMutex::default())
    }
}

impl<S, G> LedgerMutator<S, G>
where
    S: InventoryStore,
    G: KeyedMutex<StockKey>,
{
    pub fn new(store: S, gate: G) -> Self {
        Self { store, gate }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply `change.delta` to its key and append the ledger entry.
    ///
    /// Returns the quantity after the change. A decrement past zero is
    /// clamped to zero and still recorded with the requested delta.
    #[instrument(
        skip(self, change),
        fields(key = %change.key, delta = change.delta, kind = %change.kind, quantity_after = tracing::field::Empty),
        err
    )]
    pub fn apply_change(&self, change: StockChange) -> Result<i64, MutationError> {
        let _guard = self.gate.acquire(&change.key)?;

        let current = self.store.quantity(&change.key)?;
        let step = apply_floor_clamp(current, change.delta);
        if step.clamped {
            warn!(
                key = %change.key,
                current,
                delta = change.delta,
                kind = %change.kind,
                reference_id = ?change.reference_id,
                "decrement exceeds stock; quantity clamped to zero"
            );
        }

        let entry = self.store.commit(StockCommit {
            change,
            quantity_before: current,
            quantity_after: step.new_quantity,
            recorded_at: Utc::now(),
        })?;

        Span::current().record("quantity_after", entry.quantity_after);
        Ok(entry.quantity_after)
    }
}

impl<S, G> StockLedger for LedgerMutator<S, G>
where
    S: InventoryStore,
    G: KeyedMutex<StockKey>,
{
    fn apply_change(&self, change: StockChange) -> Result<i64, MutationError> {
        LedgerMutator::apply_change(self, change)
    }
}
