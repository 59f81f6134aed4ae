//! Postgres-backed inventory store.
//!
//! `commit` runs one transaction: a conditional write of the record (only if
//! it still holds `quantity_before`) followed by the ledger insert. Zero rows
//! touched by the write means another writer got there first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use retailerp_core::{ActorId, AggregateId, ItemVariantId, LocationId};
use retailerp_inventory::{InventoryRecord, LedgerEntry, StockKey, TransactionKind};

use super::{InventoryStore, LedgerFilter, StockCommit, StoreError};
use crate::pg;

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn load_quantity(&self, key: StockKey) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT quantity FROM inventory_records WHERE location_id = $1 AND item_variant_id = $2",
        )
        .bind(key.location_id.as_uuid())
        .bind(key.item_variant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_quantity", e))?;

        match row {
            Some(row) => row
                .try_get::<i64, _>("quantity")
                .map_err(|e| map_sqlx_error("load_quantity", e)),
            None => Ok(0),
        }
    }

    #[instrument(skip(self, commit), fields(key = %commit.change.key), err)]
    pub async fn commit_change(&self, commit: StockCommit) -> Result<LedgerEntry, StoreError> {
        let key = commit.change.key;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // A missing row only matches an expected quantity of zero.
        let upsert = if commit.quantity_before == 0 {
            r#"
            INSERT INTO inventory_records (location_id, item_variant_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (location_id, item_variant_id) DO UPDATE
                SET quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at
                WHERE inventory_records.quantity = $5
            "#
        } else {
            r#"
            UPDATE inventory_records
            SET quantity = $3, updated_at = $4
            WHERE location_id = $1 AND item_variant_id = $2 AND quantity = $5
            "#
        };

        let touched = sqlx::query(upsert)
            .bind(key.location_id.as_uuid())
            .bind(key.item_variant_id.as_uuid())
            .bind(commit.quantity_after)
            .bind(commit.recorded_at)
            .bind(commit.quantity_before)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_record", e))?
            .rows_affected();

        if touched == 0 {
            let found: Option<i64> = sqlx::query_scalar(
                "SELECT quantity FROM inventory_records WHERE location_id = $1 AND item_variant_id = $2",
            )
            .bind(key.location_id.as_uuid())
            .bind(key.item_variant_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("read_conflict", e))?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict {
                key,
                expected: commit.quantity_before,
                found: found.unwrap_or(0),
            });
        }

        let change = commit.change;
        let entry_id = Uuid::now_v7();
        let row = sqlx::query(
            r#"
            INSERT INTO inventory_ledger (
                entry_id, kind, reference_id, location_id, item_variant_id,
                quantity_delta, quantity_after, actor, memo, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING sequence
            "#,
        )
        .bind(entry_id)
        .bind(change.kind.as_str())
        .bind(change.reference_id.map(Uuid::from))
        .bind(key.location_id.as_uuid())
        .bind(key.item_variant_id.as_uuid())
        .bind(change.delta)
        .bind(commit.quantity_after)
        .bind(change.actor.as_uuid())
        .bind(change.memo.as_deref())
        .bind(commit.recorded_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_ledger", e))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| map_sqlx_error("insert_ledger", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(LedgerEntry {
            entry_id,
            sequence: sequence as u64,
            kind: change.kind,
            reference_id: change.reference_id,
            location_id: key.location_id,
            item_variant_id: key.item_variant_id,
            quantity_delta: change.delta,
            quantity_after: commit.quantity_after,
            actor: change.actor,
            memo: change.memo,
            recorded_at: commit.recorded_at,
        })
    }

    pub async fn load_records(
        &self,
        key: Option<StockKey>,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT location_id, item_variant_id, quantity, updated_at
            FROM inventory_records
            WHERE ($1::uuid IS NULL OR location_id = $1)
              AND ($2::uuid IS NULL OR item_variant_id = $2)
            ORDER BY location_id, item_variant_id
            "#,
        )
        .bind(key.map(|k| *k.location_id.as_uuid()))
        .bind(key.map(|k| *k.item_variant_id.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_records", e))?;

        rows.iter()
            .map(|row| {
                RecordRow::from_row(row)
                    .map(InventoryRecord::from)
                    .map_err(|e| map_sqlx_error("load_records", e))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    pub async fn load_ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, entry_id, kind, reference_id, location_id, item_variant_id,
                   quantity_delta, quantity_after, actor, memo, recorded_at
            FROM inventory_ledger
            WHERE ($1::uuid IS NULL OR location_id = $1)
              AND ($2::uuid IS NULL OR item_variant_id = $2)
              AND ($3::uuid IS NULL OR reference_id = $3)
              AND ($4::text IS NULL OR kind = $4)
              AND sequence > $5
            ORDER BY sequence ASC
            LIMIT $6
            "#,
        )
        .bind(filter.location_id.map(Uuid::from))
        .bind(filter.item_variant_id.map(Uuid::from))
        .bind(filter.reference_id.map(Uuid::from))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.after_sequence.unwrap_or(0) as i64)
        .bind(filter.limit.map(|l| l as i64).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_ledger", e))?;

        rows.iter()
            .map(|row| {
                let raw = LedgerRow::from_row(row).map_err(|e| map_sqlx_error("load_ledger", e))?;
                raw.try_into()
            })
            .collect()
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn quantity(&self, key: &StockKey) -> Result<i64, StoreError> {
        pg::block_on(self.load_quantity(*key)).map_err(StoreError::Storage)?
    }

    fn commit(&self, commit: StockCommit) -> Result<LedgerEntry, StoreError> {
        pg::block_on(self.commit_change(commit)).map_err(StoreError::Storage)?
    }

    fn record(&self, key: &StockKey) -> Result<Option<InventoryRecord>, StoreError> {
        let records = pg::block_on(self.load_records(Some(*key))).map_err(StoreError::Storage)??;
        Ok(records.into_iter().next())
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        pg::block_on(self.load_records(None)).map_err(StoreError::Storage)?
    }

    fn ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        pg::block_on(self.load_ledger(filter)).map_err(StoreError::Storage)?
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match pg::sqlstate(&err).as_deref() {
        // check_violation: a negative quantity slipped past the clamp.
        Some("23514") => StoreError::Storage(format!("constraint violated in {operation}: {err}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

#[derive(Debug)]
struct RecordRow {
    location_id: Uuid,
    item_variant_id: Uuid,
    quantity: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            location_id: row.try_get("location_id")?,
            item_variant_id: row.try_get("item_variant_id")?,
            quantity: row.try_get("quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<RecordRow> for InventoryRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            key: StockKey::new(
                LocationId::from_uuid(row.location_id),
                ItemVariantId::from_uuid(row.item_variant_id),
            ),
            quantity: row.quantity,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct LedgerRow {
    sequence: i64,
    entry_id: Uuid,
    kind: String,
    reference_id: Option<Uuid>,
    location_id: Uuid,
    item_variant_id: Uuid,
    quantity_delta: i64,
    quantity_after: i64,
    actor: Uuid,
    memo: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for LedgerRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            sequence: row.try_get("sequence")?,
            entry_id: row.try_get("entry_id")?,
            kind: row.try_get("kind")?,
            reference_id: row.try_get("reference_id")?,
            location_id: row.try_get("location_id")?,
            item_variant_id: row.try_get("item_variant_id")?,
            quantity_delta: row.try_get("quantity_delta")?,
            quantity_after: row.try_get("quantity_after")?,
            actor: row.try_get("actor")?,
            memo: row.try_get("memo")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let kind: TransactionKind = row
            .kind
            .parse()
            .map_err(|e| StoreError::Storage(format!("unreadable ledger kind: {e}")))?;
        Ok(Self {
            entry_id: row.entry_id,
            sequence: row.sequence as u64,
            kind,
            reference_id: row.reference_id.map(AggregateId::from_uuid),
            location_id: LocationId::from_uuid(row.location_id),
            item_variant_id: ItemVariantId::from_uuid(row.item_variant_id),
            quantity_delta: row.quantity_delta,
            quantity_after: row.quantity_after,
            actor: ActorId::from_uuid(row.actor),
            memo: row.memo,
            recorded_at: row.recorded_at,
        })
    }
}
