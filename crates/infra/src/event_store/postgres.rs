//! Request streams in the `request_events` table.
//!
//! Appends run in one transaction: read the stream head, check the expected
//! version, insert the batch. A writer that races in between trips the
//! `(aggregate_id, sequence_number)` unique constraint (SQLSTATE `23505`),
//! reported as [`EventStoreError::Concurrency`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use retailerp_core::{ActorId, AggregateId, ExpectedVersion};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};
use crate::pg;

const EVENT_COLUMNS: &str = "event_id, aggregate_id, aggregate_type, sequence_number, \
                             event_type, event_version, actor, occurred_at, payload";

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

/// Head of a stream as seen inside the append transaction.
struct StreamHead {
    version: u64,
    aggregate_type: Option<String>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id, events = tracing::field::Empty), err)]
    pub async fn load_events(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM request_events WHERE aggregate_id = $1 ORDER BY sequence_number"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_events", e))?;

        let events = rows
            .iter()
            .map(|row| {
                EventRow::from_row(row)
                    .map_err(|e| EventStoreError::Storage(format!("unreadable event row: {e}")))
                    .and_then(StoredEvent::try_from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("events", events.len());
        Ok(events)
    }

    #[instrument(
        skip(self, events),
        fields(aggregate_id = %aggregate_id, events = events.len(), expected = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&events)?;
        let Some(aggregate_type) = events.first().map(|e| e.aggregate_type.clone()) else {
            return Ok(vec![]);
        };
        if events[0].aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch targets {}, not {aggregate_id}",
                events[0].aggregate_id
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let head = stream_head(&mut tx, aggregate_id).await?;
        if let Some(existing) = head.aggregate_type.filter(|t| *t != aggregate_type) {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} is '{existing}', not '{aggregate_type}'"
            )));
        }
        if !expected_version.matches(head.version) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {aggregate_id}: expected {expected_version:?}, at {}",
                head.version
            )));
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(head.version + 1..)
            .map(|(e, seq)| e.into_stored(seq))
            .collect();

        let mut insert = QueryBuilder::<Postgres>::new(format!("INSERT INTO request_events ({EVENT_COLUMNS}) "));
        insert.push_values(committed.iter(), |mut row, e| {
            row.push_bind(e.event_id)
                .push_bind(*e.aggregate_id.as_uuid())
                .push_bind(e.aggregate_type.clone())
                .push_bind(e.sequence_number as i64)
                .push_bind(e.event_type.clone())
                .push_bind(e.event_version as i32)
                .push_bind(*e.actor.as_uuid())
                .push_bind(e.occurred_at)
                .push_bind(e.payload.clone());
        });
        insert
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_events", e))?;
        drop(insert);

        // Dropping `tx` on any early return above rolls back.
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(committed)
    }

    pub async fn load_aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT aggregate_id FROM request_events \
             WHERE aggregate_type = $1 AND sequence_number = 1 \
             ORDER BY created_at, aggregate_id",
        )
        .bind(aggregate_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_aggregate_ids", e))?;

        Ok(ids.into_iter().map(AggregateId::from_uuid).collect())
    }
}

async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<StreamHead, EventStoreError> {
    let row = sqlx::query(
        "SELECT MAX(sequence_number) AS version, MIN(aggregate_type) AS aggregate_type \
         FROM request_events WHERE aggregate_id = $1",
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("stream_head", e))?;

    let version: Option<i64> = row
        .try_get("version")
        .map_err(|e| EventStoreError::Storage(format!("unreadable stream version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Storage(format!("unreadable stream type: {e}")))?;

    Ok(StreamHead {
        version: version.map_or(0, |v| v.max(0) as u64),
        aggregate_type,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match pg::sqlstate(&err).as_deref() {
        Some("23505") => EventStoreError::Concurrency(format!("{operation}: concurrent append ({err})")),
        Some("23514") => EventStoreError::InvalidAppend(format!("{operation}: {err}")),
        _ => EventStoreError::Storage(format!("{operation}: {err}")),
    }
}

struct EventRow {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    actor: Uuid,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for EventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            event_id: row.try_get("event_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            actor: row.try_get("actor")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl TryFrom<EventRow> for StoredEvent {
    type Error = EventStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let sequence_number = u64::try_from(row.sequence_number)
            .map_err(|_| EventStoreError::Storage(format!("negative sequence number {}", row.sequence_number)))?;
        let event_version = u32::try_from(row.event_version)
            .map_err(|_| EventStoreError::Storage(format!("negative event version {}", row.event_version)))?;
        Ok(StoredEvent {
            event_id: row.event_id,
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number,
            event_type: row.event_type,
            event_version,
            actor: ActorId::from_uuid(row.actor),
            occurred_at: row.occurred_at,
            payload: row.payload,
        })
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(aggregate_id) = events.first().map(|e| e.aggregate_id) else {
            return Ok(vec![]);
        };
        pg::block_on(self.append_events(aggregate_id, events, expected_version))
            .map_err(EventStoreError::Storage)?
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        pg::block_on(self.load_events(aggregate_id)).map_err(EventStoreError::Storage)?
    }

    fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        pg::block_on(self.load_aggregate_ids(aggregate_type)).map_err(EventStoreError::Storage)?
    }
}
