//! Postgres wiring shared by the sqlx-backed stores.
//!
//! The store traits are synchronous. Postgres implementations bridge into
//! async sqlx through the current tokio runtime handle, so they must be called
//! from a blocking-capable thread (`tokio::task::spawn_blocking`) inside a
//! runtime.

use std::future::Future;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Tables used by the Postgres stores. Idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory_records (
        location_id     UUID        NOT NULL,
        item_variant_id UUID        NOT NULL,
        quantity        BIGINT      NOT NULL CHECK (quantity >= 0),
        updated_at      TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (location_id, item_variant_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_ledger (
        sequence        BIGSERIAL   PRIMARY KEY,
        entry_id        UUID        NOT NULL UNIQUE,
        kind            TEXT        NOT NULL,
        reference_id    UUID        NULL,
        location_id     UUID        NOT NULL,
        item_variant_id UUID        NOT NULL,
        quantity_delta  BIGINT      NOT NULL,
        quantity_after  BIGINT      NOT NULL CHECK (quantity_after >= 0),
        actor           UUID        NOT NULL,
        memo            TEXT        NULL,
        recorded_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_ledger_key_idx
        ON inventory_ledger (location_id, item_variant_id, sequence)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_ledger_reference_idx
        ON inventory_ledger (reference_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS material_stock (
        material_id UUID   PRIMARY KEY,
        quantity    BIGINT NOT NULL CHECK (quantity >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS request_events (
        event_id        UUID        PRIMARY KEY,
        aggregate_id    UUID        NOT NULL,
        aggregate_type  TEXT        NOT NULL,
        sequence_number BIGINT      NOT NULL CHECK (sequence_number > 0),
        event_type      TEXT        NOT NULL,
        event_version   INTEGER     NOT NULL,
        actor           UUID        NOT NULL,
        occurred_at     TIMESTAMPTZ NOT NULL,
        payload         JSONB       NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (aggregate_id, sequence_number)
    )
    "#,
];

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "database schema ensured");
    Ok(())
}

/// Run `fut` to completion on the current tokio runtime from sync code.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output, String> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        "postgres stores require a tokio runtime; call them from spawn_blocking".to_string()
    })?;
    Ok(handle.block_on(fut))
}

/// SQLSTATE of a database error, if any.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}
