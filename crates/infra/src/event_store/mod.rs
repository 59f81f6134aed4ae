//! Append-only event store for request aggregates.
//!
//! Shipment, restock, production and sale requests are event-sourced: their
//! streams live here, keyed by aggregate id. Item quantities do not; those
//! live in the inventory store and its ledger.

pub mod in_memory;
pub mod postgres;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
