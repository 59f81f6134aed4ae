//! Infrastructure layer: stores, keyed gates, the ledger mutator, request
//! workflows, notification wiring and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_bus;
pub mod event_store;
pub mod inventory_store;
pub mod keyed_mutex;
pub mod ledger_mutator;
pub mod material_store;
pub mod pg;
pub mod reconcile;
pub mod workers;
pub mod workflows;
