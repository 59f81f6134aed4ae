//! Inventory ledger domain.
//!
//! Stock keys, the closed set of transaction kinds, the floor-clamp rule,
//! immutable ledger entries and the movements that request workflows ask the
//! ledger mutator to apply. Pure logic: no IO, no locking, no storage.

pub mod effects;
pub mod kind;
pub mod ledger;
pub mod record;

pub use effects::{MaterialConsumption, StockEffects, StockMovement};
pub use kind::TransactionKind;
pub use ledger::{ChainBreak, LedgerEntry, StockChange, rebuild_records, verify_chain};
pub use record::{FloorClamp, InventoryRecord, MaterialStock, StockKey, apply_floor_clamp};
