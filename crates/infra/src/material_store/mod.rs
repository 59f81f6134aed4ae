//! Raw-material stock, kept apart from item inventory.
//!
//! Production completion consumes materials floored at zero. Materials have no
//! ledger of their own.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use retailerp_core::MaterialId;
use retailerp_inventory::MaterialStock;

pub use in_memory::InMemoryMaterialStore;
pub use postgres::PostgresMaterialStore;

use crate::inventory_store::StoreError;

pub trait MaterialStore: Send + Sync {
    /// Current stock; 0 for an unknown material.
    fn quantity(&self, material_id: MaterialId) -> Result<i64, StoreError>;

    /// Add received material. `quantity` must be positive.
    fn receive(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError>;

    /// Remove `quantity`, flooring the result at zero.
    fn consume(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError>;

    fn stocks(&self) -> Result<Vec<MaterialStock>, StoreError>;
}

impl<S> MaterialStore for Arc<S>
where
    S: MaterialStore + ?Sized,
{
    fn quantity(&self, material_id: MaterialId) -> Result<i64, StoreError> {
        (**self).quantity(material_id)
    }

    fn receive(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        (**self).receive(material_id, quantity)
    }

    fn consume(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        (**self).consume(material_id, quantity)
    }

    fn stocks(&self) -> Result<Vec<MaterialStock>, StoreError> {
        (**self).stocks()
    }
}
