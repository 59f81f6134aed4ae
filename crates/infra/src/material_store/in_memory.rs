use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::warn;

use retailerp_core::MaterialId;
use retailerp_inventory::{MaterialStock, apply_floor_clamp};

use super::MaterialStore;
use crate::inventory_store::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryMaterialStore {
    stock: Mutex<BTreeMap<MaterialId, i64>>,
}

impl InMemoryMaterialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(
        &self,
        material_id: MaterialId,
        delta: i64,
    ) -> Result<MaterialStock, StoreError> {
        let mut stock = self
            .stock
            .lock()
            .map_err(|_| StoreError::Storage("material store lock poisoned".to_string()))?;
        let current = stock.entry(material_id).or_insert(0);
        let step = apply_floor_clamp(*current, delta);
        if step.clamped {
            warn!(
                material_id = %material_id,
                current = *current,
                delta,
                "material consumption exceeds stock; clamped to zero"
            );
        }
        *current = step.new_quantity;
        Ok(MaterialStock {
            material_id,
            quantity: step.new_quantity,
        })
    }
}

impl MaterialStore for InMemoryMaterialStore {
    fn quantity(&self, material_id: MaterialId) -> Result<i64, StoreError> {
        let stock = self
            .stock
            .lock()
            .map_err(|_| StoreError::Storage("material store lock poisoned".to_string()))?;
        Ok(stock.get(&material_id).copied().unwrap_or(0))
    }

    fn receive(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::Storage(format!(
                "received material quantity must be positive, got {quantity}"
            )));
        }
        self.update(material_id, quantity)
    }

    fn consume(&self, material_id: MaterialId, quantity: i64) -> Result<MaterialStock, StoreError> {
        self.update(material_id, -quantity.max(0))
    }

    fn stocks(&self) -> Result<Vec<MaterialStock>, StoreError> {
        let stock = self
            .stock
            .lock()
            .map_err(|_| StoreError::Storage("material store lock poisoned".to_string()))?;
        Ok(stock
            .iter()
            .map(|(material_id, quantity)| MaterialStock {
                material_id: *material_id,
                quantity: *quantity,
            })
            .collect())
    }
}
