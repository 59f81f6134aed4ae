use serde::{Deserialize, Serialize};

use retailerp_core::{ItemVariantId, LocationId, MaterialId};

use crate::kind::TransactionKind;
use crate::record::StockKey;

/// One quantity change a request transition asks the ledger to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
    pub delta: i64,
    pub kind: TransactionKind,
}

impl StockMovement {
    pub fn new(
        location_id: LocationId,
        item_variant_id: ItemVariantId,
        delta: i64,
        kind: TransactionKind,
    ) -> Self {
        Self {
            location_id,
            item_variant_id,
            delta,
            kind,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.location_id, self.item_variant_id)
    }
}

/// A raw-material decrement requested by production completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialConsumption {
    pub material_id: MaterialId,
    pub quantity: i64,
}

/// Stock effects carried by a request event.
///
/// Events describe what must happen to inventory; the infrastructure executes
/// it through the ledger mutator, one call per movement, in the order given.
/// Zero-delta movements are never returned.
pub trait StockEffects {
    fn stock_movements(&self) -> Vec<StockMovement>;

    fn material_consumption(&self) -> Vec<MaterialConsumption> {
        Vec::new()
    }
}
