use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailerp_core::{ItemVariantId, LocationId, MaterialId};

/// Identity of one inventory record: a variant at a location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub location_id: LocationId,
    pub item_variant_id: ItemVariantId,
}

impl StockKey {
    pub fn new(location_id: LocationId, item_variant_id: ItemVariantId) -> Self {
        Self {
            location_id,
            item_variant_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.location_id, self.item_variant_id)
    }
}

/// Current quantity of a variant at a location.
///
/// A cached projection over the ledger. Created on first mutation, never
/// deleted; `quantity` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub key: StockKey,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// Current quantity of a raw material. Kept apart from item inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStock {
    pub material_id: MaterialId,
    pub quantity: i64,
}

/// Outcome of applying a delta under the floor rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorClamp {
    pub new_quantity: i64,
    /// True when `current + delta` went below zero and was raised to zero.
    pub clamped: bool,
}

/// `max(0, current + delta)`.
///
/// A decrement past zero is clamped, never rejected: the write path stays
/// available when a sale or shipment outruns recorded stock. Saturating
/// arithmetic keeps extreme deltas from overflowing.
pub fn apply_floor_clamp(current: i64, delta: i64) -> FloorClamp {
    let raw = current.saturating_add(delta);
    if raw < 0 {
        FloorClamp {
            new_quantity: 0,
            clamped: true,
        }
    } else {
        FloorClamp {
            new_quantity: raw,
            clamped: false,
        }
    }
}
