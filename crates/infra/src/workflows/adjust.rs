use serde_json::Value as JsonValue;
use tracing::info;

use retailerp_core::{ActorId, AggregateId, ItemVariantId, LocationId, MaterialId};
use retailerp_events::{EventBus, EventEnvelope};
use retailerp_inventory::{StockChange, StockKey, TransactionKind};

use super::Workflows;
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::keyed_mutex::KeyedMutex;

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    /// Manual stock correction: one `ADJUST` entry with no reference.
    ///
    /// Returns the quantity after the change.
    pub fn adjust_stock(
        &self,
        location_id: LocationId,
        item_variant_id: ItemVariantId,
        delta: i64,
        actor: ActorId,
        memo: Option<String>,
    ) -> Result<i64, DispatchError> {
        if delta == 0 {
            return Err(DispatchError::Validation("adjustment delta must be non-zero".to_string()));
        }

        let key = StockKey::new(location_id, item_variant_id);
        let mut change = StockChange::new(key, delta, TransactionKind::Adjust, actor);
        if let Some(memo) = memo {
            change = change.with_memo(memo);
        }

        let quantity_after = self.ledger.apply_change(change)?;
        info!(key = %key, delta, quantity_after, actor = %actor, "stock adjusted");
        Ok(quantity_after)
    }

    /// Add received raw material to material stock.
    pub fn receive_material(
        &self,
        material_id: MaterialId,
        quantity: i64,
    ) -> Result<i64, DispatchError> {
        if quantity <= 0 {
            return Err(DispatchError::Validation("material quantity must be positive".to_string()));
        }
        let stock = self
            .materials
            .receive(material_id, quantity)
            .map_err(|e| DispatchError::Storage(e.to_string()))?;
        Ok(stock.quantity)
    }
}
