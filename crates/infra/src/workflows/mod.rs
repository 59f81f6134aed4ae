//! Request workflows: the application layer over the state machines.
//!
//! Each transition goes through the [`CommandDispatcher`]; the stock effects
//! carried by the decided events are executed through the [`StockLedger`], one
//! ledger call per movement, before the events are appended. Material
//! consumption goes to the [`MaterialStore`] first.

mod adjust;
mod numbering;
mod production;
mod restock;
mod sales;
mod shipping;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use retailerp_core::{ActorId, Aggregate, AggregateId, DomainError};
use retailerp_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use retailerp_inventory::{StockChange, StockEffects, StockKey};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Outcome};
use crate::config::LedgerConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::inventory_store::{InMemoryInventoryStore, InventoryStore};
use crate::keyed_mutex::{InMemoryKeyedMutex, KeyedMutex};
use crate::ledger_mutator::{LedgerMutator, MutationError, StockLedger};
use crate::material_store::{InMemoryMaterialStore, MaterialStore};

pub use numbering::{REQUEST_NUMBER, claim_id};

/// Stream type names in the request event store.
pub mod aggregate_types {
    pub const SHIPMENT: &str = "shipping.shipment";
    pub const RESTOCK: &str = "restock.request";
    pub const PRODUCTION_PLAN: &str = "production.plan";
    pub const SALE: &str = "sales.sale";
}

pub struct Workflows<S, B, G = InMemoryKeyedMutex<AggregateId>> {
    dispatcher: CommandDispatcher<S, B, G>,
    inventory: Arc<dyn InventoryStore>,
    ledger: Arc<dyn StockLedger>,
    materials: Arc<dyn MaterialStore>,
    config: LedgerConfig,
}

/// Fully in-process wiring, for tests and single-node dev runs.
pub type InMemoryWorkflows =
    Workflows<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

impl InMemoryWorkflows {
    pub fn in_memory(config: LedgerConfig) -> Self {
        let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new());
        let ledger = LedgerMutator::new(
            Arc::clone(&inventory),
            InMemoryKeyedMutex::<StockKey>::new(config.gate_timeout),
        );
        let dispatcher = CommandDispatcher::with_gate(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            InMemoryKeyedMutex::new(config.gate_timeout),
        );
        Workflows::new(
            dispatcher,
            inventory,
            Arc::new(ledger),
            Arc::new(InMemoryMaterialStore::new()),
            config,
        )
    }
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    pub fn new(
        dispatcher: CommandDispatcher<S, B, G>,
        inventory: Arc<dyn InventoryStore>,
        ledger: Arc<dyn StockLedger>,
        materials: Arc<dyn MaterialStore>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            dispatcher,
            inventory,
            ledger,
            materials,
            config,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B, G> {
        &self.dispatcher
    }

    /// Read access to records and ledger. Writes go through the ledger only.
    pub fn inventory(&self) -> &dyn InventoryStore {
        self.inventory.as_ref()
    }

    pub fn materials(&self) -> &dyn MaterialStore {
        self.materials.as_ref()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Dispatch `command` and execute the stock effects of its events.
    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        actor: ActorId,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Outcome<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + StockEffects + Serialize + DeserializeOwned,
    {
        self.dispatcher.dispatch_with_effects(
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
            |events| self.apply_effects(aggregate_id, actor, events),
        )
    }

    /// Run material consumption, then ledger movements, event by event.
    ///
    /// Stops at the first failure. Effects already applied stay applied; the
    /// error reports how many there were. Returns the number applied.
    fn apply_effects<E>(&self, reference: AggregateId, actor: ActorId, events: &[E]) -> Result<usize, DispatchError>
    where
        E: Event + StockEffects,
    {
        let mut applied = 0usize;
        for event in events {
            for usage in event.material_consumption() {
                self.materials
                    .consume(usage.material_id, usage.quantity)
                    .map_err(|e| effect_failure(applied, MutationError::Store(e)))?;
                applied += 1;
            }
            for movement in event.stock_movements() {
                let change = StockChange::new(movement.key(), movement.delta, movement.kind, actor)
                    .with_reference(reference)
                    .with_memo(event.event_type());
                self.ledger
                    .apply_change(change)
                    .map_err(|e| effect_failure(applied, e))?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn require<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.dispatcher
            .load(aggregate_id, make_aggregate)?
            .ok_or(DispatchError::NotFound)
    }
}

fn effect_failure(applied: usize, source: MutationError) -> DispatchError {
    if applied == 0 {
        source.into()
    } else {
        DispatchError::PartialEffect { applied, source }
    }
}
