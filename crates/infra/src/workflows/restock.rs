use chrono::Utc;
use serde_json::Value as JsonValue;

use retailerp_core::{ActorId, AggregateId};
use retailerp_events::{EventBus, EventEnvelope};
use retailerp_restock::{
    ApproveRestock, CancelRestock, CreateRestock, OrderRestock, ReceiveRestock, ReceivedLine,
    RestockCommand, RestockId, RestockRequest, UpdateRestockMetadata,
};

use super::{Workflows, aggregate_types};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::keyed_mutex::KeyedMutex;

fn empty(id: AggregateId) -> RestockRequest {
    RestockRequest::empty(RestockId(id))
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    pub fn create_restock(&self, cmd: CreateRestock) -> Result<RestockRequest, DispatchError> {
        let (id, actor) = (cmd.restock_id.0, cmd.actor);
        let number = cmd.request_number.clone();
        self.create_numbered(aggregate_types::RESTOCK, &number, id, actor, || {
            self.execute(id, aggregate_types::RESTOCK, actor, RestockCommand::CreateRestock(cmd), empty)
                .map(|o| o.state)
        })
    }

    pub fn approve_restock(&self, cmd: ApproveRestock) -> Result<RestockRequest, DispatchError> {
        let (id, actor) = (cmd.restock_id.0, cmd.actor);
        self.execute(id, aggregate_types::RESTOCK, actor, RestockCommand::ApproveRestock(cmd), empty)
            .map(|o| o.state)
    }

    pub fn order_restock(&self, cmd: OrderRestock) -> Result<RestockRequest, DispatchError> {
        let (id, actor) = (cmd.restock_id.0, cmd.actor);
        self.execute(id, aggregate_types::RESTOCK, actor, RestockCommand::OrderRestock(cmd), empty)
            .map(|o| o.state)
    }

    /// Receive goods under the configured ceiling. The only restock operation
    /// that credits inventory.
    pub fn receive_restock(
        &self,
        restock_id: RestockId,
        lines: Vec<ReceivedLine>,
        actor: ActorId,
    ) -> Result<RestockRequest, DispatchError> {
        let cmd = ReceiveRestock {
            restock_id,
            lines,
            ceiling_percent: self.config().restock_ceiling_percent,
            actor,
            occurred_at: Utc::now(),
        };
        self.execute(restock_id.0, aggregate_types::RESTOCK, actor, RestockCommand::ReceiveRestock(cmd), empty)
            .map(|o| o.state)
    }

    /// Edit expected date and memo. No stock effects.
    pub fn update_restock_metadata(&self, cmd: UpdateRestockMetadata) -> Result<RestockRequest, DispatchError> {
        let (id, actor) = (cmd.restock_id.0, cmd.actor);
        self.execute(id, aggregate_types::RESTOCK, actor, RestockCommand::UpdateRestockMetadata(cmd), empty)
            .map(|o| o.state)
    }

    pub fn cancel_restock(&self, cmd: CancelRestock) -> Result<RestockRequest, DispatchError> {
        let (id, actor) = (cmd.restock_id.0, cmd.actor);
        self.execute(id, aggregate_types::RESTOCK, actor, RestockCommand::CancelRestock(cmd), empty)
            .map(|o| o.state)
    }

    pub fn restock(&self, restock_id: RestockId) -> Result<RestockRequest, DispatchError> {
        self.require(restock_id.0, empty)
    }

    pub fn restocks(&self) -> Result<Vec<RestockRequest>, DispatchError> {
        self.dispatcher().load_all(aggregate_types::RESTOCK, empty)
    }
}
