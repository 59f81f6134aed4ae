use serde_json::Value as JsonValue;

use retailerp_core::AggregateId;
use retailerp_events::{EventBus, EventEnvelope};
use retailerp_shipping::{
    CancelShipment, ConfirmReceived, ConfirmShipped, CreateShipment, ShipmentCommand, ShipmentId,
    ShipmentRequest,
};

use super::{Workflows, aggregate_types};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::keyed_mutex::KeyedMutex;

fn empty(id: AggregateId) -> ShipmentRequest {
    ShipmentRequest::empty(ShipmentId(id))
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    /// Refused with a conflict if the request number is already taken.
    pub fn create_shipment(&self, cmd: CreateShipment) -> Result<ShipmentRequest, DispatchError> {
        let (id, actor) = (cmd.shipment_id.0, cmd.actor);
        let number = cmd.request_number.clone();
        self.create_numbered(aggregate_types::SHIPMENT, &number, id, actor, || {
            self.execute(id, aggregate_types::SHIPMENT, actor, ShipmentCommand::CreateShipment(cmd), empty)
                .map(|o| o.state)
        })
    }

    /// Debit the origin by each line's shipped quantity.
    pub fn confirm_shipped(&self, cmd: ConfirmShipped) -> Result<ShipmentRequest, DispatchError> {
        let (id, actor) = (cmd.shipment_id.0, cmd.actor);
        self.execute(id, aggregate_types::SHIPMENT, actor, ShipmentCommand::ConfirmShipped(cmd), empty)
            .map(|o| o.state)
    }

    /// Credit the destination by each line's received quantity.
    pub fn confirm_received(&self, cmd: ConfirmReceived) -> Result<ShipmentRequest, DispatchError> {
        let (id, actor) = (cmd.shipment_id.0, cmd.actor);
        self.execute(id, aggregate_types::SHIPMENT, actor, ShipmentCommand::ConfirmReceived(cmd), empty)
            .map(|o| o.state)
    }

    /// Cancel and compensate whatever the shipment already moved.
    pub fn cancel_shipment(&self, cmd: CancelShipment) -> Result<ShipmentRequest, DispatchError> {
        let (id, actor) = (cmd.shipment_id.0, cmd.actor);
        self.execute(id, aggregate_types::SHIPMENT, actor, ShipmentCommand::CancelShipment(cmd), empty)
            .map(|o| o.state)
    }

    pub fn shipment(&self, shipment_id: ShipmentId) -> Result<ShipmentRequest, DispatchError> {
        self.require(shipment_id.0, empty)
    }

    pub fn shipments(&self) -> Result<Vec<ShipmentRequest>, DispatchError> {
        self.dispatcher().load_all(aggregate_types::SHIPMENT, empty)
    }
}
