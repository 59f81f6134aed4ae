//! Shipment requests: outbound shipments, returns and inter-location transfers.
//!
//! The state machine is pure domain logic. Transitions emit events that carry
//! their stock movements; nothing here touches inventory directly.

pub mod shipment;

pub use shipment::{
    CancelShipment, ConfirmReceived, ConfirmShipped, CreateShipment, LineMovement, LineQuantity,
    NewShipmentLine, ShipmentCancelled, ShipmentCommand, ShipmentCreated, ShipmentEvent,
    ShipmentId, ShipmentKind, ShipmentLine, ShipmentReceived, ShipmentRequest, ShipmentShipped,
    ShipmentStatus,
};
