//! Restock requests (event-sourced).
//!
//! Pure domain logic: the receive transition is the only one that produces
//! stock movements. Metadata edits are a separate command and never do.

pub mod request;

pub use request::{
    ApproveRestock, CancelRestock, CreateRestock, DEFAULT_CEILING_PERCENT, NewRestockLine,
    OrderRestock, ReceiptMovement, ReceiveRestock, ReceivedLine, RestockApproved,
    RestockCancelled, RestockCommand, RestockCreated, RestockEvent, RestockId, RestockLine,
    RestockMetadataUpdated, RestockOrdered, RestockReceived, RestockRequest, RestockStatus,
    UpdateRestockMetadata,
};
