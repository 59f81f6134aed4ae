//! Sales capture: sales and returns as single-step ledger consumers.
//!
//! A sale has no fulfillment lifecycle. Recording, editing and deleting each
//! produce at most one stock movement.

pub mod sale;

pub use sale::{
    DeleteSale, EditSaleQuantity, LinkReturn, RecordSale, ReturnLinked, ReturnUnlinked, Sale,
    SaleCommand, SaleDeleted, SaleEvent, SaleId, SaleKind, SaleQuantityEdited, SaleRecorded,
    UnlinkReturn,
};
