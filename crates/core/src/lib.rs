//! `retailerp-core`: domain foundation building blocks.
//!
//! Identifiers, the domain error taxonomy, aggregate traits and the status
//! machine contract shared by every request workflow. No infrastructure here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod lifecycle;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AggregateId, ItemVariantId, LocationId, MaterialId};
pub use lifecycle::StatusMachine;
