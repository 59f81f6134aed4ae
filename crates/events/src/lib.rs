//! Request events and how they reach notification consumers.
//!
//! State machines emit [`Event`]s. Once committed they are wrapped in an
//! [`EventEnvelope`] and published on an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamPosition};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
