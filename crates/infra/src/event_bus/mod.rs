//! Notification bus wiring.
//!
//! The bus trait and the in-process implementation live in `retailerp-events`.
//! [`NotificationBus`] picks one transport at startup so the dispatcher and the
//! notification worker share a single concrete type.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

use serde_json::Value as JsonValue;
use thiserror::Error;

use retailerp_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};

pub type RequestEnvelope = EventEnvelope<JsonValue>;

#[derive(Debug, Error)]
pub enum NotificationBusError {
    #[error(transparent)]
    InMemory(#[from] retailerp_events::InMemoryBusError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] RedisBusError),
}

#[derive(Debug)]
pub enum NotificationBus {
    InMemory(InMemoryEventBus<RequestEnvelope>),
    #[cfg(feature = "redis")]
    Redis(RedisPubSubEventBus),
}

impl NotificationBus {
    pub fn in_memory() -> Self {
        NotificationBus::InMemory(InMemoryEventBus::new())
    }

    #[cfg(feature = "redis")]
    pub fn redis(redis_url: &str, channel: &str) -> Result<Self, RedisBusError> {
        Ok(NotificationBus::Redis(RedisPubSubEventBus::new(redis_url, channel)?))
    }

    pub fn transport(&self) -> &'static str {
        match self {
            NotificationBus::InMemory(_) => "in-memory",
            #[cfg(feature = "redis")]
            NotificationBus::Redis(_) => "redis",
        }
    }
}

impl EventBus<RequestEnvelope> for NotificationBus {
    type Error = NotificationBusError;

    fn publish(&self, message: RequestEnvelope) -> Result<(), Self::Error> {
        match self {
            NotificationBus::InMemory(bus) => Ok(bus.publish(message)?),
            #[cfg(feature = "redis")]
            NotificationBus::Redis(bus) => Ok(bus.publish(message)?),
        }
    }

    fn subscribe(&self) -> Subscription<RequestEnvelope> {
        match self {
            NotificationBus::InMemory(bus) => bus.subscribe(),
            #[cfg(feature = "redis")]
            NotificationBus::Redis(bus) => bus.subscribe(),
        }
    }
}
