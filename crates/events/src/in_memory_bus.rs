//! Single-process notification bus.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("subscriber list lock poisoned")]
    Poisoned,
}

/// Fans each message out to every live subscription over unbounded
/// channels. Subscriptions that were dropped are forgotten on the next
/// publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    outboxes: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self {
            outboxes: Mutex::new(Vec::new()),
        }
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        match self.outboxes.lock() {
            Ok(outboxes) => outboxes.len(),
            Err(_) => 0,
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send + 'static> EventBus<M> for InMemoryEventBus<M> {
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut outboxes = self.outboxes.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        outboxes.retain(|outbox| outbox.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (outbox, inbox) = mpsc::channel();
        match self.outboxes.lock() {
            Ok(mut outboxes) => outboxes.push(outbox),
            // The sender is dropped here, so the subscription reads as closed.
            Err(_) => drop(outbox),
        }
        Subscription::new(inbox)
    }
}
