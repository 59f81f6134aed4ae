use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::trace;

use super::{DEFAULT_GATE_TIMEOUT, KeyedMutex, LockError};

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

/// In-process keyed mutex.
///
/// Slots are created on first use and evicted when the last holder or waiter
/// lets go, so the map only holds keys that are currently contended.
#[derive(Debug)]
pub struct InMemoryKeyedMutex<K> {
    slots: Arc<Mutex<HashMap<K, Arc<Slot>>>>,
    timeout: Duration,
}

impl<K> InMemoryKeyedMutex<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Keys with a live slot: held, or waited on.
    pub fn tracked_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl<K> Default for InMemoryKeyedMutex<K> {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_TIMEOUT)
    }
}

/// Held gate. Dropping it releases the key and wakes one waiter.
#[derive(Debug)]
pub struct InMemoryGuard<K: Eq + Hash> {
    slots: Arc<Mutex<HashMap<K, Arc<Slot>>>>,
    key: K,
    slot: Arc<Slot>,
}

impl<K: Eq + Hash> Drop for InMemoryGuard<K> {
    fn drop(&mut self) {
        // The map lock is taken first so nobody can pick up the slot while
        // we decide whether to evict it.
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Release even if a panicking holder poisoned the flag mutex.
        let mut held = self
            .slot
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *held = false;
        drop(held);
        self.slot.released.notify_one();

        // Only the map and this guard still point at the slot: no waiters.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}

impl<K> KeyedMutex<K> for InMemoryKeyedMutex<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync,
{
    type Guard = InMemoryGuard<K>;

    fn acquire(&self, key: &K) -> Result<Self::Guard, LockError> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| LockError::Backend("gate map poisoned".to_string()))?;
            slots.entry(key.clone()).or_default().clone()
        };

        let acquired = {
            let held = slot
                .held
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let (mut held, wait) = slot
                .released
                .wait_timeout_while(held, self.timeout, |held| *held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if wait.timed_out() && *held {
                false
            } else {
                *held = true;
                true
            }
        };

        if !acquired {
            self.forget_if_unused(key, slot);
            return Err(LockError::Timeout {
                key: key.to_string(),
                waited: self.timeout,
            });
        }

        trace!(key = %key, "gate acquired");
        Ok(InMemoryGuard {
            slots: Arc::clone(&self.slots),
            key: key.clone(),
            slot,
        })
    }
}

impl<K: Eq + Hash> InMemoryKeyedMutex<K> {
    /// Drop a timed-out waiter's reference, evicting the slot if it was the last.
    fn forget_if_unused(&self, key: &K, slot: Arc<Slot>) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(slot);
        // The map's reference is the only one left: nobody holds or waits.
        if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(key);
        }
    }
}
