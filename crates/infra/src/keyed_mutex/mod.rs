//! Keyed exclusive gates.
//!
//! A [`KeyedMutex`] hands out one releasable guard per key at a time. Callers
//! on the same key block until the holder drops its guard or the configured
//! timeout elapses; different keys never contend.
//!
//! Two implementations:
//! - [`InMemoryKeyedMutex`]: a map of per-key mutex/condvar slots (single process)
//! - `RedisKeyedMutex` (feature `redis`): `SET NX PX` leases shared across processes
//!
//! [`GateBackend`] picks one of them at startup.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_lock;

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use in_memory::{InMemoryGuard, InMemoryKeyedMutex};
#[cfg(feature = "redis")]
pub use redis_lock::{RedisGuard, RedisKeyedMutex};

/// How long a caller waits for a gate unless configured otherwise.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The gate stayed held for the whole wait. Retryable.
    #[error("timed out after {waited:?} waiting for gate on {key}")]
    Timeout { key: String, waited: Duration },

    /// The lock backend failed (poisoned mutex, unreachable Redis, ...).
    #[error("lock backend failure: {0}")]
    Backend(String),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

/// Per-key critical section capability.
///
/// The returned guard releases the gate when dropped, on every exit path
/// including unwinding.
pub trait KeyedMutex<K>: Send + Sync {
    type Guard: Send;

    fn acquire(&self, key: &K) -> Result<Self::Guard, LockError>;
}

impl<K, M> KeyedMutex<K> for Arc<M>
where
    M: KeyedMutex<K> + ?Sized,
{
    type Guard = M::Guard;

    fn acquire(&self, key: &K) -> Result<Self::Guard, LockError> {
        (**self).acquire(key)
    }
}

/// A gate whose backend is chosen by configuration.
///
/// Every process that mutates the same stores must use the same backend,
/// otherwise two processes can hold "the" gate for one key at once.
#[derive(Debug)]
pub enum GateBackend<K> {
    InProcess(InMemoryKeyedMutex<K>),
    #[cfg(feature = "redis")]
    Redis(RedisKeyedMutex),
}

impl<K> GateBackend<K> {
    pub fn in_process(timeout: Duration) -> Self {
        GateBackend::InProcess(InMemoryKeyedMutex::new(timeout))
    }

    #[cfg(feature = "redis")]
    pub fn redis(redis_url: &str, prefix: &str, timeout: Duration) -> Result<Self, LockError> {
        RedisKeyedMutex::new(redis_url, prefix, timeout).map(GateBackend::Redis)
    }

    pub fn transport(&self) -> &'static str {
        match self {
            GateBackend::InProcess(_) => "in-process",
            #[cfg(feature = "redis")]
            GateBackend::Redis(_) => "redis",
        }
    }
}

/// Guard of a [`GateBackend`]; releases whichever gate it holds on drop.
pub struct BackendGuard {
    _held: Box<dyn Send>,
}

impl<K> KeyedMutex<K> for GateBackend<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    type Guard = BackendGuard;

    fn acquire(&self, key: &K) -> Result<Self::Guard, LockError> {
        match self {
            GateBackend::InProcess(gate) => gate.acquire(key).map(|g| BackendGuard { _held: Box::new(g) }),
            #[cfg(feature = "redis")]
            GateBackend::Redis(gate) => gate.acquire(key).map(|g| BackendGuard { _held: Box::new(g) }),
        }
    }
}
