//! Redis-backed keyed mutex for multi-process deployments.
//!
//! Each acquisition is a lease: `SET <prefix>:<key> <token> NX PX <ttl>`.
//! Release deletes the key only when it still carries our token, so an
//! expired lease can never release someone else's gate.

use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use super::{KeyedMutex, LockError};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RedisKeyedMutex {
    client: redis::Client,
    prefix: String,
    timeout: Duration,
    lease: Duration,
}

impl RedisKeyedMutex {
    pub fn new(
        redis_url: impl AsRef<str>,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
            timeout,
            lease: Duration::from_secs(30),
        })
    }

    /// Upper bound on how long a crashed holder can block a key.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[derive(Debug)]
pub struct RedisGuard {
    client: redis::Client,
    key: String,
    token: String,
}

impl Drop for RedisGuard {
    fn drop(&mut self) {
        let released = self.client.get_connection().and_then(|mut conn| {
            redis::Script::new(RELEASE_SCRIPT)
                .key(&self.key)
                .arg(&self.token)
                .invoke::<i64>(&mut conn)
        });
        if let Err(err) = released {
            // The lease expires on its own; nothing else to do.
            warn!(key = %self.key, error = %err, "failed to release redis gate");
        }
    }
}

impl<K> KeyedMutex<K> for RedisKeyedMutex
where
    K: Display,
{
    type Guard = RedisGuard;

    fn acquire(&self, key: &K) -> Result<Self::Guard, LockError> {
        let redis_key = format!("{}:{}", self.prefix, key);
        let token = Uuid::now_v7().to_string();
        let lease_ms = self.lease.as_millis() as u64;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| LockError::Backend(e.to_string()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&redis_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(lease_ms)
                .query(&mut conn)
                .map_err(|e| LockError::Backend(e.to_string()))?;

            if acquired.is_some() {
                return Ok(RedisGuard {
                    client: self.client.clone(),
                    key: redis_key,
                    token,
                });
            }

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: self.timeout,
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }
}
