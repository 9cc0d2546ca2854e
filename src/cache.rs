//! Cache capability consumed by the tag listing path.
//!
//! The cache is injected rather than reached through a global so tests can
//! substitute [`MemoryCache`]; production deployments point [`RedisCache`] at
//! the same Redis instance the rest of the stack uses. Cache failures are
//! never surfaced to callers: a broken cache degrades to a miss.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::Commands;
use tracing::warn;

pub trait Cache: Send + Sync {
    /// Returns the cached value, or `None` on miss or expiry.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str, ttl: Duration);

    fn delete(&self, key: &str);
}

/// Process-local cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.lock().insert(key.to_string(), (value.to_string(), expires_at));
    }

    fn delete(&self, key: &str) {
        self.lock().remove(key);
    }
}

/// Redis-backed cache. Expiry is delegated to Redis via `SETEX`.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn connect(url: &str) -> Result<Self, redis::RedisError> {
        Ok(RedisCache {
            client: redis::Client::open(url)?,
        })
    }

    fn connection(&self) -> Option<redis::Connection> {
        match self.client.get_connection() {
            Ok(conn) => Some(conn),
            Err(err) => {
                warn!(error = %err, "redis connection failed, treating cache as unavailable");
                None
            }
        }
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection()?;
        match conn.get::<_, Option<String>>(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, key, "redis GET failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let Some(mut conn) = self.connection() else { return };
        if let Err(err) = conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()) {
            warn!(error = %err, key, "redis SETEX failed");
        }
    }

    fn delete(&self, key: &str) {
        let Some(mut conn) = self.connection() else { return };
        if let Err(err) = conn.del::<_, i64>(key) {
            warn!(error = %err, key, "redis DEL failed");
        }
    }
}
