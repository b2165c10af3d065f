//! Counters
//!
//! A counter is an integer entry mirrored to Redis as a native integer, so
//! increments are atomic on the server. The in-process copy receives the
//! same deltas but is not synchronised with concurrent writers elsewhere;
//! Redis holds the authoritative value.

use super::{CacheEntry, CacheRepository, Origin};
use crate::error::Result;
use serde_json::Value as Json;

impl CacheRepository {
    /// Create or reset a counter. Returns the stored remote value when a
    /// client is attached, otherwise `initial`.
    pub async fn add_counter(&self, key: &str, initial: i64, ttl: u64) -> Result<i64> {
        self.store(key, Json::from(initial), Origin::Counter);

        let client = match &self.redis {
            None => return Ok(initial),
            Some(client) => client,
        };
        let mut client = client.lock().await;
        if ttl > 0 {
            client.setex(key, ttl, initial).await?;
        } else {
            client.set(key, initial).await?;
        }
        let stored: Option<i64> = client.get(key).await?;
        Ok(stored.unwrap_or(initial))
    }

    /// Add `diff` to a counter, creating it at 0 if needed. Returns the
    /// remote value when a client is attached, otherwise the local one.
    pub async fn incr_counter(&self, key: &str, diff: i64) -> Result<i64> {
        let remote = match &self.redis {
            None => None,
            Some(client) => Some(client.lock().await.incrby(key, diff).await?),
        };
        let local = self.apply_delta(key, diff);
        tracing::debug!("Counter {} += {} (local {}, remote {:?})", key, diff, local, remote);
        Ok(remote.unwrap_or(local))
    }

    /// Subtract `diff` from a counter
    pub async fn decr_counter(&self, key: &str, diff: i64) -> Result<i64> {
        let remote = match &self.redis {
            None => None,
            Some(client) => Some(client.lock().await.decrby(key, diff).await?),
        };
        let local = self.apply_delta(key, diff.wrapping_neg());
        Ok(remote.unwrap_or(local))
    }

    /// Current counter value, preferring Redis, then the in-process copy,
    /// then `default`
    pub async fn get_counter(&self, key: &str, default: i64) -> Result<i64> {
        if let Some(client) = &self.redis {
            let remote: Option<i64> = client.lock().await.get(key).await?;
            if let Some(value) = remote {
                return Ok(value);
            }
        }
        Ok(self
            .lookup(key)
            .and_then(|entry| entry.value.as_i64())
            .unwrap_or(default))
    }

    /// Read-modify-write of the local copy under one lock
    fn apply_delta(&self, key: &str, diff: i64) -> i64 {
        let mut entries = self.entries.lock();
        let current = entries
            .map
            .get(key)
            .and_then(|(_, entry)| entry.value.as_i64())
            .unwrap_or(0);
        let next = current.saturating_add(diff);
        match entries.map.get_mut(key) {
            Some((_, entry)) => {
                entry.value = Json::from(next);
                entry.origin = Origin::Counter;
            }
            None => entries.insert(
                key.to_string(),
                CacheEntry {
                    value: Json::from(next),
                    origin: Origin::Counter,
                },
            ),
        }
        next
    }
}
