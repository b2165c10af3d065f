//! Redis-only helpers of the repository
//!
//! These bypass the in-process map. Without a client they are no-ops that
//! report "nothing there".

use super::{CacheRepository, Origin};
use crate::error::Result;
use crate::utils::{decode_json, encode_json, filter_keys, is_mask, mask_to_glob};
use bytes::Bytes;
use serde_json::Value as Json;

/// Page size for the SCAN loop behind [`CacheRepository::redis_keys`]
const SCAN_COUNT: u64 = 500;

/// Truthiness of a stored flag value
fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Json::String(s) => !s.is_empty() && s != "0",
        Json::Array(items) => !items.is_empty(),
        Json::Object(map) => !map.is_empty(),
    }
}

impl CacheRepository {
    /// Remote value for `key`, JSON-decoded
    pub async fn redis_fetch(&self, key: &str) -> Result<Option<Json>> {
        match self.redis_fetch_raw(key).await? {
            Some(raw) => Ok(Some(decode_json(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remote value for `key` as stored
    pub async fn redis_fetch_raw(&self, key: &str) -> Result<Option<Bytes>> {
        match &self.redis {
            None => Ok(None),
            Some(client) => client.lock().await.get::<Bytes>(key).await,
        }
    }

    /// JSON-encode `value` and store it remotely; `ttl` 0 means no expiry.
    /// Returns whether the key exists afterwards.
    pub async fn redis_push(&self, key: &str, value: &Json, ttl: u64) -> Result<bool> {
        if self.redis.is_none() {
            return Ok(false);
        }
        let encoded = encode_json(value)?;
        self.redis_push_raw(key, &encoded, ttl).await
    }

    /// Store `value` remotely as given
    pub async fn redis_push_raw(&self, key: &str, value: &str, ttl: u64) -> Result<bool> {
        let client = match &self.redis {
            None => return Ok(false),
            Some(client) => client,
        };
        let mut client = client.lock().await;
        if ttl > 0 {
            client.setex(key, ttl, value).await?;
        } else {
            client.set(key, value).await?;
        }
        client.exists(key).await
    }

    /// Delete a key, or every remote key matching a mask. Returns the
    /// sorted keys it tried to delete.
    pub async fn redis_del(&self, key: &str) -> Result<Vec<String>> {
        if self.redis.is_none() {
            return Ok(Vec::new());
        }
        let mut keys = if is_mask(key) {
            self.redis_keys(key).await?
        } else {
            vec![key.to_string()]
        };
        keys.sort();
        if let (Some(client), false) = (&self.redis, keys.is_empty()) {
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            client.lock().await.del(&refs).await?;
        }
        Ok(keys)
    }

    /// Whether `key` exists remotely
    pub async fn redis_check(&self, key: &str) -> Result<bool> {
        match &self.redis {
            None => Ok(false),
            Some(client) => client.lock().await.exists(key).await,
        }
    }

    /// Remote keys matching a mask (or the single key, if it exists)
    pub async fn redis_keys(&self, mask: &str) -> Result<Vec<String>> {
        let client = match &self.redis {
            None => return Ok(Vec::new()),
            Some(client) => client,
        };
        let mut client = client.lock().await;

        if !is_mask(mask) {
            return Ok(if client.exists(mask).await? {
                vec![mask.to_string()]
            } else {
                Vec::new()
            });
        }

        let glob = mask_to_glob(mask);
        let mut found = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, page) = client.scan(cursor, Some(glob.as_str()), Some(SCAN_COUNT)).await?;
            found.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        found.sort();
        found.dedup();
        filter_keys(mask, found)
    }

    /// Store in-process and write through with `ttl`. Returns whether the
    /// remote write succeeded; `false` without a client.
    pub async fn push(&self, key: &str, value: Json, ttl: u64) -> Result<bool> {
        let stored = self.redis_push(key, &value, ttl).await?;
        self.store(key, value, Origin::Direct);
        Ok(stored)
    }

    /// Set an integer flag remotely, by default for a full day
    pub async fn raise_flag(&self, flag: &str, value: i64, ttl: Option<u64>) -> Result<bool> {
        let ttl = ttl.unwrap_or(crate::ttl::FULL_DAY);
        self.redis_push(flag, &Json::from(value), ttl).await
    }

    /// `if_present` when the remote option exists and is truthy, otherwise
    /// `if_absent_or_zero`
    pub async fn fetch_option_bool(
        &self,
        option: &str,
        if_present: i64,
        if_absent_or_zero: i64,
    ) -> Result<i64> {
        if option.is_empty() || !self.redis_check(option).await? {
            return Ok(if_absent_or_zero);
        }
        match self.redis_fetch(option).await? {
            Some(value) if truthy(&value) => Ok(if_present),
            _ => Ok(if_absent_or_zero),
        }
    }
}
