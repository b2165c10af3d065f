//! Rule-driven cache repository
//!
//! [`CacheRepository`] keeps an in-process map of named values and mirrors
//! them to Redis when a client is attached. Values are populated by rules
//! ([`rule`]), written through as JSON with a TTL, and read back from Redis
//! first on the next start.
//!
//! The in-process copy never expires on its own; only explicit calls remove
//! entries.

use crate::error::{CacheError, Result};
use crate::query::QueryExecutor;
use crate::redis::client::{RedisClient, RedisClientConfig};
use crate::utils::{filter_keys, is_mask};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

pub mod counter;
pub mod remote;
pub mod rule;

pub use rule::{Callback, Rule, RuleAction, RuleOutcome, RuleStatus};

/// Where a cached value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    /// Loaded from Redis
    Remote,
    /// Rows returned by a query
    Sql,
    /// Returned by a callback
    Callback,
    /// Literal rule payload
    Raw,
    /// Rule with an empty action
    Empty,
    /// Stored with `set` or `push`
    Direct,
    /// Counter value
    Counter,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Remote => "remote",
            Origin::Sql => "sql",
            Origin::Callback => "callback",
            Origin::Raw => "raw",
            Origin::Empty => "empty",
            Origin::Direct => "direct",
            Origin::Counter => "counter",
        };
        f.write_str(name)
    }
}

/// A cached value with its origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Cached value
    pub value: Json,
    /// Where it came from
    pub origin: Origin,
}

/// Repository configuration.
///
/// Every field has a default, so a partial JSON document only overrides
/// the fields it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Attach a Redis client at all
    pub enabled: bool,
    /// Redis host, see [`RedisClientConfig::host`]
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Connect timeout in seconds
    pub timeout: f64,
    /// Persistence identifier
    pub persistent: String,
    /// Database index
    pub database: u32,
    /// Password
    pub password: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: crate::config::DEFAULT_HOST.to_string(),
            port: crate::config::DEFAULT_PORT,
            timeout: crate::config::DEFAULT_CONNECT_TIMEOUT_SECS,
            persistent: String::new(),
            database: 0,
            password: None,
        }
    }
}

impl CacheConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Client configuration for these settings
    pub fn client_config(&self) -> Result<RedisClientConfig> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(CacheError::config_error(format!(
                "Timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }
        Ok(RedisClientConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs_f64(self.timeout),
            persistent: self.persistent.clone(),
            database: self.database,
            password: self.password.clone(),
            ..Default::default()
        })
    }
}

#[derive(Debug, Default)]
struct Entries {
    seq: u64,
    map: HashMap<String, (u64, CacheEntry)>,
}

impl Entries {
    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.map.remove(&key);
        self.seq += 1;
        self.map.insert(key, (self.seq, entry));
    }
}

/// In-process cache mirrored to Redis
pub struct CacheRepository {
    entries: Mutex<Entries>,
    redis: Option<AsyncMutex<RedisClient>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    callbacks: RwLock<HashMap<String, Callback>>,
}

impl fmt::Debug for CacheRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRepository")
            .field("entries", &self.entries.lock().map.len())
            .field("connected", &self.redis.is_some())
            .field("executor", &self.executor.is_some())
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

impl Default for CacheRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRepository {
    /// Create an in-process only repository
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            redis: None,
            executor: None,
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a repository mirrored through `client`
    pub fn with_client(client: RedisClient) -> Self {
        Self {
            redis: Some(AsyncMutex::new(client)),
            ..Self::new()
        }
    }

    /// Attach a query executor for SQL rules
    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build a repository from configuration.
    ///
    /// An unreachable Redis is not an error: it is logged and the
    /// repository runs in-process only.
    pub async fn init(config: CacheConfig, executor: Option<Arc<dyn QueryExecutor>>) -> Result<Self> {
        let mut repo = Self::new();
        repo.executor = executor;

        if !config.enabled {
            tracing::info!("Redis disabled by configuration, cache is in-process only");
            return Ok(repo);
        }

        let client_config = config.client_config()?;
        crate::redis::client::utils::validate_config(&client_config)?;
        let mut client = RedisClient::new(client_config)?;
        match client.connect().await {
            Ok(()) => {
                tracing::info!("Cache mirrored to Redis at {}", client.endpoint());
                repo.redis = Some(AsyncMutex::new(client));
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, cache is in-process only: {}", e);
            }
        }
        Ok(repo)
    }

    /// Register a named callback for [`RuleAction::Registered`] rules
    pub fn register_callback<F>(&self, name: &str, callback: F)
    where
        F: Fn(&[Json]) -> Result<Json> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .insert(name.to_string(), Arc::new(callback));
    }

    /// Whether a Redis client is attached
    pub fn is_connected(&self) -> bool {
        self.redis.is_some()
    }

    /// Run `f` with exclusive access to the Redis client; `None` when no
    /// client is attached
    pub async fn with_redis<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: for<'c> FnOnce(&'c mut RedisClient) -> BoxFuture<'c, Result<T>>,
    {
        match &self.redis {
            None => Ok(None),
            Some(client) => {
                let mut client = client.lock().await;
                f(&mut *client).await.map(Some)
            }
        }
    }

    /// Cached value for `key`, or `default`. Never touches Redis.
    pub fn get(&self, key: &str, default: Json) -> Json {
        self.entries
            .lock()
            .map
            .get(key)
            .map(|(_, entry)| entry.value.clone())
            .unwrap_or(default)
    }

    /// Cached entry for `key` with its origin
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().map.get(key).map(|(_, entry)| entry.clone())
    }

    /// Store a value in-process, replacing any previous entry
    pub fn set(&self, key: &str, value: Json) {
        self.store(key, value, Origin::Direct);
    }

    pub(crate) fn store(&self, key: &str, value: Json, origin: Origin) {
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, origin });
    }

    /// Whether `key` is cached in-process
    pub fn check(&self, key: &str) -> bool {
        self.entries.lock().map.contains_key(key)
    }

    /// Remove `key` from the in-process map only
    pub fn unset(&self, key: &str) {
        self.entries.lock().map.remove(key);
    }

    /// Cached keys, oldest insertion first
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock();
        let mut keys: Vec<(&u64, &String)> = entries.map.iter().map(|(k, (seq, _))| (seq, k)).collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k.clone()).collect()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().map.is_empty()
    }

    /// Remove a key, or every key matching a mask, in-process and
    /// optionally in Redis
    pub async fn drop(&self, key: &str, also_remote: bool) -> Result<()> {
        if !is_mask(key) {
            self.unset(key);
            if also_remote {
                self.redis_del(key).await?;
            }
            return Ok(());
        }

        let mut matched = filter_keys(key, self.keys())?;
        if also_remote {
            for remote in self.redis_keys(key).await? {
                if !matched.contains(&remote) {
                    matched.push(remote);
                }
            }
        }
        tracing::debug!("Mask {} matched {} keys", key, matched.len());

        for key in &matched {
            self.unset(key);
        }
        if also_remote && !matched.is_empty() {
            if let Some(client) = &self.redis {
                let keys: Vec<&str> = matched.iter().map(String::as_str).collect();
                client.lock().await.del(&keys).await?;
            }
        }
        Ok(())
    }

    /// Clear the in-process map and optionally flush the Redis database
    pub async fn drop_all(&self, also_remote: bool) -> Result<()> {
        *self.entries.lock() = Entries::default();
        if also_remote {
            if let Some(client) = &self.redis {
                client.lock().await.flushdb().await?;
            }
        }
        Ok(())
    }
}
