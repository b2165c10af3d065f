//! Redis Cache - A rule-driven write-through cache on top of a hand-rolled Redis client
//!
//! This library provides two layers:
//! - **Redis client**: A RESP client over TCP, TLS or Unix sockets with pipelining,
//!   MULTI/EXEC transactions, WATCH, SCAN cursors and publish/subscribe
//! - **Cache repository**: An in-process map of named values populated by rules
//!   (query, callback or literal), mirrored to Redis as JSON with a TTL
//!
//! # Features
//!
//! - **Async/await support**: All I/O runs on Tokio
//! - **Remote precedence**: A value already in Redis wins over re-evaluating its rule
//! - **Typed results**: Replies decode into [`types::Value`] or any [`types::FromValue`] type
//! - **Error handling**: One error type with categories and recoverability
//!
//! # Quick Start
//!
//! ## Talking to Redis
//!
//! ```rust,no_run
//! use redis_cache_rs::redis::{Op, RedisClient, RedisClientConfig, Request};
//! use redis_cache_rs::error::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = RedisClient::new(RedisClientConfig::default())?;
//!     client.connect().await?;
//!     client.set("greeting", "hello").await?;
//!     let value: Option<String> = client.get("greeting").await?;
//!     println!("{:?}", value);
//!
//!     client.multi()?;
//!     client.queue(Request::new(Op::Incr).arg("visits"))?;
//!     client.queue(Request::new(Op::Expire).arg("visits").arg(60u64))?;
//!     let results = client.exec().await?;
//!     println!("{:?}", results);
//!     Ok(())
//! }
//! ```
//!
//! ## Caching with rules
//!
//! ```rust,no_run
//! use redis_cache_rs::cache::{CacheConfig, CacheRepository, Rule};
//! use redis_cache_rs::error::Result;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let repo = CacheRepository::init(CacheConfig::default(), None).await?;
//!     repo.add_rule(Rule::raw("answer", json!(42)).with_ttl(redis_cache_rs::ttl::HOUR))
//!         .await?;
//!     assert_eq!(repo.get("answer", json!(null)), json!(42));
//!
//!     repo.add_counter("hits", 0, 0).await?;
//!     repo.incr_counter("hits", 1).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`types`]: Decoded reply values and conversions
//! - [`error`]: Error handling and result types
//! - [`utils`]: JSON encoding, key masks and parsing helpers
//! - [`redis`]: Wire protocol, transport and client
//! - [`cache`]: Cache repository, rules and counters
//! - [`query`]: Query executor capability for SQL rules

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

// Re-export commonly used types and traits
pub use error::{CacheError, Result};
pub use types::{FromValue, Ttl, Value};

// Public modules
pub mod cache;
pub mod error;
pub mod query;
pub mod redis;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get library version information
pub fn version() -> &'static str {
    VERSION
}

/// Get library name
pub fn name() -> &'static str {
    NAME
}

/// Get library description
pub fn description() -> &'static str {
    DESCRIPTION
}

/// Library configuration defaults
pub mod config {
    /// Default Redis host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default Redis port
    pub const DEFAULT_PORT: u16 = 6379;

    /// Default connection timeout
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 2.5;

    /// Default read timeout, 0 waits forever
    pub const DEFAULT_READ_TIMEOUT_SECS: f64 = 0.0;

    /// Default number of extra connection attempts
    pub const DEFAULT_MAX_CONNECT_RETRIES: u32 = 0;

    /// Default database index
    pub const DEFAULT_DATABASE: u32 = 0;
}

/// Common expiry durations in seconds
pub mod ttl {
    /// One second
    pub const SECOND: u64 = 1;

    /// One minute
    pub const MINUTE: u64 = 60 * SECOND;

    /// One hour
    pub const HOUR: u64 = 60 * MINUTE;

    /// Half a day; use [`FULL_DAY`] for 24 hours
    pub const DAY: u64 = 12 * HOUR;

    /// 24 hours
    pub const FULL_DAY: u64 = 24 * HOUR;

    /// 30 days
    pub const MONTH: u64 = 30 * FULL_DAY;

    /// 365 days
    pub const YEAR: u64 = 365 * FULL_DAY;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits

    pub use crate::cache::{
        CacheConfig, CacheEntry, CacheRepository, Origin, Rule, RuleAction, RuleOutcome,
        RuleStatus,
    };
    pub use crate::error::{CacheError, Result};
    pub use crate::query::{DatabaseError, QueryExecutor, Row};
    pub use crate::redis::{
        BatchResult, Failed, PubSubMessage, RedisClient, RedisClientConfig, Request, Response,
        SubscriptionControl,
    };
    pub use crate::types::{FromValue, Ttl, Value};
    pub use crate::utils::{decode_json, encode_json};
}

/// Initialize the library with default logging
pub fn init() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Initialize the library with custom tracing subscriber
pub fn init_with_subscriber<S>(subscriber: S) -> Result<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CacheError::config_error(format!("Failed to set tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!version().is_empty());
        assert_eq!(name(), "redis_cache_rs");
        assert!(!description().is_empty());
    }

    #[test]
    fn test_config_constants() {
        assert_eq!(config::DEFAULT_PORT, 6379);
        assert!(config::DEFAULT_CONNECT_TIMEOUT_SECS > 0.0);
        assert_eq!(config::DEFAULT_READ_TIMEOUT_SECS, 0.0);
    }

    #[test]
    fn test_ttl_constants() {
        assert_eq!(ttl::MINUTE, 60);
        assert_eq!(ttl::HOUR, 3600);
        assert_eq!(ttl::DAY, 43_200);
        assert_eq!(ttl::FULL_DAY, 86_400);
        assert_eq!(ttl::MONTH, 2_592_000);
        assert_eq!(ttl::YEAR, 31_536_000);
    }

    #[test]
    fn test_init() {
        // Test that init doesn't panic, even twice
        init();
        init();
    }
}
