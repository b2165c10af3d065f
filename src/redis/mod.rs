//! Redis protocol client
//!
//! A hand-rolled RESP client: [`protocol`] frames bytes, [`commands`] maps
//! operations to wire commands and replies to values, [`transport`] owns the
//! socket, and [`client::RedisClient`] ties them together with pipelining,
//! transactions and subscriptions.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod client;
pub mod commands;
pub mod pipeline;
pub mod protocol;
pub mod pubsub;
pub mod transport;

pub use client::{RedisClient, RedisClientConfig};
pub use commands::{
    Aggregate, CommandRenamer, Expiry, Op, RangeOptions, RenameStrategy, Request, SetCondition,
    SetOptions, Shape, ToArgs,
};
pub use pipeline::{BatchResult, Failed, Pending, Response};
pub use protocol::{Command, Reply, RespCodec};
pub use pubsub::{PubSubMessage, SubscriptionControl};
pub use transport::{Endpoint, Scheme, Transport};

/// Key type names reported by TYPE
pub mod key_type {
    /// String value
    pub const STRING: &str = "string";
    /// List value
    pub const LIST: &str = "list";
    /// Set value
    pub const SET: &str = "set";
    /// Sorted set value
    pub const ZSET: &str = "zset";
    /// Hash value
    pub const HASH: &str = "hash";
    /// Key does not exist
    pub const NONE: &str = "none";
}

/// What the client is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No socket open
    Disconnected,
    /// Socket open, commands run immediately
    Connected,
    /// Commands are buffered until exec
    Pipelining,
    /// Buffered commands will run as one transaction
    Multi,
    /// Inside a subscription loop
    Subscribed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Pipelining => write!(f, "pipelining"),
            ConnectionState::Multi => write!(f, "multi"),
            ConnectionState::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Client statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    /// Commands written to the socket
    pub commands_sent: u64,
    /// Replies read from the socket
    pub replies_read: u64,
    /// Error replies received
    pub error_replies: u64,
    /// Successful connects
    pub connects: u64,
    /// Reconnects after a stale or lost connection
    pub reconnects: u64,
    /// Failed connect attempts (after retries)
    pub connect_failures: u64,
    /// Last error
    pub last_error: Option<String>,
    /// When the current connection was opened
    pub connected_at: Option<DateTime<Utc>>,
    /// Last read or write
    pub last_activity: Option<DateTime<Utc>>,
}

impl ClientStats {
    /// Record written commands
    pub fn record_sent(&mut self, count: usize) {
        self.commands_sent += count as u64;
        self.last_activity = Some(Utc::now());
    }

    /// Record a read reply
    pub fn record_reply(&mut self, is_error: bool) {
        self.replies_read += 1;
        if is_error {
            self.error_replies += 1;
        }
        self.last_activity = Some(Utc::now());
    }

    /// Record a successful connect
    pub fn record_connect(&mut self, reconnect: bool) {
        self.connects += 1;
        if reconnect {
            self.reconnects += 1;
        }
        self.connected_at = Some(Utc::now());
    }

    /// Record an error
    pub fn record_error(&mut self, error: &crate::error::CacheError) {
        if matches!(error, crate::error::CacheError::ConnectFailed { .. }) {
            self.connect_failures += 1;
        }
        self.last_error = Some(error.to_string());
    }

    /// Commands per reply ratio; 1.0 means every command was answered
    pub fn reply_ratio(&self) -> f64 {
        if self.commands_sent == 0 {
            return 1.0;
        }
        self.replies_read as f64 / self.commands_sent as f64
    }
}
