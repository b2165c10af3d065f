//! Error types for the Redis cache library

use std::fmt;
use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, CacheError>;

/// Main error type for the Redis cache library
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connecting failed after the configured number of retries
    #[error("Connection to Redis {endpoint} failed after {failures} failures. Last Error : {last_error}")]
    ConnectFailed {
        /// Endpoint that was dialled
        endpoint: String,
        /// Number of failed attempts
        failures: u32,
        /// Last low-level error text
        last_error: String,
    },

    /// Read timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Connection dropped by the peer
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Protocol errors
    #[error("Protocol error in {context}: {message}")]
    Protocol {
        /// Error context
        context: String,
        /// Error message
        message: String,
    },

    /// Error reply sent by the store
    #[error("{message}")]
    Remote {
        /// Message as sent by the store
        message: String,
        /// Disconnection code, if the message reports a lost connection
        code: Option<ErrorCode>,
    },

    /// EXEC returned a null reply because a watched key changed
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// Query executor failure while evaluating a rule
    #[error("Rule [{rule}] throws database error: {message}")]
    Database {
        /// Rule being evaluated
        rule: String,
        /// Driver error code, if any
        code: Option<String>,
        /// Driver error message
        message: String,
    },

    /// Callback could not be resolved or failed
    #[error("Callback error: {0}")]
    Callback(String),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// API misuse, e.g. opening a second pipeline
    #[error("Usage error: {0}")]
    Usage(String),
}

/// Numeric codes attached to connection-loss errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A read did not complete before the read timeout
    TimedOut = 1,
    /// The connection was lost
    Disconnected = 2,
}

impl CacheError {
    /// Create a protocol error
    pub fn protocol_error(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a timeout error
    pub fn timeout_error(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a disconnection error
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected(message.into())
    }

    /// Wrap an error reply from the store, tagging lost-connection messages
    pub fn remote_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = if message.starts_with("read error on connection")
            || message.contains("Connection lost")
        {
            Some(ErrorCode::Disconnected)
        } else {
            None
        };
        Self::Remote { message, code }
    }

    /// Create a database error for a rule
    pub fn database_error(
        rule: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Database {
            rule: rule.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a callback error
    pub fn callback_error(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a usage error
    pub fn usage_error(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Numeric code of the error, for connection losses
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Timeout(_) => Some(ErrorCode::TimedOut),
            Self::Disconnected(_) => Some(ErrorCode::Disconnected),
            Self::Remote { code, .. } => *code,
            _ => None,
        }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::ConnectFailed { .. } => true,
            Self::Timeout(_) => true,
            Self::Disconnected(_) => true,
            Self::Protocol { .. } => false,
            Self::Remote { code, .. } => code.is_some(),
            Self::Aborted(_) => true,
            Self::Database { .. } => false,
            Self::Callback(_) => false,
            Self::Json(_) => false,
            Self::Io(_) => true,
            Self::Config(_) => false,
            Self::Usage(_) => false,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection(_)
            | Self::ConnectFailed { .. }
            | Self::Timeout(_)
            | Self::Disconnected(_) => ErrorCategory::Network,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::Remote { .. } | Self::Aborted(_) => ErrorCategory::Remote,
            Self::Database { .. } => ErrorCategory::Database,
            Self::Callback(_) => ErrorCategory::Callback,
            Self::Json(_) => ErrorCategory::Encoding,
            Self::Io(_) => ErrorCategory::Io,
            Self::Config(_) => ErrorCategory::Config,
            Self::Usage(_) => ErrorCategory::Usage,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, timeout or disconnection
    Network,
    /// Malformed or unexpected wire data
    Protocol,
    /// Error reply from the store
    Remote,
    /// Query executor failure
    Database,
    /// Callback resolution failure
    Callback,
    /// JSON encoding failure
    Encoding,
    /// I/O error
    Io,
    /// Configuration error
    Config,
    /// API misuse
    Usage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Protocol => write!(f, "protocol"),
            Self::Remote => write!(f, "remote"),
            Self::Database => write!(f, "database"),
            Self::Callback => write!(f, "callback"),
            Self::Encoding => write!(f, "encoding"),
            Self::Io => write!(f, "io"),
            Self::Config => write!(f, "config"),
            Self::Usage => write!(f, "usage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CacheError::protocol_error("hmget", "length mismatch");
        assert!(matches!(err, CacheError::Protocol { .. }));
        assert_eq!(err.to_string(), "Protocol error in hmget: length mismatch");
    }

    #[test]
    fn test_remote_error_codes() {
        let err = CacheError::remote_error("read error on connection to 127.0.0.1:6379");
        assert_eq!(err.code(), Some(ErrorCode::Disconnected));

        let err = CacheError::remote_error("ERR unknown command 'FOO'");
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "ERR unknown command 'FOO'");
    }

    #[test]
    fn test_connection_codes() {
        assert_eq!(CacheError::timeout_error("x").code(), Some(ErrorCode::TimedOut));
        assert_eq!(CacheError::disconnected("x").code(), Some(ErrorCode::Disconnected));
        assert_eq!(ErrorCode::Disconnected as i32, 2);
    }

    #[test]
    fn test_error_category() {
        let err = CacheError::database_error("districts", Some("42S02".into()), "no such table");
        assert_eq!(err.category(), ErrorCategory::Database);
        assert_eq!(err.category().to_string(), "database");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_connect_failed_message() {
        let err = CacheError::ConnectFailed {
            endpoint: "127.0.0.1:1".into(),
            failures: 3,
            last_error: "connection refused".into(),
        };
        let text = err.to_string();
        assert!(text.contains("after 3 failures"));
        assert!(text.contains("connection refused"));
        assert!(err.is_recoverable());
    }
}
