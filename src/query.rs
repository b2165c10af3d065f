//! Query executor capability used by SQL rules
//!
//! The cache does not talk to a database itself. Callers plug in anything
//! that can turn a query string into rows.

use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use std::fmt;

/// One result row, column name to value
pub type Row = Map<String, Json>;

/// Failure reported by a query executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// Driver error code, if the driver has one
    pub code: Option<String>,
    /// Driver error message
    pub message: String,
}

impl DatabaseError {
    /// Create a database error
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DatabaseError {}

/// Executes a query and returns every row
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `query` and collect all rows
    async fn fetch_all(&self, query: &str) -> std::result::Result<Vec<Row>, DatabaseError>;
}

/// Executor serving canned rows per query, for tests and offline use
#[derive(Debug, Default, Clone)]
pub struct StaticExecutor {
    results: std::collections::HashMap<String, Vec<Row>>,
}

impl StaticExecutor {
    /// Create an executor with no queries
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `rows`
    pub fn with_rows(mut self, query: &str, rows: Vec<Row>) -> Self {
        self.results.insert(query.to_string(), rows);
        self
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn fetch_all(&self, query: &str) -> std::result::Result<Vec<Row>, DatabaseError> {
        self.results
            .get(query)
            .cloned()
            .ok_or_else(|| DatabaseError::new(Some("42000".into()), format!("Unknown query: {}", query)))
    }
}
