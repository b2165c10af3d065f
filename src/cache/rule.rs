//! Rules and their evaluation
//!
//! A rule names a cache entry and says how to populate it. Evaluation
//! follows a fixed order:
//!
//! 1. a value already present in Redis wins and is loaded as is
//! 2. a disabled rule leaves the entry untouched
//! 3. an empty action stores `null`
//! 4. otherwise the action runs (query, callback or literal) and its result
//!    is stored and written through with the rule's TTL

use super::{CacheRepository, Origin};
use crate::error::{CacheError, Result};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// A callback producing a rule's value from its parameters
pub type Callback = Arc<dyn Fn(&[Json]) -> Result<Json> + Send + Sync>;

/// How a rule produces its value
#[derive(Clone)]
pub enum RuleAction {
    /// Run a query through the repository's executor; the value is every row
    Query(String),
    /// Call a function value with parameters
    Invoke {
        /// Function to call
        callback: Callback,
        /// Parameters passed to it
        params: Vec<Json>,
    },
    /// Call a callback registered on the repository by name
    Registered {
        /// Registered name
        handler: String,
        /// Parameters passed to it
        params: Vec<Json>,
    },
    /// Literal value
    Raw(Json),
    /// No action
    None,
}

impl RuleAction {
    /// Whether there is nothing to evaluate
    pub fn is_empty(&self) -> bool {
        match self {
            RuleAction::None => true,
            RuleAction::Query(query) => query.trim().is_empty(),
            RuleAction::Raw(value) => match value {
                Json::Null => true,
                Json::String(s) => s.is_empty(),
                Json::Array(items) => items.is_empty(),
                Json::Object(map) => map.is_empty(),
                _ => false,
            },
            RuleAction::Invoke { .. } | RuleAction::Registered { .. } => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RuleAction::Query(_) => "sql",
            RuleAction::Invoke { .. } | RuleAction::Registered { .. } => "callback",
            RuleAction::Raw(_) => "raw",
            RuleAction::None => "none",
        }
    }
}

impl fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Query(query) => f.debug_tuple("Query").field(query).finish(),
            RuleAction::Invoke { params, .. } => f
                .debug_struct("Invoke")
                .field("callback", &"<fn>")
                .field("params", params)
                .finish(),
            RuleAction::Registered { handler, params } => f
                .debug_struct("Registered")
                .field("handler", handler)
                .field("params", params)
                .finish(),
            RuleAction::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            RuleAction::None => f.write_str("None"),
        }
    }
}

/// A named cache rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Cache key
    pub name: String,
    /// Disabled rules are never evaluated
    pub enabled: bool,
    /// Remote expiry in seconds, 0 for none
    pub ttl: u64,
    /// Value source
    pub action: RuleAction,
}

impl Rule {
    /// Rule with an explicit action, enabled and without expiry
    pub fn new(name: impl Into<String>, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ttl: 0,
            action,
        }
    }

    /// Rule backed by a query
    pub fn query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(name, RuleAction::Query(query.into()))
    }

    /// Rule backed by a closure
    pub fn invoke<F>(name: impl Into<String>, callback: F, params: Vec<Json>) -> Self
    where
        F: Fn(&[Json]) -> Result<Json> + Send + Sync + 'static,
    {
        Self::new(
            name,
            RuleAction::Invoke {
                callback: Arc::new(callback),
                params,
            },
        )
    }

    /// Rule backed by a registered callback
    pub fn registered(name: impl Into<String>, handler: impl Into<String>, params: Vec<Json>) -> Self {
        Self::new(
            name,
            RuleAction::Registered {
                handler: handler.into(),
                params,
            },
        )
    }

    /// Rule with a literal value
    pub fn raw(name: impl Into<String>, value: Json) -> Self {
        Self::new(name, RuleAction::Raw(value))
    }

    /// Set the remote expiry
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable the rule
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// How a rule evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    /// Loaded from Redis without evaluating
    RemoteHit,
    /// Rule disabled, entry untouched
    Disabled,
    /// Empty action, `null` stored
    EmptyAction,
    /// Query rule without an executor, `null` stored
    NoExecutor,
    /// Query evaluated
    Sql,
    /// Callback evaluated
    Callback,
    /// Literal stored
    Raw,
}

/// Result of [`CacheRepository::add_rule`]
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Rule name
    pub rule: String,
    /// How evaluation ended
    pub status: RuleStatus,
    /// Human-readable summary, also logged
    pub message: String,
    /// Value now cached, `Null` when the entry was not touched
    pub value: Json,
    /// Whether the write-through succeeded; `None` when nothing was written
    pub stored_remotely: Option<bool>,
}

impl RuleOutcome {
    /// Whether the rule could not be evaluated
    pub fn is_error(&self) -> bool {
        self.status == RuleStatus::NoExecutor
    }

    fn new(rule: &Rule, status: RuleStatus, message: String, value: Json) -> Self {
        tracing::info!("{}", message);
        Self {
            rule: rule.name.clone(),
            status,
            message,
            value,
            stored_remotely: None,
        }
    }
}

impl CacheRepository {
    /// Evaluate a rule and cache its value
    pub async fn add_rule(&self, rule: Rule) -> Result<RuleOutcome> {
        if self.is_connected() && self.redis_check(&rule.name).await? {
            if let Some(value) = self.redis_fetch(&rule.name).await? {
                self.store(&rule.name, value.clone(), Origin::Remote);
                let message = format!("Rule {}: loaded from Redis", rule.name);
                return Ok(RuleOutcome::new(&rule, RuleStatus::RemoteHit, message, value));
            }
        }

        if !rule.enabled {
            let message = format!("Rule {}: disabled", rule.name);
            return Ok(RuleOutcome::new(&rule, RuleStatus::Disabled, message, Json::Null));
        }

        if rule.action.is_empty() {
            self.store(&rule.name, Json::Null, Origin::Empty);
            let message = format!("Rule {}: empty {} action", rule.name, rule.action.kind());
            return Ok(RuleOutcome::new(&rule, RuleStatus::EmptyAction, message, Json::Null));
        }

        let (value, origin, status) = match &rule.action {
            RuleAction::Query(query) => {
                let executor = match &self.executor {
                    Some(executor) => executor.clone(),
                    None => {
                        self.store(&rule.name, Json::Null, Origin::Empty);
                        let message = format!("Rule {}: no query executor configured", rule.name);
                        return Ok(RuleOutcome::new(&rule, RuleStatus::NoExecutor, message, Json::Null));
                    }
                };
                let rows = executor
                    .fetch_all(query)
                    .await
                    .map_err(|e| CacheError::database_error(&rule.name, e.code, e.message))?;
                let rows = rows.into_iter().map(Json::Object).collect();
                (Json::Array(rows), Origin::Sql, RuleStatus::Sql)
            }
            RuleAction::Invoke { callback, params } => {
                (callback(params.as_slice())?, Origin::Callback, RuleStatus::Callback)
            }
            RuleAction::Registered { handler, params } => {
                let callback = self.resolve_callback(&rule.name, handler)?;
                (callback(params.as_slice())?, Origin::Callback, RuleStatus::Callback)
            }
            RuleAction::Raw(value) => (value.clone(), Origin::Raw, RuleStatus::Raw),
            RuleAction::None => (Json::Null, Origin::Empty, RuleStatus::EmptyAction),
        };

        self.store(&rule.name, value.clone(), origin);
        let stored = if self.is_connected() {
            Some(self.redis_push(&rule.name, &value, rule.ttl).await?)
        } else {
            None
        };

        let message = match stored {
            Some(true) => format!("Rule {}: {} value cached and stored in Redis", rule.name, origin),
            Some(false) => format!("Rule {}: {} value cached, Redis write failed", rule.name, origin),
            None => format!("Rule {}: {} value cached in-process", rule.name, origin),
        };
        let mut outcome = RuleOutcome::new(&rule, status, message, value);
        outcome.stored_remotely = stored;
        Ok(outcome)
    }

    fn resolve_callback(&self, rule: &str, handler: &str) -> Result<Callback> {
        if handler.trim().is_empty() {
            return Err(CacheError::callback_error(format!(
                "Rule {} has a blank callback handler",
                rule
            )));
        }
        self.callbacks.read().get(handler).cloned().ok_or_else(|| {
            CacheError::callback_error(format!(
                "Callback {} for rule {} is not registered",
                handler, rule
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DatabaseError, QueryExecutor, Row, StaticExecutor};
    use crate::testing::FakeRedis;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingExecutor;

    #[async_trait]
    impl QueryExecutor for FailingExecutor {
        async fn fetch_all(&self, _query: &str) -> std::result::Result<Vec<Row>, DatabaseError> {
            Err(DatabaseError::new(Some("08006".into()), "connection refused"))
        }
    }

    #[test]
    fn test_empty_actions() {
        assert!(RuleAction::None.is_empty());
        assert!(RuleAction::Query("  ".into()).is_empty());
        assert!(RuleAction::Raw(json!(null)).is_empty());
        assert!(RuleAction::Raw(json!("")).is_empty());
        assert!(RuleAction::Raw(json!([])).is_empty());
        assert!(!RuleAction::Raw(json!(0)).is_empty());
        assert!(!RuleAction::Raw(json!(false)).is_empty());
        assert!(!Rule::registered("r", "", vec![]).action.is_empty());
    }

    #[tokio::test]
    async fn test_cold_start_raw_without_store() {
        let repo = CacheRepository::new();
        let outcome = repo.add_rule(Rule::raw("x", json!(42))).await.unwrap();
        assert_eq!(outcome.status, RuleStatus::Raw);
        assert_eq!(outcome.stored_remotely, None);
        assert_eq!(repo.get("x", json!(null)), json!(42));
        assert_eq!(repo.lookup("x").unwrap().origin, Origin::Raw);
    }

    #[tokio::test]
    async fn test_remote_hit_skips_query() {
        let server = FakeRedis::start().await;
        let repo = server
            .repository()
            .with_executor(Arc::new(FailingExecutor));
        repo.redis_push_raw("y", "7", 0).await.unwrap();

        let outcome = repo.add_rule(Rule::query("y", "SELECT 1")).await.unwrap();
        assert_eq!(outcome.status, RuleStatus::RemoteHit);
        assert_eq!(repo.get("y", json!(null)), json!(7));
        assert_eq!(repo.lookup("y").unwrap().origin, Origin::Remote);
    }

    #[tokio::test]
    async fn test_remote_hit_wins_over_disabled() {
        let server = FakeRedis::start().await;
        let repo = server.repository();
        repo.redis_push("flagged", &json!({"on": true}), 0).await.unwrap();

        let outcome = repo
            .add_rule(Rule::raw("flagged", json!(1)).enabled(false))
            .await
            .unwrap();
        assert_eq!(outcome.status, RuleStatus::RemoteHit);
        assert_eq!(repo.get("flagged", json!(null)), json!({"on": true}));
    }

    #[tokio::test]
    async fn test_remote_hit_never_calls_callback() {
        let server = FakeRedis::start().await;
        let repo = server.repository();
        repo.redis_push("seeded", &json!("v"), 0).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let rule = Rule::invoke(
            "seeded",
            move |_: &[Json]| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(json!("fresh"))
            },
            vec![],
        );
        repo.add_rule(rule).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(repo.get("seeded", json!(null)), json!("v"));
    }

    #[tokio::test]
    async fn test_disabled_rule_leaves_entry_untouched() {
        let repo = CacheRepository::new();
        let outcome = repo
            .add_rule(Rule::raw("z", json!(1)).enabled(false))
            .await
            .unwrap();
        assert_eq!(outcome.status, RuleStatus::Disabled);
        assert!(!repo.check("z"));

        repo.set("z", json!("old"));
        repo.add_rule(Rule::raw("z", json!(1)).enabled(false))
            .await
            .unwrap();
        assert_eq!(repo.get("z", json!(null)), json!("old"));
    }

    #[tokio::test]
    async fn test_empty_action_stores_null() {
        let server = FakeRedis::start().await;
        let repo = server.repository();
        let outcome = repo
            .add_rule(Rule::new("blank", RuleAction::None))
            .await
            .unwrap();
        assert_eq!(outcome.status, RuleStatus::EmptyAction);
        assert!(repo.check("blank"));
        assert_eq!(repo.get("blank", json!("default")), json!(null));
        assert!(!repo.redis_check("blank").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_without_executor() {
        let repo = CacheRepository::new();
        let outcome = repo.add_rule(Rule::query("q", "SELECT 1")).await.unwrap();
        assert!(outcome.is_error());
        assert!(repo.check("q"));
        assert_eq!(repo.get("q", json!(1)), json!(null));
    }

    #[tokio::test]
    async fn test_query_rows_are_cached_and_written_through() {
        let server = FakeRedis::start().await;
        let rows = vec![
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
        ]
        .into_iter()
        .filter_map(|v| match v {
            Json::Object(map) => Some(map),
            _ => None,
        })
        .collect();
        let executor = StaticExecutor::new().with_rows("SELECT * FROM t", rows);
        let repo = server.repository().with_executor(Arc::new(executor));

        let outcome = repo
            .add_rule(Rule::query("rows", "SELECT * FROM t"))
            .await
            .unwrap();
        assert_eq!(outcome.status, RuleStatus::Sql);
        assert_eq!(outcome.stored_remotely, Some(true));

        let expected = json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]);
        assert_eq!(repo.get("rows", json!(null)), expected);
        assert_eq!(repo.redis_fetch("rows").await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        let repo = CacheRepository::new().with_executor(Arc::new(FailingExecutor));
        let err = repo.add_rule(Rule::query("q", "SELECT 1")).await.unwrap_err();
        match err {
            CacheError::Database { rule, code, message } => {
                assert_eq!(rule, "q");
                assert_eq!(code.as_deref(), Some("08006"));
                assert_eq!(message, "connection refused");
            }
            other => panic!("Expected a database error, got {:?}", other),
        }
        assert!(!repo.check("q"));
    }

    #[tokio::test]
    async fn test_callbacks() {
        let repo = CacheRepository::new();
        let sum = Rule::invoke(
            "sum",
            |params: &[Json]| Ok(json!(params.iter().filter_map(Json::as_i64).sum::<i64>())),
            vec![json!(1), json!(2), json!(3)],
        );
        repo.add_rule(sum).await.unwrap();
        assert_eq!(repo.get("sum", json!(null)), json!(6));

        repo.register_callback("greet", |params: &[Json]| {
            Ok(json!(format!("hello {}", params[0].as_str().unwrap_or("?"))))
        });
        let outcome = repo
            .add_rule(Rule::registered("greeting", "greet", vec![json!("bob")]))
            .await
            .unwrap();
        assert_eq!(outcome.status, RuleStatus::Callback);
        assert_eq!(repo.get("greeting", json!(null)), json!("hello bob"));
        assert_eq!(repo.lookup("greeting").unwrap().origin, Origin::Callback);
    }

    #[tokio::test]
    async fn test_callback_resolution_errors() {
        let repo = CacheRepository::new();
        let missing = repo
            .add_rule(Rule::registered("r", "nope", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(missing, CacheError::Callback(_)));

        let blank = repo
            .add_rule(Rule::registered("r", " ", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(blank, CacheError::Callback(_)));

        let failing = Rule::invoke(
            "r",
            |_: &[Json]| Err(CacheError::callback_error("boom")),
            vec![],
        );
        assert!(repo.add_rule(failing).await.is_err());
        assert!(!repo.check("r"));
    }

    #[tokio::test]
    async fn test_rule_ttl() {
        let server = FakeRedis::start().await;
        let repo = server.repository();
        repo.add_rule(Rule::raw("forever", json!("a"))).await.unwrap();
        repo.add_rule(Rule::raw("brief", json!("b")).with_ttl(120))
            .await
            .unwrap();

        let (forever, brief) = repo
            .with_redis(|c| {
                Box::pin(async move { Ok((c.ttl("forever").await?, c.ttl("brief").await?)) })
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forever, crate::types::Ttl::NoExpiry);
        assert!(matches!(brief, crate::types::Ttl::Remaining(n) if n > 0 && n <= 120));
    }
}
