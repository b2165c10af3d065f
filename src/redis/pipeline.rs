//! Pipelines and transactions
//!
//! While a pipeline is open, requests are buffered locally and written in one
//! go by [`RedisClient::exec`]. A transaction is a pipeline with a MULTI
//! marker; commands queued before the marker run as plain pipelined
//! commands, the rest run inside MULTI/EXEC.

use crate::error::{CacheError, Result};
use crate::redis::client::RedisClient;
use crate::redis::commands::{self, Op, Request};
use crate::redis::protocol::Reply;
use crate::types::Value;

/// Placeholder for a queued request; its result is at
/// [`index`](Pending::index) in the [`BatchResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    index: usize,
}

impl Pending {
    /// Position of this request's result
    pub fn index(&self) -> usize {
        self.index
    }
}

/// An error reply for one command of a batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Failed {
    /// Error text as sent by the server
    pub message: String,
}

/// Per-command results of a batch, in queue order
pub type BatchResult = Vec<std::result::Result<Value, Failed>>;

/// Outcome of [`RedisClient::send`]
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The request ran immediately
    Value(Value),
    /// The request was buffered
    Queued(Pending),
}

impl Response {
    /// Immediate value, if the request was not queued
    pub fn into_value(self) -> Option<Value> {
        match self {
            Response::Value(v) => Some(v),
            Response::Queued(_) => None,
        }
    }

    /// Whether the request was buffered
    pub fn is_queued(&self) -> bool {
        matches!(self, Response::Queued(_))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Batch {
    /// Number of requests queued before MULTI
    multi_at: Option<usize>,
    requests: Vec<Request>,
}

impl Batch {
    pub(crate) fn is_multi(&self) -> bool {
        self.multi_at.is_some()
    }
}

impl RedisClient {
    /// Start buffering commands
    pub fn pipeline(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(CacheError::usage_error(
                "A pipeline is already in use and only one pipeline is supported.",
            ));
        }
        self.batch = Some(Batch::default());
        Ok(())
    }

    /// Start a transaction. Opens a pipeline when none is open; inside an
    /// open pipeline, commands queued from here on run inside MULTI/EXEC.
    pub fn multi(&mut self) -> Result<()> {
        match &mut self.batch {
            Some(batch) if batch.multi_at.is_some() => {
                Err(CacheError::usage_error("MULTI calls can not be nested"))
            }
            Some(batch) => {
                batch.multi_at = Some(batch.requests.len());
                Ok(())
            }
            None => {
                self.batch = Some(Batch {
                    multi_at: Some(0),
                    requests: Vec::new(),
                });
                Ok(())
            }
        }
    }

    /// Buffer a request in the open pipeline
    pub fn queue(&mut self, req: Request) -> Result<Pending> {
        let batch = self.batch.as_mut().ok_or_else(|| {
            CacheError::usage_error("No pipeline is open; call pipeline() or multi() first")
        })?;
        match req.op() {
            Some(Op::Multi) => {
                return Err(CacheError::usage_error("Use multi() to start a transaction"))
            }
            Some(Op::Watch) => {
                return Err(CacheError::usage_error("WATCH inside MULTI is not allowed"))
            }
            Some(Op::Exec) | Some(Op::Discard) => {
                return Err(CacheError::usage_error(format!(
                    "Use {}() to finish the pipeline",
                    req.name().to_ascii_lowercase()
                )))
            }
            Some(Op::Subscribe) | Some(Op::Psubscribe) => {
                return Err(CacheError::usage_error("Subscriptions cannot be pipelined"))
            }
            _ => {}
        }
        batch.requests.push(req);
        Ok(Pending {
            index: batch.requests.len() - 1,
        })
    }

    /// Send every buffered command and return one result per command.
    ///
    /// Error replies become [`Failed`] entries. A transaction aborted by a
    /// modified watched key fails as a whole with [`CacheError::Aborted`].
    pub async fn exec(&mut self) -> Result<BatchResult> {
        let batch = self
            .batch
            .take()
            .ok_or_else(|| CacheError::usage_error("EXEC without MULTI or pipeline"))?;
        let result = self.run_batch(&batch).await;
        if batch.is_multi() {
            self.watching = false;
        }
        if let Err(e) = &result {
            self.stats.record_error(e);
        }
        result
    }

    /// Drop the buffered commands. Cancels WATCH when a transaction was open.
    pub async fn discard(&mut self) -> Result<()> {
        let batch = self
            .batch
            .take()
            .ok_or_else(|| CacheError::usage_error("DISCARD without MULTI or pipeline"))?;
        tracing::debug!("Discarding {} buffered commands", batch.requests.len());
        if batch.is_multi() && self.watching {
            self.call(Request::new(Op::Unwatch)).await?;
        }
        Ok(())
    }

    /// WATCH keys for the next transaction
    pub async fn watch(&mut self, keys: &[&str]) -> Result<()> {
        if self.batch.is_some() {
            return Err(CacheError::usage_error("WATCH inside MULTI is not allowed"));
        }
        self.call(Request::new(Op::Watch).arg(keys)).await?;
        Ok(())
    }

    /// UNWATCH
    pub async fn unwatch(&mut self) -> Result<()> {
        self.call(Request::new(Op::Unwatch)).await?;
        Ok(())
    }

    async fn run_batch(&mut self, batch: &Batch) -> Result<BatchResult> {
        if batch.requests.is_empty() && !batch.is_multi() {
            return Ok(Vec::new());
        }
        self.prepare(batch.is_multi()).await?;

        let split = batch.multi_at.unwrap_or(batch.requests.len());
        let mut wire = Vec::with_capacity(batch.requests.len() + 2);
        for req in &batch.requests[..split] {
            wire.push(self.wire(req));
        }
        if batch.is_multi() {
            wire.push(self.wire(&Request::new(Op::Multi)));
            for req in &batch.requests[split..] {
                wire.push(self.wire(req));
            }
            wire.push(self.wire(&Request::new(Op::Exec)));
        }

        tracing::debug!("> pipeline of {} commands", wire.len());
        self.write(&wire).await?;

        // read everything first so a bad reply cannot desync the stream
        let mut replies = Vec::with_capacity(wire.len());
        for _ in 0..wire.len() {
            replies.push(self.read_reply().await?);
        }
        let mut replies = replies.into_iter();
        let mut next = move || {
            replies
                .next()
                .ok_or_else(|| CacheError::protocol_error("exec", "Missing pipeline reply"))
        };

        let mut results = Vec::with_capacity(batch.requests.len());
        for req in &batch.requests[..split] {
            results.push(settle(req, next()?)?);
        }
        if !batch.is_multi() {
            return Ok(results);
        }

        if let Reply::Error(message) = next()? {
            return Err(CacheError::remote_error(message));
        }

        let tx = &batch.requests[split..];
        let mut tx_results: Vec<Option<std::result::Result<Value, Failed>>> = vec![None; tx.len()];
        let mut queued = Vec::with_capacity(tx.len());
        for (i, req) in tx.iter().enumerate() {
            let reply = next()?;
            if reply.is_queued() {
                queued.push(i);
            } else {
                tx_results[i] = Some(settle(req, reply)?);
            }
        }

        match next()? {
            Reply::Array(None) => {
                return Err(CacheError::Aborted(
                    "a watched key was modified".into(),
                ))
            }
            Reply::Error(message) => return Err(CacheError::remote_error(message)),
            Reply::Array(Some(items)) => {
                if items.len() != queued.len() {
                    return Err(CacheError::protocol_error(
                        "exec",
                        format!(
                            "EXEC returned {} replies for {} queued commands",
                            items.len(),
                            queued.len()
                        ),
                    ));
                }
                for (i, item) in queued.into_iter().zip(items) {
                    tx_results[i] = Some(settle(&tx[i], item)?);
                }
            }
            other => {
                return Err(CacheError::protocol_error(
                    "exec",
                    format!("Expected array reply, got {}", other.type_name()),
                ))
            }
        }

        results.extend(tx_results.into_iter().map(|r| {
            r.unwrap_or_else(|| {
                Err(Failed {
                    message: "No reply for queued command".into(),
                })
            })
        }));
        Ok(results)
    }
}

/// Shape one batched reply, keeping error replies as [`Failed`]
fn settle(req: &Request, reply: Reply) -> Result<std::result::Result<Value, Failed>> {
    match reply {
        Reply::Error(message) if req.is(Op::Evalsha) && message.starts_with("NOSCRIPT") => {
            Ok(Ok(Value::Nil))
        }
        Reply::Error(message) => Ok(Err(Failed { message })),
        other => Ok(Ok(commands::decode(req.shape(), other)?)),
    }
}
