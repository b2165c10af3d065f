//! Publish/subscribe loop
//!
//! A subscription takes over the connection: the client reads pushed
//! messages and hands each to a callback until every channel has been
//! unsubscribed.

use crate::error::{CacheError, Result};
use crate::redis::client::RedisClient;
use crate::redis::commands::{Op, Request};
use crate::redis::protocol::Reply;
use bytes::Bytes;
use std::borrow::Cow;
use std::ops::ControlFlow;

/// A message delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Matching pattern, for pattern subscriptions
    pub pattern: Option<String>,
    /// Channel the message was published on
    pub channel: String,
    /// Message body
    pub payload: Bytes,
}

impl PubSubMessage {
    /// Payload as text, invalid UTF-8 replaced
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Handle passed to the subscription callback for changing subscriptions
#[derive(Debug, Default)]
pub struct SubscriptionControl {
    unsubscribe: Vec<String>,
    unsubscribe_all: bool,
    active: usize,
}

impl SubscriptionControl {
    /// Unsubscribe from some channels (or patterns) after this message
    pub fn unsubscribe(&mut self, names: &[&str]) {
        self.unsubscribe.extend(names.iter().map(|n| n.to_string()));
    }

    /// Unsubscribe from everything; the loop ends once the server confirms
    pub fn unsubscribe_all(&mut self) {
        self.unsubscribe_all = true;
    }

    /// Active subscriptions as last reported by the server
    pub fn active(&self) -> usize {
        self.active
    }
}

enum Frame {
    Message(PubSubMessage),
    Count(String, usize),
    Other(Reply),
}

fn text(reply: Reply) -> Option<String> {
    match reply {
        Reply::Bulk(Some(b)) => Some(String::from_utf8_lossy(&b).into_owned()),
        Reply::Status(s) => Some(s),
        _ => None,
    }
}

fn classify(reply: Reply) -> Frame {
    let items = match reply {
        Reply::Array(Some(items)) => items,
        other => return Frame::Other(other),
    };
    let kind = match items.first().cloned().and_then(text) {
        Some(kind) => kind.to_ascii_lowercase(),
        None => return Frame::Other(Reply::Array(Some(items))),
    };
    match (kind.as_str(), items.len()) {
        ("message", 3) => {
            let mut it = items.into_iter().skip(1);
            let channel = it.next().and_then(text).unwrap_or_default();
            match it.next() {
                Some(Reply::Bulk(Some(payload))) => Frame::Message(PubSubMessage {
                    pattern: None,
                    channel,
                    payload,
                }),
                _ => Frame::Other(Reply::Status(kind)),
            }
        }
        ("pmessage", 4) => {
            let mut it = items.into_iter().skip(1);
            let pattern = it.next().and_then(text);
            let channel = it.next().and_then(text).unwrap_or_default();
            match it.next() {
                Some(Reply::Bulk(Some(payload))) => Frame::Message(PubSubMessage {
                    pattern,
                    channel,
                    payload,
                }),
                _ => Frame::Other(Reply::Status(kind)),
            }
        }
        ("subscribe" | "psubscribe" | "unsubscribe" | "punsubscribe", 3) => {
            let count = match &items[2] {
                Reply::Integer(n) if *n >= 0 => Some(*n as usize),
                _ => None,
            };
            match count {
                Some(n) => Frame::Count(kind, n),
                None => Frame::Other(Reply::Array(Some(items))),
            }
        }
        _ => Frame::Other(Reply::Array(Some(items))),
    }
}

impl RedisClient {
    /// Subscribe to channels and run `callback` for each message.
    ///
    /// Returns once every channel has been unsubscribed, either through the
    /// [`SubscriptionControl`] or by returning [`ControlFlow::Break`].
    pub async fn subscribe<F>(&mut self, channels: &[&str], callback: F) -> Result<()>
    where
        F: FnMut(&PubSubMessage, &mut SubscriptionControl) -> ControlFlow<()>,
    {
        self.run_subscription(false, channels, callback).await
    }

    /// Subscribe to glob patterns and run `callback` for each message
    pub async fn psubscribe<F>(&mut self, patterns: &[&str], callback: F) -> Result<()>
    where
        F: FnMut(&PubSubMessage, &mut SubscriptionControl) -> ControlFlow<()>,
    {
        self.run_subscription(true, patterns, callback).await
    }

    async fn run_subscription<F>(&mut self, pattern: bool, names: &[&str], callback: F) -> Result<()>
    where
        F: FnMut(&PubSubMessage, &mut SubscriptionControl) -> ControlFlow<()>,
    {
        if names.is_empty() {
            return Err(CacheError::usage_error("Nothing to subscribe to"));
        }
        if self.batch.is_some() {
            return Err(CacheError::usage_error("Subscriptions cannot be pipelined"));
        }
        self.prepare(false).await?;

        let result = self.subscription_loop(pattern, names, callback).await;
        self.subscribed = false;
        if let Err(e) = &result {
            self.stats.record_error(e);
            // the server may still consider us subscribed
            self.transport.close(true);
        }
        result
    }

    async fn subscription_loop<F>(&mut self, pattern: bool, names: &[&str], mut callback: F) -> Result<()>
    where
        F: FnMut(&PubSubMessage, &mut SubscriptionControl) -> ControlFlow<()>,
    {
        let (sub, unsub) = if pattern {
            (Op::Psubscribe, Op::Punsubscribe)
        } else {
            (Op::Subscribe, Op::Unsubscribe)
        };

        let command = self.wire(&Request::new(sub).arg(names));
        self.write(std::slice::from_ref(&command)).await?;

        let mut active = 0;
        for _ in names {
            match classify(self.read_reply().await?) {
                Frame::Count(kind, n) if kind == sub.wire_name().to_ascii_lowercase() && n > 0 => {
                    active = n
                }
                _ => {
                    return Err(CacheError::protocol_error(
                        "subscribe",
                        "Invalid subscribe response.",
                    ))
                }
            }
        }
        self.subscribed = true;
        tracing::debug!("Subscribed to {} {}", active, if pattern { "patterns" } else { "channels" });

        let mut control = SubscriptionControl {
            active,
            ..Default::default()
        };
        let mut stopping = false;

        while active > 0 {
            match classify(self.read_reply().await?) {
                Frame::Message(msg) if msg.pattern.is_some() == pattern => {
                    if stopping {
                        continue;
                    }
                    control.active = active;
                    let flow = callback(&msg, &mut control);
                    if flow.is_break() || control.unsubscribe_all {
                        stopping = true;
                        let command = self.wire(&Request::new(unsub));
                        self.write(std::slice::from_ref(&command)).await?;
                    } else if !control.unsubscribe.is_empty() {
                        let names = std::mem::take(&mut control.unsubscribe);
                        let command = self.wire(&Request::new(unsub).arg(names));
                        self.write(std::slice::from_ref(&command)).await?;
                    }
                }
                Frame::Count(_, n) => active = n,
                _ => {
                    return Err(CacheError::protocol_error(
                        "subscribe",
                        "Received non-message reply.",
                    ))
                }
            }
        }
        Ok(())
    }
}
