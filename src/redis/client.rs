//! Redis protocol client implementation
//!
//! [`RedisClient`] owns one connection. Every method takes `&mut self`, so a
//! client has at most one round trip in flight and replies arrive in the
//! order commands were sent. The connection is opened lazily on first use.

use crate::error::{CacheError, ErrorCode, Result};
use crate::redis::commands::{
    self, Aggregate, CommandRenamer, Op, RangeOptions, RenameStrategy, Request, SetOptions,
    ToArgs,
};
use crate::redis::pipeline::{Batch, Response};
use crate::redis::protocol::{Command, Reply};
use crate::redis::transport::{Endpoint, Transport};
use crate::redis::{ClientStats, ConnectionState};
use crate::types::{FromValue, Ttl, Value};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisClientConfig {
    /// Host, `scheme://host[:port][/persistent]`, `unix:///path` or a
    /// socket path
    pub host: String,
    /// Port used when the host string does not name one
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout in seconds; 0 or -1 disables it
    pub read_timeout: f64,
    /// Persistence identifier; non-empty keeps the connection open across
    /// non-forced closes
    pub persistent: String,
    /// Database selected after connecting
    pub database: u32,
    /// Password sent with AUTH after connecting
    pub password: Option<String>,
    /// Extra connect attempts after the first failure
    pub max_connect_retries: u32,
    /// Command renaming for servers with renamed commands
    pub rename: Option<RenameStrategy>,
}

impl Default for RedisClientConfig {
    fn default() -> Self {
        Self {
            host: crate::config::DEFAULT_HOST.to_string(),
            port: crate::config::DEFAULT_PORT,
            connect_timeout: Duration::from_secs_f64(crate::config::DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: crate::config::DEFAULT_READ_TIMEOUT_SECS,
            persistent: String::new(),
            database: crate::config::DEFAULT_DATABASE,
            password: None,
            max_connect_retries: crate::config::DEFAULT_MAX_CONNECT_RETRIES,
            rename: None,
        }
    }
}

/// Redis protocol client
#[derive(Debug)]
pub struct RedisClient {
    /// Client configuration
    pub(super) config: RedisClientConfig,
    /// Socket owner
    pub(super) transport: Transport,
    /// Command name rewriting
    pub(super) renamer: CommandRenamer,
    /// Open pipeline, if any
    pub(super) batch: Option<Batch>,
    /// WATCH is active
    pub(super) watching: bool,
    /// Inside a subscription loop
    pub(super) subscribed: bool,
    /// Password replayed on reconnect
    pub(super) password: Option<String>,
    /// Database replayed on reconnect
    pub(super) database: u32,
    /// Requests sent since the client was created
    pub(super) requests: u64,
    /// Statistics
    pub(super) stats: ClientStats,
}

impl RedisClient {
    /// Create a client; no connection is made until the first command
    pub fn new(config: RedisClientConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(&config.host, config.port, &config.persistent)?;
        let mut transport = Transport::new(endpoint, config.connect_timeout);
        transport.set_read_timeout(config.read_timeout)?;
        transport.set_max_connect_retries(config.max_connect_retries);

        Ok(Self {
            renamer: CommandRenamer::new(config.rename.clone()),
            password: config.password.clone(),
            database: config.database,
            config,
            transport,
            batch: None,
            watching: false,
            subscribed: false,
            requests: 0,
            stats: ClientStats::default(),
        })
    }

    /// Host name or socket path
    pub fn host(&self) -> &str {
        &self.transport.endpoint().host
    }

    /// Port, `None` for Unix sockets
    pub fn port(&self) -> Option<u16> {
        self.transport.endpoint().port
    }

    /// Currently selected database
    pub fn database(&self) -> u32 {
        self.database
    }

    /// Persistence identifier
    pub fn persistence(&self) -> &str {
        &self.transport.endpoint().persistent
    }

    /// Parsed endpoint
    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    /// Configuration the client was built from
    pub fn config(&self) -> &RedisClientConfig {
        &self.config
    }

    /// Whether a socket is open
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Whether a subscription loop is running
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Whether commands are being buffered
    pub fn is_pipelining(&self) -> bool {
        self.batch.is_some()
    }

    /// Whether the open pipeline is a transaction
    pub fn is_multi(&self) -> bool {
        self.batch.as_ref().map_or(false, |b| b.is_multi())
    }

    /// Whether WATCH is active
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        if self.subscribed {
            ConnectionState::Subscribed
        } else if self.is_multi() {
            ConnectionState::Multi
        } else if self.batch.is_some() {
            ConnectionState::Pipelining
        } else if self.transport.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ClientStats {
        self.stats.clone()
    }

    /// Set the read timeout in seconds; values below -1 are rejected
    pub fn set_read_timeout(&mut self, seconds: f64) -> Result<()> {
        self.transport.set_read_timeout(seconds)?;
        self.config.read_timeout = seconds;
        Ok(())
    }

    /// Set the number of extra connect attempts
    pub fn set_max_connect_retries(&mut self, retries: u32) {
        self.config.max_connect_retries = retries;
        self.transport.set_max_connect_retries(retries);
    }

    /// Send `command` as `alias`
    pub fn rename_command(&mut self, command: &str, alias: &str) {
        self.renamer.rename(command, alias);
    }

    /// Replace the renaming strategy
    pub fn set_rename_strategy(&mut self, strategy: Option<RenameStrategy>) {
        self.config.rename = strategy.clone();
        self.renamer.set_strategy(strategy);
    }

    /// Open the connection if it is not open yet
    pub async fn connect(&mut self) -> Result<()> {
        let reconnect = self.stats.connects > 0;
        self.open(reconnect).await
    }

    /// Close the connection. Persistent connections only close when
    /// `force` is set. Returns whether the socket was released.
    pub fn close(&mut self, force: bool) -> bool {
        let closed = self.transport.close(force);
        if closed {
            self.reset_session();
        }
        closed
    }

    fn reset_session(&mut self) {
        self.batch = None;
        self.watching = false;
        self.subscribed = false;
    }

    pub(super) async fn open(&mut self, reconnect: bool) -> Result<()> {
        match self.transport.connect().await {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(e) => {
                self.stats.record_error(&e);
                return Err(e);
            }
        }
        self.stats.record_connect(reconnect);
        if let Err(e) = self.handshake().await {
            self.transport.close(true);
            self.stats.record_error(&e);
            return Err(e);
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        if let Some(password) = self.password.clone() {
            self.roundtrip(&Request::new(Op::Auth).arg(password)).await?;
            tracing::debug!("Authenticated with {}", self.transport.endpoint());
        }
        if self.database != 0 {
            let select = Request::new(Op::Select).arg(self.database);
            self.roundtrip(&select).await?;
        }
        Ok(())
    }

    /// Make sure a usable connection is open before writing.
    ///
    /// A connection the peer closed while idle is reopened, unless a
    /// transaction or WATCH depends on it.
    pub(super) async fn prepare(&mut self, in_transaction: bool) -> Result<()> {
        if !self.transport.is_connected() {
            let reconnect = self.stats.connects > 0;
            return self.open(reconnect).await;
        }
        if self.transport.is_stale() {
            self.transport.close(true);
            if in_transaction || self.watching {
                self.reset_session();
                let err = CacheError::disconnected(
                    "Lost connection to Redis server during watch or transaction.",
                );
                self.stats.record_error(&err);
                return Err(err);
            }
            tracing::info!(
                "Connection to {} was closed by the server, reconnecting",
                self.transport.endpoint()
            );
            self.open(true).await?;
        }
        Ok(())
    }

    /// Wire command for a request, after renaming
    pub(super) fn wire(&mut self, req: &Request) -> Command {
        req.to_command(self.renamer.wire_name(req.name()))
    }

    pub(super) async fn write(&mut self, commands: &[Command]) -> Result<()> {
        if let Err(e) = self.transport.write(commands).await {
            self.stats.record_error(&e);
            self.reset_session();
            return Err(e);
        }
        self.stats.record_sent(commands.len());
        Ok(())
    }

    pub(super) async fn read_reply(&mut self) -> Result<Reply> {
        match self.transport.read().await {
            Ok(reply) => {
                self.stats.record_reply(matches!(reply, Reply::Error(_)));
                Ok(reply)
            }
            Err(e) => {
                self.stats.record_error(&e);
                if !self.transport.is_connected() {
                    self.reset_session();
                }
                Err(e)
            }
        }
    }

    /// Write one request, read its reply and shape it
    async fn roundtrip(&mut self, req: &Request) -> Result<Value> {
        tracing::debug!("> {}", req);
        let command = self.wire(req);
        self.write(std::slice::from_ref(&command)).await?;
        let reply = self.read_reply().await?;
        self.resolve(req, reply)
    }

    fn resolve(&mut self, req: &Request, reply: Reply) -> Result<Value> {
        match reply {
            Reply::Error(message) => {
                if req.is(Op::Evalsha) && message.starts_with("NOSCRIPT") {
                    return Ok(Value::Nil);
                }
                let err = CacheError::remote_error(message);
                self.stats.record_error(&err);
                Err(err)
            }
            other => commands::decode(req.shape(), other),
        }
    }

    async fn execute(&mut self, req: &Request) -> Result<Value> {
        self.prepare(false).await?;
        self.requests += 1;
        let first_persistent = self.requests == 1 && self.transport.endpoint().is_persistent();

        match self.roundtrip(req).await {
            Err(e) if first_persistent && e.code() == Some(ErrorCode::Disconnected) => {
                tracing::warn!(
                    "First request on persistent connection failed ({}), reconnecting once",
                    e
                );
                self.transport.close(true);
                self.open(true).await?;
                self.roundtrip(req).await
            }
            other => other,
        }
    }

    /// Run a command immediately and return its shaped reply.
    ///
    /// Fails with a usage error while a pipeline is open; use
    /// [`queue`](Self::queue) or [`send`](Self::send) there.
    pub async fn call(&mut self, req: Request) -> Result<Value> {
        if self.batch.is_some() {
            return Err(CacheError::usage_error(format!(
                "{} cannot run immediately while a pipeline is open; queue it instead",
                req.name()
            )));
        }
        match req.op() {
            Some(Op::Multi) => {
                return Err(CacheError::usage_error("Use multi() to start a transaction"))
            }
            Some(Op::Exec) | Some(Op::Discard) => {
                return Err(CacheError::usage_error(format!(
                    "{} without MULTI or pipeline",
                    req.name()
                )))
            }
            Some(Op::Subscribe) | Some(Op::Psubscribe) => {
                return Err(CacheError::usage_error(
                    "Use subscribe() or psubscribe() to enter a subscription loop",
                ))
            }
            // dropping the flag first lets a stale connection reconnect
            Some(Op::Unwatch) => self.watching = false,
            _ => {}
        }

        let value = self.execute(&req).await?;

        match req.op() {
            Some(Op::Watch) => self.watching = true,
            Some(Op::Auth) => {
                if let Some(password) = req.args().last() {
                    self.password = Some(String::from_utf8_lossy(password).into_owned());
                }
            }
            Some(Op::Select) => {
                if let Some(db) = req.args().first() {
                    self.database = crate::utils::parse_redis_int(db)? as u32;
                }
            }
            _ => {}
        }
        Ok(value)
    }

    /// Run or queue a request depending on whether a pipeline is open
    pub async fn send(&mut self, req: Request) -> Result<Response> {
        if self.batch.is_some() {
            Ok(Response::Queued(self.queue(req)?))
        } else {
            Ok(Response::Value(self.call(req).await?))
        }
    }

    /// Run a command immediately and convert its reply
    pub async fn query<T: FromValue>(&mut self, req: Request) -> Result<T> {
        T::from_value(self.call(req).await?)
    }

    // connection and server

    /// PING, optionally with a message to echo back
    pub async fn ping(&mut self, message: Option<&str>) -> Result<String> {
        self.query(Request::new(Op::Ping).arg(message)).await
    }

    /// ECHO
    pub async fn echo(&mut self, message: &str) -> Result<String> {
        self.query(Request::new(Op::Echo).arg(message)).await
    }

    /// AUTH; the password is replayed on reconnect
    pub async fn auth(&mut self, password: &str) -> Result<()> {
        self.call(Request::new(Op::Auth).arg(password)).await?;
        Ok(())
    }

    /// SELECT; the database is re-selected on reconnect
    pub async fn select(&mut self, database: u32) -> Result<()> {
        self.call(Request::new(Op::Select).arg(database)).await?;
        Ok(())
    }

    /// INFO, parsed into fields
    pub async fn info(&mut self, section: Option<&str>) -> Result<HashMap<String, String>> {
        self.query(Request::new(Op::Info).arg(section)).await
    }

    /// DBSIZE
    pub async fn dbsize(&mut self) -> Result<u64> {
        self.query(Request::new(Op::Dbsize)).await
    }

    /// TIME as (seconds, microseconds)
    pub async fn time(&mut self) -> Result<(u64, u64)> {
        let parts: Vec<u64> = self.query(Request::new(Op::Time)).await?;
        match parts.as_slice() {
            [secs, micros] => Ok((*secs, *micros)),
            _ => Err(CacheError::protocol_error(
                "time",
                format!("Expected 2 elements, got {}", parts.len()),
            )),
        }
    }

    /// FLUSHDB
    pub async fn flushdb(&mut self) -> Result<()> {
        self.call(Request::new(Op::Flushdb)).await?;
        Ok(())
    }

    /// FLUSHALL
    pub async fn flushall(&mut self) -> Result<()> {
        self.call(Request::new(Op::Flushall)).await?;
        Ok(())
    }

    /// CONFIG GET
    pub async fn config_get(&mut self, parameter: &str) -> Result<HashMap<String, String>> {
        self.query(Request::new(Op::Config).arg("GET").arg(parameter)).await
    }

    /// CONFIG SET
    pub async fn config_set(&mut self, parameter: &str, value: &str) -> Result<()> {
        self.call(Request::new(Op::Config).arg("SET").arg(parameter).arg(value))
            .await?;
        Ok(())
    }

    /// PUBLISH; returns the number of receivers
    pub async fn publish<M: ToArgs>(&mut self, channel: &str, message: M) -> Result<u64> {
        self.query(Request::new(Op::Publish).arg(channel).arg(message))
            .await
    }

    // keys

    /// TYPE; the name is one of the [`key_type`](super::key_type) constants
    pub async fn key_type(&mut self, key: &str) -> Result<String> {
        self.query(Request::new(Op::Type).arg(key)).await
    }

    /// DEL; returns the number of removed keys
    pub async fn del(&mut self, keys: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Del).arg(keys)).await
    }

    /// EXISTS for one key
    pub async fn exists(&mut self, key: &str) -> Result<bool> {
        let count: i64 = self.query(Request::new(Op::Exists).arg(key)).await?;
        Ok(count > 0)
    }

    /// EXISTS for several keys; returns how many exist
    pub async fn exists_many(&mut self, keys: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Exists).arg(keys)).await
    }

    /// EXPIRE
    pub async fn expire(&mut self, key: &str, seconds: u64) -> Result<bool> {
        self.query(Request::new(Op::Expire).arg(key).arg(seconds))
            .await
    }

    /// PERSIST
    pub async fn persist(&mut self, key: &str) -> Result<bool> {
        self.query(Request::new(Op::Persist).arg(key)).await
    }

    /// TTL in seconds
    pub async fn ttl(&mut self, key: &str) -> Result<Ttl> {
        self.query(Request::new(Op::Ttl).arg(key)).await
    }

    /// PTTL in milliseconds
    pub async fn pttl(&mut self, key: &str) -> Result<Ttl> {
        self.query(Request::new(Op::Pttl).arg(key)).await
    }

    /// KEYS
    pub async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.query(Request::new(Op::Keys).arg(pattern)).await
    }

    /// RENAME
    pub async fn rename(&mut self, key: &str, new_key: &str) -> Result<()> {
        self.call(Request::new(Op::Rename).arg(key).arg(new_key))
            .await?;
        Ok(())
    }

    async fn page<T: FromValue>(&mut self, req: Request) -> Result<(u64, T)> {
        match self.call(req).await? {
            Value::Page { cursor, items } => Ok((cursor, T::from_value(*items)?)),
            other => Err(CacheError::protocol_error(
                "scan",
                format!("Expected a page, got {}", other.type_name()),
            )),
        }
    }

    /// One SCAN step; pass the returned cursor back until it is 0
    pub async fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Result<(u64, Vec<String>)> {
        self.page(Request::scan(cursor, pattern, count)).await
    }

    /// One HSCAN step
    pub async fn hscan(
        &mut self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Result<(u64, HashMap<String, Bytes>)> {
        self.page(Request::scan_key(Op::Hscan, key, cursor, pattern, count))
            .await
    }

    /// One SSCAN step
    pub async fn sscan(
        &mut self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Result<(u64, Vec<String>)> {
        self.page(Request::scan_key(Op::Sscan, key, cursor, pattern, count))
            .await
    }

    /// One ZSCAN step
    pub async fn zscan(
        &mut self,
        key: &str,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Result<(u64, Vec<(String, f64)>)> {
        let req = Request::scan_key(Op::Zscan, key, cursor, pattern, count);
        match self.call(req).await? {
            Value::Page { cursor, items } => Ok((cursor, items.into_scores()?)),
            other => Err(CacheError::protocol_error(
                "zscan",
                format!("Expected a page, got {}", other.type_name()),
            )),
        }
    }

    // strings

    /// GET
    pub async fn get<T: FromValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.query(Request::new(Op::Get).arg(key)).await
    }

    /// SET
    pub async fn set<V: ToArgs>(&mut self, key: &str, value: V) -> Result<bool> {
        self.query(Request::new(Op::Set).arg(key).arg(value)).await
    }

    /// SET with expiry and existence options; false when a condition
    /// prevented the write
    pub async fn set_with<V: ToArgs>(&mut self, key: &str, value: V, options: SetOptions) -> Result<bool> {
        self.query(Request::set_with(key, value, options)).await
    }

    /// SETEX
    pub async fn setex<V: ToArgs>(&mut self, key: &str, seconds: u64, value: V) -> Result<bool> {
        self.query(Request::new(Op::Setex).arg(key).arg(seconds).arg(value))
            .await
    }

    /// MGET
    pub async fn mget(&mut self, keys: &[&str]) -> Result<Vec<Option<Bytes>>> {
        self.query(Request::new(Op::Mget).arg(keys)).await
    }

    /// MSET
    pub async fn mset<V: ToArgs>(&mut self, pairs: &[(&str, V)]) -> Result<()> {
        self.call(Request::new(Op::Mset).arg(pairs)).await?;
        Ok(())
    }

    /// INCR
    pub async fn incr(&mut self, key: &str) -> Result<i64> {
        self.query(Request::new(Op::Incr).arg(key)).await
    }

    /// INCRBY
    pub async fn incrby(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.query(Request::new(Op::Incrby).arg(key).arg(delta))
            .await
    }

    /// DECR
    pub async fn decr(&mut self, key: &str) -> Result<i64> {
        self.query(Request::new(Op::Decr).arg(key)).await
    }

    /// DECRBY
    pub async fn decrby(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.query(Request::new(Op::Decrby).arg(key).arg(delta))
            .await
    }

    // hashes

    /// HGET
    pub async fn hget<T: FromValue>(&mut self, key: &str, field: &str) -> Result<Option<T>> {
        self.query(Request::new(Op::Hget).arg(key).arg(field))
            .await
    }

    /// HSET for one field; true when the field is new
    pub async fn hset<V: ToArgs>(&mut self, key: &str, field: &str, value: V) -> Result<bool> {
        self.query(Request::new(Op::Hset).arg(key).arg(field).arg(value))
            .await
    }

    /// HMSET
    pub async fn hmset<V: ToArgs>(&mut self, key: &str, pairs: &[(&str, V)]) -> Result<()> {
        self.call(Request::hmset(key, pairs)).await?;
        Ok(())
    }

    /// HMGET, keyed by the requested field names
    pub async fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<HashMap<String, Option<Bytes>>> {
        self.query(Request::hmget(key, fields)).await
    }

    /// HGETALL
    pub async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, Bytes>> {
        self.query(Request::new(Op::Hgetall).arg(key)).await
    }

    /// HDEL
    pub async fn hdel(&mut self, key: &str, fields: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Hdel).arg(key).arg(fields))
            .await
    }

    /// HINCRBY
    pub async fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.query(Request::new(Op::Hincrby).arg(key).arg(field).arg(delta))
            .await
    }

    // lists

    /// LPUSH
    pub async fn lpush<V: ToArgs>(&mut self, key: &str, values: &[V]) -> Result<u64> {
        self.query(Request::new(Op::Lpush).arg(key).arg(values))
            .await
    }

    /// RPUSH
    pub async fn rpush<V: ToArgs>(&mut self, key: &str, values: &[V]) -> Result<u64> {
        self.query(Request::new(Op::Rpush).arg(key).arg(values))
            .await
    }

    /// LRANGE
    pub async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>> {
        self.query(Request::new(Op::Lrange).arg(key).arg(start).arg(stop))
            .await
    }

    /// LLEN
    pub async fn llen(&mut self, key: &str) -> Result<u64> {
        self.query(Request::new(Op::Llen).arg(key)).await
    }

    // sets

    /// SADD
    pub async fn sadd(&mut self, key: &str, members: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Sadd).arg(key).arg(members))
            .await
    }

    /// SREM
    pub async fn srem(&mut self, key: &str, members: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Srem).arg(key).arg(members))
            .await
    }

    /// SMEMBERS
    pub async fn smembers(&mut self, key: &str) -> Result<Vec<String>> {
        self.query(Request::new(Op::Smembers).arg(key)).await
    }

    /// SISMEMBER
    pub async fn sismember(&mut self, key: &str, member: &str) -> Result<bool> {
        self.query(Request::new(Op::Sismember).arg(key).arg(member))
            .await
    }

    // sorted sets

    /// ZADD with (score, member) pairs
    pub async fn zadd(&mut self, key: &str, entries: &[(f64, &str)]) -> Result<u64> {
        self.query(Request::new(Op::Zadd).arg(key).arg(entries))
            .await
    }

    /// ZREM
    pub async fn zrem(&mut self, key: &str, members: &[&str]) -> Result<u64> {
        self.query(Request::new(Op::Zrem).arg(key).arg(members))
            .await
    }

    /// ZCARD
    pub async fn zcard(&mut self, key: &str) -> Result<u64> {
        self.query(Request::new(Op::Zcard).arg(key)).await
    }

    /// ZSCORE
    pub async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>> {
        self.query(Request::new(Op::Zscore).arg(key).arg(member))
            .await
    }

    /// ZRANGE without scores
    pub async fn zrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(Request::zrange(Op::Zrange, key, start, stop, false))
            .await
    }

    /// ZRANGE WITHSCORES
    pub async fn zrange_with_scores(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>> {
        self.call(Request::zrange(Op::Zrange, key, start, stop, true))
            .await?
            .into_scores()
    }

    /// ZREVRANGE without scores
    pub async fn zrevrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(Request::zrange(Op::Zrevrange, key, start, stop, false))
            .await
    }

    /// ZRANGEBYSCORE; a `Scores` value when scores were requested,
    /// otherwise a `List`
    pub async fn zrangebyscore(
        &mut self,
        key: &str,
        min: &str,
        max: &str,
        options: RangeOptions,
    ) -> Result<Value> {
        self.call(Request::zrangebyscore(Op::Zrangebyscore, key, min, max, options))
            .await
    }

    /// ZINTERSTORE with optional weights and aggregate
    pub async fn zinterstore(
        &mut self,
        dest: &str,
        keys: &[&str],
        weights: Option<&[f64]>,
        aggregate: Option<Aggregate>,
    ) -> Result<u64> {
        self.query(Request::zstore(Op::Zinterstore, dest, keys, weights, aggregate))
            .await
    }

    /// ZUNIONSTORE with optional weights and aggregate
    pub async fn zunionstore(
        &mut self,
        dest: &str,
        keys: &[&str],
        weights: Option<&[f64]>,
        aggregate: Option<Aggregate>,
    ) -> Result<u64> {
        self.query(Request::zstore(Op::Zunionstore, dest, keys, weights, aggregate))
            .await
    }

    // scripting

    /// EVAL
    pub async fn eval<A: ToArgs>(&mut self, script: &str, keys: &[&str], args: &[A]) -> Result<Value> {
        self.call(Request::eval(Op::Eval, script, keys, args)).await
    }

    /// EVALSHA; `Nil` when the script is not loaded
    pub async fn evalsha<A: ToArgs>(&mut self, sha: &str, keys: &[&str], args: &[A]) -> Result<Value> {
        self.call(Request::eval(Op::Evalsha, sha, keys, args)).await
    }
}

/// Utility functions for creating clients
pub mod utils {
    use super::*;

    /// Create a client for `host` with default configuration
    pub fn create_client(host: &str) -> Result<RedisClient> {
        let config = RedisClientConfig {
            host: host.to_string(),
            ..Default::default()
        };
        validate_config(&config)?;
        RedisClient::new(config)
    }

    /// Create a client that authenticates after connecting
    pub fn create_authenticated_client(host: &str, password: &str) -> Result<RedisClient> {
        let config = RedisClientConfig {
            host: host.to_string(),
            password: Some(password.to_string()),
            ..Default::default()
        };
        validate_config(&config)?;
        RedisClient::new(config)
    }

    /// Validate client configuration
    pub fn validate_config(config: &RedisClientConfig) -> Result<()> {
        if config.host.is_empty() {
            return Err(CacheError::config_error("Host cannot be empty"));
        }

        let endpoint = Endpoint::parse(&config.host, config.port, &config.persistent)?;
        if endpoint.port == Some(0) {
            return Err(CacheError::config_error("Port cannot be zero"));
        }

        if config.connect_timeout.is_zero() {
            return Err(CacheError::config_error("Connect timeout cannot be zero"));
        }

        if config.read_timeout.is_nan() || config.read_timeout < -1.0 {
            return Err(CacheError::config_error(
                "Read timeout values less than -1 are not accepted",
            ));
        }

        Ok(())
    }
}
