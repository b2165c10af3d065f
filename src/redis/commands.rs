//! Command table, argument shaping and reply shaping
//!
//! Every supported operation is an [`Op`]. A [`Request`] pairs an operation
//! with its flattened arguments and the [`Shape`] its reply should be decoded
//! into. Nothing in here touches the network.

use crate::error::{CacheError, Result};
use crate::redis::protocol::{Command, Reply};
use crate::types::Value;
use crate::utils::{format_score, parse_redis_float, parse_redis_int};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

macro_rules! command_table {
    ($( $variant:ident = $wire:literal $(=> $shape:ident)? ),* $(,)?) => {
        /// Operations known to the client
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Op {
            $( $variant, )*
        }

        impl Op {
            /// Every operation in the table
            pub const ALL: &'static [Op] = &[ $( Op::$variant, )* ];

            /// Canonical command name sent on the wire
            pub fn wire_name(self) -> &'static str {
                match self {
                    $( Op::$variant => $wire, )*
                }
            }

            /// Reply shape used when the request does not pick one
            pub fn default_shape(self) -> Shape {
                match self {
                    $( Op::$variant => command_table!(@shape $($shape)?), )*
                }
            }
        }
    };
    (@shape) => { Shape::Raw };
    (@shape $shape:ident) => { Shape::$shape };
}

command_table! {
    // connection
    Auth = "AUTH",
    Select = "SELECT",
    Ping = "PING",
    Echo = "ECHO",
    Quit = "QUIT",
    // server
    Info = "INFO" => Info,
    Dbsize = "DBSIZE",
    Flushdb = "FLUSHDB",
    Flushall = "FLUSHALL",
    Time = "TIME",
    Config = "CONFIG" => Pairs,
    // keys
    Del = "DEL",
    Unlink = "UNLINK",
    Exists = "EXISTS" => Exists,
    Expire = "EXPIRE",
    Pexpire = "PEXPIRE",
    Expireat = "EXPIREAT",
    Persist = "PERSIST",
    Ttl = "TTL" => Ttl,
    Pttl = "PTTL" => Ttl,
    Type = "TYPE",
    Keys = "KEYS",
    Scan = "SCAN" => Scan,
    Rename = "RENAME",
    Renamenx = "RENAMENX",
    Randomkey = "RANDOMKEY",
    // strings
    Get = "GET",
    Set = "SET",
    Setex = "SETEX",
    Psetex = "PSETEX",
    Setnx = "SETNX",
    Getset = "GETSET",
    Mget = "MGET",
    Mset = "MSET",
    Msetnx = "MSETNX",
    Incr = "INCR",
    Incrby = "INCRBY",
    Incrbyfloat = "INCRBYFLOAT",
    Decr = "DECR",
    Decrby = "DECRBY",
    Append = "APPEND",
    Strlen = "STRLEN",
    Getrange = "GETRANGE",
    Setrange = "SETRANGE",
    // hashes
    Hget = "HGET",
    Hset = "HSET",
    Hsetnx = "HSETNX",
    Hmset = "HMSET",
    Hmget = "HMGET",
    Hgetall = "HGETALL" => Pairs,
    Hdel = "HDEL",
    Hexists = "HEXISTS",
    Hincrby = "HINCRBY",
    Hincrbyfloat = "HINCRBYFLOAT",
    Hkeys = "HKEYS",
    Hvals = "HVALS",
    Hlen = "HLEN",
    Hscan = "HSCAN" => HashScan,
    // lists
    Lpush = "LPUSH",
    Rpush = "RPUSH",
    Lpop = "LPOP",
    Rpop = "RPOP",
    Llen = "LLEN",
    Lrange = "LRANGE",
    Lindex = "LINDEX",
    Lset = "LSET",
    Lrem = "LREM",
    Ltrim = "LTRIM",
    Blpop = "BLPOP",
    Brpop = "BRPOP",
    Rpoplpush = "RPOPLPUSH",
    // sets
    Sadd = "SADD",
    Srem = "SREM",
    Smembers = "SMEMBERS",
    Sismember = "SISMEMBER",
    Scard = "SCARD",
    Spop = "SPOP",
    Srandmember = "SRANDMEMBER",
    Sinter = "SINTER",
    Sunion = "SUNION",
    Sdiff = "SDIFF",
    Sinterstore = "SINTERSTORE",
    Sunionstore = "SUNIONSTORE",
    Sdiffstore = "SDIFFSTORE",
    Smove = "SMOVE",
    Sscan = "SSCAN" => Scan,
    // sorted sets
    Zadd = "ZADD",
    Zrem = "ZREM",
    Zcard = "ZCARD",
    Zscore = "ZSCORE",
    Zincrby = "ZINCRBY",
    Zrank = "ZRANK",
    Zrevrank = "ZREVRANK",
    Zcount = "ZCOUNT",
    Zrange = "ZRANGE",
    Zrevrange = "ZREVRANGE",
    Zrangebyscore = "ZRANGEBYSCORE",
    Zrevrangebyscore = "ZREVRANGEBYSCORE",
    Zremrangebyscore = "ZREMRANGEBYSCORE",
    Zremrangebyrank = "ZREMRANGEBYRANK",
    Zinterstore = "ZINTERSTORE",
    Zunionstore = "ZUNIONSTORE",
    Zscan = "ZSCAN" => ScoreScan,
    // pub/sub
    Publish = "PUBLISH",
    Subscribe = "SUBSCRIBE",
    Psubscribe = "PSUBSCRIBE",
    Unsubscribe = "UNSUBSCRIBE",
    Punsubscribe = "PUNSUBSCRIBE",
    // transactions
    Multi = "MULTI",
    Exec = "EXEC",
    Discard = "DISCARD",
    Watch = "WATCH",
    Unwatch = "UNWATCH",
    // scripting
    Eval = "EVAL",
    Evalsha = "EVALSHA",
    Script = "SCRIPT",
}

impl Op {
    /// Resolve a command name, case-insensitively, including legacy aliases
    pub fn from_name(name: &str) -> Option<Op> {
        let lower = name.to_ascii_lowercase();
        let aliased = match lower.as_str() {
            "delete" => return Some(Op::Del),
            "getkeys" => return Some(Op::Keys),
            "sremove" => return Some(Op::Srem),
            "zsize" => return Some(Op::Zcard),
            "zdelete" => return Some(Op::Zrem),
            other => other,
        };
        Op::ALL
            .iter()
            .copied()
            .find(|op| op.wire_name().eq_ignore_ascii_case(aliased))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// How a reply is turned into a [`Value`]
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// One-to-one mapping of the reply
    Raw,
    /// Flat alternating array into field/value pairs
    Pairs,
    /// Flat alternating member/score array into scores
    WithScores,
    /// Array re-associated positionally with the requested field names
    Fields(Vec<String>),
    /// `[cursor, items]` page of keys or members
    Scan,
    /// `[cursor, items]` page of field/value pairs
    HashScan,
    /// `[cursor, items]` page of member/score pairs
    ScoreScan,
    /// -1 becomes [`Value::NoExpiry`]
    Ttl,
    /// Always an integer
    Exists,
    /// INFO text into field/value pairs
    Info,
}

/// Conversion of a Rust value into one or more wire arguments.
///
/// Collections and tuples flatten in order, `None` contributes nothing.
pub trait ToArgs {
    /// Append this value's arguments
    fn push_args(&self, out: &mut Vec<Bytes>);
}

impl<T: ToArgs + ?Sized> ToArgs for &T {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        (**self).push_args(out)
    }
}

impl ToArgs for str {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        out.push(Bytes::copy_from_slice(self.as_bytes()));
    }
}

impl ToArgs for String {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        out.push(Bytes::copy_from_slice(self.as_bytes()));
    }
}

impl ToArgs for Bytes {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        out.push(self.clone());
    }
}

macro_rules! int_args {
    ($($t:ty),*) => {
        $(
            impl ToArgs for $t {
                fn push_args(&self, out: &mut Vec<Bytes>) {
                    out.push(Bytes::from(self.to_string()));
                }
            }
        )*
    };
}

int_args!(i32, i64, u32, u64, usize);

impl ToArgs for f64 {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        out.push(Bytes::from(format_score(*self)));
    }
}

impl<T: ToArgs> ToArgs for Option<T> {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        if let Some(v) = self {
            v.push_args(out);
        }
    }
}

impl<T: ToArgs> ToArgs for [T] {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        for item in self {
            item.push_args(out);
        }
    }
}

impl<T: ToArgs, const N: usize> ToArgs for [T; N] {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        self.as_slice().push_args(out)
    }
}

impl<T: ToArgs> ToArgs for Vec<T> {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        self.as_slice().push_args(out)
    }
}

impl<A: ToArgs, B: ToArgs> ToArgs for (A, B) {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        self.0.push_args(out);
        self.1.push_args(out);
    }
}

impl<A: ToArgs, B: ToArgs, C: ToArgs> ToArgs for (A, B, C) {
    fn push_args(&self, out: &mut Vec<Bytes>) {
        self.0.push_args(out);
        self.1.push_args(out);
        self.2.push_args(out);
    }
}

/// Expiry option of SET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Seconds
    Ex(u64),
    /// Milliseconds
    Px(u64),
}

/// Existence condition of SET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set when the key is absent
    Nx,
    /// Only set when the key exists
    Xx,
}

/// Options of SET
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expiry to attach
    pub expiry: Option<Expiry>,
    /// Existence condition
    pub condition: Option<SetCondition>,
}

impl SetOptions {
    /// Expire after `seconds`
    pub fn ex(seconds: u64) -> Self {
        Self {
            expiry: Some(Expiry::Ex(seconds)),
            condition: None,
        }
    }

    /// Add an existence condition
    pub fn with_condition(mut self, condition: SetCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Options of the score range queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Ask for scores alongside members
    pub with_scores: bool,
    /// `LIMIT offset count`
    pub limit: Option<(i64, i64)>,
}

/// Score aggregation of ZINTERSTORE/ZUNIONSTORE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Sum scores
    Sum,
    /// Keep the lowest score
    Min,
    /// Keep the highest score
    Max,
}

impl Aggregate {
    fn as_str(self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// An operation with its arguments and reply shape
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    name: String,
    op: Option<Op>,
    args: Vec<Bytes>,
    shape: Shape,
}

impl Request {
    /// Start a request for a known operation
    pub fn new(op: Op) -> Self {
        Self {
            name: op.wire_name().to_string(),
            op: Some(op),
            args: Vec::new(),
            shape: op.default_shape(),
        }
    }

    /// Start a request by command name. Known names and aliases resolve to
    /// their [`Op`]; unknown names are sent as given with raw reply shaping.
    pub fn cmd(name: &str) -> Self {
        match Op::from_name(name) {
            Some(op) => Self::new(op),
            None => Self {
                name: name.to_ascii_uppercase(),
                op: None,
                args: Vec::new(),
                shape: Shape::Raw,
            },
        }
    }

    /// Append arguments
    pub fn arg<T: ToArgs>(mut self, arg: T) -> Self {
        arg.push_args(&mut self.args);
        self
    }

    /// Override the reply shape
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// Canonical command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved operation, if the name is in the table
    pub fn op(&self) -> Option<Op> {
        self.op
    }

    /// Flattened arguments
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Reply shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Whether this request is `op`
    pub fn is(&self, op: Op) -> bool {
        self.op == Some(op)
    }

    /// Build the wire command using `wire_name` for the command itself
    pub fn to_command(&self, wire_name: Bytes) -> Command {
        Command::new(wire_name, self.args.clone())
    }

    /// `SET key value [EX s|PX ms] [NX|XX]`
    pub fn set_with<K: ToArgs, V: ToArgs>(key: K, value: V, options: SetOptions) -> Self {
        let mut req = Request::new(Op::Set).arg(key).arg(value);
        match options.expiry {
            Some(Expiry::Ex(s)) => req = req.arg("EX").arg(s),
            Some(Expiry::Px(ms)) => req = req.arg("PX").arg(ms),
            None => {}
        }
        match options.condition {
            Some(SetCondition::Nx) => req = req.arg("NX"),
            Some(SetCondition::Xx) => req = req.arg("XX"),
            None => {}
        }
        req
    }

    /// `HMGET key field...`, decoded into field/value pairs
    pub fn hmget<K: ToArgs>(key: K, fields: &[&str]) -> Self {
        Request::new(Op::Hmget)
            .arg(key)
            .arg(fields)
            .with_shape(Shape::Fields(fields.iter().map(|f| f.to_string()).collect()))
    }

    /// `HMSET key field value ...`
    pub fn hmset<K: ToArgs, F: ToArgs, V: ToArgs>(key: K, pairs: &[(F, V)]) -> Self {
        Request::new(Op::Hmset).arg(key).arg(pairs)
    }

    /// `ZRANGE`/`ZREVRANGE key start stop [WITHSCORES]`
    pub fn zrange<K: ToArgs>(op: Op, key: K, start: i64, stop: i64, with_scores: bool) -> Self {
        let req = Request::new(op).arg(key).arg(start).arg(stop);
        if with_scores {
            req.arg("WITHSCORES").with_shape(Shape::WithScores)
        } else {
            req
        }
    }

    /// `ZRANGEBYSCORE`/`ZREVRANGEBYSCORE key min max [WITHSCORES] [LIMIT o c]`
    pub fn zrangebyscore<K: ToArgs>(op: Op, key: K, min: &str, max: &str, options: RangeOptions) -> Self {
        let mut req = Request::new(op).arg(key).arg(min).arg(max);
        if options.with_scores {
            req = req.arg("WITHSCORES").with_shape(Shape::WithScores);
        }
        if let Some((offset, count)) = options.limit {
            req = req.arg("LIMIT").arg(offset).arg(count);
        }
        req
    }

    /// `SCAN cursor [MATCH p] [COUNT n]`
    pub fn scan(cursor: u64, pattern: Option<&str>, count: Option<u64>) -> Self {
        Request::new(Op::Scan)
            .arg(cursor)
            .arg(pattern.filter(|p| !p.is_empty()).map(|p| ("MATCH", p)))
            .arg(count.filter(|c| *c > 0).map(|c| ("COUNT", c)))
    }

    /// `HSCAN`/`SSCAN`/`ZSCAN key cursor [MATCH p] [COUNT n]`
    pub fn scan_key<K: ToArgs>(
        op: Op,
        key: K,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Self {
        Request::new(op)
            .arg(key)
            .arg(cursor)
            .arg(pattern.filter(|p| !p.is_empty()).map(|p| ("MATCH", p)))
            .arg(count.filter(|c| *c > 0).map(|c| ("COUNT", c)))
    }

    /// `EVAL`/`EVALSHA script numkeys key... arg...`
    pub fn eval<S: ToArgs, K: ToArgs, A: ToArgs>(op: Op, script: S, keys: &[K], args: &[A]) -> Self {
        Request::new(op).arg(script).arg(keys.len()).arg(keys).arg(args)
    }

    /// `ZINTERSTORE`/`ZUNIONSTORE dest numkeys key... [WEIGHTS w...] [AGGREGATE a]`
    pub fn zstore<D: ToArgs, K: ToArgs>(
        op: Op,
        dest: D,
        keys: &[K],
        weights: Option<&[f64]>,
        aggregate: Option<Aggregate>,
    ) -> Self {
        let mut req = Request::new(op).arg(dest).arg(keys.len()).arg(keys);
        if let Some(weights) = weights.filter(|w| !w.is_empty()) {
            req = req.arg("WEIGHTS").arg(weights);
        }
        if let Some(aggregate) = aggregate {
            req = req.arg("AGGREGATE").arg(aggregate.as_str());
        }
        req
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::utils::command_repr(self.name.as_bytes(), &self.args))
    }
}

/// Decode a non-error reply according to `shape`
pub fn decode(shape: &Shape, reply: Reply) -> Result<Value> {
    match shape {
        Shape::Raw => Ok(raw(reply)),
        Shape::Pairs => match reply {
            Reply::Array(Some(items)) => Ok(Value::Map(pairs(items)?)),
            Reply::Array(None) => Ok(Value::Map(Vec::new())),
            other => Ok(raw(other)),
        },
        Shape::WithScores => match reply {
            Reply::Array(Some(items)) => Ok(Value::Scores(scores(items)?)),
            Reply::Array(None) => Ok(Value::Scores(Vec::new())),
            other => Ok(raw(other)),
        },
        Shape::Fields(fields) => match reply {
            Reply::Array(Some(items)) => {
                if items.len() != fields.len() {
                    return Err(CacheError::protocol_error(
                        "hmget",
                        format!(
                            "hmget arguments and response do not match: {} fields, {} values",
                            fields.len(),
                            items.len()
                        ),
                    ));
                }
                Ok(Value::Map(
                    fields.iter().cloned().zip(items.into_iter().map(raw)).collect(),
                ))
            }
            other => Err(CacheError::protocol_error(
                "hmget",
                format!("Expected array reply, got {}", other.type_name()),
            )),
        },
        Shape::Scan | Shape::HashScan | Shape::ScoreScan => {
            let (cursor, items) = scan_page(reply)?;
            let items = match shape {
                Shape::HashScan => Value::Map(pairs(items)?),
                Shape::ScoreScan => Value::Scores(scores(items)?),
                _ => Value::List(items.into_iter().map(raw).collect()),
            };
            Ok(Value::Page {
                cursor,
                items: Box::new(items),
            })
        }
        Shape::Ttl => match reply {
            Reply::Integer(-1) => Ok(Value::NoExpiry),
            other => Ok(raw(other)),
        },
        Shape::Exists => match reply {
            Reply::Integer(i) => Ok(Value::Int(i)),
            Reply::Bulk(None) | Reply::Array(None) => Ok(Value::Int(0)),
            Reply::Status(s) if s == "OK" => Ok(Value::Int(1)),
            Reply::Bulk(Some(b)) => Ok(Value::Int(parse_redis_int(&b)?)),
            other => Err(CacheError::protocol_error(
                "exists",
                format!("Unexpected reply {}", other.type_name()),
            )),
        },
        Shape::Info => match reply {
            Reply::Bulk(Some(text)) => Ok(Value::Map(info(&String::from_utf8_lossy(&text)))),
            other => Ok(raw(other)),
        },
    }
}

/// One-to-one mapping of a reply
pub fn raw(reply: Reply) -> Value {
    match reply {
        Reply::Status(s) if s == "OK" => Value::Okay,
        Reply::Status(s) => Value::Status(s),
        Reply::Error(e) => Value::Status(e),
        Reply::Integer(i) => Value::Int(i),
        Reply::Bulk(None) | Reply::Array(None) => Value::Nil,
        Reply::Bulk(Some(b)) => Value::Data(b),
        Reply::Array(Some(items)) => Value::List(items.into_iter().map(raw).collect()),
    }
}

fn reply_text(reply: Reply) -> Result<String> {
    match reply {
        Reply::Bulk(Some(b)) => Ok(String::from_utf8_lossy(&b).into_owned()),
        Reply::Status(s) => Ok(s),
        Reply::Integer(i) => Ok(i.to_string()),
        other => Err(CacheError::protocol_error(
            "decode",
            format!("Expected string element, got {}", other.type_name()),
        )),
    }
}

fn pairs(items: Vec<Reply>) -> Result<Vec<(String, Value)>> {
    if items.len() % 2 != 0 {
        return Err(CacheError::protocol_error(
            "decode",
            format!("Odd number of elements ({}) in field/value reply", items.len()),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.push((reply_text(k)?, raw(v)));
    }
    Ok(out)
}

fn scores(items: Vec<Reply>) -> Result<Vec<(String, f64)>> {
    if items.len() % 2 != 0 {
        return Err(CacheError::protocol_error(
            "decode",
            format!("Odd number of elements ({}) in member/score reply", items.len()),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let score = reply_text(score)?;
        out.push((reply_text(member)?, parse_redis_float(score.as_bytes())?));
    }
    Ok(out)
}

fn scan_page(reply: Reply) -> Result<(u64, Vec<Reply>)> {
    let mut parts = match reply {
        Reply::Array(Some(parts)) if !parts.is_empty() => parts.into_iter(),
        other => {
            return Err(CacheError::protocol_error(
                "scan",
                format!("Expected [cursor, items], got {}", other.type_name()),
            ))
        }
    };
    let cursor_text = parts.next().map(reply_text).transpose()?.unwrap_or_default();
    let cursor = cursor_text.parse::<u64>().map_err(|_| {
        CacheError::protocol_error("scan", format!("Invalid cursor: {}", cursor_text))
    })?;
    let items = match parts.next() {
        Some(Reply::Array(Some(items))) => items,
        _ => Vec::new(),
    };
    Ok((cursor, items))
}

/// Parse INFO text into field/value pairs, skipping section headers
pub fn info(text: &str) -> Vec<(String, Value)> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), Value::Data(Bytes::copy_from_slice(v.as_bytes()))))
        .collect()
}

/// How command names are rewritten for servers that rename commands
#[derive(Clone)]
pub enum RenameStrategy {
    /// `md5(salt + command)` for every command
    Salted(String),
    /// Explicit map; unmapped commands pass through
    Map(HashMap<String, String>),
    /// Caller-supplied function
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl fmt::Debug for RenameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameStrategy::Salted(_) => f.write_str("Salted(..)"),
            RenameStrategy::Map(map) => f.debug_tuple("Map").field(map).finish(),
            RenameStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Applies a [`RenameStrategy`], caching each computed name
#[derive(Debug, Default)]
pub struct CommandRenamer {
    strategy: Option<RenameStrategy>,
    cache: HashMap<String, Bytes>,
}

impl CommandRenamer {
    /// Create a renamer; `None` leaves names untouched
    pub fn new(strategy: Option<RenameStrategy>) -> Self {
        Self {
            strategy,
            cache: HashMap::new(),
        }
    }

    /// Replace the strategy, dropping cached names
    pub fn set_strategy(&mut self, strategy: Option<RenameStrategy>) {
        self.strategy = strategy;
        self.cache.clear();
    }

    /// Map one command to an alias, switching to a map strategy if needed
    pub fn rename(&mut self, command: &str, alias: &str) {
        let key = command.to_ascii_lowercase();
        match &mut self.strategy {
            Some(RenameStrategy::Map(map)) => {
                map.insert(key, alias.to_string());
            }
            _ => {
                let mut map = HashMap::new();
                map.insert(key, alias.to_string());
                self.strategy = Some(RenameStrategy::Map(map));
            }
        }
        self.cache.clear();
    }

    /// Name to put on the wire for `command`
    pub fn wire_name(&mut self, command: &str) -> Bytes {
        let strategy = match &self.strategy {
            None => return Bytes::copy_from_slice(command.as_bytes()),
            Some(strategy) => strategy,
        };
        let key = command.to_ascii_lowercase();
        if let Some(name) = self.cache.get(&key) {
            return name.clone();
        }
        let renamed = match strategy {
            RenameStrategy::Salted(salt) => format!("{:x}", md5::compute(format!("{}{}", salt, key))),
            RenameStrategy::Map(map) => match map.get(&key) {
                Some(alias) => alias.clone(),
                None => command.to_string(),
            },
            RenameStrategy::Custom(f) => f(&key),
        };
        let renamed = Bytes::from(renamed);
        self.cache.insert(key, renamed.clone());
        renamed
    }
}
