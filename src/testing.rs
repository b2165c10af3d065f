//! In-memory RESP server for tests
//!
//! Speaks the wire protocol over a loopback listener and keeps a small
//! keyspace in memory: strings with expiry, hashes, sorted sets,
//! transactions with WATCH, and channel/pattern pub/sub.

use crate::cache::CacheRepository;
use crate::redis::client::{RedisClient, RedisClientConfig};
use crate::redis::key_type;
use crate::redis::protocol::{Reply, RespCodec};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;

const INFO: &str = "# Server\r\nredis_version:7.0.0\r\nredis_mode:standalone\r\n\r\n# Keyspace\r\n";

/// Commands that can be queued inside MULTI
const KNOWN: &[&str] = &[
    "ping", "echo", "info", "dbsize", "get", "set", "setex", "expire", "persist", "ttl",
    "pttl", "exists", "type", "del", "keys", "scan", "incr", "incrby", "decr", "decrby", "flushdb",
    "flushall", "hset", "hmset", "hget", "hgetall", "hmget", "zadd", "zrange", "evalsha",
];

enum Data {
    Str(Bytes),
    Hash(BTreeMap<String, Bytes>),
    Zset(Vec<(String, f64)>),
}

struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Reply>,
    channels: BTreeSet<String>,
    patterns: BTreeSet<String>,
}

impl Subscriber {
    fn count(&self) -> i64 {
        (self.channels.len() + self.patterns.len()) as i64
    }
}

#[derive(Default)]
struct State {
    dbs: HashMap<u32, BTreeMap<String, Entry>>,
    versions: HashMap<String, u64>,
    clock: u64,
    password: Option<String>,
    selected: u32,
    renamed: HashMap<String, String>,
    hidden: HashSet<String>,
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
    // close the next connection that sends a command, without replying
    hang_up: bool,
}

#[derive(Default)]
struct Conn {
    db: u32,
    authed: bool,
    multi: Option<Vec<(String, Vec<Bytes>)>>,
    watched: Vec<(String, u64)>,
}

fn text(b: &Bytes) -> String {
    String::from_utf8_lossy(b).into_owned()
}

fn int(b: &Bytes) -> Option<i64> {
    std::str::from_utf8(b).ok()?.parse().ok()
}

fn bulk(s: impl Into<Bytes>) -> Reply {
    Reply::Bulk(Some(s.into()))
}

fn ok() -> Reply {
    Reply::Status("OK".into())
}

fn err(message: impl Into<String>) -> Reply {
    Reply::Error(message.into())
}

fn wrongtype() -> Reply {
    err("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn not_int() -> Reply {
    err("ERR value is not an integer or out of range")
}

fn array(items: Vec<Reply>) -> Reply {
    Reply::Array(Some(items))
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some((b'[', rest)) => match rest.iter().position(|&c| c == b']') {
            Some(end) => {
                !text.is_empty()
                    && class_match(&rest[..end], text[0])
                    && glob_match(&rest[end + 1..], &text[1..])
            }
            None => text.first() == Some(&b'[') && glob_match(rest, &text[1..]),
        },
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

fn class_match(class: &[u8], c: u8) -> bool {
    let (negate, class) = match class.split_first() {
        Some((b'^', rest)) => (true, rest),
        _ => (false, class),
    };
    let mut found = false;
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == b'-' {
            found |= class[i] <= c && c <= class[i + 2];
            i += 3;
        } else {
            found |= class[i] == c;
            i += 1;
        }
    }
    found != negate
}

impl State {
    fn db(&mut self, db: u32) -> &mut BTreeMap<String, Entry> {
        let now = Instant::now();
        let map = self.dbs.entry(db).or_default();
        map.retain(|_, e| e.expires_at.map_or(true, |t| t > now));
        map
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn store(&mut self, db: u32, key: String, data: Data, ttl: Option<Duration>) {
        self.touch(&key);
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.db(db).insert(key, Entry { data, expires_at });
    }

    fn string(&mut self, db: u32, key: &str) -> Result<Option<Bytes>, Reply> {
        match self.db(db).get(key).map(|e| &e.data) {
            None => Ok(None),
            Some(Data::Str(v)) => Ok(Some(v.clone())),
            Some(_) => Err(wrongtype()),
        }
    }

    fn hash_mut(&mut self, db: u32, key: &str) -> Result<&mut BTreeMap<String, Bytes>, Reply> {
        self.touch(key);
        let entry = self.db(db).entry(key.to_string()).or_insert_with(|| Entry {
            data: Data::Hash(BTreeMap::new()),
            expires_at: None,
        });
        match &mut entry.data {
            Data::Hash(h) => Ok(h),
            _ => Err(wrongtype()),
        }
    }

    fn incr_by(&mut self, db: u32, key: &Bytes, delta: i64) -> Reply {
        let key = text(key);
        let current = match self.string(db, &key) {
            Ok(None) => 0,
            Ok(Some(v)) => match int(&v) {
                Some(i) => i,
                None => return not_int(),
            },
            Err(e) => return e,
        };
        let next = match current.checked_add(delta) {
            Some(n) => n,
            None => return err("ERR increment or decrement would overflow"),
        };
        let expires_at = self.db(db).get(&key).and_then(|e| e.expires_at);
        self.touch(&key);
        self.db(db).insert(
            key,
            Entry {
                data: Data::Str(Bytes::from(next.to_string())),
                expires_at,
            },
        );
        Reply::Integer(next)
    }

    fn set(&mut self, db: u32, key: &Bytes, value: &Bytes, opts: &[Bytes]) -> Reply {
        let key = text(key);
        let mut ttl = None;
        let mut nx = false;
        let mut xx = false;
        let mut i = 0;
        while i < opts.len() {
            match text(&opts[i]).to_ascii_uppercase().as_str() {
                "NX" => nx = true,
                "XX" => xx = true,
                "EX" | "PX" => {
                    let unit = text(&opts[i]).to_ascii_uppercase();
                    let amount = match opts.get(i + 1).and_then(int) {
                        Some(n) if n > 0 => n as u64,
                        _ => return err("ERR invalid expire time in 'set' command"),
                    };
                    ttl = Some(if unit == "EX" {
                        Duration::from_secs(amount)
                    } else {
                        Duration::from_millis(amount)
                    });
                    i += 1;
                }
                _ => return err("ERR syntax error"),
            }
            i += 1;
        }
        let exists = self.db(db).contains_key(&key);
        if (nx && exists) || (xx && !exists) {
            return Reply::Bulk(None);
        }
        self.store(db, key, Data::Str(value.clone()), ttl);
        ok()
    }

    fn zrange(&mut self, db: u32, key: &Bytes, start: &Bytes, stop: &Bytes, opts: &[Bytes]) -> Reply {
        let (start, stop) = match (int(start), int(stop)) {
            (Some(a), Some(b)) => (a, b),
            _ => return not_int(),
        };
        let with_scores = opts
            .first()
            .map_or(false, |o| text(o).eq_ignore_ascii_case("withscores"));
        let members = match self.db(db).get(&text(key)).map(|e| &e.data) {
            None => return array(Vec::new()),
            Some(Data::Zset(members)) => members.clone(),
            Some(_) => return wrongtype(),
        };
        let len = members.len() as i64;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return array(Vec::new());
        }
        let mut out = Vec::new();
        for (member, score) in &members[start as usize..=stop as usize] {
            out.push(bulk(member.clone()));
            if with_scores {
                out.push(bulk(crate::utils::format_score(*score)));
            }
        }
        array(out)
    }

    fn exec_cmd(&mut self, db: u32, cmd: &str, args: &[Bytes]) -> Reply {
        match (cmd, args) {
            ("ping", []) => Reply::Status("PONG".into()),
            ("ping", [msg]) | ("echo", [msg]) => bulk(msg.clone()),
            ("info", _) => bulk(INFO),
            ("dbsize", []) => Reply::Integer(self.db(db).len() as i64),
            ("get", [key]) => match self.string(db, &text(key)) {
                Ok(v) => Reply::Bulk(v),
                Err(e) => e,
            },
            ("set", [key, value, opts @ ..]) => self.set(db, key, value, opts),
            ("setex", [key, secs, value]) => match int(secs) {
                Some(s) if s > 0 => {
                    let ttl = Duration::from_secs(s as u64);
                    self.store(db, text(key), Data::Str(value.clone()), Some(ttl));
                    ok()
                }
                _ => err("ERR invalid expire time in 'setex' command"),
            },
            ("expire", [key, secs]) => {
                let secs = match int(secs) {
                    Some(s) => s,
                    None => return not_int(),
                };
                let key = text(key);
                self.touch(&key);
                match self.db(db).get_mut(&key) {
                    Some(entry) => {
                        entry.expires_at = Some(Instant::now() + Duration::from_secs(secs.max(0) as u64));
                        Reply::Integer(1)
                    }
                    None => Reply::Integer(0),
                }
            }
            ("persist", [key]) => match self.db(db).get_mut(&text(key)) {
                Some(entry) if entry.expires_at.is_some() => {
                    entry.expires_at = None;
                    Reply::Integer(1)
                }
                _ => Reply::Integer(0),
            },
            ("ttl", [key]) | ("pttl", [key]) => {
                let millis = cmd == "pttl";
                match self.db(db).get(&text(key)) {
                    None => Reply::Integer(-2),
                    Some(Entry { expires_at: None, .. }) => Reply::Integer(-1),
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let left = at.saturating_duration_since(Instant::now()).as_millis() as i64;
                        Reply::Integer(if millis { left } else { (left + 500) / 1000 })
                    }
                }
            }
            ("exists", keys) if !keys.is_empty() => {
                let map = self.db(db);
                Reply::Integer(keys.iter().filter(|k| map.contains_key(&text(k))).count() as i64)
            }
            ("type", [key]) => Reply::Status(
                match self.db(db).get(&text(key)).map(|entry| &entry.data) {
                    None => key_type::NONE,
                    Some(Data::Str(_)) => key_type::STRING,
                    Some(Data::Hash(_)) => key_type::HASH,
                    Some(Data::Zset(_)) => key_type::ZSET,
                }
                .into(),
            ),
            ("del", keys) if !keys.is_empty() => {
                let mut removed = 0;
                for key in keys {
                    let key = text(key);
                    if self.db(db).remove(&key).is_some() {
                        self.touch(&key);
                        removed += 1;
                    }
                }
                Reply::Integer(removed)
            }
            ("keys", [pattern]) => array(
                self.db(db)
                    .keys()
                    .filter(|k| glob_match(pattern, k.as_bytes()))
                    .map(|k| bulk(k.clone()))
                    .collect(),
            ),
            ("scan", [cursor, opts @ ..]) => {
                let cursor = match int(cursor) {
                    Some(c) if c >= 0 => c as usize,
                    _ => return err("ERR invalid cursor"),
                };
                let mut pattern = None;
                let mut count = 10usize;
                for pair in opts.chunks(2) {
                    match pair {
                        [name, value] if text(name).eq_ignore_ascii_case("match") => {
                            pattern = Some(value.clone())
                        }
                        [name, value] if text(name).eq_ignore_ascii_case("count") => {
                            count = int(value).unwrap_or(10).max(1) as usize
                        }
                        _ => return err("ERR syntax error"),
                    }
                }
                let keys: Vec<String> = self.db(db).keys().cloned().collect();
                let end = (cursor + count).min(keys.len());
                let page = keys
                    .get(cursor..end)
                    .unwrap_or(&[])
                    .iter()
                    .filter(|k| pattern.as_ref().map_or(true, |p| glob_match(p, k.as_bytes())))
                    .map(|k| bulk(k.clone()))
                    .collect();
                let next = if end >= keys.len() { 0 } else { end };
                array(vec![bulk(next.to_string()), array(page)])
            }
            ("incr", [key]) => self.incr_by(db, key, 1),
            ("decr", [key]) => self.incr_by(db, key, -1),
            ("incrby", [key, delta]) => match int(delta) {
                Some(d) => self.incr_by(db, key, d),
                None => not_int(),
            },
            ("decrby", [key, delta]) => match int(delta) {
                Some(d) => self.incr_by(db, key, -d),
                None => not_int(),
            },
            ("flushdb", []) => {
                let keys: Vec<String> = self.db(db).keys().cloned().collect();
                keys.iter().for_each(|k| self.touch(k));
                self.db(db).clear();
                ok()
            }
            ("flushall", []) => {
                let keys: Vec<String> = self.dbs.values().flat_map(|m| m.keys().cloned()).collect();
                keys.iter().for_each(|k| self.touch(k));
                self.dbs.clear();
                ok()
            }
            ("hset", [key, pairs @ ..]) | ("hmset", [key, pairs @ ..])
                if !pairs.is_empty() && pairs.len() % 2 == 0 =>
            {
                let hash = match self.hash_mut(db, &text(key)) {
                    Ok(h) => h,
                    Err(e) => return e,
                };
                let mut added = 0;
                for pair in pairs.chunks(2) {
                    if hash.insert(text(&pair[0]), pair[1].clone()).is_none() {
                        added += 1;
                    }
                }
                if cmd == "hmset" {
                    ok()
                } else {
                    Reply::Integer(added)
                }
            }
            ("hget", [key, field]) => match self.db(db).get(&text(key)).map(|e| &e.data) {
                None => Reply::Bulk(None),
                Some(Data::Hash(h)) => Reply::Bulk(h.get(&text(field)).cloned()),
                Some(_) => wrongtype(),
            },
            ("hgetall", [key]) => match self.db(db).get(&text(key)).map(|e| &e.data) {
                None => array(Vec::new()),
                Some(Data::Hash(h)) => array(
                    h.iter()
                        .flat_map(|(f, v)| [bulk(f.clone()), bulk(v.clone())])
                        .collect(),
                ),
                Some(_) => wrongtype(),
            },
            ("hmget", [key, fields @ ..]) if !fields.is_empty() => {
                match self.db(db).get(&text(key)).map(|e| &e.data) {
                    None => array(fields.iter().map(|_| Reply::Bulk(None)).collect()),
                    Some(Data::Hash(h)) => array(
                        fields
                            .iter()
                            .map(|f| Reply::Bulk(h.get(&text(f)).cloned()))
                            .collect(),
                    ),
                    Some(_) => wrongtype(),
                }
            }
            ("zadd", [key, pairs @ ..]) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let key = text(key);
                let mut parsed = Vec::new();
                for pair in pairs.chunks(2) {
                    match crate::utils::parse_redis_float(&pair[0]) {
                        Ok(score) => parsed.push((text(&pair[1]), score)),
                        Err(_) => return err("ERR value is not a valid float"),
                    }
                }
                self.touch(&key);
                let entry = self.db(db).entry(key).or_insert_with(|| Entry {
                    data: Data::Zset(Vec::new()),
                    expires_at: None,
                });
                let members = match &mut entry.data {
                    Data::Zset(m) => m,
                    _ => return wrongtype(),
                };
                let mut added = 0;
                for (member, score) in parsed {
                    match members.iter_mut().find(|(m, _)| *m == member) {
                        Some(existing) => existing.1 = score,
                        None => {
                            members.push((member, score));
                            added += 1;
                        }
                    }
                }
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Reply::Integer(added)
            }
            ("zrange", [key, start, stop, opts @ ..]) => self.zrange(db, key, start, stop, opts),
            ("evalsha", _) => err("NOSCRIPT No matching script. Please use EVAL."),
            (name, _) if KNOWN.contains(&name) => {
                err(format!("ERR wrong number of arguments for '{}' command", name))
            }
            (name, _) => err(format!("ERR unknown command '{}'", name)),
        }
    }

    fn subscription(&mut self, id: u64, cmd: &str, names: &[Bytes]) -> Vec<Reply> {
        let sub = match self.subscribers.get_mut(&id) {
            Some(sub) => sub,
            None => return vec![err("ERR connection is gone")],
        };
        let pattern = cmd.starts_with('p');
        let ack = |name: Reply, count: i64| array(vec![bulk(cmd.to_string()), name, Reply::Integer(count)]);
        match cmd {
            "subscribe" | "psubscribe" => {
                if names.is_empty() {
                    return vec![err(format!("ERR wrong number of arguments for '{}' command", cmd))];
                }
                names
                    .iter()
                    .map(|name| {
                        if pattern {
                            sub.patterns.insert(text(name));
                        } else {
                            sub.channels.insert(text(name));
                        }
                        ack(bulk(name.clone()), sub.count())
                    })
                    .collect()
            }
            _ => {
                let set = if pattern { &sub.patterns } else { &sub.channels };
                let targets: Vec<String> = if names.is_empty() {
                    set.iter().cloned().collect()
                } else {
                    names.iter().map(text).collect()
                };
                if targets.is_empty() {
                    return vec![ack(Reply::Bulk(None), sub.count())];
                }
                targets
                    .into_iter()
                    .map(|name| {
                        if pattern {
                            sub.patterns.remove(&name);
                        } else {
                            sub.channels.remove(&name);
                        }
                        ack(bulk(name), sub.count())
                    })
                    .collect()
            }
        }
    }

    fn publish(&self, channel: &Bytes, message: &Bytes) -> Reply {
        let name = text(channel);
        let mut receivers = 0;
        for sub in self.subscribers.values() {
            if sub.channels.contains(&name) {
                let frame = array(vec![bulk("message"), bulk(channel.clone()), bulk(message.clone())]);
                if sub.tx.send(frame).is_ok() {
                    receivers += 1;
                }
            }
            for pattern in sub.patterns.iter().filter(|p| glob_match(p.as_bytes(), channel)) {
                let frame = array(vec![
                    bulk("pmessage"),
                    bulk(pattern.clone()),
                    bulk(channel.clone()),
                    bulk(message.clone()),
                ]);
                if sub.tx.send(frame).is_ok() {
                    receivers += 1;
                }
            }
        }
        Reply::Integer(receivers)
    }
}

fn handle(shared: &Mutex<State>, id: u64, conn: &mut Conn, args: Vec<Bytes>) -> Vec<Reply> {
    let mut state = shared.lock();
    let (name, rest) = match args.split_first() {
        Some(split) => split,
        None => return vec![err("ERR empty command")],
    };
    let wire = text(name).to_ascii_lowercase();
    let cmd = match state.renamed.get(&wire) {
        Some(canonical) => canonical.clone(),
        None if state.hidden.contains(&wire) => {
            return vec![err(format!("ERR unknown command '{}'", wire))]
        }
        None => wire,
    };

    if state.password.is_some() && !conn.authed && cmd != "auth" {
        return vec![err("NOAUTH Authentication required.")];
    }

    match (cmd.as_str(), rest) {
        ("auth", [password]) => match &state.password {
            None => vec![err("ERR AUTH <password> called without any password configured")],
            Some(expected) if expected.as_bytes() == password.as_ref() => {
                conn.authed = true;
                vec![ok()]
            }
            Some(_) => vec![err("WRONGPASS invalid username-password pair")],
        },
        ("select", [db]) => match int(db) {
            Some(n) if n >= 0 => {
                conn.db = n as u32;
                state.selected = n as u32;
                vec![ok()]
            }
            _ => vec![err("ERR DB index is out of range")],
        },
        // never answers, for read timeout tests
        ("debug", _) => vec![],
        ("multi", []) => {
            if conn.multi.is_some() {
                return vec![err("ERR MULTI calls can not be nested")];
            }
            conn.multi = Some(Vec::new());
            vec![ok()]
        }
        ("exec", []) => match conn.multi.take() {
            None => vec![err("ERR EXEC without MULTI")],
            Some(queued) => {
                let watched = std::mem::take(&mut conn.watched);
                if watched.iter().any(|(k, v)| state.version(k) != *v) {
                    return vec![Reply::Array(None)];
                }
                let db = conn.db;
                vec![array(
                    queued
                        .iter()
                        .map(|(c, a)| state.exec_cmd(db, c, a))
                        .collect(),
                )]
            }
        },
        ("discard", []) => match conn.multi.take() {
            None => vec![err("ERR DISCARD without MULTI")],
            Some(_) => {
                conn.watched.clear();
                vec![ok()]
            }
        },
        ("watch", keys) if !keys.is_empty() => {
            if conn.multi.is_some() {
                return vec![err("ERR WATCH inside MULTI is not allowed")];
            }
            for key in keys {
                let key = text(key);
                let version = state.version(&key);
                conn.watched.push((key, version));
            }
            vec![ok()]
        }
        ("unwatch", []) => {
            conn.watched.clear();
            vec![ok()]
        }
        ("subscribe", _) | ("psubscribe", _) | ("unsubscribe", _) | ("punsubscribe", _) => {
            state.subscription(id, &cmd, rest)
        }
        ("publish", [channel, message]) => vec![state.publish(channel, message)],
        (name, _) if conn.multi.is_some() => {
            if KNOWN.contains(&name) {
                if let Some(queue) = conn.multi.as_mut() {
                    queue.push((name.to_string(), rest.to_vec()));
                }
                vec![Reply::Status("QUEUED".into())]
            } else {
                vec![err(format!("ERR unknown command '{}'", name))]
            }
        }
        (name, _) => vec![state.exec_cmd(conn.db, name, rest)],
    }
}

async fn serve(shared: Arc<Mutex<State>>, stream: TcpStream, mut shutdown: watch::Receiver<u64>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut requests = FramedRead::new(read_half, RespCodec::new());
    let (tx, mut pushed) = mpsc::unbounded_channel();
    let id = {
        let mut state = shared.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(
            id,
            Subscriber {
                tx,
                channels: BTreeSet::new(),
                patterns: BTreeSet::new(),
            },
        );
        id
    };
    let mut conn = Conn::default();

    loop {
        let replies = tokio::select! {
            // pushed messages go out before the next request is answered
            biased;
            Some(message) = pushed.recv() => vec![message],
            _ = shutdown.changed() => break,
            frame = requests.next() => match frame {
                Some(Ok(Reply::Array(Some(items)))) => {
                    if std::mem::take(&mut shared.lock().hang_up) {
                        break;
                    }
                    let args = items
                        .into_iter()
                        .filter_map(|r| match r {
                            Reply::Bulk(Some(b)) => Some(b),
                            _ => None,
                        })
                        .collect();
                    handle(&shared, id, &mut conn, args)
                }
                _ => break,
            },
        };
        let mut buf = BytesMut::new();
        for reply in &replies {
            reply.write_to(&mut buf);
        }
        if write_half.write_all(&buf).await.is_err() {
            break;
        }
    }

    shared.lock().subscribers.remove(&id);
}

/// Handle to a running fake server
pub(crate) struct FakeRedis {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    shutdown: watch::Sender<u64>,
}

impl FakeRedis {
    pub(crate) async fn start() -> Self {
        Self::launch(None).await
    }

    pub(crate) async fn start_with_password(password: &str) -> Self {
        Self::launch(Some(password.to_string())).await
    }

    async fn launch(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("fake server address");
        let state = Arc::new(Mutex::new(State {
            password,
            ..Default::default()
        }));
        let (shutdown, watcher) = watch::channel(0u64);

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut conn_shutdown = watcher.clone();
                conn_shutdown.borrow_and_update();
                tokio::spawn(serve(accept_state.clone(), stream, conn_shutdown));
            }
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub(crate) fn client_config(&self) -> RedisClientConfig {
        RedisClientConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            password: self.state.lock().password.clone(),
            ..Default::default()
        }
    }

    /// Repository mirrored to this server
    pub(crate) fn repository(&self) -> CacheRepository {
        let client = RedisClient::new(self.client_config()).expect("client for fake server");
        CacheRepository::with_client(client)
    }

    /// Database chosen by the last SELECT
    pub(crate) fn selected_db(&self) -> u32 {
        self.state.lock().selected
    }

    /// Close every open client connection from the server side
    pub(crate) async fn drop_connections(&self) {
        self.shutdown.send_modify(|generation| *generation += 1);
        tokio::task::yield_now().await;
    }

    /// Drop the connection that sends the next command before answering it
    pub(crate) fn hang_up_on_next_command(&self) {
        self.state.lock().hang_up = true;
    }

    /// Serve `command` under `alias` only
    pub(crate) fn rename_command(&self, command: &str, alias: &str) {
        let mut state = self.state.lock();
        state.hidden.insert(command.to_ascii_lowercase());
        state
            .renamed
            .insert(alias.to_ascii_lowercase(), command.to_ascii_lowercase());
    }

    /// Keys currently stored in database 0
    pub(crate) fn keys(&self) -> Vec<String> {
        self.state.lock().db(0).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"a*", b"a1"));
        assert!(!glob_match(b"a*", b"b1"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"k\\[1\\]*", b"k[1]x"));
        assert!(!glob_match(b"k\\[1\\]*", b"k1x"));
    }
}
