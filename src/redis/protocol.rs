//! RESP wire codec
//!
//! Requests are always sent as arrays of bulk strings. Replies are decoded
//! into [`Reply`] without any knowledge of the command that produced them;
//! command-specific shaping happens in [`crate::redis::commands`].

use crate::error::{CacheError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// Line terminator used by the protocol
pub const CRLF: &[u8] = b"\r\n";

/// A command as it goes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Wire name (after aliasing and renaming)
    pub name: Bytes,
    /// Ordered arguments
    pub args: Vec<Bytes>,
}

impl Command {
    /// Create a command from a name and arguments
    pub fn new(name: impl Into<Bytes>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Serialize command to RESP format
    pub fn to_resp(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Append the RESP encoding of the command to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(b'*');
        dst.put_slice((self.args.len() + 1).to_string().as_bytes());
        dst.put_slice(CRLF);
        write_bulk(dst, &self.name);
        for arg in &self.args {
            write_bulk(dst, arg);
        }
    }

    fn encoded_len(&self) -> usize {
        std::iter::once(&self.name)
            .chain(self.args.iter())
            .map(|a| a.len() + 16)
            .sum::<usize>()
            + 16
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.name))?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

fn write_bulk(dst: &mut BytesMut, data: &[u8]) {
    dst.put_u8(b'$');
    dst.put_slice(data.len().to_string().as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Simple string (+)
    Status(String),
    /// Error (-)
    Error(String),
    /// Integer (:)
    Integer(i64),
    /// Bulk string ($), `None` for `$-1`
    Bulk(Option<Bytes>),
    /// Array (*), `None` for `*-1`
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// `+OK`
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    /// `+QUEUED`, sent for every command inside MULTI
    pub fn is_queued(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "QUEUED")
    }

    /// Null bulk string or null array
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    /// Get error message if this is an error
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Reply::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to string if this is a status or bulk string
    pub fn as_string(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bulk(Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// Convert to integer if this is an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(None) => "null_bulk_string",
            Reply::Bulk(Some(_)) => "bulk_string",
            Reply::Array(None) => "null_array",
            Reply::Array(Some(_)) => "array",
        }
    }

    /// Serialize the reply to RESP format
    pub fn to_resp(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Append the RESP encoding of the reply to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Reply::Error(s) => {
                dst.put_u8(b'-');
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Reply::Integer(i) => {
                dst.put_u8(b':');
                dst.put_slice(i.to_string().as_bytes());
                dst.put_slice(CRLF);
            }
            Reply::Bulk(None) => dst.put_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => write_bulk(dst, data),
            Reply::Array(None) => dst.put_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                dst.put_u8(b'*');
                dst.put_slice(items.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                for item in items {
                    item.write_to(dst);
                }
            }
        }
    }
}

/// Streaming RESP codec: encodes [`Command`]s and decodes [`Reply`]s
#[derive(Debug, Clone)]
pub struct RespCodec {
    /// Maximum allowed depth for nested arrays
    max_depth: usize,
    /// Maximum allowed bulk string size
    max_bulk_size: usize,
    /// Maximum allowed array size
    max_array_size: usize,
}

impl Default for RespCodec {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_bulk_size: 512 * 1024 * 1024, // 512MB
            max_array_size: 1024 * 1024,      // 1M elements
        }
    }
}

impl RespCodec {
    /// Create a codec with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with custom limits
    pub fn with_limits(max_depth: usize, max_bulk_size: usize, max_array_size: usize) -> Self {
        Self {
            max_depth,
            max_bulk_size,
            max_array_size,
        }
    }

    /// Try to parse one complete reply starting at `pos`.
    ///
    /// Returns the reply and the offset just past it, or `None` when the
    /// buffer does not yet hold a complete reply.
    fn parse(&self, buf: &[u8], pos: usize, depth: usize) -> Result<Option<(Reply, usize)>> {
        if depth > self.max_depth {
            return Err(CacheError::protocol_error(
                "decode",
                "Maximum nesting depth exceeded",
            ));
        }
        let line_end = match find_crlf(buf, pos) {
            Some(end) => end,
            None => return Ok(None),
        };
        if line_end == pos {
            return Err(CacheError::protocol_error("decode", "Empty reply line"));
        }
        let next = line_end + 2;
        let tag = buf[pos];
        let content = &buf[pos + 1..line_end];

        match tag {
            b'+' => Ok(Some((
                Reply::Status(String::from_utf8_lossy(content).into_owned()),
                next,
            ))),
            b'-' => Ok(Some((
                Reply::Error(String::from_utf8_lossy(content).into_owned()),
                next,
            ))),
            b':' => Ok(Some((Reply::Integer(parse_int(content, "integer")?), next))),
            b'$' => {
                let length = parse_int(content, "bulk string length")?;
                if length == -1 {
                    return Ok(Some((Reply::Bulk(None), next)));
                }
                if length < 0 {
                    return Err(CacheError::protocol_error(
                        "decode",
                        format!("Invalid bulk string length: {}", length),
                    ));
                }
                let length = length as usize;
                if length > self.max_bulk_size {
                    return Err(CacheError::protocol_error(
                        "decode",
                        format!("Bulk string too large: {} > {}", length, self.max_bulk_size),
                    ));
                }
                let end = next + length;
                if buf.len() < end + 2 {
                    return Ok(None);
                }
                if &buf[end..end + 2] != CRLF {
                    return Err(CacheError::protocol_error(
                        "decode",
                        "Missing CRLF after bulk string",
                    ));
                }
                let data = Bytes::copy_from_slice(&buf[next..end]);
                Ok(Some((Reply::Bulk(Some(data)), end + 2)))
            }
            b'*' => {
                let length = parse_int(content, "array length")?;
                if length == -1 {
                    return Ok(Some((Reply::Array(None), next)));
                }
                if length < 0 {
                    return Err(CacheError::protocol_error(
                        "decode",
                        format!("Invalid array length: {}", length),
                    ));
                }
                let length = length as usize;
                if length > self.max_array_size {
                    return Err(CacheError::protocol_error(
                        "decode",
                        format!("Array too large: {} > {}", length, self.max_array_size),
                    ));
                }
                let mut items = Vec::with_capacity(length.min(1024));
                let mut cursor = next;
                for _ in 0..length {
                    match self.parse(buf, cursor, depth + 1)? {
                        Some((item, after)) => {
                            items.push(item);
                            cursor = after;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((Reply::Array(Some(items)), cursor)))
            }
            other => Err(CacheError::protocol_error(
                "decode",
                format!(
                    "Invalid response: unknown type byte 0x{:02x} in {:?}",
                    other,
                    String::from_utf8_lossy(&buf[pos..line_end])
                ),
            )),
        }
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + 2 {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|p| p + from)
}

fn parse_int(content: &[u8], what: &str) -> Result<i64> {
    std::str::from_utf8(content)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            CacheError::protocol_error(
                "decode",
                format!("Invalid {}: {}", what, String::from_utf8_lossy(content)),
            )
        })
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = CacheError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.parse(src, 0, 0)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for RespCodec {
    type Error = CacheError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

/// Decode every complete reply in `data`, failing on trailing garbage
pub fn decode_all(data: &[u8]) -> Result<Vec<Reply>> {
    let mut codec = RespCodec::new();
    let mut buf = BytesMut::from(data);
    let mut replies = Vec::new();
    while let Some(reply) = codec.decode(&mut buf)? {
        replies.push(reply);
    }
    if !buf.is_empty() {
        return Err(CacheError::protocol_error(
            "decode",
            format!("{} trailing bytes after last complete reply", buf.len()),
        ));
    }
    Ok(replies)
}
