//! Utility functions and helpers

pub mod json;
pub mod mask;

pub use json::{decode_json, encode_json, coerce_numeric};
pub use mask::{is_mask, mask_to_glob, mask_to_regex, filter_keys};

use crate::error::{CacheError, Result};

/// Check if a string needs to be represented with quotes
pub fn string_needs_repr(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }

    s.chars()
        .any(|ch| ch.is_control() || ch.is_whitespace() || ch == '"' || ch == '\\')
}

/// Escape a string for log output
pub fn string_repr(s: &str) -> String {
    if !string_needs_repr(s) {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for ch in s.chars() {
        match ch {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => result.push(c),
        }
    }

    result.push('"');
    result
}

/// Render a command and its arguments for a debug log line, eliding long
/// payloads
pub fn command_repr(name: &[u8], args: &[bytes::Bytes]) -> String {
    const MAX_ARG: usize = 64;
    let mut out = String::from_utf8_lossy(name).into_owned();
    for arg in args {
        out.push(' ');
        let text = String::from_utf8_lossy(arg);
        if text.chars().count() > MAX_ARG {
            let head: String = text.chars().take(MAX_ARG).collect();
            out.push_str(&string_repr(&head));
            out.push_str(&format!("...({} bytes)", arg.len()));
        } else {
            out.push_str(&string_repr(&text));
        }
    }
    out
}

/// Parse a Redis integer from bytes
pub fn parse_redis_int(data: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(data)
        .map_err(|e| CacheError::protocol_error("int", format!("Invalid UTF-8: {}", e)))?;

    s.trim()
        .parse::<i64>()
        .map_err(|e| CacheError::protocol_error("int", format!("Invalid integer: {}", e)))
}

/// Parse a Redis float from bytes
pub fn parse_redis_float(data: &[u8]) -> Result<f64> {
    let s = std::str::from_utf8(data)
        .map_err(|e| CacheError::protocol_error("float", format!("Invalid UTF-8: {}", e)))?;

    match s {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => s
            .parse::<f64>()
            .map_err(|e| CacheError::protocol_error("float", format!("Invalid float: {}", e))),
    }
}

/// Format a score the way the store expects it on the wire
pub fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}
