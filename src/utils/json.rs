//! JSON encoding of cached values
//!
//! Values are stored remotely as JSON text. On the way out, strings that look
//! like numbers are stored as numbers, so `"42"` and `42` read back the same.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value as Json};

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$")
        .expect("numeric pattern is valid")
});

/// Convert a numeric-looking string into a JSON number
fn numeric_string(s: &str) -> Option<Number> {
    if !NUMERIC.is_match(s) {
        return None;
    }
    let trimmed = s.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if let Ok(i) = unsigned.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = unsigned.parse::<u64>() {
        return Some(Number::from(u));
    }
    unsigned.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Recursively replace numeric-looking strings with numbers
pub fn coerce_numeric(value: Json) -> Json {
    match value {
        Json::String(s) => match numeric_string(&s) {
            Some(n) => Json::Number(n),
            None => Json::String(s),
        },
        Json::Array(items) => Json::Array(items.into_iter().map(coerce_numeric).collect()),
        Json::Object(map) => Json::Object(
            map.into_iter()
                .map(|(k, v)| (k, coerce_numeric(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Encode a value for remote storage
pub fn encode_json(value: &Json) -> Result<String> {
    Ok(serde_json::to_string(&coerce_numeric(value.clone()))?)
}

/// Decode a stored value; invalid UTF-8 is replaced, malformed JSON fails
pub fn decode_json(data: &[u8]) -> Result<Json> {
    let text = String::from_utf8_lossy(data);
    Ok(serde_json::from_str(&text)?)
}
