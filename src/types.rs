//! Typed values produced by the command layer

use crate::error::{CacheError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// A reply after command-specific shaping
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing key, null bulk string or null array
    Nil,
    /// `+OK`
    Okay,
    /// Any other status reply
    Status(String),
    /// Integer reply
    Int(i64),
    /// Bulk string
    Data(Bytes),
    /// Array reply
    List(Vec<Value>),
    /// Field/value pairs, in reply order (HGETALL, CONFIG GET, HMGET, INFO)
    Map(Vec<(String, Value)>),
    /// Member/score pairs from a WITHSCORES range
    Scores(Vec<(String, f64)>),
    /// TTL/PTTL on a key that exists but has no expiry
    NoExpiry,
    /// One page of a cursor scan
    Page {
        /// Cursor to pass to the next call, 0 when the scan is complete
        cursor: u64,
        /// Items of this page, never `Nil`
        items: Box<Value>,
    },
}

impl Value {
    /// Null reply
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Okay => "ok",
            Value::Status(_) => "status",
            Value::Int(_) => "int",
            Value::Data(_) => "data",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Scores(_) => "scores",
            Value::NoExpiry => "no_expiry",
            Value::Page { .. } => "page",
        }
    }

    /// Borrow bulk data or status text as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Data(b) => Some(b),
            Value::Status(s) => Some(s.as_bytes()),
            Value::Okay => Some(b"OK"),
            _ => None,
        }
    }

    /// Text of a bulk string, status or integer
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Int(i) => Some(i.to_string()),
            other => other
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Integer value, parsing bulk strings when they hold a number
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Data(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthiness as the store reports it: `OK`, non-zero integers and
    /// non-empty data are true
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Okay | Value::NoExpiry => true,
            Value::Status(_) => true,
            Value::Int(i) => *i != 0,
            Value::Data(b) => !b.is_empty() && b.as_ref() != b"0",
            Value::List(items) => !items.is_empty(),
            Value::Map(items) => !items.is_empty(),
            Value::Scores(items) => !items.is_empty(),
            Value::Page { .. } => true,
        }
    }

    /// Member/score pairs of a WITHSCORES reply
    pub fn into_scores(self) -> Result<Vec<(String, f64)>> {
        match self {
            Value::Nil => Ok(Vec::new()),
            Value::Scores(pairs) => Ok(pairs),
            other => mismatch("scores", &other),
        }
    }

    /// Look up a field of a `Map` value
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == field).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Okay => write!(f, "OK"),
            Value::Status(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "(integer) {}", i),
            Value::Data(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Scores(pairs) => {
                write!(f, "{{")?;
                for (i, (m, s)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", m, s)?;
                }
                write!(f, "}}")
            }
            Value::NoExpiry => write!(f, "(no expiry)"),
            Value::Page { cursor, items } => write!(f, "cursor {} {}", cursor, items),
        }
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist
    Missing,
    /// Key exists without an expiry
    NoExpiry,
    /// Seconds (or milliseconds for PTTL) left
    Remaining(i64),
}

/// Conversion from a shaped [`Value`] into a Rust type
pub trait FromValue: Sized {
    /// Convert, failing with a protocol error on a shape mismatch
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(CacheError::protocol_error(
        "convert",
        format!("Expected {}, got {}", expected, value.type_name()),
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(_value: Value) -> Result<Self> {
        Ok(())
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value.as_bool())
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_int() {
            Some(i) => Ok(i),
            None => mismatch("integer", &value),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self> {
        let i = i64::from_value(value)?;
        u64::try_from(i)
            .map_err(|_| CacheError::protocol_error("convert", format!("Negative count: {}", i)))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Int(i) => Ok(*i as f64),
            Value::Data(b) => crate::utils::parse_redis_float(b),
            _ => mismatch("float", &value),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_string() {
            Some(s) => Ok(s),
            None => mismatch("string", &value),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Data(b) => Ok(b),
            other => match other.as_string() {
                Some(s) => Ok(Bytes::from(s)),
                None => mismatch("data", &other),
            },
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            Value::Page { items, .. } => Self::from_value(*items),
            other => mismatch("list", &other),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(HashMap::new()),
            Value::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("map", &other),
        }
    }
}

impl FromValue for Ttl {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::NoExpiry => Ok(Ttl::NoExpiry),
            Value::Int(-2) => Ok(Ttl::Missing),
            Value::Int(n) => Ok(Ttl::Remaining(n)),
            other => mismatch("ttl", &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(i64::from_value(Value::Data(Bytes::from("42"))).unwrap(), 42);
        assert_eq!(String::from_value(Value::Int(7)).unwrap(), "7");
        assert_eq!(
            Option::<String>::from_value(Value::Nil).unwrap(),
            None
        );
        assert!(i64::from_value(Value::List(vec![])).is_err());
        assert!(bool::from_value(Value::Okay).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
    }

    #[test]
    fn test_ttl_mapping() {
        assert_eq!(Ttl::from_value(Value::NoExpiry).unwrap(), Ttl::NoExpiry);
        assert_eq!(Ttl::from_value(Value::Int(-2)).unwrap(), Ttl::Missing);
        assert_eq!(Ttl::from_value(Value::Int(30)).unwrap(), Ttl::Remaining(30));
    }

    #[test]
    fn test_map_lookup() {
        let v = Value::Map(vec![
            ("name".into(), Value::Data(Bytes::from("x"))),
            ("age".into(), Value::Nil),
        ]);
        assert_eq!(v.get("name"), Some(&Value::Data(Bytes::from("x"))));
        assert_eq!(v.get("missing"), None);
        let map: HashMap<String, Option<String>> = FromValue::from_value(v).unwrap();
        assert_eq!(map["age"], None);
    }

    #[test]
    fn test_page_into_vec() {
        let page = Value::Page {
            cursor: 0,
            items: Box::new(Value::List(vec![Value::Data(Bytes::from("k"))])),
        };
        let keys: Vec<String> = FromValue::from_value(page).unwrap();
        assert_eq!(keys, vec!["k".to_string()]);
    }
}
