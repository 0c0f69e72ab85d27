use std::collections::VecDeque;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::zset::ZSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Set,
    Hash,
    ZSet,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::Hash => "hash",
            KeyType::ZSet => "zset",
        }
    }
}

/// A stored value. Each key holds exactly one variant at a time; commands
/// check the variant before reading or mutating and fail with WRONGTYPE on
/// a mismatch.
///
/// Hash fields keep insertion order, matching the original's observable
/// enumeration order for HGETALL/HKEYS/HSCAN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(IndexSet<Vec<u8>>),
    Hash(IndexMap<String, Vec<u8>>),
    ZSet(ZSet),
}

impl Value {
    pub fn key_type(&self) -> KeyType {
        match self {
            Value::String(_) => KeyType::String,
            Value::List(_) => KeyType::List,
            Value::Set(_) => KeyType::Set,
            Value::Hash(_) => KeyType::Hash,
            Value::ZSet(_) => KeyType::ZSet,
        }
    }

    /// Whether the collection variants are empty. Strings never count as
    /// empty: an empty string is still a live value.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }

    pub fn as_string(&self) -> Option<&Vec<u8>> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Vec<u8>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Vec<u8>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&IndexSet<Vec<u8>>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&IndexMap<String, Vec<u8>>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_zset(&self) -> Option<&ZSet> {
        match self {
            Value::ZSet(z) => Some(z),
            _ => None,
        }
    }
}

/// Member of a sorted set with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ZMember {
    pub score: f64,
    pub member: Vec<u8>,
}

impl ZMember {
    pub fn new(score: f64, member: impl Into<Vec<u8>>) -> Self {
        Self {
            score,
            member: member.into(),
        }
    }
}

/// Options for SET.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub nx: bool,
    pub xx: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nx(mut self) -> Self {
        self.nx = true;
        self
    }

    pub fn xx(mut self) -> Self {
        self.xx = true;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Reducer applied across source keys by ZUNIONSTORE/ZINTERSTORE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Some(Aggregate::Sum),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            _ => None,
        }
    }
}

/// Connection configuration. Handles built with equal host/port/namespace
/// share the same database array, emulating multiple clients against one
/// logical server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub namespace: Option<String>,
    pub backend: Backend,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            namespace: None,
            backend: Backend::default(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Identity under which the database array is registered.
    pub fn instance_key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}:{}", self.host, self.port, ns),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Lenient string→integer coercion: an optional sign followed by leading
/// digits, anything else (or nothing) is 0. This matches the original's
/// behavior for numeric commands on non-numeric values.
pub(crate) fn coerce_i64(bytes: &[u8]) -> i64 {
    let s = String::from_utf8_lossy(bytes);
    let s = s.trim_start();
    let mut end = 0;
    let b = s.as_bytes();
    if end < b.len() && (b[end] == b'+' || b[end] == b'-') {
        end += 1;
    }
    while end < b.len() && b[end].is_ascii_digit() {
        end += 1;
    }
    s[..end].parse::<i64>().unwrap_or(0)
}

/// Lenient string→float coercion, same policy as [`coerce_i64`].
pub(crate) fn coerce_f64(bytes: &[u8]) -> f64 {
    let s = String::from_utf8_lossy(bytes);
    let s = s.trim_start();
    let b = s.as_bytes();
    let mut end = 0;
    if end < b.len() && (b[end] == b'+' || b[end] == b'-') {
        end += 1;
    }
    while end < b.len() && b[end].is_ascii_digit() {
        end += 1;
    }
    if end < b.len() && b[end] == b'.' {
        end += 1;
        while end < b.len() && b[end].is_ascii_digit() {
            end += 1;
        }
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

/// Render a float the way the server does: integral values lose the
/// trailing `.0`, everything else uses the shortest round-trip form.
pub(crate) fn format_float(value: f64) -> String {
    if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_i64() {
        assert_eq!(coerce_i64(b"12"), 12);
        assert_eq!(coerce_i64(b"-3"), -3);
        assert_eq!(coerce_i64(b"12abc"), 12);
        assert_eq!(coerce_i64(b"abc"), 0);
        assert_eq!(coerce_i64(b""), 0);
    }

    #[test]
    fn test_coerce_f64() {
        assert_eq!(coerce_f64(b"2.5"), 2.5);
        assert_eq!(coerce_f64(b"-1.25xyz"), -1.25);
        assert_eq!(coerce_f64(b"nope"), 0.0);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }
}
