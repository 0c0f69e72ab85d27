//! The command facade.
//!
//! A [`Db`] is one client handle: connection options, the derived
//! instance key, and the currently selected database index. Handles with
//! equal options share databases through the process-wide [`Registry`], so
//! several `Db` values behave like several clients of one server. Every
//! command resolves its database through the registry and takes that
//! database's lock for the duration of the call.

use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KvError, Result};
use crate::expiring::{now_ms, ExpiringDb};
use crate::registry::Registry;
use crate::sort::{self, SortOptions, Sorted};
use crate::types::{
    coerce_f64, coerce_i64, format_float, Aggregate, ConnectOptions, KeyType, SetOptions, Value,
    ZMember,
};
use crate::zset::ZSet;
use crate::{setops, zset};

/// Version tag embedded in DUMP payloads; RESTORE rejects a mismatch.
const DUMP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, Deserialize)]
struct DumpPayload {
    version: String,
    value: Value,
}

/// A client handle over the shared in-process store.
///
/// # Example
/// ```
/// use redmock::Db;
///
/// let db = Db::open_memory();
/// db.set("key", b"value", None).unwrap();
/// assert_eq!(db.get("key").unwrap(), Some(b"value".to_vec()));
/// ```
#[derive(Clone)]
pub struct Db {
    registry: &'static Registry,
    options: ConnectOptions,
    instance_key: String,
    selected_db: usize,
}

impl Db {
    /// Connect with explicit options. Handles built with equal
    /// host/port/namespace observe the same data.
    pub fn connect(options: ConnectOptions) -> Self {
        let instance_key = options.instance_key();
        debug!(instance_key, "connecting");
        Self {
            registry: Registry::global(),
            options,
            instance_key,
            selected_db: 0,
        }
    }

    /// Memory-backed handle with default options.
    pub fn open_memory() -> Self {
        Self::connect(ConnectOptions::default())
    }

    /// Another handle onto the same data, starting at database 0.
    pub fn session(&self) -> Self {
        Self {
            registry: self.registry,
            options: self.options.clone(),
            instance_key: self.instance_key.clone(),
            selected_db: 0,
        }
    }

    /// SELECT index
    pub fn select(&mut self, index: usize) -> Result<()> {
        self.selected_db = index;
        Ok(())
    }

    /// Currently selected database index.
    pub fn current_db(&self) -> usize {
        self.selected_db
    }

    /// Drop every instance key in the process and let backing stores clean
    /// up persisted artifacts. Call between tests for hermetic isolation.
    pub fn reset_all() {
        Registry::global().reset();
    }

    fn with_db<T>(&self, f: impl FnOnce(&mut ExpiringDb) -> Result<T>) -> Result<T> {
        let db = self
            .registry
            .resolve(&self.instance_key, self.options.backend, self.selected_db)?;
        let mut guard = db.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    // --- Strings ---

    /// GET key
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| as_string(db.get(key)?))
    }

    /// SET key value, resetting any TTL unless a new one is supplied.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.set_opts(
            key,
            value,
            SetOptions {
                ttl,
                ..Default::default()
            },
        )
        .map(|_| ())
    }

    /// SET with NX/XX/EX/PX options; returns whether the key was set.
    pub fn set_opts(&self, key: &str, value: &[u8], opts: SetOptions) -> Result<bool> {
        if opts.nx && opts.xx {
            return Ok(false);
        }
        self.with_db(|db| {
            let exists = db.contains(key)?;
            if opts.nx && exists {
                return Ok(false);
            }
            if opts.xx && !exists {
                return Ok(false);
            }
            db.set(key, Value::String(value.to_vec()))?;
            db.clear_expiry(key)?;
            if let Some(ttl) = opts.ttl {
                db.set_expiry(key, now_ms() + ttl.as_millis() as i64)?;
            }
            Ok(true)
        })
    }

    /// GETSET key value
    pub fn getset(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let old = as_string(db.get(key)?)?;
            db.set(key, Value::String(value.to_vec()))?;
            db.clear_expiry(key)?;
            Ok(old)
        })
    }

    /// SETNX key value
    pub fn setnx(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.set_opts(key, value, SetOptions::new().nx())
    }

    /// SETEX key seconds value
    pub fn setex(&self, key: &str, seconds: i64, value: &[u8]) -> Result<()> {
        self.with_db(|db| {
            db.set(key, Value::String(value.to_vec()))?;
            db.clear_expiry(key)?;
            db.set_expiry(key, now_ms() + seconds * 1000)?;
            Ok(())
        })
    }

    /// APPEND key value — returns the new length. Does not touch the TTL.
    pub fn append(&self, key: &str, value: &[u8]) -> Result<i64> {
        self.with_db(|db| {
            let mut current = as_string(db.get(key)?)?.unwrap_or_default();
            current.extend_from_slice(value);
            let len = current.len() as i64;
            db.set(key, Value::String(current))?;
            Ok(len)
        })
    }

    /// STRLEN key
    pub fn strlen(&self, key: &str) -> Result<i64> {
        self.with_db(|db| Ok(as_string(db.get(key)?)?.map_or(0, |b| b.len() as i64)))
    }

    /// INCR key
    pub fn incr(&self, key: &str) -> Result<i64> {
        self.incrby(key, 1)
    }

    /// DECR key
    pub fn decr(&self, key: &str) -> Result<i64> {
        self.incrby(key, -1)
    }

    /// INCRBY key increment. A missing key counts as 0, a non-numeric
    /// value as its leading integer. The TTL is left alone.
    pub fn incrby(&self, key: &str, increment: i64) -> Result<i64> {
        self.with_db(|db| {
            let current = as_string(db.get(key)?)?.map_or(0, |b| coerce_i64(&b));
            let next = current.wrapping_add(increment);
            db.set(key, Value::String(next.to_string().into_bytes()))?;
            Ok(next)
        })
    }

    /// DECRBY key decrement
    pub fn decrby(&self, key: &str, decrement: i64) -> Result<i64> {
        self.incrby(key, -decrement)
    }

    /// INCRBYFLOAT key increment — returns the stored string form.
    pub fn incrbyfloat(&self, key: &str, increment: f64) -> Result<String> {
        self.with_db(|db| {
            let current = as_string(db.get(key)?)?.map_or(0.0, |b| coerce_f64(&b));
            let formatted = format_float(current + increment);
            db.set(key, Value::String(formatted.clone().into_bytes()))?;
            Ok(formatted)
        })
    }

    /// MGET key [key ...] — non-string keys yield None.
    pub fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Err(KvError::WrongArity("mget"));
        }
        self.with_db(|db| {
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                out.push(match db.get(key)? {
                    Some(Value::String(b)) => Some(b),
                    _ => None,
                });
            }
            Ok(out)
        })
    }

    /// MSET key value [key value ...]
    pub fn mset(&self, pairs: &[(&str, &[u8])]) -> Result<()> {
        if pairs.is_empty() {
            return Err(KvError::WrongArity("mset"));
        }
        self.with_db(|db| {
            for (key, value) in pairs {
                db.set(key, Value::String(value.to_vec()))?;
                db.clear_expiry(key)?;
            }
            Ok(())
        })
    }

    /// MSETNX key value [key value ...] — all-or-nothing.
    pub fn msetnx(&self, pairs: &[(&str, &[u8])]) -> Result<bool> {
        if pairs.is_empty() {
            return Err(KvError::WrongArity("msetnx"));
        }
        self.with_db(|db| {
            for (key, _) in pairs {
                if db.contains(key)? {
                    return Ok(false);
                }
            }
            for (key, value) in pairs {
                db.set(key, Value::String(value.to_vec()))?;
                db.clear_expiry(key)?;
            }
            Ok(true)
        })
    }

    /// GETRANGE key start end (inclusive, negatives from the end)
    pub fn getrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<u8>> {
        self.with_db(|db| {
            let Some(bytes) = as_string(db.get(key)?)? else {
                return Ok(Vec::new());
            };
            Ok(match ruby_range(bytes.len(), start, end) {
                Some(range) => bytes[range].to_vec(),
                None => Vec::new(),
            })
        })
    }

    /// SETRANGE key offset value — zero-pads any gap, returns the new
    /// length.
    pub fn setrange(&self, key: &str, offset: i64, value: &[u8]) -> Result<i64> {
        if offset < 0 {
            return Err(KvError::OutOfRange);
        }
        let offset = offset as usize;
        self.with_db(|db| {
            let mut bytes = as_string(db.get(key)?)?.unwrap_or_default();
            if value.is_empty() {
                return Ok(bytes.len() as i64);
            }
            if bytes.len() < offset + value.len() {
                bytes.resize(offset + value.len(), 0);
            }
            bytes[offset..offset + value.len()].copy_from_slice(value);
            let len = bytes.len() as i64;
            db.set(key, Value::String(bytes))?;
            Ok(len)
        })
    }

    /// SETBIT key offset value — returns the previous bit.
    pub fn setbit(&self, key: &str, offset: u64, value: bool) -> Result<i64> {
        let byte = (offset / 8) as usize;
        let bit = 7 - (offset % 8) as u32;
        self.with_db(|db| {
            let mut bytes = as_string(db.get(key)?)?.unwrap_or_default();
            if bytes.len() <= byte {
                bytes.resize(byte + 1, 0);
            }
            let original = (bytes[byte] >> bit) & 1;
            if value {
                bytes[byte] |= 1 << bit;
            } else {
                bytes[byte] &= !(1 << bit);
            }
            db.set(key, Value::String(bytes))?;
            Ok(original as i64)
        })
    }

    /// GETBIT key offset
    pub fn getbit(&self, key: &str, offset: u64) -> Result<i64> {
        let byte = (offset / 8) as usize;
        let bit = 7 - (offset % 8) as u32;
        self.with_db(|db| {
            let Some(bytes) = as_string(db.get(key)?)? else {
                return Ok(0);
            };
            Ok(bytes.get(byte).map_or(0, |b| ((b >> bit) & 1) as i64))
        })
    }

    /// BITCOUNT key [start end] over byte positions.
    pub fn bitcount(&self, key: &str, start: i64, end: i64) -> Result<i64> {
        self.with_db(|db| {
            let Some(bytes) = as_string(db.get(key)?)? else {
                return Ok(0);
            };
            Ok(match ruby_range(bytes.len(), start, end) {
                Some(range) => bytes[range].iter().map(|b| b.count_ones() as i64).sum(),
                None => 0,
            })
        })
    }

    // --- Key management ---

    /// DEL key [key ...]
    pub fn del(&self, keys: &[&str]) -> Result<i64> {
        if keys.is_empty() {
            return Err(KvError::WrongArity("del"));
        }
        self.with_db(|db| {
            let mut removed = 0;
            for key in keys {
                if db.delete(key)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// EXISTS key
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.with_db(|db| db.contains(key))
    }

    /// EXPIRE key seconds — false when the key holds no value.
    pub fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        self.with_db(|db| db.set_expiry(key, now_ms() + seconds * 1000))
    }

    /// PEXPIRE key milliseconds
    pub fn pexpire(&self, key: &str, milliseconds: i64) -> Result<bool> {
        self.with_db(|db| db.set_expiry(key, now_ms() + milliseconds))
    }

    /// EXPIREAT key unix-seconds
    pub fn expireat(&self, key: &str, unix_seconds: i64) -> Result<bool> {
        self.with_db(|db| db.set_expiry(key, unix_seconds * 1000))
    }

    /// TTL key: -2 missing, -1 no expiry, else remaining seconds.
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.pttl(key).map(|ms| if ms < 0 { ms } else { ms / 1000 })
    }

    /// PTTL key, in milliseconds.
    pub fn pttl(&self, key: &str) -> Result<i64> {
        self.with_db(|db| match db.expiry(key)? {
            Some(at) => Ok(at - now_ms()),
            None => Ok(if db.contains(key)? { -1 } else { -2 }),
        })
    }

    /// PERSIST key — returns whether an expiry existed.
    pub fn persist(&self, key: &str) -> Result<bool> {
        self.with_db(|db| db.clear_expiry(key))
    }

    /// RENAME key newkey — moves value and expiry together. A missing
    /// source is a no-op returning false.
    pub fn rename(&self, key: &str, newkey: &str) -> Result<bool> {
        self.with_db(|db| {
            let Some(value) = db.get(key)? else {
                return Ok(false);
            };
            let expiry = db.expiry(key)?;
            db.set(newkey, value)?;
            db.clear_expiry(newkey)?;
            if let Some(at) = expiry {
                db.set_expiry(newkey, at)?;
            }
            db.delete(key)?;
            Ok(true)
        })
    }

    /// RENAMENX key newkey
    pub fn renamenx(&self, key: &str, newkey: &str) -> Result<bool> {
        if self.exists(newkey)? {
            return Ok(false);
        }
        self.rename(key, newkey)
    }

    /// RANDOMKEY
    pub fn randomkey(&self) -> Result<Option<String>> {
        self.with_db(|db| {
            let keys = db.keys()?;
            if keys.is_empty() {
                return Ok(None);
            }
            let pick = pseudo_rand(keys.len());
            Ok(Some(keys[pick].clone()))
        })
    }

    /// KEYS pattern (shell glob)
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_db(|db| {
            Ok(db
                .keys()?
                .into_iter()
                .filter(|k| glob_match(pattern, k))
                .collect())
        })
    }

    /// SCAN cursor [MATCH pattern] [COUNT count]. The cursor is an offset
    /// into the matching key list; "0" comes back when iteration is done.
    pub fn scan(
        &self,
        cursor: &str,
        pattern: Option<&str>,
        count: usize,
    ) -> Result<(String, Vec<String>)> {
        let cursor = parse_cursor(cursor)?;
        let count = count.max(1);
        let matched = self.keys(pattern.unwrap_or("*"))?;

        if cursor + count >= matched.len() {
            let page = matched.into_iter().skip(cursor).collect();
            Ok(("0".to_string(), page))
        } else {
            let next = cursor + count;
            let page = matched[cursor..next].to_vec();
            Ok((next.to_string(), page))
        }
    }

    /// TYPE key — None when the key is absent.
    pub fn key_type(&self, key: &str) -> Result<Option<KeyType>> {
        self.with_db(|db| Ok(db.get(key)?.map(|v| v.key_type())))
    }

    /// MOVE key destination-db. Errors when source and destination are the
    /// same database; false when the source is missing or the destination
    /// already holds the key.
    pub fn move_key(&self, key: &str, destination: usize) -> Result<bool> {
        if destination == self.selected_db {
            return Err(KvError::SameDatabase);
        }
        let value = match self.with_db(|db| db.get(key))? {
            Some(value) => value,
            None => return Ok(false),
        };

        let dest = self
            .registry
            .resolve(&self.instance_key, self.options.backend, destination)?;
        {
            let mut dest = dest.lock().unwrap_or_else(|e| e.into_inner());
            if dest.contains(key)? {
                return Ok(false);
            }
            dest.set(key, value)?;
        }
        self.with_db(|db| db.delete(key))?;
        Ok(true)
    }

    /// DUMP key — opaque versioned blob, None for a missing key.
    pub fn dump(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let Some(value) = db.get(key)? else {
                return Ok(None);
            };
            let payload = DumpPayload {
                version: DUMP_VERSION.to_string(),
                value,
            };
            let blob =
                rmp_serde::to_vec(&payload).map_err(|e| KvError::Encoding(e.to_string()))?;
            Ok(Some(blob))
        })
    }

    /// RESTORE key ttl-ms payload. Refuses to overwrite; rejects blobs
    /// from another version or malformed ones.
    pub fn restore(&self, key: &str, ttl_ms: i64, payload: &[u8]) -> Result<()> {
        self.with_db(|db| {
            if db.contains(key)? {
                return Err(KvError::BusyKey);
            }
            let decoded: DumpPayload =
                rmp_serde::from_slice(payload).map_err(|_| KvError::BadPayload)?;
            if decoded.version != DUMP_VERSION {
                return Err(KvError::BadPayload);
            }
            db.set(key, decoded.value)?;
            if ttl_ms != 0 {
                db.set_expiry(key, now_ms() + ttl_ms)?;
            }
            Ok(())
        })
    }

    /// DBSIZE
    pub fn dbsize(&self) -> Result<i64> {
        self.with_db(|db| Ok(db.len()? as i64))
    }

    // --- Lists ---

    /// LPUSH key value [value ...]
    pub fn lpush(&self, key: &str, values: &[&[u8]]) -> Result<i64> {
        self.push(key, values, true, false, "lpush")
    }

    /// RPUSH key value [value ...]
    pub fn rpush(&self, key: &str, values: &[&[u8]]) -> Result<i64> {
        self.push(key, values, false, false, "rpush")
    }

    /// LPUSHX key value [value ...] — 0 when the key is missing.
    pub fn lpushx(&self, key: &str, values: &[&[u8]]) -> Result<i64> {
        self.push(key, values, true, true, "lpushx")
    }

    /// RPUSHX key value [value ...]
    pub fn rpushx(&self, key: &str, values: &[&[u8]]) -> Result<i64> {
        self.push(key, values, false, true, "rpushx")
    }

    fn push(
        &self,
        key: &str,
        values: &[&[u8]],
        front: bool,
        require_existing: bool,
        cmd: &'static str,
    ) -> Result<i64> {
        if values.is_empty() {
            return Err(KvError::WrongArity(cmd));
        }
        self.with_db(|db| {
            let existing = as_list(db.get(key)?)?;
            if existing.is_none() && require_existing {
                return Ok(0);
            }
            let mut list = existing.unwrap_or_default();
            for value in values {
                if front {
                    list.push_front(value.to_vec());
                } else {
                    list.push_back(value.to_vec());
                }
            }
            let len = list.len() as i64;
            db.set(key, Value::List(list))?;
            Ok(len)
        })
    }

    /// LPOP key
    pub fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.pop(key, true)
    }

    /// RPOP key
    pub fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.pop(key, false)
    }

    fn pop(&self, key: &str, front: bool) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let Some(mut list) = as_list(db.get(key)?)? else {
                return Ok(None);
            };
            let popped = if front {
                list.pop_front()
            } else {
                list.pop_back()
            };
            store_collection(db, key, Value::List(list))?;
            Ok(popped)
        })
    }

    /// LRANGE key start stop
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| {
            let Some(list) = as_list(db.get(key)?)? else {
                return Ok(Vec::new());
            };
            Ok(match ruby_range(list.len(), start, stop) {
                Some(range) => list.into_iter().collect::<Vec<_>>()[range].to_vec(),
                None => Vec::new(),
            })
        })
    }

    /// LINDEX key index
    pub fn lindex(&self, key: &str, index: i64) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let Some(list) = as_list(db.get(key)?)? else {
                return Ok(None);
            };
            let len = list.len() as i64;
            let i = if index < 0 { index + len } else { index };
            if i < 0 || i >= len {
                return Ok(None);
            }
            Ok(list.get(i as usize).cloned())
        })
    }

    /// LINSERT key BEFORE|AFTER pivot element — new length, -1 when the
    /// pivot is absent, 0 when the key is.
    pub fn linsert(&self, key: &str, before: bool, pivot: &[u8], element: &[u8]) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut list) = as_list(db.get(key)?)? else {
                return Ok(0);
            };
            let Some(index) = list.iter().position(|v| v == pivot) else {
                return Ok(-1);
            };
            let at = if before { index } else { index + 1 };
            list.insert(at, element.to_vec());
            let len = list.len() as i64;
            db.set(key, Value::List(list))?;
            Ok(len)
        })
    }

    /// LSET key index element. No-op on a missing key; out-of-range
    /// indexes error.
    pub fn lset(&self, key: &str, index: i64, element: &[u8]) -> Result<()> {
        self.with_db(|db| {
            let Some(mut list) = as_list(db.get(key)?)? else {
                return Ok(());
            };
            let len = list.len() as i64;
            let i = if index < 0 { index + len } else { index };
            if i < 0 || i >= len {
                return Err(KvError::OutOfRange);
            }
            list[i as usize] = element.to_vec();
            db.set(key, Value::List(list))
        })
    }

    /// LREM key count element. count 0 removes all matches, positive
    /// removes the first `count` scanning head→tail, negative the first
    /// `|count|` scanning tail→head.
    pub fn lrem(&self, key: &str, count: i64, element: &[u8]) -> Result<i64> {
        self.with_db(|db| {
            let Some(list) = as_list(db.get(key)?)? else {
                return Ok(0);
            };
            let before = list.len();
            let mut items: Vec<Vec<u8>> = list.into_iter().collect();

            if count == 0 {
                items.retain(|v| v != element);
            } else if count > 0 {
                let mut left = count;
                items.retain(|v| {
                    if left > 0 && v == element {
                        left -= 1;
                        false
                    } else {
                        true
                    }
                });
            } else {
                let mut left = -count;
                for i in (0..items.len()).rev() {
                    if left == 0 {
                        break;
                    }
                    if items[i] == element {
                        items.remove(i);
                        left -= 1;
                    }
                }
            }

            let removed = (before - items.len()) as i64;
            store_collection(db, key, Value::List(items.into()))?;
            Ok(removed)
        })
    }

    /// LTRIM key start stop
    pub fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.with_db(|db| {
            let Some(list) = as_list(db.get(key)?)? else {
                return Ok(());
            };
            // a negative start reaching past the head leaves the list alone
            if start < 0 && (list.len() as i64) < start.abs() {
                return Ok(());
            }
            let items: Vec<Vec<u8>> = list.into_iter().collect();
            let trimmed: Vec<Vec<u8>> = match ruby_range(items.len(), start, stop) {
                Some(range) => items[range].to_vec(),
                None => Vec::new(),
            };
            store_collection(db, key, Value::List(trimmed.into()))
        })
    }

    /// LLEN key
    pub fn llen(&self, key: &str) -> Result<i64> {
        self.with_db(|db| Ok(as_list(db.get(key)?)?.map_or(0, |l| l.len() as i64)))
    }

    /// RPOPLPUSH source destination
    pub fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<Vec<u8>>> {
        let Some(element) = self.rpop(source)? else {
            return Ok(None);
        };
        self.lpush(destination, &[&element])?;
        Ok(Some(element))
    }

    /// BLPOP key [key ...] timeout. One immediate pass over the keys; on a
    /// miss, sleeps for the timeout and reports no element. Polling
    /// emulation — a concurrent push is not delivered.
    pub fn blpop(&self, keys: &[&str], timeout: f64) -> Result<Option<(String, Vec<u8>)>> {
        self.blocking_pop(keys, timeout, true)
    }

    /// BRPOP key [key ...] timeout
    pub fn brpop(&self, keys: &[&str], timeout: f64) -> Result<Option<(String, Vec<u8>)>> {
        self.blocking_pop(keys, timeout, false)
    }

    fn blocking_pop(
        &self,
        keys: &[&str],
        timeout: f64,
        front: bool,
    ) -> Result<Option<(String, Vec<u8>)>> {
        for key in keys {
            if let Some(element) = self.pop(key, front)? {
                return Ok(Some((key.to_string(), element)));
            }
        }
        std::thread::sleep(Duration::from_secs_f64(timeout.max(0.0)));
        Ok(None)
    }

    /// BRPOPLPUSH source destination timeout
    pub fn brpoplpush(
        &self,
        source: &str,
        destination: &str,
        timeout: f64,
    ) -> Result<Option<Vec<u8>>> {
        let popped = self.rpoplpush(source, destination)?;
        if popped.is_none() {
            std::thread::sleep(Duration::from_secs_f64(timeout.max(0.0)));
        }
        Ok(popped)
    }

    // --- Sets ---

    /// SADD key member [member ...] — count of newly added members.
    pub fn sadd(&self, key: &str, members: &[&[u8]]) -> Result<i64> {
        if members.is_empty() {
            return Err(KvError::WrongArity("sadd"));
        }
        self.with_db(|db| {
            let mut set = as_set(db.get(key)?)?.unwrap_or_default();
            let mut added = 0;
            for member in members {
                if set.insert(member.to_vec()) {
                    added += 1;
                }
            }
            db.set(key, Value::Set(set))?;
            Ok(added)
        })
    }

    /// SREM key member [member ...]
    pub fn srem(&self, key: &str, members: &[&[u8]]) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut set) = as_set(db.get(key)?)? else {
                return Ok(0);
            };
            let mut removed = 0;
            for member in members {
                if set.shift_remove(*member) {
                    removed += 1;
                }
            }
            store_collection(db, key, Value::Set(set))?;
            Ok(removed)
        })
    }

    /// SMEMBERS key, in reverse insertion order (a quirk the original's
    /// test suites rely on).
    pub fn smembers(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| {
            Ok(as_set(db.get(key)?)?
                .map(|set| set.iter().rev().cloned().collect())
                .unwrap_or_default())
        })
    }

    /// SISMEMBER key member
    pub fn sismember(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.with_db(|db| Ok(as_set(db.get(key)?)?.is_some_and(|set| set.contains(member))))
    }

    /// SCARD key
    pub fn scard(&self, key: &str) -> Result<i64> {
        self.with_db(|db| Ok(as_set(db.get(key)?)?.map_or(0, |s| s.len() as i64)))
    }

    /// SPOP key
    pub fn spop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let Some(mut set) = as_set(db.get(key)?)? else {
                return Ok(None);
            };
            if set.is_empty() {
                return Ok(None);
            }
            let pick = pseudo_rand(set.len());
            let Some(member) = set.shift_remove_index(pick) else {
                return Ok(None);
            };
            store_collection(db, key, Value::Set(set))?;
            Ok(Some(member))
        })
    }

    /// SRANDMEMBER key [count]. No count: up to one member. Non-negative
    /// count: that many distinct members. Negative count: |count| picks
    /// with repetition.
    pub fn srandmember(&self, key: &str, count: Option<i64>) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| {
            let Some(set) = as_set(db.get(key)?)? else {
                return Ok(Vec::new());
            };
            let members: Vec<Vec<u8>> = set.into_iter().collect();
            if members.is_empty() {
                return Ok(Vec::new());
            }
            Ok(match count {
                None => vec![members[pseudo_rand(members.len())].clone()],
                Some(n) if n >= 0 => sample_distinct(&members, n as usize),
                Some(n) => (0..-n)
                    .map(|_| members[pseudo_rand(members.len())].clone())
                    .collect(),
            })
        })
    }

    /// SMOVE source destination member
    pub fn smove(&self, source: &str, destination: &str, member: &[u8]) -> Result<bool> {
        // destination type is checked before anything moves
        self.with_db(|db| match db.get(destination)? {
            Some(v) if v.as_set().is_none() => Err(KvError::WrongType),
            _ => Ok(()),
        })?;
        if self.srem(source, &[member])? == 0 {
            return Ok(false);
        }
        self.sadd(destination, &[member])?;
        Ok(true)
    }

    /// SINTER key [key ...] — a missing operand makes the result empty.
    pub fn sinter(&self, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        if keys.is_empty() {
            return Err(KvError::WrongArity("sinter"));
        }
        self.with_db(|db| {
            let mut sets = Vec::with_capacity(keys.len());
            for key in keys {
                match as_set(db.get(key)?)? {
                    Some(set) => sets.push(set),
                    None => return Ok(Vec::new()),
                }
            }
            let Some((first, rest)) = sets.split_first() else {
                return Ok(Vec::new());
            };
            Ok(first
                .iter()
                .filter(|m| rest.iter().all(|s| s.contains(*m)))
                .cloned()
                .collect())
        })
    }

    /// SINTERSTORE destination key [key ...]
    pub fn sinterstore(&self, destination: &str, keys: &[&str]) -> Result<i64> {
        let members = self.sinter(keys)?;
        self.store_set(destination, members)
    }

    /// SUNION key [key ...]
    pub fn sunion(&self, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| {
            let mut out: Vec<Vec<u8>> = Vec::new();
            for key in keys {
                if let Some(set) = as_set(db.get(key)?)? {
                    for member in set {
                        if !out.contains(&member) {
                            out.push(member);
                        }
                    }
                }
            }
            Ok(out)
        })
    }

    /// SUNIONSTORE destination key [key ...]
    pub fn sunionstore(&self, destination: &str, keys: &[&str]) -> Result<i64> {
        let members = self.sunion(keys)?;
        self.store_set(destination, members)
    }

    /// SDIFF key [key ...] — first key minus the rest.
    pub fn sdiff(&self, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        if keys.is_empty() {
            return Err(KvError::WrongArity("sdiff"));
        }
        self.with_db(|db| {
            let base = as_set(db.get(keys[0])?)?.unwrap_or_default();
            let mut others = Vec::new();
            for key in &keys[1..] {
                others.push(as_set(db.get(key)?)?.unwrap_or_default());
            }
            Ok(base
                .into_iter()
                .filter(|m| !others.iter().any(|s| s.contains(m)))
                .collect())
        })
    }

    /// SDIFFSTORE destination key [key ...]
    pub fn sdiffstore(&self, destination: &str, keys: &[&str]) -> Result<i64> {
        let members = self.sdiff(keys)?;
        self.store_set(destination, members)
    }

    fn store_set(&self, destination: &str, members: Vec<Vec<u8>>) -> Result<i64> {
        self.with_db(|db| {
            match db.get(destination)? {
                Some(v) if v.as_set().is_none() => return Err(KvError::WrongType),
                _ => {}
            }
            let len = members.len() as i64;
            db.delete(destination)?;
            if len > 0 {
                db.set(destination, Value::Set(members.into_iter().collect()))?;
            }
            Ok(len)
        })
    }

    /// SSCAN key cursor [MATCH pattern] [COUNT count]
    pub fn sscan(
        &self,
        key: &str,
        cursor: &str,
        pattern: Option<&str>,
        count: usize,
    ) -> Result<(String, Vec<Vec<u8>>)> {
        let cursor = parse_cursor(cursor)?;
        let count = count.max(1);
        self.with_db(|db| {
            let Some(set) = as_set(db.get(key)?)? else {
                return Ok(("0".to_string(), Vec::new()));
            };
            let members: Vec<Vec<u8>> = set.into_iter().collect();
            let (next, page) = scan_page(members.len(), cursor, count);
            let pattern = pattern.unwrap_or("*");
            let out = members[page]
                .iter()
                .filter(|m| glob_match(pattern, &String::from_utf8_lossy(m)))
                .cloned()
                .collect();
            Ok((next, out))
        })
    }

    // --- Hashes ---

    /// HSET key field value — true when the field is new.
    pub fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        self.with_db(|db| {
            let mut hash = as_hash(db.get(key)?)?.unwrap_or_default();
            let new = hash.insert(field.to_string(), value.to_vec()).is_none();
            db.set(key, Value::Hash(hash))?;
            Ok(new)
        })
    }

    /// HSETNX key field value
    pub fn hsetnx(&self, key: &str, field: &str, value: &[u8]) -> Result<bool> {
        self.with_db(|db| {
            let mut hash = as_hash(db.get(key)?)?.unwrap_or_default();
            if hash.contains_key(field) {
                return Ok(false);
            }
            hash.insert(field.to_string(), value.to_vec());
            db.set(key, Value::Hash(hash))?;
            Ok(true)
        })
    }

    /// HGET key field
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            Ok(as_hash(db.get(key)?)?.and_then(|hash| hash.get(field).cloned()))
        })
    }

    /// HDEL key field [field ...] — count removed, emptied hash keys are
    /// deleted.
    pub fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut hash) = as_hash(db.get(key)?)? else {
                return Ok(0);
            };
            let mut removed = 0;
            for field in fields {
                if hash.shift_remove(*field).is_some() {
                    removed += 1;
                }
            }
            store_collection(db, key, Value::Hash(hash))?;
            Ok(removed)
        })
    }

    /// HMSET key field value [field value ...]
    pub fn hmset(&self, key: &str, pairs: &[(&str, &[u8])]) -> Result<()> {
        if pairs.is_empty() {
            return Err(KvError::WrongArityLegacy("HMSET"));
        }
        self.with_db(|db| {
            let mut hash = as_hash(db.get(key)?)?.unwrap_or_default();
            for (field, value) in pairs {
                hash.insert(field.to_string(), value.to_vec());
            }
            db.set(key, Value::Hash(hash))
        })
    }

    /// HMGET key field [field ...]
    pub fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Err(KvError::WrongArity("hmget"));
        }
        self.with_db(|db| {
            let hash = as_hash(db.get(key)?)?.unwrap_or_default();
            Ok(fields
                .iter()
                .map(|f| hash.get(*f).cloned())
                .collect())
        })
    }

    /// HGETALL key, fields in insertion order.
    pub fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.with_db(|db| {
            Ok(as_hash(db.get(key)?)?
                .map(|hash| hash.into_iter().collect())
                .unwrap_or_default())
        })
    }

    /// HKEYS key
    pub fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        self.with_db(|db| {
            Ok(as_hash(db.get(key)?)?
                .map(|hash| hash.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    /// HVALS key
    pub fn hvals(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| {
            Ok(as_hash(db.get(key)?)?
                .map(|hash| hash.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    /// HLEN key
    pub fn hlen(&self, key: &str) -> Result<i64> {
        self.with_db(|db| Ok(as_hash(db.get(key)?)?.map_or(0, |h| h.len() as i64)))
    }

    /// HEXISTS key field
    pub fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.with_db(|db| Ok(as_hash(db.get(key)?)?.is_some_and(|h| h.contains_key(field))))
    }

    /// HINCRBY key field increment
    pub fn hincrby(&self, key: &str, field: &str, increment: i64) -> Result<i64> {
        self.with_db(|db| {
            let mut hash = as_hash(db.get(key)?)?.unwrap_or_default();
            let current = hash.get(field).map_or(0, |b| coerce_i64(b));
            let next = current.wrapping_add(increment);
            hash.insert(field.to_string(), next.to_string().into_bytes());
            db.set(key, Value::Hash(hash))?;
            Ok(next)
        })
    }

    /// HINCRBYFLOAT key field increment — returns the stored string form.
    pub fn hincrbyfloat(&self, key: &str, field: &str, increment: f64) -> Result<String> {
        self.with_db(|db| {
            let mut hash = as_hash(db.get(key)?)?.unwrap_or_default();
            let current = hash.get(field).map_or(0.0, |b| coerce_f64(b));
            let formatted = format_float(current + increment);
            hash.insert(field.to_string(), formatted.clone().into_bytes());
            db.set(key, Value::Hash(hash))?;
            Ok(formatted)
        })
    }

    /// HSCAN key cursor [MATCH pattern] [COUNT count]
    pub fn hscan(
        &self,
        key: &str,
        cursor: &str,
        pattern: Option<&str>,
        count: usize,
    ) -> Result<(String, Vec<(String, Vec<u8>)>)> {
        let cursor = parse_cursor(cursor)?;
        let count = count.max(1);
        self.with_db(|db| {
            let Some(hash) = as_hash(db.get(key)?)? else {
                return Ok(("0".to_string(), Vec::new()));
            };
            let entries: Vec<(String, Vec<u8>)> = hash.into_iter().collect();
            let (next, page) = scan_page(entries.len(), cursor, count);
            let pattern = pattern.unwrap_or("*");
            let out = entries[page]
                .iter()
                .filter(|(f, _)| glob_match(pattern, f))
                .cloned()
                .collect();
            Ok((next, out))
        })
    }

    // --- Sorted sets ---

    /// ZADD key score member [score member ...] — count of new members.
    pub fn zadd(&self, key: &str, members: &[ZMember]) -> Result<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.with_db(|db| {
            let mut zset = as_zset(db.get(key)?)?.unwrap_or_default();
            let mut added = 0;
            for m in members {
                if zset.insert(m.member.clone(), m.score) {
                    added += 1;
                }
            }
            db.set(key, Value::ZSet(zset))?;
            Ok(added)
        })
    }

    /// ZREM key member [member ...]
    pub fn zrem(&self, key: &str, members: &[&[u8]]) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut zset) = as_zset(db.get(key)?)? else {
                return Ok(0);
            };
            let mut removed = 0;
            for member in members {
                if zset.remove(member) {
                    removed += 1;
                }
            }
            store_collection(db, key, Value::ZSet(zset))?;
            Ok(removed)
        })
    }

    /// ZCARD key
    pub fn zcard(&self, key: &str) -> Result<i64> {
        self.with_db(|db| Ok(as_zset(db.get(key)?)?.map_or(0, |z| z.len() as i64)))
    }

    /// ZSCORE key member
    pub fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.with_db(|db| Ok(as_zset(db.get(key)?)?.and_then(|z| z.score(member))))
    }

    /// ZINCRBY key increment member — returns the new score.
    pub fn zincrby(&self, key: &str, increment: f64, member: &[u8]) -> Result<f64> {
        self.with_db(|db| {
            let mut zset = as_zset(db.get(key)?)?.unwrap_or_default();
            let score = zset.increment(member, increment);
            db.set(key, Value::ZSet(zset))?;
            Ok(score)
        })
    }

    /// ZCOUNT key min max — boundaries accept `(`/`inf` forms.
    pub fn zcount(&self, key: &str, min: &str, max: &str) -> Result<i64> {
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(0);
            };
            Ok(zset.select_by_score(min, max)?.len() as i64)
        })
    }

    /// ZRANK key member — rank in ascending score order.
    pub fn zrank(&self, key: &str, member: &[u8]) -> Result<Option<i64>> {
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(None);
            };
            Ok(zset
                .sorted()
                .iter()
                .position(|(m, _)| m.as_slice() == member)
                .map(|i| i as i64))
        })
    }

    /// ZREVRANK key member
    pub fn zrevrank(&self, key: &str, member: &[u8]) -> Result<Option<i64>> {
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(None);
            };
            let len = zset.len() as i64;
            Ok(zset
                .sorted()
                .iter()
                .position(|(m, _)| m.as_slice() == member)
                .map(|i| len - 1 - i as i64))
        })
    }

    /// ZRANGE key start stop — members with scores, ascending.
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>> {
        self.ranked_range(key, start, stop, false)
    }

    /// ZREVRANGE key start stop — the exact reverse of ZRANGE.
    pub fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>> {
        self.ranked_range(key, start, stop, true)
    }

    fn ranked_range(&self, key: &str, start: i64, stop: i64, rev: bool) -> Result<Vec<ZMember>> {
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(Vec::new());
            };
            let mut entries = zset.sorted();
            if rev {
                entries.reverse();
            }
            Ok(match ruby_range(entries.len(), start, stop) {
                Some(range) => entries[range]
                    .iter()
                    .map(|(m, s)| ZMember::new(*s, m.clone()))
                    .collect(),
                None => Vec::new(),
            })
        })
    }

    /// ZRANGEBYSCORE key min max [LIMIT offset count]
    pub fn zrangebyscore(
        &self,
        key: &str,
        min: &str,
        max: &str,
        limit: Option<(i64, i64)>,
    ) -> Result<Vec<ZMember>> {
        self.score_range(key, min, max, limit, false)
    }

    /// ZREVRANGEBYSCORE key max min [LIMIT offset count]
    pub fn zrevrangebyscore(
        &self,
        key: &str,
        max: &str,
        min: &str,
        limit: Option<(i64, i64)>,
    ) -> Result<Vec<ZMember>> {
        self.score_range(key, min, max, limit, true)
    }

    fn score_range(
        &self,
        key: &str,
        min: &str,
        max: &str,
        limit: Option<(i64, i64)>,
        rev: bool,
    ) -> Result<Vec<ZMember>> {
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(Vec::new());
            };
            let mut entries = zset.select_by_score(min, max)?;
            zset::sort_entries(&mut entries);
            if rev {
                entries.reverse();
            }
            if let Some((offset, count)) = limit {
                let len = entries.len() as i64;
                if offset > len || offset < 0 {
                    return Ok(Vec::new());
                }
                let count = if count < 0 { len } else { count };
                entries = entries
                    .into_iter()
                    .skip(offset as usize)
                    .take(count as usize)
                    .collect();
            }
            Ok(entries
                .into_iter()
                .map(|(m, s)| ZMember::new(s, m))
                .collect())
        })
    }

    /// ZREMRANGEBYSCORE key min max
    pub fn zremrangebyscore(&self, key: &str, min: &str, max: &str) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut zset) = as_zset(db.get(key)?)? else {
                return Ok(0);
            };
            let doomed = zset.select_by_score(min, max)?;
            for (member, _) in &doomed {
                zset.remove(member);
            }
            store_collection(db, key, Value::ZSet(zset))?;
            Ok(doomed.len() as i64)
        })
    }

    /// ZREMRANGEBYRANK key start stop
    pub fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<i64> {
        self.with_db(|db| {
            let Some(mut zset) = as_zset(db.get(key)?)? else {
                return Ok(0);
            };
            let entries = zset.sorted();
            let doomed: Vec<Vec<u8>> = match ruby_range(entries.len(), start, stop) {
                Some(range) => entries[range].iter().map(|(m, _)| m.clone()).collect(),
                None => Vec::new(),
            };
            for member in &doomed {
                zset.remove(member);
            }
            store_collection(db, key, Value::ZSet(zset))?;
            Ok(doomed.len() as i64)
        })
    }

    /// ZINTERSTORE destination key [key ...] with weights and aggregate.
    pub fn zinterstore(
        &self,
        destination: &str,
        keys: &[&str],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<i64> {
        self.weighted_store(destination, keys, weights, aggregate, true)
    }

    /// ZUNIONSTORE destination key [key ...] with weights and aggregate.
    pub fn zunionstore(
        &self,
        destination: &str,
        keys: &[&str],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<i64> {
        self.weighted_store(destination, keys, weights, aggregate, false)
    }

    fn weighted_store(
        &self,
        destination: &str,
        keys: &[&str],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
        intersect: bool,
    ) -> Result<i64> {
        let weights = setops::resolve_weights(keys.len(), weights)?;
        self.with_db(|db| {
            match db.get(destination)? {
                Some(v) if v.as_zset().is_none() => return Err(KvError::WrongType),
                _ => {}
            }
            let mut sources: Vec<setops::ScoreMap> = Vec::with_capacity(keys.len());
            for key in keys {
                sources.push(match db.get(key)? {
                    None => Vec::new(),
                    Some(Value::ZSet(z)) => z.iter().map(|(m, s)| (m.clone(), s)).collect(),
                    // a plain set counts as a uniform weight-1 mapping
                    Some(Value::Set(s)) => s.iter().map(|m| (m.clone(), 1.0)).collect(),
                    Some(_) => return Err(KvError::WrongType),
                });
            }
            let out = if intersect {
                setops::intersect(&sources, &weights, aggregate)
            } else {
                setops::union(&sources, &weights, aggregate)
            };
            let len = out.len() as i64;
            db.delete(destination)?;
            if len > 0 {
                db.set(destination, Value::ZSet(out))?;
            }
            Ok(len)
        })
    }

    /// ZSCAN key cursor [MATCH pattern] [COUNT count] — pages over the
    /// score-ordered members.
    pub fn zscan(
        &self,
        key: &str,
        cursor: &str,
        pattern: Option<&str>,
        count: usize,
    ) -> Result<(String, Vec<ZMember>)> {
        let cursor = parse_cursor(cursor)?;
        let count = count.max(1);
        self.with_db(|db| {
            let Some(zset) = as_zset(db.get(key)?)? else {
                return Ok(("0".to_string(), Vec::new()));
            };
            let entries = zset.sorted();
            let pattern = pattern.unwrap_or("*");
            let filtered: Vec<&(Vec<u8>, f64)> = entries
                .iter()
                .filter(|(m, _)| glob_match(pattern, &String::from_utf8_lossy(m)))
                .collect();
            // cursor arithmetic runs over the unfiltered length, the slice
            // over the filtered list — faithful to the original
            let (next, range) = scan_page(entries.len(), cursor, count);
            let lo = range.start.min(filtered.len());
            let hi = range.end.min(filtered.len());
            let out = filtered[lo..hi]
                .iter()
                .map(|(m, s)| ZMember::new(*s, m.clone()))
                .collect();
            Ok((next, out))
        })
    }

    // --- Sort ---

    /// SORT key [BY pattern] [LIMIT offset count] [GET pattern ...]
    /// [ASC|DESC|ALPHA] [STORE destination]
    pub fn sort(&self, key: &str, options: &SortOptions) -> Result<Sorted> {
        sort::run(self, key, options)
    }

    pub(crate) fn sort_elements(&self, key: &str) -> Result<Option<Vec<Vec<u8>>>> {
        self.with_db(|db| match db.get(key)? {
            None => Ok(None),
            Some(Value::List(l)) => Ok(Some(l.into_iter().collect())),
            Some(Value::Set(s)) => Ok(Some(s.into_iter().collect())),
            Some(Value::ZSet(z)) => Ok(Some(z.iter().map(|(m, _)| m.clone()).collect())),
            Some(_) => Err(KvError::WrongType),
        })
    }

    // --- Server ---

    /// FLUSHDB — drops only the selected database, releasing its persisted
    /// region.
    pub fn flushdb(&self) -> Result<()> {
        self.registry.flush_index(&self.instance_key, self.selected_db)
    }

    /// FLUSHALL — drops every database of this instance key.
    pub fn flushall(&self) -> Result<()> {
        self.registry.flush_all(&self.instance_key)
    }

    /// INFO
    pub fn info(&self) -> Result<HashMap<String, String>> {
        let mut info = HashMap::new();
        info.insert("redis_version".to_string(), "3.0.5".to_string());
        Ok(info)
    }

    /// AUTH password — always accepted.
    pub fn auth(&self, _password: &str) -> Result<()> {
        Ok(())
    }

    /// PING
    pub fn ping(&self) -> Result<String> {
        Ok("PONG".to_string())
    }

    /// ECHO message
    pub fn echo(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(message.to_vec())
    }

    /// TIME — (unix seconds, microseconds within the second).
    pub fn time(&self) -> Result<(i64, i64)> {
        let micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;
        Ok((micros / 1_000_000, micros % 1_000_000))
    }
}

// --- Typed value extraction ---

fn as_string(value: Option<Value>) -> Result<Option<Vec<u8>>> {
    match value {
        None => Ok(None),
        Some(Value::String(b)) => Ok(Some(b)),
        Some(_) => Err(KvError::WrongType),
    }
}

fn as_list(value: Option<Value>) -> Result<Option<std::collections::VecDeque<Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::List(l)) => Ok(Some(l)),
        Some(_) => Err(KvError::WrongType),
    }
}

fn as_set(value: Option<Value>) -> Result<Option<indexmap::IndexSet<Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::Set(s)) => Ok(Some(s)),
        Some(_) => Err(KvError::WrongType),
    }
}

fn as_hash(value: Option<Value>) -> Result<Option<indexmap::IndexMap<String, Vec<u8>>>> {
    match value {
        None => Ok(None),
        Some(Value::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(KvError::WrongType),
    }
}

fn as_zset(value: Option<Value>) -> Result<Option<ZSet>> {
    match value {
        None => Ok(None),
        Some(Value::ZSet(z)) => Ok(Some(z)),
        Some(_) => Err(KvError::WrongType),
    }
}

/// Write a collection back, deleting the key instead when it emptied.
fn store_collection(db: &mut ExpiringDb, key: &str, value: Value) -> Result<()> {
    if value.is_empty_collection() {
        db.delete(key)?;
        Ok(())
    } else {
        db.set(key, value)
    }
}

/// Inclusive start..stop slicing with negative-from-the-end indexes. None
/// means the start fell outside the sequence entirely.
fn ruby_range(len: usize, start: i64, stop: i64) -> Option<Range<usize>> {
    let len = len as i64;
    let start = if start < 0 { start + len } else { start };
    if start < 0 || start > len {
        return None;
    }
    let stop = if stop < 0 { stop + len } else { stop };
    let stop = stop.min(len - 1);
    if stop < start {
        return Some(start as usize..start as usize);
    }
    Some(start as usize..(stop + 1) as usize)
}

fn parse_cursor(cursor: &str) -> Result<usize> {
    cursor.parse::<usize>().map_err(|_| KvError::InvalidCursor)
}

/// One page of offset-cursor pagination: next cursor plus the page's index
/// range. "0" signals the end of iteration.
fn scan_page(len: usize, cursor: usize, count: usize) -> (String, Range<usize>) {
    if cursor + count >= len {
        ("0".to_string(), cursor.min(len)..len)
    } else {
        let next = cursor + count;
        (next.to_string(), cursor..next)
    }
}

/// Simple glob pattern matching (supports *, ?, and [abc] with ranges).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_chars(&pattern, &text)
}

fn glob_chars(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;

    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                while p < pattern.len() && pattern[p] == '*' {
                    p += 1;
                }
                if p >= pattern.len() {
                    return true;
                }
                while t <= text.len() {
                    if glob_chars(&pattern[p..], &text[t..]) {
                        return true;
                    }
                    t += 1;
                }
                return false;
            }
            '?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            '[' => {
                if t >= text.len() {
                    return false;
                }
                let close = match pattern[p..].iter().position(|&c| c == ']') {
                    Some(off) if off > 0 => p + off,
                    _ => return false,
                };
                let (negate, mut i) = if pattern[p + 1] == '^' || pattern[p + 1] == '!' {
                    (true, p + 2)
                } else {
                    (false, p + 1)
                };
                let mut matched = false;
                while i < close {
                    if i + 2 < close && pattern[i + 1] == '-' {
                        if text[t] >= pattern[i] && text[t] <= pattern[i + 2] {
                            matched = true;
                        }
                        i += 3;
                    } else {
                        if text[t] == pattern[i] {
                            matched = true;
                        }
                        i += 1;
                    }
                }
                if matched == negate {
                    return false;
                }
                t += 1;
                p = close + 1;
            }
            c => {
                if t >= text.len() || text[t] != c {
                    return false;
                }
                t += 1;
                p += 1;
            }
        }
    }
    t == text.len()
}

/// Pseudo-random index below `bound`. Hash-derived rather than a PRNG
/// dependency, which is all RANDOMKEY/SRANDMEMBER need.
fn pseudo_rand(bound: usize) -> usize {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::OnceLock;

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    static STATE: OnceLock<RandomState> = OnceLock::new();

    if bound == 0 {
        return 0;
    }
    let mut hasher = STATE.get_or_init(RandomState::new).build_hasher();
    hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
    (hasher.finish() % bound as u64) as usize
}

/// Up to `count` distinct members via partial Fisher-Yates.
fn sample_distinct(members: &[Vec<u8>], count: usize) -> Vec<Vec<u8>> {
    let mut pool: Vec<Vec<u8>> = members.to_vec();
    let take = count.min(pool.len());
    for i in 0..take {
        let j = i + pseudo_rand(pool.len() - i);
        pool.swap(i, j);
    }
    pool.truncate(take);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fresh() -> Db {
        static N: AtomicUsize = AtomicUsize::new(0);
        let ns = format!("db{}", N.fetch_add(1, Ordering::SeqCst));
        Db::connect(ConnectOptions::new().namespace(ns))
    }

    #[test]
    fn test_set_get() {
        let db = fresh();
        db.set("foo", b"bar", None).unwrap();
        assert_eq!(db.get("foo").unwrap(), Some(b"bar".to_vec()));
    }

    #[test]
    fn test_get_nonexistent() {
        let db = fresh();
        assert_eq!(db.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_set_resets_ttl() {
        let db = fresh();
        db.set("k", b"v", Some(Duration::from_secs(600))).unwrap();
        assert!(db.ttl("k").unwrap() > 0);

        db.set("k", b"v2", None).unwrap();
        assert_eq!(db.ttl("k").unwrap(), -1);
    }

    #[test]
    fn test_incr_preserves_ttl() {
        let db = fresh();
        db.set("a", b"1", None).unwrap();
        db.expire("a", 600).unwrap();

        db.incr("a").unwrap();
        assert_eq!(db.get("a").unwrap(), Some(b"2".to_vec()));
        let ttl = db.ttl("a").unwrap();
        assert!(ttl > 590 && ttl <= 600, "ttl was {ttl}");
    }

    #[test]
    fn test_append_preserves_ttl() {
        let db = fresh();
        db.set("a", b"he", Some(Duration::from_secs(600))).unwrap();
        assert_eq!(db.append("a", b"llo").unwrap(), 5);
        assert!(db.ttl("a").unwrap() > 0);
        assert_eq!(db.get("a").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_incr_on_non_numeric_counts_from_zero() {
        let db = fresh();
        db.set("k", b"abc", None).unwrap();
        assert_eq!(db.incr("k").unwrap(), 1);
    }

    #[test]
    fn test_incrbyfloat_formatting() {
        let db = fresh();
        db.set("k", b"10.5", None).unwrap();
        assert_eq!(db.incrbyfloat("k", 0.1).unwrap(), "10.6");
        // integral results drop the fraction
        assert_eq!(db.incrbyfloat("k", 0.4).unwrap(), "11");
    }

    #[test]
    fn test_getset() {
        let db = fresh();
        assert_eq!(db.getset("k", b"new").unwrap(), None);
        assert_eq!(db.getset("k", b"newer").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_setnx() {
        let db = fresh();
        assert!(db.setnx("k", b"v1").unwrap());
        assert!(!db.setnx("k", b"v2").unwrap());
        assert_eq!(db.get("k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_msetnx_all_or_nothing() {
        let db = fresh();
        db.set("b", b"taken", None).unwrap();
        assert!(!db.msetnx(&[("a", b"1".as_slice()), ("b", b"2")]).unwrap());
        assert_eq!(db.get("a").unwrap(), None);
    }

    #[test]
    fn test_getrange_negative_indexes() {
        let db = fresh();
        db.set("k", b"hello", None).unwrap();
        assert_eq!(db.getrange("k", 0, -1).unwrap(), b"hello".to_vec());
        assert_eq!(db.getrange("k", 1, 3).unwrap(), b"ell".to_vec());
        assert_eq!(db.getrange("k", -3, -1).unwrap(), b"llo".to_vec());
    }

    #[test]
    fn test_setrange_zero_pads() {
        let db = fresh();
        db.set("k", b"hi", None).unwrap();
        assert_eq!(db.setrange("k", 4, b"yo").unwrap(), 6);
        assert_eq!(db.get("k").unwrap(), Some(b"hi\x00\x00yo".to_vec()));
    }

    #[test]
    fn test_setbit_getbit() {
        let db = fresh();
        assert_eq!(db.setbit("k", 7, true).unwrap(), 0);
        assert_eq!(db.getbit("k", 7).unwrap(), 1);
        assert_eq!(db.getbit("k", 6).unwrap(), 0);
        assert_eq!(db.get("k").unwrap(), Some(vec![1u8]));
        assert_eq!(db.setbit("k", 7, false).unwrap(), 1);
        assert_eq!(db.getbit("k", 7).unwrap(), 0);
    }

    #[test]
    fn test_bitcount() {
        let db = fresh();
        db.set("k", b"foobar", None).unwrap();
        assert_eq!(db.bitcount("k", 0, -1).unwrap(), 26);
        assert_eq!(db.bitcount("k", 0, 0).unwrap(), 4);
        assert_eq!(db.bitcount("missing", 0, -1).unwrap(), 0);
    }

    #[test]
    fn test_wrongtype_leaves_value_unchanged() {
        let db = fresh();
        db.rpush("l", &[b"a"]).unwrap();
        assert!(matches!(db.get("l"), Err(KvError::WrongType)));
        assert!(matches!(db.incr("l"), Err(KvError::WrongType)));
        assert_eq!(db.lrange("l", 0, -1).unwrap(), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_expire_and_ttl_lifecycle() {
        let db = fresh();
        assert_eq!(db.ttl("k").unwrap(), -2);

        db.set("k", b"v", None).unwrap();
        assert_eq!(db.ttl("k").unwrap(), -1);

        assert!(db.expire("k", 100).unwrap());
        let ttl = db.ttl("k").unwrap();
        assert!(ttl > 95 && ttl <= 100);

        assert!(db.persist("k").unwrap());
        assert_eq!(db.ttl("k").unwrap(), -1);
    }

    #[test]
    fn test_expire_missing_key_fails() {
        let db = fresh();
        assert!(!db.expire("nope", 100).unwrap());
        assert!(!db.expireat("nope", now_ms() / 1000 + 100).unwrap());
    }

    #[test]
    fn test_expired_key_vanishes() {
        let db = fresh();
        db.set("k", b"v", None).unwrap();
        db.pexpire("k", -1).unwrap();
        assert!(!db.exists("k").unwrap());
        assert_eq!(db.ttl("k").unwrap(), -2);
    }

    #[test]
    fn test_rename_moves_value_and_expiry() {
        let db = fresh();
        db.set("old", b"v", Some(Duration::from_secs(500))).unwrap();
        assert!(db.rename("old", "new").unwrap());

        assert!(!db.exists("old").unwrap());
        assert_eq!(db.get("new").unwrap(), Some(b"v".to_vec()));
        assert!(db.ttl("new").unwrap() > 0);
    }

    #[test]
    fn test_rename_missing_source_is_noop() {
        let db = fresh();
        assert!(!db.rename("ghost", "new").unwrap());
        assert!(!db.exists("new").unwrap());
    }

    #[test]
    fn test_renamenx_refuses_existing_target() {
        let db = fresh();
        db.set("a", b"1", None).unwrap();
        db.set("b", b"2", None).unwrap();
        assert!(!db.renamenx("a", "b").unwrap());
        assert_eq!(db.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_keys_glob() {
        let db = fresh();
        db.set("user:1", b"a", None).unwrap();
        db.set("user:2", b"b", None).unwrap();
        db.set("other", b"c", None).unwrap();

        let mut keys = db.keys("user:*").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:1".to_string(), "user:2".to_string()]);
        assert_eq!(db.keys("*").unwrap().len(), 3);
    }

    #[test]
    fn test_move_same_index_errors() {
        let db = fresh();
        db.set("a", b"v", None).unwrap();
        assert!(matches!(db.move_key("a", 0), Err(KvError::SameDatabase)));
    }

    #[test]
    fn test_move_occupied_destination_fails() {
        let mut db = fresh();
        db.set("a", b"src", None).unwrap();

        db.select(1).unwrap();
        db.set("a", b"dst", None).unwrap();
        db.select(0).unwrap();

        assert!(!db.move_key("a", 1).unwrap());
        assert_eq!(db.get("a").unwrap(), Some(b"src".to_vec()));
        db.select(1).unwrap();
        assert_eq!(db.get("a").unwrap(), Some(b"dst".to_vec()));
    }

    #[test]
    fn test_move_transfers_value() {
        let mut db = fresh();
        db.set("a", b"v", None).unwrap();
        assert!(db.move_key("a", 2).unwrap());
        assert!(!db.exists("a").unwrap());

        db.select(2).unwrap();
        assert_eq!(db.get("a").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_dump_restore_roundtrip() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b"]).unwrap();
        let blob = db.dump("l").unwrap().unwrap();

        db.restore("l2", 0, &blob).unwrap();
        assert_eq!(db.key_type("l2").unwrap(), Some(KeyType::List));
        assert_eq!(
            db.lrange("l2", 0, -1).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_restore_busy_key() {
        let db = fresh();
        db.set("k", b"v", None).unwrap();
        let blob = db.dump("k").unwrap().unwrap();
        let err = db.restore("k", 0, &blob).unwrap_err();
        assert_eq!(err.to_string(), "ERR Target key name is busy.");
    }

    #[test]
    fn test_restore_corrupt_payload() {
        let db = fresh();
        let err = db.restore("k", 0, b"garbage").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ERR DUMP payload version or checksum are wrong"
        );
    }

    #[test]
    fn test_restore_with_ttl() {
        let db = fresh();
        db.set("k", b"v", None).unwrap();
        let blob = db.dump("k").unwrap().unwrap();
        db.restore("k2", 90_000, &blob).unwrap();
        assert!(db.ttl("k2").unwrap() > 0);
    }

    #[test]
    fn test_dump_missing_key() {
        let db = fresh();
        assert_eq!(db.dump("ghost").unwrap(), None);
    }

    // --- Lists ---

    #[test]
    fn test_push_pop_order() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b", b"c"]).unwrap();
        db.lpush("l", &[b"x"]).unwrap();

        assert_eq!(db.llen("l").unwrap(), 4);
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"x".to_vec(), b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(db.lpop("l").unwrap(), Some(b"x".to_vec()));
        assert_eq!(db.rpop("l").unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn test_emptied_list_deletes_key() {
        let db = fresh();
        db.rpush("l", &[b"only"]).unwrap();
        db.rpop("l").unwrap();
        assert!(!db.exists("l").unwrap());
        assert_eq!(db.key_type("l").unwrap(), None);
    }

    #[test]
    fn test_llen_matches_lrange() {
        let db = fresh();
        for i in 0..5 {
            db.rpush("l", &[format!("v{i}").as_bytes()]).unwrap();
        }
        db.lpop("l").unwrap();
        assert_eq!(
            db.llen("l").unwrap() as usize,
            db.lrange("l", 0, -1).unwrap().len()
        );
    }

    #[test]
    fn test_pushx_requires_existing() {
        let db = fresh();
        assert_eq!(db.lpushx("l", &[b"a"]).unwrap(), 0);
        assert_eq!(db.rpushx("l", &[b"a"]).unwrap(), 0);
        assert!(!db.exists("l").unwrap());

        db.rpush("l", &[b"a"]).unwrap();
        assert_eq!(db.rpushx("l", &[b"b"]).unwrap(), 2);
    }

    #[test]
    fn test_lrem_directions() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b", b"a", b"c", b"a"]).unwrap();

        assert_eq!(db.lrem("l", 1, b"a").unwrap(), 1);
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"b".to_vec(), b"a".to_vec(), b"c".to_vec(), b"a".to_vec()]
        );

        assert_eq!(db.lrem("l", -1, b"a").unwrap(), 1);
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"b".to_vec(), b"a".to_vec(), b"c".to_vec()]
        );

        assert_eq!(db.lrem("l", 0, b"a").unwrap(), 1);
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_linsert_unmatched_pivot_is_noop() {
        let db = fresh();
        db.rpush("l", &[b"a", b"c"]).unwrap();
        assert_eq!(db.linsert("l", true, b"zzz", b"b").unwrap(), -1);
        assert_eq!(db.llen("l").unwrap(), 2);

        assert_eq!(db.linsert("l", false, b"a", b"b").unwrap(), 3);
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_lset_out_of_range() {
        let db = fresh();
        db.rpush("l", &[b"a"]).unwrap();
        assert!(matches!(db.lset("l", 5, b"x"), Err(KvError::OutOfRange)));
        db.lset("l", 0, b"z").unwrap();
        assert_eq!(db.lindex("l", 0).unwrap(), Some(b"z".to_vec()));
        assert_eq!(db.lindex("l", -1).unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn test_ltrim() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b", b"c", b"d"]).unwrap();
        db.ltrim("l", 1, 2).unwrap();
        assert_eq!(
            db.lrange("l", 0, -1).unwrap(),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_ltrim_short_list_with_negative_start_untouched() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b", b"c"]).unwrap();
        db.ltrim("l", -5, -1).unwrap();
        assert_eq!(db.llen("l").unwrap(), 3);
    }

    #[test]
    fn test_rpoplpush() {
        let db = fresh();
        db.rpush("src", &[b"a", b"b"]).unwrap();
        assert_eq!(db.rpoplpush("src", "dst").unwrap(), Some(b"b".to_vec()));
        assert_eq!(db.lrange("dst", 0, -1).unwrap(), vec![b"b".to_vec()]);
        assert_eq!(db.rpoplpush("empty", "dst").unwrap(), None);
    }

    #[test]
    fn test_blpop_immediate_hit() {
        let db = fresh();
        db.rpush("l", &[b"a", b"b"]).unwrap();
        let popped = db.blpop(&["missing", "l"], 5.0).unwrap();
        assert_eq!(popped, Some(("l".to_string(), b"a".to_vec())));
    }

    #[test]
    fn test_blpop_miss_sleeps_then_nil() {
        let db = fresh();
        let started = std::time::Instant::now();
        let popped = db.blpop(&["missing"], 0.05).unwrap();
        assert_eq!(popped, None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    // --- Sets ---

    #[test]
    fn test_sadd_counts_new_members_only() {
        let db = fresh();
        assert_eq!(db.sadd("s", &[b"a", b"b"]).unwrap(), 2);
        assert_eq!(db.sadd("s", &[b"a"]).unwrap(), 0);
        assert_eq!(db.scard("s").unwrap(), 2);
    }

    #[test]
    fn test_smembers_reverse_insertion_order() {
        let db = fresh();
        db.sadd("s", &[b"first", b"second", b"third"]).unwrap();
        assert_eq!(
            db.smembers("s").unwrap(),
            vec![b"third".to_vec(), b"second".to_vec(), b"first".to_vec()]
        );
    }

    #[test]
    fn test_emptied_set_deletes_key() {
        let db = fresh();
        db.sadd("s", &[b"only"]).unwrap();
        db.srem("s", &[b"only"]).unwrap();
        assert!(!db.exists("s").unwrap());
    }

    #[test]
    fn test_sinter_missing_operand_is_empty() {
        let db = fresh();
        db.sadd("a", &[b"x", b"y"]).unwrap();
        assert!(db.sinter(&["a", "missing"]).unwrap().is_empty());

        db.sadd("b", &[b"y", b"z"]).unwrap();
        assert_eq!(db.sinter(&["a", "b"]).unwrap(), vec![b"y".to_vec()]);
    }

    #[test]
    fn test_sdiff_and_sunion() {
        let db = fresh();
        db.sadd("a", &[b"x", b"y", b"z"]).unwrap();
        db.sadd("b", &[b"y"]).unwrap();

        assert_eq!(
            db.sdiff(&["a", "b"]).unwrap(),
            vec![b"x".to_vec(), b"z".to_vec()]
        );
        assert_eq!(db.sunion(&["a", "b"]).unwrap().len(), 3);
    }

    #[test]
    fn test_sinterstore_overwrites_destination() {
        let db = fresh();
        db.sadd("a", &[b"x", b"y"]).unwrap();
        db.sadd("b", &[b"y"]).unwrap();
        db.sadd("out", &[b"stale"]).unwrap();

        assert_eq!(db.sinterstore("out", &["a", "b"]).unwrap(), 1);
        assert_eq!(db.smembers("out").unwrap(), vec![b"y".to_vec()]);
    }

    #[test]
    fn test_sinterstore_empty_result_deletes_destination() {
        let db = fresh();
        db.sadd("a", &[b"x"]).unwrap();
        db.sadd("out", &[b"stale"]).unwrap();
        assert_eq!(db.sinterstore("out", &["a", "missing"]).unwrap(), 0);
        assert!(!db.exists("out").unwrap());
    }

    #[test]
    fn test_smove() {
        let db = fresh();
        db.sadd("src", &[b"m"]).unwrap();
        assert!(db.smove("src", "dst", b"m").unwrap());
        assert!(!db.exists("src").unwrap());
        assert!(db.sismember("dst", b"m").unwrap());
        assert!(!db.smove("src", "dst", b"ghost").unwrap());
    }

    #[test]
    fn test_spop_removes_member() {
        let db = fresh();
        db.sadd("s", &[b"a", b"b"]).unwrap();
        let popped = db.spop("s").unwrap().unwrap();
        assert!(!db.sismember("s", &popped).unwrap());
        assert_eq!(db.scard("s").unwrap(), 1);
    }

    #[test]
    fn test_srandmember_counts() {
        let db = fresh();
        db.sadd("s", &[b"a", b"b", b"c"]).unwrap();

        assert_eq!(db.srandmember("s", None).unwrap().len(), 1);
        assert_eq!(db.srandmember("s", Some(2)).unwrap().len(), 2);
        // more than the cardinality caps at the cardinality
        assert_eq!(db.srandmember("s", Some(10)).unwrap().len(), 3);
        // negative counts sample with repetition
        assert_eq!(db.srandmember("s", Some(-5)).unwrap().len(), 5);
    }

    // --- Hashes ---

    #[test]
    fn test_hset_hget() {
        let db = fresh();
        assert!(db.hset("h", "f", b"v").unwrap());
        assert!(!db.hset("h", "f", b"v2").unwrap());
        assert_eq!(db.hget("h", "f").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(db.hget("h", "missing").unwrap(), None);
    }

    #[test]
    fn test_hgetall_keeps_insertion_order() {
        let db = fresh();
        db.hset("h", "z", b"1").unwrap();
        db.hset("h", "a", b"2").unwrap();
        db.hset("h", "m", b"3").unwrap();

        let fields: Vec<String> = db.hgetall("h").unwrap().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["z", "a", "m"]);
        assert_eq!(db.hkeys("h").unwrap(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_hdel_empties_delete_key() {
        let db = fresh();
        db.hset("h", "f1", b"1").unwrap();
        db.hset("h", "f2", b"2").unwrap();
        assert_eq!(db.hdel("h", &["f1", "f2", "ghost"]).unwrap(), 2);
        assert!(!db.exists("h").unwrap());
    }

    #[test]
    fn test_hmset_hmget() {
        let db = fresh();
        db.hmset("h", &[("a", b"1".as_slice()), ("b", b"2")]).unwrap();
        assert_eq!(
            db.hmget("h", &["a", "ghost", "b"]).unwrap(),
            vec![Some(b"1".to_vec()), None, Some(b"2".to_vec())]
        );
    }

    #[test]
    fn test_hsetnx() {
        let db = fresh();
        assert!(db.hsetnx("h", "f", b"1").unwrap());
        assert!(!db.hsetnx("h", "f", b"2").unwrap());
        assert_eq!(db.hget("h", "f").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_hincrby_missing_field_counts_from_zero() {
        let db = fresh();
        assert_eq!(db.hincrby("h", "f", 5).unwrap(), 5);
        assert_eq!(db.hincrby("h", "f", -2).unwrap(), 3);
        assert_eq!(db.hlen("h").unwrap(), 1);
    }

    #[test]
    fn test_hincrbyfloat() {
        let db = fresh();
        db.hset("h", "f", b"10.5").unwrap();
        assert_eq!(db.hincrbyfloat("h", "f", 0.1).unwrap(), "10.6");
    }

    // --- Sorted sets ---

    #[test]
    fn test_zadd_returns_new_member_count() {
        let db = fresh();
        assert_eq!(
            db.zadd("z", &[ZMember::new(1.0, "a"), ZMember::new(2.0, "b")])
                .unwrap(),
            2
        );
        // rescoring an existing member is not a new add
        assert_eq!(db.zadd("z", &[ZMember::new(5.0, "a")]).unwrap(), 0);
        assert_eq!(db.zscore("z", b"a").unwrap(), Some(5.0));
    }

    #[test]
    fn test_zrange_orders_by_score_then_member() {
        let db = fresh();
        db.zadd(
            "z",
            &[
                ZMember::new(2.0, "b"),
                ZMember::new(1.0, "c"),
                ZMember::new(2.0, "a"),
            ],
        )
        .unwrap();

        let members: Vec<Vec<u8>> = db
            .zrange("z", 0, -1)
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(members, vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_zrevrange_is_exact_reverse() {
        let db = fresh();
        db.zadd(
            "z",
            &[
                ZMember::new(1.0, "x"),
                ZMember::new(2.0, "y"),
                ZMember::new(3.0, "z"),
            ],
        )
        .unwrap();

        let asc: Vec<Vec<u8>> = db
            .zrange("z", 0, -1)
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        let mut desc: Vec<Vec<u8>> = db
            .zrevrange("z", 0, -1)
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn test_zrangebyscore_exclusive_lower_bound() {
        let db = fresh();
        db.zadd("z", &[ZMember::new(1.0, "x"), ZMember::new(2.0, "y")])
            .unwrap();

        let members: Vec<Vec<u8>> = db
            .zrangebyscore("z", "(1", "2", None)
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(members, vec![b"y".to_vec()]);
    }

    #[test]
    fn test_zrangebyscore_infinity_bounds() {
        let db = fresh();
        db.zadd("z", &[ZMember::new(1.0, "a"), ZMember::new(2.0, "b")])
            .unwrap();
        assert_eq!(db.zrangebyscore("z", "-inf", "+inf", None).unwrap().len(), 2);
        assert_eq!(db.zcount("z", "-inf", "+inf").unwrap(), 2);
    }

    #[test]
    fn test_zrangebyscore_limit() {
        let db = fresh();
        for (i, m) in ["a", "b", "c", "d"].iter().enumerate() {
            db.zadd("z", &[ZMember::new(i as f64, *m)]).unwrap();
        }
        let members: Vec<Vec<u8>> = db
            .zrangebyscore("z", "-inf", "+inf", Some((1, 2)))
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(members, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_zrank_zrevrank() {
        let db = fresh();
        db.zadd("z", &[ZMember::new(1.0, "a"), ZMember::new(2.0, "b")])
            .unwrap();
        assert_eq!(db.zrank("z", b"a").unwrap(), Some(0));
        assert_eq!(db.zrank("z", b"b").unwrap(), Some(1));
        assert_eq!(db.zrevrank("z", b"a").unwrap(), Some(1));
        assert_eq!(db.zrank("z", b"ghost").unwrap(), None);
    }

    #[test]
    fn test_zincrby() {
        let db = fresh();
        assert_eq!(db.zincrby("z", 3.0, b"m").unwrap(), 3.0);
        assert_eq!(db.zincrby("z", 2.5, b"m").unwrap(), 5.5);
    }

    #[test]
    fn test_zrem_empties_delete_key() {
        let db = fresh();
        db.zadd("z", &[ZMember::new(1.0, "a")]).unwrap();
        assert_eq!(db.zrem("z", &[b"a", b"ghost"]).unwrap(), 1);
        assert!(!db.exists("z").unwrap());
    }

    #[test]
    fn test_zremrangebyrank() {
        let db = fresh();
        for (i, m) in ["a", "b", "c", "d"].iter().enumerate() {
            db.zadd("z", &[ZMember::new(i as f64, *m)]).unwrap();
        }
        assert_eq!(db.zremrangebyrank("z", 0, 1).unwrap(), 2);
        assert_eq!(db.zcard("z").unwrap(), 2);
    }

    #[test]
    fn test_zremrangebyscore() {
        let db = fresh();
        for (i, m) in ["a", "b", "c"].iter().enumerate() {
            db.zadd("z", &[ZMember::new(i as f64, *m)]).unwrap();
        }
        assert_eq!(db.zremrangebyscore("z", "1", "2").unwrap(), 2);
        assert_eq!(db.zcard("z").unwrap(), 1);
    }

    #[test]
    fn test_zunionstore_weighted_sum_property() {
        let db = fresh();
        db.zadd("a", &[ZMember::new(1.5, "m"), ZMember::new(1.0, "only_a")])
            .unwrap();
        db.zadd("b", &[ZMember::new(2.0, "m")]).unwrap();

        let len = db
            .zunionstore("out", &["a", "b"], Some(&[2.0, 3.0]), Aggregate::Sum)
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(db.zscore("out", b"m").unwrap(), Some(2.0 * 1.5 + 3.0 * 2.0));
        assert_eq!(db.zscore("out", b"only_a").unwrap(), Some(2.0));
    }

    #[test]
    fn test_zinterstore_min_aggregate() {
        let db = fresh();
        db.zadd("a", &[ZMember::new(5.0, "m"), ZMember::new(1.0, "a_only")])
            .unwrap();
        db.zadd("b", &[ZMember::new(3.0, "m")]).unwrap();

        let len = db
            .zinterstore("out", &["a", "b"], None, Aggregate::Min)
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(db.zscore("out", b"m").unwrap(), Some(3.0));
    }

    #[test]
    fn test_zunionstore_plain_set_counts_as_weight_one() {
        let db = fresh();
        db.sadd("s", &[b"m"]).unwrap();
        db.zadd("z", &[ZMember::new(4.0, "m")]).unwrap();

        db.zunionstore("out", &["s", "z"], None, Aggregate::Sum)
            .unwrap();
        assert_eq!(db.zscore("out", b"m").unwrap(), Some(5.0));
    }

    #[test]
    fn test_zscan_pages_in_score_order() {
        let db = fresh();
        for (i, m) in ["a", "b", "c"].iter().enumerate() {
            db.zadd("z", &[ZMember::new(i as f64, *m)]).unwrap();
        }

        let (cursor, page) = db.zscan("z", "0", None, 2).unwrap();
        assert_eq!(cursor, "2");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].member, b"a".to_vec());

        let (cursor, page) = db.zscan("z", &cursor, None, 2).unwrap();
        assert_eq!(cursor, "0");
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_sscan_and_hscan_cursors() {
        let db = fresh();
        for i in 0..15 {
            db.sadd("s", &[format!("m{i}").as_bytes()]).unwrap();
            db.hset("h", &format!("f{i}"), b"v").unwrap();
        }

        let mut seen = 0;
        let mut cursor = "0".to_string();
        loop {
            let (next, page) = db.sscan("s", &cursor, None, 4).unwrap();
            seen += page.len();
            cursor = next;
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen, 15);

        let (_, page) = db.hscan("h", "0", Some("f1*"), 15).unwrap();
        // f1, f10..f14 fall inside the first page of 15
        assert_eq!(page.len(), 6);
    }

    // --- Sort ---

    #[test]
    fn test_sort_lexical_default() {
        let db = fresh();
        db.rpush("l", &[b"c", b"a", b"b"]).unwrap();
        let sorted = db.sort("l", &SortOptions::default()).unwrap();
        assert_eq!(
            sorted,
            Sorted::Values(vec![
                Some(b"a".to_vec()),
                Some(b"b".to_vec()),
                Some(b"c".to_vec()),
            ])
        );
    }

    #[test]
    fn test_sort_by_external_weight() {
        let db = fresh();
        db.rpush("l", &[b"x", b"y"]).unwrap();
        db.set("weight_x", b"2", None).unwrap();
        db.set("weight_y", b"1", None).unwrap();

        let opts = SortOptions {
            by: Some("weight_*".to_string()),
            ..Default::default()
        };
        assert_eq!(
            db.sort("l", &opts).unwrap(),
            Sorted::Values(vec![Some(b"y".to_vec()), Some(b"x".to_vec())])
        );
    }

    #[test]
    fn test_sort_get_hash_indirection() {
        let db = fresh();
        db.rpush("l", &[b"1", b"2"]).unwrap();
        db.hset("user_1", "name", b"ann").unwrap();
        db.hset("user_2", "name", b"bob").unwrap();

        let opts = SortOptions {
            get: vec!["user_*->name".to_string(), "#".to_string()],
            ..Default::default()
        };
        assert_eq!(
            db.sort("l", &opts).unwrap(),
            Sorted::Values(vec![
                Some(b"ann".to_vec()),
                Some(b"1".to_vec()),
                Some(b"bob".to_vec()),
                Some(b"2".to_vec()),
            ])
        );
    }

    #[test]
    fn test_sort_store_writes_list() {
        let db = fresh();
        db.rpush("l", &[b"b", b"a"]).unwrap();
        let opts = SortOptions {
            store: Some("dest".to_string()),
            ..Default::default()
        };
        assert_eq!(db.sort("l", &opts).unwrap(), Sorted::Stored(2));
        assert_eq!(
            db.lrange("dest", 0, -1).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_sort_missing_key_is_empty() {
        let db = fresh();
        assert_eq!(
            db.sort("ghost", &SortOptions::default()).unwrap(),
            Sorted::Values(Vec::new())
        );
    }

    #[test]
    fn test_sort_wrong_type() {
        let db = fresh();
        db.set("s", b"v", None).unwrap();
        assert!(matches!(
            db.sort("s", &SortOptions::default()),
            Err(KvError::WrongType)
        ));
    }

    // --- Shared state / server ---

    #[test]
    fn test_handles_with_same_options_share_data() {
        let db = fresh();
        let other = db.session();

        db.set("shared", b"v", None).unwrap();
        assert_eq!(other.get("shared").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_flushdb_only_clears_selected_database() {
        let mut db = fresh();
        db.set("k0", b"v", None).unwrap();
        db.select(1).unwrap();
        db.set("k1", b"v", None).unwrap();

        db.flushdb().unwrap();
        assert!(!db.exists("k1").unwrap());

        db.select(0).unwrap();
        assert!(db.exists("k0").unwrap());
    }

    #[test]
    fn test_flushall_clears_every_database() {
        let mut db = fresh();
        db.set("k0", b"v", None).unwrap();
        db.select(1).unwrap();
        db.set("k1", b"v", None).unwrap();

        db.flushall().unwrap();
        assert!(!db.exists("k1").unwrap());
        db.select(0).unwrap();
        assert!(!db.exists("k0").unwrap());
    }

    #[test]
    fn test_dbsize_counts_live_keys() {
        let db = fresh();
        db.set("a", b"1", None).unwrap();
        db.set("b", b"2", None).unwrap();
        db.pexpire("b", -1).unwrap();
        assert_eq!(db.dbsize().unwrap(), 1);
    }

    #[test]
    fn test_ping_echo_time() {
        let db = fresh();
        assert_eq!(db.ping().unwrap(), "PONG");
        assert_eq!(db.echo(b"hello").unwrap(), b"hello".to_vec());
        let (secs, micros) = db.time().unwrap();
        assert!(secs > 0);
        assert!((0..1_000_000).contains(&micros));
    }

    #[test]
    fn test_info_reports_version() {
        let db = fresh();
        let info = db.info().unwrap();
        assert_eq!(info.get("redis_version").map(String::as_str), Some("3.0.5"));
    }

    #[test]
    fn test_randomkey() {
        let db = fresh();
        assert_eq!(db.randomkey().unwrap(), None);
        db.set("only", b"v", None).unwrap();
        assert_eq!(db.randomkey().unwrap(), Some("only".to_string()));
    }

    // --- Helpers ---

    #[test]
    fn test_ruby_range() {
        assert_eq!(ruby_range(5, 0, -1), Some(0..5));
        assert_eq!(ruby_range(5, 1, 3), Some(1..4));
        assert_eq!(ruby_range(5, -2, -1), Some(3..5));
        assert_eq!(ruby_range(5, 3, 1), Some(3..3));
        assert_eq!(ruby_range(5, 9, 10), None);
        assert_eq!(ruby_range(3, -5, -1), None);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:42"));
        assert!(!glob_match("user:*", "session:42"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[a-z]llo", "hxllo"));
        assert!(glob_match("h[^x]llo", "hello"));
        assert!(!glob_match("h[^e]llo", "hello"));
    }
}
