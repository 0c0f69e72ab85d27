//! Backing stores for a single database index.
//!
//! A [`DataStore`] holds the key→value map and the expiry side-table for one
//! database. The in-memory variant is a pair of maps; the filesystem variant
//! keeps one SQLite file per connection-instance key with one region per
//! database index, and runs every operation inside its own transaction.
//! Commands mutate through load–modify–store, which is what makes the
//! transactional variant possible behind the same interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{KvError, Result};
use crate::types::Value;

/// Container contract each backing implementation satisfies.
pub trait DataStore: Send {
    fn get(&mut self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<bool>;
    fn contains(&mut self, key: &str) -> Result<bool>;
    /// Keys in a stable enumeration order (insertion for memory, key order
    /// for the filesystem store).
    fn keys(&mut self) -> Result<Vec<String>>;
    fn len(&mut self) -> Result<usize>;
    fn clear(&mut self) -> Result<()>;

    /// Absolute expiry instant (epoch milliseconds) for the key, if any.
    fn expiry(&mut self, key: &str) -> Result<Option<i64>>;
    fn set_expiry(&mut self, key: &str, at_ms: i64) -> Result<()>;
    fn clear_expiry(&mut self, key: &str) -> Result<bool>;

    /// Drop any persisted artifact for this database index.
    fn release(&mut self) -> Result<()>;
}

/// Memory-resident store: the default backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: IndexMap<String, Value>,
    expires: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.expires.remove(key);
        Ok(self.entries.shift_remove(key).is_some())
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.expires.clear();
        Ok(())
    }

    fn expiry(&mut self, key: &str) -> Result<Option<i64>> {
        Ok(self.expires.get(key).copied())
    }

    fn set_expiry(&mut self, key: &str, at_ms: i64) -> Result<()> {
        self.expires.insert(key.to_string(), at_ms);
        Ok(())
    }

    fn clear_expiry(&mut self, key: &str) -> Result<bool> {
        Ok(self.expires.remove(key).is_some())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// File-persisted store: one SQLite file per instance key, one region per
/// database index. Values are MessagePack blobs.
pub struct FileStore {
    conn: Connection,
    path: PathBuf,
    index: usize,
}

impl FileStore {
    pub fn open(path: &Path, index: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS kv (
                 db INTEGER NOT NULL,
                 key TEXT NOT NULL,
                 value BLOB NOT NULL,
                 expire_at INTEGER,
                 PRIMARY KEY (db, key)
             );",
        )?;
        debug!(path = %path.display(), index, "opened filesystem store");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            index,
        })
    }

    /// Delete the persistence unit for an instance key, including SQLite
    /// side files. Used by the registry's full reset.
    pub fn remove_artifact(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.as_os_str().to_owned();
            p.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(p));
        }
    }

    fn encode(value: &Value) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| KvError::Encoding(e.to_string()))
    }

    fn decode(blob: &[u8]) -> Result<Value> {
        rmp_serde::from_slice(blob).map_err(|e| KvError::Encoding(e.to_string()))
    }
}

impl DataStore for FileStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        let tx = self.conn.transaction()?;
        let blob: Option<Vec<u8>> = tx
            .query_row(
                "SELECT value FROM kv WHERE db = ?1 AND key = ?2",
                params![self.index as i64, key],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        blob.map(|b| Self::decode(&b)).transpose()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let blob = Self::encode(&value)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO kv (db, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(db, key) DO UPDATE SET value = excluded.value",
            params![self.index as i64, key, blob],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let n = tx.execute(
            "DELETE FROM kv WHERE db = ?1 AND key = ?2",
            params![self.index as i64, key],
        )?;
        tx.commit()?;
        Ok(n > 0)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let found: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM kv WHERE db = ?1 AND key = ?2",
                params![self.index as i64, key],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        Ok(found.is_some())
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        let tx = self.conn.transaction()?;
        let keys = {
            let mut stmt =
                tx.prepare("SELECT key FROM kv WHERE db = ?1 ORDER BY rowid")?;
            let rows = stmt.query_map(params![self.index as i64], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<String>, _>>()?
        };
        tx.commit()?;
        Ok(keys)
    }

    fn len(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let n: i64 = tx.query_row(
            "SELECT COUNT(*) FROM kv WHERE db = ?1",
            params![self.index as i64],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(n as usize)
    }

    fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM kv WHERE db = ?1", params![self.index as i64])?;
        tx.commit()?;
        Ok(())
    }

    fn expiry(&mut self, key: &str) -> Result<Option<i64>> {
        let tx = self.conn.transaction()?;
        let at: Option<Option<i64>> = tx
            .query_row(
                "SELECT expire_at FROM kv WHERE db = ?1 AND key = ?2",
                params![self.index as i64, key],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        Ok(at.flatten())
    }

    fn set_expiry(&mut self, key: &str, at_ms: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE kv SET expire_at = ?3 WHERE db = ?1 AND key = ?2",
            params![self.index as i64, key, at_ms],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear_expiry(&mut self, key: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let n = tx.execute(
            "UPDATE kv SET expire_at = NULL
             WHERE db = ?1 AND key = ?2 AND expire_at IS NOT NULL",
            params![self.index as i64, key],
        )?;
        tx.commit()?;
        Ok(n > 0)
    }

    fn release(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), index = self.index, "releasing region");
        self.clear()
    }
}
