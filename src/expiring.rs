//! Passive expiry over a backing store.
//!
//! [`ExpiringDb`] is one numbered database: a backing [`DataStore`] whose
//! every public accessor first routes the touched key through a
//! check-and-reap helper. A key whose expiry instant is in the past is
//! deleted — value and expiry entry together — before the operation
//! proceeds. There is no background sweep.
//!
//! Because of that, **read-like operations mutate the store**: `get`,
//! `contains`, `expiry` and `keys` can all delete expired entries as a side
//! effect.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::error::Result;
use crate::storage::DataStore;
use crate::types::Value;

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One numbered database: a backing store plus passive expiry.
pub struct ExpiringDb {
    store: Box<dyn DataStore>,
}

impl ExpiringDb {
    pub fn new(store: Box<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Delete the key if its expiry instant has passed.
    fn reap(&mut self, key: &str) -> Result<()> {
        if let Some(at) = self.store.expiry(key)? {
            if at <= now_ms() {
                trace!(key, "reaping expired key");
                self.store.clear_expiry(key)?;
                self.store.delete(key)?;
            }
        }
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.reap(key)?;
        self.store.get(key)
    }

    /// Store a value. Any existing expiry entry is preserved; commands that
    /// reset the TTL (plain SET and friends) call [`clear_expiry`]
    /// themselves.
    ///
    /// [`clear_expiry`]: ExpiringDb::clear_expiry
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.reap(key)?;
        self.store.set(key, value)
    }

    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.reap(key)?;
        self.store.clear_expiry(key)?;
        self.store.delete(key)
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        self.reap(key)?;
        self.store.contains(key)
    }

    /// Live keys, reaping any expired entry found during the scan.
    pub fn keys(&mut self) -> Result<Vec<String>> {
        let mut live = Vec::new();
        for key in self.store.keys()? {
            self.reap(&key)?;
            if self.store.contains(&key)? {
                live.push(key);
            }
        }
        Ok(live)
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Expiry instant (epoch ms) for a live key.
    pub fn expiry(&mut self, key: &str) -> Result<Option<i64>> {
        self.reap(key)?;
        self.store.expiry(key)
    }

    /// Attach an absolute expiry instant. Fails (returns false) when the
    /// key holds no value.
    pub fn set_expiry(&mut self, key: &str, at_ms: i64) -> Result<bool> {
        self.reap(key)?;
        if !self.store.contains(key)? {
            return Ok(false);
        }
        self.store.set_expiry(key, at_ms)?;
        Ok(true)
    }

    /// Remove the expiry entry, keeping the value. Returns whether one
    /// existed.
    pub fn clear_expiry(&mut self, key: &str) -> Result<bool> {
        self.reap(key)?;
        self.store.clear_expiry(key)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()
    }

    /// Ask the backing store to drop any persisted artifact for this index.
    pub fn release(&mut self) -> Result<()> {
        self.store.release()
    }
}
