//! Process-wide database registry.
//!
//! Handles constructed with the same connection options (host, port,
//! namespace) resolve to the same database array, emulating multiple
//! clients connected to one logical server. Databases are created lazily on
//! first access and guarded by one mutex each; handles re-resolve on every
//! command rather than caching, so a flush or reset is observed by every
//! handle immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::expiring::ExpiringDb;

static GLOBAL: OnceLock<Registry> = OnceLock::new();

struct Instance {
    backend: Backend,
    databases: Vec<Option<Arc<Mutex<ExpiringDb>>>>,
}

/// Registry of database arrays keyed by connection-instance key.
#[derive(Default)]
pub struct Registry {
    instances: Mutex<HashMap<String, Instance>>,
}

impl Registry {
    /// The process-wide registry used by [`Db::connect`].
    ///
    /// [`Db::connect`]: crate::Db::connect
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::default)
    }

    /// Database at `index` for the instance key, created lazily with the
    /// given backend.
    pub(crate) fn resolve(
        &self,
        instance_key: &str,
        backend: Backend,
        index: usize,
    ) -> Result<Arc<Mutex<ExpiringDb>>> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        let instance = instances
            .entry(instance_key.to_string())
            .or_insert_with(|| Instance {
                backend,
                databases: Vec::new(),
            });

        if instance.databases.len() <= index {
            instance.databases.resize_with(index + 1, || None);
        }

        match &mut instance.databases[index] {
            Some(db) => Ok(db.clone()),
            slot => {
                debug!(instance_key, index, "creating database");
                let store = backend.open(instance_key, index)?;
                let db = Arc::new(Mutex::new(ExpiringDb::new(store)));
                *slot = Some(db.clone());
                Ok(db)
            }
        }
    }

    /// Drop one database: release its persisted region and forget the
    /// in-memory instance, so the next access starts empty.
    pub(crate) fn flush_index(&self, instance_key: &str, index: usize) -> Result<()> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(instance) = instances.get_mut(instance_key) {
            if let Some(Some(db)) = instance.databases.get(index) {
                let mut db = db.lock().unwrap_or_else(|e| e.into_inner());
                db.release()?;
                db.clear()?;
            }
            if index < instance.databases.len() {
                instance.databases[index] = None;
            }
        }
        Ok(())
    }

    /// Drop every database of one instance key.
    pub(crate) fn flush_all(&self, instance_key: &str) -> Result<()> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(instance) = instances.get_mut(instance_key) {
            for slot in instance.databases.iter().flatten() {
                let mut db = slot.lock().unwrap_or_else(|e| e.into_inner());
                db.release()?;
                db.clear()?;
            }
            instance.databases.clear();
        }
        Ok(())
    }

    /// Full reset for hermetic test isolation: drop every instance key and
    /// let each backend clean up its persisted artifacts.
    pub fn reset(&self) {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        for (key, instance) in instances.drain() {
            debug!(instance_key = %key, "resetting instance");
            drop(instance.databases);
            instance.backend.destroy_artifacts(&key);
        }
    }
}
