//! Backing-store selection.

use std::path::PathBuf;

use crate::error::Result;
use crate::storage::{DataStore, FileStore, MemoryStore};

/// Backend selection for a connection's databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Memory-resident maps (default).
    Memory,
    /// SQLite file under the OS temp directory, shared by all databases of
    /// one instance key.
    Filesystem,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Memory
    }
}

impl Backend {
    /// Parse from string (for configuration).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Backend::Memory),
            "filesystem" | "file" => Some(Backend::Filesystem),
            _ => None,
        }
    }

    /// Open the backing store for one database index of an instance key.
    pub(crate) fn open(&self, instance_key: &str, index: usize) -> Result<Box<dyn DataStore>> {
        match self {
            Backend::Memory => Ok(Box::new(MemoryStore::new())),
            Backend::Filesystem => Ok(Box::new(FileStore::open(
                &Self::artifact_path(instance_key),
                index,
            )?)),
        }
    }

    /// Remove any persisted artifact for an instance key. A no-op for the
    /// memory backend.
    pub(crate) fn destroy_artifacts(&self, instance_key: &str) {
        if let Backend::Filesystem = self {
            FileStore::remove_artifact(&Self::artifact_path(instance_key));
        }
    }

    fn artifact_path(instance_key: &str) -> PathBuf {
        let safe: String = instance_key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        std::env::temp_dir().join(format!("redmock-{safe}.sqlite"))
    }
}
