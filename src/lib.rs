//! Redmock - in-process Redis-compatible store emulation for integration
//! testing.
//!
//! No server process, no sockets: commands are plain method calls on a
//! [`Db`] handle, with the same return values, error messages and
//! edge-case behavior a real client would observe. Handles constructed
//! with equal connection options share data through a process-wide
//! registry, so multiple "clients" of one logical server can be simulated
//! in a single test.
//!
//! # Example
//!
//! ```
//! use redmock::Db;
//!
//! let db = Db::open_memory();
//!
//! db.set("key", b"value", None).unwrap();
//! let value = db.get("key").unwrap();
//! assert_eq!(value, Some(b"value".to_vec()));
//! ```
//!
//! Call [`Db::reset_all`] between tests to drop every database in the
//! process, including any filesystem-backed state.

pub mod backend;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod expiring;
pub mod registry;
mod setops;
pub mod sort;
pub mod storage;
pub mod types;
pub mod zset;

pub use backend::Backend;
pub use db::Db;
pub use dispatch::Reply;
pub use error::{KvError, Result};
pub use expiring::ExpiringDb;
pub use registry::Registry;
pub use sort::{SortOptions, Sorted};
pub use storage::{DataStore, FileStore, MemoryStore};
pub use types::{Aggregate, ConnectOptions, KeyType, SetOptions, Value, ZMember};
pub use zset::ZSet;
