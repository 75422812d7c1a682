//! Persistence for syncbridge.
//!
//! Everything is stored through the [`KvStore`] contract, so any ordered
//! key-value backend works. Two backends ship with the crate:
//! - [`MemoryKv`]: a `BTreeMap` behind a mutex
//! - [`SqliteKv`]: a single SQLite table
//!
//! On top of it, [`HashTable`] keeps per-member content fingerprints used to
//! classify records as added, modified, deleted or unchanged.

pub mod error;
pub mod hashtable;
pub mod kv;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use hashtable::{HashPass, HashTable};
pub use kv::{KvOp, KvStore, MemoryKv, key_segment};
pub use sqlite::SqliteKv;
