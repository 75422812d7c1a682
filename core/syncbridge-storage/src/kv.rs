//! The narrow key-value contract persistence goes through.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::StorageResult;

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Removes every key starting with the prefix.
    DeletePrefix { prefix: String },
}

impl KvOp {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn delete_prefix(prefix: impl Into<String>) -> Self {
        Self::DeletePrefix {
            prefix: prefix.into(),
        }
    }
}

/// Escapes a value used as one `/`-separated key segment, so that scope
/// prefixes built from segments never nest into each other.
pub fn key_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

/// Ordered key-value storage.
///
/// Keys are compared bytewise. `scan` returns matches in key order.
/// `write_batch` applies all of its operations or none of them.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    fn delete(&self, key: &str) -> StorageResult<()>;

    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    fn write_batch(&self, ops: Vec<KvOp>) -> StorageResult<()>;
}

/// In-memory store. Useful for tests and for members without persistence.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.lock()?.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, ops: Vec<KvOp>) -> StorageResult<()> {
        let mut entries = self.entries.lock()?;
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                KvOp::Delete { key } => {
                    entries.remove(&key);
                }
                KvOp::DeletePrefix { prefix } => {
                    entries.retain(|k, _| !k.starts_with(&prefix));
                }
            }
        }
        Ok(())
    }
}
