//! Change-hash store.
//!
//! A [`HashTable`] remembers one fingerprint per UID for a single
//! (member, object type) scope. A sync pass classifies every reported record
//! against it through a [`HashPass`], which buffers its updates and writes
//! them in one atomic batch on [`HashPass::commit`]. A pass that is dropped
//! without committing leaves the store untouched, so an abandoned pass can
//! simply be re-run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use syncbridge_types::{ChangeType, MemberId};
use tracing::{debug, trace};

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvOp, KvStore, key_segment};

/// Persistent UID → fingerprint table for one member and object type.
#[derive(Clone)]
pub struct HashTable {
    kv: Arc<dyn KvStore>,
    member: MemberId,
    objtype: String,
    prefix: String,
}

impl HashTable {
    pub fn new(kv: Arc<dyn KvStore>, member: MemberId, objtype: impl Into<String>) -> Self {
        let objtype = objtype.into();
        let prefix = format!("hash/{member}/{}/", key_segment(&objtype));
        Self {
            kv,
            member,
            objtype,
            prefix,
        }
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    pub fn objtype(&self) -> &str {
        &self.objtype
    }

    fn key(&self, uid: &str) -> String {
        format!("{}{uid}", self.prefix)
    }

    fn decode(key: &str, value: Vec<u8>) -> StorageResult<String> {
        String::from_utf8(value).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns the stored fingerprint of a UID.
    pub fn get(&self, uid: &str) -> StorageResult<Option<String>> {
        let key = self.key(uid);
        self.kv
            .get(&key)?
            .map(|value| Self::decode(&key, value))
            .transpose()
    }

    /// Returns every `(uid, hash)` pair, ordered by UID.
    pub fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        self.kv
            .scan(&self.prefix)?
            .into_iter()
            .map(|(key, value)| {
                let hash = Self::decode(&key, value)?;
                let uid = key[self.prefix.len()..].to_string();
                Ok((uid, hash))
            })
            .collect()
    }

    /// Stores a fingerprint outside of a pass.
    pub fn upsert(&self, uid: &str, hash: &str) -> StorageResult<()> {
        trace!(member = %self.member, uid, "upserting hash");
        self.kv.put(&self.key(uid), hash.as_bytes())
    }

    /// Removes one UID outside of a pass.
    pub fn remove(&self, uid: &str) -> StorageResult<()> {
        self.kv.delete(&self.key(uid))
    }

    /// Calls `f` for every stored `(uid, hash)` pair.
    pub fn foreach<F>(&self, mut f: F) -> StorageResult<()>
    where
        F: FnMut(&str, &str),
    {
        for (uid, hash) in self.entries()? {
            f(&uid, &hash);
        }
        Ok(())
    }

    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.kv.scan(&self.prefix)?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry of this scope.
    pub fn reset(&self) -> StorageResult<()> {
        debug!(member = %self.member, objtype = %self.objtype, "resetting hash table");
        self.kv.write_batch(vec![KvOp::delete_prefix(&self.prefix)])
    }

    /// Starts a pass over the current contents.
    ///
    /// In slow-sync mode every reported UID classifies as added, no UID is
    /// reported deleted, and commit replaces the scope with what was seen.
    pub fn begin_pass(&self, slow_sync: bool) -> StorageResult<HashPass<'_>> {
        let stored: BTreeMap<String, String> = self.entries()?.into_iter().collect();
        debug!(
            member = %self.member,
            objtype = %self.objtype,
            stored = stored.len(),
            slow_sync,
            "hash pass started"
        );
        Ok(HashPass {
            table: self,
            slow_sync,
            stored,
            seen: BTreeSet::new(),
            updates: BTreeMap::new(),
            committed: false,
        })
    }
}

impl std::fmt::Debug for HashTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTable")
            .field("member", &self.member)
            .field("objtype", &self.objtype)
            .finish()
    }
}

/// One classification pass over a [`HashTable`].
pub struct HashPass<'a> {
    table: &'a HashTable,
    slow_sync: bool,
    stored: BTreeMap<String, String>,
    seen: BTreeSet<String>,
    updates: BTreeMap<String, String>,
    committed: bool,
}

impl HashPass<'_> {
    #[must_use]
    pub fn is_slow_sync(&self) -> bool {
        self.slow_sync
    }

    /// Classifies a reported record and records its new fingerprint.
    pub fn classify(&mut self, uid: &str, hash: &str) -> ChangeType {
        self.seen.insert(uid.to_string());
        self.updates.insert(uid.to_string(), hash.to_string());
        let change = if self.slow_sync {
            ChangeType::Added
        } else {
            match self.stored.get(uid) {
                None => ChangeType::Added,
                Some(stored) if stored == hash => ChangeType::Unchanged,
                Some(_) => ChangeType::Modified,
            }
        };
        trace!(uid, %change, "classified");
        change
    }

    /// Marks a UID as still present without touching its fingerprint.
    pub fn report(&mut self, uid: &str) {
        self.seen.insert(uid.to_string());
    }

    /// UIDs stored before the pass that were neither classified nor
    /// reported.
    ///
    /// Only meaningful once every record of the pass has been seen.
    #[must_use]
    pub fn deleted_uids(&self) -> Vec<String> {
        if self.slow_sync {
            return Vec::new();
        }
        self.stored
            .keys()
            .filter(|uid| !self.seen.contains(*uid))
            .cloned()
            .collect()
    }

    /// Writes the pass to the store in one batch.
    pub fn commit(self) -> StorageResult<()> {
        let table = self.table;
        let ops = self.into_batch();
        let count = ops.len();
        table.kv.write_batch(ops)?;
        debug!(
            member = %table.member,
            objtype = %table.objtype,
            ops = count,
            "hash pass committed"
        );
        Ok(())
    }

    /// Turns the pass into the batch [`HashPass::commit`] would write, so
    /// that several passes can be written together.
    #[must_use]
    pub fn into_batch(mut self) -> Vec<KvOp> {
        let mut ops = Vec::new();
        if self.slow_sync {
            ops.push(KvOp::delete_prefix(&self.table.prefix));
        } else {
            ops.extend(self.deleted_uids().iter().map(|uid| KvOp::delete(self.table.key(uid))));
        }
        for (uid, hash) in &self.updates {
            if self.slow_sync || self.stored.get(uid) != Some(hash) {
                ops.push(KvOp::put(self.table.key(uid), hash.as_bytes()));
            }
        }
        self.committed = true;
        ops
    }
}

impl Drop for HashPass<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.updates.is_empty() {
            debug!(
                member = %self.table.member,
                objtype = %self.table.objtype,
                pending = self.updates.len(),
                "hash pass discarded"
            );
        }
    }
}
