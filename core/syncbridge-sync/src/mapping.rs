//! The mapping model: groups of per-member entries believed to describe one
//! logical object.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use syncbridge_storage::{KvOp, KvStore, key_segment};
use syncbridge_types::{CompareResult, MappingId, MemberId};
use tracing::debug;

use crate::change::Change;
use crate::error::{SyncError, SyncResult};

/// One member's record within a mapping.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingEntry {
    pub member_id: MemberId,
    pub uid: String,
    /// How the entry compared to the mapping when it joined.
    pub comparison: CompareResult,
    /// The change observed in the current pass, if any.
    #[serde(skip)]
    pub change: Option<Change>,
}

impl MappingEntry {
    pub fn new(member_id: MemberId, uid: impl Into<String>, comparison: CompareResult) -> Self {
        Self {
            member_id,
            uid: uid.into(),
            comparison,
            change: None,
        }
    }

    #[must_use]
    pub fn with_change(mut self, change: Change) -> Self {
        self.change = Some(change);
        self
    }
}

/// A logical object and the entries that represent it on each member.
#[derive(Debug, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub entries: Vec<MappingEntry>,
    /// Set when an entry joined as `Similar`; resolution is up to the caller.
    #[serde(default)]
    pub conflict: bool,
}

impl Mapping {
    pub fn new(id: MappingId) -> Self {
        Self {
            id,
            entries: Vec::new(),
            conflict: false,
        }
    }

    pub fn entry(&self, member: MemberId) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.member_id == member)
    }

    pub fn entry_mut(&mut self, member: MemberId) -> Option<&mut MappingEntry> {
        self.entries.iter_mut().find(|e| e.member_id == member)
    }

    pub fn has_member(&self, member: MemberId) -> bool {
        self.entry(member).is_some()
    }

    /// Adds an entry; a mapping holds at most one entry per member.
    pub fn add_entry(&mut self, entry: MappingEntry) -> SyncResult<()> {
        if self.has_member(entry.member_id) {
            return Err(SyncError::DuplicateEntry {
                mapping: self.id,
                member: entry.member_id,
            });
        }
        if entry.comparison == CompareResult::Similar {
            self.conflict = true;
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove_entry(&mut self, member: MemberId) -> Option<MappingEntry> {
        let index = self.entries.iter().position(|e| e.member_id == member)?;
        Some(self.entries.remove(index))
    }

    pub fn members(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.entries.iter().map(|e| e.member_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first entry carrying a record in the current pass. New records
    /// are compared against it.
    pub fn representative(&self) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.change.as_ref().is_some_and(|c| c.record().is_some()))
    }
}

// ── Table ───────────────────────────────────────────────────────

const NEXT_ID: &str = "next_id";

/// All mappings of one object type, persisted through a [`KvStore`].
///
/// Changes are kept in memory until [`MappingTable::flush`], which writes
/// them in one batch.
pub struct MappingTable {
    kv: Arc<dyn KvStore>,
    objtype: String,
    mappings: BTreeMap<MappingId, Mapping>,
    next_id: MappingId,
    dirty: BTreeSet<MappingId>,
    removed: BTreeSet<MappingId>,
}

impl MappingTable {
    /// Creates an empty table. Nothing is read from the store.
    pub fn new(kv: Arc<dyn KvStore>, objtype: impl Into<String>) -> Self {
        Self {
            kv,
            objtype: objtype.into(),
            mappings: BTreeMap::new(),
            next_id: MappingId::new(1),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    fn prefix(objtype: &str) -> String {
        format!("mapping/{}/", key_segment(objtype))
    }

    fn key(&self, id: MappingId) -> String {
        format!("{}{:020}", Self::prefix(&self.objtype), id.get())
    }

    /// Loads every stored mapping of `objtype`.
    pub fn load(kv: Arc<dyn KvStore>, objtype: impl Into<String>) -> SyncResult<Self> {
        let mut table = Self::new(kv, objtype);
        let prefix = Self::prefix(&table.objtype);
        let mut stored_next = None;

        for (key, value) in table.kv.scan(&prefix)? {
            let corrupt = |reason: String| SyncError::Corrupt {
                key: key.clone(),
                reason,
            };
            if &key[prefix.len()..] == NEXT_ID {
                let text = std::str::from_utf8(&value).map_err(|e| corrupt(e.to_string()))?;
                let next = text.parse::<i64>().map_err(|e| corrupt(e.to_string()))?;
                stored_next = Some(MappingId::new(next));
                continue;
            }
            let mapping: Mapping =
                serde_json::from_slice(&value).map_err(|e| corrupt(e.to_string()))?;
            table.mappings.insert(mapping.id, mapping);
        }

        let after_last = match table.mappings.keys().next_back() {
            Some(last) => last.checked_next().ok_or_else(|| SyncError::Corrupt {
                key: table.key(*last),
                reason: "mapping id space exhausted".to_string(),
            })?,
            None => MappingId::new(1),
        };
        table.next_id = stored_next.map_or(after_last, |n| n.max(after_last));
        debug!(
            objtype = %table.objtype,
            mappings = table.mappings.len(),
            next_id = %table.next_id,
            "loaded mapping table"
        );
        Ok(table)
    }

    /// Writes pending changes in one batch.
    pub fn flush(&mut self) -> SyncResult<()> {
        let ops = self.pending_ops()?;
        let count = ops.len();
        self.kv.write_batch(ops)?;
        self.mark_flushed();
        debug!(objtype = %self.objtype, ops = count, "flushed mapping table");
        Ok(())
    }

    /// The batch the next flush would write.
    pub(crate) fn pending_ops(&self) -> SyncResult<Vec<KvOp>> {
        let mut ops = Vec::new();
        for id in &self.removed {
            ops.push(KvOp::delete(self.key(*id)));
        }
        for id in &self.dirty {
            if let Some(mapping) = self.mappings.get(id) {
                ops.push(KvOp::put(self.key(*id), serde_json::to_vec(mapping)?));
            }
        }
        ops.push(KvOp::put(
            format!("{}{NEXT_ID}", Self::prefix(&self.objtype)),
            self.next_id.get().to_string(),
        ));
        Ok(ops)
    }

    pub(crate) fn mark_flushed(&mut self) {
        self.dirty.clear();
        self.removed.clear();
    }

    pub fn objtype(&self) -> &str {
        &self.objtype
    }

    /// The ID the next new mapping will get.
    pub fn next_id(&self) -> MappingId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mappings in ID order.
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    pub fn find_mapping(&self, id: MappingId) -> Option<&Mapping> {
        self.mappings.get(&id)
    }

    /// Mutable access; the mapping is written on the next flush.
    pub fn find_mapping_mut(&mut self, id: MappingId) -> Option<&mut Mapping> {
        let mapping = self.mappings.get_mut(&id)?;
        self.dirty.insert(id);
        Some(mapping)
    }

    /// Finds the mapping holding `uid` for `member`.
    pub fn find_by_entry(&self, member: MemberId, uid: &str) -> Option<MappingId> {
        self.mappings
            .values()
            .find(|m| m.entry(member).is_some_and(|e| e.uid == uid))
            .map(|m| m.id)
    }

    /// Creates an empty mapping with a fresh ID.
    pub fn create(&mut self) -> SyncResult<&mut Mapping> {
        let id = self.next_id;
        self.next_id = id.checked_next().ok_or(SyncError::IdsExhausted(id))?;
        self.dirty.insert(id);
        self.removed.remove(&id);
        Ok(self.mappings.entry(id).or_insert_with(|| Mapping::new(id)))
    }

    /// Inserts a mapping with a caller-chosen ID.
    pub fn add(&mut self, mapping: Mapping) -> SyncResult<()> {
        let id = mapping.id;
        if self.mappings.contains_key(&id) {
            return Err(SyncError::DuplicateMapping(id));
        }
        if id >= self.next_id {
            self.next_id = id.checked_next().ok_or(SyncError::IdsExhausted(id))?;
        }
        self.dirty.insert(id);
        self.removed.remove(&id);
        self.mappings.insert(id, mapping);
        Ok(())
    }

    pub fn remove_mapping(&mut self, id: MappingId) -> SyncResult<Mapping> {
        let mapping = self
            .mappings
            .remove(&id)
            .ok_or(SyncError::MappingNotFound(id))?;
        self.dirty.remove(&id);
        self.removed.insert(id);
        Ok(mapping)
    }

    /// Removes one member's entry. A mapping left without entries is
    /// removed as well.
    pub fn remove_entry(&mut self, member: MemberId, uid: &str) -> Option<MappingEntry> {
        let id = self.find_by_entry(member, uid)?;
        let mapping = self.find_mapping_mut(id)?;
        let entry = mapping.remove_entry(member);
        if mapping.is_empty() {
            self.mappings.remove(&id);
            self.dirty.remove(&id);
            self.removed.insert(id);
        }
        entry
    }
}

// ── Checkpoints ─────────────────────────────────────────────────

/// The in-memory state of a table before a pass.
///
/// Taking a checkpoint detaches the changes of the previous pass, so that
/// only changes of the running pass serve as representatives.
pub(crate) struct Checkpoint {
    mappings: BTreeMap<MappingId, Mapping>,
    next_id: MappingId,
    dirty: BTreeSet<MappingId>,
    removed: BTreeSet<MappingId>,
    changes: Vec<(MappingId, MemberId, Change)>,
}

impl Mapping {
    /// A copy without the attached changes.
    fn detached(&self) -> Self {
        Self {
            id: self.id,
            entries: self
                .entries
                .iter()
                .map(|e| MappingEntry::new(e.member_id, e.uid.clone(), e.comparison))
                .collect(),
            conflict: self.conflict,
        }
    }
}

impl MappingTable {
    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        let mut changes = Vec::new();
        for mapping in self.mappings.values_mut() {
            for entry in &mut mapping.entries {
                if let Some(change) = entry.change.take() {
                    changes.push((mapping.id, entry.member_id, change));
                }
            }
        }
        Checkpoint {
            mappings: self.mappings.iter().map(|(id, m)| (*id, m.detached())).collect(),
            next_id: self.next_id,
            dirty: self.dirty.clone(),
            removed: self.removed.clone(),
            changes,
        }
    }

    /// Puts the table back into the state it had at `checkpoint`.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.mappings = checkpoint.mappings;
        self.next_id = checkpoint.next_id;
        self.dirty = checkpoint.dirty;
        self.removed = checkpoint.removed;
        for (id, member, change) in checkpoint.changes {
            if let Some(entry) = self.mappings.get_mut(&id).and_then(|m| m.entry_mut(member)) {
                entry.change = Some(change);
            }
        }
    }
}

impl std::fmt::Debug for MappingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingTable")
            .field("objtype", &self.objtype)
            .field("mappings", &self.mappings.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
