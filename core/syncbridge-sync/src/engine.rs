//! Reconciliation passes.
//!
//! A pass takes the records every member reported, classifies them against
//! each member's hash table, and sorts the resulting changes into mappings.
//! Hash tables and the mapping table are written together in one batch once
//! the whole pass has succeeded. A failed pass leaves both the store and the
//! in-memory mapping table as they were.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use syncbridge_format::{FormatEnv, FormatError, Record};
use syncbridge_storage::{HashPass, HashTable, KvOp, KvStore};
use syncbridge_types::{ChangeType, CompareResult, MappingId, MemberId, PassId};
use tracing::{debug, info, info_span, warn};

use crate::change::{Change, FingerprintMode, fingerprint};
use crate::error::SyncResult;
use crate::mapping::{MappingEntry, MappingTable};

/// Configuration for a reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Object type the pass works on.
    pub objtype: String,
    /// Treat every record as added and rebuild the hash tables.
    pub slow_sync: bool,
    /// How fingerprints are computed.
    pub fingerprint: FingerprintMode,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            objtype: "data".to_string(),
            slow_sync: false,
            fingerprint: FingerprintMode::Content,
        }
    }
}

/// The records one member reported in a pass.
#[derive(Debug)]
pub struct MemberReport {
    pub member: MemberId,
    pub records: Vec<(String, Record)>,
}

impl MemberReport {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_record(mut self, uid: impl Into<String>, record: Record) -> Self {
        self.records.push((uid.into(), record));
        self
    }
}

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass: PassId,
    /// Every change, in member then report order.
    pub changes: Vec<(MemberId, String, ChangeType)>,
    /// Mappings created in this pass.
    pub created: Vec<MappingId>,
    /// Mappings that received a `Similar` entry in this pass.
    pub conflicts: Vec<MappingId>,
    /// Entries dropped because their record was deleted.
    pub removed: Vec<(MappingId, MemberId, String)>,
}

impl PassSummary {
    fn new(pass: PassId) -> Self {
        Self {
            pass,
            changes: Vec::new(),
            created: Vec::new(),
            conflicts: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Returns the classification of a member's UID.
    pub fn change_type(&self, member: MemberId, uid: &str) -> Option<ChangeType> {
        self.changes
            .iter()
            .find(|(m, u, _)| *m == member && u == uid)
            .map(|(_, _, t)| *t)
    }
}

/// Runs reconciliation passes for one object type.
pub struct Reconciler {
    env: Arc<FormatEnv>,
    kv: Arc<dyn KvStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(env: Arc<FormatEnv>, kv: Arc<dyn KvStore>, config: ReconcileConfig) -> Self {
        Self { env, kv, config }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// The hash table of one member for this object type.
    pub fn hash_table(&self, member: MemberId) -> HashTable {
        HashTable::new(self.kv.clone(), member, self.config.objtype.clone())
    }

    /// Loads the mapping table for this object type.
    pub fn load_mappings(&self) -> SyncResult<MappingTable> {
        MappingTable::load(self.kv.clone(), self.config.objtype.clone())
    }

    /// Runs one pass over the members' reports, in the given order.
    ///
    /// On error nothing is persisted, `table` is left as it was, and the pass
    /// can be re-run.
    pub fn run(&self, table: &mut MappingTable, reports: Vec<MemberReport>) -> SyncResult<PassSummary> {
        let pass = PassId::new();
        let span = info_span!("reconcile", %pass, objtype = %self.config.objtype);
        let _guard = span.enter();
        let mut summary = PassSummary::new(pass);

        let tables: Vec<HashTable> = reports.iter().map(|r| self.hash_table(r.member)).collect();
        let mut hash_passes = Vec::with_capacity(tables.len());
        let mut per_member = Vec::with_capacity(reports.len());

        for (report, hashes) in reports.into_iter().zip(&tables) {
            let mut hash_pass = hashes.begin_pass(self.config.slow_sync)?;
            let mut changes = Vec::with_capacity(report.records.len());
            for (uid, record) in report.records {
                let hash = fingerprint(&record, self.config.fingerprint)?;
                let change_type = hash_pass.classify(&uid, &hash);
                changes.push(Change::new(uid, change_type, record).with_fingerprint(hash));
            }
            for uid in hash_pass.deleted_uids() {
                changes.push(Change::deleted(uid));
            }
            for change in &changes {
                summary
                    .changes
                    .push((report.member, change.uid().to_string(), change.change_type()));
            }
            debug!(member = %report.member, changes = changes.len(), "classified member");
            hash_passes.push(hash_pass);
            per_member.push((report.member, changes));
        }

        let checkpoint = table.checkpoint();
        if let Err(err) = self.apply(table, per_member, hash_passes, &mut summary) {
            warn!(%err, "pass failed, mapping table restored");
            table.restore(checkpoint);
            return Err(err);
        }

        summary.conflicts.sort();
        summary.conflicts.dedup();
        info!(
            changes = summary.changes.len(),
            created = summary.created.len(),
            conflicts = summary.conflicts.len(),
            removed = summary.removed.len(),
            "pass complete"
        );
        Ok(summary)
    }

    /// Maps every change, then writes the hash passes and the mapping table
    /// in one batch.
    fn apply(
        &self,
        table: &mut MappingTable,
        per_member: Vec<(MemberId, Vec<Change>)>,
        hash_passes: Vec<HashPass<'_>>,
        summary: &mut PassSummary,
    ) -> SyncResult<()> {
        for (member, changes) in per_member {
            for change in changes {
                self.map_change(table, member, change, summary)?;
            }
        }
        for (id, member, uid) in &summary.removed {
            debug!(%member, %uid, mapping = %id, "removed deleted entry");
            table.remove_entry(*member, uid);
        }

        let mut ops: Vec<KvOp> = hash_passes.into_iter().flat_map(HashPass::into_batch).collect();
        ops.extend(table.pending_ops()?);
        self.kv.write_batch(ops)?;
        table.mark_flushed();
        Ok(())
    }

    fn map_change(
        &self,
        table: &mut MappingTable,
        member: MemberId,
        change: Change,
        summary: &mut PassSummary,
    ) -> SyncResult<()> {
        if let Some(id) = table.find_by_entry(member, change.uid()) {
            if change.change_type() == ChangeType::Deleted {
                summary.removed.push((id, member, change.uid().to_string()));
                return Ok(());
            }
            if let Some(entry) = table
                .find_mapping_mut(id)
                .and_then(|m| m.entry_mut(member))
            {
                entry.change = Some(change);
            }
            return Ok(());
        }

        // A deletion of something never mapped has nothing to attach to.
        let Some(record) = change.record() else {
            return Ok(());
        };

        let mut best: Option<(CompareResult, MappingId)> = None;
        for mapping in table.mappings() {
            if mapping.has_member(member) {
                continue;
            }
            let Some(theirs) = mapping
                .representative()
                .and_then(|e| e.change.as_ref())
                .and_then(Change::record)
            else {
                continue;
            };
            let Some(result) = self.compare_across(record, theirs)? else {
                continue;
            };
            if !result.is_match() {
                continue;
            }
            // Mappings are visited in ID order, so only strictly better
            // results replace an earlier candidate.
            if best.is_none_or(|(q, _)| result.quality() > q.quality()) {
                best = Some((result, mapping.id));
            }
        }

        let uid = change.uid().to_string();
        match best {
            Some((result, id)) => {
                debug!(%member, %uid, mapping = %id, %result, "joined mapping");
                if result == CompareResult::Similar {
                    summary.conflicts.push(id);
                }
                if let Some(mapping) = table.find_mapping_mut(id) {
                    mapping.add_entry(MappingEntry::new(member, uid, result).with_change(change))?;
                }
            }
            None => {
                let mapping = table.create()?;
                let id = mapping.id;
                mapping.add_entry(
                    MappingEntry::new(member, uid.clone(), CompareResult::Same).with_change(change),
                )?;
                debug!(%member, %uid, mapping = %id, "created mapping");
                summary.created.push(id);
            }
        }
        Ok(())
    }

    /// Compares `ours` with `theirs`, converting a copy of `ours` into the
    /// format of `theirs` first when they differ. Returns `None` when no
    /// conversion path exists.
    fn compare_across(&self, ours: &Record, theirs: &Record) -> SyncResult<Option<CompareResult>> {
        if ours.format() == theirs.format() {
            return Ok(Some(self.env.compare(ours, theirs)?));
        }
        let converted = match self
            .env
            .converted_copy(ours, std::slice::from_ref(theirs.format()))
        {
            Ok(converted) => converted,
            Err(FormatError::PathNotFound { .. }) => {
                debug!(from = %ours.format(), to = %theirs.format(), "formats not comparable");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(self.env.compare(&converted, theirs)?))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("env", &self.env)
            .field("config", &self.config)
            .finish()
    }
}
