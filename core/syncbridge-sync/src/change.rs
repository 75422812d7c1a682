//! Changes reported by members.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use syncbridge_format::{Capability, FormatEnv, FormatRef, Record};
use syncbridge_types::{ChangeType, CompareResult};

use crate::error::SyncResult;

/// How a record's fingerprint is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Hex SHA-256 of the payload bytes.
    #[default]
    Content,
    /// The format's revision when it has a revision capability, else the
    /// content hash.
    PreferRevision,
}

/// Computes the fingerprint stored in the hash table for a record.
pub fn fingerprint(record: &Record, mode: FingerprintMode) -> SyncResult<String> {
    if mode == FingerprintMode::PreferRevision && record.format().has(Capability::Revision) {
        return Ok(record.revision()?.to_string());
    }
    Ok(hex::encode(Sha256::digest(record.bytes())))
}

/// A classified record from one member.
#[derive(Debug)]
pub struct Change {
    uid: String,
    change_type: ChangeType,
    record: Option<Record>,
    fingerprint: Option<String>,
}

impl Change {
    pub fn new(uid: impl Into<String>, change_type: ChangeType, record: Record) -> Self {
        Self {
            uid: uid.into(),
            change_type,
            record: Some(record),
            fingerprint: None,
        }
    }

    /// A deletion carries no record.
    pub fn deleted(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            change_type: ChangeType::Deleted,
            record: None,
            fingerprint: None,
        }
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<Record> {
        self.record
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn format(&self) -> Option<&FormatRef> {
        self.record.as_ref().map(Record::format)
    }

    /// Compares two changes.
    ///
    /// Different change types never match. Two deletions are the same.
    /// Otherwise the records are compared; they must share a format.
    pub fn compare(&self, other: &Change, env: &FormatEnv) -> SyncResult<CompareResult> {
        if self.change_type != other.change_type {
            return Ok(CompareResult::Mismatch);
        }
        match (&self.record, &other.record) {
            (Some(a), Some(b)) => Ok(env.compare(a, b)?),
            (None, None) => Ok(CompareResult::Same),
            _ => Ok(CompareResult::Mismatch),
        }
    }
}
