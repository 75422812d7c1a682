//! Error types for the sync layer.

use syncbridge_format::FormatError;
use syncbridge_storage::StorageError;
use syncbridge_types::{MappingId, MemberId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while classifying and mapping changes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Conversion or comparison failed.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted mapping data could not be interpreted.
    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// No mapping with this ID exists.
    #[error("mapping not found: {0}")]
    MappingNotFound(MappingId),

    /// A mapping already holds an entry for this member.
    #[error("mapping {mapping} already has an entry for member {member}")]
    DuplicateEntry { mapping: MappingId, member: MemberId },

    /// A mapping with this ID is already in the table.
    #[error("mapping {0} already exists")]
    DuplicateMapping(MappingId),

    /// No mapping ID is left to allocate.
    #[error("mapping ids exhausted after {0}")]
    IdsExhausted(MappingId),
}
