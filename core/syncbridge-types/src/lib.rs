//! Core type definitions for syncbridge.
//!
//! This crate defines the small, format-agnostic types shared by the
//! conversion, storage and reconciliation crates:
//! - Member, mapping and pass identifiers
//! - Change classification (added / modified / deleted / unchanged)
//! - The three-valued comparison result
//!
//! Anything that knows about a concrete encoding belongs to
//! `syncbridge-format`, not here.

mod change;
mod compare;
mod ids;

pub use change::ChangeType;
pub use compare::CompareResult;
pub use ids::{MappingId, MemberId, PassId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown change type: {0}")]
    UnknownChangeType(String),

    #[error("unknown compare result: {0}")]
    UnknownCompareResult(String),
}
