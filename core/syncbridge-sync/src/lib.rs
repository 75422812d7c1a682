//! Reconciliation for syncbridge.
//!
//! Ties the format engine and the storage layer together:
//! - [`Change`]: a member's record classified against its hash table
//! - [`Mapping`] / [`MappingTable`]: per-object groups of member entries
//! - [`Reconciler`]: one pass of classification and mapping construction
//!
//! Deciding which side of a conflicting mapping wins is left to the caller;
//! a pass only groups entries and flags mappings that joined by similarity.

pub mod change;
pub mod engine;
pub mod error;
pub mod mapping;

pub use change::{Change, FingerprintMode, fingerprint};
pub use engine::{MemberReport, PassSummary, ReconcileConfig, Reconciler};
pub use error::{SyncError, SyncResult};
pub use mapping::{Mapping, MappingEntry, MappingTable};
