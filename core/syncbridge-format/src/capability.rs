//! Capability table of a format.
//!
//! Every slot is optional. A slot can be filled exactly once; filling it a
//! second time is a registration error, never a silent overwrite.

use std::fmt;

use serde::{Deserialize, Serialize};
use syncbridge_types::CompareResult;

use crate::payload::Payload;
use crate::structured::{Field, ScoreTable};

/// Names a capability slot. Used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Compare,
    Copy,
    Duplicate,
    Create,
    Destroy,
    Print,
    Revision,
    Marshal,
    Demarshal,
    Validate,
    Structure,
}

impl Capability {
    /// All slots, in table order.
    pub const ALL: [Capability; 11] = [
        Self::Compare,
        Self::Copy,
        Self::Duplicate,
        Self::Create,
        Self::Destroy,
        Self::Print,
        Self::Revision,
        Self::Marshal,
        Self::Demarshal,
        Self::Validate,
        Self::Structure,
    ];

    /// Returns the lowercase slot name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Compare => "compare",
            Self::Copy => "copy",
            Self::Duplicate => "duplicate",
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Print => "print",
            Self::Revision => "revision",
            Self::Marshal => "marshal",
            Self::Demarshal => "demarshal",
            Self::Validate => "validate",
            Self::Structure => "structure",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compares two raw payloads of the same format.
pub type CompareFn = Box<dyn Fn(&[u8], &[u8]) -> CompareResult + Send + Sync>;
/// Releases a payload owned by the format.
pub type DestroyFn = Box<dyn Fn(Payload) + Send + Sync>;
/// Deep-copies a payload.
pub type CopyFn = Box<dyn Fn(&[u8]) -> Result<Payload, String> + Send + Sync>;
/// Rewrites a record under a fresh UID.
pub type DuplicateFn = Box<dyn Fn(&str, &[u8]) -> Result<Duplicated, String> + Send + Sync>;
/// Creates an empty-but-valid payload.
pub type CreateFn = Box<dyn Fn() -> Payload + Send + Sync>;
/// Renders a payload for humans.
pub type PrintFn = Box<dyn Fn(&[u8]) -> String + Send + Sync>;
/// Extracts the revision (seconds since the Unix epoch) of a payload.
pub type RevisionFn = Box<dyn Fn(&[u8]) -> Result<i64, String> + Send + Sync>;
/// Encodes a payload for transport between processes.
pub type MarshalFn = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync>;
/// Decodes a transported payload.
pub type DemarshalFn = Box<dyn Fn(&[u8]) -> Result<Payload, String> + Send + Sync>;
/// Checks that a converter produced a well-formed payload.
pub type ValidateFn = Box<dyn Fn(&[u8]) -> Result<(), String> + Send + Sync>;
/// Parses a payload into its addressable field tree.
pub type StructureFn = Box<dyn Fn(&[u8]) -> Result<Vec<Field>, String> + Send + Sync>;

/// Output of a duplicate capability.
#[derive(Debug)]
pub struct Duplicated {
    /// The newly assigned UID.
    pub uid: String,
    /// The payload rewritten for the new UID.
    pub payload: Payload,
    /// True if the payload changed and must be written back to the member.
    pub dirty: bool,
}

/// Parse function plus scoring rules for structural comparison.
pub struct Structure {
    pub(crate) parse: StructureFn,
    pub(crate) table: ScoreTable,
}

impl Structure {
    /// Returns the scoring rules.
    #[must_use]
    pub fn table(&self) -> &ScoreTable {
        &self.table
    }

    /// Parses a payload into fields.
    pub fn parse(&self, bytes: &[u8]) -> Result<Vec<Field>, String> {
        (self.parse)(bytes)
    }
}

/// The capability slots of one format.
#[derive(Default)]
pub struct Capabilities {
    pub(crate) compare: Option<CompareFn>,
    pub(crate) copy: Option<CopyFn>,
    pub(crate) duplicate: Option<DuplicateFn>,
    pub(crate) create: Option<CreateFn>,
    pub(crate) destroy: Option<DestroyFn>,
    pub(crate) print: Option<PrintFn>,
    pub(crate) revision: Option<RevisionFn>,
    pub(crate) marshal: Option<MarshalFn>,
    pub(crate) demarshal: Option<DemarshalFn>,
    pub(crate) validate: Option<ValidateFn>,
    pub(crate) structure: Option<Structure>,
}

impl Capabilities {
    /// Returns true if the slot is filled.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Compare => self.compare.is_some(),
            Capability::Copy => self.copy.is_some(),
            Capability::Duplicate => self.duplicate.is_some(),
            Capability::Create => self.create.is_some(),
            Capability::Destroy => self.destroy.is_some(),
            Capability::Print => self.print.is_some(),
            Capability::Revision => self.revision.is_some(),
            Capability::Marshal => self.marshal.is_some(),
            Capability::Demarshal => self.demarshal.is_some(),
            Capability::Validate => self.validate.is_some(),
            Capability::Structure => self.structure.is_some(),
        }
    }

    /// Lists the filled slots in table order.
    #[must_use]
    pub fn present(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.present()).finish()
    }
}
