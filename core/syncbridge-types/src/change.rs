//! Change classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// How a record observed in the current pass relates to the previous pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The UID was not known before.
    Added,
    /// The UID was known with a different fingerprint.
    Modified,
    /// The UID was known but not reported in this pass.
    Deleted,
    /// The UID was known with the same fingerprint.
    Unchanged,
}

impl ChangeType {
    /// Returns true if the change carries no record data.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Returns true if the change needs to be propagated to other members.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Returns the lowercase name used in logs and persisted state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            "unchanged" => Ok(Self::Unchanged),
            other => Err(Error::UnknownChangeType(other.to_string())),
        }
    }
}
