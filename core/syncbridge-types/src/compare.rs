//! The three-valued comparison result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Outcome of comparing two records of the same format.
///
/// "Could not determine" is never represented here; that is an error
/// raised by the comparator, distinct from a successful `Mismatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareResult {
    /// Both records describe the same object with the same content.
    Same,
    /// Both records describe the same object but their content differs.
    Similar,
    /// The records describe different objects.
    Mismatch,
}

impl CompareResult {
    /// Returns true for `Same` and `Similar`.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        !matches!(self, Self::Mismatch)
    }

    /// Match quality, higher is better. Used to rank mapping candidates.
    #[must_use]
    pub const fn quality(&self) -> u8 {
        match self {
            Self::Same => 2,
            Self::Similar => 1,
            Self::Mismatch => 0,
        }
    }

    /// Returns the lowercase name used in logs and persisted state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::Similar => "similar",
            Self::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for CompareResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareResult {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same" => Ok(Self::Same),
            "similar" => Ok(Self::Similar),
            "mismatch" => Ok(Self::Mismatch),
            other => Err(Error::UnknownCompareResult(other.to_string())),
        }
    }
}
