//! Error types for the format layer.

use thiserror::Error;

use crate::capability::Capability;
use crate::converter::ConverterKind;

/// Result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors that can occur while registering formats, searching paths,
/// converting or comparing records.
#[derive(Debug, Error)]
pub enum FormatError {
    /// No format is registered under this name.
    #[error("format not found: {0}")]
    FormatNotFound(String),

    /// No converter is registered between the two formats.
    #[error("converter not found: {from} -> {to}")]
    ConverterNotFound { from: String, to: String },

    /// No sequence of converters reaches any acceptable target.
    #[error("no conversion path from {from} to any of [{}]", .targets.join(", "))]
    PathNotFound { from: String, targets: Vec<String> },

    /// A converter reported failure for one hop of a path.
    #[error("conversion {from} -> {to} failed: {cause}")]
    ConversionFailed {
        from: String,
        to: String,
        cause: String,
    },

    /// The operation needs a capability the format does not provide.
    #[error("format {format} has no {capability} capability")]
    CapabilityMissing {
        format: String,
        capability: Capability,
    },

    /// A capability callback reported failure.
    #[error("{capability} capability of format {format} failed: {reason}")]
    CapabilityFailed {
        format: String,
        capability: Capability,
        reason: String,
    },

    /// A capability slot was filled twice.
    #[error("format {format} already has a {capability} capability")]
    CapabilityAlreadySet {
        format: String,
        capability: Capability,
    },

    /// A format with this name is already registered.
    #[error("format already registered: {0}")]
    DuplicateFormat(String),

    /// A format with this name is already registered for another object type.
    #[error("format {name} already registered for object type {existing}, not {requested}")]
    ConflictingObjType {
        name: String,
        existing: String,
        requested: String,
    },

    /// A converter of the same kind already connects the two formats.
    #[error("{kind} converter {from} -> {to} already registered")]
    DuplicateConverter {
        from: String,
        to: String,
        kind: ConverterKind,
    },

    /// A detector edge was handed to the conversion entry point.
    #[error("detector {from} -> {to} cannot be executed as a conversion")]
    DetectorExecuted { from: String, to: String },

    /// A converter was built with a kind that does not match its operation.
    #[error("invalid converter {from} -> {to}: {reason}")]
    InvalidConverter {
        from: String,
        to: String,
        reason: String,
    },

    /// Two records (or a record and a path) disagree on their format.
    #[error("format mismatch: {left} vs {right}")]
    FormatMismatch { left: String, right: String },

    /// A structural comparison rule could not be parsed.
    #[error("invalid field selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}
