//! Converter edges between formats.
//!
//! An edge is directed and immutable once registered. Conversion functions
//! take the input payload by value and must say in their return type what
//! became of it, so the pipeline can destroy every buffer exactly once.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{FormatError, FormatResult};
use crate::objformat::FormatRef;
use crate::payload::Payload;
use crate::record::Record;

/// Kind of a converter edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    /// Re-encodes the payload.
    Convert,
    /// Wraps the payload in an outer format.
    Encapsulate,
    /// Unwraps an inner format.
    Decapsulate,
    /// Confirms a sub-format from content; never transforms data.
    DetectOnly,
}

impl ConverterKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Encapsulate => "encapsulate",
            Self::Decapsulate => "decapsulate",
            Self::DetectOnly => "detect-only",
        }
    }

    /// Returns true for edges that carry data.
    #[must_use]
    pub const fn transforms(&self) -> bool {
        !matches!(self, Self::DetectOnly)
    }
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-path state created by an edge's initialize hook.
pub type ConverterState = Box<dyn Any + Send>;

/// Successful outcome of a conversion function.
#[derive(Debug)]
pub enum Converted {
    /// The input was consumed or reused in place; only the output remains.
    Consumed(Payload),
    /// A new payload was produced; the input is handed back for the source
    /// format to destroy.
    Produced { output: Payload, input: Payload },
}

impl Converted {
    /// Shorthand for a converter that reuses its input buffer.
    #[must_use]
    pub fn consumed(output: impl Into<Payload>) -> Self {
        Self::Consumed(output.into())
    }

    /// Shorthand for a converter that leaves the input untouched.
    #[must_use]
    pub fn produced(output: impl Into<Payload>, input: Payload) -> Self {
        Self::Produced {
            output: output.into(),
            input,
        }
    }
}

/// Failed outcome of a conversion function. The input is returned intact.
#[derive(Debug)]
pub struct Rejected {
    pub input: Payload,
    pub reason: String,
}

impl Rejected {
    #[must_use]
    pub fn new(input: Payload, reason: impl Into<String>) -> Self {
        Self {
            input,
            reason: reason.into(),
        }
    }
}

/// Context handed to a conversion function.
#[derive(Clone, Copy, Default)]
pub struct ConvertContext<'a> {
    /// Path configuration. Only set for the last edge of a path.
    pub config: Option<&'a str>,
    /// State returned by the edge's initialize hook.
    pub state: Option<&'a ConverterState>,
}

impl<'a> ConvertContext<'a> {
    /// Downcasts the converter state.
    #[must_use]
    pub fn state<T: 'static>(&self) -> Option<&'a T> {
        self.state.and_then(|s| s.downcast_ref::<T>())
    }
}

impl fmt::Debug for ConvertContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertContext")
            .field("config", &self.config)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

pub type ConvertFn =
    Box<dyn Fn(Payload, &ConvertContext<'_>) -> Result<Converted, Rejected> + Send + Sync>;
pub type DetectFn = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;
pub type InitializeFn = Box<dyn Fn(Option<&str>) -> Result<ConverterState, String> + Send + Sync>;
pub type FinalizeFn = Box<dyn Fn(ConverterState) + Send + Sync>;

enum Operation {
    Convert(ConvertFn),
    Detect(Option<DetectFn>),
}

/// A directed edge between two formats.
pub struct ConverterEdge {
    kind: ConverterKind,
    from: FormatRef,
    to: FormatRef,
    op: Operation,
    initialize: Option<InitializeFn>,
    finalize: Option<FinalizeFn>,
}

/// Shared handle to a registered converter edge.
pub type ConverterRef = std::sync::Arc<ConverterEdge>;

impl ConverterEdge {
    /// Creates a data-carrying edge.
    ///
    /// Fails with [`FormatError::InvalidConverter`] for
    /// [`ConverterKind::DetectOnly`]; use [`ConverterEdge::detector`].
    pub fn new<F>(kind: ConverterKind, from: FormatRef, to: FormatRef, convert: F) -> FormatResult<Self>
    where
        F: Fn(Payload, &ConvertContext<'_>) -> Result<Converted, Rejected> + Send + Sync + 'static,
    {
        if !kind.transforms() {
            return Err(FormatError::InvalidConverter {
                from: from.name().to_string(),
                to: to.name().to_string(),
                reason: "detector edges take a detect function".to_string(),
            });
        }
        Ok(Self {
            kind,
            from,
            to,
            op: Operation::Convert(Box::new(convert)),
            initialize: None,
            finalize: None,
        })
    }

    /// Creates a detector edge. `None` means detection always succeeds.
    #[must_use]
    pub fn detector(from: FormatRef, to: FormatRef, detect: Option<DetectFn>) -> Self {
        Self {
            kind: ConverterKind::DetectOnly,
            from,
            to,
            op: Operation::Detect(detect),
            initialize: None,
            finalize: None,
        }
    }

    /// Attaches initialize/finalize hooks for stateful converters.
    #[must_use]
    pub fn with_hooks<I, D>(mut self, initialize: I, finalize: D) -> Self
    where
        I: Fn(Option<&str>) -> Result<ConverterState, String> + Send + Sync + 'static,
        D: Fn(ConverterState) + Send + Sync + 'static,
    {
        self.initialize = Some(Box::new(initialize));
        self.finalize = Some(Box::new(finalize));
        self
    }

    #[must_use]
    pub fn kind(&self) -> ConverterKind {
        self.kind
    }

    #[must_use]
    pub fn from_format(&self) -> &FormatRef {
        &self.from
    }

    #[must_use]
    pub fn to_format(&self) -> &FormatRef {
        &self.to
    }

    /// Returns true if this detector has a content check.
    #[must_use]
    pub fn has_detect_fn(&self) -> bool {
        matches!(self.op, Operation::Detect(Some(_)))
    }

    /// Runs the initialize hook, if any.
    pub(crate) fn initialize(&self, config: Option<&str>) -> FormatResult<Option<ConverterState>> {
        match &self.initialize {
            Some(init) => init(config).map(Some).map_err(|cause| self.failure(cause)),
            None => Ok(None),
        }
    }

    /// Runs the finalize hook on state produced by [`Self::initialize`].
    pub(crate) fn finalize(&self, state: ConverterState) {
        if let Some(fini) = &self.finalize {
            fini(state);
        }
    }

    /// Checks a record against this edge.
    ///
    /// A record already in the target format is confirmed as-is. A record in
    /// the source format is confirmed if the edge has no detect function or
    /// the function accepts the payload.
    #[must_use]
    pub fn detect(&self, record: &Record) -> Option<FormatRef> {
        if record.format() == &self.to {
            return Some(self.to.clone());
        }
        if record.format() != &self.from {
            return None;
        }
        match &self.op {
            Operation::Detect(Some(detect)) => detect(record.bytes()).then(|| self.to.clone()),
            _ => Some(self.to.clone()),
        }
    }

    /// Runs the conversion function on a payload.
    ///
    /// Invoking a detector is a programming error: the input is destroyed
    /// through the source format and [`FormatError::DetectorExecuted`] is
    /// returned.
    pub fn invoke(
        &self,
        input: Payload,
        ctx: &ConvertContext<'_>,
    ) -> FormatResult<Result<Converted, Rejected>> {
        match &self.op {
            Operation::Convert(convert) => {
                trace!(from = %self.from, to = %self.to, size = input.len(), "invoking converter");
                Ok(convert(input, ctx))
            }
            Operation::Detect(_) => {
                self.from.destroy(input);
                Err(FormatError::DetectorExecuted {
                    from: self.from.name().to_string(),
                    to: self.to.name().to_string(),
                })
            }
        }
    }

    pub(crate) fn failure(&self, cause: impl Into<String>) -> FormatError {
        FormatError::ConversionFailed {
            from: self.from.name().to_string(),
            to: self.to.name().to_string(),
            cause: cause.into(),
        }
    }
}

impl fmt::Debug for ConverterEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterEdge")
            .field("kind", &self.kind)
            .field("from", &self.from.name())
            .field("to", &self.to.name())
            .field("stateful", &self.initialize.is_some())
            .finish()
    }
}

impl fmt::Display for ConverterEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.kind)
    }
}
