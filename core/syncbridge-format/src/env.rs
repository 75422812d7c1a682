//! The format environment: registry, path search and conversion entry points.
//!
//! Registration goes through a [`FormatEnvBuilder`], which is consumed by
//! [`FormatEnvBuilder::build`]. The resulting [`FormatEnv`] is immutable and
//! `Send + Sync`, so it can be shared behind an `Arc` by any number of
//! concurrent readers without locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use syncbridge_types::CompareResult;
use tracing::{Dispatch, debug, trace, warn};

use crate::compare;
use crate::converter::{ConverterEdge, ConverterKind, ConverterRef};
use crate::error::{FormatError, FormatResult};
use crate::objformat::{FormatRef, ObjFormat};
use crate::path::{self, ConversionPath};
use crate::pipeline;
use crate::record::Record;

/// Formats and converters in registration order, with name indexes.
#[derive(Default)]
pub(crate) struct Registry {
    formats: Vec<FormatRef>,
    by_name: HashMap<String, usize>,
    converters: Vec<ConverterRef>,
    by_pair: HashMap<(String, String), Vec<usize>>,
    by_source: HashMap<String, Vec<usize>>,
    /// Inverse detectors added on the caller's behalf.
    implicit: HashSet<usize>,
}

impl Registry {
    fn add_format(&mut self, format: ObjFormat) -> FormatResult<FormatRef> {
        if let Some(existing) = self.find_format(format.name()) {
            if existing.objtype() != format.objtype() {
                return Err(FormatError::ConflictingObjType {
                    name: format.name().to_string(),
                    existing: existing.objtype().to_string(),
                    requested: format.objtype().to_string(),
                });
            }
            return Err(FormatError::DuplicateFormat(format.name().to_string()));
        }
        let format = Arc::new(format);
        self.by_name
            .insert(format.name().to_string(), self.formats.len());
        self.formats.push(format.clone());
        Ok(format)
    }

    fn add_converter(&mut self, edge: ConverterEdge) -> FormatResult<ConverterRef> {
        for end in [edge.from_format(), edge.to_format()] {
            match self.find_format(end.name()) {
                Some(registered) if Arc::ptr_eq(&registered, end) => {}
                _ => return Err(FormatError::FormatNotFound(end.name().to_string())),
            }
        }

        let key = (
            edge.from_format().name().to_string(),
            edge.to_format().name().to_string(),
        );
        let same_kind = self
            .by_pair
            .get(&key)
            .and_then(|ids| ids.iter().copied().find(|&i| self.converters[i].kind() == edge.kind()));

        if let Some(index) = same_kind {
            // An explicit detector supersedes the implied inverse.
            if edge.kind() == ConverterKind::DetectOnly && self.implicit.remove(&index) {
                let edge = Arc::new(edge);
                self.converters[index] = edge.clone();
                return Ok(edge);
            }
            return Err(FormatError::DuplicateConverter {
                from: key.0,
                to: key.1,
                kind: edge.kind(),
            });
        }

        let inverse = (edge.kind() == ConverterKind::DetectOnly
            && key.0 != key.1
            && self.find_converter_of_kind(&key.1, &key.0, ConverterKind::DetectOnly).is_none())
        .then(|| ConverterEdge::detector(edge.to_format().clone(), edge.from_format().clone(), None));

        let edge = self.push_converter(key, edge);
        if let Some(inverse) = inverse {
            let key = (
                inverse.from_format().name().to_string(),
                inverse.to_format().name().to_string(),
            );
            self.push_converter(key, inverse);
            self.implicit.insert(self.converters.len() - 1);
        }
        Ok(edge)
    }

    fn push_converter(&mut self, key: (String, String), edge: ConverterEdge) -> ConverterRef {
        let index = self.converters.len();
        let edge = Arc::new(edge);
        self.by_source.entry(key.0.clone()).or_default().push(index);
        self.by_pair.entry(key).or_default().push(index);
        self.converters.push(edge.clone());
        edge
    }

    pub(crate) fn find_format(&self, name: &str) -> Option<FormatRef> {
        self.by_name.get(name).map(|&i| self.formats[i].clone())
    }

    fn find_converter(&self, from: &str, to: &str) -> Option<ConverterRef> {
        self.by_pair
            .get(&(from.to_string(), to.to_string()))
            .and_then(|ids| ids.first())
            .map(|&i| self.converters[i].clone())
    }

    fn find_converter_of_kind(&self, from: &str, to: &str, kind: ConverterKind) -> Option<ConverterRef> {
        self.by_pair
            .get(&(from.to_string(), to.to_string()))?
            .iter()
            .map(|&i| &self.converters[i])
            .find(|e| e.kind() == kind)
            .cloned()
    }

    /// Edges leaving a format, in registration order.
    pub(crate) fn outgoing<'a>(&'a self, from: &str) -> impl Iterator<Item = &'a ConverterRef> + use<'a> {
        self.by_source
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.converters[i])
    }
}

// ── Builder ──────────────────────────────────────────────────────

/// Collects formats and converters before the environment is frozen.
#[derive(Default)]
pub struct FormatEnvBuilder {
    registry: Registry,
    dispatch: Option<Dispatch>,
}

impl FormatEnvBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every log statement of the built environment to `dispatch`.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Registers a format and returns its shared handle.
    pub fn register_format(&mut self, format: ObjFormat) -> FormatResult<FormatRef> {
        let format = self.registry.add_format(format)?;
        debug!(format = %format, objtype = format.objtype(), "registered format");
        Ok(format)
    }

    /// Registers a converter edge. Both ends must be registered formats.
    ///
    /// A detector `A -> B` also registers an always-succeeding detector
    /// `B -> A` unless one exists; a later explicit `B -> A` detector
    /// replaces it.
    pub fn register_converter(&mut self, edge: ConverterEdge) -> FormatResult<ConverterRef> {
        let edge = self.registry.add_converter(edge)?;
        debug!(converter = %edge, "registered converter");
        Ok(edge)
    }

    #[must_use]
    pub fn find_format(&self, name: &str) -> Option<FormatRef> {
        self.registry.find_format(name)
    }

    #[must_use]
    pub fn build(self) -> FormatEnv {
        FormatEnv {
            registry: self.registry,
            dispatch: self.dispatch,
        }
    }
}

// ── Environment ──────────────────────────────────────────────────

/// A frozen set of formats and converters.
pub struct FormatEnv {
    registry: Registry,
    dispatch: Option<Dispatch>,
}

impl FormatEnv {
    #[must_use]
    pub fn builder() -> FormatEnvBuilder {
        FormatEnvBuilder::new()
    }

    /// Runs `f` with the injected dispatcher as the default, if there is one.
    fn traced<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    // ── Lookup ───────────────────────────────────────────────────

    #[must_use]
    pub fn find_format(&self, name: &str) -> Option<FormatRef> {
        self.registry.find_format(name)
    }

    /// Like [`Self::find_format`], failing with `FormatNotFound`.
    pub fn require_format(&self, name: &str) -> FormatResult<FormatRef> {
        self.find_format(name)
            .ok_or_else(|| FormatError::FormatNotFound(name.to_string()))
    }

    /// Returns the first registered edge between two formats.
    #[must_use]
    pub fn find_converter(&self, from: &str, to: &str) -> Option<ConverterRef> {
        self.registry.find_converter(from, to)
    }

    /// Like [`Self::find_converter`], failing with `ConverterNotFound`.
    pub fn require_converter(&self, from: &str, to: &str) -> FormatResult<ConverterRef> {
        self.find_converter(from, to)
            .ok_or_else(|| FormatError::ConverterNotFound {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// All formats, in registration order.
    #[must_use]
    pub fn formats(&self) -> &[FormatRef] {
        &self.registry.formats
    }

    /// All converters, in registration order.
    #[must_use]
    pub fn converters(&self) -> &[ConverterRef] {
        &self.registry.converters
    }

    // ── Path search ──────────────────────────────────────────────

    /// Finds the shortest path from `from` to any of `targets`, ignoring
    /// detector edges.
    pub fn find_path(&self, from: &FormatRef, targets: &[FormatRef]) -> FormatResult<ConversionPath> {
        self.traced(|| {
            let edges = path::search(&self.registry, from, targets, None)?;
            ConversionPath::from_edges(edges)
        })
    }

    pub fn find_path_to(&self, from: &FormatRef, to: &FormatRef) -> FormatResult<ConversionPath> {
        self.find_path(from, std::slice::from_ref(to))
    }

    pub fn find_path_by_names(&self, from: &str, targets: &[&str]) -> FormatResult<ConversionPath> {
        let from = self.require_format(from)?;
        let targets = targets
            .iter()
            .map(|name| self.require_format(name))
            .collect::<FormatResult<Vec<_>>>()?;
        self.find_path(&from, &targets)
    }

    /// Finds the shortest path for a concrete record, allowing detector
    /// hops that accept its payload.
    pub fn find_path_for_record(&self, record: &Record, targets: &[FormatRef]) -> FormatResult<ConversionPath> {
        self.traced(|| {
            let edges = path::search(&self.registry, record.format(), targets, Some(record))?;
            ConversionPath::from_edges(edges)
        })
    }

    // ── Conversion ───────────────────────────────────────────────

    /// Executes a path on a record. See [`pipeline::execute`].
    pub fn convert(&self, path: &mut ConversionPath, record: &mut Record) -> FormatResult<()> {
        self.traced(|| pipeline::execute(path, record))
    }

    /// Converts a record to the nearest of `targets`.
    pub fn convert_to(&self, record: &mut Record, targets: &[FormatRef]) -> FormatResult<()> {
        let mut path = self.find_path_for_record(record, targets)?;
        self.convert(&mut path, record)
    }

    /// Copies a record and converts the copy, leaving the original untouched.
    pub fn converted_copy(&self, record: &Record, targets: &[FormatRef]) -> FormatResult<Record> {
        let mut copy = record.try_clone()?;
        self.convert_to(&mut copy, targets)?;
        Ok(copy)
    }

    // ── Detection ────────────────────────────────────────────────

    /// Sniffs the sub-format of a record with the content detectors leaving
    /// its format. The first accepting detector wins.
    #[must_use]
    pub fn detect(&self, record: &Record) -> Option<FormatRef> {
        self.traced(|| {
            let found = self
                .registry
                .outgoing(record.format().name())
                .filter(|e| e.kind() == ConverterKind::DetectOnly && e.has_detect_fn())
                .find_map(|e| e.detect(record));
            trace!(format = %record.format(), detected = ?found.as_ref().map(|f| f.name()), "detect");
            found
        })
    }

    /// Detects and decapsulates a copy of the record until neither applies,
    /// returning the innermost format reached.
    pub fn detect_full(&self, record: &Record) -> FormatResult<FormatRef> {
        self.traced(|| {
            let mut current = record.try_clone()?;
            let mut seen: HashSet<String> = HashSet::from([current.format().name().to_string()]);
            loop {
                if let Some(detected) = self.detect(&current) {
                    if !seen.insert(detected.name().to_string()) {
                        warn!(format = %detected, "detection cycle");
                        break;
                    }
                    current.relabel(&detected);
                    continue;
                }
                let decap = self
                    .registry
                    .outgoing(current.format().name())
                    .find(|e| e.kind() == ConverterKind::Decapsulate)
                    .cloned();
                let Some(edge) = decap else { break };
                if !seen.insert(edge.to_format().name().to_string()) {
                    warn!(format = %edge.to_format(), "decapsulation cycle");
                    break;
                }
                let mut path = ConversionPath::from_edges(vec![edge])?;
                pipeline::execute(&mut path, &mut current)?;
            }
            Ok(current.format().clone())
        })
    }

    // ── Records ──────────────────────────────────────────────────

    /// Compares two records of the same format.
    pub fn compare(&self, a: &Record, b: &Record) -> FormatResult<CompareResult> {
        self.traced(|| compare::compare(a, b))
    }

    /// Creates a record through a format's create capability.
    pub fn create_record(&self, format: &str) -> FormatResult<Record> {
        let format = self.require_format(format)?;
        let payload = format.create()?;
        Ok(Record::new(format, payload))
    }

    /// Resolves a transported `(format, objtype, bytes)` tuple.
    pub fn record_from_wire(&self, format: &str, objtype: &str, bytes: &[u8]) -> FormatResult<Record> {
        Record::from_wire(self, format, objtype, bytes)
    }
}

impl std::fmt::Debug for FormatEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEnv")
            .field("formats", &self.registry.formats.len())
            .field("converters", &self.registry.converters.len())
            .field("dispatch", &self.dispatch.is_some())
            .finish()
    }
}
