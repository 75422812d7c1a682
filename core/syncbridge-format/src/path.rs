//! Conversion paths and breadth-first path search.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::converter::{ConverterKind, ConverterRef, ConverterState};
use crate::env::Registry;
use crate::error::{FormatError, FormatResult};
use crate::objformat::FormatRef;
use crate::record::Record;

/// An ordered chain of converter edges plus an optional configuration for
/// the last edge.
///
/// A path owns the state of its stateful edges: `initialize` runs on first
/// execution and `finalize` when the path is dropped or reconfigured. A path
/// is meant for one caller at a time; concurrent conversions each build
/// their own.
pub struct ConversionPath {
    edges: Vec<ConverterRef>,
    config: Option<String>,
    states: Vec<Option<ConverterState>>,
    prepared: bool,
}

impl ConversionPath {
    /// Builds a path from a chain of edges.
    ///
    /// Fails with [`FormatError::FormatMismatch`] if an edge does not start
    /// where the previous one ends.
    pub fn from_edges(edges: Vec<ConverterRef>) -> FormatResult<Self> {
        for pair in edges.windows(2) {
            if pair[0].to_format() != pair[1].from_format() {
                return Err(FormatError::FormatMismatch {
                    left: pair[0].to_format().name().to_string(),
                    right: pair[1].from_format().name().to_string(),
                });
            }
        }
        Ok(Self {
            edges,
            config: None,
            states: Vec::new(),
            prepared: false,
        })
    }

    #[must_use]
    pub fn edges(&self) -> &[ConverterRef] {
        &self.edges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True when the source already is an acceptable target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn source(&self) -> Option<&FormatRef> {
        self.edges.first().map(|e| e.from_format())
    }

    #[must_use]
    pub fn target(&self) -> Option<&FormatRef> {
        self.edges.last().map(|e| e.to_format())
    }

    /// Names of every format visited, source first.
    #[must_use]
    pub fn format_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.source().map(|f| f.name()).into_iter().collect();
        names.extend(self.edges.iter().map(|e| e.to_format().name()));
        names
    }

    #[must_use]
    pub fn config(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// Sets the configuration handed to the last edge.
    ///
    /// Converter state built under the previous configuration is finalized.
    pub fn set_config(&mut self, config: Option<String>) {
        self.release();
        self.config = config;
    }

    #[must_use]
    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.set_config(Some(config.into()));
        self
    }

    /// Runs the initialize hooks, once.
    ///
    /// If a hook fails, the state of the edges before it is finalized and the
    /// path stays unprepared.
    pub(crate) fn prepare(&mut self) -> FormatResult<()> {
        if self.prepared {
            return Ok(());
        }
        let last = self.edges.len().saturating_sub(1);
        let mut states = Vec::with_capacity(self.edges.len());
        for (i, edge) in self.edges.iter().enumerate() {
            let config = if i == last { self.config.as_deref() } else { None };
            match edge.initialize(config) {
                Ok(state) => states.push(state),
                Err(err) => {
                    for (edge, state) in self.edges.iter().zip(states) {
                        if let Some(state) = state {
                            edge.finalize(state);
                        }
                    }
                    return Err(err);
                }
            }
        }
        self.states = states;
        self.prepared = true;
        Ok(())
    }

    pub(crate) fn state(&self, index: usize) -> Option<&ConverterState> {
        self.states.get(index).and_then(Option::as_ref)
    }

    fn release(&mut self) {
        for (edge, state) in self.edges.iter().zip(self.states.drain(..)) {
            if let Some(state) = state {
                edge.finalize(state);
            }
        }
        self.prepared = false;
    }
}

impl Drop for ConversionPath {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for ConversionPath {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
            && self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl fmt::Debug for ConversionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionPath")
            .field("formats", &self.format_names())
            .field("config", &self.config)
            .field("prepared", &self.prepared)
            .finish()
    }
}

// ── Search ───────────────────────────────────────────────────────

/// Breadth-first search from `from` to the nearest of `targets`.
///
/// Outgoing edges are walked in registration order and nodes are marked on
/// discovery, so among shortest paths the first-registered one wins.
/// Detector edges are skipped unless a record is given; then they become
/// relabel hops, and those leaving the record's own format must accept its
/// payload.
pub(crate) fn search(
    registry: &Registry,
    from: &FormatRef,
    targets: &[FormatRef],
    record: Option<&Record>,
) -> FormatResult<Vec<ConverterRef>> {
    let is_target = |name: &str| targets.iter().any(|t| t.name() == name);
    if is_target(from.name()) {
        return Ok(Vec::new());
    }

    let mut visited: HashSet<&str> = HashSet::from([from.name()]);
    let mut via: HashMap<&str, &ConverterRef> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::from([from.name()]);

    while let Some(node) = queue.pop_front() {
        for edge in registry.outgoing(node) {
            if edge.kind() == ConverterKind::DetectOnly {
                let Some(record) = record else { continue };
                if edge.from_format() == record.format() && edge.detect(record).is_none() {
                    continue;
                }
            }
            let next = edge.to_format().name();
            if !visited.insert(next) {
                continue;
            }
            via.insert(next, edge);
            if is_target(next) {
                let mut path = vec![edge.clone()];
                let mut cursor = edge.from_format().name();
                while cursor != from.name() {
                    let Some(prev) = via.get(cursor) else { break };
                    path.push((*prev).clone());
                    cursor = prev.from_format().name();
                }
                path.reverse();
                debug!(from = %from, to = next, hops = path.len(), "found conversion path");
                return Ok(path);
            }
            queue.push_back(next);
        }
    }

    debug!(from = %from, "no conversion path");
    Err(FormatError::PathNotFound {
        from: from.name().to_string(),
        targets: targets.iter().map(|t| t.name().to_string()).collect(),
    })
}
