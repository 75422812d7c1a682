//! Scored structural comparison.
//!
//! Formats without a hand-written compare function can expose their payload
//! as a tree of [`Field`]s plus a [`ScoreTable`]. Two documents are then
//! compared by greedily pairing fields under weighted rules:
//!
//! - each field belongs to the first rule whose selector matches it, or to
//!   the default bucket when no rule does
//! - within a rule, a field of the first document takes the first
//!   structurally equal field of the second (`+weight`), else the first
//!   key-similar one (`+weight`, the documents are no longer the same),
//!   else it scores `-weight`
//! - unpaired fields of the second document score `-weight`, except that
//!   each one offsets an unpaired field of the first document, so a changed
//!   field costs its weight once
//! - fields no rule selects are bucketed by name and scored the same way
//!   with `default_weight`
//!
//! Pairing is first-match in document order, not an optimal assignment, so
//! ambiguous documents can score lower than their best pairing would. The
//! documents are always fed in a canonical order (smaller payload first),
//! which makes the classification independent of argument order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use syncbridge_types::CompareResult;
use tracing::trace;

use crate::capability::{Capability, Structure};
use crate::error::{FormatError, FormatResult};

// ── Field tree ───────────────────────────────────────────────────

/// One addressable node of a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Field>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            value: None,
            children: Vec::new(),
        }
    }

    /// Creates a field holding only a value.
    #[must_use]
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name).with_value(value)
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Field) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the value of the first child with the given name.
    #[must_use]
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.value.as_deref())
    }

    /// Resolves a rule key: `@attr` names an attribute, anything else a child.
    #[must_use]
    pub fn key(&self, key: &str) -> Option<&str> {
        match key.strip_prefix('@') {
            Some(attr) => self.attributes.get(attr).map(String::as_str),
            None => self.child_value(key),
        }
    }

    /// Compares two trees, treating children as an unordered multiset.
    #[must_use]
    pub fn structurally_equal(&self, other: &Field) -> bool {
        if self.name != other.name
            || self.value != other.value
            || self.attributes != other.attributes
            || self.children.len() != other.children.len()
        {
            return false;
        }
        let mut used = vec![false; other.children.len()];
        self.children.iter().all(|child| {
            let hit = other
                .children
                .iter()
                .enumerate()
                .find(|(i, candidate)| !used[*i] && child.structurally_equal(candidate));
            match hit {
                Some((i, _)) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }

    /// True when at least one key is present on both sides and every key
    /// present on both sides agrees.
    fn key_similar(&self, other: &Field, keys: &[String]) -> bool {
        let mut shared = 0;
        for key in keys {
            if let (Some(a), Some(b)) = (self.key(key), other.key(key)) {
                if a != b {
                    return false;
                }
                shared += 1;
            }
        }
        shared > 0
    }
}

// ── Rules ────────────────────────────────────────────────────────

/// Selects fields by name and optionally one attribute value.
///
/// Written as `Name` or `Name[@attr=value]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    name: String,
    attr: Option<(String, String)>,
}

impl Selector {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matches(&self, field: &Field) -> bool {
        field.name == self.name
            && self
                .attr
                .as_ref()
                .is_none_or(|(k, v)| field.attributes.get(k) == Some(v))
    }
}

fn invalid(selector: &str, reason: &str) -> FormatError {
    FormatError::InvalidSelector {
        selector: selector.to_string(),
        reason: reason.to_string(),
    }
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

impl FromStr for Selector {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, attr) = match s.split_once('[') {
            None => (s, None),
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(']')
                    .ok_or_else(|| invalid(s, "missing closing bracket"))?;
                let inner = inner
                    .strip_prefix('@')
                    .ok_or_else(|| invalid(s, "predicate must start with @"))?;
                let (key, value) = inner
                    .split_once('=')
                    .ok_or_else(|| invalid(s, "predicate must be @attr=value"))?;
                if !valid_name(key) {
                    return Err(invalid(s, "bad attribute name"));
                }
                (name, Some((key.to_string(), value.to_string())))
            }
        };
        if !valid_name(name) {
            return Err(invalid(s, "bad field name"));
        }
        Ok(Self {
            name: name.to_string(),
            attr,
        })
    }
}

impl TryFrom<String> for Selector {
    type Error = FormatError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some((k, v)) = &self.attr {
            write!(f, "[@{k}={v}]")?;
        }
        Ok(())
    }
}

/// How much a rule's fields count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Points(u32),
    /// The fields affect neither score nor sameness.
    Ignore,
}

/// A weighted selector, optionally with keys for fuzzy pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub selector: Selector,
    pub weight: Weight,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl FieldRule {
    pub fn new(selector: &str, points: u32) -> FormatResult<Self> {
        Ok(Self {
            selector: selector.parse()?,
            weight: Weight::Points(points),
            keys: Vec::new(),
        })
    }

    pub fn ignore(selector: &str) -> FormatResult<Self> {
        Ok(Self {
            selector: selector.parse()?,
            weight: Weight::Ignore,
            keys: Vec::new(),
        })
    }

    /// Lets non-equal fields pair up when their keys agree.
    #[must_use]
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Scoring configuration for structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub rules: Vec<FieldRule>,
    /// Weight of fields no rule selects.
    pub default_weight: u32,
    /// Minimum score for a `Similar` result.
    pub threshold: i64,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_weight: 1,
            threshold: 1,
        }
    }
}

impl ScoreTable {
    #[must_use]
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_default_weight(mut self, weight: u32) -> Self {
        self.default_weight = weight;
        self
    }

    /// Scores two field lists, in the given order.
    #[must_use]
    pub fn score(&self, left: &[Field], right: &[Field]) -> Scored {
        let mut buckets: Vec<(Vec<&Field>, Vec<&Field>)> =
            vec![(Vec::new(), Vec::new()); self.rules.len()];
        let mut unruled: BTreeMap<&str, (Vec<&Field>, Vec<&Field>)> = BTreeMap::new();

        for (fields, right_side) in [(left, false), (right, true)] {
            for field in fields {
                let bucket = match self.rules.iter().position(|r| r.selector.matches(field)) {
                    Some(i) => &mut buckets[i],
                    None => unruled.entry(field.name.as_str()).or_default(),
                };
                if right_side {
                    bucket.1.push(field);
                } else {
                    bucket.0.push(field);
                }
            }
        }

        let mut scored = Scored {
            score: 0,
            same: true,
        };

        for (rule, (l, r)) in self.rules.iter().zip(buckets) {
            let Weight::Points(points) = rule.weight else {
                continue;
            };
            scored.pair(&l, r, i64::from(points), i64::from(points), &rule.keys);
        }
        let default_weight = i64::from(self.default_weight);
        for (l, r) in unruled.into_values() {
            scored.pair(&l, r, default_weight, default_weight, &[]);
        }
        scored
    }

    fn classify(&self, scored: Scored) -> CompareResult {
        if scored.same {
            CompareResult::Same
        } else if scored.score >= self.threshold {
            CompareResult::Similar
        } else {
            CompareResult::Mismatch
        }
    }
}

/// Outcome of scoring two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scored {
    pub score: i64,
    /// True when every counted field found an equal partner.
    pub same: bool,
}

impl Scored {
    fn pair(&mut self, left: &[&Field], right: Vec<&Field>, reward: i64, penalty: i64, keys: &[String]) {
        let mut open: Vec<Option<&Field>> = right.into_iter().map(Some).collect();
        let mut missing = 0;
        for field in left {
            if let Some(slot) = open
                .iter_mut()
                .find(|slot| slot.is_some_and(|other| field.structurally_equal(other)))
            {
                *slot = None;
                self.score += reward;
                continue;
            }
            self.same = false;
            if !keys.is_empty() {
                if let Some(slot) = open
                    .iter_mut()
                    .find(|slot| slot.is_some_and(|other| field.key_similar(other, keys)))
                {
                    *slot = None;
                    self.score += reward;
                    continue;
                }
            }
            self.score -= penalty;
            missing += 1;
        }
        let leftover = open.iter().flatten().count();
        if leftover > 0 {
            self.same = false;
            self.score -= penalty * leftover.saturating_sub(missing) as i64;
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────

/// Compares two payloads of a format through its structure capability.
pub(crate) fn compare_structured(
    format: &str,
    structure: &Structure,
    a: &[u8],
    b: &[u8],
) -> FormatResult<CompareResult> {
    let (first, second) = if (b.len(), b) < (a.len(), a) {
        (b, a)
    } else {
        (a, b)
    };
    let parse = |bytes: &[u8]| {
        structure
            .parse(bytes)
            .map_err(|reason| FormatError::CapabilityFailed {
                format: format.to_string(),
                capability: Capability::Structure,
                reason,
            })
    };
    let left = parse(first)?;
    let right = parse(second)?;
    let table = structure.table();
    let scored = table.score(&left, &right);
    let result = table.classify(scored);
    trace!(format, score = scored.score, same = scored.same, %result, "structural comparison");
    Ok(result)
}
