//! Field-level comparison of two versions of the same logical entry.
//!
//! [`compare`] classifies how two field maps relate; [`similarity`] scores
//! how much of the united field set agrees. Both are pure functions safe to
//! call from any worker thread.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::model::Entry;

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// The relationship between two entries' field sets.
///
/// Directional where it matters: `compare(a, b) == Superset` means a's
/// fields strictly contain b's, so callers must track which side was first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRelationship {
    /// Identical field sets and values.
    Equal,
    /// The first entry's fields are a strict subset of the second's, values
    /// matching on the overlap.
    Subset,
    /// The first entry's fields strictly contain the second's.
    Superset,
    /// Each side has fields the other lacks, but every shared field agrees:
    /// safe to union.
    Disjunct,
    /// At least one shared field holds conflicting values: not safely
    /// unionable.
    Different,
}

impl EntryRelationship {
    /// The same relationship seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::Subset => Self::Superset,
            Self::Superset => Self::Subset,
            other => other,
        }
    }

    /// Whether the two field sets can be unioned without losing a value.
    pub fn is_unionable(self) -> bool {
        !matches!(self, Self::Different)
    }
}

impl std::fmt::Display for EntryRelationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Subset => write!(f, "subset"),
            Self::Superset => write!(f, "superset"),
            Self::Disjunct => write!(f, "disjunct"),
            Self::Different => write!(f, "different"),
        }
    }
}

// ---------------------------------------------------------------------------
// Value comparison
// ---------------------------------------------------------------------------

pub(crate) fn normalized(value: &str) -> Cow<'_, str> {
    if !value.contains('\r') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Compare two field values, ignoring line-ending differences.
///
/// Multi-line values round-trip through external tools with platform line
/// endings; treating `\r\n` and `\r` as `\n` keeps that from surfacing as a
/// content conflict. Everything else is byte-exact and case-sensitive.
pub fn values_equal(a: &str, b: &str) -> bool {
    a == b || normalized(a) == normalized(b)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify the relationship between two entries at field granularity.
pub fn compare(a: &Entry, b: &Entry) -> EntryRelationship {
    let mut only_a = false;
    let mut only_b = false;

    for (name, value) in a.fields() {
        match b.field(name.as_str()) {
            Some(other) if values_equal(value, other) => {}
            // A conflicting shared field settles it regardless of the rest.
            Some(_) => return EntryRelationship::Different,
            None => only_a = true,
        }
    }
    for (name, _) in b.fields() {
        if a.field(name.as_str()).is_none() {
            only_b = true;
        }
    }

    match (only_a, only_b) {
        (false, false) => EntryRelationship::Equal,
        (true, false) => EntryRelationship::Superset,
        (false, true) => EntryRelationship::Subset,
        (true, true) => EntryRelationship::Disjunct,
    }
}

/// Fraction of the united field set holding equal values on both sides.
///
/// 1.0 for identical field maps, 0.0 for nothing in common. Two field-less
/// entries score 1.0. Used by the scanner's content-based matching fallback
/// together with [`compare`]; the acceptance cutoff is the tunable
/// `scan.match_threshold` (default 0.4).
pub fn similarity(a: &Entry, b: &Entry) -> f64 {
    let mut union = 0usize;
    let mut matching = 0usize;

    for (name, value) in a.fields() {
        union += 1;
        if b.field(name.as_str()).is_some_and(|o| values_equal(value, o)) {
            matching += 1;
        }
    }
    for (name, _) in b.fields() {
        if a.field(name.as_str()).is_none() {
            union += 1;
        }
    }

    if union == 0 {
        return 1.0;
    }
    matching as f64 / union as f64
}
