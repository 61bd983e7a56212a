//! Typed descriptions of differences between two database snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Entry, GroupNode};

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// One difference between an old and a new snapshot.
///
/// A closed union: application and resolution code match exhaustively, so a
/// new variant is a compile-visible event everywhere it must be handled.
/// Changes are created by the scanner, decided on during resolution,
/// consumed exactly once by apply, and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// The same logical entry differs between the snapshots.
    EntryChanged { old: Entry, new: Entry },
    /// An entry exists only in the new snapshot.
    EntryAdded { entry: Entry },
    /// An entry exists only in the old snapshot.
    EntryRemoved { entry: Entry },
    /// The metadata maps differ (compared wholesale).
    MetadataChanged {
        old: BTreeMap<String, String>,
        new: BTreeMap<String, String>,
    },
    /// The group trees differ (compared wholesale).
    GroupTreeChanged {
        old: Option<GroupNode>,
        new: Option<GroupNode>,
    },
    /// The preambles differ.
    PreambleChanged {
        old: Option<String>,
        new: Option<String>,
    },
    /// A string was added to the string table.
    StringAdded { name: String, value: String },
    /// A string's value changed.
    StringChanged {
        name: String,
        old: String,
        new: String,
    },
    /// A string was removed.
    StringRemoved { name: String, value: String },
    /// A string kept its value under a new name.
    StringRenamed {
        old_name: String,
        new_name: String,
        value: String,
    },
}

impl Change {
    /// The discriminant-only view, usable as a policy key.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::EntryChanged { .. } => ChangeKind::EntryChanged,
            Self::EntryAdded { .. } => ChangeKind::EntryAdded,
            Self::EntryRemoved { .. } => ChangeKind::EntryRemoved,
            Self::MetadataChanged { .. } => ChangeKind::MetadataChanged,
            Self::GroupTreeChanged { .. } => ChangeKind::GroupTreeChanged,
            Self::PreambleChanged { .. } => ChangeKind::PreambleChanged,
            Self::StringAdded { .. } => ChangeKind::StringAdded,
            Self::StringChanged { .. } => ChangeKind::StringChanged,
            Self::StringRemoved { .. } => ChangeKind::StringRemoved,
            Self::StringRenamed { .. } => ChangeKind::StringRenamed,
        }
    }

    /// Short human-readable description for logs and change lists.
    pub fn describe(&self) -> String {
        match self {
            Self::EntryChanged { old, .. } => format!("modified entry {old}"),
            Self::EntryAdded { entry } => format!("added entry {entry}"),
            Self::EntryRemoved { entry } => format!("removed entry {entry}"),
            Self::MetadataChanged { .. } => "metadata changed".into(),
            Self::GroupTreeChanged { .. } => "group tree changed".into(),
            Self::PreambleChanged { .. } => "preamble changed".into(),
            Self::StringAdded { name, .. } => format!("added string '{name}'"),
            Self::StringChanged { name, .. } => format!("modified string '{name}'"),
            Self::StringRemoved { name, .. } => format!("removed string '{name}'"),
            Self::StringRenamed {
                old_name, new_name, ..
            } => format!("renamed string '{old_name}' to '{new_name}'"),
        }
    }
}

/// Discriminants of [`Change`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    EntryChanged,
    EntryAdded,
    EntryRemoved,
    MetadataChanged,
    GroupTreeChanged,
    PreambleChanged,
    StringAdded,
    StringChanged,
    StringRemoved,
    StringRenamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryChanged => write!(f, "entry_changed"),
            Self::EntryAdded => write!(f, "entry_added"),
            Self::EntryRemoved => write!(f, "entry_removed"),
            Self::MetadataChanged => write!(f, "metadata_changed"),
            Self::GroupTreeChanged => write!(f, "group_tree_changed"),
            Self::PreambleChanged => write!(f, "preamble_changed"),
            Self::StringAdded => write!(f, "string_added"),
            Self::StringChanged => write!(f, "string_changed"),
            Self::StringRemoved => write!(f, "string_removed"),
            Self::StringRenamed => write!(f, "string_renamed"),
        }
    }
}

/// Render a unified diff between two preamble versions for display.
pub fn preamble_diff(old: Option<&str>, new: Option<&str>) -> String {
    let old = old.unwrap_or("");
    let new = new.unwrap_or("");
    diffy::create_patch(old, new).to_string()
}

// ---------------------------------------------------------------------------
// Pending changes
// ---------------------------------------------------------------------------

/// Acceptance state of a pending change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Undecided,
    Accepted,
    Denied,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecided => write!(f, "undecided"),
            Self::Accepted => write!(f, "accepted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// A [`Change`] awaiting resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub change: Change,
    pub decision: Decision,
    /// Caller-supplied replacement applied instead of the new version when
    /// the user merged the two versions by hand. Only meaningful for
    /// [`Change::EntryChanged`].
    pub merged: Option<Entry>,
}

impl PendingChange {
    pub fn new(change: Change) -> Self {
        Self {
            change,
            decision: Decision::Undecided,
            merged: None,
        }
    }
}

impl From<Change> for PendingChange {
    fn from(change: Change) -> Self {
        Self::new(change)
    }
}
