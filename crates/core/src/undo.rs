//! Compound, invertible edits for the host's undo history.
//!
//! Every successful change application produces one [`CompoundEdit`]: the
//! full set of recorded mutations, revertible and re-appliable as a unit.
//! The engine does not own a history; the host's undo framework receives
//! edits through the [`UndoSink`] seam.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{BibDatabase, Entry, GroupNode};

// ---------------------------------------------------------------------------
// Atomic edits
// ---------------------------------------------------------------------------

/// One recorded, invertible mutation of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AtomicEdit {
    /// An entry's contents were overwritten in place.
    EntryReplaced { before: Entry, after: Entry },
    /// An entry was inserted.
    EntryInserted { entry: Entry },
    /// An entry was deleted.
    EntryDeleted { entry: Entry },
    /// A string-table slot was set, changed, or cleared.
    StringSet {
        name: String,
        before: Option<String>,
        after: Option<String>,
    },
    /// The preamble was replaced.
    PreambleSet {
        before: Option<String>,
        after: Option<String>,
    },
    /// The metadata map was replaced wholesale.
    MetadataSet {
        before: BTreeMap<String, String>,
        after: BTreeMap<String, String>,
    },
    /// The group tree was replaced wholesale.
    GroupsSet {
        before: Option<GroupNode>,
        after: Option<GroupNode>,
    },
}

impl AtomicEdit {
    fn apply(&self, db: &mut BibDatabase, forward: bool) {
        match self {
            Self::EntryReplaced { before, after } => {
                let source = if forward { after } else { before };
                let id = before.id();
                if let Some(target) = db.entry_by_id_mut(id) {
                    target.assign(source);
                }
            }
            Self::EntryInserted { entry } => {
                if forward {
                    db.insert_entry(entry.clone());
                } else {
                    db.remove_entry(entry.id());
                }
            }
            Self::EntryDeleted { entry } => {
                if forward {
                    db.remove_entry(entry.id());
                } else {
                    db.insert_entry(entry.clone());
                }
            }
            Self::StringSet { name, before, after } => {
                let value = if forward { after } else { before };
                match value {
                    Some(v) => {
                        db.set_string(name, v);
                    }
                    None => {
                        db.remove_string(name);
                    }
                }
            }
            Self::PreambleSet { before, after } => {
                let value = if forward { after } else { before };
                db.set_preamble(value.as_deref());
            }
            Self::MetadataSet { before, after } => {
                let value = if forward { after } else { before };
                db.set_metadata(value.clone());
            }
            Self::GroupsSet { before, after } => {
                let value = if forward { after } else { before };
                db.set_groups(value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compound edit
// ---------------------------------------------------------------------------

/// An ordered set of atomic edits applied (and reverted) as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundEdit {
    label: String,
    edits: Vec<AtomicEdit>,
}

impl CompoundEdit {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            edits: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn push(&mut self, edit: AtomicEdit) {
        self.edits.push(edit);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Revert every edit, newest first.
    pub fn undo(&self, db: &mut BibDatabase) {
        for edit in self.edits.iter().rev() {
            edit.apply(db, false);
        }
    }

    /// Re-apply every edit in original order.
    pub fn redo(&self, db: &mut BibDatabase) {
        for edit in &self.edits {
            edit.apply(db, true);
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Receives one compound edit per successful apply.
///
/// Implemented by the host's undo history. `Vec<CompoundEdit>` implements it
/// for tests and hosts that only need a flat log.
pub trait UndoSink {
    fn add_edit(&mut self, edit: CompoundEdit);
}

impl UndoSink for Vec<CompoundEdit> {
    fn add_edit(&mut self, edit: CompoundEdit) {
        self.push(edit);
    }
}

/// Discards every edit; for hosts without undo support.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEdits;

impl UndoSink for DiscardEdits {
    fn add_edit(&mut self, _edit: CompoundEdit) {}
}
