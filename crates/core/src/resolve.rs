//! The change resolution log: accept, deny, merge, and atomic application.
//!
//! A [`ResolutionLog`] holds the ordered changes one scan produced. The
//! resolution step (a user, or a [`PolicyTable`] of defaults) decides each
//! change; [`ResolutionLog::apply`] then realizes the accepted subset on the
//! live database as a single all-or-nothing mutation, recorded as one
//! compound, undoable edit.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::diff::{Change, ChangeKind, Decision, PendingChange};
use crate::errors::{ApplyError, ResolveError};
use crate::model::{BibDatabase, Entry};
use crate::undo::{AtomicEdit, CompoundEdit, UndoSink};

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Default decisions per change kind, consulted for undecided changes.
///
/// Constructed once at startup and passed by reference to the resolution
/// step. There is no process-wide registry: hosts that want different
/// defaults build different tables.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    defaults: BTreeMap<ChangeKind, Decision>,
}

impl PolicyTable {
    /// An empty table: undecided changes stay undecided.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table accepting every change kind.
    pub fn accept_all() -> Self {
        let mut table = Self::new();
        for kind in [
            ChangeKind::EntryChanged,
            ChangeKind::EntryAdded,
            ChangeKind::EntryRemoved,
            ChangeKind::MetadataChanged,
            ChangeKind::GroupTreeChanged,
            ChangeKind::PreambleChanged,
            ChangeKind::StringAdded,
            ChangeKind::StringChanged,
            ChangeKind::StringRemoved,
            ChangeKind::StringRenamed,
        ] {
            table.register(kind, Decision::Accepted);
        }
        table
    }

    /// Register (or override) the default decision for a change kind.
    pub fn register(&mut self, kind: ChangeKind, decision: Decision) {
        self.defaults.insert(kind, decision);
    }

    pub fn decision_for(&self, kind: ChangeKind) -> Option<Decision> {
        self.defaults.get(&kind).copied()
    }
}

// ---------------------------------------------------------------------------
// Applied set
// ---------------------------------------------------------------------------

/// Summary of one successful application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedSet {
    /// Changes applied to the live database.
    pub applied: usize,
    /// Changes denied and discarded.
    pub denied: usize,
    /// Changes left undecided (skipped, neither applied nor discarded).
    pub undecided: usize,
    /// Raised only if at least one change was actually applied.
    pub database_changed: bool,
}

// ---------------------------------------------------------------------------
// Resolution log
// ---------------------------------------------------------------------------

/// The ordered accept/deny/merge ledger for one scan's changes.
#[derive(Debug, Clone)]
pub struct ResolutionLog {
    changes: Vec<PendingChange>,
    applied: bool,
}

impl ResolutionLog {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            changes: changes.into_iter().map(PendingChange::new).collect(),
            applied: false,
        }
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether this log was already applied (its changes are consumed).
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Accept one change.
    pub fn accept(&mut self, index: usize) -> Result<(), ResolveError> {
        self.pending_mut(index)?.decision = Decision::Accepted;
        Ok(())
    }

    /// Deny one change; it will be discarded at apply time.
    pub fn deny(&mut self, index: usize) -> Result<(), ResolveError> {
        self.pending_mut(index)?.decision = Decision::Denied;
        Ok(())
    }

    /// Accept an entry modification with a caller-supplied merged
    /// replacement, applied instead of the scanned new version.
    pub fn accept_with_merge(&mut self, index: usize, merged: Entry) -> Result<(), ResolveError> {
        let pending = self.pending_mut(index)?;
        if !matches!(pending.change, Change::EntryChanged { .. }) {
            return Err(ResolveError::MergedNotApplicable {
                kind: pending.change.kind().to_string(),
            });
        }
        pending.decision = Decision::Accepted;
        pending.merged = Some(merged);
        Ok(())
    }

    /// Give every still-undecided change its default from the policy table.
    pub fn decide_undecided(&mut self, table: &PolicyTable) {
        for pending in &mut self.changes {
            if pending.decision == Decision::Undecided {
                if let Some(decision) = table.decision_for(pending.change.kind()) {
                    debug!(
                        change = %pending.change.describe(),
                        %decision,
                        "applying default decision"
                    );
                    pending.decision = decision;
                }
            }
        }
    }

    fn pending_mut(&mut self, index: usize) -> Result<&mut PendingChange, ResolveError> {
        if self.applied {
            return Err(ResolveError::AlreadyApplied);
        }
        let len = self.changes.len();
        self.changes
            .get_mut(index)
            .ok_or(ResolveError::IndexOutOfRange { index, len })
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Apply the accepted subset to the live database.
    ///
    /// All-or-nothing: every accepted change lands, or -- on any failure --
    /// the live database is left untouched and the log stays usable for a
    /// retry. On success the whole set is recorded as one compound edit in
    /// the undo sink, and the log is consumed.
    pub fn apply(
        &mut self,
        db: &mut BibDatabase,
        undo: &mut dyn UndoSink,
    ) -> Result<AppliedSet, ApplyError> {
        if self.applied {
            return Err(ApplyError::AlreadyApplied);
        }

        // Work on a scratch clone; the live snapshot is only replaced once
        // every accepted change has landed.
        let mut scratch = db.clone();
        let mut edit = CompoundEdit::new("external changes");
        let mut set = AppliedSet::default();

        for pending in &self.changes {
            match pending.decision {
                Decision::Denied => set.denied += 1,
                Decision::Undecided => set.undecided += 1,
                Decision::Accepted => {
                    apply_change(&mut scratch, &mut edit, pending)?;
                    set.applied += 1;
                }
            }
        }

        *db = scratch;
        set.database_changed = set.applied > 0;
        if set.database_changed {
            undo.add_edit(edit);
        }
        self.applied = true;

        info!(
            applied = set.applied,
            denied = set.denied,
            undecided = set.undecided,
            "change set applied"
        );
        Ok(set)
    }
}

/// Realize one accepted change on the scratch snapshot, recording the
/// inverse. Exhaustive over [`Change`]: a new variant must be handled here.
fn apply_change(
    db: &mut BibDatabase,
    edit: &mut CompoundEdit,
    pending: &PendingChange,
) -> Result<(), ApplyError> {
    match &pending.change {
        Change::EntryChanged { old, new } => {
            let replacement = pending.merged.as_ref().unwrap_or(new);
            let target = db
                .entry_by_id_mut(old.id())
                .ok_or_else(|| ApplyError::StaleChange {
                    detail: format!("entry {old} is no longer in the database"),
                })?;
            let before = target.clone();
            target.assign(replacement);
            let after = target.clone();
            edit.push(AtomicEdit::EntryReplaced { before, after });
        }
        Change::EntryAdded { entry } => {
            match db.insert_entry(entry.clone()) {
                Some(replaced) => edit.push(AtomicEdit::EntryReplaced {
                    before: replaced,
                    after: entry.clone(),
                }),
                None => edit.push(AtomicEdit::EntryInserted {
                    entry: entry.clone(),
                }),
            }
        }
        Change::EntryRemoved { entry } => {
            // Already gone is fine; removal is idempotent.
            if let Some(removed) = db.remove_entry(entry.id()) {
                edit.push(AtomicEdit::EntryDeleted { entry: removed });
            }
        }
        Change::MetadataChanged { old: _, new } => {
            let before = db.metadata().clone();
            db.set_metadata(new.clone());
            edit.push(AtomicEdit::MetadataSet {
                before,
                after: new.clone(),
            });
        }
        Change::GroupTreeChanged { old: _, new } => {
            let before = db.groups().cloned();
            db.set_groups(new.clone());
            edit.push(AtomicEdit::GroupsSet {
                before,
                after: new.clone(),
            });
        }
        Change::PreambleChanged { old: _, new } => {
            let before = db.preamble().map(str::to_owned);
            db.set_preamble(new.as_deref());
            edit.push(AtomicEdit::PreambleSet {
                before,
                after: new.clone(),
            });
        }
        Change::StringAdded { name, value } => {
            let before = db.set_string(name, value);
            edit.push(AtomicEdit::StringSet {
                name: name.clone(),
                before,
                after: Some(value.clone()),
            });
        }
        Change::StringChanged { name, old: _, new } => {
            let before = db.set_string(name, new);
            edit.push(AtomicEdit::StringSet {
                name: name.clone(),
                before,
                after: Some(new.clone()),
            });
        }
        Change::StringRemoved { name, value: _ } => {
            if let Some(before) = db.remove_string(name) {
                edit.push(AtomicEdit::StringSet {
                    name: name.clone(),
                    before: Some(before),
                    after: None,
                });
            }
        }
        Change::StringRenamed {
            old_name,
            new_name,
            value,
        } => {
            if let Some(before) = db.remove_string(old_name) {
                edit.push(AtomicEdit::StringSet {
                    name: old_name.clone(),
                    before: Some(before),
                    after: None,
                });
            }
            let before = db.set_string(new_name, value);
            edit.push(AtomicEdit::StringSet {
                name: new_name.clone(),
                before,
                after: Some(value.clone()),
            });
        }
    }
    Ok(())
}
