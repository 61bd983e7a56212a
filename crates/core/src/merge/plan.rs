//! Merge plan extraction and application.
//!
//! A [`MergePlan`] is the remote delta relative to base, restricted to what
//! local left untouched: the textbook three-way patch, generalized from
//! lines to record fields. Extracting and applying are separate steps so a
//! host can inspect (or log) exactly what a clean merge will do.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compare::values_equal;
use crate::config::ScanConfig;
use crate::diff::match_entries;
use crate::errors::MergeError;
use crate::loader::DatabaseLoader;
use crate::model::{BibDatabase, Entry, EntryId, FieldName};

use super::detector::{modified_content, ConflictDetector, EntryConflict};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Pending updates to one local entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    /// Field updates; `None` removes the field.
    pub fields: BTreeMap<FieldName, Option<String>>,
    /// New entry type, when remote changed it and local kept the base's.
    pub entry_type: Option<String>,
    /// New citation key, when remote renamed it and local kept the base's.
    /// The inner `None` clears the key.
    pub citation_key: Option<Option<String>>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.entry_type.is_none() && self.citation_key.is_none()
    }
}

/// The inspectable product of a clean three-way analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    /// Patches keyed by the local entry's stable id.
    pub patches: BTreeMap<EntryId, FieldPatch>,
    /// Entries present only in remote, inserted as-is.
    pub new_entries: Vec<Entry>,
    /// Local entries deleted in remote and untouched locally.
    pub deleted: Vec<EntryId>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.new_entries.is_empty() && self.deleted.is_empty()
    }
}

/// The outcome of one three-way merge attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeResult {
    /// Merged cleanly; the applied plan is carried for inspection.
    Clean { plan: MergePlan },
    /// Divergent edits need explicit resolution; nothing was applied.
    Conflicts(Vec<EntryConflict>),
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean { .. })
    }
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Quick check: does this triple merge without conflicts?
    pub fn can_auto_merge(
        base: &BibDatabase,
        local: &BibDatabase,
        remote: &BibDatabase,
        config: &ScanConfig,
    ) -> bool {
        ConflictDetector::detect(base, local, remote, config).is_empty()
    }

    /// Extract the remote-relative-to-base delta restricted to what local
    /// left untouched.
    ///
    /// On a conflict-free triple this is the complete clean merge. On a
    /// conflicted triple the conflicting fields are simply absent from the
    /// plan (local wins), so callers wanting conflict surfacing must run the
    /// detector first -- [`Merger::merge`] does.
    pub fn extract_plan(
        base: &BibDatabase,
        local: &BibDatabase,
        remote: &BibDatabase,
        config: &ScanConfig,
    ) -> MergePlan {
        let base_to_local = match_entries(base, local, config);
        let base_to_remote = match_entries(base, remote, config);
        let local_of_base: HashMap<usize, usize> = base_to_local.pairs.iter().copied().collect();
        let remote_of_base: HashMap<usize, usize> = base_to_remote.pairs.iter().copied().collect();

        let mut plan = MergePlan::default();

        for (i, base_entry) in base.entries().iter().enumerate() {
            let local_entry = local_of_base.get(&i).map(|&j| &local.entries()[j]);
            let remote_entry = remote_of_base.get(&i).map(|&j| &remote.entries()[j]);

            match (local_entry, remote_entry) {
                (Some(l), Some(r)) => {
                    let patch = build_patch(Some(base_entry), l, r);
                    if !patch.is_empty() {
                        plan.patches.insert(l.id(), patch);
                    }
                }
                // Remote deleted; an untouched local copy follows suit.
                (Some(l), None) => {
                    if !modified_content(base_entry, l) {
                        plan.deleted.push(l.id());
                    }
                }
                // Local deleted: the deletion stands regardless of remote.
                (None, _) => {}
            }
        }

        // Entries added on both sides under the same key merge field-wise;
        // remote-only additions come over whole.
        let mut used_remote_adds = vec![false; base_to_remote.unmatched_new.len()];
        for &li in &base_to_local.unmatched_new {
            let local_entry = &local.entries()[li];
            let Some(key) = local_entry.citation_key() else {
                continue;
            };
            let counterpart = base_to_remote
                .unmatched_new
                .iter()
                .enumerate()
                .find(|(slot, &rj)| {
                    !used_remote_adds[*slot]
                        && remote.entries()[rj].citation_key() == Some(key)
                });
            if let Some((slot, &rj)) = counterpart {
                used_remote_adds[slot] = true;
                let patch = build_patch(None, local_entry, &remote.entries()[rj]);
                if !patch.is_empty() {
                    plan.patches.insert(local_entry.id(), patch);
                }
            }
        }
        for (slot, &rj) in base_to_remote.unmatched_new.iter().enumerate() {
            if !used_remote_adds[slot] {
                plan.new_entries.push(remote.entries()[rj].clone());
            }
        }

        debug!(
            patches = plan.patches.len(),
            new_entries = plan.new_entries.len(),
            deleted = plan.deleted.len(),
            "merge plan extracted"
        );
        plan
    }

    /// Apply a plan to the local snapshot it was extracted from.
    pub fn apply_plan(local: &mut BibDatabase, plan: &MergePlan) -> Result<(), MergeError> {
        for (id, patch) in &plan.patches {
            let entry = local
                .entry_by_id_mut(*id)
                .ok_or_else(|| MergeError::PlanTargetMissing { id: id.to_string() })?;
            if let Some(entry_type) = &patch.entry_type {
                entry.set_entry_type(entry_type);
            }
            if let Some(key) = &patch.citation_key {
                entry.set_citation_key(key.as_deref());
            }
            for (name, value) in &patch.fields {
                match value {
                    Some(v) => entry.set_field(name.as_str(), v),
                    None => {
                        entry.remove_field(name.as_str());
                    }
                }
            }
        }
        for entry in &plan.new_entries {
            local.insert_entry(entry.clone());
        }
        for id in &plan.deleted {
            local.remove_entry(*id);
        }
        Ok(())
    }

    /// Apply the remote delta onto `local` in place.
    ///
    /// Valid only when the detector reports no conflicts for the triple;
    /// otherwise nothing is applied and the error carries the count.
    pub fn apply_remote_patch(
        base: &BibDatabase,
        local: &mut BibDatabase,
        remote: &BibDatabase,
        config: &ScanConfig,
    ) -> Result<(), MergeError> {
        let conflicts = ConflictDetector::detect(base, local, remote, config);
        if !conflicts.is_empty() {
            return Err(MergeError::ConflictsPresent {
                count: conflicts.len(),
            });
        }
        let plan = Self::extract_plan(base, local, remote, config);
        Self::apply_plan(local, &plan)
    }

    /// Full three-way merge: detect, then either apply cleanly or surface
    /// the conflicts untouched.
    pub fn merge(
        base: &BibDatabase,
        local: &mut BibDatabase,
        remote: &BibDatabase,
        config: &ScanConfig,
    ) -> Result<MergeResult, MergeError> {
        info!("attempting three-way merge");
        let conflicts = ConflictDetector::detect(base, local, remote, config);
        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "merge blocked by conflicts");
            return Ok(MergeResult::Conflicts(conflicts));
        }
        let plan = Self::extract_plan(base, local, remote, config);
        Self::apply_plan(local, &plan)?;
        info!("merge applied cleanly");
        Ok(MergeResult::Clean { plan })
    }

    /// Merge three revision blobs supplied by the version-control
    /// collaborator, parsing each through the Parser collaborator.
    ///
    /// Returns the merge outcome together with the (possibly merged) local
    /// snapshot.
    pub fn merge_blobs(
        loader: &dyn DatabaseLoader,
        base: &[u8],
        local: &[u8],
        remote: &[u8],
        config: &ScanConfig,
    ) -> Result<(MergeResult, BibDatabase), MergeError> {
        let base_db = loader
            .parse(base)
            .map_err(|source| MergeError::RevisionLoad {
                revision: "base",
                source,
            })?;
        let mut local_db = loader
            .parse(local)
            .map_err(|source| MergeError::RevisionLoad {
                revision: "local",
                source,
            })?;
        let remote_db = loader
            .parse(remote)
            .map_err(|source| MergeError::RevisionLoad {
                revision: "remote",
                source,
            })?;

        let result = Self::merge(&base_db, &mut local_db, &remote_db, config)?;
        Ok((result, local_db))
    }
}

/// The per-entry patch: every field remote changed and local did not.
fn build_patch(base: Option<&Entry>, local: &Entry, remote: &Entry) -> FieldPatch {
    let mut patch = FieldPatch::default();

    let mut names: BTreeSet<FieldName> = BTreeSet::new();
    if let Some(b) = base {
        names.extend(b.fields().map(|(name, _)| name.clone()));
    }
    names.extend(remote.fields().map(|(name, _)| name.clone()));

    for name in names {
        let b = base.and_then(|e| e.field(name.as_str()));
        let l = local.field(name.as_str());
        let r = remote.field(name.as_str());

        let local_changed = !opt_equal(b, l);
        let remote_changed = !opt_equal(b, r);
        if remote_changed && !local_changed && !opt_equal(l, r) {
            patch.fields.insert(name, r.map(str::to_owned));
        }
    }

    if let Some(b) = base {
        let local_type_kept = b.entry_type() == local.entry_type();
        if local_type_kept
            && b.entry_type() != remote.entry_type()
            && local.entry_type() != remote.entry_type()
        {
            patch.entry_type = Some(remote.entry_type().to_owned());
        }

        let local_key_kept = b.citation_key() == local.citation_key();
        if local_key_kept
            && b.citation_key() != remote.citation_key()
            && local.citation_key() != remote.citation_key()
        {
            patch.citation_key = Some(remote.citation_key().map(str::to_owned));
        }
    }

    patch
}

fn opt_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => values_equal(x, y),
        _ => false,
    }
}
