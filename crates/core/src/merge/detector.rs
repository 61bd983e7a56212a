//! Three-way semantic conflict detection.
//!
//! Given base, local, and remote snapshots, finds the logical entries whose
//! edits cannot be reconciled automatically: a field changed on both sides
//! to different values, an entry deleted on one side and modified on the
//! other, or the same entry added on both sides with diverging content.
//!
//! Citation-key renames never conflict, even when both sides renamed
//! differently -- the key is presentation, not content. The entry type is
//! treated as a pseudo-field: one-sided changes merge, two-sided divergent
//! changes conflict.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compare::{self, values_equal, EntryRelationship};
use crate::config::ScanConfig;
use crate::diff::match_entries;
use crate::model::{BibDatabase, Entry, FieldName};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One logical entry that diverged incompatibly between local and remote.
///
/// Carries all three versions (absent where the side deleted or never had
/// the entry) so a resolution UI can present the full picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConflict {
    pub base: Option<Entry>,
    pub local: Option<Entry>,
    pub remote: Option<Entry>,
    /// Fields whose values diverged.
    pub fields: Vec<FieldName>,
    /// The entry type is part of the divergence.
    pub entry_type_conflict: bool,
}

impl EntryConflict {
    /// The citation key naming this conflict, from whichever side has one.
    pub fn citation_key(&self) -> Option<&str> {
        [&self.local, &self.remote, &self.base]
            .into_iter()
            .flatten()
            .find_map(Entry::citation_key)
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Stateless three-way conflict detector.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Find every entry with divergent, non-reconcilable edits.
    ///
    /// Counterparts are located with the scanner's identity rule (stable id,
    /// citation key, content), so a key rename on either side still links
    /// the entry to its base version. Entries added independently on both
    /// sides are paired by citation key alone.
    pub fn detect(
        base: &BibDatabase,
        local: &BibDatabase,
        remote: &BibDatabase,
        config: &ScanConfig,
    ) -> Vec<EntryConflict> {
        info!(
            base_entries = base.entry_count(),
            local_entries = local.entry_count(),
            remote_entries = remote.entry_count(),
            "detecting three-way conflicts"
        );

        let base_to_local = match_entries(base, local, config);
        let base_to_remote = match_entries(base, remote, config);
        let local_of_base: HashMap<usize, usize> = base_to_local.pairs.iter().copied().collect();
        let remote_of_base: HashMap<usize, usize> = base_to_remote.pairs.iter().copied().collect();

        let mut conflicts = Vec::new();

        for (i, base_entry) in base.entries().iter().enumerate() {
            let local_entry = local_of_base.get(&i).map(|&j| &local.entries()[j]);
            let remote_entry = remote_of_base.get(&i).map(|&j| &remote.entries()[j]);

            match (local_entry, remote_entry) {
                (Some(l), Some(r)) => {
                    let (fields, type_conflict) = field_conflicts(Some(base_entry), l, r);
                    if !fields.is_empty() || type_conflict {
                        debug!(entry = %base_entry, "field-level conflict");
                        conflicts.push(EntryConflict {
                            base: Some(base_entry.clone()),
                            local: Some(l.clone()),
                            remote: Some(r.clone()),
                            fields,
                            entry_type_conflict: type_conflict,
                        });
                    }
                }
                // Deleted on one side: a conflict only if the surviving side
                // modified the content (key renames don't count).
                (None, Some(r)) => {
                    if modified_content(base_entry, r) {
                        debug!(entry = %base_entry, "delete/modify conflict (deleted locally)");
                        conflicts.push(EntryConflict {
                            base: Some(base_entry.clone()),
                            local: None,
                            remote: Some(r.clone()),
                            fields: changed_fields(base_entry, r),
                            entry_type_conflict: base_entry.entry_type() != r.entry_type(),
                        });
                    }
                }
                (Some(l), None) => {
                    if modified_content(base_entry, l) {
                        debug!(entry = %base_entry, "delete/modify conflict (deleted remotely)");
                        conflicts.push(EntryConflict {
                            base: Some(base_entry.clone()),
                            local: Some(l.clone()),
                            remote: None,
                            fields: changed_fields(base_entry, l),
                            entry_type_conflict: base_entry.entry_type() != l.entry_type(),
                        });
                    }
                }
                // Deleted on both sides: agreement.
                (None, None) => {}
            }
        }

        // Entries added on both sides under the same citation key.
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
                let remote_entry = &remote.entries()[rj];
                let (fields, type_conflict) = field_conflicts(None, local_entry, remote_entry);
                if !fields.is_empty() || type_conflict {
                    debug!(key, "add/add conflict");
                    conflicts.push(EntryConflict {
                        base: None,
                        local: Some(local_entry.clone()),
                        remote: Some(remote_entry.clone()),
                        fields,
                        entry_type_conflict: type_conflict,
                    });
                }
            }
        }

        info!(count = conflicts.len(), "conflict detection complete");
        conflicts
    }
}

// ---------------------------------------------------------------------------
// Field-level analysis
// ---------------------------------------------------------------------------

fn opt_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => values_equal(x, y),
        _ => false,
    }
}

fn united_field_names(entries: &[Option<&Entry>]) -> BTreeSet<FieldName> {
    let mut names = BTreeSet::new();
    for entry in entries.iter().flatten() {
        names.extend(entry.fields().map(|(name, _)| name.clone()));
    }
    names
}

/// Fields both sides changed relative to base with diverging results, plus
/// whether the entry type diverged the same way. With no base (both sides
/// added the entry), every present field counts as changed.
pub(crate) fn field_conflicts(
    base: Option<&Entry>,
    local: &Entry,
    remote: &Entry,
) -> (Vec<FieldName>, bool) {
    let mut conflicting = Vec::new();

    for name in united_field_names(&[base, Some(local), Some(remote)]) {
        let b = base.and_then(|e| e.field(name.as_str()));
        let l = local.field(name.as_str());
        let r = remote.field(name.as_str());

        let local_changed = !opt_equal(b, l);
        let remote_changed = !opt_equal(b, r);
        if local_changed && remote_changed && !opt_equal(l, r) {
            conflicting.push(name);
        }
    }

    let base_type = base.map(Entry::entry_type);
    let local_changed = base_type != Some(local.entry_type());
    let remote_changed = base_type != Some(remote.entry_type());
    let type_conflict =
        local_changed && remote_changed && local.entry_type() != remote.entry_type();

    (conflicting, type_conflict)
}

/// Whether `current` modified `base`'s content. Key renames are tolerated;
/// type and field changes count.
pub(crate) fn modified_content(base: &Entry, current: &Entry) -> bool {
    base.entry_type() != current.entry_type()
        || compare::compare(base, current) != EntryRelationship::Equal
}

/// Fields whose values differ between two versions.
fn changed_fields(a: &Entry, b: &Entry) -> Vec<FieldName> {
    united_field_names(&[Some(a), Some(b)])
        .into_iter()
        .filter(|name| !opt_equal(a.field(name.as_str()), b.field(name.as_str())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, fields: &[(&str, &str)]) -> Entry {
        let mut e = Entry::with_key("article", key);
        for (name, value) in fields {
            e.set_field(name, value);
        }
        e
    }

    fn db(entries: Vec<Entry>) -> BibDatabase {
        let mut db = BibDatabase::new();
        for e in entries {
            db.insert_entry(e);
        }
        db
    }

    fn detect(base: &BibDatabase, local: &BibDatabase, remote: &BibDatabase) -> Vec<EntryConflict> {
        ConflictDetector::detect(base, local, remote, &ScanConfig::default())
    }

    #[test]
    fn test_all_empty_no_conflict() {
        let empty = db(vec![]);
        assert!(detect(&empty, &db(vec![]), &db(vec![])).is_empty());
    }

    #[test]
    fn test_added_one_side_only_never_conflicts() {
        let empty = db(vec![]);
        let with_a = db(vec![entry("a", &[("author", "remote")])]);
        assert!(detect(&empty, &db(vec![]), &with_a).is_empty());
        assert!(detect(&empty, &with_a.clone(), &db(vec![])).is_empty());
    }

    #[test]
    fn test_added_both_sides_identical_no_conflict() {
        let empty = db(vec![]);
        let local = db(vec![entry("a", &[("author", "same")])]);
        let remote = db(vec![entry("a", &[("author", "same")])]);
        assert!(detect(&empty, &local, &remote).is_empty());
    }

    #[test]
    fn test_added_both_sides_different_fields_no_conflict() {
        let empty = db(vec![]);
        let local = db(vec![entry("a", &[("author", "local")])]);
        let remote = db(vec![entry("a", &[("journal", "Remote Journal")])]);
        assert!(detect(&empty, &local, &remote).is_empty());
    }

    #[test]
    fn test_added_both_sides_conflicting_value() {
        let empty = db(vec![]);
        let local = db(vec![entry("a", &[("author", "local")])]);
        let remote = db(vec![entry("a", &[("author", "remote")])]);

        let conflicts = detect(&empty, &local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].fields, vec![FieldName::new("author")]);
        assert!(conflicts[0].base.is_none());
    }

    #[test]
    fn test_added_both_sides_distinct_keys_both_survive() {
        // Independent additions with different identities are never
        // conflicts, even with identical content.
        let empty = db(vec![]);
        let local = db(vec![entry("a", &[("title", "T")])]);
        let remote = db(vec![entry("b", &[("title", "T")])]);
        assert!(detect(&empty, &local, &remote).is_empty());
    }

    #[test]
    fn test_deleted_both_sides_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        assert!(detect(&base, &db(vec![]), &db(vec![])).is_empty());
    }

    #[test]
    fn test_delete_vs_unchanged_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let kept = db(vec![entry("a", &[("author", "base")])]);
        assert!(detect(&base, &db(vec![]), &kept).is_empty());
        assert!(detect(&base, &kept.clone(), &db(vec![])).is_empty());
    }

    #[test]
    fn test_delete_vs_modify_conflicts() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let modified = db(vec![entry("a", &[("author", "edited")])]);

        let conflicts = detect(&base, &db(vec![]), &modified);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].local.is_none());

        let conflicts = detect(&base, &modified.clone(), &db(vec![]));
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].remote.is_none());
    }

    #[test]
    fn test_same_field_same_value_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let local = db(vec![entry("a", &[("author", "common")])]);
        let remote = db(vec![entry("a", &[("author", "common")])]);
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_same_field_different_values_conflict() {
        let base = db(vec![entry("a", &[("author", "Smith")])]);
        let local = db(vec![entry("a", &[("author", "Smith"), ("year", "2021")])]);
        let remote = db(vec![entry("a", &[("author", "Jones")])]);

        let conflicts = detect(&base, &local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].fields, vec![FieldName::new("author")]);
        assert_eq!(conflicts[0].citation_key(), Some("a"));
    }

    #[test]
    fn test_different_fields_changed_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base"), ("title", "A")])]);
        let local = db(vec![entry("a", &[("author", "local"), ("title", "A")])]);
        let remote = db(vec![entry("a", &[("author", "base"), ("title", "B")])]);
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_one_sided_change_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base"), ("title", "A")])]);
        let local = base.clone();
        let remote = db(vec![entry("a", &[("author", "remote"), ("title", "A")])]);
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_field_removed_one_side_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let local = db(vec![entry("a", &[])]);
        let remote = base.clone();
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_field_removed_vs_edited_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let local = db(vec![entry("a", &[])]);
        let remote = db(vec![entry("a", &[("author", "remote")])]);

        let conflicts = detect(&base, &local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].fields, vec![FieldName::new("author")]);
    }

    #[test]
    fn test_key_renamed_one_side_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let local = db(vec![entry("b", &[("author", "base")])]);
        let remote = base.clone();
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_key_renamed_both_sides_differently_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let local = db(vec![entry("b", &[("author", "base")])]);
        let remote = db(vec![entry("c", &[("author", "base")])]);
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_type_changed_one_side_no_conflict() {
        let base = db(vec![entry("a", &[("author", "base")])]);
        let mut changed = entry("a", &[("author", "base")]);
        changed.set_entry_type("book");
        let local = db(vec![changed]);
        let remote = base.clone();
        assert!(detect(&base, &local, &remote).is_empty());
    }

    #[test]
    fn test_type_changed_both_sides_differently_conflicts() {
        let empty = db(vec![]);
        let mut l = entry("a", &[("author", "base")]);
        l.set_entry_type("book");
        let mut r = entry("a", &[("author", "base")]);
        r.set_entry_type("inproceedings");

        let conflicts = detect(&empty, &db(vec![l]), &db(vec![r]));
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].entry_type_conflict);
        assert!(conflicts[0].fields.is_empty());
    }

    #[test]
    fn test_line_ending_only_divergence_no_conflict() {
        let base = db(vec![entry("a", &[("comment", "l1\n\nl3")])]);
        let local = db(vec![entry("a", &[("comment", "l1\r\n\r\nl3")])]);
        let remote = base.clone();
        assert!(detect(&base, &local, &remote).is_empty());
    }
}
