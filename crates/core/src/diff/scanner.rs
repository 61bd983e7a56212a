//! Snapshot scanner: compare two database snapshots and produce changes.
//!
//! Entries are matched across the snapshots by stable identity first, then
//! by citation key, and finally by content similarity; matching is strictly
//! one-to-one, so duplicated records are never collapsed. Auxiliary records
//! (string table, preamble, metadata, group tree) are compared wholesale.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::compare::{self, EntryRelationship};
use crate::config::ScanConfig;
use crate::diff::change::Change;
use crate::model::{BibDatabase, EntryId};

// ---------------------------------------------------------------------------
// Entry matching
// ---------------------------------------------------------------------------

/// The result of pairing entries across two snapshots.
#[derive(Debug, Default)]
pub(crate) struct EntryMatching {
    /// Matched (old index, new index) pairs, ordered by old index.
    pub pairs: Vec<(usize, usize)>,
    /// Old-snapshot indexes with no counterpart, in snapshot order.
    pub unmatched_old: Vec<usize>,
    /// New-snapshot indexes with no counterpart, in snapshot order.
    pub unmatched_new: Vec<usize>,
}

/// Pair entries across two snapshots by the identity rule.
///
/// Passes, each consuming its matches so later passes cannot steal them:
/// 1. stable id equality;
/// 2. citation-key equality (first unused candidate in snapshot order; an
///    ambiguous key is resolved deterministically and logged, never fails);
/// 3. exact content equality;
/// 4. best-scoring content match among candidates relating as equal,
///    subset, or superset with similarity at or above the threshold.
pub(crate) fn match_entries(
    old: &BibDatabase,
    new: &BibDatabase,
    config: &ScanConfig,
) -> EntryMatching {
    let old_entries = old.entries();
    let new_entries = new.entries();

    let mut used_new = vec![false; new_entries.len()];
    let mut pair_of_old: Vec<Option<usize>> = vec![None; old_entries.len()];

    // Pass 1: stable id.
    let ids_in_new: HashMap<EntryId, usize> = new_entries
        .iter()
        .enumerate()
        .map(|(j, e)| (e.id(), j))
        .collect();
    for (i, old_entry) in old_entries.iter().enumerate() {
        if let Some(&j) = ids_in_new.get(&old_entry.id()) {
            pair_of_old[i] = Some(j);
            used_new[j] = true;
        }
    }

    // Pass 2: citation key.
    for (i, old_entry) in old_entries.iter().enumerate() {
        if pair_of_old[i].is_some() {
            continue;
        }
        let Some(key) = old_entry.citation_key() else {
            continue;
        };
        let mut candidates = new_entries
            .iter()
            .enumerate()
            .filter(|(j, e)| !used_new[*j] && e.citation_key() == Some(key));
        if let Some((j, _)) = candidates.next() {
            if candidates.next().is_some() {
                debug!(key, "ambiguous citation key, matching first candidate");
            }
            pair_of_old[i] = Some(j);
            used_new[j] = true;
        }
    }

    // Pass 3: exact content. Runs over all entries before the near-match
    // pass so an exact match cannot be stolen by an earlier near match.
    for (i, old_entry) in old_entries.iter().enumerate() {
        if pair_of_old[i].is_some() {
            continue;
        }
        let exact = new_entries
            .iter()
            .enumerate()
            .find(|(j, e)| !used_new[*j] && *e == old_entry);
        if let Some((j, _)) = exact {
            pair_of_old[i] = Some(j);
            used_new[j] = true;
        }
    }

    // Pass 4: best near match above the threshold.
    for (i, old_entry) in old_entries.iter().enumerate() {
        if pair_of_old[i].is_some() {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for (j, new_entry) in new_entries.iter().enumerate() {
            if used_new[j] {
                continue;
            }
            let relationship = compare::compare(old_entry, new_entry);
            if !matches!(
                relationship,
                EntryRelationship::Equal
                    | EntryRelationship::Subset
                    | EntryRelationship::Superset
            ) {
                continue;
            }
            let score = compare::similarity(old_entry, new_entry);
            if score >= config.match_threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((j, score));
            }
        }
        if let Some((j, score)) = best {
            debug!(entry = %old_entry, score, "low-confidence content match");
            pair_of_old[i] = Some(j);
            used_new[j] = true;
        }
    }

    let mut matching = EntryMatching::default();
    for (i, pair) in pair_of_old.iter().enumerate() {
        match pair {
            Some(j) => matching.pairs.push((i, *j)),
            None => matching.unmatched_old.push(i),
        }
    }
    matching.unmatched_new = (0..new_entries.len()).filter(|&j| !used_new[j]).collect();
    matching
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Stateless scanner comparing two full snapshots.
pub struct SnapshotScanner;

impl SnapshotScanner {
    /// Compare two snapshots and return every difference as a typed change.
    ///
    /// Emission order is fixed for reproducible resolution and tests:
    /// string-table changes (name-sorted), preamble, metadata, group tree,
    /// then entries -- modified and removed in old-snapshot order, added in
    /// new-snapshot order.
    pub fn scan(old: &BibDatabase, new: &BibDatabase, config: &ScanConfig) -> Vec<Change> {
        info!(
            old_entries = old.entry_count(),
            new_entries = new.entry_count(),
            "scanning snapshots"
        );

        let mut changes = Vec::new();
        scan_strings(old, new, &mut changes);
        scan_preamble(old, new, &mut changes);
        scan_metadata(old, new, &mut changes);
        scan_groups(old, new, &mut changes);
        scan_entries(old, new, config, &mut changes);

        info!(count = changes.len(), "scan complete");
        changes
    }
}

fn scan_entries(
    old: &BibDatabase,
    new: &BibDatabase,
    config: &ScanConfig,
    changes: &mut Vec<Change>,
) {
    let matching = match_entries(old, new, config);

    for &(i, j) in &matching.pairs {
        let old_entry = &old.entries()[i];
        let new_entry = &new.entries()[j];
        if old_entry != new_entry {
            changes.push(Change::EntryChanged {
                old: old_entry.clone(),
                new: new_entry.clone(),
            });
        }
    }
    for &i in &matching.unmatched_old {
        changes.push(Change::EntryRemoved {
            entry: old.entries()[i].clone(),
        });
    }
    for &j in &matching.unmatched_new {
        changes.push(Change::EntryAdded {
            entry: new.entries()[j].clone(),
        });
    }
}

fn scan_strings(old: &BibDatabase, new: &BibDatabase, changes: &mut Vec<Change>) {
    let mut removed: Vec<(&String, &String)> = Vec::new();

    // Name-first matching; map iteration keeps everything name-sorted.
    for (name, value) in old.strings() {
        match new.string(name) {
            Some(new_value) if new_value == value => {}
            Some(new_value) => changes.push(Change::StringChanged {
                name: name.clone(),
                old: value.clone(),
                new: new_value.to_owned(),
            }),
            None => removed.push((name, value)),
        }
    }

    let mut added: Vec<(&String, &String)> = new
        .strings()
        .iter()
        .filter(|(name, _)| old.string(name).is_none())
        .collect();

    // Rename pass: an old-only name whose value survives under a new-only
    // name is a rename, not a remove plus an add.
    let mut still_removed = Vec::new();
    for (old_name, value) in removed {
        let position = added.iter().position(|(_, v)| *v == value);
        match position {
            Some(index) => {
                let (new_name, _) = added.remove(index);
                changes.push(Change::StringRenamed {
                    old_name: old_name.clone(),
                    new_name: new_name.clone(),
                    value: value.clone(),
                });
            }
            None => still_removed.push((old_name, value)),
        }
    }

    for (name, value) in still_removed {
        changes.push(Change::StringRemoved {
            name: name.clone(),
            value: value.clone(),
        });
    }
    for (name, value) in added {
        changes.push(Change::StringAdded {
            name: name.clone(),
            value: value.clone(),
        });
    }
}

fn scan_preamble(old: &BibDatabase, new: &BibDatabase, changes: &mut Vec<Change>) {
    let equal = match (old.preamble(), new.preamble()) {
        (None, None) => true,
        (Some(a), Some(b)) => compare::values_equal(a, b),
        _ => false,
    };
    if !equal {
        changes.push(Change::PreambleChanged {
            old: old.preamble().map(str::to_owned),
            new: new.preamble().map(str::to_owned),
        });
    }
}

fn scan_metadata(old: &BibDatabase, new: &BibDatabase, changes: &mut Vec<Change>) {
    if old.metadata() != new.metadata() {
        changes.push(Change::MetadataChanged {
            old: old.metadata().clone(),
            new: new.metadata().clone(),
        });
    }
}

fn scan_groups(old: &BibDatabase, new: &BibDatabase, changes: &mut Vec<Change>) {
    if old.groups() != new.groups() {
        changes.push(Change::GroupTreeChanged {
            old: old.groups().cloned(),
            new: new.groups().cloned(),
        });
    }
}
