//! A full database snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::{Entry, EntryId};
use super::groups::GroupNode;

/// One complete database state: an ordered collection of entries plus the
/// auxiliary records (string table, preamble, metadata, group tree).
///
/// Entry ids are unique within a snapshot: inserting an entry whose id is
/// already present replaces the existing entry in place, which is what makes
/// change application idempotent.
///
/// Equality is semantic and order-insensitive for entries (two snapshots
/// holding the same records in a different order are equal); the auxiliary
/// records compare directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BibDatabase {
    entries: Vec<Entry>,
    strings: BTreeMap<String, String>,
    preamble: Option<String>,
    metadata: BTreeMap<String, String>,
    groups: Option<GroupNode>,
}

impl BibDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Entries in snapshot order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Insert an entry, replacing any existing entry with the same id.
    ///
    /// Returns the replaced entry, if any.
    pub fn insert_entry(&mut self, entry: Entry) -> Option<Entry> {
        match self.entries.iter_mut().find(|e| e.id() == entry.id()) {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    /// Remove an entry by id. Absence is not an error.
    pub fn remove_entry(&mut self, id: EntryId) -> Option<Entry> {
        self.entries
            .iter()
            .position(|e| e.id() == id)
            .map(|index| self.entries.remove(index))
    }

    pub fn entry_by_id(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn entry_by_id_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    /// First entry carrying the given citation key, in snapshot order.
    pub fn entry_by_key(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.citation_key() == Some(key))
    }

    // -----------------------------------------------------------------------
    // String table
    // -----------------------------------------------------------------------

    /// The string table: symbolic abbreviation name -> value. Names are
    /// case-sensitive and unique.
    pub fn strings(&self) -> &BTreeMap<String, String> {
        &self.strings
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    /// Set a string, returning the previous value if the name existed.
    pub fn set_string(&mut self, name: &str, value: &str) -> Option<String> {
        self.strings.insert(name.to_owned(), value.to_owned())
    }

    pub fn remove_string(&mut self, name: &str) -> Option<String> {
        self.strings.remove(name)
    }

    // -----------------------------------------------------------------------
    // Preamble
    // -----------------------------------------------------------------------

    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    /// Set or clear the preamble. An empty preamble is stored as absent.
    pub fn set_preamble(&mut self, preamble: Option<&str>) {
        self.preamble = preamble
            .filter(|p| !p.trim().is_empty())
            .map(str::to_owned);
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata_value(&mut self, key: &str, value: &str) -> Option<String> {
        self.metadata.insert(key.to_owned(), value.to_owned())
    }

    pub fn remove_metadata_value(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    /// Replace the whole metadata map.
    pub fn set_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.metadata = metadata;
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn groups(&self) -> Option<&GroupNode> {
        self.groups.as_ref()
    }

    pub fn set_groups(&mut self, groups: Option<GroupNode>) {
        self.groups = groups;
    }

    /// Canonical sort key for order-insensitive entry comparison.
    fn entry_order(entry: &Entry) -> (String, Option<String>, Vec<(String, String)>) {
        (
            entry.entry_type().to_owned(),
            entry.citation_key().map(str::to_owned),
            entry
                .fields()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        crate::compare::normalized(value).into_owned(),
                    )
                })
                .collect(),
        )
    }
}

impl PartialEq for BibDatabase {
    fn eq(&self, other: &Self) -> bool {
        if self.strings != other.strings
            || self.preamble != other.preamble
            || self.metadata != other.metadata
            || self.groups != other.groups
            || self.entries.len() != other.entries.len()
        {
            return false;
        }
        let mut left: Vec<&Entry> = self.entries.iter().collect();
        let mut right: Vec<&Entry> = other.entries.iter().collect();
        left.sort_by_key(|e| Self::entry_order(e));
        right.sort_by_key(|e| Self::entry_order(e));
        left.iter().zip(right.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for BibDatabase {}
