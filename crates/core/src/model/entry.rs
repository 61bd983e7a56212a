//! A single bibliographic record and its identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The stable logical identity of an entry.
///
/// Minted exactly once when the entry is created and carried through every
/// clone, so "the same entry" can be recognized across snapshots even after
/// its citation key or every one of its fields was edited. Two independent
/// parses of the same file produce distinct ids; id-based matching therefore
/// only links snapshots with a common in-memory lineage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Mint a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// A field name, compared and ordered case-insensitively.
///
/// Normalized to lowercase on construction; the map ordering over these is
/// what makes field iteration deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldName(String);

impl FieldName {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single bibliographic record: a type tag plus an ordered field map.
///
/// Invariants: field names are unique within an entry, and a field is either
/// absent or holds exactly one non-empty value. Setting a field to an empty
/// (or whitespace-only) value removes it; an unset field and an "empty"
/// field cannot be told apart.
///
/// Equality is semantic: type tag, citation key, and field values (modulo
/// line endings). The stable [`EntryId`] is excluded on purpose; identity
/// matching is a separate concern from content equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    id: EntryId,
    entry_type: String,
    citation_key: Option<String>,
    fields: BTreeMap<FieldName, String>,
}

impl Entry {
    /// Create an empty entry of the given type with a fresh identity.
    pub fn new(entry_type: &str) -> Self {
        Self {
            id: EntryId::new(),
            entry_type: entry_type.trim().to_lowercase(),
            citation_key: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create an entry with a citation key.
    pub fn with_key(entry_type: &str, citation_key: &str) -> Self {
        let mut entry = Self::new(entry_type);
        entry.set_citation_key(Some(citation_key));
        entry
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The type tag (`article`, `book`, ...), always lowercase.
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    pub fn set_entry_type(&mut self, entry_type: &str) {
        self.entry_type = entry_type.trim().to_lowercase();
    }

    pub fn citation_key(&self) -> Option<&str> {
        self.citation_key.as_deref()
    }

    /// Set or clear the citation key. An empty key clears it.
    pub fn set_citation_key(&mut self, key: Option<&str>) {
        self.citation_key = key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned);
    }

    /// Look up a field value by (case-insensitive) name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&FieldName::new(name)).map(String::as_str)
    }

    /// Set a field. An empty value removes the field instead.
    pub fn set_field(&mut self, name: &str, value: &str) {
        let name = FieldName::new(name);
        if value.trim().is_empty() {
            self.fields.remove(&name);
        } else {
            self.fields.insert(name, value.to_owned());
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(&FieldName::new(name))
    }

    /// Iterate fields in deterministic (name-sorted) order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldName, &str)> {
        self.fields.iter().map(|(name, value)| (name, value.as_str()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Overwrite this entry's contents (type, key, fields) from `source`,
    /// keeping the stable identity.
    pub fn assign(&mut self, source: &Entry) {
        self.entry_type = source.entry_type.clone();
        self.citation_key = source.citation_key.clone();
        self.fields = source.fields.clone();
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        if self.entry_type != other.entry_type
            || self.citation_key != other.citation_key
            || self.fields.len() != other.fields.len()
        {
            return false;
        }
        self.fields.iter().all(|(name, value)| {
            other
                .fields
                .get(name)
                .is_some_and(|o| crate::compare::values_equal(value, o))
        })
    }
}

impl Eq for Entry {}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.citation_key {
            Some(key) => write!(f, "{} '{}'", self.entry_type, key),
            None => write!(f, "{} <no key>", self.entry_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_case_insensitive() {
        let mut entry = Entry::new("Article");
        entry.set_field("Author", "Smith");

        assert_eq!(entry.entry_type(), "article");
        assert_eq!(entry.field("author"), Some("Smith"));
        assert_eq!(entry.field("AUTHOR"), Some("Smith"));

        entry.set_field("AUTHOR", "Jones");
        assert_eq!(entry.field_count(), 1);
        assert_eq!(entry.field("author"), Some("Jones"));
    }

    #[test]
    fn test_empty_value_removes_field() {
        let mut entry = Entry::new("article");
        entry.set_field("note", "n");
        entry.set_field("note", "");
        assert_eq!(entry.field("note"), None);
        assert_eq!(entry.field_count(), 0);
    }

    #[test]
    fn test_empty_citation_key_clears() {
        let mut entry = Entry::with_key("article", "smith2020");
        assert_eq!(entry.citation_key(), Some("smith2020"));
        entry.set_citation_key(Some("  "));
        assert_eq!(entry.citation_key(), None);
    }

    #[test]
    fn test_equality_ignores_id() {
        let mut a = Entry::with_key("article", "k");
        a.set_field("title", "X");
        let mut b = Entry::with_key("article", "k");
        b.set_field("title", "X");

        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_tolerates_line_endings() {
        let mut a = Entry::new("article");
        a.set_field("comment", "one\ntwo");
        let mut b = Entry::new("article");
        b.set_field("comment", "one\r\ntwo");
        assert_eq!(a, b);
    }

    #[test]
    fn test_clone_preserves_id() {
        let entry = Entry::with_key("book", "k");
        assert_eq!(entry.clone().id(), entry.id());
    }

    #[test]
    fn test_assign_keeps_id() {
        let mut target = Entry::with_key("article", "old");
        target.set_field("title", "Old");
        let id = target.id();

        let mut source = Entry::with_key("book", "new");
        source.set_field("year", "2021");

        target.assign(&source);
        assert_eq!(target.id(), id);
        assert_eq!(target.entry_type(), "book");
        assert_eq!(target.citation_key(), Some("new"));
        assert_eq!(target.field("year"), Some("2021"));
        assert_eq!(target.field("title"), None);
    }
}
