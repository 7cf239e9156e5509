//! Access to stored note content.
//!
//! Reading and writing note files is the caller's business; the core only
//! needs to read a note's raw text and to search note texts. [`NoteSource`]
//! abstracts that, and [`InMemoryNoteSource`] implements it over a map
//! (useful for tests and for hosts that keep notes in memory).

use std::collections::BTreeMap;
use std::io::{Error, ErrorKind, Result};
use std::sync::{Arc, RwLock};

use crate::note::NoteId;

/// Stored note texts, including the metadata line.
pub trait NoteSource {
    /// Raw file text of a note
    fn read_note(&self, id: &NoteId) -> Result<String>;

    /// All stored notes
    fn list_notes(&self) -> Result<Vec<NoteId>>;

    /// Notes whose raw text contains `text`
    fn find_notes_containing(&self, text: &str) -> Result<Vec<NoteId>> {
        let mut found = Vec::new();
        for id in self.list_notes()? {
            if self.read_note(&id)?.contains(text) {
                found.push(id);
            }
        }
        Ok(found)
    }
}

impl<T: NoteSource + ?Sized> NoteSource for &T {
    fn read_note(&self, id: &NoteId) -> Result<String> {
        (**self).read_note(id)
    }

    fn list_notes(&self) -> Result<Vec<NoteId>> {
        (**self).list_notes()
    }

    fn find_notes_containing(&self, text: &str) -> Result<Vec<NoteId>> {
        (**self).find_notes_containing(text)
    }
}

/// Note texts kept in memory.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNoteSource {
    notes: Arc<RwLock<BTreeMap<NoteId, String>>>,
}

impl InMemoryNoteSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a note (builder pattern)
    pub fn with_note(self, id: NoteId, text: &str) -> Self {
        self.write_note(id, text);
        self
    }

    /// Store or replace a note's text
    pub fn write_note(&self, id: NoteId, text: &str) {
        self.notes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, text.to_string());
    }

    /// Remove a note, returning its text
    pub fn remove_note(&self, id: &NoteId) -> Option<String> {
        self.notes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }
}

impl NoteSource for InMemoryNoteSource {
    fn read_note(&self, id: &NoteId) -> Result<String> {
        self.notes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("Note not found: {}", id)))
    }

    fn list_notes(&self) -> Result<Vec<NoteId>> {
        Ok(self
            .notes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_list() {
        let source = InMemoryNoteSource::new()
            .with_note(NoteId::new("", "a"), "alpha")
            .with_note(NoteId::new("G", "b"), "beta");

        assert_eq!(source.read_note(&NoteId::new("", "a")).unwrap(), "alpha");
        assert_eq!(source.list_notes().unwrap().len(), 2);
        assert_eq!(
            source
                .read_note(&NoteId::new("", "missing"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_find_notes_containing() {
        let source = InMemoryNoteSource::new()
            .with_note(NoteId::new("", "a"), "links to [G] b.htm")
            .with_note(NoteId::new("G", "b"), "nothing");

        assert_eq!(
            source.find_notes_containing("[G] b.htm").unwrap(),
            vec![NoteId::new("", "a")]
        );
    }

    #[test]
    fn test_clones_share_storage() {
        let source = InMemoryNoteSource::new();
        let clone = source.clone();
        clone.write_note(NoteId::new("", "a"), "x");
        assert_eq!(source.read_note(&NoteId::new("", "a")).unwrap(), "x");
        assert_eq!(source.remove_note(&NoteId::new("", "a")).as_deref(), Some("x"));
        assert!(clone.list_notes().unwrap().is_empty());
    }
}
