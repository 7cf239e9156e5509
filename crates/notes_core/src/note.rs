//! Note identity and in-memory note state.
//!
//! A note is identified by its group and name. On disk it is stored as
//! `"[group] name.htm"`, or `"name.htm"` when it belongs to no group.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::NoteMetadata;

/// Identity of a note: (group, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId {
    /// Group the note belongs to; empty for ungrouped notes
    pub group: String,
    /// Note name
    pub name: String,
}

impl NoteId {
    /// Create a note identity
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// File name of the note for the given extension (without dot).
    ///
    /// ```
    /// use notes_core::note::NoteId;
    ///
    /// assert_eq!(NoteId::new("Work", "Plan").file_name("htm"), "[Work] Plan.htm");
    /// assert_eq!(NoteId::new("", "Inbox").file_name("htm"), "Inbox.htm");
    /// ```
    pub fn file_name(&self, extension: &str) -> String {
        if self.group.is_empty() {
            format!("{}.{}", self.name, extension)
        } else {
            format!("[{}] {}.{}", self.group, self.name, extension)
        }
    }

    /// Parse a file name produced by [`NoteId::file_name`].
    ///
    /// Returns `None` when the extension does not match.
    pub fn from_file_name(file_name: &str, extension: &str) -> Option<Self> {
        let stem = file_name
            .strip_suffix(extension)?
            .strip_suffix('.')?;

        if let Some(rest) = stem.strip_prefix('[')
            && let Some((group, name)) = rest.split_once("] ")
            && !name.is_empty()
        {
            return Some(Self::new(group, name));
        }

        (!stem.is_empty()).then(|| Self::new("", stem))
    }

    /// Same note name in another group
    pub fn with_group(&self, group: impl Into<String>) -> Self {
        Self::new(group, self.name.clone())
    }

    /// Same group with another name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(self.group.clone(), name)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "[{}] {}", self.group, self.name)
        }
    }
}

/// A note: its body as stored on disk, the body being edited and its metadata.
#[derive(Debug, Clone)]
pub struct Note {
    id: NoteId,
    file_content: String,
    editor_content: Option<String>,
    metadata: NoteMetadata,
    dirty: bool,
}

impl Note {
    /// Note with a stored body and its metadata
    pub fn new(id: NoteId, file_content: String, metadata: NoteMetadata) -> Self {
        Self {
            id,
            file_content,
            editor_content: None,
            metadata,
            dirty: false,
        }
    }

    /// Identity
    pub fn id(&self) -> &NoteId {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: NoteId) {
        self.id = id;
    }

    /// Body as last read from or written to disk
    pub fn file_content(&self) -> &str {
        &self.file_content
    }

    /// Body in the editor, if it was edited since loading
    pub fn editor_content(&self) -> Option<&str> {
        self.editor_content.as_deref()
    }

    /// Current body: the editor version if any, else the file version.
    ///
    /// Task offsets and link sets always refer to this text.
    pub fn content(&self) -> &str {
        self.editor_content.as_deref().unwrap_or(&self.file_content)
    }

    /// Replace the editor body and flag the note as changed
    pub(crate) fn set_editor_content(&mut self, content: String) {
        self.editor_content = Some(content);
        self.dirty = true;
    }

    /// Replace the stored body, e.g. after an external change on disk
    pub(crate) fn set_file_content(&mut self, content: String) {
        self.file_content = content;
    }

    /// Promote the editor body to the stored body and clear dirty flags
    pub(crate) fn mark_saved(&mut self) {
        if let Some(content) = self.editor_content.take() {
            self.file_content = content;
        }
        self.dirty = false;
        self.metadata.clear_dirty();
    }

    /// Metadata
    pub fn metadata(&self) -> &NoteMetadata {
        &self.metadata
    }

    /// Mutable metadata
    pub fn metadata_mut(&mut self) -> &mut NoteMetadata {
        &mut self.metadata
    }

    /// Whether the note body itself was changed since it was loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Note body or metadata has changes not yet written to disk
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty || self.metadata.is_dirty()
    }
}
