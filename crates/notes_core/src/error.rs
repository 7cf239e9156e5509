use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::note::NoteId;

/// Unified error type for notes_core operations
#[derive(Debug, Error)]
pub enum NotesError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read note '{id}': {source}")]
    NoteRead {
        id: NoteId,
        source: std::io::Error,
    },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Task errors
    #[error("Task offset {0} is outside the note content")]
    InvalidTaskOffset(usize),

    #[error("No checkbox marker at offset {offset}")]
    NotACheckbox { offset: usize },

    // Notebook errors
    #[error("Note not found: '{0}'")]
    NoteNotFound(NoteId),

    #[error("Note already exists: '{0}'")]
    NoteAlreadyExists(NoteId),

    #[error("Not a note file name: '{0}'")]
    InvalidFileName(String),

    #[error("Task {task} not found in note '{note}'")]
    TaskNotFound { note: NoteId, task: u64 },
}

/// Result type alias for notes_core operations
pub type Result<T> = std::result::Result<T, NotesError>;

/// A serializable representation of NotesError for a UI bridge
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&NotesError> for SerializableError {
    fn from(err: &NotesError) -> Self {
        let kind = match err {
            NotesError::Io(_) => "Io",
            NotesError::NoteRead { .. } => "NoteRead",
            NotesError::ConfigParse(_) => "ConfigParse",
            NotesError::ConfigSerialize(_) => "ConfigSerialize",
            NotesError::NoConfigDir => "NoConfigDir",
            NotesError::InvalidTaskOffset(_) => "InvalidTaskOffset",
            NotesError::NotACheckbox { .. } => "NotACheckbox",
            NotesError::NoteNotFound(_) => "NoteNotFound",
            NotesError::NoteAlreadyExists(_) => "NoteAlreadyExists",
            NotesError::InvalidFileName(_) => "InvalidFileName",
            NotesError::TaskNotFound { .. } => "TaskNotFound",
        }
        .to_string();

        let path = match err {
            NotesError::InvalidFileName(name) => Some(PathBuf::from(name)),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<NotesError> for SerializableError {
    fn from(err: NotesError) -> Self {
        SerializableError::from(&err)
    }
}

impl NotesError {
    /// Convert to a serializable representation
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
