//! Core library for HTML notes.
//!
//! Each note is an HTML file whose first line may carry a hidden metadata
//! comment. This crate turns that raw text into structured state:
//!
//! - the metadata comment (versions, tags, attachments, charset, app
//!   version), read and written by the [`comment_codec`],
//! - checkbox tasks found in the body, kept stable across edits by the
//!   [`task`] engine,
//! - the directed graph of links between notes, kept symmetric by the
//!   [`link`] engine.
//!
//! [`notebook::Notebook`] ties these together for one session and reports
//! every change as a typed [`events::NoteEvent`]. Reading files, writing
//! files and watching the file system stay with the host.
#![warn(missing_docs)]

/// Metadata comment encoding
pub mod comment_codec;

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Change events and subscriptions
pub mod events;

/// Note links
pub mod link;

/// Note metadata
pub mod metadata;

/// Note identity and state
pub mod note;

/// Session service
pub mod notebook;

/// Stored note access
pub mod source;

/// Tag directory
pub mod tags;

/// Checkbox tasks
pub mod task;
