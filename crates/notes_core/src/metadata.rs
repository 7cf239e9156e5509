//! Note metadata persisted in the first line of a note file.
//!
//! The persisted part (versions, tags, charset, app version, attachments)
//! travels through the [`CommentCodec`]. The derived part (tasks, outgoing
//! and incoming links) is rebuilt from note bodies by the task and link
//! engines and is never written to disk.
//!
//! ```text
//! <!-- versions="alice@2024-03-01 10:15:00"---tags="work/urgent"---charset="UTF-8"---appVersion="6.1" -->
//! <p>body...</p>
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::comment_codec::{CommentCodec, CommentDataHolder, Field};
use crate::note::NoteId;
use crate::tags::{TagDirectory, TagNaming, TagRef};
use crate::task::{Task, TaskId};

/// Charset assumed for notes without a charset marker
pub const LEGACY_CHARSET: &str = "ISO-8859-1";
/// Charset of notes created by this version
pub const UTF8_CHARSET: &str = "UTF-8";
/// Timestamp pattern of version entries
pub const VERSION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const VERSIONS: Field = Field::multiple("versions");
const TAGS: Field = Field::multiple("tags");
const CHARSET: Field = Field::single("charset");
const APP_VERSION: Field = Field::single("appVersion");
const ATTACHMENTS: Field = Field::multiple("attachments");

const FIELDS: &[Field] = &[VERSIONS, TAGS, CHARSET, APP_VERSION, ATTACHMENTS];

/// Decimal application version, e.g. `6.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AppVersion {
    /// Major part
    pub major: u32,
    /// Minor part
    pub minor: u32,
}

impl AppVersion {
    /// First version storing tags by external name
    pub const EXTERNAL_TAG_NAMES: AppVersion = AppVersion::new(6, 1);
    /// Version written by this library
    pub const CURRENT: AppVersion = AppVersion::new(6, 1);

    /// Create a version
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"6"` or `"6.1"`.
    pub fn parse(value: &str) -> Option<Self> {
        let (major, minor) = value.trim().split_once('.').unwrap_or((value.trim(), "0"));
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One entry of the version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Who saved the note
    pub author: String,
    /// When it was saved
    pub timestamp: NaiveDateTime,
}

impl VersionInfo {
    /// Create an entry
    pub fn new(author: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            author: author.into(),
            timestamp,
        }
    }

    /// Parse `author@timestamp`; the author may itself contain `@`.
    pub fn parse(value: &str) -> Option<Self> {
        let (author, timestamp) = value.rsplit_once('@')?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp, VERSION_TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(author, timestamp))
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.author,
            self.timestamp.format(VERSION_TIMESTAMP_FORMAT)
        )
    }
}

/// Metadata owned by one note.
#[derive(Debug, Clone, Default)]
pub struct NoteMetadata {
    versions: Vec<VersionInfo>,
    tags: IndexSet<TagRef>,
    attachments: IndexSet<String>,
    charset: Option<String>,
    app_version: Option<AppVersion>,

    linked_notes: IndexSet<NoteId>,
    linking_notes: IndexSet<NoteId>,
    tasks: IndexMap<TaskId, Task>,

    dirty: bool,
}

impl NoteMetadata {
    /// Metadata for a note created now: UTF-8, current app version.
    pub fn for_new_note() -> Self {
        Self {
            charset: Some(UTF8_CHARSET.to_string()),
            app_version: Some(AppVersion::CURRENT),
            ..Self::default()
        }
    }

    /// Decode a comment line, resolving tag names through `tags`.
    pub fn from_comment(comment: &str, codec: &CommentCodec, tags: &dyn TagDirectory) -> Self {
        let mut metadata = Self::default();
        codec.decode_into(comment, &mut metadata);
        metadata.resolve_tags(tags);
        metadata
    }

    /// Split the metadata line off a note file.
    ///
    /// Returns the metadata and the body. A first line that is not a
    /// metadata comment means the note has no metadata.
    pub fn parse_file<'a>(
        text: &'a str,
        codec: &CommentCodec,
        tags: &dyn TagDirectory,
    ) -> (Self, &'a str) {
        let (first_line, body) = match text.find('\n') {
            Some(idx) => (&text[..idx], &text[idx + 1..]),
            None => (text, ""),
        };
        let first_line = first_line.strip_suffix('\r').unwrap_or(first_line);

        if CommentCodec::is_comment_with_data(first_line) {
            (Self::from_comment(first_line, codec, tags), body)
        } else {
            (Self::default(), text)
        }
    }

    /// Encode the metadata comment line
    pub fn to_comment(&self, codec: &CommentCodec) -> String {
        codec.encode(self)
    }

    /// Write the metadata line, separator and body as one file text
    pub fn to_file(&self, body: &str, codec: &CommentCodec, line_separator: &str) -> String {
        format!("{}{}{}", self.to_comment(codec), line_separator, body)
    }

    /// Re-resolve stored tag names according to the note's app version.
    fn resolve_tags(&mut self, directory: &dyn TagDirectory) {
        if self.tags.is_empty() {
            return;
        }
        let names: Vec<String> = self
            .tags
            .iter()
            .map(|tag| tag.external_name().to_string())
            .collect();
        self.tags = directory
            .resolve_all(&names, self.tag_naming())
            .into_iter()
            .collect();
    }

    /// How the stored tag names of this note are spelled
    pub fn tag_naming(&self) -> TagNaming {
        match self.app_version {
            Some(version) if version >= AppVersion::EXTERNAL_TAG_NAMES => TagNaming::External,
            _ => TagNaming::Plain,
        }
    }

    /// Take over persisted fields from freshly parsed metadata, keeping
    /// tasks and links.
    pub(crate) fn replace_persisted(&mut self, parsed: NoteMetadata) {
        self.versions = parsed.versions;
        self.tags = parsed.tags;
        self.attachments = parsed.attachments;
        self.charset = parsed.charset;
        self.app_version = parsed.app_version;
        self.dirty = false;
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Version history, newest last
    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }

    /// Record a save; a save on the same calendar day as the newest entry
    /// replaces that entry.
    pub fn add_version(&mut self, author: &str, timestamp: NaiveDateTime) {
        let entry = VersionInfo::new(author, timestamp);
        match self.versions.last_mut() {
            Some(last) if last.timestamp.date() == timestamp.date() => *last = entry,
            _ => self.versions.push(entry),
        }
        self.dirty = true;
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Tags of the note
    pub fn tags(&self) -> &IndexSet<TagRef> {
        &self.tags
    }

    /// Add a tag; returns whether it was new
    pub fn add_tag(&mut self, tag: TagRef) -> bool {
        let added = self.tags.insert(tag);
        self.dirty |= added;
        added
    }

    /// Remove a tag; returns whether it was present
    pub fn remove_tag(&mut self, tag: &TagRef) -> bool {
        let removed = self.tags.shift_remove(tag);
        self.dirty |= removed;
        removed
    }

    // ------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------

    /// Attachment file names, relative to the attachments directory
    pub fn attachments(&self) -> &IndexSet<String> {
        &self.attachments
    }

    /// Add an attachment; returns whether it was new
    pub fn add_attachment(&mut self, name: &str) -> bool {
        let added = self.attachments.insert(name.to_string());
        self.dirty |= added;
        added
    }

    /// Remove an attachment; returns whether it was present
    pub fn remove_attachment(&mut self, name: &str) -> bool {
        let removed = self.attachments.shift_remove(name);
        self.dirty |= removed;
        removed
    }

    // ------------------------------------------------------------------
    // Charset and app version
    // ------------------------------------------------------------------

    /// Charset of the note file
    pub fn charset(&self) -> &str {
        self.charset.as_deref().unwrap_or(LEGACY_CHARSET)
    }

    /// Set the charset marker
    pub fn set_charset(&mut self, charset: &str) {
        if self.charset.as_deref() != Some(charset) {
            self.charset = Some(charset.to_string());
            self.dirty = true;
        }
    }

    /// App version that last wrote the note
    pub fn app_version(&self) -> Option<AppVersion> {
        self.app_version
    }

    /// Set the app version marker
    pub fn set_app_version(&mut self, version: AppVersion) {
        if self.app_version != Some(version) {
            self.app_version = Some(version);
            self.dirty = true;
        }
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    /// Notes this note links to
    pub fn linked_notes(&self) -> &IndexSet<NoteId> {
        &self.linked_notes
    }

    /// Notes linking to this note
    pub fn linking_notes(&self) -> &IndexSet<NoteId> {
        &self.linking_notes
    }

    pub(crate) fn linked_notes_mut(&mut self) -> &mut IndexSet<NoteId> {
        &mut self.linked_notes
    }

    pub(crate) fn linking_notes_mut(&mut self) -> &mut IndexSet<NoteId> {
        &mut self.linking_notes
    }

    /// Tasks found in the note body, ordered by offset
    pub fn tasks(&self) -> &IndexMap<TaskId, Task> {
        &self.tasks
    }

    /// A task by id
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut IndexMap<TaskId, Task> {
        &mut self.tasks
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    /// Persisted fields changed since loading or saving
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

impl CommentDataHolder for NoteMetadata {
    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn single_value(&self, field: &Field) -> Option<String> {
        match field.name {
            "charset" => self.charset.clone(),
            "appVersion" => self.app_version.map(|version| version.to_string()),
            _ => None,
        }
    }

    fn multiple_values(&self, field: &Field) -> Vec<String> {
        match field.name {
            "versions" => self.versions.iter().map(ToString::to_string).collect(),
            "tags" => self
                .tags
                .iter()
                .map(|tag| tag.external_name().to_string())
                .collect(),
            "attachments" => self.attachments.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn set_single_value(&mut self, field: &Field, value: String) {
        match field.name {
            "charset" => self.charset = Some(value),
            "appVersion" => match AppVersion::parse(&value) {
                Some(version) => self.app_version = Some(version),
                None => log::warn!("Ignoring unparseable app version '{}'", value),
            },
            _ => {}
        }
    }

    fn set_multiple_values(&mut self, field: &Field, values: Vec<String>) {
        match field.name {
            "versions" => {
                self.versions = values
                    .iter()
                    .filter_map(|value| {
                        let version = VersionInfo::parse(value);
                        if version.is_none() {
                            log::warn!("Skipping unparseable version entry '{}'", value);
                        }
                        version
                    })
                    .collect();
            }
            "tags" => self.tags = values.into_iter().map(TagRef::new).collect(),
            "attachments" => self.attachments = values.into_iter().collect(),
            _ => {}
        }
    }
}
