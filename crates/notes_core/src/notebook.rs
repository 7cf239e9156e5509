//! The notebook session service.
//!
//! [`Notebook`] owns every loaded [`Note`], the comment codec, the task and
//! link engines and the event registry. Hosts create one per session and
//! drive it through two entry points:
//!
//! - [`Notebook::editor_changed`] when the user edits a note body, and
//! - [`Notebook::file_changed`] when the file watcher reports a change.
//!
//! Writing files stays with the host. [`Notebook::save_note`] returns the
//! text to write and remembers the write, so the watcher's echo of it is
//! ignored once.
//!
//! # Example
//!
//! ```
//! use notes_core::config::Config;
//! use notes_core::note::NoteId;
//! use notes_core::notebook::Notebook;
//! use notes_core::source::InMemoryNoteSource;
//! use notes_core::tags::TagTree;
//!
//! let source = InMemoryNoteSource::new();
//! let mut notebook = Notebook::new(Config::new("alice"), source.clone(), TagTree::new());
//!
//! let id = NoteId::new("Work", "Plan");
//! let text = notebook
//!     .create_note(&id, "<input type=\"checkbox\" /> write it down")
//!     .unwrap();
//! source.write_note(id.clone(), &text);
//!
//! assert_eq!(notebook.tasks(&id).unwrap().len(), 1);
//! ```

use std::collections::HashSet;
use std::path::Path;

use chrono::Local;
use indexmap::IndexMap;

use crate::comment_codec::CommentCodec;
use crate::config::Config;
use crate::error::{NotesError, Result};
use crate::events::{EventRegistry, NoteEvent, SetDiff};
use crate::link::{LinkChanges, LinkEngine, NoteMap};
use crate::metadata::{AppVersion, NoteMetadata};
use crate::note::{Note, NoteId};
use crate::source::NoteSource;
use crate::tags::TagDirectory;
use crate::task::{Task, TaskEngine, TaskId, toggle_in_content};

/// Kind of change reported by the file watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// A file appeared
    Created,
    /// A file's content changed
    Modified,
    /// A file disappeared
    Deleted,
}

/// Where a content change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOrigin {
    Editor,
    Disk,
}

/// Notes of one session and the engines keeping their derived state.
pub struct Notebook<S: NoteSource, D: TagDirectory> {
    config: Config,
    codec: CommentCodec,
    source: S,
    tags: D,
    notes: NoteMap,
    tasks: TaskEngine,
    links: LinkEngine,
    events: EventRegistry,
    /// Notes handed to the host for writing whose watcher echo is pending
    writes_in_progress: HashSet<NoteId>,
}

impl<S: NoteSource, D: TagDirectory> Notebook<S, D> {
    /// Create an empty notebook reading notes from `source`
    pub fn new(config: Config, source: S, tags: D) -> Self {
        let codec = CommentCodec::with_compression(config.compress_metadata);
        let links = LinkEngine::new(&config.link_attribute, &config.note_extension);
        Self {
            config,
            codec,
            source,
            tags,
            notes: NoteMap::new(),
            tasks: TaskEngine::new(),
            links,
            events: EventRegistry::new(),
            writes_in_progress: HashSet::new(),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Event subscriptions
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// A loaded note
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.get(id)
    }

    /// All loaded notes, in load order
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    /// Metadata of a loaded note, for tag, attachment and charset changes
    pub fn metadata_mut(&mut self, id: &NoteId) -> Result<&mut NoteMetadata> {
        self.notes
            .get_mut(id)
            .map(Note::metadata_mut)
            .ok_or_else(|| NotesError::NoteNotFound(id.clone()))
    }

    /// Whether a write of `id` was handed out and not yet echoed back
    pub fn is_write_in_progress(&self, id: &NoteId) -> bool {
        self.writes_in_progress.contains(id)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    fn read_note(&self, id: &NoteId) -> Result<String> {
        self.source.read_note(id).map_err(|source| NotesError::NoteRead {
            id: id.clone(),
            source,
        })
    }

    /// Load a note from the source and connect its links.
    ///
    /// Loading a note that is already loaded does nothing.
    pub fn load_note(&mut self, id: &NoteId) -> Result<&Note> {
        if !self.notes.contains_key(id) {
            let text = self.read_note(id)?;
            let (metadata, body) = NoteMetadata::parse_file(&text, &self.codec, &self.tags);
            let note = Note::new(id.clone(), body.to_string(), metadata);
            self.notes.insert(id.clone(), note);

            log::debug!("Loaded note '{}'", id);
            self.events.emit(&NoteEvent::NoteAdded { note: id.clone() });
            let changes = self.links.attach(&mut self.notes, id);
            self.emit_links(changes);
        }

        self.notes
            .get(id)
            .ok_or_else(|| NotesError::NoteNotFound(id.clone()))
    }

    /// Load every note the source lists. Returns how many were newly loaded.
    pub fn load_all(&mut self) -> Result<usize> {
        let mut loaded = 0;
        for id in self.source.list_notes()? {
            if !self.notes.contains_key(&id) {
                self.load_note(&id)?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Create a note with the given body.
    ///
    /// Returns the file text the host must write.
    pub fn create_note(&mut self, id: &NoteId, body: &str) -> Result<String> {
        if self.notes.contains_key(id) || self.source.read_note(id).is_ok() {
            return Err(NotesError::NoteAlreadyExists(id.clone()));
        }

        let note = Note::new(id.clone(), String::new(), NoteMetadata::for_new_note());
        self.notes.insert(id.clone(), note);
        self.events.emit(&NoteEvent::NoteAdded { note: id.clone() });
        let changes = self.links.attach(&mut self.notes, id);
        self.emit_links(changes);

        self.apply_change(id, body.to_string(), ChangeOrigin::Editor)?;
        self.save_note(id)
    }

    // ------------------------------------------------------------------
    // Content changes
    // ------------------------------------------------------------------

    /// The editor body of `id` is now `content`.
    pub fn editor_changed(&mut self, id: &NoteId, content: &str) -> Result<()> {
        self.apply_change(id, content.to_string(), ChangeOrigin::Editor)
    }

    /// Reconcile tasks and links of `id` from its current body to `new`.
    fn apply_change(&mut self, id: &NoteId, new: String, origin: ChangeOrigin) -> Result<()> {
        let note = self
            .notes
            .get_mut(id)
            .ok_or_else(|| NotesError::NoteNotFound(id.clone()))?;

        // Tasks are tracked against the body before the change.
        self.tasks.tasks_for_note(note);
        let old = note.content().to_string();
        match origin {
            ChangeOrigin::Editor => note.set_editor_content(new.clone()),
            ChangeOrigin::Disk => note.set_file_content(new.clone()),
        }

        let task_diff = self.tasks.reconcile(note, &old, &new);
        self.emit_tasks(id, task_diff);

        let changes = self.links.reconcile(&mut self.notes, id, &old, &new);
        self.emit_links(changes);
        Ok(())
    }

    /// The file watcher reported a change at `path`.
    ///
    /// Paths that are not note files are ignored, as is the echo of a
    /// write handed out by [`Notebook::save_note`]. A file name that is not
    /// valid UTF-8 is an [`NotesError::InvalidFileName`].
    pub fn file_changed(&mut self, kind: FileChangeKind, path: &Path) -> Result<()> {
        let Some(name) = path.file_name() else {
            log::debug!("Ignoring change of {:?}", path);
            return Ok(());
        };
        let Some(file_name) = name.to_str() else {
            return Err(NotesError::InvalidFileName(
                path.to_string_lossy().into_owned(),
            ));
        };
        let Some(id) = NoteId::from_file_name(file_name, &self.config.note_extension) else {
            log::debug!("Ignoring change of non-note file {:?}", path);
            return Ok(());
        };

        if kind != FileChangeKind::Deleted && self.writes_in_progress.remove(&id) {
            log::debug!("Ignoring echo of our own write of '{}'", id);
            return Ok(());
        }

        if !self.links.begin(&id) {
            return Ok(());
        }
        let result = match kind {
            FileChangeKind::Created | FileChangeKind::Modified => self.reload_note(&id),
            FileChangeKind::Deleted => self.forget_note(&id),
        };
        self.links.finish(&id);
        result
    }

    fn reload_note(&mut self, id: &NoteId) -> Result<()> {
        if !self.notes.contains_key(id) {
            return self.load_note(id).map(|_| ());
        }

        let text = self.read_note(id)?;
        let (parsed, body) = NoteMetadata::parse_file(&text, &self.codec, &self.tags);

        let Some(note) = self.notes.get_mut(id) else {
            return Err(NotesError::NoteNotFound(id.clone()));
        };
        if note.has_unsaved_changes() {
            log::warn!(
                "Note '{}' changed on disk while it has unsaved changes, keeping the editor version",
                id
            );
            note.set_file_content(body.to_string());
            return Ok(());
        }
        if note.file_content() == body {
            note.metadata_mut().replace_persisted(parsed);
            return Ok(());
        }

        note.metadata_mut().replace_persisted(parsed);
        self.apply_change(id, body.to_string(), ChangeOrigin::Disk)
    }

    fn forget_note(&mut self, id: &NoteId) -> Result<()> {
        if !self.notes.contains_key(id) {
            return Ok(());
        }
        self.delete_note(id)
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Record a version, promote the editor body and return the file text
    /// the host must write.
    pub fn save_note(&mut self, id: &NoteId) -> Result<String> {
        let note = self
            .notes
            .get_mut(id)
            .ok_or_else(|| NotesError::NoteNotFound(id.clone()))?;

        let metadata = note.metadata_mut();
        metadata.add_version(&self.config.author, Local::now().naive_local());
        metadata.set_app_version(AppVersion::CURRENT);
        note.mark_saved();

        let text = note.metadata().to_file(
            note.file_content(),
            &self.codec,
            &self.config.line_separator,
        );
        self.writes_in_progress.insert(id.clone());
        log::debug!("Saving note '{}' ({} bytes)", id, text.len());
        Ok(text)
    }

    /// The host could not write the text returned by [`Notebook::save_note`].
    ///
    /// The note is flagged as changed again and no echo is expected.
    pub fn write_failed(&mut self, id: &NoteId) {
        self.writes_in_progress.remove(id);
        if let Some(note) = self.notes.get_mut(id) {
            let content = note.file_content().to_string();
            note.set_editor_content(content);
        }
    }

    // ------------------------------------------------------------------
    // Rename, move, delete
    // ------------------------------------------------------------------

    /// Rename `old` to `new`, rewriting links in notes that point at it.
    ///
    /// Returns the notes whose bodies were rewritten; the host saves them
    /// with [`Notebook::save_note`] and moves the renamed note's file.
    pub fn rename_note(&mut self, old: &NoteId, new: &NoteId) -> Result<Vec<NoteId>> {
        if old == new {
            return Ok(Vec::new());
        }
        if self.notes.contains_key(new) || self.source.read_note(new).is_ok() {
            return Err(NotesError::NoteAlreadyExists(new.clone()));
        }
        self.load_note(old)?;

        let old_file = old.file_name(&self.config.note_extension);
        let candidates = match self.source.find_notes_containing(&old_file) {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("Could not search notes linking to '{}': {}", old_file, e);
                Vec::new()
            }
        };
        for candidate in &candidates {
            if let Err(e) = self.load_note(candidate) {
                log::warn!("Skipping link candidate '{}': {}", candidate, e);
            }
        }

        let (changes, rewrites) = self.links.rename(&mut self.notes, old, new, &candidates);
        // The host moves the file; its appearance under the new name is ours.
        self.writes_in_progress.remove(old);
        self.writes_in_progress.insert(new.clone());

        self.events.emit(&NoteEvent::NoteRenamed {
            old: old.clone(),
            new: new.clone(),
        });
        self.emit_links(changes);

        // Notes already pointing at the new file name now have a target.
        let changes = self.links.attach(&mut self.notes, new);
        self.emit_links(changes);

        let mut rewritten = Vec::with_capacity(rewrites.len());
        for (id, body) in rewrites {
            self.apply_change(&id, body, ChangeOrigin::Editor)?;
            rewritten.push(id);
        }
        Ok(rewritten)
    }

    /// Move `id` to another group. See [`Notebook::rename_note`].
    pub fn move_note(&mut self, id: &NoteId, group: &str) -> Result<Vec<NoteId>> {
        self.rename_note(id, &id.with_group(group))
    }

    /// Forget a deleted note and every link to and from it.
    pub fn delete_note(&mut self, id: &NoteId) -> Result<()> {
        if !self.notes.contains_key(id) {
            return Err(NotesError::NoteNotFound(id.clone()));
        }

        let changes = self.links.remove(&mut self.notes, id);
        self.notes.shift_remove(id);
        self.writes_in_progress.remove(id);

        log::debug!("Removed note '{}'", id);
        self.events.emit(&NoteEvent::NoteRemoved { note: id.clone() });
        self.emit_links(
            changes
                .into_iter()
                .filter(|(note, _)| note != id)
                .collect(),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Tasks of a loaded note, scanning its body on first access
    pub fn tasks(&mut self, id: &NoteId) -> Result<&IndexMap<TaskId, Task>> {
        let note = self
            .notes
            .get_mut(id)
            .ok_or_else(|| NotesError::NoteNotFound(id.clone()))?;
        Ok(self.tasks.tasks_for_note(note))
    }

    fn task(&mut self, note: &NoteId, task: TaskId) -> Result<&Task> {
        self.tasks(note)?
            .get(&task)
            .ok_or_else(|| NotesError::TaskNotFound {
                note: note.clone(),
                task: task.get(),
            })
    }

    /// Tick or untick a task's checkbox in the editor body.
    pub fn set_task_completed(&mut self, note: &NoteId, task: TaskId, completed: bool) -> Result<()> {
        let current = self.task(note, task)?.clone();
        if current.is_completed() == completed {
            return Ok(());
        }

        let content = self
            .notes
            .get(note)
            .map(|n| n.content())
            .unwrap_or_default();
        let toggled = toggle_in_content(content, &current, completed).ok_or(
            NotesError::NotACheckbox {
                offset: current.offset(),
            },
        )?;
        self.apply_change(note, toggled, ChangeOrigin::Editor)
    }

    /// Change fields of a task that do not live in the note body
    /// (priority, due date, comment, tags).
    pub fn edit_task(
        &mut self,
        note: &NoteId,
        task: TaskId,
        edit: impl FnOnce(&mut Task),
    ) -> Result<()> {
        self.task(note, task)?;
        let Some(target) = self
            .notes
            .get_mut(note)
            .and_then(|n| n.metadata_mut().tasks_mut().get_mut(&task))
        else {
            return Err(NotesError::TaskNotFound {
                note: note.clone(),
                task: task.get(),
            });
        };

        let before = target.clone();
        edit(target);
        if *target != before {
            let diff = SetDiff {
                updated: vec![target.clone()],
                ..SetDiff::default()
            };
            self.emit_tasks(note, diff);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn emit_tasks(&self, note: &NoteId, diff: SetDiff<Task>) {
        if !diff.is_empty() {
            self.events.emit(&NoteEvent::TasksChanged {
                note: note.clone(),
                diff,
            });
        }
    }

    fn emit_links(&self, changes: LinkChanges) {
        for (note, diff) in changes {
            if !diff.is_empty() {
                self.events.emit(&NoteEvent::LinksChanged { note, diff });
            }
        }
    }
}

impl<S: NoteSource, D: TagDirectory> std::fmt::Debug for Notebook<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notebook")
            .field("notes", &self.notes.len())
            .field("writes_in_progress", &self.writes_in_progress)
            .finish()
    }
}
