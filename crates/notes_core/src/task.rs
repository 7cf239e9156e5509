//! Checkbox tasks extracted from note bodies.
//!
//! A task is a checkbox marker in the note HTML followed by the rest of its
//! line. Four literal marker spellings are recognized, see
//! [`CheckboxMarker`].
//!
//! The [`TaskEngine`] keeps a note's task set in step with its body. Each
//! edit is reconciled against the previous body: tasks whose checkbox is
//! still there are updated in place and keep their [`TaskId`], vanished
//! checkboxes remove their task, and new checkboxes create tasks with
//! fresh ids.
//!
//! # Matching
//!
//! Old and new content are compared to find the edited region (common
//! prefix and suffix). A tracked task whose marker lies before the edit is
//! looked up at its old offset; one after the edit is looked up at its old
//! offset shifted by the length delta. Both positions are tried for tasks
//! touching the edit, and a position where the same marker and the same
//! line text reappear is preferred over one where only a marker is found.
//! Tasks still unmatched whose marker was inside the edit are paired, in
//! order, with unclaimed markers inside the edited part of the new content.
//! This is a heuristic, not a positional diff: with several identical
//! checkbox lines around an edit a task can be anchored to a neighbour.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Serialize;

use crate::error::{NotesError, Result};
use crate::events::SetDiff;
use crate::note::{Note, NoteId};
use crate::tags::TagRef;

/// Common start of every checkbox marker
const MARKER_START: &str = "<input ";

/// Non-nested tag stripping: every `<...>` goes, entities stay.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Longest named or numeric entity we try to decode, including `&` and `;`
const MAX_ENTITY_LEN: usize = 10;

/// One of the four recognized checkbox spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckboxMarker {
    /// `<input type="checkbox" />`
    Unchecked,
    /// `<input type="checkbox">`
    UncheckedHtml,
    /// `<input type="checkbox" checked="checked" />`
    Checked,
    /// `<input checked="checked" type="checkbox">`
    CheckedHtml,
}

impl CheckboxMarker {
    /// All spellings
    pub const ALL: [CheckboxMarker; 4] = [
        CheckboxMarker::Unchecked,
        CheckboxMarker::UncheckedHtml,
        CheckboxMarker::Checked,
        CheckboxMarker::CheckedHtml,
    ];

    /// Literal markup
    pub fn as_str(self) -> &'static str {
        match self {
            CheckboxMarker::Unchecked => r#"<input type="checkbox" />"#,
            CheckboxMarker::UncheckedHtml => r#"<input type="checkbox">"#,
            CheckboxMarker::Checked => r#"<input type="checkbox" checked="checked" />"#,
            CheckboxMarker::CheckedHtml => r#"<input checked="checked" type="checkbox">"#,
        }
    }

    /// Length of the markup in bytes
    #[allow(clippy::len_without_is_empty)]
    pub fn len(self) -> usize {
        self.as_str().len()
    }

    /// Whether this spelling is a ticked checkbox
    pub fn is_checked(self) -> bool {
        matches!(self, CheckboxMarker::Checked | CheckboxMarker::CheckedHtml)
    }

    /// Same spelling family with the given state
    pub fn with_checked(self, checked: bool) -> Self {
        match (self, checked) {
            (CheckboxMarker::Unchecked | CheckboxMarker::Checked, true) => CheckboxMarker::Checked,
            (CheckboxMarker::Unchecked | CheckboxMarker::Checked, false) => {
                CheckboxMarker::Unchecked
            }
            (CheckboxMarker::UncheckedHtml | CheckboxMarker::CheckedHtml, true) => {
                CheckboxMarker::CheckedHtml
            }
            (CheckboxMarker::UncheckedHtml | CheckboxMarker::CheckedHtml, false) => {
                CheckboxMarker::UncheckedHtml
            }
        }
    }

    /// Marker that `text` starts with, if any
    pub fn at(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|marker| text.starts_with(marker.as_str()))
    }
}

/// A checkbox found by [`scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckboxOccurrence {
    /// Byte offset of the marker in the content
    pub offset: usize,
    /// Which spelling was found
    pub marker: CheckboxMarker,
}

impl CheckboxOccurrence {
    /// Whether the checkbox is ticked
    pub fn is_checked(&self) -> bool {
        self.marker.is_checked()
    }

    /// Length of the raw markup
    pub fn markup_len(&self) -> usize {
        self.marker.len()
    }
}

/// Find all non-overlapping checkbox markers, left to right.
pub fn scan(content: &str) -> Vec<CheckboxOccurrence> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(idx) = content[pos..].find(MARKER_START) {
        let start = pos + idx;
        match CheckboxMarker::at(&content[start..]) {
            Some(marker) => {
                found.push(CheckboxOccurrence {
                    offset: start,
                    marker,
                });
                pos = start + marker.len();
            }
            None => pos = start + MARKER_START.len(),
        }
    }

    found
}

/// Validate the checkbox at `offset` and extract its description.
///
/// The description is the rest of the line after the marker with tags
/// stripped and HTML entities decoded.
pub fn parse_checkbox(content: &str, offset: usize) -> Result<(CheckboxMarker, String)> {
    if offset > content.len() || !content.is_char_boundary(offset) {
        return Err(NotesError::InvalidTaskOffset(offset));
    }
    let marker =
        CheckboxMarker::at(&content[offset..]).ok_or(NotesError::NotACheckbox { offset })?;
    Ok((marker, describe(content, offset, marker)))
}

fn describe(content: &str, offset: usize, marker: CheckboxMarker) -> String {
    let rest = &content[offset + marker.len()..];
    let line = rest.split('\n').next().unwrap_or_default();
    let line = line.strip_suffix('\r').unwrap_or(line);
    unescape_html(&TAG_RE.replace_all(line, ""))
}

/// Decode named and numeric HTML entities; unknown entities are kept.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end < MAX_ENTITY_LEN)
            .and_then(|end| decode_entity(&tail[1..end]).map(|ch| (ch, end)));

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "auml" => 'ä',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "szlig" => 'ß',
        "euro" => '€',
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            return char::from_u32(code);
        }
    };
    Some(ch)
}

/// Stable task identity; never reused within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw id
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Ids coming back from a UI bridge
impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TaskPriority {
    /// Can wait
    Low,
    /// Normal
    #[default]
    Medium,
    /// Do first
    High,
}

/// A checkbox item of a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: TaskId,
    note: NoteId,
    completed: bool,
    description: String,
    offset: usize,
    marker: CheckboxMarker,
    priority: TaskPriority,
    due_date: Option<NaiveDate>,
    comment: String,
    tags: IndexSet<TagRef>,
}

impl Task {
    fn new(id: TaskId, note: NoteId, occurrence: CheckboxOccurrence, description: String) -> Self {
        Self {
            id,
            note,
            completed: occurrence.is_checked(),
            description,
            offset: occurrence.offset,
            marker: occurrence.marker,
            priority: TaskPriority::default(),
            due_date: None,
            comment: String::new(),
            tags: IndexSet::new(),
        }
    }

    /// Stable id
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Owning note
    pub fn note(&self) -> &NoteId {
        &self.note
    }

    /// Whether the checkbox is ticked
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Text after the checkbox, tags stripped
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Last known byte offset of the marker in the note content.
    ///
    /// Advisory: used for ordering and re-locating, not identity.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Spelling of the marker at [`Task::offset`]
    pub fn marker(&self) -> CheckboxMarker {
        self.marker
    }

    /// Priority
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Set the priority
    pub fn set_priority(&mut self, priority: TaskPriority) {
        self.priority = priority;
    }

    /// Due date
    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    /// Set or clear the due date
    pub fn set_due_date(&mut self, due_date: Option<NaiveDate>) {
        self.due_date = due_date;
    }

    /// Free-text comment
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Set the comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Tags
    pub fn tags(&self) -> &IndexSet<TagRef> {
        &self.tags
    }

    /// Replace the tags
    pub fn set_tags(&mut self, tags: impl IntoIterator<Item = TagRef>) {
        self.tags = tags.into_iter().collect();
    }

    pub(crate) fn set_note(&mut self, note: NoteId) {
        self.note = note;
    }

    /// Apply a re-found checkbox; returns whether a visible field changed.
    fn relocate(&mut self, occurrence: CheckboxOccurrence, description: String) -> bool {
        self.offset = occurrence.offset;
        let changed = self.marker != occurrence.marker
            || self.completed != occurrence.is_checked()
            || self.description != description;
        self.marker = occurrence.marker;
        self.completed = occurrence.is_checked();
        self.description = description;
        changed
    }
}

/// Where two versions of a text differ.
#[derive(Debug, Clone, Copy)]
struct EditRegion {
    prefix: usize,
    old_end: usize,
    new_end: usize,
    old_len: usize,
    new_len: usize,
}

impl EditRegion {
    fn between(old: &str, new: &str) -> Self {
        let prefix = old
            .bytes()
            .zip(new.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .bytes()
            .rev()
            .zip(new.bytes().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        Self {
            prefix,
            old_end: old.len() - suffix,
            new_end: new.len() - suffix,
            old_len: old.len(),
            new_len: new.len(),
        }
    }

    /// Offsets in the new text where a marker at `offset` in the old text
    /// may have ended up, most likely first.
    fn candidates(&self, offset: usize) -> Vec<usize> {
        let shifted = (offset + self.new_len).checked_sub(self.old_len);
        let ordered = if offset >= self.old_end {
            [shifted, Some(offset)]
        } else {
            [Some(offset), shifted]
        };

        let mut candidates: Vec<usize> = Vec::with_capacity(2);
        for candidate in ordered.into_iter().flatten() {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Whether `offset..offset + len` of the old text overlaps the edit
    fn touches_old(&self, offset: usize, len: usize) -> bool {
        offset < self.old_end && offset + len > self.prefix
    }

    /// Whether `offset..offset + len` of the new text overlaps the edit
    fn touches_new(&self, offset: usize, len: usize) -> bool {
        offset < self.new_end && offset + len > self.prefix
    }
}

/// Keeps per-note task sets synchronized with note content.
#[derive(Debug)]
pub struct TaskEngine {
    next_id: u64,
}

impl Default for TaskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskEngine {
    /// Create an engine; ids start at 1
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    fn fresh_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Build a task for the checkbox at `offset`, with a fresh id.
    pub fn build_task(&mut self, note: &NoteId, content: &str, offset: usize) -> Result<Task> {
        let (marker, description) = parse_checkbox(content, offset)?;
        Ok(Task::new(
            self.fresh_id(),
            note.clone(),
            CheckboxOccurrence { offset, marker },
            description,
        ))
    }

    /// Bring the task set of `note` from `old` content to `new` content.
    ///
    /// `old` must be the content the task set was last reconciled with.
    pub fn reconcile(&mut self, note: &mut Note, old: &str, new: &str) -> SetDiff<Task> {
        let note_id = note.id().clone();
        let occurrences = scan(new);
        let descriptions: Vec<String> = occurrences
            .iter()
            .map(|occurrence| describe(new, occurrence.offset, occurrence.marker))
            .collect();
        let by_offset: HashMap<usize, usize> = occurrences
            .iter()
            .enumerate()
            .map(|(idx, occurrence)| (occurrence.offset, idx))
            .collect();

        let tasks = note.metadata_mut().tasks_mut();

        let old_offsets: HashSet<usize> = scan(old).iter().map(|o| o.offset).collect();
        let stale = tasks
            .values()
            .filter(|task| !old_offsets.contains(&task.offset))
            .count();
        if stale > 0 {
            log::debug!(
                "{} tracked task(s) of '{}' do not match the previous content",
                stale,
                note_id
            );
        }

        let region = EditRegion::between(old, new);
        let mut ordered: Vec<&Task> = tasks.values().collect();
        ordered.sort_by_key(|task| task.offset);
        let candidates: Vec<(TaskId, Vec<usize>, bool)> = ordered
            .iter()
            .map(|task| {
                (
                    task.id,
                    region.candidates(task.offset),
                    region.touches_old(task.offset, task.marker.len()),
                )
            })
            .collect();

        let mut claimed: Vec<bool> = vec![false; occurrences.len()];
        let mut assigned: HashMap<TaskId, usize> = HashMap::new();

        // Same marker and same line text first, then any marker.
        for exact in [true, false] {
            for (id, offsets, _) in &candidates {
                if assigned.contains_key(id) {
                    continue;
                }
                let task = &tasks[id];
                let hit = offsets.iter().find_map(|offset| {
                    let idx = *by_offset.get(offset)?;
                    let free = !claimed[idx];
                    let same = occurrences[idx].marker == task.marker
                        && descriptions[idx] == task.description;
                    (free && (same || !exact)).then_some(idx)
                });
                if let Some(idx) = hit {
                    claimed[idx] = true;
                    assigned.insert(*id, idx);
                }
            }
        }

        // Tasks rewritten inside the edit pair up, in order, with the
        // markers left inside the edited part of the new text.
        let mut inside_edit = occurrences
            .iter()
            .enumerate()
            .filter(|(idx, occurrence)| {
                !claimed[*idx] && region.touches_new(occurrence.offset, occurrence.marker.len())
            })
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>()
            .into_iter();
        for (id, _, touches_edit) in &candidates {
            if !touches_edit || assigned.contains_key(id) {
                continue;
            }
            let Some(idx) = inside_edit.next() else {
                break;
            };
            claimed[idx] = true;
            assigned.insert(*id, idx);
        }

        let mut diff = SetDiff::default();

        for (id, _, _) in &candidates {
            if !assigned.contains_key(id)
                && let Some(task) = tasks.shift_remove(id)
            {
                diff.removed.push(task);
            }
        }

        for (id, idx) in &assigned {
            if let Some(task) = tasks.get_mut(id)
                && task.relocate(occurrences[*idx], descriptions[*idx].clone())
            {
                diff.updated.push(task.clone());
            }
        }

        for (idx, occurrence) in occurrences.iter().enumerate() {
            if claimed[idx] {
                continue;
            }
            let task = Task::new(
                self.fresh_id(),
                note_id.clone(),
                *occurrence,
                descriptions[idx].clone(),
            );
            diff.added.push(task.clone());
            tasks.insert(task.id, task);
        }

        tasks.sort_by(|_, a, _, b| a.offset.cmp(&b.offset));
        diff.updated.sort_by_key(|task| task.offset);

        log::debug!(
            "Tasks of '{}': {} added, {} removed, {} updated",
            note_id,
            diff.added.len(),
            diff.removed.len(),
            diff.updated.len()
        );
        diff
    }

    /// Task set of `note`, scanning its current content first if nothing
    /// is tracked yet.
    pub fn tasks_for_note<'a>(&mut self, note: &'a mut Note) -> &'a IndexMap<TaskId, Task> {
        if note.metadata().tasks().is_empty() {
            let content = note.content().to_string();
            self.reconcile(note, "", &content);
        }
        note.metadata().tasks()
    }
}

/// Content with the marker of `task` switched to the given state.
///
/// Returns `None` when the marker is no longer at the task's offset.
pub fn toggle_in_content(content: &str, task: &Task, completed: bool) -> Option<String> {
    let offset = task.offset();
    let current = CheckboxMarker::at(content.get(offset..)?)?;
    let replacement = current.with_checked(completed);

    let mut toggled = String::with_capacity(content.len() + 32);
    toggled.push_str(&content[..offset]);
    toggled.push_str(replacement.as_str());
    toggled.push_str(&content[offset + current.len()..]);
    Some(toggled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoteMetadata;

    const OPEN: &str = r#"<input type="checkbox" />"#;
    const DONE: &str = r#"<input type="checkbox" checked="checked" />"#;

    fn note_with(content: &str) -> Note {
        Note::new(
            NoteId::new("Work", "Todo"),
            content.to_string(),
            NoteMetadata::default(),
        )
    }

    fn ids(note: &Note) -> Vec<TaskId> {
        note.metadata().tasks().keys().copied().collect()
    }

    fn descriptions(note: &Note) -> Vec<String> {
        note.metadata()
            .tasks()
            .values()
            .map(|task| task.description().to_string())
            .collect()
    }

    #[test]
    fn test_example_two_tasks() {
        let content = format!("{OPEN} buy milk\n{DONE} pay bills\n");
        let mut note = note_with(&content);
        let mut engine = TaskEngine::new();

        let tasks: Vec<Task> = engine.tasks_for_note(&mut note).values().cloned().collect();
        assert_eq!(tasks.len(), 2);
        assert!(!tasks[0].is_completed());
        assert_eq!(tasks[0].description(), " buy milk");
        assert!(tasks[1].is_completed());
        assert_eq!(tasks[1].description(), " pay bills");
        assert_eq!(tasks[1].offset(), OPEN.len() + " buy milk\n".len());
    }

    #[test]
    fn test_scan_all_spellings() {
        let content = concat!(
            r#"<input type="checkbox" /> a"#,
            r#"<input type="checkbox"> b"#,
            r#"<input type="checkbox" checked="checked" /> c"#,
            r#"<input checked="checked" type="checkbox"> d"#,
            r#"<input type="text" /> not a task"#,
        );
        let found = scan(content);
        assert_eq!(
            found.iter().map(|o| o.marker).collect::<Vec<_>>(),
            CheckboxMarker::ALL.to_vec()
        );
        assert_eq!(
            found.iter().map(|o| o.is_checked()).collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
    }

    #[test]
    fn test_scan_adjacent_markers_counted_once_each() {
        let content = format!("{OPEN}{OPEN}{DONE}");
        let found = scan(&content);
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].offset, OPEN.len());
        assert_eq!(found[2].offset, 2 * OPEN.len());
        assert_eq!(found[2].markup_len(), DONE.len());
    }

    #[test]
    fn test_task_count_matches_marker_count() {
        let content: String = (0..7).map(|i| format!("<li>{OPEN} item {i}</li>\n")).collect();
        let mut note = note_with(&content);
        assert_eq!(TaskEngine::new().tasks_for_note(&mut note).len(), 7);
    }

    #[test]
    fn test_description_strips_tags_and_entities() {
        let content = format!("<li>{OPEN} <b>call</b> Tom &amp; Jerry &lt;3 &#228; &unknown;</li>\r\nnext");
        let (_, description) = parse_checkbox(&content, 4).unwrap();
        assert_eq!(description, " call Tom & Jerry <3 ä &unknown;");
    }

    #[test]
    fn test_build_task_rejects_bad_offsets() {
        let mut engine = TaskEngine::new();
        let note = NoteId::new("", "n");
        let content = format!("x{OPEN} a");

        assert!(matches!(
            engine.build_task(&note, &content, 0),
            Err(NotesError::NotACheckbox { offset: 0 })
        ));
        assert!(matches!(
            engine.build_task(&note, &content, 500),
            Err(NotesError::InvalidTaskOffset(500))
        ));

        let task = engine.build_task(&note, &content, 1).unwrap();
        assert_eq!(task.description(), " a");
        assert_eq!(task.offset(), 1);
    }

    #[test]
    fn test_noop_reconcile_produces_no_events() {
        let content = format!("{OPEN} a\n{DONE} b\n");
        let mut note = note_with(&content);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let before = ids(&note);

        let diff = engine.reconcile(&mut note, &content, &content);
        assert!(diff.is_empty());
        assert_eq!(ids(&note), before);
    }

    #[test]
    fn test_edit_elsewhere_shifts_offsets_silently() {
        let old = format!("<p>intro</p>\n{OPEN} a\n<p>middle</p>\n{OPEN} b\n");
        let new = format!("<p>a much longer intro</p>\n{OPEN} a\n<p>middle</p>\n{OPEN} b\n");
        let mut note = note_with(&old);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let before = ids(&note);

        let diff = engine.reconcile(&mut note, &old, &new);
        assert!(diff.is_empty());
        assert_eq!(ids(&note), before);

        let offsets: Vec<usize> = note.metadata().tasks().values().map(Task::offset).collect();
        let expected: Vec<usize> = scan(&new).iter().map(|o| o.offset).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_insertion_isolation() {
        let lines = [" one\n", " two\n", " three\n"];
        let old: String = lines.iter().map(|line| format!("{OPEN}{line}")).collect();

        // Insert a new checkbox line at every line boundary, including a
        // duplicate of the following line
        let boundaries = [0, OPEN.len() + 5, 2 * OPEN.len() + 10, old.len()];
        for (at, inserted) in boundaries.iter().zip([" new\n", " two\n", " new\n", " four\n"]) {
            let mut note = note_with(&old);
            let mut engine = TaskEngine::new();
            engine.tasks_for_note(&mut note);
            let before: Vec<(TaskId, String)> = note
                .metadata()
                .tasks()
                .values()
                .map(|task| (task.id(), task.description().to_string()))
                .collect();

            let mut new = old.clone();
            new.insert_str(*at, &format!("{OPEN}{inserted}"));
            let diff = engine.reconcile(&mut note, &old, &new);

            assert_eq!(diff.added.len(), 1, "insert at {at}");
            assert!(diff.removed.is_empty(), "insert at {at}");
            assert!(diff.updated.is_empty(), "insert at {at}");
            assert_eq!(format!("{}\n", diff.added[0].description()), inserted);
            for (id, description) in before {
                assert_eq!(note.metadata().task(id).unwrap().description(), description);
            }
            assert_eq!(note.metadata().tasks().len(), 4);
        }
    }

    #[test]
    fn test_deletion_isolation() {
        let old = format!("{OPEN} one\n{OPEN} two\n{OPEN} three\n");
        let mut note = note_with(&old);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let before = ids(&note);

        let new = old.replace(&format!("{OPEN} two\n"), "");
        let diff = engine.reconcile(&mut note, &old, &new);

        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].id(), before[1]);
        assert!(diff.added.is_empty());
        assert!(diff.updated.is_empty());
        assert_eq!(ids(&note), vec![before[0], before[2]]);
    }

    #[test]
    fn test_editing_task_text_mutates_in_place() {
        let old = format!("{OPEN} buy milk\n{OPEN} pay bills\n");
        let new = format!("{OPEN} buy oat milk\n{OPEN} pay bills\n");
        let mut note = note_with(&old);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let before = ids(&note);

        let diff = engine.reconcile(&mut note, &old, &new);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].id(), before[0]);
        assert_eq!(ids(&note), before);
        assert_eq!(descriptions(&note), vec![" buy oat milk", " pay bills"]);
    }

    #[test]
    fn test_ticking_checkbox_keeps_identity() {
        let old = format!("{OPEN} a\n{OPEN} b\n");
        let new = format!("{OPEN} a\n{DONE} b\n");
        let mut note = note_with(&old);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let before = ids(&note);

        let diff = engine.reconcile(&mut note, &old, &new);
        assert_eq!(diff.updated.len(), 1);
        assert!(diff.added.is_empty() && diff.removed.is_empty());

        let task = note.metadata().task(before[1]).unwrap();
        assert!(task.is_completed());
        assert_eq!(task.marker(), CheckboxMarker::Checked);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let with_task = format!("{OPEN} a\n");
        let mut note = note_with(&with_task);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let first = ids(&note);

        engine.reconcile(&mut note, &with_task, "");
        assert!(note.metadata().tasks().is_empty());

        let diff = engine.reconcile(&mut note, "", &with_task);
        assert_eq!(diff.added.len(), 1);
        assert_ne!(diff.added[0].id(), first[0]);
    }

    #[test]
    fn test_user_fields_survive_edits() {
        let old = format!("{OPEN} a\n");
        let new = format!("<h1>Title</h1>\n{OPEN} a, edited\n");
        let mut note = note_with(&old);
        let mut engine = TaskEngine::new();
        engine.tasks_for_note(&mut note);
        let id = ids(&note)[0];

        let task = note.metadata_mut().tasks_mut().get_mut(&id).unwrap();
        task.set_priority(TaskPriority::High);
        task.set_comment("call first");

        engine.reconcile(&mut note, &old, &new);
        let task = note.metadata().task(id).unwrap();
        assert_eq!(task.priority(), TaskPriority::High);
        assert_eq!(task.comment(), "call first");
        assert_eq!(task.description(), " a, edited");
    }

    #[test]
    fn test_toggle_in_content() {
        let content = format!("x{OPEN} a");
        let mut note = note_with(&content);
        let mut engine = TaskEngine::new();
        let task = engine.tasks_for_note(&mut note)[0].clone();

        let toggled = toggle_in_content(&content, &task, true).unwrap();
        assert_eq!(toggled, format!("x{DONE} a"));
        assert_eq!(toggle_in_content("nothing here", &task, true), None);
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("a &amp;&amp; b"), "a && b");
        assert_eq!(unescape_html("&#x41;&#66;"), "AB");
        assert_eq!(unescape_html("fish & chips"), "fish & chips");
        assert_eq!(unescape_html("&;"), "&;");
    }
}
