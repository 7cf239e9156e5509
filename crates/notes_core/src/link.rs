//! Links between notes.
//!
//! A note links to another note with an anchor carrying a marker attribute
//! whose value is the target's file name:
//!
//! ```html
//! <a href="[Work] Plan.htm" data-note-link="[Work] Plan.htm">Plan</a>
//! ```
//!
//! A link is not an object of its own. It is the pair of memberships
//! `B ∈ A.linked_notes` and `A ∈ B.linking_notes`, and the [`LinkEngine`]
//! only ever changes both sides together.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::events::LinkDiff;
use crate::note::{Note, NoteId};
use crate::task::unescape_html;

/// Notes known to a notebook, by identity.
pub type NoteMap = IndexMap<NoteId, Note>;

/// Per-note link changes collected during one operation.
pub type LinkChanges = IndexMap<NoteId, LinkDiff>;

/// Anchor markup linking to `target`.
pub fn note_link_html(target: &NoteId, extension: &str, attribute: &str, text: &str) -> String {
    let file_name = escape_attribute(&target.file_name(extension));
    format!(
        "<a href=\"{file_name}\" {attribute}=\"{file_name}\">{}</a>",
        escape_attribute(text)
    )
}

/// File names referenced by note-link anchors in `content`, first-seen order.
pub fn extract_links(content: &str, attribute: &str) -> IndexSet<String> {
    let needle = format!("{attribute}=\"");
    let mut links = IndexSet::new();
    let mut pos = 0;

    while let Some(idx) = content[pos..].find("<a ") {
        let start = pos + idx;
        let Some(len) = content[start..].find('>') else {
            break;
        };
        let tag = &content[start..start + len];
        if let Some(value) = attribute_value(tag, &needle) {
            links.insert(unescape_html(value));
        }
        pos = start + len;
    }

    links
}

/// Value of the attribute whose `name="` is `needle`, if present in `tag`.
fn attribute_value<'a>(tag: &'a str, needle: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(idx) = tag[from..].find(needle) {
        let start = from + idx;
        let preceded_by_space = tag[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if preceded_by_space {
            let value_start = start + needle.len();
            let value_len = tag[value_start..].find('"')?;
            return Some(&tag[value_start..value_start + value_len]);
        }
        from = start + needle.len();
    }
    None
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Point every anchor at `old_file` to `new_file` instead.
///
/// Rewrites both the marker attribute and `href`.
pub fn rewrite_links(content: &str, attribute: &str, old_file: &str, new_file: &str) -> String {
    let old_file = escape_attribute(old_file);
    let new_file = escape_attribute(new_file);
    content
        .replace(
            &format!("{attribute}=\"{old_file}\""),
            &format!("{attribute}=\"{new_file}\""),
        )
        .replace(
            &format!("href=\"{old_file}\""),
            &format!("href=\"{new_file}\""),
        )
}

/// Maintains the link graph between notes.
#[derive(Debug)]
pub struct LinkEngine {
    attribute: String,
    extension: String,
    in_flight: HashSet<NoteId>,
}

impl LinkEngine {
    /// Engine recognizing anchors with `attribute` and note files with
    /// `extension`
    pub fn new(attribute: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            extension: extension.into(),
            in_flight: HashSet::new(),
        }
    }

    /// Marker attribute
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Note file extension
    pub fn extension(&self) -> &str {
        &self.extension
    }

    // ------------------------------------------------------------------
    // Re-entrancy guard
    // ------------------------------------------------------------------

    /// Mark a change of `note` as being processed.
    ///
    /// Returns `false` if one is already in flight, in which case the
    /// caller must not process this one.
    pub fn begin(&mut self, note: &NoteId) -> bool {
        let started = self.in_flight.insert(note.clone());
        if !started {
            log::debug!("Link update for '{}' already in flight, skipping", note);
        }
        started
    }

    /// Clear the in-flight marker of `note`
    pub fn finish(&mut self, note: &NoteId) {
        self.in_flight.remove(note);
    }

    /// Whether a change of `note` is in flight
    pub fn is_in_flight(&self, note: &NoteId) -> bool {
        self.in_flight.contains(note)
    }

    // ------------------------------------------------------------------
    // Graph maintenance
    // ------------------------------------------------------------------

    /// Notes of `notes` that `content` links to.
    ///
    /// Links to unknown notes are ignored; they may not be loaded yet.
    pub fn targets(&self, notes: &NoteMap, content: &str) -> IndexSet<NoteId> {
        extract_links(content, &self.attribute)
            .into_iter()
            .filter_map(|file_name| {
                let target = NoteId::from_file_name(&file_name, &self.extension)?;
                if notes.contains_key(&target) {
                    Some(target)
                } else {
                    log::debug!("Ignoring link to unknown note '{}'", file_name);
                    None
                }
            })
            .collect()
    }

    /// Bring the links of `note` from `old` content to `new` content.
    ///
    /// Targets linked in both versions are left alone.
    pub fn reconcile(
        &mut self,
        notes: &mut NoteMap,
        note: &NoteId,
        old: &str,
        new: &str,
    ) -> LinkChanges {
        let old_targets = self.targets(notes, old);
        let new_targets = self.targets(notes, new);
        let mut changes = LinkChanges::new();

        for target in old_targets.difference(&new_targets) {
            disconnect(notes, &mut changes, note, target);
        }
        for target in new_targets.difference(&old_targets) {
            connect(notes, &mut changes, note, target);
        }

        log::debug!(
            "Links of '{}': {} notes changed",
            note,
            changes.len()
        );
        changes
    }

    /// Connect a note that just became known: its own outgoing links and
    /// the links other loaded notes already have to it.
    pub fn attach(&mut self, notes: &mut NoteMap, note: &NoteId) -> LinkChanges {
        let mut changes = LinkChanges::new();
        let Some(content) = notes.get(note).map(|n| n.content().to_string()) else {
            return changes;
        };

        for target in self.targets(notes, &content) {
            connect(notes, &mut changes, note, &target);
        }

        let file_name = note.file_name(&self.extension);
        let sources: Vec<NoteId> = notes
            .values()
            .filter(|other| other.id() != note)
            .filter(|other| {
                extract_links(other.content(), &self.attribute).contains(&file_name)
            })
            .map(|other| other.id().clone())
            .collect();
        for source in sources {
            connect(notes, &mut changes, &source, note);
        }

        changes
    }

    /// Re-key `old` as `new` and compute the bodies of notes linking to it
    /// with their links pointed at the new file name.
    ///
    /// `candidates` are further notes whose stored text mentions the old
    /// file name. Returns the link changes and the rewritten bodies. The
    /// bodies are not applied here; the caller feeds them through task
    /// reconciliation like any other edit.
    pub fn rename(
        &mut self,
        notes: &mut NoteMap,
        old: &NoteId,
        new: &NoteId,
        candidates: &[NoteId],
    ) -> (LinkChanges, Vec<(NoteId, String)>) {
        let mut changes = LinkChanges::new();
        let Some(mut moved) = notes.shift_remove(old) else {
            return (changes, Vec::new());
        };

        moved.set_id(new.clone());
        for task in moved.metadata_mut().tasks_mut().values_mut() {
            task.set_note(new.clone());
        }
        notes.insert(new.clone(), moved);

        // Both sides of every link touching the note move at once.
        for other in notes.values_mut() {
            let id = other.id().clone();
            let metadata = other.metadata_mut();
            if replace_member(metadata.linked_notes_mut(), old, new) {
                let diff = changes.entry(id.clone()).or_default();
                diff.linked.removed.push(old.clone());
                diff.linked.added.push(new.clone());
            }
            if replace_member(metadata.linking_notes_mut(), old, new) {
                let diff = changes.entry(id).or_default();
                diff.linking.removed.push(old.clone());
                diff.linking.added.push(new.clone());
            }
        }

        let old_file = old.file_name(&self.extension);
        let new_file = new.file_name(&self.extension);
        let mut referencing: IndexSet<NoteId> = notes
            .get(new)
            .map(|n| n.metadata().linking_notes().clone())
            .unwrap_or_default();
        referencing.extend(
            candidates
                .iter()
                .map(|id| if id == old { new.clone() } else { id.clone() }),
        );

        let mut rewritten = Vec::new();
        for id in referencing {
            let Some(note) = notes.get(&id) else {
                continue;
            };
            let content = note.content();
            let updated = rewrite_links(content, &self.attribute, &old_file, &new_file);
            if updated != content {
                rewritten.push((id, updated));
            }
        }

        log::debug!(
            "Renamed '{}' to '{}', rewrote {} linking notes",
            old,
            new,
            rewritten.len()
        );
        (changes, rewritten)
    }

    /// Drop every link to and from `note`, which is about to disappear.
    pub fn remove(&mut self, notes: &mut NoteMap, note: &NoteId) -> LinkChanges {
        let mut changes = LinkChanges::new();
        let Some((linked, linking)) = notes.get(note).map(|n| {
            (
                n.metadata().linked_notes().clone(),
                n.metadata().linking_notes().clone(),
            )
        }) else {
            return changes;
        };

        for source in &linking {
            disconnect(notes, &mut changes, source, note);
        }
        for target in &linked {
            disconnect(notes, &mut changes, note, target);
        }
        self.in_flight.remove(note);
        changes
    }
}

/// Add the link `from → to` on both sides.
fn connect(notes: &mut NoteMap, changes: &mut LinkChanges, from: &NoteId, to: &NoteId) {
    if !notes.contains_key(to) {
        return;
    }
    let added = notes
        .get_mut(from)
        .is_some_and(|n| n.metadata_mut().linked_notes_mut().insert(to.clone()));
    if !added {
        return;
    }
    if let Some(target) = notes.get_mut(to) {
        target.metadata_mut().linking_notes_mut().insert(from.clone());
    }
    changes
        .entry(from.clone())
        .or_default()
        .linked
        .added
        .push(to.clone());
    changes
        .entry(to.clone())
        .or_default()
        .linking
        .added
        .push(from.clone());
}

/// Remove the link `from → to` on both sides.
fn disconnect(notes: &mut NoteMap, changes: &mut LinkChanges, from: &NoteId, to: &NoteId) {
    let removed = notes
        .get_mut(from)
        .is_some_and(|n| n.metadata_mut().linked_notes_mut().shift_remove(to));
    if !removed {
        return;
    }
    if let Some(target) = notes.get_mut(to) {
        target.metadata_mut().linking_notes_mut().shift_remove(from);
    }
    changes
        .entry(from.clone())
        .or_default()
        .linked
        .removed
        .push(to.clone());
    changes
        .entry(to.clone())
        .or_default()
        .linking
        .removed
        .push(from.clone());
}

/// Swap `old` for `new` in `set`, keeping its position.
fn replace_member(set: &mut IndexSet<NoteId>, old: &NoteId, new: &NoteId) -> bool {
    let Some(index) = set.get_index_of(old) else {
        return false;
    };
    set.shift_remove_index(index);
    let (moved_to, _) = set.insert_full(new.clone());
    if moved_to != index {
        set.move_index(moved_to, index.min(set.len() - 1));
    }
    true
}
