//! Integration tests for a notebook session

use std::path::Path;
use std::sync::{Arc, Mutex};

use notes_core::config::Config;
use notes_core::events::NoteEvent;
use notes_core::link::note_link_html;
use notes_core::metadata::AppVersion;
use notes_core::note::NoteId;
use notes_core::notebook::{FileChangeKind, Notebook};
use notes_core::source::{InMemoryNoteSource, NoteSource};
use notes_core::tags::{TagRef, TagTree};

const OPEN: &str = r#"<input type="checkbox" />"#;

type TestNotebook = Notebook<InMemoryNoteSource, TagTree>;

fn setup() -> (InMemoryNoteSource, TestNotebook, Arc<Mutex<Vec<NoteEvent>>>) {
    let source = InMemoryNoteSource::new();
    let mut config = Config::new("alice");
    config.line_separator = "\n".to_string();
    let notebook = Notebook::new(config, source.clone(), TagTree::new().with_tag("work/urgent"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    notebook.events().subscribe(Arc::new(move |event: &NoteEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    (source, notebook, events)
}

fn link(id: &NoteId) -> String {
    note_link_html(id, "htm", "data-note-link", &id.name)
}

/// Save through the notebook and write the text like a host would,
/// including the watcher echo.
fn save(notebook: &mut TestNotebook, source: &InMemoryNoteSource, id: &NoteId) {
    let text = notebook.save_note(id).unwrap();
    source.write_note(id.clone(), &text);
    let path = format!("/notes/{}", id.file_name("htm"));
    notebook
        .file_changed(FileChangeKind::Modified, Path::new(&path))
        .unwrap();
}

fn assert_links_symmetric(notebook: &TestNotebook) {
    for a in notebook.notes() {
        for b in notebook.notes() {
            assert_eq!(
                a.metadata().linked_notes().contains(b.id()),
                b.metadata().linking_notes().contains(a.id()),
                "link {} -> {}",
                a.id(),
                b.id()
            );
        }
    }
}

#[test]
fn test_session_end_to_end() {
    let (source, mut notebook, events) = setup();
    let plan = NoteId::new("Work", "Plan");
    let inbox = NoteId::new("", "Inbox");

    let text = notebook
        .create_note(&plan, &format!("<p>{OPEN} draft\n{OPEN} review</p>"))
        .unwrap();
    source.write_note(plan.clone(), &text);
    let text = notebook
        .create_note(&inbox, &format!("<p>see {}</p>", link(&plan)))
        .unwrap();
    source.write_note(inbox.clone(), &text);

    assert_eq!(notebook.tasks(&plan).unwrap().len(), 2);
    assert!(
        notebook
            .note(&plan)
            .unwrap()
            .metadata()
            .linking_notes()
            .contains(&inbox)
    );
    assert_links_symmetric(&notebook);

    // Tick the second task, then insert a new one in front of both.
    let ids: Vec<_> = notebook.tasks(&plan).unwrap().keys().copied().collect();
    notebook.set_task_completed(&plan, ids[1], true).unwrap();
    let body = notebook.note(&plan).unwrap().content().to_string();
    notebook
        .editor_changed(&plan, &body.replacen("<p>", &format!("<p>{OPEN} plan\n"), 1))
        .unwrap();

    let tasks = notebook.tasks(&plan).unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.contains_key(&ids[0]) && tasks.contains_key(&ids[1]));
    assert!(tasks[&ids[1]].is_completed());
    assert_eq!(tasks[&ids[1]].description(), " review");
    assert!(notebook.note(&plan).unwrap().has_unsaved_changes());

    save(&mut notebook, &source, &plan);
    assert!(!notebook.note(&plan).unwrap().has_unsaved_changes());
    assert!(!notebook.is_write_in_progress(&plan));

    let stored = source.read_note(&plan).unwrap();
    assert!(stored.starts_with("<!-- "));
    assert!(stored.contains("checked=\"checked\""));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e, NoteEvent::NoteAdded { note } if *note == inbox)));
    assert!(events.iter().any(|e| matches!(e, NoteEvent::LinksChanged { note, .. } if *note == plan)));
}

#[test]
fn test_metadata_survives_reload() {
    let (source, mut notebook, _) = setup();
    let id = NoteId::new("", "Tagged");
    notebook.create_note(&id, "<p>x</p>").unwrap();

    let metadata = notebook.metadata_mut(&id).unwrap();
    metadata.add_tag(TagRef::new("work/urgent"));
    metadata.add_attachment("scan.png");
    save(&mut notebook, &source, &id);

    let text = source.read_note(&id).unwrap();
    let reader = InMemoryNoteSource::new().with_note(id.clone(), &text);
    let mut fresh = Notebook::new(
        Config::new("bob"),
        reader,
        TagTree::new().with_tag("work/urgent"),
    );
    let note = fresh.load_note(&id).unwrap();
    let metadata = note.metadata();

    assert_eq!(note.content(), "<p>x</p>");
    assert!(metadata.tags().contains(&TagRef::new("work/urgent")));
    assert!(metadata.attachments().contains("scan.png"));
    assert_eq!(metadata.charset(), "UTF-8");
    assert_eq!(metadata.app_version(), Some(AppVersion::CURRENT));
    assert_eq!(metadata.versions().len(), 1);
    assert_eq!(metadata.versions()[0].author, "alice");
}

#[test]
fn test_large_metadata_is_compressed_and_read_back() {
    let (source, mut notebook, _) = setup();
    let id = NoteId::new("", "Many");
    notebook.create_note(&id, "").unwrap();

    let metadata = notebook.metadata_mut(&id).unwrap();
    for i in 0..40 {
        metadata.add_attachment(&format!("scanned-page-{i:03}.png"));
    }
    save(&mut notebook, &source, &id);

    let stored = source.read_note(&id).unwrap();
    assert!(stored.starts_with("<!-- data=\""));

    let reader = InMemoryNoteSource::new().with_note(id.clone(), &stored);
    let mut fresh = Notebook::new(Config::new("bob"), reader, TagTree::new());
    let note = fresh.load_note(&id).unwrap();
    assert_eq!(note.metadata().attachments().len(), 40);
}

#[test]
fn test_rename_rewrites_and_echoes_are_swallowed() {
    let (source, mut notebook, _) = setup();
    let target = NoteId::new("", "Target");
    let a = NoteId::new("", "A");
    let b = NoteId::new("Other", "B");

    for (id, body) in [
        (&target, "<p>target</p>".to_string()),
        (&a, format!("<p>{}</p>", link(&target))),
        (&b, format!("<p>{} twice {}</p>", link(&target), link(&target))),
    ] {
        let text = notebook.create_note(id, &body).unwrap();
        source.write_note(id.clone(), &text);
        notebook
            .file_changed(FileChangeKind::Created, Path::new(&id.file_name("htm")))
            .unwrap();
    }

    let moved = NoteId::new("Archive", "Target");
    let mut rewritten = notebook.move_note(&target, "Archive").unwrap();
    rewritten.sort();
    assert_eq!(rewritten, vec![a.clone(), b.clone()]);

    for id in &rewritten {
        let content = notebook.note(id).unwrap().content().to_string();
        assert!(!content.contains("\"Target.htm\""));
        assert!(content.contains("\"[Archive] Target.htm\""));
        save(&mut notebook, &source, id);
    }

    // The host moves the file; both watcher events are echoes of that.
    let text = source.remove_note(&target).unwrap();
    source.write_note(moved.clone(), &text);
    notebook
        .file_changed(FileChangeKind::Deleted, Path::new("Target.htm"))
        .unwrap();
    notebook
        .file_changed(FileChangeKind::Created, Path::new("[Archive] Target.htm"))
        .unwrap();

    let linking = notebook.note(&moved).unwrap().metadata().linking_notes().clone();
    assert_eq!(linking.len(), 2);
    assert_links_symmetric(&notebook);
}

#[test]
fn test_delete_invalidates_links() {
    let (source, mut notebook, events) = setup();
    let a = NoteId::new("", "A");
    let b = NoteId::new("", "B");
    notebook.create_note(&b, "<p>b</p>").unwrap();
    notebook.create_note(&a, &link(&b)).unwrap();
    events.lock().unwrap().clear();

    source.remove_note(&b);
    notebook
        .file_changed(FileChangeKind::Deleted, Path::new("B.htm"))
        .unwrap();

    assert!(notebook.note(&b).is_none());
    assert!(notebook.note(&a).unwrap().metadata().linked_notes().is_empty());
    assert_links_symmetric(&notebook);

    let events = events.lock().unwrap();
    assert!(matches!(&events[0], NoteEvent::NoteRemoved { note } if *note == b));
    assert!(events.iter().all(|e| !matches!(e, NoteEvent::LinksChanged { note, .. } if *note == b)));
}

#[test]
fn test_external_edit_reconciles_tasks() {
    let (source, mut notebook, events) = setup();
    let id = NoteId::new("", "Todo");
    source.write_note(id.clone(), &format!("{OPEN} one\n{OPEN} two\n"));
    notebook.load_all().unwrap();
    let first = *notebook.tasks(&id).unwrap().keys().next().unwrap();

    source.write_note(id.clone(), &format!("{OPEN} one\n"));
    notebook
        .file_changed(FileChangeKind::Modified, Path::new("Todo.htm"))
        .unwrap();

    let tasks = notebook.tasks(&id).unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks.contains_key(&first));

    let events = events.lock().unwrap();
    let removed: usize = events
        .iter()
        .filter_map(|e| match e {
            NoteEvent::TasksChanged { diff, .. } => Some(diff.removed.len()),
            _ => None,
        })
        .sum();
    assert_eq!(removed, 1);
}

#[test]
fn test_tasks_keep_ids_after_rename_rewrites_links() {
    let (source, mut notebook, events) = setup();
    let a = NoteId::new("", "A");
    let b = NoteId::new("", "B");

    let text = notebook.create_note(&b, "<p>b</p>").unwrap();
    source.write_note(b.clone(), &text);
    let body = format!("{}\n{OPEN} task\n<p>end</p>", link(&b));
    let text = notebook.create_note(&a, &body).unwrap();
    source.write_note(a.clone(), &text);

    let before: Vec<_> = notebook.tasks(&a).unwrap().keys().copied().collect();
    assert_eq!(before.len(), 1);
    events.lock().unwrap().clear();

    let rewritten = notebook.move_note(&b, "Archive").unwrap();
    assert_eq!(rewritten, vec![a.clone()]);

    let content = notebook.note(&a).unwrap().content().to_string();
    assert!(content.contains("[Archive] B.htm"));
    let offset = notebook.tasks(&a).unwrap()[&before[0]].offset();
    assert!(content[offset..].starts_with(OPEN));

    notebook
        .editor_changed(&a, &format!("{content} more"))
        .unwrap();
    let after: Vec<_> = notebook.tasks(&a).unwrap().keys().copied().collect();
    assert_eq!(after, before);

    notebook.set_task_completed(&a, before[0], true).unwrap();
    assert!(notebook.tasks(&a).unwrap()[&before[0]].is_completed());

    let events = events.lock().unwrap();
    let task_events: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            NoteEvent::TasksChanged { diff, .. } => Some(diff),
            _ => None,
        })
        .collect();
    assert_eq!(task_events.len(), 1);
    assert!(task_events[0].added.is_empty() && task_events[0].removed.is_empty());
    assert_eq!(task_events[0].updated.len(), 1);
}
