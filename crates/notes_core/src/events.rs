//! Typed change notifications and the subscription registry.
//!
//! Reconciliation never relies on collection side effects to tell the UI
//! what happened. Every operation that changes derived state returns or
//! emits a [`NoteEvent`] carrying an explicit diff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::note::NoteId;
use crate::task::Task;

/// Items added to, removed from and updated in place within a set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetDiff<T> {
    /// Newly created items
    pub added: Vec<T>,
    /// Items that disappeared
    pub removed: Vec<T>,
    /// Items that persisted with changed fields
    pub updated: Vec<T>,
}

impl<T> Default for SetDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> SetDiff<T> {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Total number of changes
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

/// Changes to one note's outgoing and incoming links.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkDiff {
    /// Changes to the notes this note links to
    pub linked: SetDiff<NoteId>,
    /// Changes to the notes linking to this note
    pub linking: SetDiff<NoteId>,
}

impl LinkDiff {
    /// Whether neither side changed
    pub fn is_empty(&self) -> bool {
        self.linked.is_empty() && self.linking.is_empty()
    }
}

/// Events emitted by a [`Notebook`](crate::notebook::Notebook).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NoteEvent {
    /// A note became known to the notebook.
    NoteAdded {
        /// The new note
        note: NoteId,
    },

    /// A note was deleted.
    NoteRemoved {
        /// The deleted note
        note: NoteId,
    },

    /// A note was renamed or moved to another group.
    NoteRenamed {
        /// Identity before the change
        old: NoteId,
        /// Identity after the change
        new: NoteId,
    },

    /// The task set of a note changed.
    TasksChanged {
        /// Owning note
        note: NoteId,
        /// Task snapshots
        diff: SetDiff<Task>,
    },

    /// The link sets of a note changed.
    LinksChanged {
        /// Note whose sets changed
        note: NoteId,
        /// Link changes
        diff: LinkDiff,
    },
}

impl NoteEvent {
    /// JSON form of the event, for UI bridges
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type for note events.
///
/// Callbacks receive a reference to the event and should not block for extended periods.
pub type EventCallback = Arc<dyn Fn(&NoteEvent) + Send + Sync>;

/// Thread-safe registry of event subscriptions.
pub struct EventRegistry {
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to note events.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.insert(id, callback);
        id
    }

    /// Unsubscribe from note events.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.remove(&id).is_some()
    }

    /// Emit an event to all registered callbacks.
    ///
    /// Callbacks are invoked synchronously in an undefined order.
    /// If a callback panics, it does not affect other callbacks.
    pub fn emit(&self, event: &NoteEvent) {
        let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
        for callback in callbacks.values() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
