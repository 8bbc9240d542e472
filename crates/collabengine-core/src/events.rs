//! Typed event routing for engine notifications
//!
//! The [`EventRouter`] is the single dispatch path for everything the
//! engine announces: connection lifecycle, presence changes, inbound
//! document changes, and comment activity. Internal state updaters and
//! external subscribers go through the same mechanism, so there is one
//! fan-out path, not two.
//!
//! Listeners are invoked synchronously, in registration order. A
//! panicking listener is isolated: later listeners still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::types::{Comment, CommentId, CollaboratorInfo, CursorPosition, DocumentChange, UserId};

/// Notification emitted by the engine
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// The channel reached the Open state
    Connected,
    /// The channel dropped unexpectedly; reconnection is underway
    Disconnected,
    /// Reconnection attempts are exhausted; the engine is inert until
    /// manually reopened
    MaxReconnectsReached,
    /// A participant joined the document
    CollaboratorJoined(CollaboratorInfo),
    /// A participant left the document
    CollaboratorLeft(UserId),
    /// Another participant edited the document; the editing surface is
    /// responsible for applying the change
    DocumentChange(DocumentChange),
    /// A participant moved its caret
    CursorMove(CursorPosition),
    /// A participant changed its selection
    SelectionChange(CursorPosition),
    /// A participant added a comment
    CommentAdded(Comment),
    /// A top-level comment was resolved locally
    CommentResolved(CommentId),
}

impl CollabEvent {
    /// The subscription key for this event
    pub fn kind(&self) -> EventKind {
        match self {
            CollabEvent::Connected => EventKind::Connected,
            CollabEvent::Disconnected => EventKind::Disconnected,
            CollabEvent::MaxReconnectsReached => EventKind::MaxReconnectsReached,
            CollabEvent::CollaboratorJoined(_) => EventKind::CollaboratorJoined,
            CollabEvent::CollaboratorLeft(_) => EventKind::CollaboratorLeft,
            CollabEvent::DocumentChange(_) => EventKind::DocumentChange,
            CollabEvent::CursorMove(_) => EventKind::CursorMove,
            CollabEvent::SelectionChange(_) => EventKind::SelectionChange,
            CollabEvent::CommentAdded(_) => EventKind::CommentAdded,
            CollabEvent::CommentResolved(_) => EventKind::CommentResolved,
        }
    }
}

/// Subscription key, one per [`CollabEvent`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    MaxReconnectsReached,
    CollaboratorJoined,
    CollaboratorLeft,
    DocumentChange,
    CursorMove,
    SelectionChange,
    CommentAdded,
    CommentResolved,
}

/// Handle returned by [`EventRouter::on`], used to unsubscribe
///
/// Closures have no usable identity in Rust, so removal goes through
/// this handle instead of removal-by-callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A registered callback
pub type Listener = Arc<dyn Fn(&CollabEvent) + Send + Sync>;

/// Per-engine dispatch table from event kind to ordered listeners
pub struct EventRouter {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl EventRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }

    /// Append a listener for an event kind
    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove a listener by handle
    ///
    /// Returns `false` if no such listener is registered.
    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        match self.listeners.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(lid, _)| *lid != id);
                list.len() != before
            }
            None => false,
        }
    }

    /// Snapshot the current listeners for a kind, in registration order
    ///
    /// The engine dispatches from a snapshot taken outside its state
    /// lock so listeners may call back into the engine.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Invoke all listeners for the event synchronously, in order
    pub fn emit(&self, event: &CollabEvent) {
        dispatch(&self.snapshot(event.kind()), event);
    }

    /// Drop every registered listener
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Number of listeners registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(|l| l.len()).unwrap_or(0)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke a listener snapshot, isolating per-listener panics
pub fn dispatch(listeners: &[Listener], event: &CollabEvent) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            warn!(kind = ?event.kind(), "event listener panicked");
        }
    }
}
