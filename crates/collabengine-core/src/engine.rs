//! Main CollabEngine - the primary entry point for the collaboration engine
//!
//! One engine instance owns the state for one (document, user) session:
//! the transport channel, the presence roster, the change/comment
//! ledger, and the listener table. Nothing is shared across documents or
//! across instances; multiple logical participants in one process need
//! one engine each.
//!
//! A background supervision task drives the connection: it dials the
//! endpoint, announces presence, pumps inbound envelopes into the event
//! router, keeps the link alive with heartbeats, and retries with
//! exponential backoff when the link drops. Callers interact with the
//! engine synchronously; their sends only enqueue on the outbound
//! channel.
//!
//! # Example
//!
//! ```ignore
//! use collabengine_core::{ChangeOp, CollabEngine, CollaboratorInfo, DocumentId, EventKind, UserId};
//!
//! let identity = CollaboratorInfo::new(UserId::new("alice"), "Alice");
//! let engine = CollabEngine::new(DocumentId::new("doc-1"), identity, connector);
//!
//! engine.on(EventKind::DocumentChange, |event| {
//!     // hand the change to the editing surface
//! });
//!
//! engine.send_document_change(
//!     ChangeOp::Insert { content: "hi".into() },
//!     0,
//! );
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelSender, TransportChannel};
use crate::config::EngineConfig;
use crate::envelope::{Envelope, EnvelopePayload};
use crate::events::{self, CollabEvent, EventKind, EventRouter, ListenerId};
use crate::ledger::Ledger;
use crate::presence::PresenceRegistry;
use crate::reconnect::ConnectionState;
use crate::transport::Connector;
use crate::types::{
    ChangeOp, CollaboratorInfo, Comment, CommentId, CursorPosition, DocumentChange, DocumentId,
    SelectionRange, UserId,
};

/// Mutable engine state shared with the supervision task
struct EngineShared {
    state: ConnectionState,
    /// Consecutive failed connection attempts
    attempts: u32,
    /// Sending half of the current link, while Open
    sender: Option<ChannelSender>,
    presence: PresenceRegistry,
    ledger: Ledger,
    /// Set by `disconnect()`; the engine is inert afterwards
    shutdown: bool,
}

impl EngineShared {
    /// Transmit if the channel is open; silent drop otherwise
    fn transmit(&self, envelope: &Envelope) {
        match &self.sender {
            Some(sender) => sender.send(envelope),
            None => debug!(kind = envelope.kind(), "channel closed, envelope dropped"),
        }
    }
}

/// Everything the supervision task needs, cloneable for restarts
#[derive(Clone)]
struct SupervisorCtx {
    document_id: DocumentId,
    local: CollaboratorInfo,
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Mutex<EngineShared>>,
    router: Arc<Mutex<EventRouter>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SupervisorCtx {
    fn set_state(&self, state: ConnectionState) {
        self.shared.lock().state = state;
    }

    /// Dispatch an event from a listener snapshot taken outside the
    /// state lock, so listeners may call back into the engine
    fn emit(&self, event: CollabEvent) {
        let snapshot = self.router.lock().snapshot(event.kind());
        events::dispatch(&snapshot, &event);
    }

    /// Route one inbound envelope into presence, ledger, and listeners
    fn process_envelope(&self, envelope: Envelope) {
        if envelope.document_id != self.document_id {
            warn!(document_id = %envelope.document_id, "envelope for wrong document, dropped");
            return;
        }
        let event = {
            let mut shared = self.shared.lock();
            match envelope.payload {
                EnvelopePayload::ParticipantJoined { participant } => {
                    Some(shared.presence.apply_join(participant))
                }
                EnvelopePayload::ParticipantLeft => {
                    Some(shared.presence.apply_leave(&envelope.origin_user_id))
                }
                EnvelopePayload::CursorMoved { cursor } => {
                    Some(shared.presence.apply_cursor(cursor, false))
                }
                EnvelopePayload::SelectionChanged { cursor } => {
                    Some(shared.presence.apply_cursor(cursor, true))
                }
                EnvelopePayload::DocumentChanged { change } => {
                    shared.ledger.apply_remote_change(change)
                }
                EnvelopePayload::CommentAdded { comment, parent_id } => {
                    shared.ledger.apply_remote_comment(comment, parent_id.as_ref())
                }
                EnvelopePayload::Heartbeat => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }
}

/// Client-side real-time collaboration engine for one document session
///
/// Constructing an engine starts connecting immediately; must be called
/// from within a tokio runtime.
pub struct CollabEngine {
    ctx: SupervisorCtx,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl CollabEngine {
    /// Create an engine for a (document, user) pair and start connecting
    pub fn new(
        document_id: DocumentId,
        identity: CollaboratorInfo,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::with_config(document_id, identity, connector, EngineConfig::default())
    }

    /// Create an engine with explicit configuration
    pub fn with_config(
        document_id: DocumentId,
        identity: CollaboratorInfo,
        connector: Arc<dyn Connector>,
        config: EngineConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Mutex::new(EngineShared {
            state: ConnectionState::Idle,
            attempts: 0,
            sender: None,
            presence: PresenceRegistry::new(config.liveness_window),
            ledger: Ledger::new(identity.user_id.clone()),
            shutdown: false,
        }));
        let ctx = SupervisorCtx {
            document_id,
            local: identity,
            config,
            connector,
            shared,
            router: Arc::new(Mutex::new(EventRouter::new())),
            shutdown_rx,
        };
        let engine = Self {
            ctx,
            supervisor: Mutex::new(None),
            shutdown_tx,
        };
        engine.open();
        engine
    }

    /// The document this engine is bound to
    pub fn document_id(&self) -> &DocumentId {
        &self.ctx.document_id
    }

    /// The local identity this engine stamps outbound envelopes with
    pub fn user_id(&self) -> &UserId {
        &self.ctx.local.user_id
    }

    /// Register a listener for an event kind
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&CollabEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.ctx.router.lock().on(kind, Arc::new(listener))
    }

    /// Remove a listener by handle
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.ctx.router.lock().off(kind, id)
    }

    /// Stamp, record, and broadcast a local document edit
    ///
    /// The completed change is returned to the caller. While the
    /// channel is not open the broadcast is dropped, not queued; edits
    /// made offline are lost.
    pub fn send_document_change(&self, op: ChangeOp, position: usize) -> DocumentChange {
        let mut shared = self.ctx.shared.lock();
        let change = shared.ledger.record_local_change(op, position);
        shared.transmit(&Envelope::new(
            self.ctx.local.user_id.clone(),
            self.ctx.document_id.clone(),
            EnvelopePayload::DocumentChanged {
                change: change.clone(),
            },
        ));
        change
    }

    /// Broadcast the local caret position
    pub fn send_cursor_position(&self, position: usize, selection: Option<SelectionRange>) {
        let mut cursor = CursorPosition::new(self.ctx.local.user_id.clone(), position);
        cursor.selection = selection;
        self.ctx.shared.lock().transmit(&Envelope::new(
            self.ctx.local.user_id.clone(),
            self.ctx.document_id.clone(),
            EnvelopePayload::CursorMoved { cursor },
        ));
    }

    /// Broadcast a local selection change
    pub fn send_selection_change(&self, start: usize, end: usize) {
        let cursor =
            CursorPosition::new(self.ctx.local.user_id.clone(), start).with_selection(start, end);
        self.ctx.shared.lock().transmit(&Envelope::new(
            self.ctx.local.user_id.clone(),
            self.ctx.document_id.clone(),
            EnvelopePayload::SelectionChanged { cursor },
        ));
    }

    /// Add a comment, top-level or as a reply to a top-level comment
    ///
    /// Returns the new comment's id, or `None` if `parent_id` matched
    /// no top-level comment (the comment is silently dropped, matching
    /// the source system).
    pub fn add_comment(
        &self,
        content: impl Into<String>,
        position: usize,
        parent_id: Option<&CommentId>,
    ) -> Option<CommentId> {
        let mut shared = self.ctx.shared.lock();
        let comment = shared.ledger.add_local_comment(content, position, parent_id)?;
        let id = comment.id.clone();
        shared.transmit(&Envelope::new(
            self.ctx.local.user_id.clone(),
            self.ctx.document_id.clone(),
            EnvelopePayload::CommentAdded {
                comment,
                parent_id: parent_id.cloned(),
            },
        ));
        Some(id)
    }

    /// Resolve a top-level comment
    ///
    /// Replies cannot be resolved. Resolution is local-only and
    /// terminal; returns whether a comment was found and resolved.
    pub fn resolve_comment(&self, id: &CommentId) -> bool {
        let resolved = self.ctx.shared.lock().ledger.resolve_comment(id);
        if resolved {
            self.ctx.emit(CollabEvent::CommentResolved(id.clone()));
        }
        resolved
    }

    /// Every known participant, active or not
    pub fn collaborators(&self) -> Vec<CollaboratorInfo> {
        self.ctx.shared.lock().presence.collaborators()
    }

    /// Participants flagged active and seen within the liveness window
    pub fn active_collaborators(&self) -> Vec<CollaboratorInfo> {
        self.ctx.shared.lock().presence.active_collaborators()
    }

    /// Top-level comments, ordered by timestamp
    pub fn comments(&self) -> Vec<Comment> {
        self.ctx.shared.lock().ledger.comments()
    }

    /// Top-level comments anchored within `position ± range`
    pub fn comments_at_position(&self, position: usize, range: usize) -> Vec<Comment> {
        self.ctx.shared.lock().ledger.comments_at_position(position, range)
    }

    /// Every change recorded this session, in arrival order
    pub fn changes(&self) -> Vec<DocumentChange> {
        self.ctx.shared.lock().ledger.changes().to_vec()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.shared.lock().state
    }

    /// Whether the channel is currently Open
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    /// Consecutive failed connection attempts; 0 while Open
    pub fn reconnect_attempts(&self) -> u32 {
        self.ctx.shared.lock().attempts
    }

    /// Start (or restart after Failed) the connection cycle
    ///
    /// No-op while the supervision task is running, and after
    /// `disconnect()` - a torn-down engine cannot rejoin.
    pub fn open(&self) {
        let mut supervisor = self.supervisor.lock();
        if self.ctx.shared.lock().shutdown {
            warn!(document_id = %self.ctx.document_id, "engine was torn down, cannot reopen");
            return;
        }
        if let Some(handle) = supervisor.as_ref() {
            if !handle.is_finished() {
                debug!(document_id = %self.ctx.document_id, "supervision task already running");
                return;
            }
        }
        self.ctx.shared.lock().state = ConnectionState::Connecting;
        *supervisor = Some(tokio::spawn(Self::supervision_loop(self.ctx.clone())));
    }

    /// Tear the engine down
    ///
    /// Announces departure, stops the heartbeat and supervision task,
    /// closes the channel, and clears presence, ledger, and listeners.
    /// This is a hard reset: a new engine instance is required to
    /// rejoin the document.
    pub fn disconnect(&self) {
        info!(document_id = %self.ctx.document_id, "disconnecting");
        {
            let mut shared = self.ctx.shared.lock();
            shared.shutdown = true;
            shared.state = ConnectionState::Idle;
            shared.sender = None;
            shared.presence.clear();
            shared.ledger.clear();
        }
        // The supervision task sends the leave envelope and closes the
        // channel when it observes the signal.
        let _ = self.shutdown_tx.send(true);
        self.ctx.router.lock().clear();
    }

    /// Background task: dial, pump envelopes, heartbeat, and retry with
    /// exponential backoff until attempts are exhausted or the engine
    /// shuts down
    async fn supervision_loop(ctx: SupervisorCtx) {
        let mut shutdown_rx = ctx.shutdown_rx.clone();
        let policy = ctx.config.reconnect;
        let mut attempt: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                return;
            }
            ctx.set_state(ConnectionState::Connecting);
            let mut channel = TransportChannel::new(
                ctx.document_id.clone(),
                ctx.local.clone(),
                ctx.connector.clone(),
            );

            // The shutdown branch also fires if the engine is dropped,
            // which closes the watch channel.
            let dial = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    ctx.set_state(ConnectionState::Idle);
                    return;
                }
                result = channel.open() => result,
            };

            match dial {
                Ok(()) => {
                    attempt = 0;
                    let sender = match channel.sender() {
                        Some(sender) => sender,
                        None => continue,
                    };
                    {
                        let mut shared = ctx.shared.lock();
                        shared.state = ConnectionState::Open;
                        shared.attempts = 0;
                        shared.sender = Some(sender.clone());
                    }
                    info!(document_id = %ctx.document_id, "connected");
                    ctx.emit(CollabEvent::Connected);

                    let first_tick = tokio::time::Instant::now() + ctx.config.heartbeat_interval;
                    let mut heartbeat =
                        tokio::time::interval_at(first_tick, ctx.config.heartbeat_interval);

                    let closed_unexpectedly = loop {
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => break false,
                            envelope = channel.recv() => match envelope {
                                Some(envelope) => ctx.process_envelope(envelope),
                                None => break true,
                            },
                            _ = heartbeat.tick() => {
                                debug!(document_id = %ctx.document_id, "sending heartbeat");
                                sender.send(&Envelope::new(
                                    ctx.local.user_id.clone(),
                                    ctx.document_id.clone(),
                                    EnvelopePayload::Heartbeat,
                                ));
                            }
                        }
                    };

                    if !closed_unexpectedly {
                        // Deliberate teardown: announce departure first
                        channel.shutdown();
                        let mut shared = ctx.shared.lock();
                        shared.sender = None;
                        shared.state = ConnectionState::Idle;
                        return;
                    }

                    warn!(document_id = %ctx.document_id, "connection closed unexpectedly");
                    ctx.shared.lock().sender = None;
                    ctx.set_state(ConnectionState::Reconnecting);
                    ctx.emit(CollabEvent::Disconnected);
                }
                Err(e) => {
                    warn!(document_id = %ctx.document_id, error = %e, "connect attempt failed");
                }
            }

            attempt += 1;
            ctx.shared.lock().attempts = attempt;
            if policy.exhausted(attempt) {
                ctx.set_state(ConnectionState::Failed);
                info!(document_id = %ctx.document_id, attempt, "max reconnect attempts reached");
                ctx.emit(CollabEvent::MaxReconnectsReached);
                return;
            }

            let delay = policy.delay_for(attempt);
            ctx.set_state(ConnectionState::Reconnecting);
            debug!(document_id = %ctx.document_id, attempt, ?delay, "scheduling reconnect");
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    ctx.set_state(ConnectionState::Idle);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryHub;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity(id: &str) -> CollaboratorInfo {
        CollaboratorInfo::new(UserId::new(id), id.to_string())
    }

    async fn settle() {
        // Let the supervision and hub tasks run
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_engine_connects_and_reports_state() {
        let hub = MemoryHub::new();
        let engine = CollabEngine::new(
            DocumentId::new("doc-1"),
            identity("alice"),
            Arc::new(hub.connector()),
        );

        settle().await;
        assert!(engine.is_connected());
        assert_eq!(engine.connection_state(), ConnectionState::Open);
        assert_eq!(engine.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let hub = MemoryHub::new();
        hub.refuse_next(100);
        let engine = CollabEngine::new(
            DocumentId::new("doc-1"),
            identity("alice"),
            Arc::new(hub.connector()),
        );
        settle().await;

        // Dropped, not queued; the change is still recorded locally
        let change = engine.send_document_change(
            ChangeOp::Insert {
                content: "lost".to_string(),
            },
            0,
        );
        assert_eq!(change.user_id, UserId::new("alice"));
        assert_eq!(engine.changes().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_comment_emits_event() {
        let hub = MemoryHub::new();
        let engine = CollabEngine::new(
            DocumentId::new("doc-1"),
            identity("alice"),
            Arc::new(hub.connector()),
        );
        settle().await;

        let resolved_count = Arc::new(AtomicUsize::new(0));
        let counter = resolved_count.clone();
        engine.on(EventKind::CommentResolved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = engine.add_comment("needs a citation", 7, None).unwrap();
        assert!(engine.resolve_comment(&id));
        assert_eq!(resolved_count.load(Ordering::SeqCst), 1);

        // Terminal and idempotent: resolving again still succeeds
        assert!(engine.resolve_comment(&id));
        let missing = CommentId::new();
        assert!(!engine.resolve_comment(&missing));
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let hub = MemoryHub::new();
        let engine = CollabEngine::new(
            DocumentId::new("doc-1"),
            identity("alice"),
            Arc::new(hub.connector()),
        );
        settle().await;

        engine.add_comment("a comment", 0, None);
        engine.disconnect();
        settle().await;

        assert_eq!(engine.connection_state(), ConnectionState::Idle);
        assert!(!engine.is_connected());
        assert!(engine.comments().is_empty());
        assert!(engine.collaborators().is_empty());

        // A torn-down engine cannot rejoin
        engine.open();
        settle().await;
        assert_eq!(engine.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_listener_handle_unsubscribes() {
        let hub = MemoryHub::new();
        let engine = CollabEngine::new(
            DocumentId::new("doc-1"),
            identity("alice"),
            Arc::new(hub.connector()),
        );
        settle().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = engine.on(EventKind::CommentResolved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(engine.off(EventKind::CommentResolved, id));

        let comment = engine.add_comment("quiet", 0, None).unwrap();
        engine.resolve_comment(&comment);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
