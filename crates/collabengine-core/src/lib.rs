//! CollabEngine Core Library
//!
//! Client-side real-time collaboration over a persistent message channel.
//!
//! ## Overview
//!
//! CollabEngine keeps one document editing session synchronized across
//! participants: who is present, where their cursors are, what they
//! changed, and what they commented. It is a relay and bookkeeper, not
//! an editor - changes are broadcast and recorded, never merged or
//! applied to document text. Conflict resolution belongs to the editing
//! surface or an external OT/CRDT layer.
//!
//! ## Core Principles
//!
//! - **One engine per session**: each instance owns the state for one
//!   (document, user) pair; nothing is global
//! - **Pluggable transport**: any endpoint behind the [`Connector`]
//!   trait; the engine assumes only FIFO delivery per connection
//! - **Self-healing**: a dropped connection is retried with exponential
//!   backoff, bounded by [`ReconnectPolicy`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use collabengine_core::{
//!     ChangeOp, CollabEngine, CollaboratorInfo, DocumentId, EventKind, UserId,
//! };
//!
//! let identity = CollaboratorInfo::new(UserId::new("alice"), "Alice");
//! let engine = CollabEngine::new(DocumentId::new("design-doc"), identity, connector);
//!
//! engine.on(EventKind::DocumentChange, |event| {
//!     // hand the inbound change to the editing surface
//! });
//!
//! engine.send_document_change(ChangeOp::Insert { content: "hi".into() }, 0);
//! ```

pub mod channel;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod ledger;
pub mod presence;
pub mod reconnect;
pub mod transport;
pub mod types;

// Re-exports
pub use channel::{ChannelSender, TransportChannel};
pub use config::EngineConfig;
pub use engine::CollabEngine;
pub use envelope::{Envelope, EnvelopePayload};
pub use error::{CollabError, CollabResult};
pub use events::{CollabEvent, EventKind, EventRouter, Listener, ListenerId};
pub use ledger::Ledger;
pub use presence::PresenceRegistry;
pub use reconnect::{ConnectionState, ReconnectPolicy};
pub use transport::{Connector, MemoryConnector, MemoryHub, TransportLink};
pub use types::*;
