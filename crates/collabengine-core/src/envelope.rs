//! Wire envelopes exchanged over the collaboration channel
//!
//! An [`Envelope`] is the unit exchanged with the collaboration
//! endpoint: one JSON object per logical message, carrying the origin
//! user, document, a sender-local timestamp, and a kind-tagged payload.
//!
//! Timestamps come from the sender's clock; there is no global ordering
//! across clients. Envelopes are immutable once sent.
//!
//! ## Wire format
//!
//! ```json
//! {
//!   "kind": "document-changed",
//!   "origin_user_id": "alice",
//!   "document_id": "doc-1",
//!   "timestamp": 1705123456789,
//!   "change": { "id": "...", "op": "insert", "content": "hi", ... }
//! }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CollabError, CollabResult};
use crate::types::{
    now_ms, CollaboratorInfo, Comment, CommentId, CursorPosition, DocumentChange, DocumentId,
    UserId,
};

/// Kind-tagged payload of an envelope
///
/// The `kind` tag on the wire matches the variant name in kebab-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EnvelopePayload {
    /// A participant announced itself on the document
    ParticipantJoined {
        /// Identity of the joining participant
        participant: CollaboratorInfo,
    },
    /// A participant deliberately left the document
    ParticipantLeft,
    /// A participant edited the document
    DocumentChanged {
        /// The edit operation
        change: DocumentChange,
    },
    /// A participant moved its caret
    CursorMoved {
        /// The new cursor state
        cursor: CursorPosition,
    },
    /// A participant changed its selection
    SelectionChanged {
        /// The new cursor state including the selection
        cursor: CursorPosition,
    },
    /// A participant added a comment
    CommentAdded {
        /// The comment
        comment: Comment,
        /// Top-level parent if the comment is a reply
        parent_id: Option<CommentId>,
    },
    /// Keep-alive ping; lets the remote side detect silent failure
    Heartbeat,
}

impl EnvelopePayload {
    /// Wire name of this payload kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopePayload::ParticipantJoined { .. } => "participant-joined",
            EnvelopePayload::ParticipantLeft => "participant-left",
            EnvelopePayload::DocumentChanged { .. } => "document-changed",
            EnvelopePayload::CursorMoved { .. } => "cursor-moved",
            EnvelopePayload::SelectionChanged { .. } => "selection-changed",
            EnvelopePayload::CommentAdded { .. } => "comment-added",
            EnvelopePayload::Heartbeat => "heartbeat",
        }
    }
}

/// One typed message unit exchanged over the collaboration channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The participant that sent this envelope
    pub origin_user_id: UserId,
    /// The document this envelope belongs to
    pub document_id: DocumentId,
    /// Unix timestamp in milliseconds, assigned by the sender's clock
    pub timestamp: i64,
    /// Kind-tagged payload, flattened into the envelope object
    #[serde(flatten)]
    pub payload: EnvelopePayload,
}

impl Envelope {
    /// Create an envelope stamped with the current local time
    pub fn new(origin_user_id: UserId, document_id: DocumentId, payload: EnvelopePayload) -> Self {
        Self {
            origin_user_id,
            document_id,
            timestamp: now_ms(),
            payload,
        }
    }

    /// Wire name of the payload kind, for logging
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Encode the envelope to a JSON frame for transmission
    pub fn to_bytes(&self) -> CollabResult<Bytes> {
        let data = serde_json::to_vec(self)
            .map_err(|e| CollabError::Serialization(format!("Failed to encode envelope: {}", e)))?;
        Ok(Bytes::from(data))
    }

    /// Decode an envelope from a JSON frame
    ///
    /// # Errors
    ///
    /// Returns `CollabError::Serialization` if the frame is not a valid
    /// envelope. The receive loop logs and drops such frames.
    pub fn from_bytes(bytes: &[u8]) -> CollabResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CollabError::Serialization(format!("Failed to decode envelope: {}", e)))
    }
}
