//! Core types for the collaboration engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Current Unix timestamp in milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identifier of a shared document
///
/// One engine instance is constructed per (document, user) pair; the
/// document id addresses the collaboration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Create a DocumentId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc_{}", self.0)
    }
}

/// Identifier of a participant
///
/// Supplied by the identity collaborator; the engine trusts whatever
/// identity it is constructed with and performs no verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a UserId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user_{}", self.0)
    }
}

/// Unique identifier for a document change
///
/// Uses ULID for time-ordered unique identifiers that sort lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub Ulid);

impl ChangeId {
    /// Create a new ChangeId with the current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "change_{}", self.0)
    }
}

/// Unique identifier for a comment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(pub Ulid);

impl CommentId {
    /// Create a new CommentId with the current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for CommentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "comment_{}", self.0)
    }
}

/// Role of a participant within a document session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    /// Owns the document
    Owner,
    /// May edit the document
    Editor,
    /// Read-only access
    Viewer,
}

impl Default for CollaboratorRole {
    fn default() -> Self {
        CollaboratorRole::Editor
    }
}

/// A contiguous text selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    /// Selection start offset
    pub start: usize,
    /// Selection end offset
    pub end: usize,
}

/// Fixed palette for remote caret rendering
const CURSOR_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#9a6324",
];

/// Ephemeral cursor/selection state for one participant
///
/// Superseded by the next cursor or selection envelope from the same
/// user; never persisted and never part of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// The participant this cursor belongs to
    pub user_id: UserId,
    /// Caret offset in the document
    pub position: usize,
    /// Active selection, if any
    pub selection: Option<SelectionRange>,
    /// Display color (hex), derived deterministically from the user id
    pub color: String,
}

impl CursorPosition {
    /// Create a cursor for a user at the given offset
    pub fn new(user_id: UserId, position: usize) -> Self {
        let color = Self::color_for(&user_id).to_string();
        Self {
            user_id,
            position,
            selection: None,
            color,
        }
    }

    /// Attach a selection range
    pub fn with_selection(mut self, start: usize, end: usize) -> Self {
        self.selection = Some(SelectionRange { start, end });
        self
    }

    /// Pick a palette color for a user id
    ///
    /// Deterministic so every client renders the same color for the
    /// same participant.
    pub fn color_for(user_id: &UserId) -> &'static str {
        let sum: usize = user_id.as_str().bytes().map(|b| b as usize).sum();
        CURSOR_PALETTE[sum % CURSOR_PALETTE.len()]
    }
}

/// The kind of edit a [`DocumentChange`] represents
///
/// The payload each kind carries is encoded in the variant itself:
/// inserts carry content, deletes carry a length, formats carry
/// attributes. Mismatched combinations are unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ChangeOp {
    /// Insert text at the change position
    Insert {
        /// The text to insert
        content: String,
    },
    /// Delete text starting at the change position
    Delete {
        /// Number of characters to delete
        length: usize,
    },
    /// Apply formatting attributes at the change position
    Format {
        /// Formatting attributes (e.g. "bold" -> "true")
        attributes: BTreeMap<String, String>,
    },
}

impl ChangeOp {
    /// Short name of the operation, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ChangeOp::Insert { .. } => "insert",
            ChangeOp::Delete { .. } => "delete",
            ChangeOp::Format { .. } => "format",
        }
    }
}

/// One atomic document edit
///
/// The engine treats changes as opaque, ordered-by-arrival operations.
/// It never merges overlapping changes and never applies them to any
/// document representation; reconciliation belongs to the editing
/// surface or an external OT/CRDT layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Unique identifier for this change
    pub id: ChangeId,
    /// What the change does
    #[serde(flatten)]
    pub op: ChangeOp,
    /// Offset in the document the change applies at
    pub position: usize,
    /// The participant that made the change
    pub user_id: UserId,
    /// Unix timestamp in milliseconds, assigned by the sender's clock
    pub timestamp: i64,
}

impl DocumentChange {
    /// Create a new change stamped with the current time
    pub fn new(op: ChangeOp, position: usize, user_id: UserId) -> Self {
        Self {
            id: ChangeId::new(),
            op,
            position,
            user_id,
            timestamp: now_ms(),
        }
    }
}

/// A threaded comment anchored to a document offset
///
/// Top-level comments live in a flat id-keyed map; replies nest exactly
/// one level inside their parent and are not separately addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: CommentId,
    /// Author of the comment
    pub user_id: UserId,
    /// Comment text
    pub content: String,
    /// Document offset the comment is anchored to
    pub position: usize,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Replies, one nesting level only
    pub replies: Vec<Comment>,
    /// Terminal flag set by explicit resolution; no un-resolve exists
    pub resolved: bool,
}

impl Comment {
    /// Create a new comment stamped with the current time
    pub fn new(user_id: UserId, content: impl Into<String>, position: usize) -> Self {
        Self {
            id: CommentId::new(),
            user_id,
            content: content.into(),
            position,
            timestamp: now_ms(),
            replies: Vec::new(),
            resolved: false,
        }
    }
}

/// Identity and liveness state for one participant
///
/// Owned exclusively by the presence registry; callers never mutate
/// this directly, only envelope processing does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorInfo {
    /// The participant's identifier
    pub user_id: UserId,
    /// Human-readable display name
    pub display_name: String,
    /// Optional avatar reference (URL or blob id)
    pub avatar: Option<String>,
    /// Role within the document session
    pub role: CollaboratorRole,
    /// Unix timestamp (ms) of most recent activity
    pub last_seen: i64,
    /// Whether the participant is marked active
    ///
    /// Set by join/leave processing. The active-roster query combines
    /// this with a staleness check, so a stored `true` does not by
    /// itself mean the participant appears in the active list.
    pub is_active: bool,
    /// Current cursor/selection, if known
    pub cursor: Option<CursorPosition>,
}

impl CollaboratorInfo {
    /// Create a new collaborator with the given identity
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar: None,
            role: CollaboratorRole::default(),
            last_seen: now_ms(),
            is_active: true,
            cursor: None,
        }
    }

    /// Set the avatar reference
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Set the role
    pub fn with_role(mut self, role: CollaboratorRole) -> Self {
        self.role = role;
        self
    }

    /// Update the last_seen timestamp to now
    pub fn touch(&mut self) {
        self.last_seen = now_ms();
    }
}
