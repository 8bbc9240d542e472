//! Change and comment ledger for one document session
//!
//! Holds every document edit and threaded comment exchanged during the
//! session, in memory only; persistence is an external collaborator's
//! concern. The engine never applies changes to any document text, it
//! only relays them: inbound changes from other participants are handed
//! to the editing surface, inbound echoes of our own changes are
//! discarded.
//!
//! Comments form a one-level reply tree anchored to document offsets.
//! Top-level comments live in a flat id-keyed map; replies are nested
//! inside their parent and are not addressable at the top level, which
//! also means a reply cannot be resolved directly.

use std::collections::HashMap;

use tracing::debug;

use crate::events::CollabEvent;
use crate::types::{ChangeOp, Comment, CommentId, DocumentChange, UserId};

/// In-memory record of the session's changes and comments
pub struct Ledger {
    local_user: UserId,
    changes: Vec<DocumentChange>,
    comments: HashMap<CommentId, Comment>,
}

impl Ledger {
    /// Create an empty ledger for the given local identity
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            changes: Vec::new(),
            comments: HashMap::new(),
        }
    }

    /// Complete and record a locally produced change
    ///
    /// Stamps the change with the local identity and clock; the caller
    /// transmits the returned record.
    pub fn record_local_change(&mut self, op: ChangeOp, position: usize) -> DocumentChange {
        let change = DocumentChange::new(op, position, self.local_user.clone());
        debug!(id = %change.id, op = change.op.name(), position, "recorded local change");
        self.changes.push(change.clone());
        change
    }

    /// Record an inbound change from the channel
    ///
    /// A change whose origin is the local identity is a self-echo and is
    /// discarded; anything else is retained and handed to the editing
    /// surface via the returned event.
    pub fn apply_remote_change(&mut self, change: DocumentChange) -> Option<CollabEvent> {
        if change.user_id == self.local_user {
            debug!(id = %change.id, "discarding self-echoed change");
            return None;
        }
        debug!(id = %change.id, origin = %change.user_id, "received remote change");
        self.changes.push(change.clone());
        Some(CollabEvent::DocumentChange(change))
    }

    /// Create a local comment, top-level or as a one-level reply
    ///
    /// A `parent_id` that matches no top-level comment silently drops
    /// the comment; this mirrors the source system and is logged.
    /// Returns the completed comment for transmission, or `None` if it
    /// was dropped.
    pub fn add_local_comment(
        &mut self,
        content: impl Into<String>,
        position: usize,
        parent_id: Option<&CommentId>,
    ) -> Option<Comment> {
        let comment = Comment::new(self.local_user.clone(), content, position);
        self.insert_comment(comment, parent_id)
    }

    /// Record an inbound comment from the channel
    pub fn apply_remote_comment(
        &mut self,
        comment: Comment,
        parent_id: Option<&CommentId>,
    ) -> Option<CollabEvent> {
        self.insert_comment(comment, parent_id)
            .map(CollabEvent::CommentAdded)
    }

    fn insert_comment(
        &mut self,
        comment: Comment,
        parent_id: Option<&CommentId>,
    ) -> Option<Comment> {
        match parent_id {
            None => {
                self.comments.insert(comment.id.clone(), comment.clone());
                Some(comment)
            }
            Some(parent_id) => match self.comments.get_mut(parent_id) {
                Some(parent) => {
                    parent.replies.push(comment.clone());
                    Some(comment)
                }
                None => {
                    debug!(%parent_id, "parent comment not found, comment dropped");
                    None
                }
            },
        }
    }

    /// Resolve a top-level comment
    ///
    /// Only top-level comments are looked up; a reply's id will not be
    /// found. Resolution is terminal: there is no un-resolve.
    pub fn resolve_comment(&mut self, id: &CommentId) -> bool {
        match self.comments.get_mut(id) {
            Some(comment) => {
                comment.resolved = true;
                debug!(%id, "comment resolved");
                true
            }
            None => {
                debug!(%id, "comment not found for resolution");
                false
            }
        }
    }

    /// Every change recorded this session, in arrival order
    pub fn changes(&self) -> &[DocumentChange] {
        &self.changes
    }

    /// Top-level comments, ordered by timestamp then id
    pub fn comments(&self) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self.comments.values().cloned().collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.0.cmp(&b.id.0)));
        comments
    }

    /// Top-level comments anchored within `position ± range`
    pub fn comments_at_position(&self, position: usize, range: usize) -> Vec<Comment> {
        let low = position.saturating_sub(range);
        let high = position.saturating_add(range);
        let mut comments: Vec<Comment> = self
            .comments
            .values()
            .filter(|c| c.position >= low && c.position <= high)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.position);
        comments
    }

    /// Drop all recorded changes and comments; used on engine teardown
    pub fn clear(&mut self) {
        self.changes.clear();
        self.comments.clear();
    }
}
