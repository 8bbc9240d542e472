//! Presence registry: the live roster for a document session
//!
//! Tracks every participant the engine has heard about, keyed by user
//! id. Join, leave, cursor, and selection envelopes update the registry;
//! the active-roster query combines the stored `is_active` flag with a
//! staleness check against the liveness window.
//!
//! Two deliberate quirks are preserved from the source system:
//!
//! - A departed participant's record is never pruned, only flagged
//!   inactive, so the map grows with churn over a long session.
//! - An entry can be flagged active yet excluded from the active roster
//!   purely by staleness. The dual condition tolerates missed leave
//!   envelopes, at the cost of storage and query disagreeing about what
//!   "active" means.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::events::CollabEvent;
use crate::types::{now_ms, CollaboratorInfo, CursorPosition, UserId};

/// Roster of participants for one document session
pub struct PresenceRegistry {
    entries: HashMap<UserId, CollaboratorInfo>,
    liveness_window: Duration,
}

impl PresenceRegistry {
    /// Create an empty registry with the given liveness window
    pub fn new(liveness_window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            liveness_window,
        }
    }

    /// Process a participant-joined envelope
    ///
    /// Inserts or replaces the record, freshly active.
    pub fn apply_join(&mut self, mut participant: CollaboratorInfo) -> CollabEvent {
        participant.is_active = true;
        participant.last_seen = now_ms();
        debug!(user_id = %participant.user_id, "collaborator joined");
        self.entries
            .insert(participant.user_id.clone(), participant.clone());
        CollabEvent::CollaboratorJoined(participant)
    }

    /// Process a participant-left envelope
    ///
    /// Flags the record inactive; the entry itself stays in the map.
    pub fn apply_leave(&mut self, user_id: &UserId) -> CollabEvent {
        if let Some(entry) = self.entries.get_mut(user_id) {
            entry.is_active = false;
            entry.touch();
        }
        debug!(%user_id, "collaborator left");
        CollabEvent::CollaboratorLeft(user_id.clone())
    }

    /// Process a cursor-moved or selection-changed envelope
    ///
    /// Updates the matching record's cursor and last_seen; a cursor from
    /// an unknown participant still produces the event for external
    /// listeners, it just has no record to update.
    pub fn apply_cursor(&mut self, cursor: CursorPosition, is_selection: bool) -> CollabEvent {
        if let Some(entry) = self.entries.get_mut(&cursor.user_id) {
            entry.cursor = Some(cursor.clone());
            entry.touch();
        }
        if is_selection {
            CollabEvent::SelectionChange(cursor)
        } else {
            CollabEvent::CursorMove(cursor)
        }
    }

    /// Every known participant, active or not
    pub fn collaborators(&self) -> Vec<CollaboratorInfo> {
        self.entries.values().cloned().collect()
    }

    /// Look up one participant
    pub fn get(&self, user_id: &UserId) -> Option<&CollaboratorInfo> {
        self.entries.get(user_id)
    }

    /// Participants that are flagged active and seen within the
    /// liveness window
    ///
    /// The staleness check means a participant can drop out of this
    /// list without any leave envelope having arrived.
    pub fn active_collaborators(&self) -> Vec<CollaboratorInfo> {
        let now = now_ms();
        let window_ms = self.liveness_window.as_millis() as i64;
        self.entries
            .values()
            .filter(|c| c.is_active && now - c.last_seen < window_ms)
            .cloned()
            .collect()
    }

    /// Number of known participants (including inactive ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every record; used on engine teardown
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, user_id: &UserId, last_seen: i64) {
        if let Some(entry) = self.entries.get_mut(user_id) {
            entry.last_seen = last_seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Duration::from_secs(30))
    }

    fn collaborator(id: &str) -> CollaboratorInfo {
        CollaboratorInfo::new(UserId::new(id), id.to_string())
    }

    #[test]
    fn test_join_inserts_active_entry() {
        let mut reg = registry();
        let event = reg.apply_join(collaborator("alice"));

        assert!(matches!(event, CollabEvent::CollaboratorJoined(_)));
        assert_eq!(reg.active_collaborators().len(), 1);
        assert!(reg.get(&UserId::new("alice")).unwrap().is_active);
    }

    #[test]
    fn test_leave_excludes_from_active_but_keeps_entry() {
        let mut reg = registry();
        let alice = UserId::new("alice");
        reg.apply_join(collaborator("alice"));
        reg.apply_leave(&alice);

        // Excluded from the active roster immediately after the leave
        assert!(reg.active_collaborators().is_empty());
        // The record is never pruned, only flagged
        assert_eq!(reg.len(), 1);
        assert!(!reg.get(&alice).unwrap().is_active);
    }

    #[test]
    fn test_rejoin_after_leave_is_active_again() {
        let mut reg = registry();
        let alice = UserId::new("alice");
        reg.apply_join(collaborator("alice"));
        reg.apply_leave(&alice);
        reg.apply_join(collaborator("alice"));

        let active = reg.active_collaborators();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, alice);
    }

    #[test]
    fn test_stale_entry_excluded_without_leave() {
        let mut reg = registry();
        let alice = UserId::new("alice");
        reg.apply_join(collaborator("alice"));

        // 31 seconds without activity, no leave envelope received
        reg.backdate(&alice, now_ms() - 31_000);

        assert!(reg.active_collaborators().is_empty());
        // Storage still says active: the flag and the query deliberately
        // disagree, so a missed leave cannot pin a ghost in the roster.
        assert!(reg.get(&alice).unwrap().is_active);
    }

    #[test]
    fn test_entry_within_window_stays_active() {
        let mut reg = registry();
        let alice = UserId::new("alice");
        reg.apply_join(collaborator("alice"));
        reg.backdate(&alice, now_ms() - 29_000);

        assert_eq!(reg.active_collaborators().len(), 1);
    }

    #[test]
    fn test_cursor_updates_entry_and_last_seen() {
        let mut reg = registry();
        let alice = UserId::new("alice");
        reg.apply_join(collaborator("alice"));
        reg.backdate(&alice, now_ms() - 29_000);

        let cursor = CursorPosition::new(alice.clone(), 17);
        let event = reg.apply_cursor(cursor, false);

        assert!(matches!(event, CollabEvent::CursorMove(_)));
        let entry = reg.get(&alice).unwrap();
        assert_eq!(entry.cursor.as_ref().unwrap().position, 17);
        assert!(now_ms() - entry.last_seen < 1_000);
    }

    #[test]
    fn test_selection_produces_selection_event() {
        let mut reg = registry();
        reg.apply_join(collaborator("alice"));

        let cursor = CursorPosition::new(UserId::new("alice"), 5).with_selection(5, 9);
        let event = reg.apply_cursor(cursor, true);
        assert!(matches!(event, CollabEvent::SelectionChange(_)));
    }

    #[test]
    fn test_cursor_for_unknown_user_still_emits() {
        let mut reg = registry();
        let cursor = CursorPosition::new(UserId::new("ghost"), 3);
        let event = reg.apply_cursor(cursor, false);

        assert!(matches!(event, CollabEvent::CursorMove(_)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_collaborators_lists_inactive_too() {
        let mut reg = registry();
        reg.apply_join(collaborator("alice"));
        reg.apply_join(collaborator("bob"));
        reg.apply_leave(&UserId::new("bob"));

        assert_eq!(reg.collaborators().len(), 2);
        assert_eq!(reg.active_collaborators().len(), 1);
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut reg = registry();
        reg.apply_join(collaborator("alice"));
        reg.clear();
        assert!(reg.is_empty());
    }
}
