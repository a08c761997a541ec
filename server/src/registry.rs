//! Session registry: connected clients, their outbound queues, and their
//! last-known cursor positions.
//!
//! The registry is owned by the router task alongside the drawing log. It
//! enforces user-id uniqueness (a client-supplied id is a hint, not
//! authoritative) and holds the per-user coalescing slot for cursor updates:
//! the latest position wins, intermediate positions are dropped.

use chrono::{DateTime, Utc};
use log::info;
use rand::Rng;
use shared::{Message, Point};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Ephemeral cursor state, overwritten on each update and dropped on
/// disconnect. Never part of the drawing log.
#[derive(Debug, Clone, Copy)]
pub struct CursorState {
    pub position: Point,
    pub last_updated: DateTime<Utc>,
}

pub struct Session {
    pub user_id: String,
    /// Bounded outbound queue; overflow disconnects the session.
    pub outbound: mpsc::Sender<Message>,
    pub cursor: Option<CursorState>,
    /// Latest cursor position not yet flushed to peers.
    pending_cursor: Option<Point>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under a unique id.
    ///
    /// The hint is used as-is when free; on collision a deterministic `-2`,
    /// `-3`… suffix is appended so an active id can never be spoofed. Without
    /// a hint a fresh random id is generated.
    pub fn join(&mut self, hint: Option<String>, outbound: mpsc::Sender<Message>) -> String {
        let base = match hint.filter(|h| !h.trim().is_empty()) {
            Some(h) => h,
            None => format!("user-{:04x}", rand::thread_rng().gen_range(0..0x1_0000u32)),
        };
        let mut user_id = base.clone();
        let mut suffix = 2;
        while self.sessions.contains_key(&user_id) {
            user_id = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        info!("Session '{}' joined ({} online)", user_id, self.sessions.len() + 1);
        self.sessions.insert(
            user_id.clone(),
            Session {
                user_id: user_id.clone(),
                outbound,
                cursor: None,
                pending_cursor: None,
            },
        );
        user_id
    }

    /// Removes a session. Returns true if it was present; the caller is
    /// responsible for broadcasting the cursor-removal notice.
    pub fn leave(&mut self, user_id: &str) -> bool {
        if self.sessions.remove(user_id).is_some() {
            info!("Session '{}' left ({} online)", user_id, self.sessions.len());
            true
        } else {
            false
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Overwrites the user's cursor in place. Last write wins; the previous
    /// pending position (if any) is discarded unsent.
    pub fn update_cursor(&mut self, user_id: &str, position: Point) -> bool {
        if let Some(session) = self.sessions.get_mut(user_id) {
            session.cursor = Some(CursorState {
                position,
                last_updated: Utc::now(),
            });
            session.pending_cursor = Some(position);
            true
        } else {
            false
        }
    }

    /// Drains at most one (the latest) unflushed cursor position per user.
    pub fn take_pending_cursors(&mut self) -> Vec<(String, Point)> {
        let mut pending = Vec::new();
        for session in self.sessions.values_mut() {
            if let Some(position) = session.pending_cursor.take() {
                pending.push((session.user_id.clone(), position));
            }
        }
        pending
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> mpsc::Sender<Message> {
        mpsc::channel(8).0
    }

    #[test]
    fn test_join_uses_hint_when_free() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.join(Some("alice".into()), outbound()), "alice");
        assert!(registry.contains("alice"));
    }

    #[test]
    fn test_join_collision_gets_suffix() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.join(Some("alice".into()), outbound()), "alice");
        assert_eq!(registry.join(Some("alice".into()), outbound()), "alice-2");
        assert_eq!(registry.join(Some("alice".into()), outbound()), "alice-3");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_join_without_hint_generates_id() {
        let mut registry = SessionRegistry::new();
        let id = registry.join(None, outbound());
        assert!(id.starts_with("user-"));
        let blank = registry.join(Some("   ".into()), outbound());
        assert!(blank.starts_with("user-"));
    }

    #[test]
    fn test_leave_removes_session() {
        let mut registry = SessionRegistry::new();
        registry.join(Some("alice".into()), outbound());
        assert!(registry.leave("alice"));
        assert!(!registry.leave("alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cursor_overwrites_in_place() {
        let mut registry = SessionRegistry::new();
        registry.join(Some("alice".into()), outbound());

        assert!(registry.update_cursor("alice", Point::new(10.0, 10.0)));
        assert!(registry.update_cursor("alice", Point::new(99.0, 42.0)));

        let cursor = registry.get("alice").unwrap().cursor.unwrap();
        assert_eq!(cursor.position, Point::new(99.0, 42.0));

        // Coalescing: only the latest position is pending
        let pending = registry.take_pending_cursors();
        assert_eq!(pending, vec![("alice".to_string(), Point::new(99.0, 42.0))]);
        assert!(registry.take_pending_cursors().is_empty());
    }

    #[test]
    fn test_cursor_for_unknown_user_rejected() {
        let mut registry = SessionRegistry::new();
        assert!(!registry.update_cursor("ghost", Point::new(1.0, 1.0)));
    }
}
