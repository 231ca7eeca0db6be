//! Per-user conversation state
//!
//! Multi-step flows (complaint filing, leaving a review) keep their draft in a
//! [`SessionStore`] keyed by user id. Nothing here is persisted; a restart
//! simply drops unfinished drafts.

use dashmap::DashMap;
use std::sync::Arc;

/// Storage for one kind of per-user draft
pub trait SessionStore<S>: Send + Sync {
    /// Current draft of a user
    fn get(&self, user_id: u64) -> Option<S>;

    /// Replace the draft of a user
    fn put(&self, user_id: u64, state: S);

    /// Remove and return the draft of a user
    fn take(&self, user_id: u64) -> Option<S>;

    fn contains(&self, user_id: u64) -> bool {
        self.get(user_id).is_some()
    }
}

/// In-process session storage
#[derive(Debug)]
pub struct MemorySessions<S> {
    sessions: Arc<DashMap<u64, S>>,
}

impl<S> Default for MemorySessions<S> {
    fn default() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl<S> Clone for MemorySessions<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S> MemorySessions<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Clone + Send + Sync> SessionStore<S> for MemorySessions<S> {
    fn get(&self, user_id: u64) -> Option<S> {
        self.sessions.get(&user_id).map(|entry| entry.value().clone())
    }

    fn put(&self, user_id: u64, state: S) {
        self.sessions.insert(user_id, state);
    }

    fn take(&self, user_id: u64) -> Option<S> {
        self.sessions.remove(&user_id).map(|(_, state)| state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_per_user() {
        let sessions = MemorySessions::<&'static str>::new();
        sessions.put(1, "first");
        sessions.put(2, "second");
        sessions.put(1, "replaced");

        assert_eq!(sessions.get(1), Some("replaced"));
        assert!(sessions.contains(2));
        assert_eq!(sessions.take(2), Some("second"));
        assert!(!sessions.contains(2));
        assert_eq!(sessions.take(2), None);
    }

    #[test]
    fn test_clones_share_state() {
        let sessions = MemorySessions::new();
        let other = sessions.clone();
        sessions.put(7, 42_u8);
        assert_eq!(other.get(7), Some(42));
    }
}
