//! Session store — concurrency-safe map from subscriber identity to session.
//!
//! The registry is a `RwLock<HashMap>` of per-key `Arc<Mutex<Session>>`
//! entries. A transition locks only its own entry, so operations on one
//! subscriber are linearizable while different subscribers never block each
//! other. The registry lock is held only long enough to fetch or create an
//! entry, never across a transition.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::model::SubscriberId;
use crate::session::{ConversationState, Session};

/// Single source of truth for what happens when the next event from a given
/// subscriber arrives. Never rebuilt from message history.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SubscriberId, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock entry for a subscriber, creating an idle session if
    /// absent. Callers hold the entry's mutex for the duration of one
    /// transition — that lock is the per-subscriber serialization point.
    pub async fn entry(&self, id: SubscriberId) -> Arc<Mutex<Session>> {
        if let Some(entry) = self.sessions.read().await.get(&id) {
            return Arc::clone(entry);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::idle()))),
        )
    }

    /// Snapshot of the subscriber's current session (idle if absent).
    pub async fn get(&self, id: SubscriberId) -> Session {
        let entry = self.entry(id).await;
        let session = entry.lock().await;
        session.clone()
    }

    /// Overwrite the subscriber's session.
    pub async fn set(&self, id: SubscriberId, session: Session) {
        let entry = self.entry(id).await;
        *entry.lock().await = session;
    }

    /// Commit `next` only if the session is still in `expected` state.
    ///
    /// Used by the split compute/commit path (delivery firings do their
    /// store and transport work without holding the entry lock, then
    /// re-validate here). Returns false if the subscriber moved on in the
    /// meantime, in which case nothing is written.
    pub async fn compare_and_transition(
        &self,
        id: SubscriberId,
        expected: ConversationState,
        next: Session,
    ) -> bool {
        let entry = self.entry(id).await;
        let mut session = entry.lock().await;
        if session.state != expected {
            return false;
        }
        *session = next;
        true
    }

    /// Number of live sessions (for logging).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_creates_idle_session() {
        let store = SessionStore::new();
        let session = store.get(SubscriberId(1)).await;
        assert_eq!(session, Session::idle());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = SessionStore::new();
        let mut session = Session::idle();
        session.state = ConversationState::CategoryMenu;
        store.set(SubscriberId(1), session.clone()).await;
        assert_eq!(store.get(SubscriberId(1)).await, session);
    }

    #[tokio::test]
    async fn sessions_are_keyed_per_subscriber() {
        let store = SessionStore::new();
        let mut a = Session::idle();
        a.state = ConversationState::TimeMenu;
        store.set(SubscriberId(1), a.clone()).await;

        // Subscriber 2 is untouched by subscriber 1's writes.
        assert_eq!(store.get(SubscriberId(2)).await, Session::idle());
        assert_eq!(store.get(SubscriberId(1)).await, a);
    }

    #[tokio::test]
    async fn compare_and_transition_succeeds_on_match() {
        let store = SessionStore::new();
        let mut next = Session::idle();
        next.state = ConversationState::RatingPrompt;

        let ok = store
            .compare_and_transition(SubscriberId(1), ConversationState::Idle, next.clone())
            .await;
        assert!(ok);
        assert_eq!(store.get(SubscriberId(1)).await.state, ConversationState::RatingPrompt);
    }

    #[tokio::test]
    async fn compare_and_transition_rejects_on_mismatch() {
        let store = SessionStore::new();
        let mut current = Session::idle();
        current.state = ConversationState::TimeMenu;
        store.set(SubscriberId(1), current.clone()).await;

        let mut next = Session::idle();
        next.state = ConversationState::RatingPrompt;
        let ok = store
            .compare_and_transition(SubscriberId(1), ConversationState::Idle, next)
            .await;
        assert!(!ok);
        assert_eq!(store.get(SubscriberId(1)).await, current);
    }

    #[tokio::test]
    async fn entries_do_not_block_each_other() {
        let store = Arc::new(SessionStore::new());

        // Hold subscriber 1's entry lock while touching subscriber 2.
        let entry_1 = store.entry(SubscriberId(1)).await;
        let _guard = entry_1.lock().await;

        let store_2 = Arc::clone(&store);
        let other = tokio::time::timeout(std::time::Duration::from_secs(1), async move {
            store_2.get(SubscriberId(2)).await
        })
        .await;
        assert!(other.is_ok(), "operations on another key must not block");
    }
}
