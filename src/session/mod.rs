//! Per-subscriber conversation sessions.

pub mod state;
pub mod store;

use uuid::Uuid;

use crate::model::{Category, Rating};
use crate::transport::{MessageId, Render};

pub use state::ConversationState;
pub use store::SessionStore;

/// The last rendered menu, kept verbatim so `back` re-renders it without
/// recomputation, together with the state that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMenu {
    pub state: ConversationState,
    pub render: Render,
}

/// The delivery a feedback flow is about: the exact quote reference captured
/// at firing time, plus the feedback row once one exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryContext {
    pub quote_id: Uuid,
    pub rating: Option<Rating>,
    pub feedback_id: Option<Uuid>,
}

impl DeliveryContext {
    pub fn new(quote_id: Uuid) -> Self {
        Self {
            quote_id,
            rating: None,
            feedback_id: None,
        }
    }
}

/// Transient conversation state for one subscriber.
///
/// Exists independently of the persisted subscription (mid-onboarding users
/// have a session but no subscriber row). Created lazily on first event,
/// reset to idle when a feedback cycle completes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub state: ConversationState,
    /// Last rendered menu, for `back` navigation.
    pub last_menu: Option<StoredMenu>,
    /// Whether the next free-text message is solicited (comment entry).
    pub awaiting_free_text: bool,
    /// Category chosen in the category menu, not yet persisted.
    pub pending_category: Option<Category>,
    /// The in-progress feedback cycle, if any.
    pub delivery: Option<DeliveryContext>,
    /// Message carrying the current menu, edited in place on transitions.
    pub menu_message: Option<MessageId>,
}

impl Session {
    /// A fresh idle session.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Reset to idle, dropping all flow-scoped fields.
    pub fn reset(&mut self) {
        *self = Self::idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_session_is_empty() {
        let s = Session::idle();
        assert_eq!(s.state, ConversationState::Idle);
        assert!(!s.awaiting_free_text);
        assert!(s.last_menu.is_none());
        assert!(s.pending_category.is_none());
        assert!(s.delivery.is_none());
    }

    #[test]
    fn reset_drops_flow_fields() {
        let mut s = Session::idle();
        s.state = ConversationState::AwaitingComment;
        s.awaiting_free_text = true;
        s.pending_category = Some(Category::Hope);
        s.delivery = Some(DeliveryContext::new(Uuid::new_v4()));
        s.reset();
        assert_eq!(s, Session::idle());
    }
}
