//! Conversation state tags.

use serde::{Deserialize, Serialize};

/// Where a subscriber currently is in the dialogue.
///
/// Two sub-flows share this tag: the onboarding flow
/// (`Idle → CategoryMenu → TimeMenu → Subscribed`) and the feedback flow
/// (`RatingPrompt → ClarificationMenu → CommentDecision → AwaitingComment /
/// CancelConfirm → Idle`), entered whenever a delivery fires. The two never
/// overlap within one session: a firing only opens the feedback flow from a
/// resting state (see `accepts_delivery_prompt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    CategoryMenu,
    TimeMenu,
    Subscribed,
    RatingPrompt,
    ClarificationMenu,
    CommentDecision,
    AwaitingComment,
    CancelConfirm,
}

impl ConversationState {
    /// States from which `/select_category` opens the category menu.
    pub fn accepts_select_category(&self) -> bool {
        matches!(self, Self::Idle | Self::Subscribed)
    }

    /// Resting states where a firing may open the feedback flow. A firing
    /// that lands mid-dialogue delivers the quote but skips the rating
    /// prompt, so it cannot corrupt the in-progress flow.
    pub fn accepts_delivery_prompt(&self) -> bool {
        matches!(self, Self::Idle | Self::Subscribed)
    }

    /// Whether this state belongs to the feedback sub-flow.
    pub fn in_feedback_flow(&self) -> bool {
        matches!(
            self,
            Self::RatingPrompt
                | Self::ClarificationMenu
                | Self::CommentDecision
                | Self::AwaitingComment
                | Self::CancelConfirm
        )
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::CategoryMenu => "category_menu",
            Self::TimeMenu => "time_menu",
            Self::Subscribed => "subscribed",
            Self::RatingPrompt => "rating_prompt",
            Self::ClarificationMenu => "clarification_menu",
            Self::CommentDecision => "comment_decision",
            Self::AwaitingComment => "awaiting_comment",
            Self::CancelConfirm => "cancel_confirm",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConversationState; 9] = [
        ConversationState::Idle,
        ConversationState::CategoryMenu,
        ConversationState::TimeMenu,
        ConversationState::Subscribed,
        ConversationState::RatingPrompt,
        ConversationState::ClarificationMenu,
        ConversationState::CommentDecision,
        ConversationState::AwaitingComment,
        ConversationState::CancelConfirm,
    ];

    #[test]
    fn default_is_idle() {
        assert_eq!(ConversationState::default(), ConversationState::Idle);
    }

    #[test]
    fn delivery_prompt_only_from_resting_states() {
        for state in ALL {
            let expected = matches!(
                state,
                ConversationState::Idle | ConversationState::Subscribed
            );
            assert_eq!(state.accepts_delivery_prompt(), expected, "{state}");
        }
    }

    #[test]
    fn feedback_flow_membership() {
        assert!(ConversationState::RatingPrompt.in_feedback_flow());
        assert!(ConversationState::CancelConfirm.in_feedback_flow());
        assert!(!ConversationState::TimeMenu.in_feedback_flow());
        assert!(!ConversationState::Idle.in_feedback_flow());
    }

    #[test]
    fn display_matches_serde() {
        for state in ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
