//! Backend-agnostic persistence trait for subscriptions, quotes, and feedback.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Category, ClarificationTag, Feedback, Quote, Rating, Subscriber, SubscriberId};

/// A feedback row at creation time. The backend assigns the id and timestamp;
/// clarification and comment arrive through later updates.
#[derive(Debug, Clone, Copy)]
pub struct NewFeedback {
    pub subscriber_id: SubscriberId,
    pub quote_id: Uuid,
    pub rating: Rating,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Subscribers ─────────────────────────────────────────────────

    /// Insert a subscription, replacing any existing row for the same
    /// subscriber (re-running onboarding changes the subscription).
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError>;

    async fn get_subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError>;

    /// All current subscriptions, used to rebuild delivery jobs at startup.
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    // ── Quotes ──────────────────────────────────────────────────────

    async fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError>;

    /// Pick a quote for a category, or `None` if the pool is empty.
    async fn get_quote(&self, category: Category) -> Result<Option<Quote>, StoreError>;

    async fn count_quotes(&self) -> Result<i64, StoreError>;

    // ── Feedback ────────────────────────────────────────────────────

    /// Create a feedback row and return its id.
    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Uuid, StoreError>;

    /// Re-point the rating on an existing row (back navigation re-rates).
    async fn update_feedback_rating(&self, id: Uuid, rating: Rating) -> Result<(), StoreError>;

    async fn update_feedback_clarification(
        &self,
        id: Uuid,
        clarification: ClarificationTag,
    ) -> Result<(), StoreError>;

    /// Attach the optional comment and stamp the row finalized.
    async fn finalize_feedback(&self, id: Uuid, comment: Option<&str>) -> Result<(), StoreError>;

    async fn get_feedback(&self, id: Uuid) -> Result<Option<Feedback>, StoreError>;
}
