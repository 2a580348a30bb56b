//! In-memory `Store` used by unit and integration tests.
//!
//! Behaviorally matches the libSQL backend for the operations the dialogue
//! machine exercises, plus failure injection for the persistence-error
//! paths.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Category, ClarificationTag, Feedback, Quote, Rating, Subscriber, SubscriberId};
use crate::store::traits::{NewFeedback, Store};

#[derive(Default)]
pub struct InMemoryStore {
    subscribers: Mutex<Vec<Subscriber>>,
    quotes: Mutex<Vec<Quote>>,
    feedback: Mutex<Vec<Feedback>>,
    fail_next: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write operation fail with a query error.
    pub async fn fail_next_insert(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Infallible quote insertion for test setup.
    pub async fn add_quote(&self, quote: Quote) {
        self.quotes.lock().await.push(quote);
    }

    /// Every feedback row, in insertion order.
    pub async fn all_feedback(&self) -> Vec<Feedback> {
        self.feedback.lock().await.clone()
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Query("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        self.take_failure()?;
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| s.id != subscriber.id);
        subscribers.push(subscriber.clone());
        Ok(())
    }

    async fn get_subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .lock()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.subscribers.lock().await.clone())
    }

    async fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError> {
        self.take_failure()?;
        self.quotes.lock().await.push(quote.clone());
        Ok(())
    }

    async fn get_quote(&self, category: Category) -> Result<Option<Quote>, StoreError> {
        Ok(self
            .quotes
            .lock()
            .await
            .iter()
            .find(|q| q.category == category)
            .cloned())
    }

    async fn count_quotes(&self) -> Result<i64, StoreError> {
        Ok(self.quotes.lock().await.len() as i64)
    }

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Uuid, StoreError> {
        self.take_failure()?;
        let id = Uuid::new_v4();
        self.feedback.lock().await.push(Feedback {
            id,
            subscriber_id: feedback.subscriber_id,
            quote_id: feedback.quote_id,
            rating: feedback.rating,
            clarification: None,
            comment: None,
            created_at: Utc::now(),
            finalized_at: None,
        });
        Ok(id)
    }

    async fn update_feedback_rating(&self, id: Uuid, rating: Rating) -> Result<(), StoreError> {
        self.take_failure()?;
        let mut feedback = self.feedback.lock().await;
        let row = feedback
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            })?;
        row.rating = rating;
        row.clarification = None;
        Ok(())
    }

    async fn update_feedback_clarification(
        &self,
        id: Uuid,
        clarification: ClarificationTag,
    ) -> Result<(), StoreError> {
        self.take_failure()?;
        let mut feedback = self.feedback.lock().await;
        let row = feedback
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            })?;
        row.clarification = Some(clarification);
        Ok(())
    }

    async fn finalize_feedback(&self, id: Uuid, comment: Option<&str>) -> Result<(), StoreError> {
        self.take_failure()?;
        let mut feedback = self.feedback.lock().await;
        let row = feedback
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            })?;
        row.comment = comment.map(str::to_owned);
        row.finalized_at = Some(Utc::now());
        Ok(())
    }

    async fn get_feedback(&self, id: Uuid) -> Result<Option<Feedback>, StoreError> {
        Ok(self
            .feedback
            .lock()
            .await
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }
}
