//! Recurring per-subscriber delivery jobs.
//!
//! Each subscription owns exactly one job: a task that sleeps until the next
//! cron boundary for the subscriber's hour, fires the delivery handler, and
//! loops. The loop is sequential, so at most one firing per subscriber is
//! ever in flight. Cancellation is cooperative: a cancelled job that is
//! mid-delivery finishes that delivery and then exits.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

use crate::error::{Result, SchedulerError};
use crate::model::{DeliveryHour, Subscriber, SubscriberId};
use crate::store::Store;

/// Receiver of delivery firings. Implemented by the dialogue machine.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, subscriber: &Subscriber) -> Result<()>;
}

struct DeliveryJob {
    hour: DeliveryHour,
    cancelled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

impl DeliveryJob {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }
}

pub struct DeliveryScheduler {
    handler: Arc<dyn DeliveryHandler>,
    jobs: RwLock<HashMap<SubscriberId, DeliveryJob>>,
}

impl DeliveryScheduler {
    pub fn new(handler: Arc<dyn DeliveryHandler>) -> Self {
        Self {
            handler,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Arm (or re-arm) the delivery job for a subscription. An existing job
    /// for the same subscriber is cancelled first, so each subscriber holds
    /// exactly one timer.
    pub async fn upsert_job(&self, subscriber: Subscriber) {
        let mut jobs = self.jobs.write().await;

        if let Some(old) = jobs.remove(&subscriber.id) {
            tracing::debug!(
                subscriber = %subscriber.id,
                old_hour = %old.hour,
                new_hour = %subscriber.hour,
                "Replacing delivery job"
            );
            old.cancel();
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(Notify::new());
        let hour = subscriber.hour;

        tracing::info!(subscriber = %subscriber.id, %hour, "Delivery job armed");

        let task = tokio::spawn(run_job(
            subscriber.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&cancelled),
            Arc::clone(&cancel),
        ));

        jobs.insert(
            subscriber.id,
            DeliveryJob {
                hour,
                cancelled,
                cancel,
                task,
            },
        );
    }

    /// Cancel a subscriber's job, if any. Returns whether one existed.
    pub async fn cancel_job(&self, id: SubscriberId) -> bool {
        match self.jobs.write().await.remove(&id) {
            Some(job) => {
                job.cancel();
                tracing::info!(subscriber = %id, "Delivery job cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every job (shutdown path).
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, job) in jobs.drain() {
            job.cancel();
        }
    }

    /// The hour a subscriber's job is armed for, if armed.
    pub async fn armed_hour(&self, id: SubscriberId) -> Option<DeliveryHour> {
        self.jobs.read().await.get(&id).map(|j| j.hour)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Re-arm jobs for every persisted subscription. Called once at startup;
    /// sessions are not restored, only timers.
    pub async fn rebuild(&self, store: &dyn Store) -> Result<usize> {
        let subscribers = store.list_subscribers().await?;
        let count = subscribers.len();
        for subscriber in subscribers {
            self.upsert_job(subscriber).await;
        }
        tracing::info!(count, "Delivery jobs rebuilt from persisted subscriptions");
        Ok(count)
    }
}

/// Next occurrence of `hour`:00 UTC, strictly in the future.
pub fn next_fire(hour: DeliveryHour) -> std::result::Result<DateTime<Utc>, SchedulerError> {
    let expr = format!("0 0 {} * * *", hour.hour());
    let schedule = cron::Schedule::from_str(&expr)
        .map_err(|e| SchedulerError::InvalidSchedule(format!("{expr}: {e}")))?;
    schedule
        .upcoming(Utc)
        .next()
        .ok_or_else(|| SchedulerError::InvalidSchedule(format!("{expr}: no upcoming fire")))
}

async fn run_job(
    subscriber: Subscriber,
    handler: Arc<dyn DeliveryHandler>,
    cancelled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
) {
    loop {
        let next = match next_fire(subscriber.hour) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(subscriber = %subscriber.id, %e, "Delivery job stopping");
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.notified() => return,
        }
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        tracing::debug!(subscriber = %subscriber.id, "Delivery job firing");
        if let Err(e) = handler.deliver(&subscriber).await {
            tracing::warn!(subscriber = %subscriber.id, %e, "Delivery firing failed");
        }
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingHandler {
        fired: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl DeliveryHandler for CountingHandler {
        async fn deliver(&self, _subscriber: &Subscriber) -> Result<()> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            Ok(())
        }
    }

    fn subscriber(id: i64, hour: DeliveryHour) -> Subscriber {
        Subscriber::new(SubscriberId(id), "Test", Category::Happiness, hour)
    }

    #[test]
    fn next_fire_lands_on_the_subscribed_hour() {
        for hour in DeliveryHour::ALL {
            let fire = next_fire(hour).unwrap();
            assert_eq!(fire.format("%H:%M:%S").to_string(), format!("{:02}:00:00", hour.hour()));
            assert!(fire > Utc::now());
        }
    }

    #[tokio::test]
    async fn upsert_twice_keeps_a_single_job() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::new(handler);

        scheduler
            .upsert_job(subscriber(1, DeliveryHour::Morning))
            .await;
        scheduler.upsert_job(subscriber(1, DeliveryHour::Noon)).await;

        assert_eq!(scheduler.job_count().await, 1);
        assert_eq!(
            scheduler.armed_hour(SubscriberId(1)).await,
            Some(DeliveryHour::Noon)
        );
    }

    #[tokio::test]
    async fn cancel_removes_the_job() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::new(handler);

        scheduler
            .upsert_job(subscriber(1, DeliveryHour::Evening))
            .await;
        assert!(scheduler.cancel_job(SubscriberId(1)).await);
        assert!(!scheduler.cancel_job(SubscriberId(1)).await);
        assert_eq!(scheduler.job_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn job_fires_at_the_cron_boundary() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::new(handler.clone());

        scheduler
            .upsert_job(subscriber(1, DeliveryHour::Morning))
            .await;

        // Paused time auto-advances to the sleep deadline.
        tokio::time::timeout(std::time::Duration::from_secs(86_400 * 2), handler.notify.notified())
            .await
            .expect("job should fire within a day");
        assert!(handler.fired.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_never_fires() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::new(handler.clone());

        scheduler
            .upsert_job(subscriber(1, DeliveryHour::Morning))
            .await;
        scheduler.cancel_job(SubscriberId(1)).await;

        tokio::time::sleep(std::time::Duration::from_secs(86_400 * 2)).await;
        assert_eq!(handler.fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rebuild_arms_one_job_per_subscription() {
        use crate::store::memory::InMemoryStore;

        let store = InMemoryStore::new();
        store
            .insert_subscriber(&subscriber(1, DeliveryHour::Morning))
            .await
            .unwrap();
        store
            .insert_subscriber(&subscriber(2, DeliveryHour::Evening))
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::new(handler);
        let count = scheduler.rebuild(&store).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(scheduler.job_count().await, 2);
        assert_eq!(
            scheduler.armed_hour(SubscriberId(2)).await,
            Some(DeliveryHour::Evening)
        );
    }
}
