//! Composition root: feeds transport events into the dialogue machine.
//!
//! The dispatcher acquires each subscriber's session guard in transport
//! order before spawning the transition task. Same-subscriber events thus
//! apply in arrival order, while different subscribers run in parallel
//! (the loop only waits when the same subscriber already has a transition
//! in flight).

use std::sync::Arc;

use futures::StreamExt;

use crate::dialogue::DialogueMachine;
use crate::error::Result;
use crate::scheduler::DeliveryScheduler;
use crate::store::Store;
use crate::transport::telegram::TelegramGateway;

pub struct Dispatcher {
    gateway: Arc<TelegramGateway>,
    machine: Arc<DialogueMachine>,
    scheduler: Arc<DeliveryScheduler>,
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<TelegramGateway>,
        machine: Arc<DialogueMachine>,
        scheduler: Arc<DeliveryScheduler>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            gateway,
            machine,
            scheduler,
            store,
        }
    }

    /// Register commands, re-arm delivery jobs from persisted subscriptions,
    /// then consume the inbound event stream until it ends.
    pub async fn run(&self) -> Result<()> {
        self.gateway.health_check().await?;
        if let Err(e) = self.gateway.set_my_commands().await {
            tracing::warn!(%e, "Command registration failed; continuing");
        }

        self.scheduler.rebuild(self.store.as_ref()).await?;

        let mut events = self.gateway.start();
        tracing::info!("Dispatcher running");

        while let Some(event) = events.next().await {
            let entry = self.machine.sessions().entry(event.subscriber).await;
            let mut session = entry.lock_owned().await;
            let machine = Arc::clone(&self.machine);
            tokio::spawn(async move {
                if let Err(e) = machine.handle_inbound_locked(event, &mut session).await {
                    tracing::error!(%e, "Event handling failed");
                }
            });
        }

        tracing::info!("Event stream ended; shutting down delivery jobs");
        self.scheduler.shutdown().await;
        Ok(())
    }
}
