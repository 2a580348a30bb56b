//! End-to-end dialogue tests against the real libSQL backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use quotecast::dialogue::{Command, ControlToken, DialogueMachine, Event};
use quotecast::error::TransportError;
use quotecast::model::{
    Category, ClarificationTag, DeliveryHour, Quote, Rating, Subscriber, SubscriberId,
};
use quotecast::scheduler::{DeliveryHandler, DeliveryScheduler};
use quotecast::session::{ConversationState, SessionStore};
use quotecast::store::{LibSqlBackend, Store};
use quotecast::transport::{Gateway, MessageId, Render};

/// Gateway double that records every outbound render.
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(SubscriberId, Render)>>,
    edits: Mutex<Vec<(SubscriberId, Render)>>,
    next_id: AtomicI64,
}

impl RecordingGateway {
    async fn last_render(&self, id: SubscriberId) -> Option<Render> {
        let edits = self.edits.lock().await;
        let sent = self.sent.lock().await;
        edits
            .iter()
            .rev()
            .find(|(s, _)| *s == id)
            .map(|(_, r)| r.clone())
            .or_else(|| sent.iter().rev().find(|(s, _)| *s == id).map(|(_, r)| r.clone()))
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send(&self, chat: SubscriberId, render: &Render) -> Result<MessageId, TransportError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().await.push((chat, render.clone()));
        Ok(id)
    }

    async fn edit(
        &self,
        chat: SubscriberId,
        _message: MessageId,
        render: &Render,
    ) -> Result<(), TransportError> {
        self.edits.lock().await.push((chat, render.clone()));
        Ok(())
    }
}

struct World {
    machine: Arc<DialogueMachine>,
    scheduler: Arc<DeliveryScheduler>,
    gateway: Arc<RecordingGateway>,
    store: Arc<LibSqlBackend>,
}

async fn world() -> World {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let gateway = Arc::new(RecordingGateway::default());
    let machine = Arc::new(DialogueMachine::new(
        Arc::new(SessionStore::new()),
        store.clone() as Arc<dyn Store>,
        gateway.clone(),
        60,
    ));
    let scheduler = Arc::new(DeliveryScheduler::new(
        machine.clone() as Arc<dyn DeliveryHandler>,
    ));
    machine.attach_scheduler(Arc::clone(&scheduler));
    World {
        machine,
        scheduler,
        gateway,
        store,
    }
}

fn pick(token: ControlToken) -> Event {
    Event::Control(token, MessageId(1))
}

async fn drive(world: &World, id: SubscriberId, events: &[Event]) {
    for event in events {
        world
            .machine
            .handle_event(id, "Tester", event.clone())
            .await
            .unwrap();
    }
}

fn onboarding_events(category: Category, hour: DeliveryHour) -> Vec<Event> {
    vec![
        Event::Command(Command::SelectCategory),
        pick(ControlToken::Category(category)),
        pick(ControlToken::Hour(hour)),
    ]
}

#[tokio::test]
async fn love_at_noon_persists_confirms_and_arms_one_job() {
    let w = world().await;
    let alice = SubscriberId(11);

    drive(&w, alice, &onboarding_events(Category::Love, DeliveryHour::Noon)).await;

    let subscribers = w.store.list_subscribers().await.unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].category, Category::Love);
    assert_eq!(subscribers[0].hour, DeliveryHour::Noon);

    let confirmation = w.gateway.last_render(alice).await.unwrap();
    assert!(confirmation.text.contains("Love"));
    assert!(confirmation.text.contains("12:00"));

    assert_eq!(w.scheduler.job_count().await, 1);
    assert_eq!(w.scheduler.armed_hour(alice).await, Some(DeliveryHour::Noon));
}

#[tokio::test]
async fn changing_the_hour_replaces_the_job() {
    let w = world().await;
    let alice = SubscriberId(12);

    drive(&w, alice, &onboarding_events(Category::Love, DeliveryHour::Morning)).await;
    drive(&w, alice, &onboarding_events(Category::Love, DeliveryHour::Evening)).await;

    assert_eq!(w.scheduler.job_count().await, 1);
    assert_eq!(
        w.scheduler.armed_hour(alice).await,
        Some(DeliveryHour::Evening)
    );
    assert_eq!(w.store.list_subscribers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn non_interference_between_subscribers() {
    // Alice's final session must match a run where Bob's events never happen.
    let alice_events = [
        Event::Command(Command::SelectCategory),
        pick(ControlToken::Category(Category::Hope)),
        pick(ControlToken::Back),
        pick(ControlToken::Category(Category::Love)),
    ];
    let bob_events = [
        Event::Command(Command::SelectCategory),
        pick(ControlToken::Category(Category::Happiness)),
        pick(ControlToken::Hour(DeliveryHour::Morning)),
    ];

    let solo = world().await;
    let alice = SubscriberId(1);
    drive(&solo, alice, &alice_events).await;
    let expected = solo.machine.sessions().get(alice).await;

    let interleaved = world().await;
    let bob = SubscriberId(2);
    for (a, b) in alice_events.iter().zip(bob_events.iter()) {
        interleaved
            .machine
            .handle_event(alice, "Alice", a.clone())
            .await
            .unwrap();
        interleaved
            .machine
            .handle_event(bob, "Bob", b.clone())
            .await
            .unwrap();
    }
    interleaved
        .machine
        .handle_event(alice, "Alice", alice_events[3].clone())
        .await
        .ok();

    let actual = interleaved.machine.sessions().get(alice).await;
    assert_eq!(actual.state, expected.state);
    assert_eq!(actual.pending_category, expected.pending_category);
    assert_eq!(actual.delivery, expected.delivery);
}

#[tokio::test]
async fn repeated_back_always_lands_on_the_category_menu() {
    let w = world().await;
    let alice = SubscriberId(21);

    drive(
        &w,
        alice,
        &[
            Event::Command(Command::SelectCategory),
            pick(ControlToken::Category(Category::Hope)),
            pick(ControlToken::Back),
            pick(ControlToken::Category(Category::Love)),
            pick(ControlToken::Back),
            pick(ControlToken::Back),
        ],
    )
    .await;

    let session = w.machine.sessions().get(alice).await;
    assert_eq!(session.state, ConversationState::CategoryMenu);
    let tokens: Vec<String> = w
        .gateway
        .last_render(alice)
        .await
        .unwrap()
        .controls
        .iter()
        .flatten()
        .map(|b| b.token.clone())
        .collect();
    assert_eq!(tokens, ["cat:happiness", "cat:love", "cat:hope"]);
}

#[tokio::test]
async fn full_feedback_cycle_lands_in_the_database() {
    let w = world().await;
    let alice = SubscriberId(31);

    drive(&w, alice, &onboarding_events(Category::Hope, DeliveryHour::Morning)).await;
    let quote = Quote::new(Category::Hope, "Hope is a waking dream.", Some("Aristotle"));
    w.store.insert_quote(&quote).await.unwrap();

    let subscriber = Subscriber::new(alice, "Tester", Category::Hope, DeliveryHour::Morning);
    w.machine.deliver(&subscriber).await.unwrap();
    assert_eq!(
        w.machine.sessions().get(alice).await.state,
        ConversationState::RatingPrompt
    );

    drive(
        &w,
        alice,
        &[
            pick(ControlToken::Rating(Rating::Excellent)),
            pick(ControlToken::Clarification(ClarificationTag::MadeMyDay)),
        ],
    )
    .await;

    // Capture the row id before finalization resets the session.
    let feedback_id = w
        .machine
        .sessions()
        .get(alice)
        .await
        .delivery
        .and_then(|d| d.feedback_id)
        .expect("rating should have created a feedback row");

    drive(
        &w,
        alice,
        &[
            pick(ControlToken::CommentYes),
            Event::Text("exactly what I needed today".into()),
        ],
    )
    .await;

    assert_eq!(
        w.machine.sessions().get(alice).await.state,
        ConversationState::Idle
    );

    let row = w.store.get_feedback(feedback_id).await.unwrap().unwrap();
    assert_eq!(row.subscriber_id, alice);
    assert_eq!(row.quote_id, quote.id);
    assert_eq!(row.rating, Rating::Excellent);
    assert_eq!(row.clarification, Some(ClarificationTag::MadeMyDay));
    assert_eq!(row.comment.as_deref(), Some("exactly what I needed today"));
    assert!(row.finalized_at.is_some());
}

#[tokio::test]
async fn delivery_with_empty_pool_changes_nothing() {
    let w = world().await;
    let alice = SubscriberId(41);

    drive(&w, alice, &onboarding_events(Category::Love, DeliveryHour::Noon)).await;
    let before = w.machine.sessions().get(alice).await;
    let sends_before = w.gateway.sent.lock().await.len();

    let subscriber = Subscriber::new(alice, "Tester", Category::Love, DeliveryHour::Noon);
    w.machine.deliver(&subscriber).await.unwrap();

    assert_eq!(w.machine.sessions().get(alice).await, before);
    assert_eq!(w.gateway.sent.lock().await.len(), sends_before);
    assert_eq!(w.scheduler.armed_hour(alice).await, Some(DeliveryHour::Noon));
}

#[tokio::test]
async fn file_backed_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quotecast.db");

    {
        let store = LibSqlBackend::new_local(&path).await.unwrap();
        store
            .insert_subscriber(&Subscriber::new(
                SubscriberId(5),
                "Tester",
                Category::Happiness,
                DeliveryHour::Evening,
            ))
            .await
            .unwrap();
    }

    let reopened = LibSqlBackend::new_local(&path).await.unwrap();
    let subscribers = reopened.list_subscribers().await.unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].hour, DeliveryHour::Evening);
}
