//! The conversation state machine.
//!
//! All transitions live in one `match` over `(state, event)` in
//! [`DialogueMachine::handle_event`]. The per-subscriber entry lock from the
//! session store is held for the whole transition, so events from the same
//! subscriber apply in arrival order while different subscribers proceed in
//! parallel. Delivery firings instead use the split compute/commit path
//! (`compare_and_transition`) because they start from a timer, not a lock.

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;

use crate::dialogue::event::{Command, ControlToken, Event};
use crate::dialogue::menu;
use crate::error::Result;
use crate::model::{ClarificationTag, DeliveryHour, Rating, Subscriber, SubscriberId};
use crate::scheduler::{DeliveryHandler, DeliveryScheduler};
use crate::session::{ConversationState, DeliveryContext, Session, SessionStore, StoredMenu};
use crate::store::{NewFeedback, Store};
use crate::transport::{Gateway, InboundEvent, InboundPayload, MessageId, Render};

pub struct DialogueMachine {
    sessions: Arc<SessionStore>,
    store: Arc<dyn Store>,
    gateway: Arc<dyn Gateway>,
    scheduler: OnceLock<Arc<DeliveryScheduler>>,
    comment_word_limit: usize,
}

impl DialogueMachine {
    pub fn new(
        sessions: Arc<SessionStore>,
        store: Arc<dyn Store>,
        gateway: Arc<dyn Gateway>,
        comment_word_limit: usize,
    ) -> Self {
        Self {
            sessions,
            store,
            gateway,
            scheduler: OnceLock::new(),
            comment_word_limit,
        }
    }

    /// Wire up the delivery scheduler. Called once at composition time;
    /// until then, completed onboardings are persisted but no job is armed.
    pub fn attach_scheduler(&self, scheduler: Arc<DeliveryScheduler>) {
        if self.scheduler.set(scheduler).is_err() {
            tracing::warn!("Scheduler already attached; ignoring");
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Normalize a transport payload into an [`Event`]. Unknown commands and
    /// tokens outside the closed enumeration drop to `None` with a debug log.
    fn parse_payload(payload: InboundPayload) -> Option<Event> {
        match payload {
            InboundPayload::Command(ref name) => match Command::parse(name) {
                Some(cmd) => Some(Event::Command(cmd)),
                None => {
                    tracing::debug!(command = %name, "Ignoring unknown command");
                    None
                }
            },
            InboundPayload::Selection { ref token, message } => match token.parse::<ControlToken>() {
                Ok(parsed) => Some(Event::Control(parsed, message)),
                Err(e) => {
                    tracing::debug!(%e, "Ignoring unrecognized control token");
                    None
                }
            },
            InboundPayload::Text(text) => Some(Event::Text(text)),
        }
    }

    /// Normalize a transport event and run it through the transition table,
    /// taking the subscriber's session lock internally.
    pub async fn handle_inbound(&self, inbound: InboundEvent) -> Result<()> {
        let subscriber = inbound.subscriber;
        let display_name = inbound.display_name.clone();
        let Some(event) = Self::parse_payload(inbound.payload) else {
            return Ok(());
        };
        self.handle_event(subscriber, &display_name, event).await
    }

    /// Like [`handle_inbound`](Self::handle_inbound), for callers that
    /// already hold the subscriber's session lock. The dispatcher acquires
    /// guards in transport order, which is what makes same-subscriber events
    /// apply in arrival order even though each runs on its own task.
    pub async fn handle_inbound_locked(
        &self,
        inbound: InboundEvent,
        session: &mut Session,
    ) -> Result<()> {
        let subscriber = inbound.subscriber;
        let display_name = inbound.display_name.clone();
        let Some(event) = Self::parse_payload(inbound.payload) else {
            return Ok(());
        };
        self.apply(subscriber, &display_name, event, session).await
    }

    /// Apply one event to one subscriber's session, holding the entry lock
    /// for the whole transition.
    pub async fn handle_event(
        &self,
        id: SubscriberId,
        display_name: &str,
        event: Event,
    ) -> Result<()> {
        let entry = self.sessions.entry(id).await;
        let mut session = entry.lock().await;
        self.apply(id, display_name, event, &mut session).await
    }

    /// The transition table.
    ///
    /// Pairs not listed are stale or unsolicited input and are dropped
    /// without a render — intentionally, not as a missing feature.
    async fn apply(
        &self,
        id: SubscriberId,
        display_name: &str,
        event: Event,
        session: &mut Session,
    ) -> Result<()> {
        use ConversationState::*;

        tracing::debug!(subscriber = %id, state = %session.state, ?event, "Dialogue event");

        match (session.state, event) {
            // ── Commands ────────────────────────────────────────────
            (_, Event::Command(Command::Start)) => {
                self.send(id, &menu::welcome()).await;
            }

            (state, Event::Command(Command::SelectCategory)) if state.accepts_select_category() => {
                self.open_category_menu(id, session).await;
            }

            (state, Event::Command(Command::SelectCategory)) => {
                tracing::debug!(subscriber = %id, %state, "select_category ignored mid-flow");
            }

            // ── Onboarding ──────────────────────────────────────────
            (CategoryMenu, Event::Control(ControlToken::Category(category), message)) => {
                session.pending_category = Some(category);
                session.state = TimeMenu;
                session.menu_message = self
                    .edit_or_send(id, Some(message), &menu::time_menu())
                    .await;
            }

            (TimeMenu, Event::Control(ControlToken::Hour(hour), message)) => {
                self.complete_onboarding(id, display_name, hour, message, session)
                    .await;
            }

            // ── Feedback: rating ────────────────────────────────────
            (RatingPrompt, Event::Control(ControlToken::Rating(rating), message)) => {
                self.record_rating(id, rating, message, session).await;
            }

            // ── Feedback: clarification ─────────────────────────────
            (ClarificationMenu, Event::Control(ControlToken::Clarification(tag), message)) => {
                self.record_clarification(id, tag, message, session)
                    .await;
            }

            // ── Feedback: comment decision ──────────────────────────
            (CommentDecision, Event::Control(ControlToken::CommentYes, message)) => {
                session.state = AwaitingComment;
                session.awaiting_free_text = true;
                session.menu_message = self
                    .edit_or_send(id, Some(message), &menu::comment_prompt(self.comment_word_limit))
                    .await;
            }

            (CommentDecision, Event::Control(ControlToken::CommentNo, message)) => {
                self.finalize_feedback(id, None, Some(message), session)
                    .await;
            }

            // ── Feedback: comment entry & cancellation ──────────────
            (AwaitingComment, Event::Control(ControlToken::CommentCancel, message)) => {
                session.state = CancelConfirm;
                session.awaiting_free_text = false;
                session.menu_message = self
                    .edit_or_send(id, Some(message), &menu::cancel_confirm())
                    .await;
            }

            (CancelConfirm, Event::Control(ControlToken::CancelYes, message)) => {
                session.awaiting_free_text = false;
                self.finalize_feedback(id, None, Some(message), session)
                    .await;
            }

            (CancelConfirm, Event::Control(ControlToken::CancelNo, message)) => {
                session.state = AwaitingComment;
                session.awaiting_free_text = true;
                session.menu_message = self
                    .edit_or_send(id, Some(message), &menu::comment_prompt(self.comment_word_limit))
                    .await;
            }

            (AwaitingComment, Event::Text(text)) => {
                if word_count(&text) > self.comment_word_limit {
                    tracing::debug!(subscriber = %id, "Comment over word limit; re-prompting");
                    session.menu_message = self
                        .send(id, &menu::comment_prompt(self.comment_word_limit))
                        .await;
                } else {
                    session.awaiting_free_text = false;
                    self.finalize_feedback(id, Some(text), None, session)
                        .await;
                }
            }

            // ── Back navigation ─────────────────────────────────────
            (_, Event::Control(ControlToken::Back, message)) => {
                match session.last_menu.clone() {
                    Some(stored) => {
                        session.state = stored.state;
                        session.menu_message = self
                            .edit_or_send(id, Some(message), &stored.render)
                            .await;
                    }
                    None => {
                        tracing::debug!(subscriber = %id, "Back with no stored menu; ignored");
                    }
                }
            }

            // ── Unsolicited free text: silently ignored ─────────────
            (_, Event::Text(_)) => {
                tracing::debug!(subscriber = %id, "Unsolicited free text ignored");
            }

            // ── Stale controls from old menus ───────────────────────
            (state, Event::Control(token, _)) => {
                tracing::debug!(subscriber = %id, %state, ?token, "Stale control token ignored");
            }
        }

        Ok(())
    }

    // ── Transition bodies ───────────────────────────────────────────

    async fn open_category_menu(&self, id: SubscriberId, session: &mut Session) {
        let render = menu::category_menu();
        session.state = ConversationState::CategoryMenu;
        session.pending_category = None;
        // The category menu is the root of back navigation: remember it
        // verbatim so the time menu's back control can restore it.
        session.last_menu = Some(StoredMenu {
            state: ConversationState::CategoryMenu,
            render: render.clone(),
        });
        session.menu_message = self.send(id, &render).await;
    }

    /// `TimeMenu` + hour: persist the subscriber, arm the delivery job, and
    /// confirm. On persistence failure the session stays in `TimeMenu` and
    /// no job is created.
    async fn complete_onboarding(
        &self,
        id: SubscriberId,
        display_name: &str,
        hour: DeliveryHour,
        message: MessageId,
        session: &mut Session,
    ) {
        let Some(category) = session.pending_category else {
            tracing::warn!(subscriber = %id, "Hour chosen with no pending category; ignoring");
            return;
        };

        let subscriber = Subscriber::new(id, display_name, category, hour);
        if let Err(e) = self.store.insert_subscriber(&subscriber).await {
            tracing::warn!(subscriber = %id, %e, "Subscriber insert failed");
            self.send(id, &menu::retry_notice()).await;
            return;
        }

        match self.scheduler.get() {
            Some(scheduler) => scheduler.upsert_job(subscriber).await,
            None => tracing::debug!(subscriber = %id, "No scheduler attached; job not armed"),
        }

        session.state = ConversationState::Subscribed;
        session.pending_category = None;
        session.last_menu = None;
        session.menu_message = None;
        self.edit_or_send(id, Some(message), &menu::subscription_confirmed(category, hour))
            .await;
    }

    /// `RatingPrompt` + rating: create (or re-point) the feedback row, then
    /// open the rating-specific clarification menu.
    async fn record_rating(
        &self,
        id: SubscriberId,
        rating: Rating,
        message: MessageId,
        session: &mut Session,
    ) {
        let Some(mut delivery) = session.delivery else {
            tracing::warn!(subscriber = %id, "Rating with no delivery context; ignoring");
            return;
        };

        // A back from the clarification menu can land here a second time;
        // the existing row is updated rather than duplicated.
        let feedback_id = match delivery.feedback_id {
            Some(existing) => {
                if let Err(e) = self.store.update_feedback_rating(existing, rating).await {
                    tracing::warn!(subscriber = %id, %e, "Feedback rating update failed");
                    self.send(id, &menu::retry_notice()).await;
                    return;
                }
                existing
            }
            None => {
                let new = NewFeedback {
                    subscriber_id: id,
                    quote_id: delivery.quote_id,
                    rating,
                };
                match self.store.insert_feedback(&new).await {
                    Ok(feedback_id) => feedback_id,
                    Err(e) => {
                        tracing::warn!(subscriber = %id, %e, "Feedback insert failed");
                        self.send(id, &menu::retry_notice()).await;
                        return;
                    }
                }
            }
        };

        delivery.rating = Some(rating);
        delivery.feedback_id = Some(feedback_id);
        session.delivery = Some(delivery);
        session.state = ConversationState::ClarificationMenu;
        session.menu_message = self
            .edit_or_send(id, Some(message), &menu::clarification_menu(rating))
            .await;
    }

    /// `ClarificationMenu` + tag: persist immediately, so partial feedback
    /// survives an abandoned comment step.
    async fn record_clarification(
        &self,
        id: SubscriberId,
        tag: ClarificationTag,
        message: MessageId,
        session: &mut Session,
    ) {
        let Some(delivery) = session.delivery else {
            tracing::warn!(subscriber = %id, "Clarification with no delivery context; ignoring");
            return;
        };
        let (Some(rating), Some(feedback_id)) = (delivery.rating, delivery.feedback_id) else {
            tracing::warn!(subscriber = %id, "Clarification before rating; ignoring");
            return;
        };
        if tag.rating() != rating {
            tracing::debug!(subscriber = %id, %tag, %rating, "Clarification from a stale menu ignored");
            return;
        }

        if let Err(e) = self.store.update_feedback_clarification(feedback_id, tag).await {
            tracing::warn!(subscriber = %id, %e, "Clarification update failed");
            self.send(id, &menu::retry_notice()).await;
            return;
        }

        session.state = ConversationState::CommentDecision;
        session.menu_message = self
            .edit_or_send(id, Some(message), &menu::comment_decision())
            .await;
    }

    /// Close out the feedback cycle: persist the (optional) comment, thank
    /// the subscriber, and return the session to idle.
    async fn finalize_feedback(
        &self,
        id: SubscriberId,
        comment: Option<String>,
        menu_message: Option<MessageId>,
        session: &mut Session,
    ) {
        let Some(feedback_id) = session.delivery.and_then(|d| d.feedback_id) else {
            tracing::warn!(subscriber = %id, "Finalize with no feedback row; resetting session");
            session.reset();
            return;
        };

        if let Err(e) = self
            .store
            .finalize_feedback(feedback_id, comment.as_deref())
            .await
        {
            tracing::warn!(subscriber = %id, %e, "Feedback finalize failed");
            self.send(id, &menu::retry_notice()).await;
            return;
        }

        self.edit_or_send(id, menu_message, &menu::thanks()).await;
        session.reset();
    }

    // ── Transport helpers ───────────────────────────────────────────
    //
    // Send failures are logged and swallowed: the session keeps the state
    // the transition computed, and nothing is re-rendered.

    async fn send(&self, id: SubscriberId, render: &Render) -> Option<MessageId> {
        match self.gateway.send(id, render).await {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(subscriber = %id, %e, "Send failed");
                None
            }
        }
    }

    async fn edit_or_send(
        &self,
        id: SubscriberId,
        message: Option<MessageId>,
        render: &Render,
    ) -> Option<MessageId> {
        if let Some(message) = message {
            match self.gateway.edit(id, message, render).await {
                Ok(()) => return Some(message),
                Err(e) => {
                    tracing::debug!(subscriber = %id, %e, "Edit failed; sending fresh message");
                }
            }
        }
        self.send(id, render).await
    }
}

#[async_trait]
impl DeliveryHandler for DialogueMachine {
    /// One delivery firing: fetch a quote, render it, and open the feedback
    /// flow. Runs without the entry lock; the transition is committed with
    /// `compare_and_transition` so a subscriber who raced past us keeps
    /// their state.
    async fn deliver(&self, subscriber: &Subscriber) -> Result<()> {
        let quote = match self.store.get_quote(subscriber.category).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                tracing::warn!(
                    subscriber = %subscriber.id,
                    category = %subscriber.category,
                    "No quote available; skipping this firing"
                );
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(subscriber = %subscriber.id, %e, "Quote fetch failed; skipping this firing");
                return Ok(());
            }
        };

        let before = self.sessions.get(subscriber.id).await;

        self.send(subscriber.id, &menu::quote(&quote)).await;

        if !before.state.accepts_delivery_prompt() {
            tracing::debug!(
                subscriber = %subscriber.id,
                state = %before.state,
                "Subscriber mid-dialogue; quote delivered without rating prompt"
            );
            return Ok(());
        }

        let rating_menu = menu::rating_menu();
        let menu_message = self.send(subscriber.id, &rating_menu).await;

        let mut next = Session::idle();
        next.state = ConversationState::RatingPrompt;
        next.delivery = Some(DeliveryContext::new(quote.id));
        next.last_menu = Some(StoredMenu {
            state: ConversationState::RatingPrompt,
            render: rating_menu,
        });
        next.menu_message = menu_message;

        if !self
            .sessions
            .compare_and_transition(subscriber.id, before.state, next)
            .await
        {
            tracing::debug!(
                subscriber = %subscriber.id,
                "Session moved during delivery; rating prompt dropped"
            );
        }

        Ok(())
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
