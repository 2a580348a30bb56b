//! Transport abstraction — inbound events and outbound render instructions.

pub mod telegram;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportError;
use crate::model::SubscriberId;

pub use telegram::TelegramGateway;

/// Identifier of a rendered message, needed to edit a menu in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub i64);

/// A single inline control (button) with its callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// An outbound render instruction: message text plus an optional control
/// layout (rows of inline buttons).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Render {
    pub text: String,
    pub controls: Vec<Vec<Button>>,
}

impl Render {
    /// Plain text, no controls.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
        }
    }

    /// Text with a control layout.
    pub fn menu(text: impl Into<String>, controls: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            controls,
        }
    }

    pub fn has_controls(&self) -> bool {
        !self.controls.is_empty()
    }
}

/// An inbound event from the transport, tagged with subscriber identity.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub subscriber: SubscriberId,
    pub display_name: String,
    pub payload: InboundPayload,
}

/// What the subscriber actually did.
#[derive(Debug, Clone)]
pub enum InboundPayload {
    /// A slash command, without the leading `/`.
    Command(String),
    /// A menu selection; `token` is the opaque callback string.
    Selection { token: String, message: MessageId },
    /// A free-text message.
    Text(String),
}

pub type EventStream = BoxStream<'static, InboundEvent>;

/// Outbound side of the transport, consumed by the dialogue machine and the
/// scheduler. Object-safe so tests can substitute a recording mock.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a new message, returning its id for later edits.
    async fn send(&self, chat: SubscriberId, render: &Render) -> Result<MessageId, TransportError>;

    /// Replace the text and controls of a previously sent message.
    async fn edit(
        &self,
        chat: SubscriberId,
        message: MessageId,
        render: &Render,
    ) -> Result<(), TransportError>;
}
