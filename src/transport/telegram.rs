//! Telegram gateway — long-polls the Bot API for updates.
//!
//! Messages and callback queries are normalized into [`InboundEvent`]s;
//! outbound renders become `sendMessage`/`editMessageText` calls with
//! inline keyboards.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::model::SubscriberId;
use crate::transport::{Button, EventStream, Gateway, InboundEvent, InboundPayload, MessageId, Render};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram gateway — connects to the Bot API via long-polling.
pub struct TelegramGateway {
    bot_token: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(bot_token: String, poll_timeout_secs: u64) -> Self {
        Self {
            bot_token,
            poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Verify the token against `getMe` before starting the poll loop.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Http(format!(
                "getMe returned {}",
                resp.status()
            )))
        }
    }

    /// Register the bot's command list (shown in the Telegram command menu).
    pub async fn set_my_commands(&self) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "commands": [
                { "command": "start", "description": "Start the bot" },
                { "command": "select_category", "description": "Select a quote category" },
            ]
        });

        let resp = self
            .client
            .post(self.api_url("setMyCommands"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::Http(format!(
                "setMyCommands returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Spawn the long-poll loop and return the normalized event stream.
    pub fn start(&self) -> EventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let poll_timeout = self.poll_timeout_secs;
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram gateway listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    // Callback queries are acknowledged immediately so the
                    // client stops showing a spinner, regardless of whether
                    // the token turns out to be stale.
                    if let Some(cb) = update.get("callback_query") {
                        if let Some(id) = cb.get("id").and_then(serde_json::Value::as_str) {
                            ack_callback(&client, &bot_token, id).await;
                        }
                    }

                    let event = match parse_update(update) {
                        Ok(Some(ev)) => ev,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::debug!("Skipping update: {e}");
                            continue;
                        }
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram event stream closed");
                        return;
                    }
                }
            }
        });

        let stream =
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) });
        Box::pin(stream)
    }

    /// Send a single message, Markdown-first with plain-text fallback.
    async fn send_message(
        &self,
        chat: SubscriberId,
        render: &Render,
    ) -> Result<MessageId, TransportError> {
        let text = truncate_message(&render.text);

        let mut body = serde_json::json!({
            "chat_id": chat.0,
            "text": text,
            "parse_mode": "Markdown",
        });
        if render.has_controls() {
            body["reply_markup"] = inline_keyboard(&render.controls);
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed {
                chat: chat.0,
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            let data: serde_json::Value =
                resp.json().await.map_err(|e| TransportError::SendFailed {
                    chat: chat.0,
                    reason: e.to_string(),
                })?;
            return extract_message_id(&data, chat);
        }

        let markdown_status = resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        // Retry without parse_mode
        if let Some(obj) = body.as_object_mut() {
            obj.remove("parse_mode");
        }
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed {
                chat: chat.0,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed {
                chat: chat.0,
                reason: format!("sendMessage failed (markdown: {markdown_status}, plain: {err})"),
            });
        }

        let data: serde_json::Value =
            resp.json().await.map_err(|e| TransportError::SendFailed {
                chat: chat.0,
                reason: e.to_string(),
            })?;
        extract_message_id(&data, chat)
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send(&self, chat: SubscriberId, render: &Render) -> Result<MessageId, TransportError> {
        self.send_message(chat, render).await
    }

    async fn edit(
        &self,
        chat: SubscriberId,
        message: MessageId,
        render: &Render,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({
            "chat_id": chat.0,
            "message_id": message.0,
            "text": truncate_message(&render.text),
            "parse_mode": "Markdown",
        });
        if render.has_controls() {
            body["reply_markup"] = inline_keyboard(&render.controls);
        }

        let resp = self
            .client
            .post(self.api_url("editMessageText"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::EditFailed {
                chat: chat.0,
                message: message.0,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::EditFailed {
                chat: chat.0,
                message: message.0,
                reason: err,
            });
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build the `reply_markup` JSON for a control layout.
fn inline_keyboard(controls: &[Vec<Button>]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = controls
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.token }))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Normalize a raw update into an [`InboundEvent`], if it carries one.
fn parse_update(update: &serde_json::Value) -> Result<Option<InboundEvent>, TransportError> {
    if let Some(cb) = update.get("callback_query") {
        let from = cb
            .get("from")
            .ok_or_else(|| TransportError::InvalidUpdate("callback_query without from".into()))?;
        let user_id = from
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| TransportError::InvalidUpdate("callback_query without user id".into()))?;
        let Some(token) = cb.get("data").and_then(serde_json::Value::as_str) else {
            return Ok(None);
        };
        let message_id = cb
            .get("message")
            .and_then(|m| m.get("message_id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| TransportError::InvalidUpdate("callback_query without message".into()))?;

        return Ok(Some(InboundEvent {
            subscriber: SubscriberId(user_id),
            display_name: first_name(from),
            payload: InboundPayload::Selection {
                token: token.to_string(),
                message: MessageId(message_id),
            },
        }));
    }

    if let Some(message) = update.get("message") {
        let Some(text) = message.get("text").and_then(serde_json::Value::as_str) else {
            return Ok(None);
        };
        let from = message
            .get("from")
            .ok_or_else(|| TransportError::InvalidUpdate("message without from".into()))?;
        let user_id = from
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| TransportError::InvalidUpdate("message without user id".into()))?;

        let payload = match text.strip_prefix('/') {
            Some(command) => {
                // "/start@MyBot arg" → "start"
                let name = command
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .split('@')
                    .next()
                    .unwrap_or("")
                    .to_string();
                InboundPayload::Command(name)
            }
            None => InboundPayload::Text(text.to_string()),
        };

        return Ok(Some(InboundEvent {
            subscriber: SubscriberId(user_id),
            display_name: first_name(from),
            payload,
        }));
    }

    Ok(None)
}

fn first_name(from: &serde_json::Value) -> String {
    from.get("first_name")
        .and_then(serde_json::Value::as_str)
        .or_else(|| from.get("username").and_then(serde_json::Value::as_str))
        .unwrap_or("subscriber")
        .to_string()
}

async fn ack_callback(client: &reqwest::Client, bot_token: &str, callback_id: &str) {
    let url = format!("https://api.telegram.org/bot{bot_token}/answerCallbackQuery");
    let body = serde_json::json!({ "callback_query_id": callback_id });
    if let Err(e) = client.post(&url).json(&body).send().await {
        tracing::debug!("answerCallbackQuery failed: {e}");
    }
}

fn extract_message_id(
    data: &serde_json::Value,
    chat: SubscriberId,
) -> Result<MessageId, TransportError> {
    data.get("result")
        .and_then(|r| r.get("message_id"))
        .and_then(serde_json::Value::as_i64)
        .map(MessageId)
        .ok_or_else(|| TransportError::SendFailed {
            chat: chat.0,
            reason: "sendMessage response missing message_id".into(),
        })
}

/// Quote texts are short; anything over the API limit is hard-cut rather
/// than split into multiple messages (menus must stay attached to one).
fn truncate_message(text: &str) -> &str {
    if text.len() <= TELEGRAM_MAX_MESSAGE_LENGTH {
        return text;
    }
    let mut end = TELEGRAM_MAX_MESSAGE_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
