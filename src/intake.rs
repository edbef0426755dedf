//! Frames from the chat collaborator, one JSON object per stdin line.
//!
//! Commands (`/ws`, bare numbers, card selections) are answered here and
//! never reach the router; everything else is queued for injection.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{notify::Notifier, registry::WorkspaceRegistry, router::selection_prompt, types::InboundMessage};

pub const LIST_COMMANDS: &[&str] = &["/ws", "/workspace", "/切换", "/目录"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message {
        text: String,
        sender_id: String,
        conversation_id: Option<String>,
        msg_type: String,
    },
    SelectWorkspace {
        sender_id: String,
        conversation_id: Option<String>,
        name: String,
    },
}

impl Frame {
    fn sender_id(&self) -> &str {
        match self {
            Frame::Message { sender_id, .. } | Frame::SelectWorkspace { sender_id, .. } => sender_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Parse one inbound line. Accepts `open_id`/`chat_id` aliases and the
/// nested `event.message` shape where text may sit in a JSON `content` string.
pub fn parse_frame(line: &str) -> Result<Frame, FrameError> {
    let root: Value = serde_json::from_str(line)?;

    if let Some(event) = root.get("event") {
        let message = event.get("message").unwrap_or(event);
        let sender_id = event
            .get("sender")
            .and_then(|s| s.get("sender_id").unwrap_or(s).get("open_id"))
            .and_then(Value::as_str)
            .or_else(|| str_field(message, &["sender_id", "open_id"]))
            .unwrap_or_default()
            .to_string();
        let msg_type = str_field(message, &["msg_type", "message_type"])
            .unwrap_or("text")
            .to_string();
        return Ok(Frame::Message {
            text: message_text(message),
            sender_id,
            conversation_id: str_field(message, &["conversation_id", "chat_id"]).map(ToOwned::to_owned),
            msg_type,
        });
    }

    let kind = str_field(&root, &["type"]).unwrap_or("message");
    let sender_id = str_field(&root, &["sender_id", "open_id"])
        .unwrap_or_default()
        .to_string();
    let conversation_id = str_field(&root, &["conversation_id", "chat_id"]).map(ToOwned::to_owned);
    match kind {
        "message" => Ok(Frame::Message {
            text: message_text(&root),
            sender_id,
            conversation_id,
            msg_type: str_field(&root, &["msg_type", "message_type"])
                .unwrap_or("text")
                .to_string(),
        }),
        "select_workspace" => Ok(Frame::SelectWorkspace {
            sender_id,
            conversation_id,
            name: str_field(&root, &["name", "workspace"]).unwrap_or_default().to_string(),
        }),
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

fn message_text(value: &Value) -> String {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    // Platform events carry `content` as an embedded JSON string.
    match value.get("content") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|inner| inner.get("text").and_then(Value::as_str).map(ToOwned::to_owned))
            .unwrap_or_else(|| raw.clone()),
        Some(Value::Object(inner)) => inner
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeAction {
    Ignored,
    Notified,
    Switched { index: usize },
    Enqueued,
    /// The router is gone; the message was lost.
    Dropped,
}

pub struct Intake {
    registry: Arc<WorkspaceRegistry>,
    notifier: Arc<dyn Notifier>,
    queue: mpsc::UnboundedSender<InboundMessage>,
    admin_sender_id: Option<String>,
    admin_hint_logged: AtomicBool,
}

impl Intake {
    pub fn new(
        registry: Arc<WorkspaceRegistry>,
        notifier: Arc<dyn Notifier>,
        queue: mpsc::UnboundedSender<InboundMessage>,
    ) -> Self {
        Self {
            registry,
            notifier,
            queue,
            admin_sender_id: None,
            admin_hint_logged: AtomicBool::new(false),
        }
    }

    /// Only accept frames from this sender.
    pub fn with_admin(mut self, admin_sender_id: Option<String>) -> Self {
        self.admin_sender_id = admin_sender_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn handle_line(&self, line: &str) -> IntakeAction {
        let line = line.trim();
        if line.is_empty() {
            return IntakeAction::Ignored;
        }
        match parse_frame(line) {
            Ok(frame) => self.handle_frame(frame),
            Err(error) => {
                tracing::warn!(target = "window_bridge::intake", error = %error, "unparseable frame skipped");
                IntakeAction::Ignored
            }
        }
    }

    pub fn handle_frame(&self, frame: Frame) -> IntakeAction {
        match &self.admin_sender_id {
            Some(admin) if admin != frame.sender_id() => {
                tracing::debug!(target = "window_bridge::intake", sender = %frame.sender_id(), "ignoring non-admin sender");
                return IntakeAction::Ignored;
            }
            None => {
                self.hint_admin(frame.sender_id());
            }
            _ => {}
        }

        match frame {
            Frame::SelectWorkspace {
                conversation_id,
                name,
                ..
            } => match self.registry.find_by_name(&name) {
                Some(index) => self.switch(index, conversation_id.as_deref()),
                None => {
                    self.reply(
                        conversation_id.as_deref(),
                        &format!("Unknown workspace {name}.\n\n{}", self.registry.display_text()),
                    );
                    IntakeAction::Notified
                }
            },
            Frame::Message {
                text,
                sender_id,
                conversation_id,
                msg_type,
            } => self.message(text, sender_id, conversation_id, &msg_type),
        }
    }

    fn message(
        &self,
        text: String,
        sender_id: String,
        conversation_id: Option<String>,
        msg_type: &str,
    ) -> IntakeAction {
        let conversation = conversation_id.as_deref();
        if msg_type != "text" {
            self.reply(
                conversation,
                &format!("Message type {msg_type} is not supported yet; please send text."),
            );
            return IntakeAction::Notified;
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return IntakeAction::Ignored;
        }

        if LIST_COMMANDS.contains(&trimmed) {
            self.reply(conversation, &selection_prompt(&self.registry.display_text()));
            return IntakeAction::Notified;
        }

        if let Ok(number) = trimmed.parse::<usize>() {
            if (1..=self.registry.len()).contains(&number) {
                return self.switch(number - 1, conversation);
            }
            self.reply(
                conversation,
                &format!("No workspace numbered {number}.\n\n{}", self.registry.display_text()),
            );
            return IntakeAction::Notified;
        }

        let message = InboundMessage {
            text,
            sender_id,
            conversation_id,
        };
        match self.queue.send(message) {
            Ok(()) => IntakeAction::Enqueued,
            Err(_) => {
                tracing::error!(target = "window_bridge::intake", "router queue closed, message dropped");
                IntakeAction::Dropped
            }
        }
    }

    fn switch(&self, index: usize, conversation: Option<&str>) -> IntakeAction {
        if !self.registry.switch_workspace(index, conversation) {
            return IntakeAction::Ignored;
        }
        let name = self
            .registry
            .workspace(index)
            .map(|ws| ws.name)
            .unwrap_or_default();
        self.reply(
            conversation,
            &format!("Switched to workspace {}. {name}", index + 1),
        );
        if let Err(error) = self.registry.ensure_started(index) {
            tracing::error!(target = "window_bridge::intake", index, error = %error, "failed to start assistant after switch");
            self.reply(conversation, &crate::router::failure_notice(&name));
        }
        IntakeAction::Switched { index }
    }

    /// Log the first sender once so it can be copied into `ADMIN_SENDER_ID`.
    /// Returns whether this call logged.
    fn hint_admin(&self, sender_id: &str) -> bool {
        if sender_id.is_empty() || self.admin_hint_logged.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::info!(target = "window_bridge::intake", sender = %sender_id, "ADMIN_SENDER_ID is not set; add ADMIN_SENDER_ID={sender_id} to .env to accept only this sender");
        true
    }

    fn reply(&self, conversation: Option<&str>, text: &str) {
        match conversation {
            Some(conversation) => {
                self.notifier.notify(conversation, text);
            }
            None => tracing::info!(target = "window_bridge::intake", text = %text, "reply without conversation"),
        }
    }
}
