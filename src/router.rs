//! Single consumer that moves queued chat messages into assistant windows.
//!
//! Messages are handled strictly in arrival order, one at a time, including
//! messages for different workspaces: keystrokes go to whichever window has
//! focus, so injections must never interleave.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    inject::TextInjector,
    notify::Notifier,
    registry::WorkspaceRegistry,
    sidefile,
    types::{Binding, InboundMessage},
};

/// Prefix the collaborator puts on text produced by a card button.
pub const CARD_INTERACTION_MARKER: &str = "[Card Interaction]";

/// Build the text typed into the assistant, carrying enough routing context
/// for the reply to find its way back.
pub fn wrap_payload(workspace: &str, conversation_id: Option<&str>, text: &str) -> String {
    let interaction = text.starts_with(CARD_INTERACTION_MARKER);
    let mut lines = Vec::with_capacity(8);
    if interaction {
        lines.push("[System] This message comes from the chat bridge (card interaction).".to_string());
    } else {
        lines.push("[System] This message comes from the chat bridge.".to_string());
    }
    lines.push(format!("- Workspace: {workspace}"));
    if let Some(conversation) = conversation_id {
        lines.push(format!("- Conversation: {conversation}"));
    }
    if interaction {
        lines.push("- The user clicked a card button; continue from their choice.".to_string());
    }
    lines.push("- Reply through the chat bot tool.".to_string());
    lines.push(String::new());
    lines.push(if interaction { "Interaction:" } else { "User message:" }.to_string());
    lines.push(text.to_string());
    lines.join("\n")
}

pub fn selection_prompt(listing: &str) -> String {
    format!("This conversation is not bound to a workspace yet. Choose one, then resend your message.\n\n{listing}\n\nReply with a number or /ws.")
}

pub fn failure_notice(workspace: &str) -> String {
    format!("Could not reach the assistant for workspace {workspace}; please start or restore the window.")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RouteOutcome {
    Delivered { index: usize },
    /// Dropped; the conversation was asked to pick a workspace.
    NeedsBinding,
    Failed { index: Option<usize>, reason: String },
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub marker_file: String,
    pub env_key: String,
    /// Persist bindings after this many processed messages; 0 disables.
    pub persist_every: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            marker_file: ".feishu_current_chat_id".to_string(),
            env_key: "FEISHU_CURRENT_CHAT_ID".to_string(),
            persist_every: 10,
        }
    }
}

pub struct MessageRouter {
    registry: Arc<WorkspaceRegistry>,
    notifier: Arc<dyn Notifier>,
    injector: TextInjector,
    settings: RouterSettings,
    processed: u64,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<WorkspaceRegistry>,
        notifier: Arc<dyn Notifier>,
        injector: TextInjector,
        settings: RouterSettings,
    ) -> Self {
        Self {
            registry,
            notifier,
            injector,
            settings,
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Consume until every sender is dropped. Returns the processed count.
    pub fn run(mut self, mut rx: mpsc::UnboundedReceiver<InboundMessage>) -> u64 {
        tracing::info!(target = "window_bridge::router", "router started");
        while let Some(message) = rx.blocking_recv() {
            let outcome = self.handle(message);
            tracing::debug!(target = "window_bridge::router", outcome = ?outcome, "message handled");
        }
        tracing::info!(target = "window_bridge::router", processed = self.processed, "router stopped");
        self.processed
    }

    /// Route one message. Never panics on delivery problems; every failure
    /// with a conversation produces exactly one notification.
    pub fn handle(&mut self, message: InboundMessage) -> RouteOutcome {
        let outcome = self.route(&message);
        self.processed += 1;
        if self.settings.persist_every > 0 && self.processed % self.settings.persist_every == 0 {
            if let Err(error) = self.registry.persist() {
                tracing::warn!(target = "window_bridge::router", error = %error, "periodic binding save failed");
            }
        }
        outcome
    }

    fn route(&mut self, message: &InboundMessage) -> RouteOutcome {
        let conversation = message.conversation_id.as_deref();

        let index = match conversation {
            Some(conversation) => match self.registry.binding(conversation) {
                Binding::Bound(index) => index,
                Binding::Unbound | Binding::Stale(_) => {
                    tracing::info!(target = "window_bridge::router", conversation = %conversation, "conversation has no workspace, prompting");
                    let prompt = selection_prompt(&self.registry.display_text());
                    self.notifier.notify(conversation, &prompt);
                    return RouteOutcome::NeedsBinding;
                }
            },
            None => self.registry.current_index(),
        };

        let Some(workspace) = self.registry.workspace(index) else {
            return self.fail(conversation, None, "workspace", "no workspace configured".to_string());
        };

        tracing::info!(target = "window_bridge::router", index, workspace = %workspace.name, sender = %message.sender_id, "routing message");

        if let Err(error) = self.registry.get_or_create_sender(index) {
            return self.fail(conversation, Some(index), &workspace.name, error.to_string());
        }
        let Some(window) = self.registry.confirm_window(index) else {
            return self.fail(
                conversation,
                Some(index),
                &workspace.name,
                "window not found".to_string(),
            );
        };

        if let Some(conversation) = conversation {
            self.write_side_files(&workspace.path, conversation);
        }

        let payload = wrap_payload(&workspace.name, conversation, &message.text);
        let result = self.injector.deliver(window.handle, &payload);
        self.registry.record_delivery(index, result.delivered);
        if !result.delivered {
            let reason = result.error.unwrap_or_else(|| "injection failed".to_string());
            return self.fail(conversation, Some(index), &workspace.name, reason);
        }

        tracing::info!(target = "window_bridge::router", index, workspace = %workspace.name, hwnd = %window.handle, "message injected");
        RouteOutcome::Delivered { index }
    }

    fn write_side_files(&self, dir: &std::path::Path, conversation: &str) {
        if let Err(error) =
            sidefile::write_conversation_marker(dir, &self.settings.marker_file, conversation)
        {
            tracing::warn!(target = "window_bridge::router", dir = %dir.display(), error = %error, "failed writing conversation marker");
        }
        match sidefile::update_env_key(dir, &self.settings.env_key, conversation) {
            Ok(true) => {
                tracing::debug!(target = "window_bridge::router", key = %self.settings.env_key, conversation = %conversation, "workspace env updated")
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(target = "window_bridge::router", dir = %dir.display(), error = %error, "failed updating workspace env")
            }
        }
    }

    fn fail(
        &self,
        conversation: Option<&str>,
        index: Option<usize>,
        workspace: &str,
        reason: String,
    ) -> RouteOutcome {
        tracing::error!(target = "window_bridge::router", index = ?index, workspace = %workspace, reason = %reason, "delivery failed");
        if let Some(conversation) = conversation {
            self.notifier.notify(conversation, &failure_notice(workspace));
        }
        RouteOutcome::Failed { index, reason }
    }
}
