use std::io::{self, Write};

use serde_json::json;

/// Outbound channel to the chat collaborator for status, error and
/// selection messages.
pub trait Notifier: Send + Sync {
    /// Returns false when the collaborator could not take the message.
    fn notify(&self, conversation_id: &str, text: &str) -> bool;
}

/// Writes `{"type":"notify",...}` frames to stdout, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, conversation_id: &str, text: &str) -> bool {
        let frame = notify_frame(conversation_id, text);
        let mut stdout = io::stdout().lock();
        match writeln!(stdout, "{}", frame).and_then(|_| stdout.flush()) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(target = "window_bridge::notify", conversation = %conversation_id, error = %error, "failed writing notify frame");
                false
            }
        }
    }
}

pub fn notify_frame(conversation_id: &str, text: &str) -> serde_json::Value {
    json!({
        "type": "notify",
        "conversation_id": conversation_id,
        "text": text,
    })
}
