use std::path::PathBuf;

/// Failures surfaced by discovery, injection, launching and persistence.
///
/// A missing conversation binding is not represented here; see
/// [`crate::types::Binding`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no assistant process found")]
    ProcessNotFound,

    #[error("no usable window for workspace {workspace}")]
    WindowNotFound { workspace: String },

    #[error("clipboard still busy after {attempts} attempts")]
    ClipboardContention { attempts: u32 },

    #[error("failed to launch assistant for workspace {workspace}")]
    LaunchFailure {
        workspace: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist bindings to {}", path.display())]
    PersistenceWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace index {index} is out of range")]
    InvalidWorkspace { index: usize },

    #[error("keystroke dispatch failed: {0}")]
    Input(String),
}

impl BridgeError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ClipboardContention { .. }
                | BridgeError::WindowNotFound { .. }
                | BridgeError::ProcessNotFound
        )
    }
}
