use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A named working directory hosting one assistant instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    pub path: PathBuf,
}

impl Workspace {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Derive the display name from the last path component.
    pub fn from_path(raw: &str) -> Self {
        let trimmed = raw.trim_end_matches(['/', '\\']);
        let name = trimmed
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(raw)
            .to_string();
        Self {
            name,
            path: PathBuf::from(raw),
        }
    }
}

/// Result of looking up a conversation's workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Bound(usize),
    /// No binding recorded yet: the user has to pick a workspace.
    Unbound,
    /// Recorded index no longer points into the workspace list.
    Stale(usize),
}

/// One unit of work for the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub sender_id: String,
    pub conversation_id: Option<String>,
}

impl InboundMessage {
    pub fn new(
        text: impl Into<String>,
        sender_id: impl Into<String>,
        conversation_id: Option<&str>,
    ) -> Self {
        Self {
            text: text.into(),
            sender_id: sender_id.into(),
            conversation_id: conversation_id.map(ToOwned::to_owned),
        }
    }
}

/// Opaque OS window identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A window that passed discovery, plus the process owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocatedWindow {
    pub handle: WindowHandle,
    pub owner_pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderState {
    Unstarted,
    Launching,
    Ready,
    Stale,
}

/// Per-workspace runtime state owned by the sender pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderHandle {
    pub index: usize,
    pub process_id: Option<u32>,
    pub window: Option<LocatedWindow>,
    pub state: SenderState,
}

impl SenderHandle {
    pub fn launching(index: usize, process_id: u32) -> Self {
        Self {
            index,
            process_id: Some(process_id),
            window: None,
            state: SenderState::Launching,
        }
    }
}
