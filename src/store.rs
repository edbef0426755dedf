//! Durable conversation → workspace bindings.

use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub type BindingMap = HashMap<String, usize>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedBindings {
    #[serde(default)]
    workspace_chat_map: HashMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct BindingStore {
    path: PathBuf,
}

impl BindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load bindings. A missing or unreadable file yields an empty map.
    pub fn load(&self) -> BindingMap {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(target = "window_bridge::store", path = %self.path.display(), "no binding file yet, starting empty");
                return BindingMap::new();
            }
            Err(error) => {
                tracing::warn!(target = "window_bridge::store", path = %self.path.display(), error = %error, "failed reading binding file");
                return BindingMap::new();
            }
        };
        let persisted: PersistedBindings = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(error) => {
                tracing::warn!(target = "window_bridge::store", path = %self.path.display(), error = %error, "binding file is malformed, ignoring");
                return BindingMap::new();
            }
        };

        let mut map = BindingMap::with_capacity(persisted.workspace_chat_map.len());
        for (conversation, index) in persisted.workspace_chat_map {
            match usize::try_from(index) {
                Ok(index) => {
                    map.insert(conversation, index);
                }
                Err(_) => {
                    tracing::warn!(target = "window_bridge::store", conversation = %conversation, index, "dropping unbound entry");
                }
            }
        }
        tracing::info!(target = "window_bridge::store", count = map.len(), "loaded conversation bindings");
        map
    }

    /// Write bindings atomically through a sibling temp file.
    pub fn save(&self, bindings: &BindingMap) -> Result<(), BridgeError> {
        let persisted = PersistedBindings {
            workspace_chat_map: bindings
                .iter()
                .map(|(conversation, index)| (conversation.clone(), *index as i64))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&persisted).map_err(|e| self.failure(e.into()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.failure(e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.failure(e))?;
        tmp.persist(&self.path).map_err(|e| self.failure(e.error))?;
        tracing::debug!(target = "window_bridge::store", path = %self.path.display(), count = bindings.len(), "saved conversation bindings");
        Ok(())
    }

    fn failure(&self, source: std::io::Error) -> BridgeError {
        BridgeError::PersistenceWriteFailure {
            path: self.path.clone(),
            source,
        }
    }
}
