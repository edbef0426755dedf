//! Workspace list, current selection, conversation bindings and the sender
//! pool, all behind a single lock.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
    error::BridgeError,
    events::EventEmitter,
    locator::WindowLocator,
    metrics::{MetricsCollector, WorkspaceStats},
    os::{Clock, SystemClock},
    pool::{PoolContext, SenderPool},
    spawner::Launcher,
    store::{BindingMap, BindingStore},
    types::{Binding, LocatedWindow, SenderHandle, SenderState, Workspace},
};

struct RegistryState {
    workspaces: Vec<Workspace>,
    current: usize,
    bindings: BindingMap,
    pool: SenderPool,
    metrics: MetricsCollector,
}

impl RegistryState {
    fn pool_op<T>(
        &mut self,
        locator: &WindowLocator,
        launcher: &dyn Launcher,
        events: &EventEmitter,
        op: impl FnOnce(&mut SenderPool, PoolContext<'_>) -> T,
    ) -> T {
        let ctx = PoolContext {
            locator,
            launcher,
            metrics: &mut self.metrics,
            events,
        };
        op(&mut self.pool, ctx)
    }
}

pub struct WorkspaceRegistry {
    state: Mutex<RegistryState>,
    /// Held across snapshot and write so an older snapshot never lands last.
    /// Always taken before `state`.
    save_lock: Mutex<()>,
    locator: WindowLocator,
    launcher: Arc<dyn Launcher>,
    store: Option<BindingStore>,
    clock: Arc<dyn Clock>,
    events: EventEmitter,
}

impl WorkspaceRegistry {
    pub fn new(
        workspaces: Vec<Workspace>,
        locator: WindowLocator,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                workspaces,
                current: 0,
                bindings: BindingMap::new(),
                pool: SenderPool::new(),
                metrics: MetricsCollector::new(),
            }),
            save_lock: Mutex::new(()),
            locator,
            launcher,
            store: None,
            clock: Arc::new(SystemClock),
            events: EventEmitter::new(false),
        }
    }

    /// Persist bindings to `store` after every mutation.
    pub fn with_store(mut self, store: BindingStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.state.lock().workspaces.clone()
    }

    pub fn workspace(&self, index: usize) -> Option<Workspace> {
        self.state.lock().workspaces.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().workspaces.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().current
    }

    pub fn current_workspace(&self) -> Option<Workspace> {
        let state = self.state.lock();
        state.workspaces.get(state.current).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.state
            .lock()
            .workspaces
            .iter()
            .position(|ws| ws.name == name)
    }

    /// Replace the workspace list wholesale. Senders for indices past the new
    /// end are forgotten and the selection is clamped.
    pub fn replace_workspaces(&self, workspaces: Vec<Workspace>) {
        let mut state = self.state.lock();
        let len = workspaces.len();
        state.workspaces = workspaces;
        state.pool.retain_below(len);
        if state.current >= len {
            state.current = 0;
        }
        tracing::info!(target = "window_bridge::registry", count = len, "workspace list replaced");
    }

    /// Select `index` as the current workspace and, when a conversation is
    /// given, bind it there and persist. Out of range indices change nothing.
    pub fn switch_workspace(&self, index: usize, conversation_id: Option<&str>) -> bool {
        let _saving = self.save_lock.lock();
        let (name, snapshot) = {
            let mut state = self.state.lock();
            let Some(workspace) = state.workspaces.get(index) else {
                tracing::warn!(target = "window_bridge::registry", index, "switch to unknown workspace ignored");
                return false;
            };
            let name = workspace.name.clone();
            state.current = index;
            let snapshot = conversation_id.map(|conversation| {
                state.bindings.insert(conversation.to_string(), index);
                state.bindings.clone()
            });
            (name, snapshot)
        };

        tracing::info!(target = "window_bridge::registry", index, workspace = %name, conversation = ?conversation_id, "switched workspace");
        self.events.emit(
            "workspace_switched",
            serde_json::json!({ "index": index, "workspace": name, "conversation_id": conversation_id }),
        );
        if let Some(bindings) = snapshot {
            self.save_logged(&bindings);
        }
        true
    }

    pub fn binding(&self, conversation_id: &str) -> Binding {
        let state = self.state.lock();
        match state.bindings.get(conversation_id) {
            None => Binding::Unbound,
            Some(&index) if index < state.workspaces.len() => Binding::Bound(index),
            Some(&index) => Binding::Stale(index),
        }
    }

    pub fn bindings_snapshot(&self) -> BindingMap {
        self.state.lock().bindings.clone()
    }

    pub fn load_bindings(&self, bindings: BindingMap) {
        self.state.lock().bindings = bindings;
    }

    /// Write the bindings through the configured store.
    pub fn persist(&self) -> Result<(), BridgeError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _saving = self.save_lock.lock();
        let snapshot = self.bindings_snapshot();
        store.save(&snapshot)
    }

    fn save_logged(&self, bindings: &BindingMap) {
        if let Some(store) = &self.store {
            if let Err(error) = store.save(bindings) {
                tracing::warn!(target = "window_bridge::registry", error = %error, "binding persistence failed, continuing in memory");
            }
        }
    }

    /// Return the sender for `index`, launching an assistant when needed.
    pub fn get_or_create_sender(&self, index: usize) -> Result<SenderHandle, BridgeError> {
        let mut state = self.state.lock();
        let Some(workspace) = state.workspaces.get(index).cloned() else {
            return Err(BridgeError::InvalidWorkspace { index });
        };
        state.metrics.on_lookup(index);
        state.pool_op(&self.locator, self.launcher.as_ref(), &self.events, |pool, ctx| {
            pool.get_or_create(index, &workspace, ctx)
        })
    }

    /// Launch eagerly, typically right after a switch.
    pub fn ensure_started(&self, index: usize) -> Result<SenderHandle, BridgeError> {
        self.get_or_create_sender(index)
    }

    /// Probe the sender's window, promoting or discarding the handle.
    pub fn confirm_window(&self, index: usize) -> Option<LocatedWindow> {
        let mut state = self.state.lock();
        state.pool_op(&self.locator, self.launcher.as_ref(), &self.events, |pool, ctx| {
            pool.confirm(index, ctx)
        })
    }

    /// Poll for the sender's window, sleeping `interval` between probes.
    pub fn wait_for_window(
        &self,
        index: usize,
        attempts: u32,
        interval: Duration,
    ) -> Option<LocatedWindow> {
        for attempt in 1..=attempts {
            if let Some(window) = self.confirm_window(index) {
                tracing::info!(target = "window_bridge::registry", index, attempt, "assistant window ready");
                return Some(window);
            }
            if self.sender_state(index) == SenderState::Unstarted {
                break;
            }
            if attempt < attempts {
                self.clock.sleep(interval);
            }
        }
        tracing::warn!(target = "window_bridge::registry", index, attempts, "gave up waiting for assistant window");
        None
    }

    pub fn sender(&self, index: usize) -> Option<SenderHandle> {
        self.state.lock().pool.handle(index).cloned()
    }

    pub fn sender_state(&self, index: usize) -> SenderState {
        self.state.lock().pool.state(index)
    }

    pub fn close_workspace(&self, index: usize) {
        if self.state.lock().pool.remove(index).is_some() {
            tracing::info!(target = "window_bridge::registry", index, "sender closed");
        }
    }

    pub fn close_all(&self) {
        self.state.lock().pool.clear();
        tracing::info!(target = "window_bridge::registry", "all senders closed");
    }

    pub fn record_delivery(&self, index: usize, delivered: bool) {
        self.state.lock().metrics.on_delivery(index, delivered);
    }

    pub fn stats(&self, index: usize) -> WorkspaceStats {
        self.state.lock().metrics.stats(index)
    }

    pub fn metrics_snapshot(&self) -> serde_json::Value {
        self.state.lock().metrics.snapshot()
    }

    /// Current workspace plus a numbered list, for the selection prompt.
    pub fn display_text(&self) -> String {
        let state = self.state.lock();
        if state.workspaces.is_empty() {
            return "No workspaces configured; set WORK_DIRS.".to_string();
        }
        let current = &state.workspaces[state.current.min(state.workspaces.len() - 1)];
        let mut lines = vec![
            format!("Current workspace: {}", current.name),
            String::new(),
            "Available workspaces:".to_string(),
        ];
        for (i, ws) in state.workspaces.iter().enumerate() {
            let marker = if i == state.current { "->" } else { "  " };
            lines.push(format!("{marker} {}. {}", i + 1, ws.name));
        }
        lines.join("\n")
    }
}
