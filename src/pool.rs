//! One sender handle per workspace index.
//!
//! Handles move through `Unstarted → Launching → Ready → Stale`. The pool
//! carries no lock of its own; it lives inside the registry state and every
//! call happens under the registry lock.

use std::collections::HashMap;

use crate::{
    error::BridgeError,
    events::EventEmitter,
    locator::WindowLocator,
    metrics::MetricsCollector,
    spawner::Launcher,
    types::{LocatedWindow, SenderHandle, SenderState, Workspace},
};

/// Collaborators a pool operation needs.
pub struct PoolContext<'a> {
    pub locator: &'a WindowLocator,
    pub launcher: &'a dyn Launcher,
    pub metrics: &'a mut MetricsCollector,
    pub events: &'a EventEmitter,
}

#[derive(Debug, Default)]
pub struct SenderPool {
    handles: HashMap<usize, SenderHandle>,
}

impl SenderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, index: usize) -> Option<&SenderHandle> {
        self.handles.get(&index)
    }

    pub fn state(&self, index: usize) -> SenderState {
        self.handles
            .get(&index)
            .map(|h| h.state)
            .unwrap_or(SenderState::Unstarted)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Return the live handle for `index`, launching a new assistant when
    /// none exists or the existing one no longer resolves to a window. A new
    /// handle is returned in `Launching` without waiting for its window.
    pub fn get_or_create(
        &mut self,
        index: usize,
        workspace: &Workspace,
        ctx: PoolContext<'_>,
    ) -> Result<SenderHandle, BridgeError> {
        if let Some(handle) = self.handles.get_mut(&index) {
            match ctx.locator.find(handle.process_id) {
                Some(window) => {
                    handle.window = Some(window);
                    handle.state = SenderState::Ready;
                    return Ok(handle.clone());
                }
                None if handle.state == SenderState::Launching
                    && handle
                        .process_id
                        .is_some_and(|pid| ctx.locator.process_alive(pid)) =>
                {
                    tracing::debug!(target = "window_bridge::pool", index, pid = ?handle.process_id, "assistant still starting, not relaunching");
                    return Ok(handle.clone());
                }
                None => {
                    tracing::info!(target = "window_bridge::pool", index, workspace = %workspace.name, "sender window gone, relaunching");
                    self.drop_stale(index, ctx.metrics, ctx.events);
                }
            }
        }

        let pid = match ctx.launcher.launch(workspace) {
            Ok(pid) => pid,
            Err(error) => {
                ctx.metrics.on_launch_failure(index);
                return Err(error);
            }
        };
        ctx.metrics.on_launch(index);
        ctx.events.emit(
            "sender_launched",
            serde_json::json!({ "index": index, "workspace": workspace.name, "pid": pid }),
        );

        let handle = SenderHandle::launching(index, pid);
        self.handles.insert(index, handle.clone());
        Ok(handle)
    }

    /// Probe the handle's window. On success the handle becomes `Ready`.
    ///
    /// A `Ready` handle that fails the probe is stale and is discarded. A
    /// `Launching` handle is kept while its process is still running, so a
    /// slow terminal does not cause a second launch.
    pub fn confirm(&mut self, index: usize, ctx: PoolContext<'_>) -> Option<LocatedWindow> {
        let handle = self.handles.get_mut(&index)?;
        if let Some(window) = ctx.locator.find(handle.process_id) {
            if handle.state != SenderState::Ready {
                tracing::info!(target = "window_bridge::pool", index, hwnd = %window.handle, owner = window.owner_pid, "sender ready");
            }
            handle.window = Some(window);
            handle.state = SenderState::Ready;
            return Some(window);
        }

        let still_launching = handle.state == SenderState::Launching
            && handle
                .process_id
                .is_some_and(|pid| ctx.locator.process_alive(pid));
        if still_launching {
            tracing::debug!(target = "window_bridge::pool", index, pid = ?handle.process_id, "window not up yet");
            return None;
        }

        self.drop_stale(index, ctx.metrics, ctx.events);
        None
    }

    fn drop_stale(&mut self, index: usize, metrics: &mut MetricsCollector, events: &EventEmitter) {
        if let Some(mut handle) = self.handles.remove(&index) {
            handle.state = SenderState::Stale;
            metrics.on_stale(index);
            events.emit(
                "sender_stale",
                serde_json::json!({ "index": index, "pid": handle.process_id }),
            );
        }
    }

    /// Forget a handle without touching its process.
    pub fn remove(&mut self, index: usize) -> Option<SenderHandle> {
        self.handles.remove(&index)
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Drop handles whose index is no longer valid.
    pub fn retain_below(&mut self, len: usize) {
        self.handles.retain(|index, _| *index < len);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{PoolContext, SenderPool};
    use crate::{
        events::EventEmitter,
        locator::{LocatorSettings, WindowLocator},
        metrics::MetricsCollector,
        testing::{process, window, FakeLauncher, FakeProcessTable, FakeWindowSystem},
        types::{SenderState, WindowHandle, Workspace},
    };

    struct Rig {
        procs: FakeProcessTable,
        wins: FakeWindowSystem,
        launcher: FakeLauncher,
        locator: WindowLocator,
        metrics: MetricsCollector,
        events: EventEmitter,
        pool: SenderPool,
        ws: Workspace,
    }

    impl Rig {
        fn new() -> Self {
            let procs = FakeProcessTable::new();
            let wins = FakeWindowSystem::new();
            let locator = WindowLocator::new(
                Arc::new(procs.clone()),
                Arc::new(wins.clone()),
                LocatorSettings::for_process("claude.exe"),
            );
            Self {
                procs,
                wins,
                launcher: FakeLauncher::starting_at(500),
                locator,
                metrics: MetricsCollector::new(),
                events: EventEmitter::new(false),
                pool: SenderPool::new(),
                ws: Workspace::new("alpha", "/tmp/alpha"),
            }
        }

        fn get_or_create(&mut self) -> crate::types::SenderHandle {
            let ctx = PoolContext {
                locator: &self.locator,
                launcher: &self.launcher,
                metrics: &mut self.metrics,
                events: &self.events,
            };
            self.pool.get_or_create(0, &self.ws, ctx).unwrap()
        }

        fn confirm(&mut self) -> Option<crate::types::LocatedWindow> {
            let ctx = PoolContext {
                locator: &self.locator,
                launcher: &self.launcher,
                metrics: &mut self.metrics,
                events: &self.events,
            };
            self.pool.confirm(0, ctx)
        }

        /// Make the assistant with `pid` visible in its own console.
        fn show(&self, pid: u32) {
            self.procs.insert(process(pid, None, "claude.exe", &["claude.exe"]));
            self.wins
                .add(window(pid as isize, pid, true, "ConsoleWindowClass"));
        }
    }

    #[test]
    fn first_use_launches_without_waiting() {
        let mut rig = Rig::new();
        let handle = rig.get_or_create();
        assert_eq!(handle.state, SenderState::Launching);
        assert_eq!(handle.process_id, Some(500));
        assert!(handle.window.is_none());
        assert_eq!(rig.launcher.launch_count(), 1);
    }

    #[test]
    fn confirm_promotes_to_ready() {
        let mut rig = Rig::new();
        rig.get_or_create();
        rig.show(500);

        let window = rig.confirm().unwrap();
        assert_eq!(window.handle, WindowHandle(500));
        assert_eq!(rig.pool.state(0), SenderState::Ready);

        let again = rig.get_or_create();
        assert_eq!(again.state, SenderState::Ready);
        assert_eq!(rig.launcher.launch_count(), 1);
    }

    #[test]
    fn launching_handle_survives_while_process_runs() {
        let mut rig = Rig::new();
        rig.get_or_create();
        rig.procs.insert(process(500, None, "claude.exe", &[]));

        assert!(rig.confirm().is_none());
        assert_eq!(rig.pool.state(0), SenderState::Launching);
    }

    #[test]
    fn repeated_lookups_while_starting_launch_once() {
        let mut rig = Rig::new();
        rig.get_or_create();
        rig.procs.insert(process(500, None, "claude.exe", &[]));

        for _ in 0..3 {
            let handle = rig.get_or_create();
            assert_eq!(handle.state, SenderState::Launching);
            assert_eq!(handle.process_id, Some(500));
        }
        assert_eq!(rig.launcher.launch_count(), 1);
        assert_eq!(rig.metrics.stats(0).stale_drops, 0);
    }

    #[test]
    fn launching_handle_with_dead_process_is_relaunched() {
        let mut rig = Rig::new();
        rig.get_or_create();

        let fresh = rig.get_or_create();
        assert_eq!(fresh.process_id, Some(501));
        assert_eq!(rig.launcher.launch_count(), 2);
    }

    #[test]
    fn launching_handle_with_dead_process_is_dropped() {
        let mut rig = Rig::new();
        rig.get_or_create();

        assert!(rig.confirm().is_none());
        assert_eq!(rig.pool.state(0), SenderState::Unstarted);
        assert_eq!(rig.metrics.stats(0).stale_drops, 1);
    }

    #[test]
    fn ready_handle_losing_window_is_dropped_then_relaunched() {
        let mut rig = Rig::new();
        rig.get_or_create();
        rig.show(500);
        rig.confirm().unwrap();

        rig.wins.close_all();
        assert!(rig.confirm().is_none());
        assert_eq!(rig.pool.state(0), SenderState::Unstarted);

        let fresh = rig.get_or_create();
        assert_eq!(fresh.process_id, Some(501));
        assert_eq!(rig.launcher.launch_count(), 2);
    }

    #[test]
    fn launch_failure_leaves_no_handle() {
        let mut rig = Rig::new();
        rig.launcher.fail_launches(true);
        let ctx = PoolContext {
            locator: &rig.locator,
            launcher: &rig.launcher,
            metrics: &mut rig.metrics,
            events: &rig.events,
        };
        assert!(rig.pool.get_or_create(0, &rig.ws, ctx).is_err());
        assert!(rig.pool.is_empty());
        assert_eq!(rig.metrics.stats(0).launch_failures, 1);
    }
}
