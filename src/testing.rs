//! In-memory stand-ins for the OS seams, the launcher and the notifier.
//!
//! Every fake is cheap to clone and shares its state between clones, so a
//! test can hand one copy to the bridge and keep another for assertions.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    error::BridgeError,
    notify::Notifier,
    os::{
        Clipboard, ClipboardError, Clock, KeyAction, KeyCode, Keyboard, ProcessInfo,
        ProcessTable, WindowInfo, WindowSystem,
    },
    spawner::Launcher,
    types::{WindowHandle, Workspace},
};

pub fn process(pid: u32, parent: Option<u32>, name: &str, cmdline: &[&str]) -> ProcessInfo {
    ProcessInfo {
        pid,
        parent,
        name: name.to_string(),
        cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn window(handle: isize, owner_pid: u32, visible: bool, class_name: &str) -> WindowInfo {
    WindowInfo {
        handle: WindowHandle(handle),
        owner_pid,
        visible,
        class_name: class_name.to_string(),
    }
}

#[derive(Clone, Default)]
pub struct FakeProcessTable {
    processes: Arc<Mutex<HashMap<u32, ProcessInfo>>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: ProcessInfo) {
        self.processes.lock().insert(info.pid, info);
    }

    pub fn remove(&self, pid: u32) {
        self.processes.lock().remove(&pid);
    }
}

impl ProcessTable for FakeProcessTable {
    fn process(&self, pid: u32) -> Option<ProcessInfo> {
        self.processes.lock().get(&pid).cloned()
    }

    fn processes(&self) -> Vec<ProcessInfo> {
        let mut all: Vec<ProcessInfo> = self.processes.lock().values().cloned().collect();
        all.sort_by_key(|p| p.pid);
        all
    }
}

#[derive(Default)]
struct WindowState {
    windows: Vec<WindowInfo>,
    minimized: Vec<WindowHandle>,
    refuse_foreground: bool,
    restored: Vec<WindowHandle>,
    foreground_requests: Vec<WindowHandle>,
}

#[derive(Clone, Default)]
pub struct FakeWindowSystem {
    state: Arc<Mutex<WindowState>>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, info: WindowInfo) {
        self.state.lock().windows.push(info);
    }

    pub fn close(&self, handle: WindowHandle) {
        self.state.lock().windows.retain(|w| w.handle != handle);
    }

    pub fn close_all(&self) {
        self.state.lock().windows.clear();
    }

    pub fn minimize(&self, handle: WindowHandle) {
        self.state.lock().minimized.push(handle);
    }

    pub fn refuse_foreground(&self, refuse: bool) {
        self.state.lock().refuse_foreground = refuse;
    }

    pub fn restored(&self) -> Vec<WindowHandle> {
        self.state.lock().restored.clone()
    }

    pub fn foreground_requests(&self) -> Vec<WindowHandle> {
        self.state.lock().foreground_requests.clone()
    }
}

impl WindowSystem for FakeWindowSystem {
    fn top_level_windows(&self) -> Vec<WindowInfo> {
        self.state.lock().windows.clone()
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.state.lock().windows.iter().any(|w| w.handle == handle)
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        self.state.lock().minimized.contains(&handle)
    }

    fn restore(&self, handle: WindowHandle) {
        let mut state = self.state.lock();
        state.minimized.retain(|h| *h != handle);
        state.restored.push(handle);
    }

    fn set_foreground(&self, handle: WindowHandle) -> bool {
        let mut state = self.state.lock();
        state.foreground_requests.push(handle);
        !state.refuse_foreground
    }
}

#[derive(Default)]
struct ClipboardState {
    busy_for: Option<u32>,
    attempts: u32,
    contents: Option<String>,
}

/// Clipboard that can be made busy for a number of attempts, or forever.
#[derive(Clone, Default)]
pub struct FakeClipboard {
    state: Arc<Mutex<ClipboardState>>,
}

impl FakeClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy_for(&self, attempts: u32) {
        self.state.lock().busy_for = Some(attempts);
    }

    pub fn always_busy(&self) {
        self.state.lock().busy_for = Some(u32::MAX);
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    pub fn contents(&self) -> Option<String> {
        self.state.lock().contents.clone()
    }
}

impl Clipboard for FakeClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if let Some(remaining) = state.busy_for {
            if remaining > 0 {
                state.busy_for = Some(remaining - 1);
                return Err(ClipboardError::Busy);
            }
        }
        state.contents = Some(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct KeyboardState {
    events: Vec<(KeyCode, KeyAction)>,
    /// Keystrokes that fail; `true` means only the next occurrence.
    failures: Vec<((KeyCode, KeyAction), bool)>,
}

/// Records dispatched keystrokes. Failed keystrokes are not recorded.
#[derive(Clone, Default)]
pub struct FakeKeyboard {
    state: Arc<Mutex<KeyboardState>>,
}

impl FakeKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, key: KeyCode, action: KeyAction) {
        self.state.lock().failures.push(((key, action), false));
    }

    pub fn fail_once(&self, key: KeyCode, action: KeyAction) {
        self.state.lock().failures.push(((key, action), true));
    }

    pub fn events(&self) -> Vec<(KeyCode, KeyAction)> {
        self.state.lock().events.clone()
    }
}

impl Keyboard for FakeKeyboard {
    fn key(&mut self, key: KeyCode, action: KeyAction) -> Result<(), String> {
        let mut state = self.state.lock();
        if let Some(pos) = state.failures.iter().position(|(k, _)| *k == (key, action)) {
            if state.failures[pos].1 {
                state.failures.remove(pos);
            }
            return Err(format!("{key:?} {action:?} rejected"));
        }
        state.events.push((key, action));
        Ok(())
    }
}

/// Clock that records requested sleeps and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Launcher that hands out increasing pids and remembers every launch.
#[derive(Clone)]
pub struct FakeLauncher {
    next_pid: Arc<AtomicU32>,
    launched: Arc<Mutex<Vec<(String, u32)>>>,
    fail: Arc<Mutex<bool>>,
}

impl FakeLauncher {
    pub fn starting_at(pid: u32) -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(pid)),
            launched: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn fail_launches(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn launches(&self) -> Vec<(String, u32)> {
        self.launched.lock().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::starting_at(1000)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, workspace: &Workspace) -> Result<u32, BridgeError> {
        if *self.fail.lock() {
            return Err(BridgeError::LaunchFailure {
                workspace: workspace.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "assistant missing"),
            });
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.launched.lock().push((workspace.name.clone(), pid));
        Ok(pid)
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, conversation_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, conversation_id: &str, text: &str) -> bool {
        self.sent
            .lock()
            .push((conversation_id.to_string(), text.to_string()));
        true
    }
}
