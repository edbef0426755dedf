//! Window discovery for assistant processes.
//!
//! The assistant has no window of its own; it is represented by the terminal
//! that hosts it. Discovery tries, in order: a pinned process id, a command
//! line scan for the assistant running inside a shell, and an image name scan.
//! Every path ends in the same window search over the host process.

use std::sync::Arc;

use crate::{
    os::{ProcessInfo, ProcessTable, WindowSystem},
    types::{LocatedWindow, WindowHandle},
};

/// Shell and console host processes whose windows accept pasted input.
pub const TERMINAL_HOSTS: &[&str] = &[
    "cmd.exe",
    "powershell.exe",
    "pwsh.exe",
    "conhost.exe",
    "openconsole.exe",
    "windowsterminal.exe",
];

/// Window classes of console surfaces.
pub const TERMINAL_WINDOW_CLASSES: &[&str] =
    &["ConsoleWindowClass", "CASCADIA_HOSTING_WINDOW_CLASS"];

pub fn is_terminal_host(name: &str) -> bool {
    let lower = name.to_lowercase();
    TERMINAL_HOSTS.iter().any(|host| *host == lower)
}

#[derive(Debug, Clone)]
pub struct LocatorSettings {
    /// Image name of the assistant binary, e.g. `claude.exe`.
    pub process_name: String,
    /// Other image names accepted for the assistant.
    pub aliases: Vec<String>,
    /// Substring identifying an assistant invocation on a command line.
    pub invocation_token: String,
}

impl LocatorSettings {
    pub fn for_process(process_name: &str) -> Self {
        let process_name = process_name.trim().to_lowercase();
        let token = process_name
            .strip_suffix(".exe")
            .unwrap_or(&process_name)
            .to_string();
        let mut aliases = vec![format!("{token}.exe"), token.clone()];
        aliases.retain(|alias| *alias != process_name);
        Self {
            process_name,
            aliases,
            invocation_token: token,
        }
    }

    pub fn is_assistant_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower == self.process_name || self.aliases.iter().any(|alias| *alias == lower)
    }
}

/// One window considered during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCandidate {
    pub handle: WindowHandle,
    pub visible: bool,
    /// Belongs to a recognized terminal host or console class.
    pub known: bool,
}

impl WindowCandidate {
    fn rank(&self) -> (bool, bool) {
        (!self.known, !self.visible)
    }
}

/// Pick the best candidate: known and visible first, then known, then
/// visible. Ties keep enumeration order.
pub fn select_window(candidates: &[WindowCandidate]) -> Option<WindowCandidate> {
    candidates.iter().copied().min_by_key(WindowCandidate::rank)
}

pub struct WindowLocator {
    processes: Arc<dyn ProcessTable>,
    windows: Arc<dyn WindowSystem>,
    settings: LocatorSettings,
}

impl WindowLocator {
    pub fn new(
        processes: Arc<dyn ProcessTable>,
        windows: Arc<dyn WindowSystem>,
        settings: LocatorSettings,
    ) -> Self {
        Self {
            processes,
            windows,
            settings,
        }
    }

    pub fn windows(&self) -> &Arc<dyn WindowSystem> {
        &self.windows
    }

    pub fn process_alive(&self, pid: u32) -> bool {
        self.processes.process(pid).is_some()
    }

    /// Resolve a window for the assistant, optionally pinned to a process id.
    /// Not-found is a normal outcome; callers retry later.
    pub fn find(&self, target_pid: Option<u32>) -> Option<LocatedWindow> {
        if let Some(pid) = target_pid {
            if let Some(found) = self.find_by_pid(pid) {
                tracing::debug!(target = "window_bridge::locator", pid, hwnd = %found.handle, "found window via pinned pid");
                return Some(found);
            }
            tracing::debug!(target = "window_bridge::locator", pid, "pinned pid lookup failed, falling back to scans");
        }

        if let Some(found) = self.find_by_cmdline() {
            tracing::debug!(target = "window_bridge::locator", hwnd = %found.handle, "found window via command line scan");
            return Some(found);
        }

        let found = self.find_by_process_name();
        if found.is_none() {
            tracing::debug!(target = "window_bridge::locator", process = %self.settings.process_name, "no assistant window found");
        }
        found
    }

    fn find_by_pid(&self, pid: u32) -> Option<LocatedWindow> {
        let info = self.processes.process(pid)?;
        if is_terminal_host(&info.name) {
            return self.search_windows(pid, &info.name);
        }

        let name = info.name_lower();
        if self.settings.is_assistant_name(&name) || name.contains(&self.settings.invocation_token)
        {
            if let Some(found) = self.parent_of(&info).and_then(|parent| {
                self.search_windows(parent.pid, &parent.name)
            }) {
                return Some(found);
            }
            // A console started for the assistant reports the assistant as owner.
            return self.search_windows(pid, &info.name);
        }

        tracing::debug!(target = "window_bridge::locator", pid, name = %info.name, "pinned pid is neither a terminal nor the assistant");
        None
    }

    fn find_by_cmdline(&self) -> Option<LocatedWindow> {
        let token = &self.settings.invocation_token;
        self.processes
            .processes()
            .into_iter()
            .filter(|p| p.cmdline_lower().contains(token.as_str()))
            .filter(|p| !p.name_lower().starts_with(token.as_str()))
            .find_map(|p| {
                let parent = self.parent_of(&p)?;
                tracing::debug!(target = "window_bridge::locator", pid = p.pid, host = %parent.name, "assistant found inside shell");
                self.search_windows(parent.pid, &parent.name)
            })
    }

    fn find_by_process_name(&self) -> Option<LocatedWindow> {
        self.processes
            .processes()
            .into_iter()
            .filter(|p| self.settings.is_assistant_name(&p.name))
            .find_map(|p| {
                let parent = self.parent_of(&p)?;
                self.search_windows(parent.pid, &parent.name)
            })
    }

    fn parent_of(&self, info: &ProcessInfo) -> Option<ProcessInfo> {
        self.processes.process(info.parent?)
    }

    /// Search top-level windows owned by `owner_pid` and pick the best one.
    pub fn search_windows(&self, owner_pid: u32, host_name: &str) -> Option<LocatedWindow> {
        let host_known = is_terminal_host(host_name);
        let candidates: Vec<WindowCandidate> = self
            .windows
            .top_level_windows()
            .into_iter()
            .filter(|w| w.owner_pid == owner_pid)
            .map(|w| WindowCandidate {
                handle: w.handle,
                visible: w.visible,
                known: host_known || TERMINAL_WINDOW_CLASSES.contains(&w.class_name.as_str()),
            })
            .collect();

        let chosen = select_window(&candidates)?;
        Some(LocatedWindow {
            handle: chosen.handle,
            owner_pid,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{select_window, LocatorSettings, WindowCandidate, WindowLocator};
    use crate::{
        testing::{process, window, FakeProcessTable, FakeWindowSystem},
        types::WindowHandle,
    };

    fn candidate(handle: isize, visible: bool, known: bool) -> WindowCandidate {
        WindowCandidate {
            handle: WindowHandle(handle),
            visible,
            known,
        }
    }

    fn locator(procs: &FakeProcessTable, wins: &FakeWindowSystem) -> WindowLocator {
        WindowLocator::new(
            Arc::new(procs.clone()),
            Arc::new(wins.clone()),
            LocatorSettings::for_process("claude.exe"),
        )
    }

    #[test]
    fn known_visible_candidate_wins_in_every_order() {
        let all = [
            candidate(1, false, false),
            candidate(2, true, true),
            candidate(3, true, false),
        ];
        let orders = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let shuffled: Vec<_> = order.iter().map(|&i| all[i]).collect();
            assert_eq!(select_window(&shuffled).unwrap().handle, WindowHandle(2));
        }
    }

    #[test]
    fn known_hidden_beats_unknown_visible() {
        let picked = select_window(&[candidate(1, true, false), candidate(2, false, true)]);
        assert_eq!(picked.unwrap().handle, WindowHandle(2));
    }

    #[test]
    fn empty_candidates_select_nothing() {
        assert!(select_window(&[]).is_none());
    }

    #[test]
    fn settings_derive_token_and_aliases() {
        let settings = LocatorSettings::for_process("Claude.exe");
        assert_eq!(settings.invocation_token, "claude");
        assert!(settings.is_assistant_name("CLAUDE.EXE"));
        assert!(settings.is_assistant_name("claude"));
        assert!(!settings.is_assistant_name("claudette.exe"));
    }

    #[test]
    fn pinned_terminal_pid_searches_its_own_windows() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(10, None, "cmd.exe", &["cmd.exe"]));
        wins.add(window(0x10, 10, true, "ConsoleWindowClass"));

        let found = locator(&procs, &wins).find(Some(10)).unwrap();
        assert_eq!(found.handle, WindowHandle(0x10));
        assert_eq!(found.owner_pid, 10);
    }

    #[test]
    fn pinned_assistant_pid_walks_to_parent() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(20, None, "powershell.exe", &["powershell.exe"]));
        procs.insert(process(21, Some(20), "claude.exe", &["claude.exe"]));
        wins.add(window(0x99, 20, false, "IME"));
        wins.add(window(0x20, 20, true, "ConsoleWindowClass"));

        let found = locator(&procs, &wins).find(Some(21)).unwrap();
        assert_eq!(found.owner_pid, 20);
        assert_eq!(found.handle, WindowHandle(0x20));
    }

    #[test]
    fn pinned_assistant_without_host_window_uses_own_console() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(1, None, "bridge", &["bridge"]));
        procs.insert(process(30, Some(1), "claude.exe", &["claude.exe"]));
        wins.add(window(0x30, 30, true, "ConsoleWindowClass"));

        let found = locator(&procs, &wins).find(Some(30)).unwrap();
        assert_eq!(found.owner_pid, 30);
    }

    #[test]
    fn command_line_scan_finds_shell_hosted_assistant() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(40, None, "pwsh.exe", &["pwsh.exe"]));
        procs.insert(process(41, Some(40), "node.exe", &["node", "C:\\bin\\claude\\cli.js"]));
        wins.add(window(0x40, 40, true, "CASCADIA_HOSTING_WINDOW_CLASS"));

        let found = locator(&procs, &wins).find(None).unwrap();
        assert_eq!(found.owner_pid, 40);
    }

    #[test]
    fn process_name_scan_uses_parent_window() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(50, None, "Code.exe", &[]));
        procs.insert(process(51, Some(50), "claude.exe", &[]));
        wins.add(window(0x50, 50, true, "Chrome_WidgetWin_1"));

        let found = locator(&procs, &wins).find(None).unwrap();
        assert_eq!(found.handle, WindowHandle(0x50));
    }

    #[test]
    fn stale_pin_falls_back_to_scan() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(60, None, "cmd.exe", &[]));
        procs.insert(process(61, Some(60), "claude.exe", &[]));
        wins.add(window(0x60, 60, true, "ConsoleWindowClass"));

        let found = locator(&procs, &wins).find(Some(999)).unwrap();
        assert_eq!(found.owner_pid, 60);
    }

    #[test]
    fn nothing_running_is_not_found() {
        let procs = FakeProcessTable::new();
        let wins = FakeWindowSystem::new();
        procs.insert(process(70, None, "explorer.exe", &["explorer.exe"]));
        wins.add(window(0x70, 70, true, "CabinetWClass"));

        assert!(locator(&procs, &wins).find(None).is_none());
        assert!(locator(&procs, &wins).find(Some(70)).is_none());
    }
}
