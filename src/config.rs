use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{router::RouterSettings, types::Workspace};

#[derive(Debug, Parser, Clone)]
#[command(name = "agent-window-bridge")]
#[command(about = "Routes chat messages into assistant console windows, one per workspace")]
pub struct Config {
    /// Comma separated workspace directories.
    #[arg(long, env = "WORK_DIRS")]
    pub work_dirs: Option<String>,

    #[arg(long, env = "WORK_DIRS_AUTO_DISCOVER", default_value_t = false)]
    pub auto_discover: bool,

    #[arg(long, env = "WORK_DIRS_PARENT_DIR")]
    pub parent_dir: Option<PathBuf>,

    /// Single workspace, used when nothing else is configured.
    #[arg(long, env = "WORK_DIR")]
    pub work_dir: Option<String>,

    #[arg(long, env = "CLAUDE_PATH", default_value = "claude")]
    pub assistant_path: PathBuf,

    #[arg(long, env = "CLAUDE_PROCESS_NAME", default_value = "claude.exe")]
    pub process_name: String,

    #[arg(long, env = "CLAUDE_SKIP_FLAG", default_value = "--dangerously-skip-permissions")]
    pub skip_flag: String,

    /// Terminal prefix used to give the assistant its own window outside Windows.
    #[arg(long, env = "TERMINAL_COMMAND")]
    pub terminal_command: Option<String>,

    #[arg(long, env = "WORKSPACE_PERSIST_FILE", default_value = "workspace_persist.json")]
    pub persist_file: PathBuf,

    #[arg(long, env = "ADMIN_SENDER_ID")]
    pub admin_sender_id: Option<String>,

    #[arg(long, env = "CHAT_ID_FILE", default_value = ".feishu_current_chat_id")]
    pub chat_id_file: String,

    #[arg(long, env = "CHAT_ID_ENV_KEY", default_value = "FEISHU_CURRENT_CHAT_ID")]
    pub chat_id_env_key: String,

    #[arg(long, env = "STARTUP_WAIT_ATTEMPTS", default_value_t = 30)]
    pub startup_wait_attempts: u32,

    #[arg(long, env = "STARTUP_WAIT_INTERVAL_MS", default_value_t = 1000)]
    pub startup_wait_interval_ms: u64,

    #[arg(long, env = "PERSIST_EVERY", default_value_t = 10)]
    pub persist_every: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "JSON_EVENTS", default_value_t = false)]
    pub json_events: bool,
}

impl Config {
    /// Resolve the workspace list: auto-discovery first (when it finds
    /// anything), then `WORK_DIRS`, then the single `WORK_DIR`.
    pub fn load_workspaces(&self) -> Vec<Workspace> {
        if self.auto_discover {
            if let Some(parent) = &self.parent_dir {
                let found = discover_workspaces(parent);
                if !found.is_empty() {
                    tracing::info!(target = "window_bridge::config", parent = %parent.display(), count = found.len(), "discovered workspaces");
                    return found;
                }
                tracing::warn!(target = "window_bridge::config", parent = %parent.display(), "auto-discovery found nothing, falling back");
            }
        }

        if let Some(dirs) = &self.work_dirs {
            let list = split_dirs(dirs);
            if !list.is_empty() {
                return list;
            }
        }

        self.work_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(|dir| vec![Workspace::from_path(dir)])
            .unwrap_or_default()
    }

    pub fn terminal_prefix(&self) -> Option<Vec<String>> {
        self.terminal_command
            .as_deref()
            .and_then(crate::spawner::parse_terminal_command)
    }

    pub fn startup_wait_interval(&self) -> Duration {
        Duration::from_millis(self.startup_wait_interval_ms)
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            marker_file: self.chat_id_file.clone(),
            env_key: self.chat_id_env_key.clone(),
            persist_every: self.persist_every,
        }
    }
}

fn split_dirs(raw: &str) -> Vec<Workspace> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Workspace::from_path)
        .collect()
}

/// Every subdirectory of `parent` not starting with `.` or `_`, by name.
pub fn discover_workspaces(parent: &std::path::Path) -> Vec<Workspace> {
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(target = "window_bridge::config", parent = %parent.display(), error = %error, "cannot read workspace parent");
            return Vec::new();
        }
    };
    let mut found: Vec<Workspace> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.starts_with('_') {
                return None;
            }
            Some(Workspace::new(name, entry.path()))
        })
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}

#[cfg(test)]
mod tests {
    use super::{discover_workspaces, Config};
    use clap::Parser;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["agent-window-bridge"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.process_name, "claude.exe");
        assert_eq!(cfg.skip_flag, "--dangerously-skip-permissions");
        assert_eq!(cfg.persist_file.to_str(), Some("workspace_persist.json"));
        assert_eq!(cfg.startup_wait_attempts, 30);
        assert_eq!(cfg.persist_every, 10);
    }

    #[test]
    fn work_dirs_split_on_commas() {
        let cfg = parse(&["--work-dirs", "/w/alpha, /w/beta,,"]);
        let names: Vec<String> = cfg.load_workspaces().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn single_work_dir_is_last_resort() {
        let cfg = parse(&["--work-dir", "/w/solo"]);
        let list = cfg.load_workspaces();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "solo");
    }

    #[test]
    fn discovery_skips_hidden_and_underscored() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", ".git", "_archive"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let names: Vec<String> = discover_workspaces(dir.path())
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn empty_discovery_falls_back_to_list() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().to_str().unwrap().to_string();
        let cfg = parse(&[
            "--auto-discover",
            "--parent-dir",
            &parent,
            "--work-dirs",
            "/w/alpha",
        ]);
        let list = cfg.load_workspaces();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "alpha");
    }

    #[test]
    fn terminal_prefix_is_shell_split() {
        let cfg = parse(&["--terminal-command", "x-terminal-emulator -e"]);
        assert_eq!(
            cfg.terminal_prefix(),
            Some(vec!["x-terminal-emulator".to_string(), "-e".to_string()])
        );
    }
}
