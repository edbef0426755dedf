use std::{
    collections::HashMap,
    path::PathBuf,
    process::{Child, Command},
};

use parking_lot::Mutex;

use crate::{error::BridgeError, types::Workspace};

#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Starts an assistant instance for a workspace.
pub trait Launcher: Send + Sync {
    /// Start the assistant in a new terminal surface rooted at the workspace
    /// path and return its process id. Does not wait for a window.
    fn launch(&self, workspace: &Workspace) -> Result<u32, BridgeError>;
}

/// Split a terminal prefix such as `x-terminal-emulator -e` into arguments.
pub fn parse_terminal_command(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    shlex::split(trimmed)
}

#[derive(Debug)]
pub struct ProcessSupervisor {
    assistant: PathBuf,
    skip_flag: String,
    terminal_prefix: Vec<String>,
    children: Mutex<HashMap<u32, Child>>,
}

impl ProcessSupervisor {
    pub fn new(assistant: impl Into<PathBuf>, skip_flag: impl Into<String>) -> Self {
        Self {
            assistant: assistant.into(),
            skip_flag: skip_flag.into(),
            terminal_prefix: Vec::new(),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap launches in a terminal emulator. Ignored on Windows, where every
    /// launch gets its own console.
    pub fn with_terminal_prefix(mut self, prefix: Vec<String>) -> Self {
        self.terminal_prefix = prefix;
        self
    }

    fn command(&self, workspace: &Workspace) -> Command {
        let mut cmd = match (cfg!(windows), self.terminal_prefix.split_first()) {
            (false, Some((program, args))) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(&self.assistant);
                cmd
            }
            _ => Command::new(&self.assistant),
        };
        if !self.skip_flag.is_empty() {
            cmd.arg(&self.skip_flag);
        }
        cmd.current_dir(&workspace.path);

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::CREATE_NEW_CONSOLE;
            cmd.creation_flags(CREATE_NEW_CONSOLE);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd
    }

    /// Forget children that have exited. Returns their pids.
    pub fn reap_exited(&self) -> Vec<u32> {
        let mut children = self.children.lock();
        let mut exited = Vec::new();
        children.retain(|pid, child| match child.try_wait() {
            Ok(Some(_)) | Err(_) => {
                exited.push(*pid);
                false
            }
            Ok(None) => true,
        });
        exited
    }

    pub fn tracked(&self) -> usize {
        self.children.lock().len()
    }
}

impl Launcher for ProcessSupervisor {
    fn launch(&self, workspace: &Workspace) -> Result<u32, BridgeError> {
        let exited = self.reap_exited();
        if !exited.is_empty() {
            tracing::debug!(target = "window_bridge::spawner", pids = ?exited, "reaped exited assistants");
        }

        tracing::info!(
            target = "window_bridge::spawner",
            workspace = %workspace.name,
            path = %workspace.path.display(),
            assistant = %self.assistant.display(),
            "launching assistant"
        );
        let child = self
            .command(workspace)
            .spawn()
            .map_err(|source| BridgeError::LaunchFailure {
                workspace: workspace.name.clone(),
                source,
            })?;
        let pid = child.id();
        self.children.lock().insert(pid, child);
        tracing::info!(target = "window_bridge::spawner", workspace = %workspace.name, pid, "assistant started");
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_terminal_command, Launcher, ProcessSupervisor};
    use crate::{error::BridgeError, types::Workspace};

    #[test]
    fn terminal_prefix_is_shell_split() {
        assert_eq!(
            parse_terminal_command("gnome-terminal --wait --"),
            Some(vec![
                "gnome-terminal".to_string(),
                "--wait".to_string(),
                "--".to_string()
            ])
        );
        assert_eq!(parse_terminal_command("  "), Some(Vec::new()));
        assert_eq!(parse_terminal_command("xterm -T 'unterminated"), None);
    }

    #[test]
    fn missing_binary_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new("/definitely/not/here/assistant", "--yes");
        let err = supervisor
            .launch(&Workspace::new("ghost", dir.path()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::LaunchFailure { ref workspace, .. } if workspace == "ghost"));
        assert_eq!(supervisor.tracked(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn launch_runs_in_workspace_and_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new("true", "");
        let pid = supervisor
            .launch(&Workspace::new("tmp", dir.path()))
            .unwrap();
        assert!(pid > 0);
        assert_eq!(supervisor.tracked(), 1);

        let mut reaped = Vec::new();
        for _ in 0..50 {
            reaped = supervisor.reap_exited();
            if !reaped.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(reaped, vec![pid]);
        assert_eq!(supervisor.tracked(), 0);
    }
}
