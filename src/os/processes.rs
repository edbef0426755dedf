use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use super::{ProcessInfo, ProcessTable};

/// Process table backed by `sysinfo`. Each query refreshes the snapshot so
/// that freshly launched assistants are visible immediately.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::new().with_cmd(UpdateKind::OnlyIfNotSet)
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn to_info(process: &sysinfo::Process) -> ProcessInfo {
    ProcessInfo {
        pid: process.pid().as_u32(),
        parent: process.parent().map(Pid::as_u32),
        name: process.name().to_string_lossy().into_owned(),
        cmdline: process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn process(&self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            Self::refresh_kind(),
        );
        system.process(pid).map(to_info)
    }

    fn processes(&self) -> Vec<ProcessInfo> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        system.processes().values().map(to_info).collect()
    }
}
