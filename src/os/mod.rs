//! Seams between the bridge and the operating system.
//!
//! Discovery, injection and launching only talk to the desktop through the
//! traits below. Production implementations live in the submodules; the
//! in-memory fakes used by tests live in [`crate::testing`].

mod input;
mod processes;
mod windows;

use std::time::Duration;

use crate::types::WindowHandle;

pub use input::{ArboardClipboard, EnigoKeyboard};
pub use processes::SysinfoProcessTable;
pub use windows::{system_window_system, HeadlessWindowSystem};
#[cfg(windows)]
pub use windows::Win32WindowSystem;

/// Snapshot of one running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent: Option<u32>,
    /// Image name, e.g. `claude.exe`.
    pub name: String,
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn cmdline_lower(&self) -> String {
        self.cmdline.join(" ").to_lowercase()
    }
}

pub trait ProcessTable: Send + Sync {
    fn process(&self, pid: u32) -> Option<ProcessInfo>;
    fn processes(&self) -> Vec<ProcessInfo>;
}

/// A top-level window as reported by the desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub owner_pid: u32,
    pub visible: bool,
    pub class_name: String,
}

pub trait WindowSystem: Send + Sync {
    fn top_level_windows(&self) -> Vec<WindowInfo>;
    fn is_window(&self, handle: WindowHandle) -> bool;
    fn is_minimized(&self, handle: WindowHandle) -> bool;
    fn restore(&self, handle: WindowHandle);
    /// Returns false when the desktop refused the focus request.
    fn set_foreground(&self, handle: WindowHandle) -> bool;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClipboardError {
    /// Another process holds the clipboard.
    #[error("clipboard is held by another process")]
    Busy,
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
}

pub trait Clipboard {
    /// Open, clear, write a Unicode string and close.
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Control,
    V,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

pub trait Keyboard {
    fn key(&mut self, key: KeyCode, action: KeyAction) -> Result<(), String>;
}

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
