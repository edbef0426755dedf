use std::sync::Arc;

use crate::types::WindowHandle;

use super::{WindowInfo, WindowSystem};

/// Window system for desktops without a supported windowing API. Reports no
/// windows, so discovery always ends in not-found.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessWindowSystem;

impl WindowSystem for HeadlessWindowSystem {
    fn top_level_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }

    fn is_window(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn is_minimized(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn restore(&self, _handle: WindowHandle) {}

    fn set_foreground(&self, _handle: WindowHandle) -> bool {
        false
    }
}

/// The window system for the current platform.
pub fn system_window_system() -> Arc<dyn WindowSystem> {
    #[cfg(windows)]
    {
        Arc::new(Win32WindowSystem)
    }

    #[cfg(not(windows))]
    {
        tracing::warn!(
            target = "window_bridge::os",
            "no window system support on this platform; discovery will report not-found"
        );
        Arc::new(HeadlessWindowSystem)
    }
}

#[cfg(windows)]
pub use win32::Win32WindowSystem;

#[cfg(windows)]
mod win32 {
    use windows_sys::Win32::{
        Foundation::{BOOL, HWND, LPARAM},
        UI::WindowsAndMessaging::{
            EnumWindows, GetClassNameW, GetWindowThreadProcessId, IsIconic, IsWindow,
            IsWindowVisible, SetForegroundWindow, ShowWindow, SW_RESTORE,
        },
    };

    use crate::types::WindowHandle;

    use super::{WindowInfo, WindowSystem};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct Win32WindowSystem;

    fn hwnd(handle: WindowHandle) -> HWND {
        handle.0 as HWND
    }

    unsafe fn class_name(hwnd: HWND) -> String {
        let mut buf = [0u16; 256];
        let len = GetClassNameW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
        if len <= 0 {
            return String::new();
        }
        String::from_utf16_lossy(&buf[..len as usize])
    }

    unsafe extern "system" fn collect(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam as *mut Vec<WindowInfo>);
        let mut owner_pid = 0u32;
        GetWindowThreadProcessId(hwnd, &mut owner_pid);
        out.push(WindowInfo {
            handle: WindowHandle(hwnd as isize),
            owner_pid,
            visible: IsWindowVisible(hwnd) != 0,
            class_name: class_name(hwnd),
        });
        1
    }

    impl WindowSystem for Win32WindowSystem {
        fn top_level_windows(&self) -> Vec<WindowInfo> {
            let mut windows: Vec<WindowInfo> = Vec::new();
            unsafe {
                EnumWindows(Some(collect), &mut windows as *mut Vec<WindowInfo> as LPARAM);
            }
            windows
        }

        fn is_window(&self, handle: WindowHandle) -> bool {
            unsafe { IsWindow(hwnd(handle)) != 0 }
        }

        fn is_minimized(&self, handle: WindowHandle) -> bool {
            unsafe { IsIconic(hwnd(handle)) != 0 }
        }

        fn restore(&self, handle: WindowHandle) {
            unsafe {
                ShowWindow(hwnd(handle), SW_RESTORE);
            }
        }

        fn set_foreground(&self, handle: WindowHandle) -> bool {
            unsafe { SetForegroundWindow(hwnd(handle)) != 0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessWindowSystem, WindowSystem};
    use crate::types::WindowHandle;

    #[test]
    fn headless_reports_nothing() {
        let ws = HeadlessWindowSystem;
        assert!(ws.top_level_windows().is_empty());
        assert!(!ws.is_window(WindowHandle(1)));
        assert!(!ws.set_foreground(WindowHandle(1)));
    }
}
