//! Clipboard-paste injection into a located window.
//!
//! There is no acknowledgement channel back from the assistant. A delivery
//! counts as successful once the clipboard write and every keystroke were
//! dispatched without error; whether the assistant actually consumed the
//! text cannot be observed from here.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::BridgeError,
    events::EventEmitter,
    os::{Clipboard, Clock, KeyAction, KeyCode, Keyboard, WindowSystem},
    types::WindowHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectStatus {
    Queued,
    Activating,
    ClipboardWritten,
    Pasted,
    Submitted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InjectResult {
    pub id: String,
    pub hwnd: String,
    pub statuses: Vec<InjectStatus>,
    pub clipboard_attempts: u32,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fixed delays of the paste sequence.
#[derive(Debug, Clone, Copy)]
pub struct InjectTiming {
    /// Wait after activation before touching the clipboard.
    pub settle: Duration,
    pub clipboard_attempts: u32,
    /// Backoff unit; attempt `n` waits `n` units before retrying.
    pub clipboard_backoff: Duration,
    /// Gap between the sub-events of the paste chord.
    pub key_gap: Duration,
    /// Wait between paste and submit.
    pub after_paste: Duration,
    pub enter_hold: Duration,
}

impl Default for InjectTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(250),
            clipboard_attempts: 5,
            clipboard_backoff: Duration::from_millis(150),
            key_gap: Duration::from_millis(50),
            after_paste: Duration::from_millis(300),
            enter_hold: Duration::from_millis(100),
        }
    }
}

pub struct TextInjector {
    windows: Arc<dyn WindowSystem>,
    clipboard: Box<dyn Clipboard>,
    keyboard: Box<dyn Keyboard>,
    clock: Arc<dyn Clock>,
    timing: InjectTiming,
    events: EventEmitter,
}

impl TextInjector {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        clipboard: Box<dyn Clipboard>,
        keyboard: Box<dyn Keyboard>,
        clock: Arc<dyn Clock>,
        events: EventEmitter,
    ) -> Self {
        Self {
            windows,
            clipboard,
            keyboard,
            clock,
            timing: InjectTiming::default(),
            events,
        }
    }

    pub fn with_timing(mut self, timing: InjectTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Restore if minimized and ask for focus. A refused focus request is
    /// logged and ignored: pasting into a background console still works for
    /// this class of application.
    pub fn activate(&self, handle: WindowHandle) {
        if self.windows.is_minimized(handle) {
            self.windows.restore(handle);
        }
        if !self.windows.set_foreground(handle) {
            tracing::debug!(target = "window_bridge::inject", hwnd = %handle, "foreground request denied, continuing");
        }
    }

    /// Paste `text` into the window and press Enter.
    pub fn send_text(&mut self, handle: WindowHandle, text: &str) -> Result<(), BridgeError> {
        self.run(handle, text, &mut Vec::new()).map(|_| ())
    }

    /// Like [`send_text`](Self::send_text) but reports the status trail and
    /// emits an `inject_result` event.
    pub fn deliver(&mut self, handle: WindowHandle, text: &str) -> InjectResult {
        let mut statuses = vec![InjectStatus::Queued];
        let outcome = self.run(handle, text, &mut statuses);
        let (clipboard_attempts, error) = match outcome {
            Ok(attempts) => (attempts, None),
            Err(ref err) => {
                statuses.push(InjectStatus::Failed);
                let attempts = match err {
                    BridgeError::ClipboardContention { attempts } => *attempts,
                    _ => 0,
                };
                (attempts, Some(err.to_string()))
            }
        };
        let result = InjectResult {
            id: Uuid::new_v4().to_string(),
            hwnd: handle.to_string(),
            statuses,
            clipboard_attempts,
            delivered: error.is_none(),
            error,
        };
        self.events.emit("inject_result", &result);
        result
    }

    fn run(
        &mut self,
        handle: WindowHandle,
        text: &str,
        statuses: &mut Vec<InjectStatus>,
    ) -> Result<u32, BridgeError> {
        statuses.push(InjectStatus::Activating);
        self.activate(handle);
        self.clock.sleep(self.timing.settle);

        let attempts = self.write_clipboard(text)?;
        statuses.push(InjectStatus::ClipboardWritten);

        self.paste()?;
        statuses.push(InjectStatus::Pasted);
        self.clock.sleep(self.timing.after_paste);

        self.press_enter()?;
        statuses.push(InjectStatus::Submitted);
        Ok(attempts)
    }

    /// Write the payload, retrying on contention with linear backoff.
    /// Returns the number of attempts used.
    fn write_clipboard(&mut self, text: &str) -> Result<u32, BridgeError> {
        let max = self.timing.clipboard_attempts.max(1);
        for attempt in 1..=max {
            match self.clipboard.set_text(text) {
                Ok(()) => return Ok(attempt),
                Err(error) => {
                    tracing::debug!(target = "window_bridge::inject", attempt, error = %error, "clipboard write failed");
                    if attempt < max {
                        self.clock.sleep(self.timing.clipboard_backoff * attempt);
                    }
                }
            }
        }
        tracing::warn!(target = "window_bridge::inject", attempts = max, "clipboard busy, skipping injection");
        Err(BridgeError::ClipboardContention { attempts: max })
    }

    fn paste(&mut self) -> Result<(), BridgeError> {
        let chord = [
            (KeyCode::Control, KeyAction::Press),
            (KeyCode::V, KeyAction::Press),
            (KeyCode::V, KeyAction::Release),
            (KeyCode::Control, KeyAction::Release),
        ];
        for (i, (key, action)) in chord.into_iter().enumerate() {
            if i > 0 {
                self.clock.sleep(self.timing.key_gap);
            }
            if let Err(error) = self.keyboard.key(key, action) {
                // Never leave the modifier held once it went down.
                if i > 0 {
                    self.release(KeyCode::Control);
                }
                return Err(BridgeError::Input(error));
            }
        }
        Ok(())
    }

    fn press_enter(&mut self) -> Result<(), BridgeError> {
        self.keyboard
            .key(KeyCode::Return, KeyAction::Press)
            .map_err(BridgeError::Input)?;
        self.clock.sleep(self.timing.enter_hold);
        if let Err(error) = self.keyboard.key(KeyCode::Return, KeyAction::Release) {
            self.release(KeyCode::Return);
            return Err(BridgeError::Input(error));
        }
        Ok(())
    }

    fn release(&mut self, key: KeyCode) {
        if let Err(error) = self.keyboard.key(key, KeyAction::Release) {
            tracing::warn!(target = "window_bridge::inject", key = ?key, error = %error, "failed to release key after input error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{InjectStatus, TextInjector};
    use crate::{
        error::BridgeError,
        events::EventEmitter,
        os::{KeyAction, KeyCode},
        testing::{window, FakeClipboard, FakeKeyboard, FakeWindowSystem, RecordingClock},
        types::WindowHandle,
    };

    struct Rig {
        windows: FakeWindowSystem,
        clipboard: FakeClipboard,
        keyboard: FakeKeyboard,
        clock: RecordingClock,
        injector: TextInjector,
    }

    fn rig() -> Rig {
        let windows = FakeWindowSystem::new();
        windows.add(window(7, 70, true, "ConsoleWindowClass"));
        let clipboard = FakeClipboard::new();
        let keyboard = FakeKeyboard::new();
        let clock = RecordingClock::new();
        let injector = TextInjector::new(
            Arc::new(windows.clone()),
            Box::new(clipboard.clone()),
            Box::new(keyboard.clone()),
            Arc::new(clock.clone()),
            EventEmitter::new(false),
        );
        Rig {
            windows,
            clipboard,
            keyboard,
            clock,
            injector,
        }
    }

    #[test]
    fn paste_then_enter_sequence() {
        let mut rig = rig();
        rig.injector.send_text(WindowHandle(7), "hello").unwrap();

        assert_eq!(rig.clipboard.contents().as_deref(), Some("hello"));
        assert_eq!(
            rig.keyboard.events(),
            vec![
                (KeyCode::Control, KeyAction::Press),
                (KeyCode::V, KeyAction::Press),
                (KeyCode::V, KeyAction::Release),
                (KeyCode::Control, KeyAction::Release),
                (KeyCode::Return, KeyAction::Press),
                (KeyCode::Return, KeyAction::Release),
            ]
        );
        assert_eq!(rig.clock.sleeps()[0], Duration::from_millis(250));
    }

    #[test]
    fn permanently_busy_clipboard_stops_after_five_attempts() {
        let mut rig = rig();
        rig.clipboard.always_busy();

        let err = rig.injector.send_text(WindowHandle(7), "hello").unwrap_err();

        assert!(matches!(err, BridgeError::ClipboardContention { attempts: 5 }));
        assert_eq!(rig.clipboard.attempts(), 5);
        assert!(rig.keyboard.events().is_empty());
        let backoffs: Vec<_> = rig.clock.sleeps().into_iter().skip(1).collect();
        assert_eq!(
            backoffs,
            vec![
                Duration::from_millis(150),
                Duration::from_millis(300),
                Duration::from_millis(450),
                Duration::from_millis(600),
            ]
        );
    }

    #[test]
    fn transient_contention_recovers() {
        let mut rig = rig();
        rig.clipboard.busy_for(2);

        let result = rig.injector.deliver(WindowHandle(7), "payload");

        assert!(result.delivered);
        assert_eq!(result.clipboard_attempts, 3);
        assert_eq!(rig.clipboard.attempts(), 3);
        assert_eq!(
            result.statuses,
            vec![
                InjectStatus::Queued,
                InjectStatus::Activating,
                InjectStatus::ClipboardWritten,
                InjectStatus::Pasted,
                InjectStatus::Submitted,
            ]
        );
    }

    #[test]
    fn failed_delivery_reports_status_trail() {
        let mut rig = rig();
        rig.clipboard.always_busy();

        let result = rig.injector.deliver(WindowHandle(7), "payload");

        assert!(!result.delivered);
        assert_eq!(result.clipboard_attempts, 5);
        assert_eq!(result.statuses.last(), Some(&InjectStatus::Failed));
        assert!(result.error.is_some());
    }

    #[test]
    fn minimized_window_is_restored_and_refused_focus_is_tolerated() {
        let mut rig = rig();
        rig.windows.minimize(WindowHandle(7));
        rig.windows.refuse_foreground(true);

        rig.injector.send_text(WindowHandle(7), "x").unwrap();

        assert_eq!(rig.windows.restored(), vec![WindowHandle(7)]);
        assert_eq!(rig.windows.foreground_requests(), vec![WindowHandle(7)]);
    }

    #[test]
    fn failed_paste_releases_control() {
        let mut rig = rig();
        rig.keyboard.fail_on(KeyCode::V, KeyAction::Press);

        let err = rig.injector.send_text(WindowHandle(7), "x").unwrap_err();

        assert!(matches!(err, BridgeError::Input(_)));
        assert_eq!(
            rig.keyboard.events(),
            vec![
                (KeyCode::Control, KeyAction::Press),
                (KeyCode::Control, KeyAction::Release),
            ]
        );
    }

    #[test]
    fn failed_enter_release_is_retried() {
        let mut rig = rig();
        rig.keyboard.fail_once(KeyCode::Return, KeyAction::Release);

        assert!(rig.injector.send_text(WindowHandle(7), "x").is_err());

        let events = rig.keyboard.events();
        assert_eq!(events.last(), Some(&(KeyCode::Return, KeyAction::Release)));
    }
}
