use enigo::{Direction, Enigo, Key, Keyboard as _, Settings};

use super::{Clipboard, ClipboardError, KeyAction, KeyCode, Keyboard};

/// System clipboard via `arboard`. A fresh handle is opened for each write so
/// ownership is released as soon as the text is placed.
#[derive(Debug, Default)]
pub struct ArboardClipboard;

impl Clipboard for ArboardClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let mut clipboard = arboard::Clipboard::new().map_err(map_arboard_error)?;
        clipboard.set_text(text).map_err(map_arboard_error)
    }
}

fn map_arboard_error(error: arboard::Error) -> ClipboardError {
    match error {
        arboard::Error::ClipboardOccupied => ClipboardError::Busy,
        other => ClipboardError::Unavailable(other.to_string()),
    }
}

/// Keystroke synthesis via `enigo`. The connection is created on first use,
/// on the thread that performs injection.
#[derive(Default)]
pub struct EnigoKeyboard {
    enigo: Option<Enigo>,
}

impl EnigoKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&mut self) -> Result<&mut Enigo, String> {
        if self.enigo.is_none() {
            let enigo = Enigo::new(&Settings::default()).map_err(|e| e.to_string())?;
            self.enigo = Some(enigo);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| "keyboard connection unavailable".to_string())
    }
}

impl Keyboard for EnigoKeyboard {
    fn key(&mut self, key: KeyCode, action: KeyAction) -> Result<(), String> {
        let key = match key {
            KeyCode::Control => Key::Control,
            KeyCode::V => Key::Unicode('v'),
            KeyCode::Return => Key::Return,
        };
        let direction = match action {
            KeyAction::Press => Direction::Press,
            KeyAction::Release => Direction::Release,
        };
        self.connection()?
            .key(key, direction)
            .map_err(|e| e.to_string())
    }
}
