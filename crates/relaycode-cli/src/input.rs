use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

use crate::constants::{CONTINUATION_PREFIX, PROMPT_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    Edited,
    Line(String),
    Interrupt,
    Eof,
}

/// Line editor over raw key events. The buffer may hold embedded newlines
/// from backslash continuation; only the tail of the current sub-line is
/// ever shown, truncated to what fits next to the prompt prefix.
pub struct Editor {
    buffer: String,
}

impl Editor {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                InputAction::Interrupt
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.buffer.is_empty() {
                    InputAction::Eof
                } else {
                    InputAction::None
                }
            }
            KeyCode::Enter => {
                if self.buffer.ends_with('\\') {
                    self.buffer.pop();
                    self.buffer.push('\n');
                    return InputAction::Edited;
                }
                let line = self.buffer.trim().to_string();
                self.buffer.clear();
                if line.is_empty() {
                    InputAction::Edited
                } else {
                    InputAction::Line(line)
                }
            }
            KeyCode::Backspace => {
                if self.buffer.pop().is_some() {
                    InputAction::Edited
                } else {
                    InputAction::None
                }
            }
            KeyCode::Char(ch) => {
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    || key.modifiers.contains(KeyModifiers::ALT)
                {
                    return InputAction::None;
                }
                self.buffer.push(ch);
                InputAction::Edited
            }
            // Cursor-movement and other control sequences are swallowed.
            _ => InputAction::None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        if self.buffer.contains('\n') {
            CONTINUATION_PREFIX
        } else {
            PROMPT_PREFIX
        }
    }

    /// The prompt line as it should appear on screen: prefix plus the
    /// widest suffix of the current sub-line that fits in `width`.
    pub fn prompt_line(&self, width: usize) -> String {
        let prefix = self.prefix();
        let current = self
            .buffer
            .rsplit('\n')
            .next()
            .unwrap_or(self.buffer.as_str());
        let avail = width.saturating_sub(UnicodeWidthStr::width(prefix) + 1);

        let mut shown = 0;
        let mut start = current.len();
        for (idx, ch) in current.char_indices().rev() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0);
            if shown + w > avail {
                break;
            }
            shown += w;
            start = idx;
        }
        format!("{}{}", prefix, &current[start..])
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}
