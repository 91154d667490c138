//! Line editor used by the chat box and the login form

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use unicode_width::UnicodeWidthChar;

/// Result of handling a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Key consumed, nothing for the caller to do
    None,
    /// Enter pressed on a non-blank buffer
    Submit(String),
    /// Ctrl+C or Ctrl+D
    Quit,
    /// Buffer contents changed
    Edited,
    /// PageUp
    ScrollUp,
    /// PageDown
    ScrollDown,
    /// Tab pressed, for completion
    Tab,
    /// Esc pressed
    Escape,
}

/// Editable single-line buffer with history.
///
/// `cursor` is a character index, not a byte index, so multi-byte input
/// never splits a code point.
#[derive(Debug, Clone)]
pub struct InputState {
    /// Current text
    pub buffer: String,
    /// Cursor position in characters
    pub cursor: usize,
    /// Submitted lines, oldest first
    pub history: Vec<String>,
    /// -1 while editing the live buffer
    pub history_index: isize,
    saved_input: String,
    /// Render as bullets (password fields); masked input is never recorded
    /// in history.
    masked: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    /// Empty, unmasked input
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            history: Vec::new(),
            history_index: -1,
            saved_input: String::new(),
            masked: false,
        }
    }

    /// Empty input drawn as bullets
    pub fn masked() -> Self {
        Self {
            masked: true,
            ..Self::new()
        }
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.buffer.len())
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.buffer.insert(byte_idx, c);
        self.cursor += 1;
    }

    fn remove_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.remove_char_at_cursor();
        }
    }

    fn remove_char_at_cursor(&mut self) {
        if self.cursor < self.char_count() {
            let byte_idx = self.char_to_byte_index(self.cursor);
            if let Some(ch) = self.buffer[byte_idx..].chars().next() {
                self.buffer.replace_range(byte_idx..byte_idx + ch.len_utf8(), "");
            }
        }
    }

    /// Apply a key press and report what the caller should do
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => InputAction::Quit,

            KeyCode::Enter => {
                if self.buffer.trim().is_empty() {
                    return InputAction::None;
                }
                let input = std::mem::take(&mut self.buffer);
                if !self.masked && self.history.last() != Some(&input) {
                    self.history.push(input.clone());
                }
                self.cursor = 0;
                self.history_index = -1;
                InputAction::Submit(input)
            }

            KeyCode::Backspace => {
                self.remove_char_before_cursor();
                InputAction::Edited
            }
            KeyCode::Delete => {
                self.remove_char_at_cursor();
                InputAction::Edited
            }
            KeyCode::Char('u') if ctrl => {
                self.clear();
                InputAction::Edited
            }
            KeyCode::Char('w') if ctrl => {
                self.delete_word();
                InputAction::Edited
            }

            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                InputAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.char_count() {
                    self.cursor += 1;
                }
                InputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::Char('a') if ctrl => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::End => {
                self.cursor = self.char_count();
                InputAction::None
            }
            KeyCode::Char('e') if ctrl => {
                self.cursor = self.char_count();
                InputAction::None
            }

            KeyCode::Up => {
                self.history_prev();
                InputAction::Edited
            }
            KeyCode::Down => {
                self.history_next();
                InputAction::Edited
            }
            KeyCode::PageUp => InputAction::ScrollUp,
            KeyCode::PageDown => InputAction::ScrollDown,

            KeyCode::Tab => InputAction::Tab,
            KeyCode::Esc => InputAction::Escape,

            KeyCode::Char(c) if !ctrl => {
                self.insert_char(c);
                InputAction::Edited
            }

            _ => InputAction::None,
        }
    }

    /// Text after `/` up to the first space, when the buffer is a command
    pub fn slash_prefix(&self) -> Option<&str> {
        let after_slash = self.buffer.strip_prefix('/')?;
        let end = after_slash.find(' ').unwrap_or(after_slash.len());
        Some(&after_slash[..end])
    }

    /// Replace the text and put the cursor at the end
    pub fn set_buffer(&mut self, content: &str) {
        self.buffer = content.to_string();
        self.cursor = self.char_count();
    }

    /// Empty the buffer; history is kept
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// What the widget draws; bullets for masked fields
    pub fn display_text(&self) -> String {
        if self.masked {
            "•".repeat(self.char_count())
        } else {
            self.buffer.clone()
        }
    }

    /// Ctrl+W: drop trailing spaces, then the word before the cursor
    fn delete_word(&mut self) {
        while self.cursor > 0 && self.char_before_cursor() == Some(' ') {
            self.remove_char_before_cursor();
        }
        while self.cursor > 0 && self.char_before_cursor() != Some(' ') {
            self.remove_char_before_cursor();
        }
    }

    fn char_before_cursor(&self) -> Option<char> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.buffer.chars().nth(i))
    }

    /// Up: step back through history, saving the live buffer first
    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        if self.history_index == -1 {
            self.saved_input = self.buffer.clone();
        }
        if self.history_index < self.history.len() as isize - 1 {
            self.history_index += 1;
            let idx = self.history.len() - 1 - self.history_index as usize;
            self.buffer = self.history[idx].clone();
            self.cursor = self.char_count();
        }
    }

    /// Down: step forward, restoring the live buffer at the end
    fn history_next(&mut self) {
        if self.history_index > 0 {
            self.history_index -= 1;
            let idx = self.history.len() - 1 - self.history_index as usize;
            self.buffer = self.history[idx].clone();
            self.cursor = self.char_count();
        } else if self.history_index == 0 {
            self.history_index = -1;
            self.buffer = std::mem::take(&mut self.saved_input);
            self.cursor = self.char_count();
        }
    }

    /// Cursor position in terminal columns (wide characters take two)
    pub fn cursor_display_width(&self) -> usize {
        if self.masked {
            return self.cursor;
        }
        self.buffer
            .chars()
            .take(self.cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }
}
