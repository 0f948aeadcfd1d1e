//! Line editing state machine, independent of the terminal.

use regent_console::History;

use crate::keys::EditKey;

/// What the console should do after a key was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// The line or cursor changed; redraw it.
    Redraw,
    /// Nothing visible changed.
    Nothing,
    /// Show completion candidates for the current line.
    Complete(String),
    /// The operator accepted this line.
    Submit(String),
    /// The line was discarded (Ctrl-C).
    Cancel,
    /// End of input (Ctrl-D on an empty line).
    EndOfInput,
}

/// Buffer, cursor, and history of the line being typed.
pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    history: History,
}

impl LineEditor {
    pub fn new(history_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            history: History::new(history_size),
        }
    }

    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Add a line accepted outside of [`apply`](Self::apply).
    pub fn record(&mut self, line: &str) {
        self.history.push(line);
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn replace(&mut self, text: Option<&str>) {
        self.buffer = text.map(|t| t.chars().collect()).unwrap_or_default();
        self.cursor = self.buffer.len();
    }

    pub fn apply(&mut self, key: EditKey) -> EditAction {
        match key {
            EditKey::Char(c) => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
                EditAction::Redraw
            },
            EditKey::Backspace => {
                if self.cursor == 0 {
                    return EditAction::Nothing;
                }
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
                EditAction::Redraw
            },
            EditKey::Delete => self.delete_at_cursor(),
            EditKey::Left => {
                if self.cursor == 0 {
                    return EditAction::Nothing;
                }
                self.cursor -= 1;
                EditAction::Redraw
            },
            EditKey::Right => {
                if self.cursor == self.buffer.len() {
                    return EditAction::Nothing;
                }
                self.cursor += 1;
                EditAction::Redraw
            },
            EditKey::Home => {
                self.cursor = 0;
                EditAction::Redraw
            },
            EditKey::End => {
                self.cursor = self.buffer.len();
                EditAction::Redraw
            },
            EditKey::Up => {
                let Some(entry) = self.history.previous().map(str::to_string) else {
                    return EditAction::Nothing;
                };
                self.replace(Some(&entry));
                EditAction::Redraw
            },
            EditKey::Down => {
                let entry = self.history.next().map(str::to_string);
                self.replace(entry.as_deref());
                EditAction::Redraw
            },
            EditKey::Tab => EditAction::Complete(self.line()),
            EditKey::Enter => {
                let line = self.line();
                self.history.push(&line);
                self.replace(None);
                EditAction::Submit(line)
            },
            EditKey::Interrupt => {
                self.replace(None);
                self.history.reset_cursor();
                EditAction::Cancel
            },
            EditKey::EndOfInput => {
                if self.buffer.is_empty() {
                    EditAction::EndOfInput
                } else {
                    self.delete_at_cursor()
                }
            },
        }
    }

    fn delete_at_cursor(&mut self) -> EditAction {
        if self.cursor >= self.buffer.len() {
            return EditAction::Nothing;
        }
        self.buffer.remove(self.cursor);
        EditAction::Redraw
    }
}
