//! Key input for the line editor.

use std::collections::VecDeque;
use std::io;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Editing keys the local console reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    Tab,
    Enter,
    /// Ctrl-C: drop the line being typed.
    Interrupt,
    /// Ctrl-D: end of input on an empty line, delete otherwise.
    EndOfInput,
}

impl EditKey {
    /// Map a terminal key event. `None` for keys the editor ignores.
    pub fn from_event(key: KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        Some(match key.code {
            KeyCode::Char('c') if ctrl => EditKey::Interrupt,
            KeyCode::Char('d') if ctrl => EditKey::EndOfInput,
            KeyCode::Char('a') if ctrl => EditKey::Home,
            KeyCode::Char('e') if ctrl => EditKey::End,
            KeyCode::Char(_) if ctrl => return None,
            KeyCode::Char(c) => EditKey::Char(c),
            KeyCode::Backspace => EditKey::Backspace,
            KeyCode::Delete => EditKey::Delete,
            KeyCode::Left => EditKey::Left,
            KeyCode::Right => EditKey::Right,
            KeyCode::Home => EditKey::Home,
            KeyCode::End => EditKey::End,
            KeyCode::Up => EditKey::Up,
            KeyCode::Down => EditKey::Down,
            KeyCode::Tab => EditKey::Tab,
            KeyCode::Enter => EditKey::Enter,
            _ => return None,
        })
    }
}

/// Blocking source of editing keys.
pub trait KeySource: Send {
    /// Next key, or `None` once input is closed.
    fn next_key(&mut self) -> io::Result<Option<EditKey>>;
}

/// Keys read from the terminal. Requires raw mode.
#[derive(Debug, Default)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> io::Result<Option<EditKey>> {
        loop {
            if let Event::Key(key) = event::read()? {
                if let Some(edit) = EditKey::from_event(key) {
                    return Ok(Some(edit));
                }
            }
        }
    }
}

/// Pre-recorded keys, then end of input.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<EditKey>,
}

impl ScriptedKeys {
    pub fn new(keys: impl IntoIterator<Item = EditKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Typing `text` followed by Enter.
    pub fn line(mut self, text: &str) -> Self {
        self.keys.extend(text.chars().map(EditKey::Char));
        self.keys.push_back(EditKey::Enter);
        self
    }

    pub fn key(mut self, key: EditKey) -> Self {
        self.keys.push_back(key);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.keys.extend(text.chars().map(EditKey::Char));
        self
    }
}

impl KeySource for ScriptedKeys {
    fn next_key(&mut self) -> io::Result<Option<EditKey>> {
        Ok(self.keys.pop_front())
    }
}
