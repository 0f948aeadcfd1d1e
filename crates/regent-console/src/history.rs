//! Bounded command history with recall cursor.

use std::collections::VecDeque;

use regent_types::config::DEFAULT_HISTORY_SIZE;

/// Ring of the most recent accepted lines, oldest evicted first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    /// Position of the line being recalled; `None` when editing a new line.
    cursor: Option<usize>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: None,
        }
    }

    /// Record an accepted line. Blank lines and repeats of the latest entry
    /// are skipped. Resets the recall cursor.
    pub fn push(&mut self, line: &str) {
        self.cursor = None;
        if line.trim().is_empty() {
            return;
        }
        if self.entries.back().is_some_and(|last| last == line) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    /// Step back in time (Up). Stays on the oldest entry once reached.
    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = match self.cursor {
            Some(0) => 0,
            Some(p) => p - 1,
            None => self.entries.len() - 1,
        };
        self.cursor = Some(pos);
        self.entries.get(pos).map(String::as_str)
    }

    /// Step forward in time (Down). Past the newest entry the cursor leaves
    /// history and `None` is returned, meaning "empty line".
    pub fn next(&mut self) -> Option<&str> {
        let pos = self.cursor?;
        if pos + 1 < self.entries.len() {
            self.cursor = Some(pos + 1);
            self.entries.get(pos + 1).map(String::as_str)
        } else {
            self.cursor = None;
            None
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
