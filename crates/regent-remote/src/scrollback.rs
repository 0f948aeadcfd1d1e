//! Numbered ring of recent console output shared by all remote sessions.

use std::collections::VecDeque;

use regent_types::level::OutputLevel;
use serde::{Deserialize, Serialize};

/// One line of console output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollbackLine {
    /// Starts at 1 and increases by one per line; never reused.
    pub number: u64,
    pub level: OutputLevel,
    pub text: String,
}

/// Bounded output history. The oldest lines are evicted first; numbering is
/// unaffected by eviction.
#[derive(Debug)]
pub struct Scrollback {
    lines: VecDeque<ScrollbackLine>,
    capacity: usize,
    last: u64,
}

impl Scrollback {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            last: 0,
        }
    }

    /// Append one line and return its number.
    pub fn push(&mut self, text: &str, level: OutputLevel) -> u64 {
        self.last += 1;
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(ScrollbackLine {
            number: self.last,
            level,
            text: text.to_string(),
        });
        self.last
    }

    /// Append every line of `text`; an empty `text` adds one empty line.
    pub fn push_text(&mut self, text: &str, level: OutputLevel) {
        if text.is_empty() {
            self.push("", level);
            return;
        }
        for line in text.lines() {
            self.push(line, level);
        }
    }

    /// Number of the newest line, 0 when nothing was ever written.
    pub fn current(&self) -> u64 {
        self.last
    }

    /// Retained lines numbered above `seen`, oldest first.
    pub fn since(&self, seen: u64) -> Vec<ScrollbackLine> {
        // Numbers are contiguous, so the first wanted line sits at a fixed
        // offset from the front.
        let first = self.lines.front().map_or(self.last + 1, |l| l.number);
        let skip = usize::try_from(seen.saturating_add(1).saturating_sub(first)).unwrap_or(usize::MAX);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn numbering_starts_at_one() {
        let mut sb = Scrollback::new(10);
        assert_eq!(sb.current(), 0);
        assert_eq!(sb.push("a", OutputLevel::Normal), 1);
        assert_eq!(sb.push("b", OutputLevel::Warn), 2);
        let lines = sb.since(0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].level, OutputLevel::Warn);
        assert!(sb.since(2).is_empty());
    }

    #[test]
    fn eviction_keeps_numbers() {
        let mut sb = Scrollback::new(3);
        for i in 0..5 {
            sb.push(&format!("line {i}"), OutputLevel::Normal);
        }
        assert_eq!(sb.len(), 3);
        let numbers: Vec<u64> = sb.since(0).iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        let numbers: Vec<u64> = sb.since(4).iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![5]);
    }

    #[test]
    fn multi_line_text_is_split() {
        let mut sb = Scrollback::new(10);
        sb.push_text("one\ntwo", OutputLevel::Info);
        sb.push_text("", OutputLevel::Normal);
        let texts: Vec<String> = sb.since(0).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["one", "two", ""]);
    }

    #[test]
    fn serializes_level_lowercase() {
        let line = ScrollbackLine {
            number: 7,
            level: OutputLevel::Error,
            text: "boom".to_string(),
        };
        let json = serde_json::to_string(&line).unwrap();
        assert_eq!(json, r#"{"number":7,"level":"error","text":"boom"}"#);
    }

    proptest! {
        #[test]
        fn since_returns_strictly_increasing_unseen_lines(
            capacity in 1usize..20,
            count in 0usize..60,
            seen in 0u64..70,
        ) {
            let mut sb = Scrollback::new(capacity);
            for i in 0..count {
                sb.push(&i.to_string(), OutputLevel::Normal);
            }
            let lines = sb.since(seen);
            prop_assert!(lines.len() <= capacity);
            prop_assert!(lines.iter().all(|l| l.number > seen));
            prop_assert!(lines.windows(2).all(|w| w[1].number == w[0].number + 1));
            if let Some(last) = lines.last() {
                prop_assert_eq!(last.number, count as u64);
            }
            let expected = (count as u64).saturating_sub(seen).min(sb.len() as u64);
            prop_assert_eq!(lines.len() as u64, expected);
        }
    }
}
