//! Output colorizing.
//!
//! Warnings are yellow and errors red. A leading `[CATEGORY]` tag on any
//! other line is drawn in a color derived from the tag, so the same
//! subsystem always gets the same color.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use regent_types::level::OutputLevel;

const CATEGORY_COLORS: [Color; 8] = [
    Color::Cyan,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::DarkCyan,
    Color::DarkGreen,
    Color::DarkMagenta,
    Color::DarkYellow,
];

pub fn level_color(level: OutputLevel) -> Option<Color> {
    match level {
        OutputLevel::Warn => Some(Color::Yellow),
        OutputLevel::Error => Some(Color::Red),
        OutputLevel::Normal | OutputLevel::Info => None,
    }
}

/// Stable color for a category name (FNV-1a over its bytes).
pub fn category_color(name: &str) -> Color {
    let mut hash: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    CATEGORY_COLORS[hash as usize % CATEGORY_COLORS.len()]
}

/// Split `[TAG] rest` into the bracketed tag and the remainder.
pub fn split_category(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('[')?;
    let end = rest.find(']')?;
    if end == 0 || rest[..end].contains(char::is_whitespace) {
        return None;
    }
    Some((&text[..end + 2], &text[end + 2..]))
}

/// Queue `text` with colors. Does not write a line terminator.
pub fn queue_line<W: Write>(out: &mut W, text: &str, level: OutputLevel, color: bool) -> io::Result<()> {
    if !color {
        return queue!(out, Print(text));
    }
    if let Some(c) = level_color(level) {
        return queue!(out, SetForegroundColor(c), Print(text), ResetColor);
    }
    match split_category(text) {
        Some((tag, rest)) => {
            let c = category_color(tag.trim_start_matches('[').trim_end_matches(']'));
            queue!(out, SetForegroundColor(c), Print(tag), ResetColor, Print(rest))
        },
        None => queue!(out, Print(text)),
    }
}
