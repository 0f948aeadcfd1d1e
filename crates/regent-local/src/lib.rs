//! Local terminal front-end: raw-mode line editing with history, tab
//! completion against the command registry, and colorized output that never
//! tears the line being typed.

pub mod editor;
pub mod keys;
pub mod local;
pub mod render;

pub use editor::{EditAction, LineEditor};
pub use keys::{EditKey, KeySource, ScriptedKeys, TerminalKeys};
pub use local::{CLEAR_CONSOLE, LocalConsole, RawModeGuard};
