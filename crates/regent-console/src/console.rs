//! Console front-end abstraction and the read-dispatch loop.
//!
//! A front-end only moves text: it reads lines and writes output. Parsing,
//! resolution, and invocation all go through the [`CommandRegistry`].

use std::sync::{Mutex, PoisonError};

use regent_types::level::OutputLevel;

use crate::registry::{CommandRegistry, DispatchOutcome};
use crate::shutdown::Shutdown;

/// Anything commands and loggers can write to.
///
/// Implementations must be safe to call from any thread while another thread
/// is blocked in [`Console::read_line`].
pub trait ConsoleOutput: Send + Sync {
    fn output(&self, text: &str, level: OutputLevel);

    fn print(&self, text: &str) {
        self.output(text, OutputLevel::Normal);
    }

    fn warn(&self, text: &str) {
        self.output(text, OutputLevel::Warn);
    }

    fn error(&self, text: &str) {
        self.output(text, OutputLevel::Error);
    }
}

/// An interactive front-end.
pub trait Console: ConsoleOutput {
    /// Block until the operator submits a line. `None` once input is closed
    /// for good (end of file, remote console shut down).
    fn read_line(&self, prompt: &str) -> Option<String>;
}

/// Drive `console` until input closes or shutdown is requested.
///
/// Each accepted line is parsed, resolved, and executed synchronously on the
/// calling thread; a long-running handler delays the next prompt.
pub fn run(console: &dyn Console, registry: &CommandRegistry, shutdown: &Shutdown) {
    log::debug!("console loop started");
    while !shutdown.is_requested() {
        let prompt = registry.prompt();
        let Some(line) = console.read_line(&prompt) else {
            log::debug!("console input closed");
            break;
        };
        if shutdown.is_requested() {
            break;
        }
        let outcome = registry.run_line(&line, console);
        log::trace!("'{line}' -> {outcome:?}");
    }
    log::debug!("console loop stopped");
}

/// Report a non-executed outcome to the operator.
pub(crate) fn report(outcome: &DispatchOutcome, registry: &CommandRegistry, out: &dyn ConsoleOutput) {
    match outcome {
        DispatchOutcome::Empty | DispatchOutcome::Executed { .. } => {},
        DispatchOutcome::NeedsContext { path } => {
            out.warn(&format!(
                "'{path}' needs an active context; use 'change context <name>' first"
            ));
        },
        DispatchOutcome::Ambiguous {
            matched,
            token,
            candidates,
        } => {
            let prefix = if matched.is_empty() {
                String::new()
            } else {
                format!("{} ", matched.join(" "))
            };
            out.warn(&format!(
                "Ambiguous command '{prefix}{token}', did you mean one of: {}",
                candidates.join(", ")
            ));
        },
        DispatchOutcome::NoMatch { matched, .. } => {
            out.print("Sorry.. missed that.");
            if !matched.is_empty() {
                for line in registry.get_help(matched) {
                    out.print(&line);
                }
            }
        },
        DispatchOutcome::Incomplete { matched, .. } => {
            for line in registry.get_help(matched) {
                out.print(&line);
            }
        },
    }
}

/// Console that records output in memory. Used by scripts run without a
/// terminal and by tests.
#[derive(Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<(OutputLevel, String)>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, with levels.
    pub fn lines(&self) -> Vec<(OutputLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written so far, one line per output call.
    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ConsoleOutput for BufferConsole {
    fn output(&self, text: &str, level: OutputLevel) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, text.to_string()));
    }
}
