//! `log` backend that routes records through the active console.
//!
//! Filtering is delegated to `env_logger` (`RUST_LOG`, default `info`).
//! While a console is attached, records are written to it as
//! `[target] message` so they interleave safely with the operator's input and
//! reach remote sessions through the scrollback. With nothing attached the
//! `env_logger` stderr writer is used.

use std::cell::Cell;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use env_logger::Env;
use log::{LevelFilter, Log, Metadata, Record};
use regent_types::error::{RegentError, Result};
use regent_types::level::OutputLevel;

use crate::console::ConsoleOutput;

static LOGGER: OnceLock<&'static ConsoleLogger> = OnceLock::new();

thread_local! {
    /// Set while a record is being written to a console, so a console that
    /// logs from its own output path falls back to stderr instead of
    /// recursing.
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

pub struct ConsoleLogger {
    inner: env_logger::Logger,
    console: RwLock<Option<Arc<dyn ConsoleOutput>>>,
    /// Level set at runtime by `set log level`; replaces the env filter for
    /// console-bound records.
    level_override: RwLock<Option<LevelFilter>>,
}

impl ConsoleLogger {
    pub fn new(inner: env_logger::Logger) -> Self {
        Self {
            inner,
            console: RwLock::new(None),
            level_override: RwLock::new(None),
        }
    }

    pub fn attach(&self, console: Arc<dyn ConsoleOutput>) {
        *self.console.write().unwrap_or_else(PoisonError::into_inner) = Some(console);
    }

    pub fn detach(&self) {
        *self.console.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self
            .level_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(level);
    }

    fn override_level(&self) -> Option<LevelFilter> {
        *self
            .level_override
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        match self.override_level() {
            Some(level) => metadata.level() <= level,
            None => self.inner.enabled(metadata),
        }
    }

    fn log(&self, record: &Record<'_>) {
        let allowed = match self.override_level() {
            Some(level) => record.level() <= level,
            None => self.inner.matches(record),
        };
        if !allowed {
            return;
        }
        let console = self
            .console
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match console {
            Some(console) if !FORWARDING.get() => {
                FORWARDING.set(true);
                console.output(&format_record(record), OutputLevel::from(record.level()));
                FORWARDING.set(false);
            },
            _ => self.inner.log(record),
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// `[target] message`.
pub fn format_record(record: &Record<'_>) -> String {
    format!("[{}] {}", record.target(), record.args())
}

/// Install the console logger as the global `log` backend.
pub fn init() -> Result<()> {
    let inner = env_logger::Builder::from_env(Env::default().default_filter_or("info")).build();
    let max_level = inner.filter();
    let logger: &'static ConsoleLogger = Box::leak(Box::new(ConsoleLogger::new(inner)));
    log::set_logger(logger)
        .map_err(|e| RegentError::Config(format!("logger already installed: {e}")))?;
    log::set_max_level(max_level);
    let _ = LOGGER.set(logger);
    Ok(())
}

/// Send log output to `console` until [`detach`] is called. No-op before
/// [`init`].
pub fn attach(console: Arc<dyn ConsoleOutput>) {
    if let Some(logger) = LOGGER.get() {
        logger.attach(console);
    }
}

/// Return log output to stderr.
pub fn detach() {
    if let Some(logger) = LOGGER.get() {
        logger.detach();
    }
}

/// Change the active log level at runtime.
pub fn set_level(level: LevelFilter) {
    if let Some(logger) = LOGGER.get() {
        logger.set_level(level);
    }
    log::set_max_level(level);
}

/// Parse a level name as accepted by `set log level`.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    name.parse::<LevelFilter>().map_err(|_| {
        RegentError::Command(format!(
            "unknown log level '{name}' (off, error, warn, info, debug, trace)"
        ))
    })
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;
    use crate::console::BufferConsole;

    fn logger(level: LevelFilter) -> ConsoleLogger {
        ConsoleLogger::new(env_logger::Builder::new().filter_level(level).build())
    }

    fn emit(logger: &ConsoleLogger, level: Level, target: &str, msg: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{msg}"))
                .build(),
        );
    }

    #[test]
    fn forwards_to_attached_console() {
        let logger = logger(LevelFilter::Info);
        let console = Arc::new(BufferConsole::new());
        logger.attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
        emit(&logger, Level::Warn, "REMOTE", "session expired");
        emit(&logger, Level::Info, "regent", "started");
        assert_eq!(
            console.lines(),
            vec![
                (OutputLevel::Warn, "[REMOTE] session expired".to_string()),
                (OutputLevel::Info, "[regent] started".to_string()),
            ]
        );
    }

    #[test]
    fn filtered_records_are_dropped() {
        let logger = logger(LevelFilter::Warn);
        let console = Arc::new(BufferConsole::new());
        logger.attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
        emit(&logger, Level::Info, "regent", "quiet");
        assert!(console.lines().is_empty());
    }

    #[test]
    fn runtime_level_overrides_env_filter() {
        let logger = logger(LevelFilter::Warn);
        let console = Arc::new(BufferConsole::new());
        logger.attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
        logger.set_level(LevelFilter::Debug);
        emit(&logger, Level::Debug, "regent", "verbose");
        assert_eq!(console.lines().len(), 1);
        assert_eq!(console.lines()[0].0, OutputLevel::Normal);
    }

    #[test]
    fn detach_stops_forwarding() {
        let logger = logger(LevelFilter::Info);
        let console = Arc::new(BufferConsole::new());
        logger.attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
        logger.detach();
        emit(&logger, Level::Error, "regent", "to stderr");
        assert!(console.lines().is_empty());
    }

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert!(parse_level("loud").is_err());
    }
}
