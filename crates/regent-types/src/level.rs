//! Severity attached to every console output line.

use serde::{Deserialize, Serialize};

/// Output severity. Drives colorizing on the terminal and travels with
/// scrollback lines to remote sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLevel {
    #[default]
    Normal,
    Info,
    Warn,
    Error,
}

impl OutputLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputLevel::Normal => "normal",
            OutputLevel::Info => "info",
            OutputLevel::Warn => "warn",
            OutputLevel::Error => "error",
        }
    }
}

impl From<log::Level> for OutputLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => OutputLevel::Error,
            log::Level::Warn => OutputLevel::Warn,
            log::Level::Info => OutputLevel::Info,
            log::Level::Debug | log::Level::Trace => OutputLevel::Normal,
        }
    }
}
