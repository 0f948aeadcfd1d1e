//! Error types for the Regent console.

use std::io;

/// Errors produced by the console, its front-ends, and the remote protocol.
#[derive(Debug, thiserror::Error)]
pub enum RegentError {
    #[error("command error: {0}")]
    Command(String),

    #[error("registration error: {0}")]
    Registration(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown session: {0}")]
    SessionNotFound(String),

    #[error("too many failed logins, try again later")]
    RateLimited,

    #[error("session limit reached ({0})")]
    SessionLimit(usize),

    #[error("remote console disabled: {0}")]
    RemoteDisabled(String),

    #[error("console closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegentError {
    /// Stable machine-readable code used by the remote protocol.
    pub fn code(&self) -> &'static str {
        match self {
            RegentError::Unauthorized => "unauthorized",
            RegentError::SessionNotFound(_) => "not_found",
            RegentError::RateLimited => "rate_limited",
            RegentError::SessionLimit(_) => "session_limit",
            RegentError::RemoteDisabled(_) => "disabled",
            RegentError::Protocol(_) | RegentError::Json(_) => "bad_request",
            RegentError::Closed => "closed",
            _ => "internal",
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RegentError>;
