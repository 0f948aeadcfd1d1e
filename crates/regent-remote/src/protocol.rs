//! JSON-lines wire protocol.
//!
//! Each request and each response is one JSON object on its own line.
//! Requests carry an `op` tag, responses a `status` tag:
//!
//! ```text
//! > {"op":"start_session","user":"admin","password":"secret"}
//! < {"status":"session","session":"6f1c...","prompt":"Regent # "}
//! > {"op":"poll_events","session":"6f1c...","wait_ms":5000}
//! < {"status":"events","lines":[{"number":0,"level":"normal","text":"Regent # "}],"prompt":"Regent # "}
//! ```

use serde::{Deserialize, Serialize};

use regent_types::error::RegentError;

use crate::remote::{EventBatch, SessionStart};
use crate::scrollback::ScrollbackLine;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    StartSession {
        user: String,
        password: String,
    },
    CloseSession {
        session: String,
    },
    SubmitCommand {
        session: String,
        command: String,
    },
    /// Fetch unseen lines. A non-zero `wait_ms` long-polls.
    PollEvents {
        session: String,
        #[serde(default)]
        wait_ms: u64,
    },
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Session {
        session: String,
        prompt: String,
    },
    Ok,
    Events {
        lines: Vec<ScrollbackLine>,
        prompt: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn from_error(err: &RegentError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

impl From<SessionStart> for Response {
    fn from(start: SessionStart) -> Self {
        Response::Session {
            session: start.session_id,
            prompt: start.prompt,
        }
    }
}

impl From<EventBatch> for Response {
    fn from(batch: EventBatch) -> Self {
        Response::Events {
            lines: batch.lines,
            prompt: batch.prompt,
        }
    }
}

/// Turn an error response back into a [`RegentError`].
pub fn error_from_code(code: &str, message: &str) -> RegentError {
    match code {
        "unauthorized" => RegentError::Unauthorized,
        "not_found" => RegentError::SessionNotFound(message.to_string()),
        "rate_limited" => RegentError::RateLimited,
        "disabled" => RegentError::RemoteDisabled(message.to_string()),
        "closed" => RegentError::Closed,
        _ => RegentError::Protocol(format!("{code}: {message}")),
    }
}
