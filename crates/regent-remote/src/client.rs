//! Blocking client for the remote console transport.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use regent_types::error::{RegentError, Result};

use crate::protocol::{Request, Response, error_from_code};
use crate::scrollback::ScrollbackLine;

/// Slack added to the socket read timeout on top of a long-poll wait.
const READ_SLACK: Duration = Duration::from_secs(5);

/// One connection to a [`RemoteServer`](crate::RemoteServer), optionally
/// logged in.
pub struct RemoteClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    session: Option<String>,
    prompt: String,
}

impl RemoteClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
            session: None,
            prompt: String::new(),
        })
    }

    /// Send one request and read one response. Error responses come back as
    /// `Ok(Response::Error { .. })`.
    pub fn request(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        self.read_response()
    }

    /// Read one response without sending anything.
    pub fn read_response(&mut self) -> Result<Response> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(RegentError::Closed);
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        match self.request(request)? {
            Response::Error { code, message } => Err(error_from_code(&code, &message)),
            other => Ok(other),
        }
    }

    fn session(&self) -> Result<String> {
        self.session
            .clone()
            .ok_or_else(|| RegentError::Protocol("not logged in".to_string()))
    }

    /// Start a session. The session id is kept for later calls.
    pub fn login(&mut self, user: &str, password: &str) -> Result<String> {
        let request = Request::StartSession {
            user: user.to_string(),
            password: password.to_string(),
        };
        match self.call(&request)? {
            Response::Session { session, prompt } => {
                self.session = Some(session.clone());
                self.prompt = prompt;
                Ok(session)
            },
            other => Err(unexpected(&other)),
        }
    }

    pub fn submit(&mut self, command: &str) -> Result<()> {
        let request = Request::SubmitCommand {
            session: self.session()?,
            command: command.to_string(),
        };
        match self.call(&request)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch unseen lines, waiting up to `wait` for some to arrive.
    pub fn poll(&mut self, wait: Duration) -> Result<Vec<ScrollbackLine>> {
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        let request = Request::PollEvents {
            session: self.session()?,
            wait_ms,
        };
        self.reader
            .get_ref()
            .set_read_timeout(Some(wait.saturating_add(READ_SLACK)))?;
        match self.call(&request)? {
            Response::Events { lines, prompt } => {
                self.prompt = prompt;
                Ok(lines)
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Close the session, if any. The connection stays open.
    pub fn logout(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        match self.call(&Request::CloseSession { session })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Prompt from the latest login or poll.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

fn unexpected(response: &Response) -> RegentError {
    RegentError::Protocol(format!("unexpected response: {response:?}"))
}
