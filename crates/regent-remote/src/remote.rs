//! The remote console: a [`Console`] fed by remote sessions.
//!
//! Output goes into one shared [`Scrollback`]; each session keeps a cursor
//! into it. Submitted lines go into an [`InputQueue`] that the console thread
//! drains through [`Console::read_line`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use regent_console::{Console, ConsoleOutput, Watchdog};
use regent_types::config::{Credentials, DEFAULT_PROMPT, RemoteConfig};
use regent_types::error::{RegentError, Result};
use regent_types::level::OutputLevel;

use crate::auth::{LoginLimiter, credentials_match};
use crate::input_queue::InputQueue;
use crate::scrollback::{Scrollback, ScrollbackLine};
use crate::session::{CloseReason, Session, SessionObserver};

/// How often the sweeper thread looks for idle sessions.
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: String,
    pub prompt: String,
}

/// Lines delivered by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub lines: Vec<ScrollbackLine>,
    pub prompt: String,
}

struct RemoteState {
    scrollback: Scrollback,
    sessions: HashMap<String, Session>,
    limiter: LoginLimiter,
    prompt: String,
}

impl RemoteState {
    fn has_events(&self, session: &Session) -> bool {
        session.fresh || session.last_line_seen < self.scrollback.current()
    }

    fn take_events(&mut self, id: &str, now: Instant) -> Result<EventBatch> {
        let current = self.scrollback.current();
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegentError::SessionNotFound(id.to_string()))?;
        let mut lines = Vec::new();
        if session.fresh {
            session.fresh = false;
            lines.push(ScrollbackLine {
                number: 0,
                level: OutputLevel::Normal,
                text: self.prompt.clone(),
            });
        }
        lines.extend(self.scrollback.since(session.last_line_seen));
        session.last_line_seen = current;
        session.touch(now);
        Ok(EventBatch {
            lines,
            prompt: self.prompt.clone(),
        })
    }
}

/// Console front-end served to remote operators.
pub struct RemoteConsole {
    credentials: Option<Credentials>,
    idle_timeout: Duration,
    max_sessions: usize,
    max_long_poll: Duration,
    echo_to_stdout: bool,
    state: Mutex<RemoteState>,
    /// Signalled when lines are appended or sessions end.
    changed: Condvar,
    input: InputQueue,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    shut_down: AtomicBool,
}

impl RemoteConsole {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            credentials: config.credentials(),
            idle_timeout: config.idle_timeout(),
            max_sessions: config.max_sessions,
            max_long_poll: config.max_long_poll(),
            echo_to_stdout: config.echo_to_stdout,
            state: Mutex::new(RemoteState {
                scrollback: Scrollback::new(config.scrollback_lines),
                sessions: HashMap::new(),
                limiter: LoginLimiter::default(),
                prompt: format!("{DEFAULT_PROMPT} # "),
            }),
            changed: Condvar::new(),
            input: InputQueue::new(),
            observers: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether credentials are configured.
    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn notify_closed(&self, ids: &[String], reason: CloseReason) {
        if ids.is_empty() {
            return;
        }
        self.changed.notify_all();
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for id in ids {
            log::info!("remote session {id} {reason}");
            for observer in &observers {
                observer.session_closed(id, reason);
            }
        }
    }

    /// Log in and open a session.
    pub fn start_session(&self, user: &str, password: &str) -> Result<SessionStart> {
        self.sweep_expired();
        let Some(expected) = &self.credentials else {
            return Err(RegentError::RemoteDisabled(
                "no remote credentials configured".to_string(),
            ));
        };
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(RegentError::Closed);
        }

        let now = Instant::now();
        let mut state = self.lock();
        // Log lines land in the scrollback, so nothing is logged while the
        // state lock is held.
        if state.limiter.is_limited(now) {
            drop(state);
            log::warn!("remote login refused: rate limited");
            return Err(RegentError::RateLimited);
        }
        if !credentials_match(expected, user, password) {
            state.limiter.record_failure(now);
            drop(state);
            log::warn!("remote login failed for user '{user}'");
            return Err(RegentError::Unauthorized);
        }
        if state.sessions.len() >= self.max_sessions {
            drop(state);
            log::warn!("remote login refused: {} sessions open", self.max_sessions);
            return Err(RegentError::SessionLimit(self.max_sessions));
        }

        let session = Session::new(state.scrollback.current());
        let start = SessionStart {
            session_id: session.id.clone(),
            prompt: state.prompt.clone(),
        };
        state.sessions.insert(session.id.clone(), session);
        drop(state);
        log::info!("remote session {} opened for '{user}'", start.session_id);
        Ok(start)
    }

    pub fn has_events(&self, id: &str) -> Result<bool> {
        let state = self.lock();
        let session = state
            .sessions
            .get(id)
            .ok_or_else(|| RegentError::SessionNotFound(id.to_string()))?;
        Ok(state.has_events(session))
    }

    /// Lines the session has not seen yet. Never blocks.
    pub fn poll_events(&self, id: &str) -> Result<EventBatch> {
        self.lock().take_events(id, Instant::now())
    }

    /// Block until the session has events, `timeout` passes, or the session
    /// ends, then poll. `timeout` is capped at the configured long-poll limit.
    pub fn wait_for_events(&self, id: &str, timeout: Duration) -> Result<EventBatch> {
        let timeout = timeout.min(self.max_long_poll);
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegentError::SessionNotFound(id.to_string()))?;
        session.touch(Instant::now());
        session.waiting += 1;
        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| {
                if self.shut_down.load(Ordering::SeqCst) {
                    return false;
                }
                match s.sessions.get(id) {
                    Some(session) => !s.has_events(session),
                    None => false,
                }
            })
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = state.sessions.get_mut(id) {
            session.waiting = session.waiting.saturating_sub(1);
        }
        state.take_events(id, Instant::now())
    }

    /// Echo `text` into the scrollback and queue it for the console thread.
    pub fn submit_command(&self, id: &str, text: &str) -> Result<()> {
        self.sweep_expired();
        let mut state = self.lock();
        let Some(session) = state.sessions.get_mut(id) else {
            drop(state);
            log::debug!("dropping command from unknown session {id}");
            return Err(RegentError::SessionNotFound(id.to_string()));
        };
        session.touch(Instant::now());
        let echo = format!("{}{text}", state.prompt);
        state.scrollback.push(&echo, OutputLevel::Normal);
        drop(state);
        self.changed.notify_all();

        if !self.input.push(text.to_string()) {
            return Err(RegentError::Closed);
        }
        Ok(())
    }

    /// End a session. Unknown ids are ignored.
    pub fn close_session(&self, id: &str) {
        let removed = self.lock().sessions.remove(id).is_some();
        if removed {
            self.notify_closed(&[id.to_string()], CloseReason::Closed);
        }
        self.sweep_expired();
    }

    /// Remove idle sessions. Returns their ids.
    pub fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = {
            let mut state = self.lock();
            let ids: Vec<String> = state
                .sessions
                .values()
                .filter(|s| s.is_expired(now, self.idle_timeout))
                .map(|s| s.id.clone())
                .collect();
            for id in &ids {
                state.sessions.remove(id);
            }
            ids
        };
        self.notify_closed(&expired, CloseReason::Expired);
        expired
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop the console: the console loop's `read_line` returns `None` and
    /// every session ends.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.input.close();
        let ids: Vec<String> = self.lock().sessions.drain().map(|(id, _)| id).collect();
        self.changed.notify_all();
        self.notify_closed(&ids, CloseReason::Shutdown);
        log::info!("remote console shut down");
    }
}

impl ConsoleOutput for RemoteConsole {
    fn output(&self, text: &str, level: OutputLevel) {
        self.lock().scrollback.push_text(text, level);
        self.changed.notify_all();
        if self.echo_to_stdout {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{text}");
        }
    }
}

impl Console for RemoteConsole {
    fn read_line(&self, prompt: &str) -> Option<String> {
        {
            let mut state = self.lock();
            if state.prompt != prompt {
                state.prompt = prompt.to_string();
            }
        }
        self.input.pop()
    }
}

/// Run [`RemoteConsole::sweep_expired`] periodically until the console shuts
/// down or the thread is aborted.
pub fn spawn_sweeper(console: Arc<RemoteConsole>, watchdog: &Watchdog) -> io::Result<JoinHandle<()>> {
    watchdog.spawn("remote-sweeper", move |worker| {
        while !worker.should_stop() && !console.is_shut_down() {
            worker.heartbeat();
            console.sweep_expired();
            std::thread::sleep(SWEEP_INTERVAL);
        }
    })
}
