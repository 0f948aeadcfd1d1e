//! Command lines submitted by remote sessions, waiting for the console
//! thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct QueueState {
    lines: VecDeque<String>,
    closed: bool,
}

/// Blocking FIFO of submitted lines. Closing it releases every waiter.
#[derive(Default)]
pub struct InputQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a line. False once the queue is closed.
    pub fn push(&self, line: String) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.lines.push_back(line);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Block until a line is available. `None` once closed.
    pub fn pop(&self) -> Option<String> {
        let state = self.lock();
        let mut state = self
            .ready
            .wait_while(state, |s| s.lines.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.lines.pop_front()
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.lines.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.lines.pop_front()
    }

    /// Close the queue and drop anything still pending.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.lines.clear();
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }
}
