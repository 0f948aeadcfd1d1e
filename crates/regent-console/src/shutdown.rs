//! Orderly shutdown signal.
//!
//! `quit` and `shutdown` never exit the process from inside a handler. They
//! request shutdown here; registered hooks stop listeners and unblock
//! readers, and background loops poll [`Shutdown::is_requested`] or wait on
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

type Hook = Box<dyn FnOnce() + Send>;

/// Process-wide stop flag with stop hooks.
pub struct Shutdown {
    requested: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
    reason: Mutex<Option<String>>,
    wake: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
            reason: Mutex::new(None),
            wake: Condvar::new(),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Why shutdown was requested, once it has been.
    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `hook` when shutdown is requested. Runs immediately if it already
    /// has been.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_requested() {
            hook();
            return;
        }
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Request shutdown. Only the first call runs the hooks.
    pub fn request(&self, reason: &str) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("shutdown requested: {reason}");
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
        self.wake.notify_all();

        let hooks: Vec<Hook> =
            std::mem::take(&mut *self.hooks.lock().unwrap_or_else(PoisonError::into_inner));
        for hook in hooks {
            hook();
        }
    }

    /// Block until shutdown is requested or `timeout` passes. Returns whether
    /// shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |_| !self.is_requested())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_requested()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;

    #[test]
    fn hooks_run_once() {
        let shutdown = Shutdown::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        shutdown.on_shutdown(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!shutdown.is_requested());
        shutdown.request("test");
        shutdown.request("again");
        assert!(shutdown.is_requested());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(shutdown.reason().as_deref(), Some("test"));
    }

    #[test]
    fn late_hook_runs_immediately() {
        let shutdown = Shutdown::new();
        shutdown.request("done");
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        shutdown.on_shutdown(move || r.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_times_out_without_request() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_wakes_on_request() {
        let shutdown = Arc::new(Shutdown::new());
        let s = Arc::clone(&shutdown);
        let waiter = thread::spawn(move || s.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        shutdown.request("wake");
        assert!(waiter.join().unwrap());
    }
}
