//! Registry of named background threads, listed by `show threads` and
//! stoppable with `threads abort`.
//!
//! Abort is cooperative: the worker's [`WorkerHandle::should_stop`] starts
//! returning true and the thread is expected to return soon after.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Tracked {
    name: String,
    started: Instant,
    abort: Arc<AtomicBool>,
    last_beat: Arc<Mutex<Instant>>,
}

/// Snapshot of one tracked thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
    pub running_for: Duration,
    pub since_heartbeat: Duration,
    pub abort_requested: bool,
}

/// Passed to every watched worker.
pub struct WorkerHandle {
    id: u64,
    abort: Arc<AtomicBool>,
    last_beat: Arc<Mutex<Instant>>,
}

impl WorkerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once `threads abort` (or [`Watchdog::abort`]) targeted this
    /// worker.
    pub fn should_stop(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Record that the worker is still making progress.
    pub fn heartbeat(&self) {
        *self
            .last_beat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

/// Removes the worker's entry when its closure returns or panics.
struct Unregister {
    threads: Arc<Mutex<BTreeMap<u64, Tracked>>>,
    id: u64,
}

impl Drop for Unregister {
    fn drop(&mut self) {
        let removed = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        if let Some(t) = removed {
            log::debug!("thread {} ({}) finished", self.id, t.name);
        }
    }
}

#[derive(Default)]
pub struct Watchdog {
    threads: Arc<Mutex<BTreeMap<u64, Tracked>>>,
    next_id: AtomicU64,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named thread running `f`. The thread is tracked until `f`
    /// returns.
    pub fn spawn<F, T>(&self, name: &str, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce(WorkerHandle) -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let abort = Arc::new(AtomicBool::new(false));
        let now = Instant::now();
        let last_beat = Arc::new(Mutex::new(now));
        self.lock().insert(
            id,
            Tracked {
                name: name.to_string(),
                started: now,
                abort: Arc::clone(&abort),
                last_beat: Arc::clone(&last_beat),
            },
        );

        let handle = WorkerHandle {
            id,
            abort,
            last_beat,
        };
        let guard = Unregister {
            threads: Arc::clone(&self.threads),
            id,
        };
        // On spawn failure the closure, and with it the guard, is dropped.
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = guard;
            f(handle)
        })?;
        log::debug!("spawned thread {id} ({name})");
        Ok(spawned)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Tracked>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask thread `id` to stop. False if no such thread is tracked.
    pub fn abort(&self, id: u64) -> bool {
        match self.lock().get(&id) {
            Some(t) => {
                t.abort.store(true, Ordering::SeqCst);
                log::info!("abort requested for thread {id} ({})", t.name);
                true
            },
            None => false,
        }
    }

    /// Ask every tracked thread to stop.
    pub fn abort_all(&self) {
        for t in self.lock().values() {
            t.abort.store(true, Ordering::SeqCst);
        }
    }

    /// Tracked threads ordered by id.
    pub fn list(&self) -> Vec<ThreadInfo> {
        let now = Instant::now();
        self.lock()
            .iter()
            .map(|(id, t)| ThreadInfo {
                id: *id,
                name: t.name.clone(),
                running_for: now.duration_since(t.started),
                since_heartbeat: now.duration_since(
                    *t.last_beat.lock().unwrap_or_else(PoisonError::into_inner),
                ),
                abort_requested: t.abort.load(Ordering::SeqCst),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn tracks_until_worker_returns() {
        let dog = Watchdog::new();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = dog
            .spawn("waiter", move |_| {
                let _ = rx.recv();
            })
            .unwrap();
        let list = dog.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "waiter");
        assert!(!list[0].abort_requested);
        tx.send(()).unwrap();
        handle.join().unwrap();
        assert!(dog.is_empty());
    }

    #[test]
    fn abort_is_cooperative() {
        let dog = Watchdog::new();
        let handle = dog
            .spawn("spinner", |worker| {
                let mut beats = 0u32;
                while !worker.should_stop() {
                    worker.heartbeat();
                    beats += 1;
                    thread::sleep(Duration::from_millis(1));
                }
                beats
            })
            .unwrap();
        let id = dog.list()[0].id;
        assert!(dog.abort(id));
        handle.join().unwrap();
        assert!(dog.is_empty());
        assert!(!dog.abort(id));
    }

    #[test]
    fn panicking_worker_is_unregistered() {
        let dog = Watchdog::new();
        let handle = dog.spawn("boom", |_| panic!("worker failed")).unwrap();
        assert!(handle.join().is_err());
        assert!(dog.is_empty());
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let dog = Watchdog::new();
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            let rx = Arc::clone(&rx);
            handles.push(
                dog.spawn(name, move |_| {
                    let _ = rx.lock().unwrap().recv();
                })
                .unwrap(),
            );
        }
        let ids: Vec<u64> = dog.list().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        dog.abort_all();
        assert!(dog.list().iter().all(|t| t.abort_requested));
        for _ in 0..3 {
            tx.send(()).unwrap();
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
