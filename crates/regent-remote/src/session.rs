//! Remote operator sessions.

use std::fmt;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client logged out.
    Closed,
    /// Idle longer than the configured timeout.
    Expired,
    /// The remote console shut down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloseReason::Closed => "closed",
            CloseReason::Expired => "expired",
            CloseReason::Shutdown => "shutdown",
        })
    }
}

/// Told about every session that ends, whatever the reason.
pub trait SessionObserver: Send + Sync {
    fn session_closed(&self, id: &str, reason: CloseReason);
}

/// One authenticated operator.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Number of the newest scrollback line already delivered.
    pub last_line_seen: u64,
    pub last_activity: Instant,
    /// No poll has happened yet; the next one starts with the prompt.
    pub fresh: bool,
    /// Long-polls currently blocked on this session. Never idle while
    /// nonzero.
    pub waiting: usize,
}

impl Session {
    pub fn new(last_line_seen: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            last_line_seen,
            last_activity: Instant::now(),
            fresh: true,
            waiting: 0,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.waiting == 0
            && now.saturating_duration_since(self.last_activity) > idle_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Session::new(0);
        let b = Session::new(0);
        assert_ne!(a.id, b.id);
        assert!(a.fresh);
    }

    #[test]
    fn expiry_follows_activity() {
        let mut s = Session::new(5);
        let now = Instant::now();
        let timeout = Duration::from_secs(300);
        assert!(!s.is_expired(now, timeout));
        assert!(s.is_expired(now + Duration::from_secs(301), timeout));
        s.touch(now + Duration::from_secs(200));
        assert!(!s.is_expired(now + Duration::from_secs(301), timeout));
    }

    #[test]
    fn waiting_session_never_expires() {
        let mut s = Session::new(0);
        let now = Instant::now();
        let timeout = Duration::from_secs(1);
        s.waiting = 1;
        assert!(!s.is_expired(now + Duration::from_secs(10), timeout));
        s.waiting = 0;
        assert!(s.is_expired(now + Duration::from_secs(10), timeout));
    }

    #[test]
    fn reason_display() {
        assert_eq!(CloseReason::Expired.to_string(), "expired");
    }
}
