//! Credential checks and login rate limiting.

use std::time::{Duration, Instant};

use regent_types::config::Credentials;

/// Failed logins allowed inside one window before logins are refused.
pub const MAX_LOGIN_FAILURES: u32 = 3;

/// Length of the failure-counting window.
pub const LOGIN_WINDOW: Duration = Duration::from_secs(60);

/// Compare two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Check a login against the configured credentials. Both halves are always
/// compared.
pub fn credentials_match(expected: &Credentials, user: &str, password: &str) -> bool {
    let user_ok = constant_time_eq(expected.user.as_bytes(), user.as_bytes());
    let password_ok = constant_time_eq(expected.password.as_bytes(), password.as_bytes());
    user_ok & password_ok
}

/// Counts failed logins in a fixed window.
#[derive(Debug)]
pub struct LoginLimiter {
    failures: u32,
    window_start: Instant,
    max_failures: u32,
    window: Duration,
}

impl LoginLimiter {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            failures: 0,
            window_start: Instant::now(),
            max_failures,
            window,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) > self.window {
            self.failures = 0;
            self.window_start = now;
        }
    }

    pub fn is_limited(&mut self, now: Instant) -> bool {
        self.roll(now);
        self.failures >= self.max_failures
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.roll(now);
        self.failures += 1;
    }
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(MAX_LOGIN_FAILURES, LOGIN_WINDOW)
    }
}
