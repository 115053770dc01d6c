//! Fixed-window notification rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Admits at most one event per key per window, on monotonic time.
pub struct RateLimiter {
    window: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Record an event for `key`; returns whether it should be delivered.
    pub fn event(&self, key: &str) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let now = Instant::now();
        match last.get(key) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }
}
