//! Sliding-window rate limiter keyed by trigger id, used by the webhook
//! executor to bound inbound request rate per trigger.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Window {
    /// Timestamps of requests still inside the current window, oldest first.
    hits: Vec<Instant>,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `trigger_id` and report whether it's allowed
    /// under `limit` requests per `window`.
    pub fn check(&self, trigger_id: &str, limit: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let entry = windows.entry(trigger_id.to_owned()).or_insert_with(|| Window { hits: Vec::new() });
        entry.hits.retain(|t| now.duration_since(*t) <= window);
        if entry.hits.len() as u32 >= limit {
            return false;
        }
        entry.hits.push(now);
        true
    }
}
