//! Reactor timers and the monotonic clock they run on.

use std::sync::OnceLock;
use std::time::Instant;

use crate::value::Value;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds on a monotonic clock with an arbitrary origin.
pub fn now_ms() -> i64 {
    epoch().elapsed().as_millis() as i64
}

/// Nanoseconds on the same clock as [`now_ms`].
pub fn now_ns() -> i64 {
    epoch().elapsed().as_nanos() as i64
}

#[derive(Debug, Clone)]
pub struct Timer {
    pub id: i64,
    /// Next deadline, in [`now_ms`] time.
    pub due: i64,
    /// Repeat interval in milliseconds; 0 for a one-shot timer.
    pub interval: i64,
    pub callback: Value,
    pub cancelled: bool,
}

impl Timer {
    pub fn is_due(&self, now: i64) -> bool {
        !self.cancelled && now >= self.due
    }

    /// Called after the timer fired at `now`. A repeating timer moves
    /// forward by whole intervals until its deadline is in the future; a
    /// one-shot timer is cancelled.
    pub fn rearm(&mut self, now: i64) {
        if self.interval > 0 {
            let missed = (now - self.due) / self.interval;
            self.due += self.interval * (missed + 1);
        } else {
            self.cancelled = true;
        }
    }
}
