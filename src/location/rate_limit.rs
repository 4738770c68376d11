//! Minimum-spacing guard for providers with a requests-per-second policy.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Nominatim usage policy: one request per second.
pub const NOMINATIM_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// A token bucket of size one. Share it (via `Arc`) between every resolver that
/// talks to the same provider; the lock is held across the wait, so callers
/// queue up and leave at least `min_interval` apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a call is allowed, then record it. Returns how long the caller waited.
    pub fn acquire(&self) -> Duration {
        let mut last_call = self.last_call.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let waited = match *last_call {
            Some(previous) => {
                let elapsed = previous.elapsed();
                if elapsed < self.min_interval {
                    let remaining = self.min_interval - elapsed;
                    thread::sleep(remaining);
                    remaining
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };

        *last_call = Some(Instant::now());
        waited
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(NOMINATIM_MIN_INTERVAL)
    }
}
