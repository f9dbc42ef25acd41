#[cfg(test)]
#[path = "rate_limiter_test.rs"]
mod tests;

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_WARNING_THRESHOLD: usize = 40;
const DEFAULT_MAX_REQUESTS: usize = 50;

/// Advice from [`RateLimiter::check_availability`]. When `can_proceed` is
/// false, `wait` is the time until the oldest request exits the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub can_proceed: bool,
    pub wait: Duration,
}

/// Tracks a rolling count of outbound requests against one logical API
/// surface. The limiter owns its timestamp list outright; all mutation
/// happens under its own mutex, so callers never need external locking.
pub struct RateLimiter {
    window: Duration,
    warning_threshold: usize,
    max_requests: usize,
    timestamps: Mutex<Vec<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> RateLimiter {
        return RateLimiter::new(
            DEFAULT_WINDOW,
            DEFAULT_WARNING_THRESHOLD,
            DEFAULT_MAX_REQUESTS,
        );
    }
}

impl RateLimiter {
    pub fn new(window: Duration, warning_threshold: usize, max_requests: usize) -> RateLimiter {
        return RateLimiter {
            window,
            warning_threshold,
            max_requests,
            timestamps: Mutex::new(vec![]),
        };
    }

    pub async fn record_request(&self) {
        let mut timestamps = self.timestamps.lock().await;
        Self::prune(&mut timestamps, self.window);
        timestamps.push(Instant::now());
    }

    pub async fn is_approaching_limit(&self) -> bool {
        let mut timestamps = self.timestamps.lock().await;
        Self::prune(&mut timestamps, self.window);
        return timestamps.len() >= self.warning_threshold;
    }

    pub async fn check_availability(&self) -> Availability {
        let mut timestamps = self.timestamps.lock().await;
        Self::prune(&mut timestamps, self.window);

        if timestamps.len() < self.max_requests {
            return Availability {
                can_proceed: true,
                wait: Duration::ZERO,
            };
        }

        // Entries are in insertion order, so the front is the oldest.
        let wait = match timestamps.first() {
            Some(oldest) => self.window.saturating_sub(oldest.elapsed()),
            None => Duration::ZERO,
        };

        return Availability {
            can_proceed: false,
            wait,
        };
    }

    fn prune(timestamps: &mut Vec<Instant>, window: Duration) {
        timestamps.retain(|timestamp| return timestamp.elapsed() < window);
    }
}
