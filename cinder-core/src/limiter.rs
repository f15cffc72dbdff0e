//! Sliding-window rate limiter.
//!
//! Admission guard for outbound messages. Owned by the session engine and
//! consulted only on send attempts, after the state guard has passed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default admission budget: 5 messages per second.
pub const DEFAULT_MAX_CALLS: usize = 5;
/// Default window length.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Bounded-window call admission.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_calls` per `period`.
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls,
            period,
            calls: VecDeque::with_capacity(max_calls),
        }
    }

    /// Admit or reject a call at the current instant.
    ///
    /// Admission records the call; rejection has no side effect beyond
    /// pruning timestamps that have left the window.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.calls.front() {
            if now.duration_since(front) >= self.period {
                self.calls.pop_front();
            } else {
                break;
            }
        }

        if self.calls.len() >= self.max_calls {
            return false;
        }
        self.calls.push_back(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_PERIOD)
    }
}
