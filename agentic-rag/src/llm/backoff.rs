//! Bounded exponential backoff for rate-limited collaborators.
//!
//! Each wait is the previous one times `multiplier`. Once the next wait would
//! exceed `max_wait`, or `max_attempts` waits have been handed out, the
//! schedule ends and the caller reports a terminal error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Caller-configurable retry schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// First wait after a rate-limit signal
    pub initial_wait: Duration,
    /// Growth factor between consecutive waits (must be > 1.0)
    pub multiplier: f64,
    /// Ceiling; a wait above this ends the schedule
    pub max_wait: Duration,
    /// Hard cap on the number of waits
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(1),
            multiplier: 2.0,
            max_wait: Duration::from_secs(32),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_wait.max(Duration::from_millis(1)),
            multiplier: if self.multiplier > 1.0 { self.multiplier } else { 2.0 },
            max_wait: self.max_wait,
            max_attempts: self.max_attempts,
            attempts: 0,
        }
    }

    /// Longest a caller can spend when every attempt runs for `per_request`
    /// and is rate limited: one request per wait plus the first, and every wait.
    pub fn worst_case(&self, per_request: Duration) -> Duration {
        let mut backoff = self.backoff();
        let waits: Vec<Duration> = std::iter::from_fn(|| backoff.next_delay()).collect();
        per_request * (waits.len() as u32 + 1) + waits.into_iter().sum::<Duration>()
    }

    /// A schedule that never waits; useful in tests.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Iterator-like state for one retry sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    max_wait: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    /// The next wait, or `None` once the schedule is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts || self.next > self.max_wait {
            return None;
        }
        let delay = self.next;
        self.attempts += 1;
        self.next = delay.mul_f64(self.multiplier);
        Some(delay)
    }

    /// Number of waits handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles_until_ceiling() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_attempt_cap_applies_before_ceiling() {
        let policy = RetryPolicy {
            initial_wait: Duration::from_millis(10),
            multiplier: 1.5,
            max_wait: Duration::from_secs(60),
            max_attempts: 3,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_degenerate_multiplier_still_terminates() {
        let policy = RetryPolicy {
            initial_wait: Duration::from_secs(1),
            multiplier: 1.0,
            max_wait: Duration::from_secs(4),
            max_attempts: 100,
        };
        let mut backoff = policy.backoff();
        let count = std::iter::from_fn(|| backoff.next_delay()).count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_worst_case_covers_every_request_and_wait() {
        let policy = RetryPolicy::default();
        // 1+2+4+8+16+32 of waits, then 7 requests
        assert_eq!(
            policy.worst_case(Duration::from_secs(120)),
            Duration::from_secs(63 + 7 * 120)
        );
        assert_eq!(
            RetryPolicy::none().worst_case(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_none_policy_never_waits() {
        assert_eq!(RetryPolicy::none().backoff().next_delay(), None);
    }
}
