//! Bounded exponential backoff for records that are not visible yet.

use std::time::Duration;
use tokio::time::Instant;

/// Backoff settings for the not-yet-visible retry loop.
///
/// The n-th retry waits `initial_delay * multiplier^n`. The sum of all waits
/// never exceeds `max_elapsed`: the last wait is shortened to whatever budget
/// remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Growth factor between consecutive waits
    pub multiplier: u32,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Ceiling on the total time spent waiting
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_retries: 3,
            max_elapsed: Duration::from_secs(6),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom settings.
    pub fn new(
        initial_delay: Duration,
        multiplier: u32,
        max_retries: u32,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_delay,
            multiplier: multiplier.max(1),
            max_retries,
            max_elapsed,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Uncapped wait before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.min(20));
        self.initial_delay.saturating_mul(factor)
    }

    /// Begin a retry chain at the current instant.
    ///
    /// A `max_elapsed` too large to add to the current instant means the
    /// chain has no deadline and only `max_retries` bounds it.
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempts: 0,
            deadline: Instant::now().checked_add(self.max_elapsed),
        }
    }
}

/// Progress of one retry chain. Discarded once the chain settles.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    deadline: Option<Instant>,
}

impl RetryState {
    /// Count one more attempt against the chain.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Attempts made so far, the initial one included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Instant after which no further waiting is allowed, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// How long to wait before the next attempt, or `None` when the chain is
    /// exhausted (out of retries or out of budget).
    pub fn next_wait(&self) -> Option<Duration> {
        let retries_done = self.attempts.saturating_sub(1);
        if retries_done >= self.policy.max_retries {
            return None;
        }

        let remaining = match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        };
        if remaining.is_zero() {
            return None;
        }

        Some(self.policy.delay_for_retry(retries_done).min(remaining))
    }
}
