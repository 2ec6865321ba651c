//! Bounded exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff configuration for polling and retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after every attempt.
    pub multiplier: u32,

    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Total time budget, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            multiplier: 2,
            max_delay_ms: 30_000,
            max_wait_ms: 180_000,
        }
    }
}

impl BackoffPolicy {
    /// Set the total wait budget.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-attempt delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Start a fresh backoff sequence.
    pub fn start(&self) -> Backoff {
        Backoff {
            next: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier.max(1),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
        }
    }
}

/// Iterator over successive delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl Backoff {
    /// Return the next delay and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.max_delay);
        self.next = self.next.saturating_mul(self.multiplier).min(self.max_delay);
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}
