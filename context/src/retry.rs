//! Bounded fixed-delay retry.
//!
//! The delays come from a `tokio_retry` strategy, one
//! [`FixedInterval`] per policy, cut to the attempt budget.

use std::iter::Take;
use std::time::Duration;

use config::RetryConfig;
use tokio_retry::strategy::FixedInterval;

/// How often and how far apart an operation may be attempted.
///
/// `max_attempts` counts every invocation, the first one included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// The delays slept between attempts, one fewer than `max_attempts`.
    pub fn strategy(&self) -> Take<FixedInterval> {
        let retries = usize::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(usize::MAX);
        FixedInterval::new(self.delay).take(retries)
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            delays: self.strategy(),
            attempts: 0,
        }
    }

    /// Worst-case time spent sleeping between attempts.
    pub fn total_delay(&self) -> Duration {
        self.strategy().sum()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    Retry(Duration),
    Exhausted,
}

/// Attempt counter for one retried operation, drawing its delays from the
/// policy's strategy.
pub struct RetryState {
    policy: RetryPolicy,
    delays: Take<FixedInterval>,
    attempts: u32,
}

impl std::fmt::Debug for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryState")
            .field("policy", &self.policy)
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl RetryState {
    /// Record a failed attempt and decide what happens next.
    pub fn next(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        match self.delays.next() {
            Some(delay) => RetryDecision::Retry(delay),
            None => RetryDecision::Exhausted,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
