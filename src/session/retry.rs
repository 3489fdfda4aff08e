//! Reconnect delay computation.
//!
//! [`BackoffPolicy`] is the pure delay function and [`Retry`] pairs it with the
//! consecutive-failure counter. [`Retry`] implements [`backoff::backoff::Backoff`],
//! so the connection driver treats it like any other backoff strategy: `reset` on a
//! successful open, `next_backoff` after a failure, `None` once retries run out.

use std::time::Duration;

use backoff::backoff::Backoff;

/// Growth factor applied per consecutive failure.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Deterministic exponential backoff: `min(ceiling, base * 1.5^attempt)`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay returned for `attempt == 0`
    pub base: Duration,
    /// Upper bound on any returned delay
    pub ceiling: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// Delay before reconnecting after `attempt` consecutive failures (0-indexed).
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Delays are far below the range where nanosecond f64 math loses meaning"
    )]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base.as_nanos() as f64 * BACKOFF_MULTIPLIER.powi(exponent);

        if scaled >= self.ceiling.as_nanos() as f64 {
            return self.ceiling;
        }

        Duration::from_nanos(scaled.round() as u64)
    }
}

/// Consecutive-failure counter bounded by `max_retries`.
///
/// Invariant: `0 <= attempts() <= max_retries()`.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: BackoffPolicy,
    max_retries: u32,
    attempts: u32,
}

impl Retry {
    #[must_use]
    pub const fn new(policy: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            policy,
            max_retries,
            attempts: 0,
        }
    }

    /// Number of reconnect attempts scheduled since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }
}

impl Backoff for Retry {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let delay = self.policy.delay(self.attempts);
        self.attempts += 1;
        Some(delay)
    }
}
