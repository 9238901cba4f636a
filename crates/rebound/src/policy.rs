// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::rnd::Rnd;

/// Share of the computed delay used as jitter in each direction.
const JITTER_RATIO: f64 = 0.25;

/// Retry budget and backoff schedule.
///
/// The policy holds no mutable state; every delay is a function of the attempt number
/// and a fresh random draw.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    rnd: Rnd,
}

impl Default for RetryPolicy {
    /// Same as [`RetryPolicy::generic`].
    fn default() -> Self {
        Self::generic()
    }
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// At least one attempt is always made, and backoff factors below one (or NaN) are
    /// treated as one so that delays never shrink between attempts.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            rnd: Rnd::default(),
        }
    }

    /// Three attempts, one second base delay, 30 second cap, doubling.
    #[must_use]
    pub fn generic() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }

    /// Three attempts, two second base delay, 60 second cap, doubling.
    ///
    /// Suited to rate-limited remote APIs.
    #[must_use]
    pub fn external_dependency() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(60), 2.0)
    }

    /// Maximum number of attempts, the first one included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry, before jitter.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound of the unjittered delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between consecutive delays.
    #[must_use]
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// The unjittered delay after failed attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * backoff_factor^(attempt - 1))`.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);

        secs_to_duration_saturating(secs).min(self.max_delay)
    }

    /// The delay to sleep after failed attempt `attempt` (1-based).
    ///
    /// Applies uniform jitter of ±25% to [`Self::base_delay_for`] and never returns less than
    /// half the base delay. If the random source fails, the unjittered delay is used.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        let floor = self.base_delay / 2;

        let Some(random) = self.rnd.next_f64() else {
            return delay;
        };

        let secs = delay.as_secs_f64();
        let jitter = secs * JITTER_RATIO * random.mul_add(2.0, -1.0);

        secs_to_duration_saturating(secs + jitter).max(floor)
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
