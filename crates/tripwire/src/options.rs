// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
const EXTERNAL_RESET_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Configuration of a [`CircuitBreaker`][crate::CircuitBreaker].
///
/// Thresholds of zero are treated as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerOptions {
    pub(crate) name: Cow<'static, str>,
    pub(crate) failure_threshold: u32,
    pub(crate) reset_timeout: Duration,
    pub(crate) success_threshold: u32,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("default"),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerOptions {
    /// Options tuned for a remote API: five failures open the circuit and a probe is attempted after 30 seconds.
    #[must_use]
    pub fn external_dependency() -> Self {
        Self::default().reset_timeout(EXTERNAL_RESET_TIMEOUT)
    }

    /// Sets the name reported in logs and metrics.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the number of consecutive failures that opens the circuit.
    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets how long the circuit stays open after the last failure before a probe is admitted.
    #[must_use]
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Sets the number of consecutive successful probes that closes a half-open circuit.
    #[must_use]
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// The configured name.
    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// The configured failure threshold.
    #[must_use]
    pub fn get_failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// The configured reset timeout.
    #[must_use]
    pub fn get_reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// The configured success threshold.
    #[must_use]
    pub fn get_success_threshold(&self) -> u32 {
        self.success_threshold
    }
}
