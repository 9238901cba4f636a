// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use inflight::ManagerOptions;
use rebound::RetryPolicy;
use tripwire::CircuitBreakerOptions;

pub(crate) const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration of an [`Orchestrator`][crate::Orchestrator].
///
/// The defaults suit a slow, rate-limited remote generator: the breaker and retry policy
/// use their `external_dependency` presets and each attempt may take up to two minutes.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub(crate) series: Vec<String>,
    pub(crate) manager: ManagerOptions,
    pub(crate) breaker: CircuitBreakerOptions,
    pub(crate) retry: RetryPolicy,
    pub(crate) attempt_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            series: Vec::new(),
            manager: ManagerOptions::default(),
            breaker: CircuitBreakerOptions::external_dependency().name("generator"),
            retry: RetryPolicy::external_dependency(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl OrchestratorOptions {
    /// Restricts requests to the given series. Names are compared lowercase.
    ///
    /// An empty list, the default, accepts every well-formed series.
    #[must_use]
    pub fn series<I, S>(mut self, series: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.series = series
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        self.series.sort();
        self.series.dedup();
        self
    }

    /// Sets the eviction limits of the context manager.
    #[must_use]
    pub const fn manager(mut self, manager: ManagerOptions) -> Self {
        self.manager = manager;
        self
    }

    /// Sets the circuit breaker guarding the generator.
    #[must_use]
    pub fn breaker(mut self, breaker: CircuitBreakerOptions) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the retry budget and backoff of each generation.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the deadline of each generation attempt.
    #[must_use]
    pub const fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// The accepted series, sorted. Empty means any.
    #[must_use]
    pub fn get_series(&self) -> &[String] {
        &self.series
    }

    /// The eviction limits.
    #[must_use]
    pub const fn get_manager(&self) -> ManagerOptions {
        self.manager
    }

    /// The breaker configuration.
    #[must_use]
    pub const fn get_breaker(&self) -> &CircuitBreakerOptions {
        &self.breaker
    }

    /// The retry policy.
    #[must_use]
    pub const fn get_retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The per-attempt deadline.
    #[must_use]
    pub const fn get_attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}
