// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::future::Future;
use std::time::Duration;

use rebound::{Retry, RetryError, RetryPolicy};
use tally::MetricsCollector;
use tick::{Clock, FutureExt as _};
use tripwire::{BreakerError, CircuitBreaker};

use crate::GenerationError;

/// Why a resilient call gave up.
pub type CallError = RetryError<BreakerError<GenerationError>>;

/// Runs calls to an external dependency through a deadline, a circuit breaker and retries.
///
/// Every attempt gets its own deadline and is admitted by the breaker; failed attempts are
/// retried according to their [`Recovery`][recoverable::Recovery] classification. A call
/// rejected by an open breaker is not retried.
///
/// Each attempt is counted as an external request in the [`MetricsCollector`], each retry
/// under the call's name, and the breaker's state is mirrored after every attempt.
#[derive(Clone)]
pub struct ResilientCall {
    name: Cow<'static, str>,
    breaker: CircuitBreaker,
    retry: Retry,
    clock: Clock,
    attempt_timeout: Duration,
    collector: MetricsCollector,
}

impl Debug for ResilientCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientCall")
            .field("name", &self.name)
            .field("breaker", &self.breaker.options().get_name())
            .field("retry", self.retry.policy())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl ResilientCall {
    /// Creates a call named `name`, reported in logs and retry metrics.
    #[must_use]
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        breaker: CircuitBreaker,
        policy: RetryPolicy,
        collector: MetricsCollector,
        clock: Clock,
    ) -> Self {
        let name = name.into();
        let retry_collector = collector.clone();
        let retry = Retry::new(policy, clock.clone())
            .name(name.clone())
            .on_retry(move |attempt| retry_collector.record_retry(attempt.name()));

        Self {
            name,
            breaker,
            retry,
            clock,
            attempt_timeout: crate::options::DEFAULT_ATTEMPT_TIMEOUT,
            collector,
        }
    }

    /// Sets the deadline of each individual attempt.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// The name of this call.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker guarding the dependency.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `operation`, which receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] when an attempt fails permanently or the breaker rejects
    /// it, and [`RetryError::Exhausted`] when every attempt fails with a retryable error.
    pub async fn call<F, Fut, T>(&self, mut operation: F) -> Result<T, CallError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        self.retry
            .retry_recoverable(|attempt| {
                let pending = operation(attempt);
                self.attempt(pending)
            })
            .await
    }

    /// Runs `operation` like [`call`](Self::call) and returns `fallback` if it fails.
    ///
    /// For steps the result can do without: an open breaker or a failing dependency degrades
    /// the outcome instead of failing it.
    pub async fn call_or_degrade<F, Fut, T>(&self, operation: F, fallback: T) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(error) => {
                tracing::event!(
                    name: "dalledress.degraded",
                    tracing::Level::WARN,
                    call.name = %self.name,
                    call.attempts = error.attempts(),
                    error = %error,
                );
                fallback
            }
        }
    }

    async fn attempt<Fut, T>(&self, pending: Fut) -> Result<T, BreakerError<GenerationError>>
    where
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let deadline = self.attempt_timeout;
        let result = self
            .breaker
            .execute(|| async move {
                pending
                    .timeout(&self.clock, deadline)
                    .await
                    .unwrap_or_else(|_elapsed| Err(GenerationError::Timeout(deadline)))
            })
            .await;

        match &result {
            Ok(_) => self.collector.record_external_request(true, false),
            Err(error) => {
                if let Some(inner) = error.inner() {
                    self.collector.record_external_request(false, inner.is_timeout());
                }
            }
        }
        self.collector.update_circuit_breaker(&self.breaker.metrics());

        result
    }
}
