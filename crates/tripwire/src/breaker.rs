// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::sync::Arc;

use jiff::Timestamp;
use tick::Clock;

use crate::engine::{Engine, Transition};
use crate::{BreakerError, BreakerMetrics, CircuitBreakerOptions, CircuitState};

/// Guards calls to an unreliable dependency.
///
/// Clones share the same circuit.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    options: CircuitBreakerOptions,
    clock: Clock,
    engine: tokio::sync::Mutex<Engine>,
    // Mirror of the engine published after every update, for readers that must not wait on a call.
    published: parking_lot::Mutex<BreakerMetrics>,
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker.
    #[must_use]
    pub fn new(options: CircuitBreakerOptions, clock: Clock) -> Self {
        let engine = Engine::default();
        let published = parking_lot::Mutex::new(engine.metrics(&options));

        Self {
            shared: Arc::new(Shared {
                options,
                clock,
                engine: tokio::sync::Mutex::new(engine),
                published,
            }),
        }
    }

    /// Runs `work` if the circuit admits it and records the outcome.
    ///
    /// Calls are serialized: the lock taken here is held while `work` runs, so `work`
    /// must not call back into this breaker. A call dropped before `work` completes counts
    /// as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without invoking `work` when the circuit is open, and
    /// [`BreakerError::Inner`] when `work` itself fails.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let shared = &*self.shared;
        let mut call = Call {
            breaker: self,
            engine: shared.engine.lock().await,
            settled: false,
        };

        let (admitted, transition) = call.engine.admit(shared.clock.instant(), &shared.options);
        self.report(transition);

        if !admitted {
            call.settled = true;
            tracing::event!(
                name: "tripwire.rejected",
                tracing::Level::DEBUG,
                breaker.name = %shared.options.name,
            );
            self.publish(&call.engine);
            return Err(BreakerError::Open);
        }

        let result = work().await;
        call.settled = true;

        let now: Timestamp = shared.clock.system_time_as();
        let transition = match &result {
            Ok(_) => call.engine.on_success(now, &shared.options),
            Err(_) => call.engine.on_failure(shared.clock.instant(), now, &shared.options),
        };
        self.report(transition);
        self.publish(&call.engine);

        result.map_err(BreakerError::Inner)
    }

    /// The state as of the last call.
    ///
    /// An open circuit whose reset timeout elapsed still reads as open until the next call arrives.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.shared.published.lock().state
    }

    /// A snapshot of the counters and configuration.
    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        self.shared.published.lock().clone()
    }

    /// The options this breaker was created with.
    #[must_use]
    pub fn options(&self) -> &CircuitBreakerOptions {
        &self.shared.options
    }

    /// Forces the circuit closed and clears its failure and probe counters.
    ///
    /// Waits for an in-flight call to finish first.
    pub async fn reset(&self) {
        let mut engine = self.shared.engine.lock().await;
        if engine.reset() {
            tracing::event!(
                name: "tripwire.reset",
                tracing::Level::INFO,
                breaker.name = %self.shared.options.name,
            );
        }
        self.publish(&engine);
    }

    fn publish(&self, engine: &Engine) {
        *self.shared.published.lock() = engine.metrics(&self.shared.options);
    }

    fn report(&self, transition: Option<Transition>) {
        let name = &self.shared.options.name;

        match transition {
            None => {}
            Some(Transition::Opened { failures }) => tracing::event!(
                name: "tripwire.opened",
                tracing::Level::WARN,
                breaker.name = %name,
                breaker.failures = failures,
                breaker.reset_timeout_ms = u64::try_from(self.shared.options.reset_timeout.as_millis()).unwrap_or(u64::MAX),
            ),
            Some(Transition::Reopened) => tracing::event!(
                name: "tripwire.reopened",
                tracing::Level::WARN,
                breaker.name = %name,
            ),
            Some(Transition::HalfOpened { open_for }) => tracing::event!(
                name: "tripwire.half_opened",
                tracing::Level::INFO,
                breaker.name = %name,
                breaker.open_for_ms = u64::try_from(open_for.as_millis()).unwrap_or(u64::MAX),
            ),
            Some(Transition::Closed { probes }) => tracing::event!(
                name: "tripwire.closed",
                tracing::Level::INFO,
                breaker.name = %name,
                breaker.probes = probes,
            ),
        }
    }
}

/// An admitted call holding the engine. Dropped unsettled, it records a failure.
struct Call<'a> {
    breaker: &'a CircuitBreaker,
    engine: tokio::sync::MutexGuard<'a, Engine>,
    settled: bool,
}

impl Drop for Call<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let shared = &*self.breaker.shared;
        tracing::event!(
            name: "tripwire.cancelled",
            tracing::Level::WARN,
            breaker.name = %shared.options.name,
        );
        let transition = self
            .engine
            .on_failure(shared.clock.instant(), shared.clock.system_time_as(), &shared.options);
        self.breaker.report(transition);
        self.breaker.publish(&self.engine);
    }
}
