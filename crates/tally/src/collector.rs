// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use parking_lot::RwLock;
use tick::Clock;
use tripwire::{BreakerMetrics, CircuitState};

use crate::MetricsSnapshot;
use crate::latency::LatencyWindow;

/// Collects service metrics.
///
/// All state sits behind one read-write lock that is held only for the counter update
/// itself. Clones share the same metrics.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    clock: Clock,
    state: RwLock<State>,
}

#[derive(Debug)]
struct State {
    total_errors: u64,
    errors_by_code: BTreeMap<String, u64>,
    errors_by_endpoint: BTreeMap<String, u64>,
    breaker_state: CircuitState,
    breaker_failures: u64,
    breaker_successes: u64,
    total_retries: u64,
    retries_by_operation: BTreeMap<String, u64>,
    latency: LatencyWindow,
    external_requests: u64,
    external_errors: u64,
    external_timeouts: u64,
    file_operations: u64,
    file_operation_errors: u64,
    last_updated: Timestamp,
}

impl State {
    fn new(now: Timestamp) -> Self {
        Self {
            total_errors: 0,
            errors_by_code: BTreeMap::new(),
            errors_by_endpoint: BTreeMap::new(),
            breaker_state: CircuitState::Closed,
            breaker_failures: 0,
            breaker_successes: 0,
            total_retries: 0,
            retries_by_operation: BTreeMap::new(),
            latency: LatencyWindow::default(),
            external_requests: 0,
            external_errors: 0,
            external_timeouts: 0,
            file_operations: 0,
            file_operation_errors: 0,
            last_updated: now,
        }
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    match map.get_mut(key) {
        Some(count) => *count = count.saturating_add(1),
        None => {
            map.insert(key.to_string(), 1);
        }
    }
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        let state = State::new(clock.system_time_as());
        Self {
            shared: Arc::new(Shared {
                clock,
                state: RwLock::new(state),
            }),
        }
    }

    /// Counts an error under `code` and `endpoint`.
    pub fn record_error(&self, code: &str, endpoint: &str) {
        self.update(|state| {
            state.total_errors = state.total_errors.saturating_add(1);
            bump(&mut state.errors_by_code, code);
            bump(&mut state.errors_by_endpoint, endpoint);
        });

        tracing::event!(
            name: "tally.error_recorded",
            tracing::Level::DEBUG,
            error.code = code,
            endpoint = endpoint,
        );
    }

    /// Counts a retry of `operation`.
    pub fn record_retry(&self, operation: &str) {
        self.update(|state| {
            state.total_retries = state.total_retries.saturating_add(1);
            bump(&mut state.retries_by_operation, operation);
        });
    }

    /// Adds a response time sample.
    pub fn record_response_time(&self, duration_ms: u64) {
        self.update(|state| state.latency.record(duration_ms));
    }

    /// Counts an attempt against the external dependency.
    pub fn record_external_request(&self, success: bool, timed_out: bool) {
        self.update(|state| {
            state.external_requests = state.external_requests.saturating_add(1);
            if !success {
                state.external_errors = state.external_errors.saturating_add(1);
            }
            if timed_out {
                state.external_timeouts = state.external_timeouts.saturating_add(1);
            }
        });
    }

    /// Counts a file system operation.
    pub fn record_file_operation(&self, success: bool) {
        self.update(|state| {
            state.file_operations = state.file_operations.saturating_add(1);
            if !success {
                state.file_operation_errors = state.file_operation_errors.saturating_add(1);
            }
        });
    }

    /// Mirrors a circuit breaker's state and lifetime totals.
    pub fn update_circuit_breaker(&self, metrics: &BreakerMetrics) {
        self.update(|state| {
            state.breaker_state = metrics.state;
            state.breaker_failures = metrics.total_failures;
            state.breaker_successes = metrics.total_successes;
        });
    }

    /// Returns a deep copy of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.shared.state.read();

        MetricsSnapshot {
            total_errors: state.total_errors,
            errors_by_code: state.errors_by_code.clone(),
            errors_by_endpoint: state.errors_by_endpoint.clone(),
            circuit_breaker_state: state.breaker_state,
            circuit_breaker_failures: state.breaker_failures,
            circuit_breaker_successes: state.breaker_successes,
            total_retries: state.total_retries,
            retries_by_operation: state.retries_by_operation.clone(),
            response_times: state.latency.stats(),
            external_requests: state.external_requests,
            external_errors: state.external_errors,
            external_timeouts: state.external_timeouts,
            file_operations: state.file_operations,
            file_operation_errors: state.file_operation_errors,
            last_updated: state.last_updated,
        }
    }

    /// Renders the current metrics as Prometheus text.
    ///
    /// # Errors
    ///
    /// Returns an error if the exposition cannot be encoded.
    pub fn prometheus(&self) -> Result<String, prometheus::Error> {
        crate::exposition::prometheus(&self.snapshot())
    }

    /// Renders a human-readable error summary.
    #[must_use]
    pub fn error_report(&self) -> String {
        crate::exposition::error_report(&self.snapshot())
    }

    /// Clears every counter, label map and sample.
    pub fn reset(&self) {
        let now = self.shared.clock.system_time_as();
        *self.shared.state.write() = State::new(now);

        tracing::event!(name: "tally.reset", tracing::Level::INFO, "metrics reset");
    }

    fn update(&self, apply: impl FnOnce(&mut State)) {
        let now = self.shared.clock.system_time_as();
        let mut state = self.shared.state.write();
        apply(&mut state);
        state.last_updated = now;
    }
}
