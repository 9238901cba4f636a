// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use jiff::Timestamp;

use crate::{BreakerMetrics, CircuitBreakerOptions, CircuitState};

/// A state change worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Opened { failures: u32 },
    Reopened,
    HalfOpened { open_for: Duration },
    Closed { probes: u32 },
}

/// The counting and transition rules, free of locking and clocks.
#[derive(Debug, Default)]
pub(crate) struct Engine {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<Timestamp>,
    last_success_time: Option<Timestamp>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
}

impl Engine {
    /// Decides whether a call may run at `now`.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open first, so the
    /// call being decided becomes the first probe.
    pub fn admit(&mut self, now: Instant, options: &CircuitBreakerOptions) -> (bool, Option<Transition>) {
        self.total_requests = self.total_requests.saturating_add(1);

        if self.state != CircuitState::Open {
            return (true, None);
        }

        let open_for = self
            .last_failure
            .map_or(Duration::MAX, |failed_at| now.saturating_duration_since(failed_at));

        if open_for > options.reset_timeout {
            self.state = CircuitState::HalfOpen;
            self.success_count = 0;
            return (true, Some(Transition::HalfOpened { open_for }));
        }

        self.total_rejections = self.total_rejections.saturating_add(1);
        (false, None)
    }

    pub fn on_success(&mut self, at: Timestamp, options: &CircuitBreakerOptions) -> Option<Transition> {
        self.total_successes = self.total_successes.saturating_add(1);
        self.last_success_time = Some(at);

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count < options.success_threshold {
                    return None;
                }

                let probes = self.success_count;
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                self.success_count = 0;
                Some(Transition::Closed { probes })
            }
            // Only reachable if the circuit was forced open while this call ran.
            CircuitState::Open => None,
        }
    }

    pub fn on_failure(&mut self, now: Instant, at: Timestamp, options: &CircuitBreakerOptions) -> Option<Transition> {
        self.total_failures = self.total_failures.saturating_add(1);
        self.last_failure = Some(now);
        self.last_failure_time = Some(at);

        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_add(1);
                if self.failure_count < options.failure_threshold {
                    return None;
                }

                self.state = CircuitState::Open;
                Some(Transition::Opened {
                    failures: self.failure_count,
                })
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.failure_count = options.failure_threshold;
                self.success_count = 0;
                Some(Transition::Reopened)
            }
            CircuitState::Open => None,
        }
    }

    /// Returns to a closed circuit with cleared counters. Lifetime totals are kept.
    pub fn reset(&mut self) -> bool {
        let was = self.state;
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure = None;
        was != CircuitState::Closed
    }

    pub fn metrics(&self, options: &CircuitBreakerOptions) -> BreakerMetrics {
        BreakerMetrics {
            name: options.name.to_string(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            failure_threshold: options.failure_threshold,
            success_threshold: options.success_threshold,
            reset_timeout: options.reset_timeout,
            last_failure_time: self.last_failure_time,
            last_success_time: self.last_success_time,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            total_rejections: self.total_rejections,
        }
    }
}
