// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use jiff::Timestamp;
use serde::{Serialize, Serializer};

use crate::CircuitState;

/// A point-in-time view of a [`CircuitBreaker`][crate::CircuitBreaker].
///
/// Reading metrics never waits for an in-flight call; the view reflects the breaker as of
/// the last completed or rejected call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct BreakerMetrics {
    /// Name from the breaker options.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures counted toward opening the circuit.
    pub failure_count: u32,
    /// Consecutive successful probes while half-open.
    pub success_count: u32,
    /// Failures needed to open the circuit.
    pub failure_threshold: u32,
    /// Successful probes needed to close the circuit.
    pub success_threshold: u32,
    /// Time the circuit stays open before admitting a probe.
    #[serde(rename = "reset_timeout_ms", serialize_with = "as_millis")]
    pub reset_timeout: Duration,
    /// Wall-clock time of the most recent failure.
    pub last_failure_time: Option<Timestamp>,
    /// Wall-clock time of the most recent success.
    pub last_success_time: Option<Timestamp>,
    /// Calls passed to the breaker, rejected ones included.
    pub total_requests: u64,
    /// Calls that ran and failed.
    pub total_failures: u64,
    /// Calls that ran and succeeded.
    pub total_successes: u64,
    /// Calls rejected because the circuit was open.
    pub total_rejections: u64,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_reset_timeout_as_millis() {
        let metrics = BreakerMetrics {
            name: "generator".to_string(),
            state: CircuitState::HalfOpen,
            failure_count: 5,
            success_count: 1,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            last_failure_time: None,
            last_success_time: None,
            total_requests: 7,
            total_failures: 5,
            total_successes: 2,
            total_rejections: 0,
        };

        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json["state"], "HALF_OPEN");
        assert_eq!(json["reset_timeout_ms"], 30_000);
        assert!(json["last_failure_time"].is_null());
    }
}
