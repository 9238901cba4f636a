// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Serialize;
use tripwire::CircuitState;

use crate::ResponseTimes;

/// An independent copy of everything a [`MetricsCollector`][crate::MetricsCollector] has recorded.
///
/// Label maps are ordered by key, so iteration and serialization are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct MetricsSnapshot {
    /// Errors recorded through `record_error`.
    pub total_errors: u64,
    /// Error count per error code.
    pub errors_by_code: BTreeMap<String, u64>,
    /// Error count per endpoint.
    pub errors_by_endpoint: BTreeMap<String, u64>,

    /// Last mirrored circuit breaker state.
    pub circuit_breaker_state: CircuitState,
    /// Lifetime failures of the mirrored breaker.
    pub circuit_breaker_failures: u64,
    /// Lifetime successes of the mirrored breaker.
    pub circuit_breaker_successes: u64,

    /// Retries recorded through `record_retry`.
    pub total_retries: u64,
    /// Retry count per operation.
    pub retries_by_operation: BTreeMap<String, u64>,

    /// Response time statistics.
    pub response_times: ResponseTimes,

    /// Attempts made against the external dependency.
    pub external_requests: u64,
    /// Attempts that failed.
    pub external_errors: u64,
    /// Attempts that hit their deadline.
    pub external_timeouts: u64,

    /// File operations performed.
    pub file_operations: u64,
    /// File operations that failed.
    pub file_operation_errors: u64,

    /// Time of the most recent update.
    pub last_updated: Timestamp,
}
