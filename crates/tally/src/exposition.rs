// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::Write;

use prometheus::{Encoder as _, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tripwire::CircuitState;

use crate::MetricsSnapshot;

/// Prefix of every exported series.
pub const NAMESPACE: &str = "dalleserver";

/// Renders a snapshot in the Prometheus text format.
///
/// A fresh registry is filled from the snapshot on every call. Every series except the
/// per-label breakdowns is always present, including all three breaker states and all five
/// response-time statistics.
///
/// # Errors
///
/// Returns an error if a metric cannot be registered or encoded.
pub fn prometheus(snapshot: &MetricsSnapshot) -> Result<String, prometheus::Error> {
    let registry = Registry::new();

    let counters = [
        ("errors_total", "Errors recorded by the service.", snapshot.total_errors),
        ("retries_total", "Retried attempts.", snapshot.total_retries),
        (
            "external_requests_total",
            "Attempts against the external generator.",
            snapshot.external_requests,
        ),
        (
            "external_errors_total",
            "Failed attempts against the external generator.",
            snapshot.external_errors,
        ),
        (
            "external_timeouts_total",
            "Attempts against the external generator that hit their deadline.",
            snapshot.external_timeouts,
        ),
        ("file_operations_total", "File system operations.", snapshot.file_operations),
        (
            "file_operation_errors_total",
            "Failed file system operations.",
            snapshot.file_operation_errors,
        ),
        (
            "circuit_breaker_failures_total",
            "Failed calls through the circuit breaker.",
            snapshot.circuit_breaker_failures,
        ),
        (
            "circuit_breaker_successes_total",
            "Successful calls through the circuit breaker.",
            snapshot.circuit_breaker_successes,
        ),
        (
            "response_time_ms_count",
            "Requests in the response time window.",
            snapshot.response_times.count,
        ),
        (
            "response_time_ms_sum",
            "Total milliseconds in the response time window.",
            snapshot.response_times.sum_ms,
        ),
    ];
    for (name, help, value) in counters {
        let counter = IntCounter::with_opts(opts(name, help))?;
        counter.inc_by(value);
        registry.register(Box::new(counter))?;
    }

    let breaker = IntGaugeVec::new(opts("circuit_breaker_state", "1 for the current circuit breaker state."), &["state"])?;
    for state in CircuitState::ALL {
        breaker
            .with_label_values(&[state.as_str()])
            .set(i64::from(snapshot.circuit_breaker_state == state));
    }
    registry.register(Box::new(breaker))?;

    let latency = GaugeVec::new(opts("response_time_ms", "Request latency in milliseconds."), &["stat"])?;
    let rt = &snapshot.response_times;
    for (stat, value) in [
        ("avg", rt.avg_ms),
        ("min", as_f64(rt.min_ms)),
        ("max", as_f64(rt.max_ms)),
        ("p95", as_f64(rt.p95_ms)),
        ("p99", as_f64(rt.p99_ms)),
    ] {
        latency.with_label_values(&[stat]).set(value);
    }
    registry.register(Box::new(latency))?;

    for (name, help, label, values) in [
        ("error_code_total", "Errors by code.", "code", &snapshot.errors_by_code),
        ("error_endpoint_total", "Errors by endpoint.", "endpoint", &snapshot.errors_by_endpoint),
        (
            "retry_operation_total",
            "Retries by operation.",
            "operation",
            &snapshot.retries_by_operation,
        ),
    ] {
        registry.register(Box::new(labeled(name, help, label, values)?))?;
    }

    let up = IntGauge::with_opts(opts("up", "Whether the service is up."))?;
    up.set(1);
    registry.register(Box::new(up))?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Renders a plain-text summary of recorded errors.
#[must_use]
pub fn error_report(snapshot: &MetricsSnapshot) -> String {
    if snapshot.total_errors == 0 {
        return "No errors recorded yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== Error Report ===");
    let _ = writeln!(out, "Total Errors: {}", snapshot.total_errors);
    let _ = writeln!(out, "Last Updated: {}", snapshot.last_updated.strftime("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);

    for (title, map) in [
        ("Errors by Code", &snapshot.errors_by_code),
        ("Errors by Endpoint", &snapshot.errors_by_endpoint),
    ] {
        if map.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{title}:");
        for (key, count) in map {
            let _ = writeln!(out, "  {key}: {count}");
        }
        let _ = writeln!(out);
    }

    if snapshot.external_errors > 0 {
        let _ = writeln!(
            out,
            "External Errors: {} (out of {} requests)",
            snapshot.external_errors, snapshot.external_requests
        );
    }
    if snapshot.file_operation_errors > 0 {
        let _ = writeln!(
            out,
            "File Operation Errors: {} (out of {} operations)",
            snapshot.file_operation_errors, snapshot.file_operations
        );
    }

    out
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

fn labeled(name: &str, help: &str, label: &str, values: &BTreeMap<String, u64>) -> Result<IntCounterVec, prometheus::Error> {
    let counters = IntCounterVec::new(opts(name, help), &[label])?;
    for (key, value) in values {
        counters.with_label_values(&[key.as_str()]).inc_by(*value);
    }
    Ok(counters)
}

#[expect(clippy::cast_precision_loss, reason = "latencies are far below 2^52 ms")]
fn as_f64(value: u64) -> f64 {
    value as f64
}
