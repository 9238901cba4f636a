// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `HealthAggregator` using only the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tick::ClockControl;
use tripwire::{CircuitBreaker, CircuitBreakerOptions};
use vitals::{BreakerProbe, FileSystemProbe, HealthAggregator, HealthStatus, Observation, Probe};

#[derive(Debug)]
struct Fixed {
    name: &'static str,
    status: HealthStatus,
    calls: Arc<AtomicUsize>,
}

impl Fixed {
    fn new(name: &'static str, status: HealthStatus) -> Self {
        Self {
            name,
            status,
            calls: Arc::default(),
        }
    }
}

impl Probe for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self) -> Observation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Observation::new(self.status, format!("{} is {}", self.name, self.status)).detail("calls", 1)
    }
}

#[derive(Debug)]
struct Exploding;

impl Probe for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn check(&self) -> Observation {
        panic!("probe blew up")
    }
}

fn aggregator() -> HealthAggregator {
    HealthAggregator::new("1.0.0", ClockControl::new().to_clock())
}

#[test]
fn no_probes_is_healthy() {
    let report = aggregator().check_health();

    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.components.is_empty());
    assert_eq!(report.version, "1.0.0");
}

#[test]
fn worst_component_decides() {
    let degraded = aggregator()
        .with_probe(Fixed::new("a", HealthStatus::Healthy))
        .with_probe(Fixed::new("b", HealthStatus::Degraded));
    assert_eq!(degraded.check_health().status, HealthStatus::Degraded);

    let unhealthy = degraded.clone().with_probe(Fixed::new("c", HealthStatus::Unhealthy));
    let report = unhealthy.check_health();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.components.len(), 3);
    assert_eq!(report.components["c"].message, "c is unhealthy");
}

#[test]
fn panicking_probe_is_isolated() {
    let report = aggregator()
        .with_probe(Exploding)
        .with_probe(Fixed::new("after", HealthStatus::Healthy))
        .check_health();

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.components["exploding"].status, HealthStatus::Unhealthy);
    assert_eq!(report.components["exploding"].message, "health probe panicked: probe blew up");
    assert_eq!(report.components["after"].status, HealthStatus::Healthy);
}

#[test]
fn liveness_runs_no_probes() {
    let probe = Fixed::new("counted", HealthStatus::Unhealthy);
    let calls = Arc::clone(&probe.calls);
    let aggregator = aggregator().with_probe(probe);

    let liveness = aggregator.liveness();

    assert_eq!(liveness.status, "alive");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn readiness_tolerates_degraded_but_not_unhealthy() {
    let degraded = aggregator().with_probe(Fixed::new("slow", HealthStatus::Degraded)).readiness();
    assert!(degraded.ready);
    assert_eq!(degraded.status, "ready");
    assert_eq!(degraded.health, HealthStatus::Degraded);

    let unhealthy = aggregator().with_probe(Fixed::new("down", HealthStatus::Unhealthy)).readiness();
    assert!(!unhealthy.ready);
    assert_eq!(unhealthy.status, "not_ready");
}

#[tokio::test]
async fn open_breaker_makes_the_service_unhealthy() {
    let clock = ClockControl::new().to_clock();
    let breaker = CircuitBreaker::new(CircuitBreakerOptions::default().failure_threshold(1), clock.clone());
    let dir = tempfile::tempdir().unwrap();
    let aggregator = HealthAggregator::new("1.0.0", clock)
        .with_probe(FileSystemProbe::new(dir.path()))
        .with_probe(BreakerProbe::new("generator", breaker.clone()));

    assert_eq!(aggregator.check_health().status, HealthStatus::Healthy);

    let _ = breaker.execute(|| async { Err::<(), _>("unavailable") }).await;

    let report = aggregator.check_health();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.components["filesystem"].status, HealthStatus::Healthy);
    assert_eq!(report.components["generator"].status, HealthStatus::Unhealthy);
}

#[test]
fn report_serializes_with_snake_case_fields() {
    let report = aggregator().with_probe(Fixed::new("a", HealthStatus::Degraded)).check_health();

    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["status"], "degraded");
    assert_eq!(json["uptime_seconds"], 0);
    assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    assert_eq!(json["components"]["a"]["status"], "degraded");
    assert_eq!(json["components"]["a"]["details"]["calls"], 1);
    assert!(json["components"]["a"]["duration_ms"].is_u64());
    assert!(json["system"]["available_parallelism"].is_u64());
}
