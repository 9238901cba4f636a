// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `Orchestrator` using only the public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dalledress::{
    GenerationError, GenerationKey, Generator, KeyError, Orchestrator, OrchestratorOptions, RequestOptions,
};
use inflight::{Phase, ProgressHandle};
use parking_lot::Mutex;
use rebound::RetryPolicy;
use tick::{Clock, ClockControl};
use tripwire::{CircuitBreakerOptions, CircuitState};

const ADDRESS: &str = "0xf503017d7baf7fbc0fff7492b751025c6a78179b";

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Succeed,
    Fail(u16),
    Hang,
}

/// A generator whose attempts follow a script; the last entry repeats. Clones share state.
#[derive(Debug, Clone, Default)]
struct Scripted {
    script: Arc<Mutex<Vec<Outcome>>>,
    cached: Arc<Mutex<HashMap<GenerationKey, String>>>,
    calls: Arc<AtomicU32>,
}

impl Scripted {
    fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Outcome {
        let mut script = self.script.lock();
        if script.len() > 1 { script.remove(0) } else { script[0] }
    }
}

impl Generator for Scripted {
    fn lookup(&self, key: &GenerationKey) -> Option<String> {
        self.cached.lock().get(key).cloned()
    }

    async fn generate(&self, key: &GenerationKey, progress: &ProgressHandle) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.set_phase(Phase::Generating);

        match self.next() {
            Outcome::Succeed => Ok(format!("output/{}/annotated/{}.png", key.series(), key.address())),
            Outcome::Fail(status) => Err(GenerationError::Status {
                status,
                message: "upstream said no".to_string(),
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

fn clock() -> Clock {
    ClockControl::new().auto_advance_timers(true).to_clock()
}

fn options() -> OrchestratorOptions {
    OrchestratorOptions::default()
        .series(["empty", "simple"])
        .retry(RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100), 2.0))
        .attempt_timeout(Duration::from_secs(5))
}

fn orchestrator(generator: &Scripted) -> Orchestrator<Scripted> {
    Orchestrator::new(generator.clone(), options(), clock())
}

async fn finish(orchestrator: &Orchestrator<Scripted>) -> inflight::ProgressView {
    let key = orchestrator.key("empty", ADDRESS).unwrap();
    orchestrator.wait(&key).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_generation() {
    let generator = Scripted::new([Outcome::Succeed]);
    let orchestrator = orchestrator(&generator);

    let requests: Vec<_> = (0..16)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.request("empty", ADDRESS).unwrap() })
        })
        .collect();
    for request in requests {
        request.await.unwrap();
    }

    let done = finish(&orchestrator).await;

    assert_eq!(done.phase, Phase::Done);
    assert_eq!(generator.calls(), 1);
    assert_eq!(orchestrator.context_count(), 1);
    assert_eq!(orchestrator.metrics().external_requests, 1);
}

#[tokio::test]
async fn keys_are_case_insensitive() {
    let generator = Scripted::new([Outcome::Succeed]);
    let orchestrator = orchestrator(&generator);

    orchestrator.request("EMPTY", &ADDRESS.replace("f503", "F503")).unwrap();
    orchestrator.request("empty", ADDRESS).unwrap();
    finish(&orchestrator).await;

    assert_eq!(orchestrator.context_count(), 1);
}

#[tokio::test]
async fn invalid_keys_are_rejected_without_tracking() {
    let orchestrator = orchestrator(&Scripted::new([Outcome::Succeed]));

    assert_eq!(
        orchestrator.request("unknown", ADDRESS).unwrap_err(),
        KeyError::UnknownSeries("unknown".to_string())
    );
    assert_eq!(orchestrator.request("empty", "0x12").unwrap_err().code(), "INVALID_ADDRESS");
    assert_eq!(orchestrator.context_count(), 0);
}

#[tokio::test]
async fn failure_is_reported_through_progress() {
    let generator = Scripted::new([Outcome::Fail(500)]);
    let orchestrator = orchestrator(&generator);

    orchestrator.request("empty", ADDRESS).unwrap();
    let failed = finish(&orchestrator).await;

    assert_eq!(failed.phase, Phase::Failed);
    assert!(failed.done);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("upstream said no")));
    assert_eq!(generator.calls(), 3);

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.external_requests, 3);
    assert_eq!(metrics.external_errors, 3);
    assert_eq!(metrics.total_retries, 2);
    assert_eq!(metrics.errors_by_code["GENERATION_ERROR"], 1);
    assert_eq!(metrics.errors_by_endpoint["generate"], 1);

    // Later requests observe the retained failure instead of starting over.
    let again = orchestrator.request("empty", ADDRESS).unwrap();
    assert_eq!(again.phase, Phase::Failed);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let generator = Scripted::new([Outcome::Fail(400)]);
    let orchestrator = orchestrator(&generator);

    orchestrator.request("empty", ADDRESS).unwrap();
    let failed = finish(&orchestrator).await;

    assert_eq!(failed.phase, Phase::Failed);
    assert_eq!(generator.calls(), 1);
    assert_eq!(orchestrator.metrics().total_retries, 0);
}

#[tokio::test]
async fn hung_attempt_times_out_and_is_retried() {
    let generator = Scripted::new([Outcome::Hang, Outcome::Succeed]);
    let orchestrator = orchestrator(&generator);

    orchestrator.request("empty", ADDRESS).unwrap();
    let done = finish(&orchestrator).await;

    assert_eq!(done.phase, Phase::Done);
    assert_eq!(generator.calls(), 2);
    assert_eq!(orchestrator.metrics().external_timeouts, 1);
}

#[tokio::test]
async fn open_breaker_fails_fast() {
    let generator = Scripted::new([Outcome::Fail(503)]);
    let orchestrator = Orchestrator::new(
        generator.clone(),
        options().breaker(CircuitBreakerOptions::default().failure_threshold(2)),
        clock(),
    );

    orchestrator.request("empty", ADDRESS).unwrap();
    let failed = finish(&orchestrator).await;

    assert_eq!(orchestrator.breaker().state(), CircuitState::Open);
    assert_eq!(generator.calls(), 2, "third attempt must be rejected by the breaker");
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("circuit breaker is open")));

    let other = "0x0000000000000000000000000000000000000001";
    orchestrator.request("simple", other).unwrap();
    let key = orchestrator.key("simple", other).unwrap();
    let rejected = orchestrator.wait(&key).await.unwrap();

    assert_eq!(rejected.phase, Phase::Failed);
    assert_eq!(generator.calls(), 2);
    assert_eq!(orchestrator.metrics().circuit_breaker_state, CircuitState::Open);
}

#[tokio::test]
async fn cache_hit_skips_the_generator() {
    let generator = Scripted::new([Outcome::Succeed]);
    let key = GenerationKey::parse("empty", ADDRESS).unwrap();
    generator.cached.lock().insert(key, "cached.png".to_string());
    let orchestrator = orchestrator(&generator);

    orchestrator.request("empty", ADDRESS).unwrap();
    let done = finish(&orchestrator).await;

    assert!(done.cache_hit);
    assert_eq!(done.result_locator.as_deref(), Some("cached.png"));
    assert_eq!(generator.calls(), 0);
    assert_eq!(orchestrator.metrics().external_requests, 0);
}

#[tokio::test]
async fn regenerate_replaces_a_finished_generation() {
    let generator = Scripted::new([Outcome::Fail(400), Outcome::Succeed]);
    let key = GenerationKey::parse("empty", ADDRESS).unwrap();
    generator.cached.lock().insert(key.clone(), "stale.png".to_string());
    let orchestrator = orchestrator(&generator);

    orchestrator.request_with(key.clone(), RequestOptions::regenerate()).unwrap();
    assert_eq!(finish(&orchestrator).await.phase, Phase::Failed);

    orchestrator.request_with(key, RequestOptions::regenerate()).unwrap();
    let done = finish(&orchestrator).await;

    assert_eq!(done.phase, Phase::Done);
    assert!(!done.cache_hit);
    assert_eq!(generator.calls(), 2);
    assert_eq!(orchestrator.context_count(), 1);
}

#[tokio::test]
async fn invalidated_generation_runs_again() {
    let generator = Scripted::new([Outcome::Succeed]);
    let orchestrator = orchestrator(&generator);
    let key = orchestrator.key("empty", ADDRESS).unwrap();

    orchestrator.request("empty", ADDRESS).unwrap();
    assert_eq!(finish(&orchestrator).await.phase, Phase::Done);

    assert!(orchestrator.invalidate(&key));
    assert!(orchestrator.progress(&key).is_none());
    assert!(!orchestrator.invalidate(&key));

    let restarted = orchestrator.request("empty", ADDRESS).unwrap();
    assert!(!restarted.done);
    assert_eq!(finish(&orchestrator).await.phase, Phase::Done);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn configure_manager_applies_to_later_sweeps() {
    let generator = Scripted::new([Outcome::Succeed]);
    let orchestrator = orchestrator(&generator);
    orchestrator.configure_manager(1, Duration::ZERO);

    for address in [
        "0x0000000000000000000000000000000000000001",
        "0x0000000000000000000000000000000000000002",
    ] {
        orchestrator.request("empty", address).unwrap();
        let key = orchestrator.key("empty", address).unwrap();
        orchestrator.wait(&key).await.unwrap();
    }
    orchestrator.request("empty", ADDRESS).unwrap();

    assert_eq!(orchestrator.context_count(), 1, "only the running generation survives");
}

#[tokio::test]
async fn shared_collector_and_breaker_are_used() {
    let clock = clock();
    let collector = tally::MetricsCollector::new(clock.clone());
    let breaker = tripwire::CircuitBreaker::new(CircuitBreakerOptions::default(), clock.clone());
    let generator = Scripted::new([Outcome::Succeed]);
    let orchestrator = Orchestrator::builder(generator.clone(), clock)
        .options(options())
        .collector(collector.clone())
        .breaker(breaker.clone())
        .build();

    orchestrator.request("empty", ADDRESS).unwrap();
    finish(&orchestrator).await;

    assert_eq!(collector.snapshot().external_requests, 1);
    assert_eq!(breaker.metrics().total_successes, 1);
}
