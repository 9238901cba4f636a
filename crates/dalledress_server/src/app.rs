// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dalledress::{Orchestrator, ResilientCall};
use rebound::RetryPolicy;
use tally::MetricsCollector;
use tick::Clock;
use tripwire::{CircuitBreaker, CircuitBreakerOptions};
use vitals::{BreakerProbe, DiskSpaceProbe, FileSystemProbe, HealthAggregator, MemoryProbe};

use crate::{AppState, ArtifactStore, ServerConfig, ServerError, SimulatedGenerator, router, spawn_status_reporter};

const ENHANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wires the simulated generator, its breakers, metrics and health probes into an [`AppState`].
///
/// The generator and the prompt enhancer each get their own circuit breaker, both reported by
/// the health checks together with the data directory, memory and disk space.
#[must_use]
pub fn simulated_state(config: &ServerConfig, data_dir: &Path, clock: &Clock) -> AppState<SimulatedGenerator> {
    let options = config.orchestrator_options();
    let collector = MetricsCollector::new(clock.clone());
    let breaker = CircuitBreaker::new(options.get_breaker().clone(), clock.clone());
    let enhancer = CircuitBreaker::new(CircuitBreakerOptions::external_dependency().name("enhancer"), clock.clone());

    let enhance = ResilientCall::new("enhance", enhancer.clone(), RetryPolicy::generic(), collector.clone(), clock.clone())
        .attempt_timeout(ENHANCE_TIMEOUT);
    let artifacts = ArtifactStore::new(data_dir);
    let generator =
        SimulatedGenerator::new(artifacts.clone(), enhance, collector.clone(), clock.clone()).step(config.step());

    let orchestrator = Orchestrator::builder(generator, clock.clone())
        .options(options)
        .breaker(breaker.clone())
        .collector(collector)
        .build();

    let health = HealthAggregator::new(env!("CARGO_PKG_VERSION"), clock.clone())
        .with_probe(FileSystemProbe::new(data_dir))
        .with_probe(BreakerProbe::new("generator", breaker))
        .with_probe(BreakerProbe::new("enhancer", enhancer))
        .with_probe(MemoryProbe::default())
        .with_probe(DiskSpaceProbe::new(data_dir));

    AppState::new(orchestrator, health, artifacts, clock.clone())
}

/// Makes sure `dir` exists and accepts writes, falling back to a fresh temporary directory.
#[must_use]
pub fn prepare_data_dir(dir: &Path) -> PathBuf {
    let probe = std::fs::create_dir_all(dir).and_then(|()| tempfile::tempfile_in(dir).map(drop));
    let Err(error) = probe else {
        return dir.to_path_buf();
    };

    match tempfile::Builder::new().prefix("dalleserver-fallback-").tempdir() {
        Ok(fallback) => {
            let fallback = fallback.keep();
            tracing::event!(
                name: "dalledress_server.data_dir_fallback",
                tracing::Level::WARN,
                data_dir = %dir.display(),
                fallback = %fallback.display(),
                error = %error,
            );
            fallback
        }
        Err(fallback_error) => {
            tracing::event!(
                name: "dalledress_server.data_dir_unwritable",
                tracing::Level::ERROR,
                data_dir = %dir.display(),
                error = %error,
                fallback_error = %fallback_error,
            );
            dir.to_path_buf()
        }
    }
}

/// Runs the server until Ctrl-C or, on Unix, SIGTERM.
///
/// Must be called from within a multi-threaded Tokio runtime.
///
/// # Errors
///
/// Returns a [`ServerError`] if the port cannot be bound or serving fails.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let clock = Clock::new_tokio();
    let data_dir = prepare_data_dir(&config.data_dir);
    let state = simulated_state(&config, &data_dir, &clock);

    let sweeper = state.orchestrator().spawn_sweeper(config.sweep_interval());
    let reporter = spawn_status_reporter(state.orchestrator().clone(), clock, config.status_interval());

    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|source| ServerError::Bind { port: config.port, source })?;

    tracing::event!(
        name: "dalledress_server.started",
        tracing::Level::INFO,
        address = %address,
        data_dir = %data_dir.display(),
        series = ?state.orchestrator().series(),
    );

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve);

    sweeper.abort();
    reporter.abort();
    tracing::event!(name: "dalledress_server.stopped", tracing::Level::INFO, "server stopped");

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::event!(name: "dalledress_server.signal_error", tracing::Level::ERROR, error = %error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::event!(name: "dalledress_server.signal_error", tracing::Level::ERROR, error = %error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::event!(name: "dalledress_server.shutdown", tracing::Level::INFO, "shutdown requested");
}
