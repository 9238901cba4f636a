// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use inflight::{ContextManager, ManagerOptions, ProgressHandle, ProgressView};
use tally::{MetricsCollector, MetricsSnapshot};
use tick::Clock;
use tokio::task::JoinHandle;
use tripwire::CircuitBreaker;

use crate::resilient::CallError;
use crate::{GenerationKey, Generator, KeyError, OrchestratorOptions, ResilientCall};

const GENERATION_ERROR: &str = "GENERATION_ERROR";

/// How a single request should be served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct RequestOptions {
    /// Start a fresh generation even if one already finished for the key.
    ///
    /// The finished context is dropped and the generator's cache is not consulted. A
    /// generation still in flight is attached to as usual.
    pub regenerate: bool,
}

impl RequestOptions {
    /// Options that force a fresh generation.
    #[must_use]
    pub const fn regenerate() -> Self {
        Self { regenerate: true }
    }
}

/// Deduplicates, runs and observes generations for series/address keys.
///
/// [`request`](Self::request) never waits: the first request for a key starts the generation
/// in the background and every request, first or not, returns the current progress. Callers
/// poll until the progress reports done.
///
/// Each generation consults [`Generator::lookup`] first and otherwise calls
/// [`Generator::generate`] through a [`ResilientCall`]: every attempt has a deadline and passes
/// the shared circuit breaker, and retryable failures are retried with backoff.
///
/// Clones share all state.
pub struct Orchestrator<G> {
    shared: Arc<Shared<G>>,
}

struct Shared<G> {
    generator: G,
    series: Vec<String>,
    manager: ContextManager<GenerationKey>,
    pipeline: ResilientCall,
    collector: MetricsCollector,
}

impl<G> Clone for Orchestrator<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G> Debug for Orchestrator<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("series", &self.shared.series)
            .field("manager", &self.shared.manager)
            .field("pipeline", &self.shared.pipeline)
            .finish_non_exhaustive()
    }
}

impl<G: Generator> Orchestrator<G> {
    /// Creates an orchestrator with its own breaker, metrics and context manager.
    #[must_use]
    pub fn new(generator: G, options: OrchestratorOptions, clock: Clock) -> Self {
        Self::builder(generator, clock).options(options).build()
    }

    /// Starts building an orchestrator that may share a breaker or collector with other parts
    /// of the service.
    #[must_use]
    pub fn builder(generator: G, clock: Clock) -> OrchestratorBuilder<G> {
        OrchestratorBuilder {
            generator,
            clock,
            options: OrchestratorOptions::default(),
            breaker: None,
            collector: None,
        }
    }

    /// Validates `series` and `address` into a key this orchestrator accepts.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if either part is malformed or the series is not configured.
    pub fn key(&self, series: &str, address: &str) -> Result<GenerationKey, KeyError> {
        let key = GenerationKey::parse(series, address)?;
        self.check_series(&key)?;
        Ok(key)
    }

    /// Returns the progress of the generation for `series` and `address`, starting it if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the pair is rejected by [`key`](Self::key). Generation failures
    /// are not errors here: they show up as a failed [`ProgressView`].
    pub fn request(&self, series: &str, address: &str) -> Result<ProgressView, KeyError> {
        let key = self.key(series, address)?;
        self.request_with(key, RequestOptions::default())
    }

    /// Like [`request`](Self::request), for an already parsed key and with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownSeries`] if the key's series is not configured.
    pub fn request_with(&self, key: GenerationKey, options: RequestOptions) -> Result<ProgressView, KeyError> {
        self.check_series(&key)?;

        if options.regenerate && self.shared.manager.invalidate(&key) {
            tracing::event!(name: "dalledress.regenerate", tracing::Level::INFO, key = %key);
        }

        let shared = Arc::clone(&self.shared);
        let consult_cache = !options.regenerate;
        let context = self.shared.manager.request(key.clone(), move |progress| async move {
            shared.run(&key, &progress, consult_cache).await
        });

        Ok(context.snapshot())
    }

    /// Progress of the generation tracked for `key`, without starting one.
    #[must_use]
    pub fn progress(&self, key: &GenerationKey) -> Option<ProgressView> {
        self.shared.manager.progress(key)
    }

    /// Waits until the generation tracked for `key` finishes and returns its final progress.
    ///
    /// Returns `None` right away if nothing is tracked for `key`.
    pub async fn wait(&self, key: &GenerationKey) -> Option<ProgressView> {
        let context = self.shared.manager.get(key)?;
        context.finished().await;
        Some(context.snapshot())
    }

    /// Forgets the finished generation for `key`, so the next request starts a new one.
    ///
    /// Returns `false` when nothing is tracked for `key` or its generation is still running.
    pub fn invalidate(&self, key: &GenerationKey) -> bool {
        self.shared.manager.invalidate(key)
    }

    /// Progress of every generation still running.
    #[must_use]
    pub fn active(&self) -> Vec<(GenerationKey, ProgressView)> {
        self.shared.manager.active()
    }

    /// Replaces the eviction limits. Zero disables a limit.
    pub fn configure_manager(&self, max_contexts: usize, context_ttl: Duration) {
        self.shared.manager.configure(ManagerOptions::new(max_contexts, context_ttl));
    }

    /// Number of tracked generations, running or finished.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.shared.manager.context_count()
    }

    /// Starts a background task evicting expired generations every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "dropping the handle detaches the sweeper; keep it to abort the task"]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.shared.manager.spawn_sweeper(interval)
    }

    /// A copy of the metrics recorded so far.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.collector.snapshot()
    }

    /// The metrics collector fed by generations.
    #[must_use]
    pub fn collector(&self) -> &MetricsCollector {
        &self.shared.collector
    }

    /// The circuit breaker guarding the generator.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        self.shared.pipeline.breaker()
    }

    /// The resilient call used for generations, for generator sub-steps that should share it.
    #[must_use]
    pub fn pipeline(&self) -> &ResilientCall {
        &self.shared.pipeline
    }

    /// The generator.
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.shared.generator
    }

    /// The accepted series, sorted. Empty means any.
    #[must_use]
    pub fn series(&self) -> &[String] {
        &self.shared.series
    }

    fn check_series(&self, key: &GenerationKey) -> Result<(), KeyError> {
        let series = &self.shared.series;
        if series.is_empty() || series.binary_search_by(|s| s.as_str().cmp(key.series())).is_ok() {
            Ok(())
        } else {
            Err(KeyError::UnknownSeries(key.series().to_string()))
        }
    }
}

impl<G: Generator> Shared<G> {
    async fn run(&self, key: &GenerationKey, progress: &ProgressHandle, consult_cache: bool) -> Result<String, CallError> {
        if consult_cache && let Some(locator) = self.generator.lookup(key) {
            progress.mark_cache_hit();
            tracing::event!(name: "dalledress.cache_hit", tracing::Level::DEBUG, key = %key);
            return Ok(locator);
        }

        let result = self
            .pipeline
            .call(|_attempt| self.generator.generate(key, progress))
            .await;

        if let Err(error) = &result {
            self.collector.record_error(GENERATION_ERROR, "generate");
            tracing::event!(
                name: "dalledress.generation_failed",
                tracing::Level::ERROR,
                key = %key,
                attempts = error.attempts(),
                error = %error,
            );
        }

        result
    }
}

/// Builds an [`Orchestrator`].
#[derive(Debug)]
pub struct OrchestratorBuilder<G> {
    generator: G,
    clock: Clock,
    options: OrchestratorOptions,
    breaker: Option<CircuitBreaker>,
    collector: Option<MetricsCollector>,
}

impl<G: Generator> OrchestratorBuilder<G> {
    /// Sets the options. The breaker options are ignored if a breaker is supplied.
    #[must_use]
    pub fn options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses an existing circuit breaker instead of creating one.
    #[must_use]
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Records metrics into an existing collector instead of creating one.
    #[must_use]
    pub fn collector(mut self, collector: MetricsCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Creates the orchestrator.
    #[must_use]
    pub fn build(self) -> Orchestrator<G> {
        let Self {
            generator,
            clock,
            options,
            breaker,
            collector,
        } = self;

        let breaker = breaker.unwrap_or_else(|| CircuitBreaker::new(options.breaker.clone(), clock.clone()));
        let collector = collector.unwrap_or_else(|| MetricsCollector::new(clock.clone()));
        collector.update_circuit_breaker(&breaker.metrics());

        let pipeline = ResilientCall::new("generate", breaker, options.retry, collector.clone(), clock.clone())
            .attempt_timeout(options.attempt_timeout);

        Orchestrator {
            shared: Arc::new(Shared {
                generator,
                series: options.series,
                manager: ContextManager::new(options.manager, clock),
                pipeline,
                collector,
            }),
        }
    }
}
