// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use parking_lot::RwLock;
use serde::Serialize;
use tick::Clock;
use tokio::sync::Notify;

use crate::Phase;

/// Observable state of one generation job.
///
/// A context is created by a [`ContextManager`](crate::ContextManager) and mutated only
/// through the [`ProgressHandle`] given to the job that owns it. Any number of pollers may
/// read it concurrently.
#[derive(Debug)]
pub struct GenerationContext {
    clock: Clock,
    started: Instant,
    started_at: Timestamp,
    progress: RwLock<Progress>,
    finished: Notify,
}

#[derive(Debug, Default)]
struct Progress {
    phase: Phase,
    percent: f64,
    eta: Option<Duration>,
    cache_hit: bool,
    error: Option<String>,
    result_locator: Option<String>,
    completed: Option<Instant>,
}

impl GenerationContext {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            started: clock.instant(),
            started_at: clock.system_time_as(),
            clock,
            progress: RwLock::new(Progress::default()),
            finished: Notify::new(),
        }
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.progress.read().phase
    }

    /// Completion percentage in `[0, 100]`.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.progress.read().percent
    }

    /// Whether the job finished, successfully or not. Never reverts once `true`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.progress.read().completed.is_some()
    }

    /// The failure message of a [`Phase::Failed`] job.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.progress.read().error.clone()
    }

    /// Where the artifact of a [`Phase::Done`] job can be found.
    #[must_use]
    pub fn result_locator(&self) -> Option<String> {
        self.progress.read().result_locator.clone()
    }

    /// Whether the job was satisfied from an existing artifact.
    #[must_use]
    pub fn cache_hit(&self) -> bool {
        self.progress.read().cache_hit
    }

    /// Wall-clock time the context was created.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// A consistent copy of every observable field.
    #[must_use]
    pub fn snapshot(&self) -> ProgressView {
        let progress = self.progress.read();
        let eta_seconds = match (progress.completed, progress.eta) {
            (Some(_), _) => 0,
            (None, Some(eta)) => eta.as_secs(),
            (None, None) => self.estimate_remaining(progress.percent),
        };

        ProgressView {
            phase: progress.phase,
            percent: progress.percent,
            eta_seconds,
            cache_hit: progress.cache_hit,
            error: progress.error.clone(),
            done: progress.completed.is_some(),
            result_locator: progress.result_locator.clone(),
            started_at: self.started_at,
        }
    }

    /// Waits until the job finishes.
    ///
    /// Pollers normally read [`snapshot`](Self::snapshot) instead; this exists for tests and
    /// for shutdown paths that want to drain work.
    pub async fn finished(&self) {
        loop {
            // Registered before the check so a completion in between is not missed.
            let notified = self.finished.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn completed_at(&self) -> Option<Instant> {
        self.progress.read().completed
    }

    /// Moves the context to its terminal phase. Returns `false` if it already was terminal.
    pub(crate) fn complete(&self, outcome: Result<String, String>) -> bool {
        {
            let mut progress = self.progress.write();
            if progress.completed.is_some() {
                return false;
            }

            match outcome {
                Ok(locator) => {
                    progress.phase = Phase::Done;
                    progress.percent = Phase::Done.baseline_percent();
                    progress.result_locator = Some(locator);
                }
                Err(message) => {
                    progress.phase = Phase::Failed;
                    progress.error = Some(message);
                }
            }
            progress.eta = None;
            progress.completed = Some(self.clock.instant());
        }

        self.finished.notify_waiters();
        true
    }

    fn estimate_remaining(&self, percent: f64) -> u64 {
        if percent <= 0.0 {
            return 0;
        }
        let elapsed = self.clock.instant().saturating_duration_since(self.started).as_secs_f64();
        let remaining = elapsed * (100.0 - percent) / percent;

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "non-negative and rounded")]
        let seconds = remaining.round().max(0.0) as u64;
        seconds
    }
}

/// The owning job's write access to a [`GenerationContext`].
///
/// Every setter enforces the context's invariants: percent stays in `[0, 100]` and never
/// decreases, phases only move forward, and nothing changes after the job finished.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    context: Arc<GenerationContext>,
}

impl ProgressHandle {
    pub(crate) const fn new(context: Arc<GenerationContext>) -> Self {
        Self { context }
    }

    /// Enters a non-terminal phase and raises percent to the phase's baseline.
    ///
    /// Terminal phases are set by the manager from the job's outcome, so passing
    /// [`Phase::Done`] or [`Phase::Failed`] is ignored, as is moving backwards.
    pub fn set_phase(&self, phase: Phase) {
        if phase.is_terminal() {
            return;
        }

        let mut progress = self.context.progress.write();
        if progress.completed.is_some() || phase < progress.phase {
            return;
        }
        progress.phase = phase;
        progress.percent = progress.percent.max(phase.baseline_percent());
    }

    /// Reports progress. Values are clamped to `[0, 100]` and lower values are ignored.
    pub fn set_percent(&self, percent: f64) {
        if percent.is_nan() {
            return;
        }

        let mut progress = self.context.progress.write();
        if progress.completed.is_some() {
            return;
        }
        progress.percent = progress.percent.max(percent.clamp(0.0, 100.0));
    }

    /// Reports an estimate of the remaining time, replacing the derived one.
    pub fn set_eta(&self, eta: Duration) {
        let mut progress = self.context.progress.write();
        if progress.completed.is_none() {
            progress.eta = Some(eta);
        }
    }

    /// Flags that the artifact already existed.
    pub fn mark_cache_hit(&self) {
        let mut progress = self.context.progress.write();
        if progress.completed.is_none() {
            progress.cache_hit = true;
        }
    }

    /// The context being updated.
    #[must_use]
    pub fn context(&self) -> &Arc<GenerationContext> {
        &self.context
    }
}

/// A point-in-time copy of a [`GenerationContext`], as returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ProgressView {
    /// Current phase.
    pub phase: Phase,
    /// Completion percentage in `[0, 100]`.
    pub percent: f64,
    /// Advisory estimate of the remaining time; zero once done.
    pub eta_seconds: u64,
    /// Whether an existing artifact was reused.
    pub cache_hit: bool,
    /// Failure message, present only for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the job finished.
    pub done: bool,
    /// Location of the artifact, present only for successful jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,
    /// When the job was accepted.
    pub started_at: Timestamp,
}
