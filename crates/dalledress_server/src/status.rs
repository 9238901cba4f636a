// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Write as _;
use std::time::Duration;

use dalledress::{GenerationKey, Generator, Orchestrator};
use futures::StreamExt as _;
use inflight::ProgressView;
use jiff::Timestamp;
use tick::{Clock, PeriodicTimer};
use tokio::task::JoinHandle;

/// Renders active generations as a table, one row per generation, sorted by series then address.
#[must_use]
pub fn render_status(active: &[(GenerationKey, ProgressView)], now: Timestamp) -> String {
    if active.is_empty() {
        return "(no active runs)".to_string();
    }

    let mut rows: Vec<_> = active.iter().collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut table = format!(
        "{:<11} {:<13} {:>6} {:>6} {:>8} {:<12} {:<5} {}",
        "PHASE", "ADDRESS", "PCT", "ETA", "ELAPSED", "SERIES", "CACHE", "ERROR"
    );
    for (key, view) in rows {
        let elapsed = now.duration_since(view.started_at).as_secs().max(0);
        let _ = write!(
            table,
            "\n{:<11} {:<13} {:>5.1}% {:>5}s {:>7}s {:<12} {:<5} {}",
            view.phase.as_str(),
            key.short_address(),
            view.percent,
            view.eta_seconds,
            elapsed,
            key.series(),
            if view.cache_hit { "yes" } else { "no" },
            view.error.as_deref().unwrap_or(""),
        );
    }
    table
}

/// Logs the active generations of `orchestrator` every `period` until the task is aborted.
///
/// An idle orchestrator is reported once until work shows up again.
#[must_use = "dropping the handle detaches the reporter; keep it to abort the task"]
pub fn spawn_status_reporter<G: Generator>(orchestrator: Orchestrator<G>, clock: Clock, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = PeriodicTimer::new(&clock, period);
        let mut idle = false;

        while timer.next().await.is_some() {
            let active = orchestrator.active();
            if active.is_empty() && idle {
                continue;
            }
            idle = active.is_empty();

            tracing::event!(
                name: "dalledress_server.status",
                tracing::Level::INFO,
                active = active.len(),
                contexts = orchestrator.context_count(),
                "\n{}",
                render_status(&active, clock.system_time_as()),
            );
        }
    })
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use dalledress::{GenerationError, OrchestratorOptions};
    use inflight::{Phase, ProgressHandle};
    use tick::ClockControl;

    use super::*;

    const ADDRESS: &str = "0xf503017d7baf7fbc0fff7492b751025c6a78179b";

    struct Stuck;

    impl Generator for Stuck {
        async fn generate(&self, _key: &GenerationKey, progress: &ProgressHandle) -> Result<String, GenerationError> {
            progress.set_phase(Phase::Generating);
            progress.set_percent(42.0);
            std::future::pending().await
        }
    }

    #[test]
    fn idle() {
        assert_eq!(render_status(&[], Timestamp::UNIX_EPOCH), "(no active runs)");
    }

    #[tokio::test]
    async fn one_row_per_active_generation() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let orchestrator = Orchestrator::new(Stuck, OrchestratorOptions::default(), clock.clone());
        let key = orchestrator.key("empty", ADDRESS).unwrap();

        orchestrator.request("empty", ADDRESS).unwrap();
        while orchestrator.progress(&key).unwrap().phase != Phase::Generating {
            tokio::task::yield_now().await;
        }
        control.advance(Duration::from_secs(3));

        let table = render_status(&orchestrator.active(), clock.system_time_as());
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("PHASE"));
        for expected in ["Generating", "0xf503…179b", "42.0%", "3s", "empty", "no"] {
            assert!(lines[1].contains(expected), "missing {expected} in {}", lines[1]);
        }
    }
}
