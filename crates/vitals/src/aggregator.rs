// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use serde::Serialize;
use tick::Clock;

use crate::{ComponentHealth, HealthStatus, Observation, Probe, SystemHealth};

/// Runs health probes and reduces them to one status.
///
/// Clones share the probes and the start time.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    version: Cow<'static, str>,
    clock: Clock,
    started: Instant,
    probes: Vec<Arc<dyn Probe>>,
}

/// Full health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HealthCheck {
    /// Worst status of all components.
    pub status: HealthStatus,
    /// When the check ran.
    pub timestamp: Timestamp,
    /// Version of the service.
    pub version: String,
    /// Time since the aggregator was created.
    pub uptime_seconds: u64,
    /// One entry per probe, keyed by probe name.
    pub components: BTreeMap<String, ComponentHealth>,
    /// Process-level figures.
    pub system: SystemHealth,
}

/// Answer to "is the process serving at all".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct Liveness {
    /// Always `"alive"`.
    pub status: &'static str,
    /// When the check ran.
    pub timestamp: Timestamp,
    /// Time since the aggregator was created.
    pub uptime_seconds: u64,
}

/// Answer to "should traffic be sent to this process".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Readiness {
    /// `true` unless the overall status is unhealthy.
    pub ready: bool,
    /// `"ready"` or `"not_ready"`.
    pub status: &'static str,
    /// The overall status the decision was based on.
    pub health: HealthStatus,
    /// When the check ran.
    pub timestamp: Timestamp,
    /// One entry per probe, keyed by probe name.
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthAggregator {
    /// Creates an aggregator without probes, reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<Cow<'static, str>>, clock: Clock) -> Self {
        Self {
            version: version.into(),
            started: clock.instant(),
            clock,
            probes: Vec::new(),
        }
    }

    /// Adds a probe. A probe with the same name as an earlier one replaces it in reports.
    #[must_use]
    pub fn with_probe(mut self, probe: impl Probe + 'static) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    /// Time since the aggregator was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.clock.instant().saturating_duration_since(self.started)
    }

    /// Runs every probe and reports the result.
    ///
    /// Each probe runs on its own: a panicking probe is reported as an unhealthy component and
    /// the remaining probes still run.
    #[must_use]
    pub fn check_health(&self) -> HealthCheck {
        let components = self.run_probes();
        let status = HealthStatus::worst(components.values().map(|c| c.status));

        HealthCheck {
            status,
            timestamp: self.clock.system_time_as(),
            version: self.version.to_string(),
            uptime_seconds: self.uptime().as_secs(),
            components,
            system: SystemHealth::collect(),
        }
    }

    /// Reports the process alive without running any probe.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        Liveness {
            status: "alive",
            timestamp: self.clock.system_time_as(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }

    /// Runs every probe and reports ready unless the result is unhealthy.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        let components = self.run_probes();
        let health = HealthStatus::worst(components.values().map(|c| c.status));
        let ready = health != HealthStatus::Unhealthy;

        Readiness {
            ready,
            status: if ready { "ready" } else { "not_ready" },
            health,
            timestamp: self.clock.system_time_as(),
            components,
        }
    }

    fn run_probes(&self) -> BTreeMap<String, ComponentHealth> {
        self.probes
            .iter()
            .map(|probe| {
                let component = self.run(probe.as_ref());
                (component.name.clone(), component)
            })
            .collect()
    }

    fn run(&self, probe: &dyn Probe) -> ComponentHealth {
        let stopwatch = self.clock.stopwatch();
        let observation = match panic::catch_unwind(AssertUnwindSafe(|| probe.check())) {
            Ok(observation) => observation,
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                tracing::event!(
                    name: "vitals.probe_panicked",
                    tracing::Level::ERROR,
                    probe = probe.name(),
                    reason = %reason,
                );
                Observation::unhealthy(format!("health probe panicked: {reason}"))
            }
        };

        if observation.status != HealthStatus::Healthy {
            tracing::event!(
                name: "vitals.component_unhealthy",
                tracing::Level::WARN,
                probe = probe.name(),
                status = %observation.status,
                message = %observation.message,
            );
        }

        ComponentHealth {
            name: probe.name().to_string(),
            status: observation.status,
            message: observation.message,
            duration_ms: u64::try_from(stopwatch.elapsed().as_millis()).unwrap_or(u64::MAX),
            last_checked: self.clock.system_time_as(),
            details: observation.details,
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}
