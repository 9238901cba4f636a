// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::Debug;

use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

use crate::HealthStatus;

/// A health check of one component.
///
/// Probes run synchronously and should finish quickly; the aggregator measures how long each
/// one takes and reports it.
pub trait Probe: Debug + Send + Sync {
    /// Key of the component in [`HealthCheck::components`](crate::HealthCheck::components).
    fn name(&self) -> &str;

    /// Inspects the component.
    fn check(&self) -> Observation;
}

/// What a [`Probe`] found.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub(crate) status: HealthStatus,
    pub(crate) message: String,
    pub(crate) details: BTreeMap<String, Value>,
}

impl Observation {
    /// Creates an observation without details.
    #[must_use]
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Shorthand for a [`HealthStatus::Healthy`] observation.
    #[must_use]
    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    /// Shorthand for a [`HealthStatus::Unhealthy`] observation.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Attaches a detail value.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// The observed status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// The explanation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attached details.
    #[must_use]
    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }
}

/// Result of running one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ComponentHealth {
    /// Name of the probe.
    pub name: String,
    /// What the probe concluded.
    pub status: HealthStatus,
    /// Human-readable explanation.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// How long the probe took.
    pub duration_ms: u64,
    /// When the probe finished.
    pub last_checked: Timestamp,
    /// Probe-specific values.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}
