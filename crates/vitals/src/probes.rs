// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tripwire::{CircuitBreaker, CircuitState};

use crate::{HealthStatus, MemoryStats, Observation, Probe};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Checks that a directory accepts writes by creating and removing a sentinel file.
#[derive(Debug, Clone)]
pub struct FileSystemProbe {
    dir: PathBuf,
}

impl FileSystemProbe {
    /// Probes `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_sentinel(&self) -> io::Result<()> {
        let mut file = tempfile::Builder::new().prefix(".write_test_").tempfile_in(&self.dir)?;
        file.write_all(b"test")?;
        file.as_file().sync_all()?;
        file.close()
    }
}

impl Probe for FileSystemProbe {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn check(&self) -> Observation {
        let observation = match self.write_sentinel() {
            Ok(()) => Observation::healthy("File system accessible"),
            Err(error) => Observation::unhealthy(format!("File system write access failed: {error}")),
        };
        observation.detail("path", self.dir.display().to_string())
    }
}

/// Reports the state of a circuit breaker guarding an external dependency.
///
/// Closed is healthy, half-open degraded and open unhealthy.
#[derive(Debug, Clone)]
pub struct BreakerProbe {
    name: Cow<'static, str>,
    breaker: CircuitBreaker,
}

impl BreakerProbe {
    /// Reports `breaker` under the component name `name`.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, breaker: CircuitBreaker) -> Self {
        Self {
            name: name.into(),
            breaker,
        }
    }
}

impl Probe for BreakerProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Observation {
        let metrics = self.breaker.metrics();
        let observation = match metrics.state {
            CircuitState::Closed => Observation::healthy(format!("{} circuit breaker closed", self.name)),
            CircuitState::HalfOpen => Observation::new(
                HealthStatus::Degraded,
                format!("{} circuit breaker half-open (recovering)", self.name),
            ),
            CircuitState::Open => Observation::unhealthy(format!("{} circuit breaker open (failing)", self.name)),
        };

        observation
            .detail("state", metrics.state.as_str())
            .detail("failures", metrics.total_failures)
            .detail("successes", metrics.total_successes)
            .detail("rejections", metrics.total_rejections)
            .detail("last_failure", metrics.last_failure_time.map(|at| at.to_string()))
    }
}

/// Checks the resident memory of the current process.
#[derive(Debug, Clone, Copy)]
pub struct MemoryProbe {
    degraded_bytes: u64,
    unhealthy_bytes: u64,
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self {
            degraded_bytes: GIB,
            unhealthy_bytes: 2 * GIB,
        }
    }
}

impl MemoryProbe {
    /// Reports degraded above `degraded_bytes` and unhealthy above `unhealthy_bytes`.
    #[must_use]
    pub const fn with_thresholds(degraded_bytes: u64, unhealthy_bytes: u64) -> Self {
        Self {
            degraded_bytes,
            unhealthy_bytes,
        }
    }

    fn classify(&self, stats: MemoryStats) -> Observation {
        let resident_mb = stats.resident_bytes / MIB;
        let observation = if stats.resident_bytes > self.unhealthy_bytes {
            Observation::unhealthy(format!("Very high memory usage: {resident_mb} MB resident"))
        } else if stats.resident_bytes > self.degraded_bytes {
            Observation::new(HealthStatus::Degraded, format!("High memory usage: {resident_mb} MB resident"))
        } else {
            Observation::healthy(format!("Memory usage normal: {resident_mb} MB resident"))
        };

        observation
            .detail("resident_mb", resident_mb)
            .detail("virtual_mb", stats.virtual_bytes / MIB)
    }
}

impl Probe for MemoryProbe {
    fn name(&self) -> &str {
        "memory"
    }

    fn check(&self) -> Observation {
        MemoryStats::current().map_or_else(
            || Observation::new(HealthStatus::Degraded, "Memory usage unavailable"),
            |stats| self.classify(stats),
        )
    }
}

/// Space on the file system holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiskUsage {
    total: u64,
    free: u64,
    available: u64,
}

impl DiskUsage {
    fn of(path: &Path) -> io::Result<Self> {
        Ok(Self {
            total: fs2::total_space(path)?,
            free: fs2::free_space(path)?,
            available: fs2::available_space(path)?,
        })
    }

    #[expect(clippy::cast_precision_loss, reason = "percentages do not need every byte")]
    fn used_percent(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total.saturating_sub(self.free) as f64 / self.total as f64 * 100.0
    }
}

/// Checks how full the file system holding a path is.
#[derive(Debug, Clone)]
pub struct DiskSpaceProbe {
    path: PathBuf,
    degraded_percent: f64,
    unhealthy_percent: f64,
}

impl DiskSpaceProbe {
    /// Probes the file system holding `path`, degraded above 85 % used and unhealthy above 95 %.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            degraded_percent: 85.0,
            unhealthy_percent: 95.0,
        }
    }

    /// Overrides the usage percentages at which the probe reports degraded and unhealthy.
    #[must_use]
    pub fn with_thresholds(mut self, degraded_percent: f64, unhealthy_percent: f64) -> Self {
        self.degraded_percent = degraded_percent;
        self.unhealthy_percent = unhealthy_percent;
        self
    }

    fn classify(&self, usage: DiskUsage) -> Observation {
        let used = usage.used_percent();
        let observation = if used > self.unhealthy_percent {
            Observation::unhealthy(format!("Critical disk space: {used:.1}% used"))
        } else if used > self.degraded_percent {
            Observation::new(HealthStatus::Degraded, format!("Low disk space: {used:.1}% used"))
        } else {
            Observation::healthy(format!("Disk space healthy: {used:.1}% used"))
        };

        observation
            .detail("free_gb", usage.available / GIB)
            .detail("total_gb", usage.total / GIB)
            .detail("usage_percent", (used * 10.0).round() / 10.0)
    }
}

impl Probe for DiskSpaceProbe {
    fn name(&self) -> &str {
        "disk_space"
    }

    fn check(&self) -> Observation {
        match DiskUsage::of(&self.path) {
            Ok(usage) => self.classify(usage),
            Err(error) => Observation::unhealthy(format!("Failed to check disk space: {error}")),
        }
    }
}
