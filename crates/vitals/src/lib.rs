// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Liveness, readiness and component health for a long-running service.
//!
//! A [`HealthAggregator`] owns a list of [`Probe`]s. [`HealthAggregator::check_health`] runs
//! each of them, records how long it took, and reduces the results: any unhealthy component
//! makes the service unhealthy, otherwise any degraded component makes it degraded.
//!
//! ```
//! use tick::Clock;
//! use vitals::{FileSystemProbe, HealthAggregator, HealthStatus};
//!
//! let dir = tempfile::tempdir()?;
//! let aggregator = HealthAggregator::new("1.0.0", Clock::new_frozen())
//!     .with_probe(FileSystemProbe::new(dir.path()));
//!
//! let report = aggregator.check_health();
//! assert_eq!(report.status, HealthStatus::Healthy);
//! assert_eq!(report.components["filesystem"].message, "File system accessible");
//! # Ok::<(), std::io::Error>(())
//! ```

mod aggregator;
mod probe;
mod probes;
mod status;
mod system;

pub use aggregator::{HealthAggregator, HealthCheck, Liveness, Readiness};
pub use probe::{ComponentHealth, Observation, Probe};
pub use probes::{BreakerProbe, DiskSpaceProbe, FileSystemProbe, MemoryProbe};
pub use status::HealthStatus;
pub use system::{MemoryStats, RuntimeStats, SystemHealth};
