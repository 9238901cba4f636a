// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Service metrics with latency percentiles and Prometheus text exposition.
//!
//! A [`MetricsCollector`] counts errors, retries, external requests and file operations,
//! mirrors a [`tripwire::CircuitBreaker`], and keeps a window of the most recent
//! [`SAMPLE_WINDOW`] response times. Readers take a [`MetricsSnapshot`], an independent
//! copy that never aliases the collector's state.
//!
//! ```
//! use tally::MetricsCollector;
//! use tick::Clock;
//!
//! let collector = MetricsCollector::new(Clock::new_frozen());
//! collector.record_error("INVALID_ADDRESS", "dalle");
//! collector.record_response_time(42);
//!
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.errors_by_code["INVALID_ADDRESS"], 1);
//! assert!(collector.prometheus()?.contains("dalleserver_errors_total 1"));
//! # Ok::<(), prometheus::Error>(())
//! ```

mod collector;
mod exposition;
mod latency;
mod snapshot;

pub use collector::MetricsCollector;
pub use exposition::{NAMESPACE, error_report, prometheus};
pub use latency::{MIN_SAMPLES_FOR_PERCENTILES, ResponseTimes, SAMPLE_WINDOW};
pub use snapshot::MetricsSnapshot;
