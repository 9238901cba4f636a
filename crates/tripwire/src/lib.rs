// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A circuit breaker for async calls to an unreliable dependency.
//!
//! [`CircuitBreaker`] tracks consecutive failures of the calls passed to
//! [`CircuitBreaker::execute`] and moves between three states:
//!
//! - [`CircuitState::Closed`]: calls run normally. Reaching the failure threshold opens the circuit.
//! - [`CircuitState::Open`]: calls are rejected with [`BreakerError::Open`] and never invoked.
//!   Once the reset timeout has elapsed since the last failure, the next call is admitted as a probe.
//! - [`CircuitState::HalfOpen`]: probe calls run. A failed probe re-opens the circuit, and enough
//!   consecutive successful probes close it.
//!
//! A single breaker serializes the calls it guards: the check, the call itself, and the bookkeeping
//! happen under one exclusive async lock. The work passed to [`CircuitBreaker::execute`] must therefore
//! not call back into the same breaker.
//!
//! # Example
//!
//! ```
//! use tick::Clock;
//! use tripwire::{BreakerError, CircuitBreaker, CircuitBreakerOptions, CircuitState};
//!
//! # async fn example(clock: Clock) {
//! let breaker = CircuitBreaker::new(CircuitBreakerOptions::default().failure_threshold(1), clock);
//!
//! let first = breaker.execute(|| async { Err::<(), _>("boom") }).await;
//! assert!(matches!(first, Err(BreakerError::Inner("boom"))));
//! assert_eq!(breaker.state(), CircuitState::Open);
//!
//! let second = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
//! assert!(matches!(second, Err(BreakerError::Open)));
//! # }
//! ```
//!
//! Every state transition is reported as a `tracing` event named `tripwire.<transition>`.

mod breaker;
mod engine;
mod error;
mod metrics;
mod options;
mod state;

pub use breaker::CircuitBreaker;
pub use error::BreakerError;
pub use metrics::BreakerMetrics;
pub use options::CircuitBreakerOptions;
pub use state::CircuitState;
