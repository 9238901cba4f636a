// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Bounded retries with exponential backoff and jitter.
//!
//! A [`RetryPolicy`] describes the attempt budget and the backoff schedule. A [`Retry`]
//! runs operations under a policy, sleeping on a [`tick::Clock`] between attempts:
//!
//! - [`Retry::retry_with_backoff`] retries every failure.
//! - [`Retry::retry_classified`] and [`Retry::retry_recoverable`] stop as soon as a failure is
//!   classified as permanent through [`recoverable::RecoveryInfo`].
//! - [`Retry::retryable_http_operation`] classifies by HTTP status code.
//!
//! ```
//! use std::time::Duration;
//!
//! use rebound::{Retry, RetryError, RetryPolicy};
//! use tick::Clock;
//!
//! # async fn example(clock: Clock) {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1), 2.0);
//! let retry = Retry::new(policy, clock).name("upload");
//!
//! let result = retry
//!     .retry_with_backoff(|attempt| async move {
//!         if attempt < 3 { Err("busy") } else { Ok(attempt) }
//!     })
//!     .await;
//!
//! assert_eq!(result.ok(), Some(3));
//! # }
//! ```
//!
//! Retries are logged as `rebound.retry` events at WARN level.

mod error;
mod http;
mod policy;
mod retry;
mod rnd;

pub use error::RetryError;
pub use http::{HttpAttemptError, HttpFailure, is_retryable_status};
pub use policy::RetryPolicy;
pub use retry::{Retry, RetryAttempt};
