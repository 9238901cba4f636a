// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Single-flight background jobs per key with observable progress.
//!
//! A [`ContextManager`] maps keys to [`GenerationContext`]s. The first request for a key
//! starts the job on a background task; every later request for the same key attaches to
//! the same context instead of starting the job again. Callers never wait on the job:
//! they poll the context, or a [`ProgressView`] copy of it, until it reports `done`.
//!
//! Finished contexts stay around so pollers can observe the outcome, including failures,
//! and are evicted once older than the configured time to live or when the manager holds
//! more than its configured capacity. A context whose job is still running is never
//! evicted.
//!
//! # Example
//!
//! ```
//! use inflight::{ContextManager, ManagerOptions, Phase};
//! use tick::Clock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = ContextManager::new(ManagerOptions::default(), Clock::new_tokio());
//!
//! let context = manager.request("punks/0x01".to_string(), |progress| async move {
//!     progress.set_phase(Phase::Generating);
//!     Ok::<_, String>("output/punks/0x01.png".to_string())
//! });
//!
//! // A second request attaches to the running job.
//! let again = manager.request("punks/0x01".to_string(), |_| async { Ok::<_, String>(String::new()) });
//! assert!(std::sync::Arc::ptr_eq(&context, &again));
//!
//! context.finished().await;
//! assert_eq!(context.phase(), Phase::Done);
//! assert_eq!(context.result_locator().as_deref(), Some("output/punks/0x01.png"));
//! # }
//! ```

mod context;
mod manager;
mod options;
mod phase;

pub use context::{GenerationContext, ProgressHandle, ProgressView};
pub use manager::ContextManager;
pub use options::ManagerOptions;
pub use phase::Phase;
