// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Deduplicated, observable background generation of artifacts keyed by series and address.
//!
//! An [`Orchestrator`] ties together the building blocks of a generation service:
//!
//! - [`inflight`] runs at most one generation per [`GenerationKey`] and keeps its progress
//!   around for pollers,
//! - [`tripwire`] stops calling a failing [`Generator`] for a while,
//! - [`rebound`] retries failed attempts with jittered exponential backoff,
//! - [`tally`] records attempts, retries and failures.
//!
//! # Example
//!
//! ```
//! use dalledress::{GenerationError, GenerationKey, Generator, Orchestrator, OrchestratorOptions};
//! use inflight::{Phase, ProgressHandle};
//! use tick::Clock;
//!
//! struct Placeholder;
//!
//! impl Generator for Placeholder {
//!     async fn generate(&self, key: &GenerationKey, progress: &ProgressHandle) -> Result<String, GenerationError> {
//!         progress.set_phase(Phase::Generating);
//!         Ok(format!("output/{}/annotated/{}.png", key.series(), key.address()))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), dalledress::KeyError> {
//! let orchestrator = Orchestrator::new(Placeholder, OrchestratorOptions::default(), Clock::new_tokio());
//! let address = "0xf503017d7baf7fbc0fff7492b751025c6a78179b";
//!
//! let first = orchestrator.request("empty", address)?;
//! assert!(!first.done);
//!
//! let key = orchestrator.key("empty", address)?;
//! let last = orchestrator.wait(&key).await.unwrap();
//! assert_eq!(last.phase, Phase::Done);
//! assert_eq!(last.result_locator.as_deref(), Some(format!("output/empty/annotated/{address}.png").as_str()));
//! # Ok(())
//! # }
//! ```

mod error;
mod generator;
mod key;
mod options;
mod orchestrator;
mod resilient;

pub use error::GenerationError;
pub use generator::Generator;
pub use key::{GenerationKey, KeyError};
pub use options::OrchestratorOptions;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RequestOptions};
pub use resilient::{CallError, ResilientCall};
