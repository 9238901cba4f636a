// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;

use inflight::ProgressHandle;

use crate::{GenerationError, GenerationKey};

/// The external work an [`Orchestrator`][crate::Orchestrator] coordinates.
///
/// Implementations are shared by every in-flight generation, so they must be cheap to call
/// concurrently for different keys. The orchestrator guarantees that `generate` never runs
/// twice at the same time for the same key.
pub trait Generator: Send + Sync + 'static {
    /// Returns the locator of an already produced artifact for `key`, if there is one.
    ///
    /// A hit completes the generation immediately, without touching the circuit breaker or
    /// the retry budget. The default never hits.
    fn lookup(&self, key: &GenerationKey) -> Option<String> {
        let _ = key;
        None
    }

    /// Produces the artifact for `key` and returns its locator.
    ///
    /// Called once per attempt. `progress` may be used to report phases, percentage and an
    /// estimated time of arrival.
    fn generate(
        &self,
        key: &GenerationKey,
        progress: &ProgressHandle,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}
