// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

const DEFAULT_MAX_CONTEXTS: usize = 1000;
const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(10 * 60);

/// Eviction settings for a [`ContextManager`](crate::ContextManager).
///
/// A zero value disables the corresponding kind of eviction. With both disabled the manager
/// keeps every context it ever created.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use inflight::ManagerOptions;
///
/// let options = ManagerOptions::default()
///     .max_contexts(2)
///     .context_ttl(Duration::from_millis(200));
///
/// assert_eq!(options.get_max_contexts(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub(crate) max_contexts: usize,
    pub(crate) context_ttl: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_contexts: DEFAULT_MAX_CONTEXTS,
            context_ttl: DEFAULT_CONTEXT_TTL,
        }
    }
}

impl ManagerOptions {
    /// Creates options with both limits given explicitly.
    #[must_use]
    pub const fn new(max_contexts: usize, context_ttl: Duration) -> Self {
        Self { max_contexts, context_ttl }
    }

    /// Maximum number of tracked contexts before completed ones are evicted, oldest first.
    #[must_use]
    pub const fn max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts;
        self
    }

    /// How long a finished context is kept after it completed.
    #[must_use]
    pub const fn context_ttl(mut self, context_ttl: Duration) -> Self {
        self.context_ttl = context_ttl;
        self
    }

    /// The configured capacity.
    #[must_use]
    pub const fn get_max_contexts(&self) -> usize {
        self.max_contexts
    }

    /// The configured time to live.
    #[must_use]
    pub const fn get_context_ttl(&self) -> Duration {
        self.context_ttl
    }

    pub(crate) const fn ttl_enabled(&self) -> bool {
        !self.context_ttl.is_zero()
    }

    pub(crate) const fn capacity_enabled(&self) -> bool {
        self.max_contexts > 0
    }
}
