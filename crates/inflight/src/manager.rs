// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use tick::Clock;
use tokio::task::JoinHandle;

use crate::{GenerationContext, ManagerOptions, ProgressHandle, ProgressView};

/// Tracks one [`GenerationContext`] per key and runs each key's job at most once at a time.
///
/// The first [`request`](Self::request) for a key creates a context and starts the job on the
/// Tokio runtime; later requests attach to the same context until it is evicted. Finished
/// contexts are evicted by age and by capacity, in-flight ones never are.
///
/// Clones share the same contexts.
pub struct ContextManager<K> {
    shared: Arc<Shared<K>>,
}

struct Shared<K> {
    clock: Clock,
    inner: Mutex<Inner<K>>,
}

struct Inner<K> {
    contexts: HashMap<K, Arc<GenerationContext>>,
    options: ManagerOptions,
}

impl<K> Clone for ContextManager<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> Debug for ContextManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ContextManager")
            .field("contexts", &inner.contexts.len())
            .field("options", &inner.options)
            .finish_non_exhaustive()
    }
}

impl<K> ContextManager<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    /// Creates an empty manager.
    #[must_use]
    pub fn new(options: ManagerOptions, clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                inner: Mutex::new(Inner {
                    contexts: HashMap::new(),
                    options,
                }),
            }),
        }
    }

    /// Returns the context for `key`, starting `work` if none is tracked.
    ///
    /// Never waits for the job: `work` is called to build the job's future and that future is
    /// spawned onto the current Tokio runtime. Its `Ok` value becomes the result locator, its
    /// error message (or panic message) the context's error.
    ///
    /// A failed context is returned as is; use [`invalidate`](Self::invalidate) to run the key
    /// again before it is evicted.
    pub fn request<F, Fut, E>(&self, key: K, work: F) -> Arc<GenerationContext>
    where
        F: FnOnce(ProgressHandle) -> Fut,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let context = {
            let mut inner = self.shared.inner.lock();
            if let Some(existing) = inner.contexts.get(&key) {
                tracing::event!(
                    name: "inflight.attached",
                    tracing::Level::DEBUG,
                    key = %key,
                    phase = %existing.phase(),
                );
                return Arc::clone(existing);
            }

            let context = Arc::new(GenerationContext::new(self.shared.clock.clone()));
            inner.contexts.insert(key.clone(), Arc::clone(&context));
            let evicted = inner.sweep(self.shared.clock.instant());
            report_sweep(evicted, inner.contexts.len());
            context
        };

        tracing::event!(name: "inflight.started", tracing::Level::INFO, key = %key);

        let handle = ProgressHandle::new(Arc::clone(&context));
        let job = match std::panic::catch_unwind(AssertUnwindSafe(|| work(handle))) {
            Ok(job) => job,
            Err(panic) => {
                finish(&key, &context, Err(panic_message(panic.as_ref())));
                return context;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                drop(runtime.spawn(drive(key, Arc::clone(&context), job)));
            }
            Err(error) => finish(&key, &context, Err(format!("cannot start generation: {error}"))),
        }

        context
    }

    /// Replaces the eviction settings. Takes effect at the next sweep.
    pub fn configure(&self, options: ManagerOptions) {
        self.shared.inner.lock().options = options;

        tracing::event!(
            name: "inflight.configured",
            tracing::Level::INFO,
            max_contexts = options.max_contexts,
            context_ttl_ms = u64::try_from(options.context_ttl.as_millis()).unwrap_or(u64::MAX),
        );
    }

    /// The current eviction settings.
    #[must_use]
    pub fn options(&self) -> ManagerOptions {
        self.shared.inner.lock().options
    }

    /// Number of tracked contexts, in flight or finished.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.shared.inner.lock().contexts.len()
    }

    /// The context tracked for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<GenerationContext>> {
        self.shared.inner.lock().contexts.get(key).cloned()
    }

    /// Progress of the job tracked for `key`, if any.
    #[must_use]
    pub fn progress(&self, key: &K) -> Option<ProgressView> {
        self.get(key).map(|context| context.snapshot())
    }

    /// Forgets a finished context so the next request for `key` starts over.
    ///
    /// Returns `false` when nothing is tracked for `key` or its job is still running.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.shared.inner.lock();
        let finished = inner.contexts.get(key).is_some_and(|context| context.is_done());
        if finished {
            inner.contexts.remove(key);
            tracing::event!(name: "inflight.invalidated", tracing::Level::DEBUG, key = %key);
        }
        finished
    }

    /// Evicts expired and surplus finished contexts. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Progress of every job still running.
    #[must_use]
    pub fn active(&self) -> Vec<(K, ProgressView)> {
        let running: Vec<_> = {
            let inner = self.shared.inner.lock();
            inner
                .contexts
                .iter()
                .filter(|(_, context)| !context.is_done())
                .map(|(key, context)| (key.clone(), Arc::clone(context)))
                .collect()
        };

        running
            .into_iter()
            .map(|(key, context)| (key, context.snapshot()))
            .collect()
    }

    /// Starts a task that sweeps every `interval` until the last clone of this manager is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "dropping the handle detaches the sweeper; keep it to abort the task"]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Shared<K>> = Arc::downgrade(&self.shared);
        let clock = self.shared.clock.clone();

        tokio::spawn(async move {
            loop {
                clock.delay(interval).await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.sweep();
            }
        })
    }
}

impl<K: Eq + Hash + Clone> Shared<K> {
    fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let evicted = inner.sweep(self.clock.instant());
        report_sweep(evicted, inner.contexts.len());
        evicted
    }
}

impl<K: Eq + Hash + Clone> Inner<K> {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.contexts.len();

        if self.options.ttl_enabled() {
            let ttl = self.options.context_ttl;
            self.contexts.retain(|_, context| {
                context
                    .completed_at()
                    .is_none_or(|completed| now.saturating_duration_since(completed) <= ttl)
            });
        }

        if self.options.capacity_enabled() && self.contexts.len() > self.options.max_contexts {
            let mut finished: Vec<(Instant, K)> = self
                .contexts
                .iter()
                .filter_map(|(key, context)| context.completed_at().map(|at| (at, key.clone())))
                .collect();
            finished.sort_by_key(|(at, _)| *at);

            let surplus = self.contexts.len() - self.options.max_contexts;
            for (_, key) in finished.into_iter().take(surplus) {
                self.contexts.remove(&key);
            }
        }

        before - self.contexts.len()
    }
}

fn report_sweep(evicted: usize, remaining: usize) {
    if evicted > 0 {
        tracing::event!(
            name: "inflight.evicted",
            tracing::Level::DEBUG,
            evicted = evicted,
            remaining = remaining,
        );
    }
}

async fn drive<K, Fut, E>(key: K, context: Arc<GenerationContext>, job: Fut)
where
    K: Display,
    Fut: Future<Output = Result<String, E>>,
    E: Display,
{
    let outcome = match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(locator)) => Ok(locator),
        Ok(Err(error)) => Err(error.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    };
    finish(&key, &context, outcome);
}

fn finish(key: &dyn Display, context: &GenerationContext, outcome: Result<String, String>) {
    match &outcome {
        Ok(locator) => tracing::event!(
            name: "inflight.done",
            tracing::Level::INFO,
            key = %key,
            result_locator = %locator,
        ),
        Err(message) => tracing::event!(
            name: "inflight.failed",
            tracing::Level::ERROR,
            key = %key,
            error = %message,
        ),
    }
    context.complete(outcome);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned());

    detail.map_or_else(|| "generation panicked".to_string(), |detail| format!("generation panicked: {detail}"))
}
