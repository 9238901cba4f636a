// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
use tick::Clock;

use crate::{RetryError, RetryPolicy};

type OnRetry = Arc<dyn Fn(&RetryAttempt<'_>) + Send + Sync>;

/// Details of a failed attempt that is about to be retried.
pub struct RetryAttempt<'a> {
    name: &'a str,
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
    error: &'a dyn Display,
}

impl Debug for RetryAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAttempt")
            .field("name", &self.name)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("error", &format_args!("{}", self.error))
            .finish()
    }
}

impl RetryAttempt<'_> {
    /// Name of the [`Retry`] reporting the attempt.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// The attempt (1-based) that just failed.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// How long the retry loop sleeps before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The error of the failed attempt.
    #[must_use]
    pub fn error(&self) -> &dyn Display {
        self.error
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// Sleeps between attempts use the supplied [`Clock`], so tests can drive the
/// schedule with a controlled clock.
#[derive(Clone)]
pub struct Retry {
    name: Cow<'static, str>,
    policy: RetryPolicy,
    clock: Clock,
    handle_unavailable: bool,
    on_retry: Option<OnRetry>,
}

impl Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("handle_unavailable", &self.handle_unavailable)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

enum Stop {
    Terminal,
    Exhausted,
}

impl Retry {
    /// Creates a retry runner.
    #[must_use]
    pub fn new(policy: RetryPolicy, clock: Clock) -> Self {
        Self {
            name: Cow::Borrowed("retry"),
            policy,
            clock,
            handle_unavailable: false,
            on_retry: None,
        }
    }

    /// Sets the name reported in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether failures classified as [`RecoveryKind::Unavailable`] are retried.
    ///
    /// Off by default: an unavailable dependency, such as one behind an open circuit
    /// breaker, fails the operation immediately.
    #[must_use]
    pub fn handle_unavailable(mut self, enabled: bool) -> Self {
        self.handle_unavailable = enabled;
        self
    }

    /// Registers a callback invoked before each sleep between attempts.
    #[must_use]
    pub fn on_retry(mut self, callback: impl Fn(&RetryAttempt<'_>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempts `operation` until it succeeds or the attempt budget is spent, retrying every failure.
    ///
    /// `operation` receives the attempt number, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] with the last error when every attempt fails.
    pub async fn retry_with_backoff<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_classified(|_| RecoveryInfo::retry(), operation).await
    }

    /// Attempts `operation`, consulting `classify` after each failure.
    ///
    /// Failures classified as [`RecoveryKind::Retry`] are retried. [`RecoveryKind::Never`],
    /// [`RecoveryKind::Unknown`] and, unless enabled through [`Self::handle_unavailable`],
    /// [`RecoveryKind::Unavailable`] end the loop immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] for a failure that is not retried and
    /// [`RetryError::Exhausted`] when the attempt budget runs out.
    pub async fn retry_classified<C, F, Fut, T, E>(&self, mut classify: C, mut operation: F) -> Result<T, RetryError<E>>
    where
        C: FnMut(&E) -> RecoveryInfo,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.evaluate(attempt, &classify(&error), &error) {
                ControlFlow::Continue(delay) => {
                    self.clock.delay(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                ControlFlow::Break(Stop::Terminal) => return Err(RetryError::Terminal { attempt, error }),
                ControlFlow::Break(Stop::Exhausted) => return Err(RetryError::Exhausted { attempts: attempt, last: error }),
            }
        }
    }

    /// Attempts `operation`, classifying failures through their [`Recovery`] implementation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::retry_classified`].
    pub async fn retry_recoverable<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + Recovery,
    {
        self.retry_classified(|error: &E| error.recovery(), operation).await
    }

    fn evaluate(&self, attempt: u32, recovery: &RecoveryInfo, error: &dyn Display) -> ControlFlow<Stop, Duration> {
        let max_attempts = self.policy.max_attempts();

        if !self.is_recoverable(recovery) {
            tracing::event!(
                name: "rebound.terminal",
                tracing::Level::DEBUG,
                retry.name = %self.name,
                retry.attempt = attempt,
                retry.recovery = %recovery.kind(),
                error = %error,
            );
            return ControlFlow::Break(Stop::Terminal);
        }

        if attempt >= max_attempts {
            tracing::event!(
                name: "rebound.exhausted",
                tracing::Level::WARN,
                retry.name = %self.name,
                retry.attempts = attempt,
                error = %error,
            );
            return ControlFlow::Break(Stop::Exhausted);
        }

        let delay = self.policy.delay_for(attempt);

        tracing::event!(
            name: "rebound.retry",
            tracing::Level::WARN,
            retry.name = %self.name,
            retry.attempt = attempt,
            retry.max_attempts = max_attempts,
            retry.delay = delay.as_secs_f32(),
            error = %error,
        );

        if let Some(on_retry) = &self.on_retry {
            on_retry(&RetryAttempt {
                name: &self.name,
                attempt,
                max_attempts,
                delay,
                error,
            });
        }

        ControlFlow::Continue(delay)
    }

    fn is_recoverable(&self, recovery: &RecoveryInfo) -> bool {
        match recovery.kind() {
            RecoveryKind::Retry => true,
            RecoveryKind::Unavailable => self.handle_unavailable,
            RecoveryKind::Never | RecoveryKind::Unknown | _ => false,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tick::ClockControl;
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::rnd::Rnd;

    static_assertions::assert_impl_all!(Retry: Send, Sync, Clone);

    #[derive(Debug, Clone, Default)]
    struct LogCapture {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        fn output(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
        }

        fn subscriber(&self) -> impl tracing::Subscriber {
            tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
        }
    }

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn fixed_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30), 2.0).with_rnd(Rnd::new_fixed(0.5))
    }

    #[tokio::test]
    async fn sleeps_the_unjittered_schedule_with_centered_jitter() {
        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let retry = Retry::new(fixed_policy(4), clock.clone());
        let stopwatch = clock.stopwatch();

        let result = retry.retry_with_backoff(|_| async { Err::<(), _>("nope") }).await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 4, .. })));
        // 1s + 2s + 4s, nothing after the final attempt.
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn unavailable_stops_unless_enabled() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let calls = AtomicU32::new(0);

        let result = Retry::new(fixed_policy(3), clock.clone())
            .retry_classified(
                |_: &&str| RecoveryInfo::unavailable(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("circuit open") }
                },
            )
            .await;
        assert!(matches!(result, Err(RetryError::Terminal { attempt: 1, .. })));
        assert_eq!(calls.swap(0, Ordering::SeqCst), 1);

        let result = Retry::new(fixed_policy(3), clock)
            .handle_unavailable(true)
            .retry_classified(
                |_: &&str| RecoveryInfo::unavailable(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("circuit open") }
                },
            )
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_is_not_retried() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();

        let result = Retry::new(fixed_policy(3), clock)
            .retry_classified(|_: &&str| RecoveryInfo::unknown(), |_| async { Err::<(), _>("odd") })
            .await;

        assert!(matches!(result, Err(RetryError::Terminal { attempt: 1, error: "odd" })));
    }

    #[tokio::test]
    async fn retry_emits_log() {
        let capture = LogCapture::default();
        let _guard = capture.subscriber().set_default();
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();

        let _ = Retry::new(fixed_policy(2), clock)
            .name("log_test")
            .retry_with_backoff(|_| async { Err::<(), _>("flaky upstream") })
            .await;

        let output = capture.output();
        assert!(output.contains("log_test"), "{output}");
        assert!(output.contains("retry.attempt=1"), "{output}");
        assert!(output.contains("flaky upstream"), "{output}");
    }

    #[test]
    fn debug_hides_callback() {
        let retry = Retry::new(RetryPolicy::generic(), ClockControl::new().to_clock()).on_retry(|_| {});

        let debug = format!("{retry:?}");
        assert!(debug.contains("on_retry: true"), "{debug}");
    }
}
