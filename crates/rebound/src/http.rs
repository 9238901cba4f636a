// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};
use std::future::Future;

use recoverable::RecoveryInfo;

use crate::{Retry, RetryError};

/// A failed HTTP exchange: the error and the response status, if a response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure<E> {
    /// The status code, or `None` for transport failures such as timeouts and refused connections.
    pub status: Option<u16>,
    /// The underlying error.
    pub error: E,
}

impl<E> HttpFailure<E> {
    /// A failure that produced a response with `status`.
    pub const fn with_status(status: u16, error: E) -> Self {
        Self {
            status: Some(status),
            error,
        }
    }

    /// A failure that produced no response.
    pub const fn transport(error: E) -> Self {
        Self { status: None, error }
    }
}

/// An [`HttpFailure`] labeled with the request it belongs to and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAttemptError<E> {
    request_id: String,
    status: Option<u16>,
    retryable: bool,
    error: E,
}

impl<E> HttpAttemptError<E> {
    /// The request identifier passed to [`Retry::retryable_http_operation`].
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The response status, if a response arrived.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the classifier considered the failure retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// The underlying error.
    #[must_use]
    pub const fn error(&self) -> &E {
        &self.error
    }

    /// Consumes the wrapper and returns the underlying error.
    #[must_use]
    pub fn into_error(self) -> E {
        self.error
    }
}

impl<E: Display> Display for HttpAttemptError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = if self.retryable { "retryable" } else { "non-retryable" };
        write!(f, "[{}] {kind} error (status {}): {}", self.request_id, self.status.unwrap_or(0), self.error)
    }
}

impl<E: fmt::Debug + Display> std::error::Error for HttpAttemptError<E> {}

/// The default HTTP classifier.
///
/// Transport failures, 408, 429 and 5xx are retryable; every other status is permanent.
#[must_use]
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(code) => code == 408 || code == 429 || (500..600).contains(&code),
    }
}

impl Retry {
    /// Attempts an HTTP `operation`, classifying each failure with `classifier`.
    ///
    /// `classifier` receives the error and status code and returns whether another attempt is
    /// worthwhile; [`is_retryable_status`] is a sensible default. Failures are labeled with
    /// `request_id` so log lines and the returned error identify the request.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] on the first failure the classifier rejects, and
    /// [`RetryError::Exhausted`] when retryable failures use up the attempt budget.
    pub async fn retryable_http_operation<C, F, Fut, T, E>(
        &self,
        request_id: &str,
        classifier: C,
        mut operation: F,
    ) -> Result<T, RetryError<HttpAttemptError<E>>>
    where
        C: Fn(&E, Option<u16>) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, HttpFailure<E>>>,
        E: Display,
    {
        let classifier = &classifier;

        self.retry_classified(
            |failure: &HttpAttemptError<E>| {
                if failure.retryable {
                    RecoveryInfo::retry()
                } else {
                    RecoveryInfo::never()
                }
            },
            move |attempt| {
                let pending = operation(attempt);
                async move {
                    pending.await.map_err(|failure| HttpAttemptError {
                        request_id: request_id.to_string(),
                        status: failure.status,
                        retryable: classifier(&failure.error, failure.status),
                        error: failure.error,
                    })
                }
            },
        )
        .await
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, true)]
    #[case(Some(408), true)]
    #[case(Some(429), true)]
    #[case(Some(500), true)]
    #[case(Some(503), true)]
    #[case(Some(599), true)]
    #[case(Some(400), false)]
    #[case(Some(401), false)]
    #[case(Some(403), false)]
    #[case(Some(404), false)]
    #[case(Some(600), false)]
    fn default_classifier(#[case] status: Option<u16>, #[case] retryable: bool) {
        assert_eq!(is_retryable_status(status), retryable);
    }

    #[test]
    fn attempt_error_message() {
        let error = HttpAttemptError {
            request_id: "a1b2c3d4".to_string(),
            status: Some(503),
            retryable: true,
            error: "service unavailable",
        };
        assert_eq!(
            error.to_string(),
            "[a1b2c3d4] retryable error (status 503): service unavailable"
        );

        let error = HttpAttemptError {
            request_id: "a1b2c3d4".to_string(),
            status: None,
            retryable: false,
            error: "bad key",
        };
        assert_eq!(error.to_string(), "[a1b2c3d4] non-retryable error (status 0): bad key");
    }
}
