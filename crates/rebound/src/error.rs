// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Why a retried operation gave up.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: E,
    },

    /// An attempt failed with an error classified as not worth retrying.
    #[error("operation failed permanently on attempt {attempt}: {error}")]
    Terminal {
        /// The attempt (1-based) that produced the error.
        attempt: u32,
        /// The permanent error.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Terminal { attempt, .. } => *attempt,
        }
    }

    /// Returns `true` if the retry budget ran out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// The error of the last attempt.
    #[must_use]
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal { error, .. } => error,
        }
    }

    /// Consumes the error and returns the error of the last attempt.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal { error, .. } => error,
        }
    }
}
