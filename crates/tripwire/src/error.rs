// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use recoverable::{Recovery, RecoveryInfo};

/// The error returned by [`CircuitBreaker::execute`][crate::CircuitBreaker::execute].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BreakerError<E> {
    /// The circuit is open and the call was rejected without being invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The call was invoked and failed with its own error.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` if the call was rejected by an open circuit.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Borrows the error produced by the call, if it ran.
    #[must_use]
    pub const fn inner(&self) -> Option<&E> {
        match self {
            Self::Open => None,
            Self::Inner(error) => Some(error),
        }
    }

    /// Returns the error produced by the call, if it ran.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Inner(error) => Some(error),
        }
    }
}

/// A rejected call is reported as [`RecoveryInfo::unavailable`]; the call's own errors keep their classification.
impl<E: Recovery> Recovery for BreakerError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Open => RecoveryInfo::unavailable(),
            Self::Inner(error) => error.recovery(),
        }
    }
}
