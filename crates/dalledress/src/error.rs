// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use rebound::is_retryable_status;
use recoverable::{Recovery, RecoveryInfo};

/// A failed attempt at producing an artifact.
///
/// Each variant carries its own retry classification through [`Recovery`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// The attempt did not finish within its deadline.
    #[error("generation attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The external dependency answered with an error status.
    #[error("generator returned status {status}: {message}")]
    Status {
        /// HTTP-style status code.
        status: u16,
        /// Message returned with the status.
        message: String,
    },

    /// The external dependency could not be reached.
    #[error("generator unreachable: {0}")]
    Transport(String),

    /// The request cannot succeed no matter how often it is tried.
    #[error("invalid generation request: {0}")]
    Invalid(String),

    /// Reading or writing an artifact failed.
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        /// What was being done, e.g. `"write"`.
        operation: &'static str,
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl GenerationError {
    /// Shorthand for [`GenerationError::Io`].
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the attempt ran out of time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl Recovery for GenerationError {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Timeout(_) | Self::Transport(_) => RecoveryInfo::retry(),
            Self::Status { status, .. } if is_retryable_status(Some(*status)) => RecoveryInfo::retry(),
            Self::Status { .. } | Self::Invalid(_) => RecoveryInfo::never(),
            Self::Io { source, .. } => match source.kind() {
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RecoveryInfo::retry(),
                _ => RecoveryInfo::never(),
            },
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use recoverable::RecoveryKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::timeout(GenerationError::Timeout(Duration::from_secs(1)), RecoveryKind::Retry)]
    #[case::transport(GenerationError::Transport("reset".into()), RecoveryKind::Retry)]
    #[case::rate_limited(GenerationError::Status { status: 429, message: "slow down".into() }, RecoveryKind::Retry)]
    #[case::server_error(GenerationError::Status { status: 503, message: "busy".into() }, RecoveryKind::Retry)]
    #[case::bad_request(GenerationError::Status { status: 400, message: "bad prompt".into() }, RecoveryKind::Never)]
    #[case::invalid(GenerationError::Invalid("empty prompt".into()), RecoveryKind::Never)]
    #[case::io_interrupted(
        GenerationError::io("write", "a.png", io::Error::from(io::ErrorKind::Interrupted)),
        RecoveryKind::Retry
    )]
    #[case::io_denied(
        GenerationError::io("write", "a.png", io::Error::from(io::ErrorKind::PermissionDenied)),
        RecoveryKind::Never
    )]
    fn classification(#[case] error: GenerationError, #[case] expected: RecoveryKind) {
        assert_eq!(error.recovery().kind(), expected);
    }

    #[test]
    fn messages() {
        assert_eq!(
            GenerationError::Status {
                status: 400,
                message: "bad prompt".into()
            }
            .to_string(),
            "generator returned status 400: bad prompt"
        );
        assert_eq!(
            GenerationError::io("write", "out/a.png", io::Error::other("disk full")).to_string(),
            "failed to write out/a.png: disk full"
        );
        assert!(GenerationError::Timeout(Duration::from_secs(2)).is_timeout());
    }
}
