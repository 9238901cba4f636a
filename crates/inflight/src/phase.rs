// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Stage of a generation job.
///
/// Phases are ordered; a running job only moves forward and a finished job never changes phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Phase {
    /// Accepted but not started.
    #[default]
    Queued,
    /// Preparing the input, for example enhancing a prompt.
    Enhancing,
    /// Waiting on the external generator.
    Generating,
    /// Post-processing the generated artifact.
    Annotating,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl Phase {
    /// Returns `true` for [`Phase::Done`] and [`Phase::Failed`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Percentage a job has at least reached when it enters this phase.
    #[must_use]
    pub const fn baseline_percent(self) -> f64 {
        match self {
            Self::Queued => 0.0,
            Self::Enhancing => 10.0,
            Self::Generating => 30.0,
            Self::Annotating => 85.0,
            Self::Done => 100.0,
            // A failed job keeps whatever it had reached.
            Self::Failed => 0.0,
        }
    }

    /// Label used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Enhancing => "Enhancing",
            Self::Generating => "Generating",
            Self::Annotating => "Annotating",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
