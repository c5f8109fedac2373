//! Units of work and their terminal results.

use std::time::Duration;

/// Default prefix of derived object names.
pub const DEFAULT_PREFIX: &str = "file";

/// A single object to transfer, identified by its 1-based index within the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Job(u64);

impl Job {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }

    /// Derives the destination object name, for example `file_1.bin`.
    pub fn object_name(self, prefix: &str) -> String {
        format!("{prefix}_{}.bin", self.0)
    }
}

/// The result of attempting one [`Job`].
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The transfer completed.
    Success {
        /// Name of the object that was transferred.
        name: String,
        /// Time spent on this job, including opening the payload.
        elapsed: Duration,
    },
    /// The transfer failed. Failed jobs are never retried.
    Failure {
        /// Name of the object that failed to transfer.
        name: String,
        /// Rendered error that caused the failure.
        reason: String,
    },
}

impl Outcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. } | Self::Failure { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
