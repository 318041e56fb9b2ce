//! Failure taxonomy for the processing pipeline
//!
//! Retry policy lives with the job runner, not here: these types only say
//! *what* went wrong; `JobError::is_retryable` says whether another attempt
//! can plausibly succeed.

use thiserror::Error;

use crate::store::StoreError;

/// Failures raised while turning an input clip into an ENF series.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("clip is {seconds:.2}s, below the {min_seconds:.1}s minimum")]
    ClipTooShort { seconds: f64, min_seconds: f64 },

    #[error("clip is {seconds:.2}s, above the {max_seconds:.1}s maximum")]
    ClipTooLong { seconds: f64, max_seconds: f64 },

    #[error("input file missing or unreadable: {0}")]
    InputMissing(String),

    #[error("audio decode failed: {0}")]
    Decode(String),
}

/// Everything a single job run can fail with.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("persistence: {0}")]
    Store(#[from] StoreError),

    #[error("collaborator {name} failed: {reason}")]
    Collaborator { name: &'static str, reason: String },

    #[error("scratch dir: {0}")]
    Scratch(String),
}

impl JobError {
    /// Whether the runner may requeue the job for another attempt.
    ///
    /// Unsuitable clips and missing inputs cannot heal; decode, storage and
    /// collaborator failures can be transient resource exhaustion.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Extract(ExtractError::ClipTooShort { .. })
            | JobError::Extract(ExtractError::ClipTooLong { .. })
            | JobError::Extract(ExtractError::InputMissing(_)) => false,
            JobError::Extract(ExtractError::Decode(_)) => true,
            JobError::Store(_) => true,
            JobError::Collaborator { .. } => true,
            JobError::Scratch(_) => true,
        }
    }
}
