use thiserror::Error;

use crate::analysis::ExtractionServiceError;
use crate::error::ExtractionError;
use crate::job::{StoreError, TransitionError};

/// Failure of the pipeline itself, as opposed to a failed job.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to persist job state: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid job state change: {0}")]
    Transition(#[from] TransitionError),

    /// The final state could not be written; the record is still `PROCESSING`.
    #[error("Report {job_id} left PROCESSING, saving its final state failed: {source}")]
    Unfinished {
        job_id: String,
        #[source]
        source: StoreError,
    },
}

/// A stage error; its display text becomes the job's `error_message`.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractionError),

    #[error(transparent)]
    Analyze(#[from] ExtractionServiceError),
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Extract(_) => "extract",
            StageError::Analyze(_) => "analyze",
        }
    }
}
