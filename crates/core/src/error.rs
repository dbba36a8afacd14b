//! # Pipeline Errors
//!
//! Errors that escape the pipeline. Stage-level failures never do; they are
//! captured as [`crate::pipeline::StageError`] values inside the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any stage executes
    #[error("invalid run id `{run_id}`: {reason}")]
    InvalidRunId { run_id: String, reason: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
