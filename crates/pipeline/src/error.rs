//! Errors surfaced by pipeline construction and by `run`.

use mediguard_core::error::StoreError;
use thiserror::Error;

/// Configuration problems detected when a pipeline is built.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Pipeline declares no stages")]
    EmptyStages,

    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Stage '{stage}' references unknown tool '{tool}'")]
    UnknownTool { stage: String, tool: String },

    #[error("Stage '{0}' declares no output fields")]
    NoOutputFields(String),
}

/// The only errors `run` returns. Stage failures are reported inside the
/// returned run context instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Record store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RunError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RunError::UnknownSubject(id),
            other => RunError::Store(other),
        }
    }
}
