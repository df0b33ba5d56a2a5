//! # MediGuard Pipeline
//!
//! The stage-pipeline orchestrator. A [`Pipeline`] runs an ordered list of
//! [`Stage`]s for one subject: each stage executes its declared tools against
//! the record store, renders a prompt from the subject, prior stage results
//! and tool evidence, asks the [`Reasoner`](mediguard_core::Reasoner) for a
//! judgement and validates it against the stage's output schema, retrying a
//! bounded number of times on malformed output.
//!
//! Stage-level problems never surface as `Err`: `run` returns a
//! [`RunContext`] holding every accepted result plus a structured failure
//! for the first stage that did not complete.

pub mod context;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod stage;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    AttemptOutcome, AttemptRecord, FailureReason, RunContext, RunReport, StageFailure,
    StageRecord, StageResult, StageState, ToolCallRecord,
};
pub use error::{PipelineError, RunError};
pub use extract::extract_payload;
pub use orchestrator::Pipeline;
pub use stage::{FieldOverlap, PromptInputs, PromptTemplate, Stage, ToolInvocation, builtin_stages};
pub use validator::{Rejection, Validation, validate, validate_value};
pub use tokio_util::sync::CancellationToken;
