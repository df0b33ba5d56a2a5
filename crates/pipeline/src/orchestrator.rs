//! The pipeline orchestrator.
//!
//! Runs stages strictly in declared order, one at a time, for one subject.
//! Each stage moves through `PENDING → TOOLS_RUNNING → REASONING →
//! VALIDATING` and ends `ACCEPTED` or `FAILED`, passing through `RETRYING`
//! between reasoning attempts. A failed stage aborts the rest of the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use mediguard_config::{MAX_RETRIES_LIMIT, PipelineConfig};
use mediguard_core::event::{DomainEvent, EventBus};
use mediguard_core::reasoner::{Reasoner, ReasoningRequest};
use mediguard_core::record::{RecordStore, Subject};
use mediguard_core::tool::{ToolCall, ToolRegistry};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::context::{
    AttemptOutcome, AttemptRecord, FailureReason, RunContext, StageFailure, StageRecord,
    StageState, ToolCallRecord,
};
use crate::error::{PipelineError, RunError};
use crate::stage::{FieldOverlap, PromptInputs, Stage};
use crate::validator::{Validation, validate};

/// Default additional reasoning attempts after the first.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default bound on a single reasoning call.
pub const DEFAULT_REASONING_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw output previews in logs are cut to this many characters.
const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// How a single stage ended.
enum StageOutcome {
    Accepted(StageRecord),
    Failed(StageRecord, StageFailure),
}

/// The stage-pipeline orchestrator.
///
/// Immutable once built; share it behind an `Arc` and call [`run`](Self::run)
/// from as many concurrent tasks as needed. Each run owns its own
/// [`RunContext`].
pub struct Pipeline {
    stages: Vec<Stage>,

    /// Overlapping tool fields per stage, parallel to `stages`
    overlaps: Vec<Vec<FieldOverlap>>,

    tools: Arc<ToolRegistry>,
    store: Arc<dyn RecordStore>,
    reasoner: Arc<dyn Reasoner>,

    /// Additional reasoning attempts after the first
    max_retries: u32,

    /// Bound on each reasoning call
    reasoning_timeout: Duration,

    event_bus: Option<Arc<EventBus>>,
}

impl Pipeline {
    /// Build a pipeline, checking the stage list against the registry.
    pub fn new(
        stages: Vec<Stage>,
        tools: ToolRegistry,
        store: Arc<dyn RecordStore>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::EmptyStages);
        }

        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].iter().any(|s| s.name == stage.name) {
                return Err(PipelineError::DuplicateStage(stage.name.clone()));
            }
            if stage.output.is_empty() {
                return Err(PipelineError::NoOutputFields(stage.name.clone()));
            }
            if let Some(missing) = stage.tools.iter().find(|t| !tools.contains(&t.name)) {
                return Err(PipelineError::UnknownTool {
                    stage: stage.name.clone(),
                    tool: missing.name.clone(),
                });
            }
        }

        let overlaps: Vec<Vec<FieldOverlap>> = stages
            .iter()
            .map(|stage| {
                let overlaps = stage.overlapping_fields(&tools);
                for o in &overlaps {
                    info!(
                        stage = %stage.name,
                        field = %o.field,
                        tools = %o.tools.join(","),
                        winner = %o.winner,
                        "Tools write the same field; last writer wins"
                    );
                }
                overlaps
            })
            .collect();

        Ok(Self {
            stages,
            overlaps,
            tools: Arc::new(tools),
            store,
            reasoner,
            max_retries: DEFAULT_MAX_RETRIES,
            reasoning_timeout: DEFAULT_REASONING_TIMEOUT,
            event_bus: None,
        })
    }

    /// Build from `[pipeline]` configuration.
    pub fn from_config(
        config: &PipelineConfig,
        tools: ToolRegistry,
        store: Arc<dyn RecordStore>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Result<Self, PipelineError> {
        let stages = config.stages.iter().map(Stage::from_config).collect();
        Ok(Self::new(stages, tools, store, reasoner)?
            .with_max_retries(config.max_retries)
            .with_reasoning_timeout(Duration::from_secs(config.reasoning_timeout_secs)))
    }

    /// Set the number of additional reasoning attempts after the first,
    /// capped at [`MAX_RETRIES_LIMIT`].
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        if max_retries > MAX_RETRIES_LIMIT {
            warn!(max_retries, limit = MAX_RETRIES_LIMIT, "Retry bound capped");
        }
        self.max_retries = max_retries.min(MAX_RETRIES_LIMIT);
        self
    }

    pub fn with_reasoning_timeout(mut self, timeout: Duration) -> Self {
        self.reasoning_timeout = timeout;
        self
    }

    /// Publish progress events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn overlaps(&self, stage: &str) -> &[FieldOverlap] {
        self.stages
            .iter()
            .position(|s| s.name == stage)
            .map(|i| self.overlaps[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run every stage for `subject_id`.
    pub async fn run(&self, subject_id: &str) -> Result<RunContext, RunError> {
        self.run_with_cancel(subject_id, CancellationToken::new()).await
    }

    /// Run every stage, stopping early if `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        subject_id: &str,
        cancel: CancellationToken,
    ) -> Result<RunContext, RunError> {
        self.run_stages(subject_id, self.stages.len(), &cancel).await
    }

    /// Run the stage prefix ending at `last_stage`.
    pub async fn run_through(
        &self,
        subject_id: &str,
        last_stage: &str,
        cancel: CancellationToken,
    ) -> Result<RunContext, RunError> {
        let idx = self
            .stages
            .iter()
            .position(|s| s.name == last_stage)
            .ok_or_else(|| RunError::UnknownStage(last_stage.to_string()))?;
        self.run_stages(subject_id, idx + 1, &cancel).await
    }

    async fn run_stages(
        &self,
        subject_id: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<RunContext, RunError> {
        // Before any tool or reasoning call
        let subject = self.store.subject(subject_id)?;

        let started = Instant::now();
        let mut ctx = RunContext::new(subject_id);
        info!(run_id = ctx.run_id(), subject_id, stages = count, "Run started");

        let stages = &self.stages[..count];
        for (i, stage) in stages.iter().enumerate() {
            let span = info_span!("stage", run_id = %ctx.run_id(), stage = %stage.name);
            let outcome = self
                .run_stage(&ctx, &subject, stage, &self.overlaps[i], cancel)
                .instrument(span)
                .await;

            match outcome {
                StageOutcome::Accepted(record) => ctx.accept(record),
                StageOutcome::Failed(record, failure) => {
                    let skipped: Vec<String> =
                        stages[i + 1..].iter().map(|s| s.name.clone()).collect();
                    warn!(
                        run_id = ctx.run_id(),
                        stage = %failure.stage,
                        reason = %failure.reason,
                        detail = %failure.detail,
                        skipped = skipped.len(),
                        "Stage failed; aborting run"
                    );
                    ctx.fail(record, failure, skipped);
                    break;
                }
            }
        }

        ctx.finish(elapsed_ms(started));
        info!(
            run_id = ctx.run_id(),
            subject_id,
            succeeded = ctx.is_success(),
            duration_ms = ctx.duration_ms(),
            "Run finished"
        );
        self.emit(DomainEvent::RunFinished {
            run_id: ctx.run_id().to_string(),
            subject_id: subject_id.to_string(),
            succeeded: ctx.is_success(),
            duration_ms: ctx.duration_ms(),
            timestamp: Utc::now(),
        });

        Ok(ctx)
    }

    async fn run_stage(
        &self,
        ctx: &RunContext,
        subject: &Subject,
        stage: &Stage,
        overlaps: &[FieldOverlap],
        cancel: &CancellationToken,
    ) -> StageOutcome {
        let mut record = StageRecord::new(&stage.name);
        let run_id = ctx.run_id().to_string();

        if cancel.is_cancelled() {
            return self.fail(
                record,
                &run_id,
                FailureReason::Cancelled,
                "run cancelled before stage started",
                0,
            );
        }

        self.emit(DomainEvent::StageStarted {
            run_id: run_id.clone(),
            stage: stage.name.clone(),
            timestamp: Utc::now(),
        });

        // --- TOOLS_RUNNING ---
        record.transition(StageState::ToolsRunning);
        let mut evidence = Map::new();
        for invocation in &stage.tools {
            let mut arguments = invocation.args.clone();
            arguments.insert("subject_id".into(), Value::String(subject.id.clone()));
            let call = ToolCall::new(&invocation.name, arguments);

            let started = Instant::now();
            let result = self.tools.invoke(&call).await;
            let duration_ms = elapsed_ms(started);

            self.emit(DomainEvent::ToolExecuted {
                run_id: run_id.clone(),
                stage: stage.name.clone(),
                tool_name: invocation.name.clone(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });

            match result {
                Ok(output) => {
                    debug!(
                        tool = %invocation.name,
                        duration_ms,
                        fields = output.fields.len(),
                        "Tool executed"
                    );
                    record.tool_calls.push(ToolCallRecord {
                        tool: invocation.name.clone(),
                        success: true,
                        duration_ms,
                        error: None,
                    });
                    // Later tools override earlier ones on the same field
                    evidence.extend(output.fields);
                }
                Err(e) => {
                    warn!(tool = %invocation.name, kind = e.kind(), error = %e, "Tool failed");
                    record.tool_calls.push(ToolCallRecord {
                        tool: invocation.name.clone(),
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    let detail = e.to_string();
                    return self.fail(record, &run_id, FailureReason::ToolFailure, &detail, 0);
                }
            }
        }

        // --- REASONING / VALIDATING / RETRYING ---
        let prior: Vec<_> = ctx.results().collect();
        let base_prompt = stage.template.render(&PromptInputs {
            stage: &stage.name,
            instruction: stage.template.instruction(),
            subject,
            prior: &prior,
            evidence: &evidence,
            overlaps,
            schema: &stage.output,
        });

        let max_attempts = self.max_retries.saturating_add(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            record.transition(StageState::Reasoning);
            let prompt = if attempt == 1 {
                base_prompt.clone()
            } else {
                amend_prompt(&base_prompt, &last_reason, stage)
            };
            debug!(attempt, prompt = %prompt, "Reasoning prompt");

            let request = ReasoningRequest {
                stage: stage.name.clone(),
                prompt,
                schema: stage.output.clone(),
                attempt,
            };

            let started = Instant::now();
            let call = tokio::time::timeout(self.reasoning_timeout, self.reasoner.infer(request));
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = call => Some(r),
            };
            let duration_ms = elapsed_ms(started);

            let (outcome, detail) = match response {
                None => {
                    info!(attempt, "Run cancelled during reasoning");
                    self.record_attempt(
                        &mut record,
                        &run_id,
                        attempt,
                        AttemptOutcome::Cancelled,
                        None,
                        duration_ms,
                    );
                    return self.fail(
                        record,
                        &run_id,
                        FailureReason::Cancelled,
                        "run cancelled during reasoning",
                        attempt,
                    );
                }
                Some(Err(_elapsed)) => (
                    AttemptOutcome::Timeout,
                    format!(
                        "reasoning timed out after {}s",
                        self.reasoning_timeout.as_secs_f64()
                    ),
                ),
                Some(Ok(Err(e))) => (AttemptOutcome::ProviderError, e.to_string()),
                Some(Ok(Ok(response))) => {
                    record.transition(StageState::Validating);
                    match validate(&response.content, &stage.output) {
                        Validation::Accepted(result) => {
                            info!(attempt, duration_ms, "Stage accepted");
                            self.record_attempt(
                                &mut record,
                                &run_id,
                                attempt,
                                AttemptOutcome::Accepted,
                                None,
                                duration_ms,
                            );
                            record.transition(StageState::Accepted);
                            record.result = Some(result);
                            self.emit(DomainEvent::StageAccepted {
                                run_id: run_id.clone(),
                                stage: stage.name.clone(),
                                attempts: attempt,
                                timestamp: Utc::now(),
                            });
                            return StageOutcome::Accepted(record);
                        }
                        Validation::Rejected(rejection) => {
                            debug!(attempt, raw = %preview(&response.content), "Rejected output");
                            (AttemptOutcome::Rejected, rejection.to_string())
                        }
                    }
                }
            };

            warn!(
                attempt,
                max_attempts,
                outcome = outcome.as_str(),
                detail = %detail,
                "Reasoning attempt not accepted"
            );
            self.record_attempt(
                &mut record,
                &run_id,
                attempt,
                outcome,
                Some(detail.clone()),
                duration_ms,
            );
            last_reason = detail;

            if attempt < max_attempts {
                record.transition(StageState::Retrying);
            }
        }

        self.fail(
            record,
            &run_id,
            FailureReason::ValidationExhausted,
            &last_reason,
            max_attempts,
        )
    }

    fn record_attempt(
        &self,
        record: &mut StageRecord,
        run_id: &str,
        attempt: u32,
        outcome: AttemptOutcome,
        detail: Option<String>,
        duration_ms: u64,
    ) {
        self.emit(DomainEvent::ReasoningAttempted {
            run_id: run_id.to_string(),
            stage: record.stage.clone(),
            attempt,
            outcome: outcome.as_str().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
        record.attempts.push(AttemptRecord {
            attempt,
            outcome,
            detail,
            duration_ms,
        });
    }

    fn fail(
        &self,
        mut record: StageRecord,
        run_id: &str,
        reason: FailureReason,
        detail: &str,
        attempts: u32,
    ) -> StageOutcome {
        record.transition(StageState::Failed);
        self.emit(DomainEvent::StageFailed {
            run_id: run_id.to_string(),
            stage: record.stage.clone(),
            reason: reason.as_str().to_string(),
            timestamp: Utc::now(),
        });
        let failure = StageFailure {
            stage: record.stage.clone(),
            reason,
            detail: detail.to_string(),
            attempts,
        };
        StageOutcome::Failed(record, failure)
    }

    fn emit(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Restate the failure and the contract after a rejected attempt.
fn amend_prompt(base: &str, reason: &str, stage: &Stage) -> String {
    format!(
        "{base}\n## Previous attempt rejected\n\
         Your previous response could not be accepted: {reason}.\n\
         Respond again with ONLY a JSON object containing exactly these fields:\n{}\n",
        stage.output.describe()
    )
}
