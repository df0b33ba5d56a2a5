//! Run context: the per-run state threaded through the stages.
//!
//! A [`RunContext`] is created when a run starts and owned exclusively by
//! that run. Stage records are only ever appended; an accepted result is
//! never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accepted reasoning output: declared field name → value, plus any extra
/// fields the reasoner returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageResult(Map<String, Value>);

impl StageResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Per-stage state machine.
///
/// `PENDING → TOOLS_RUNNING → REASONING → VALIDATING → ACCEPTED | RETRYING | FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Pending,
    ToolsRunning,
    Reasoning,
    Validating,
    Accepted,
    Retrying,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Timeout,
    ProviderError,
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Accepted => "accepted",
            AttemptOutcome::Rejected => "rejected",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::ProviderError => "provider_error",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }
}

/// One reasoning attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

/// Everything that happened while one stage ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub state: StageState,
    pub transitions: Vec<StageState>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StageResult>,
}

impl StageRecord {
    pub(crate) fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            state: StageState::Pending,
            transitions: vec![StageState::Pending],
            tool_calls: Vec::new(),
            attempts: Vec::new(),
            result: None,
        }
    }

    pub(crate) fn transition(&mut self, next: StageState) {
        self.state = next;
        self.transitions.push(next);
    }

    pub fn is_accepted(&self) -> bool {
        self.state == StageState::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A tool returned an error; never retried.
    ToolFailure,
    /// Every reasoning attempt was rejected, timed out or errored.
    ValidationExhausted,
    /// The run was cancelled before or during the stage.
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ToolFailure => "tool_failure",
            FailureReason::ValidationExhausted => "validation_exhausted",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured description of the first stage that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub reason: FailureReason,
    pub detail: String,
    /// Reasoning attempts made before failing
    pub attempts: u32,
}

/// Accumulated state of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    subject_id: String,
    started_at: DateTime<Utc>,
    stages: Vec<StageRecord>,
    failure: Option<StageFailure>,
    skipped: Vec<String>,
    duration_ms: u64,
}

impl RunContext {
    pub(crate) fn new(subject_id: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            started_at: Utc::now(),
            stages: Vec::new(),
            failure: None,
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Every stage record in execution order, including a failed stage.
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Accepted results in stage order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &StageResult)> {
        self.stages
            .iter()
            .filter_map(|r| r.result.as_ref().map(|res| (r.stage.as_str(), res)))
    }

    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results().find(|(name, _)| *name == stage).map(|(_, r)| r)
    }

    /// All accepted results merged in stage order; later stages override
    /// earlier ones on field collisions.
    pub fn final_view(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (_, result) in self.results() {
            for (field, value) in result.fields() {
                merged.insert(field.clone(), value.clone());
            }
        }
        merged
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Stages never started because an earlier stage failed.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Append an accepted stage.
    pub(crate) fn accept(&mut self, record: StageRecord) {
        debug_assert!(record.is_accepted() && self.failure.is_none());
        self.stages.push(record);
    }

    /// Record the failed stage and the stages that will never run.
    pub(crate) fn fail(
        &mut self,
        record: StageRecord,
        failure: StageFailure,
        skipped: Vec<String>,
    ) {
        self.stages.push(record);
        self.failure = Some(failure);
        self.skipped = skipped;
    }

    pub(crate) fn finish(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Serializable summary for the serving layer and CLI.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            subject_id: self.subject_id.clone(),
            stages: self.stages.clone(),
            final_view: self.final_view(),
            failure: self.failure.clone(),
            skipped: self.skipped.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Wire form of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub subject_id: String,
    pub stages: Vec<StageRecord>,
    #[serde(rename = "final")]
    pub final_view: Map<String, Value>,
    pub failure: Option<StageFailure>,
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn accepted(stage: &str, fields: Value) -> StageRecord {
        let mut record = StageRecord::new(stage);
        record.transition(StageState::Accepted);
        record.result = Some(StageResult::new(fields.as_object().cloned().unwrap()));
        record
    }

    #[test]
    fn final_view_later_stages_override() {
        let mut ctx = RunContext::new("p1");
        ctx.accept(accepted("identity", json!({"risk": 10, "reasons": ["a"]})));
        ctx.accept(accepted("billing", json!({"risk": 70})));

        let view = ctx.final_view();
        assert_eq!(view["risk"], 70);
        assert_eq!(view["reasons"], json!(["a"]));
        assert!(ctx.is_success());
    }

    #[test]
    fn failed_stage_has_no_result() {
        let mut ctx = RunContext::new("p1");
        ctx.accept(accepted("identity", json!({"risk": 10})));
        let mut failed = StageRecord::new("billing");
        failed.transition(StageState::Failed);
        ctx.fail(
            failed,
            StageFailure {
                stage: "billing".into(),
                reason: FailureReason::ToolFailure,
                detail: "boom".into(),
                attempts: 0,
            },
            vec!["discharge".into()],
        );

        let names: Vec<&str> = ctx.results().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["identity"]);
        assert_eq!(ctx.stages().len(), 2);
        assert!(ctx.result("billing").is_none());
        assert_eq!(ctx.skipped(), ["discharge".to_string()]);
        assert!(!ctx.is_success());
    }

    #[test]
    fn report_serializes_wire_names() {
        let mut ctx = RunContext::new("p1");
        ctx.accept(accepted("identity", json!({"risk": 10})));
        let value = serde_json::to_value(ctx.report()).unwrap();

        assert_eq!(value["subject_id"], "p1");
        assert_eq!(value["final"]["risk"], 10);
        assert_eq!(value["stages"][0]["state"], "ACCEPTED");
        assert_eq!(value["stages"][0]["transitions"], json!(["PENDING", "ACCEPTED"]));
        assert!(value["failure"].is_null());
    }

    #[test]
    fn failure_reason_wire_form() {
        assert_eq!(
            serde_json::to_value(FailureReason::ValidationExhausted).unwrap(),
            json!("validation_exhausted")
        );
        assert_eq!(FailureReason::Cancelled.to_string(), "cancelled");
    }
}
