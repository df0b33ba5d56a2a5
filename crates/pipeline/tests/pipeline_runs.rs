//! End-to-end pipeline runs over the built-in stages and tools, with a
//! scripted reasoner in place of a live model.

use async_trait::async_trait;
use chrono::NaiveDate;
use mediguard_config::PipelineConfig;
use mediguard_core::error::ProviderError;
use mediguard_core::reasoner::{Reasoner, ReasoningRequest, ReasoningResponse};
use mediguard_core::record::{Claim, ClaimLine, RecordStore, Subject};
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::ToolRegistry;
use mediguard_pipeline::{
    CancellationToken, FailureReason, Pipeline, PromptTemplate, RunError, Stage, Validation,
    builtin_stages, validate_value,
};
use mediguard_records::{InMemoryRecordStore, RecordSnapshot};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const IDENTITY_OK: &str =
    r#"{"fraud_risk_score": 20, "identity_misuse_flag": false, "reasons": ["Consistent demographics"]}"#;
const BILLING_OK: &str = r#"```json
{"billing_risk_score": 65, "billing_flags": ["charge_outlier"], "billing_explanation": "Line 99215 far above the rest"}
```"#;
const DISCHARGE_OK: &str =
    r#"{"discharge_ready": true, "blockers": [], "delay_hours": 0, "priority_level": "LOW"}"#;

struct Scripted {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl Scripted {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn then_always(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompts_for(&self, stage: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Reasoner for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, request: ReasoningRequest) -> Result<ReasoningResponse, ProviderError> {
        self.prompts
            .lock()
            .unwrap()
            .push((request.stage.clone(), request.prompt.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .expect("script exhausted");
        Ok(ReasoningResponse::text(reply))
    }
}

fn patient() -> Subject {
    let mut s = Subject::new("p1");
    s.ssn = "999-12-3456".into();
    s.birthdate = NaiveDate::from_ymd_opt(1970, 1, 2);
    s.first = "Ada".into();
    s.last = "Lovelace".into();
    s.address = "12 Analytical Way".into();
    s
}

/// Three claims with two lines each; the last line is far above the rest.
fn snapshot() -> RecordSnapshot {
    let mut claims = vec![
        Claim::new("c1", "p1", "E11.9", 210.0),
        Claim::new("c2", "p1", "I10", 225.0),
        Claim::new("c3", "p1", "J45", 5105.0),
    ];
    for (i, claim) in claims.iter_mut().enumerate() {
        claim.service_date = NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32);
        claim.demographics = Some(patient().snapshot());
    }
    let charges = [100.0, 110.0, 90.0, 115.0, 105.0, 5000.0];
    let claim_lines = charges
        .iter()
        .enumerate()
        .map(|(i, &charge)| {
            ClaimLine::new(
                format!("c{}", i / 2 + 1),
                (i % 2 + 1) as u32,
                format!("9921{i}"),
                charge,
            )
        })
        .collect();

    RecordSnapshot {
        subjects: vec![patient()],
        claims,
        claim_lines,
    }
}

fn builtin_pipeline(snapshot: RecordSnapshot, reasoner: Arc<Scripted>) -> Pipeline {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::from_snapshot(snapshot));
    let tools = mediguard_tools::default_registry(store.clone());
    Pipeline::new(builtin_stages(), tools, store, reasoner).unwrap()
}

#[tokio::test]
async fn full_run_accepts_every_stage_in_order() {
    let reasoner = Arc::new(Scripted::new(&[IDENTITY_OK, BILLING_OK, DISCHARGE_OK]));
    let pipeline = builtin_pipeline(snapshot(), reasoner.clone());

    let ctx = pipeline.run("p1").await.unwrap();
    assert!(ctx.is_success(), "failure: {:?}", ctx.failure());

    let names: Vec<&str> = ctx.results().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["identity", "billing", "discharge"]);

    let view = ctx.final_view();
    assert_eq!(view["fraud_risk_score"], 20);
    assert_eq!(view["billing_flags"], json!(["charge_outlier"]));
    assert_eq!(view["discharge_ready"], true);

    // Billing sees the identity verdict and the flagged line
    let billing = &reasoner.prompts_for("billing")[0];
    assert!(billing.contains("### identity"));
    assert!(billing.contains("\"fraud_risk_score\": 20"));
    assert!(billing.contains("\"charge_outliers\""));
    assert!(billing.contains("\"procedure_code\": \"99215\""));

    let discharge = &reasoner.prompts_for("discharge")[0];
    assert!(discharge.contains("### billing"));
}

#[tokio::test]
async fn exhausted_stage_stops_the_run() {
    let reasoner = Arc::new(Scripted::new(&[IDENTITY_OK]).then_always("I am unable to answer."));
    let pipeline = builtin_pipeline(snapshot(), reasoner.clone()).with_max_retries(2);

    let ctx = pipeline.run("p1").await.unwrap();

    let failure = ctx.failure().unwrap();
    assert_eq!(failure.stage, "billing");
    assert_eq!(failure.reason, FailureReason::ValidationExhausted);
    assert_eq!(failure.attempts, 3);

    let recorded: Vec<&str> = ctx.stages().iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(recorded, vec!["identity", "billing"]);
    assert_eq!(ctx.skipped(), ["discharge".to_string()]);
    assert!(reasoner.prompts_for("discharge").is_empty());
    assert_eq!(reasoner.calls(), 1 + 3);

    let report = serde_json::to_value(ctx.report()).unwrap();
    assert_eq!(report["failure"]["reason"], "validation_exhausted");
    assert!(report["final"].get("billing_risk_score").is_none());
}

#[tokio::test]
async fn retry_bound_comes_from_config() {
    let reasoner = Arc::new(Scripted::new(&[]).then_always("{}"));
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::from_snapshot(snapshot()));
    let tools = mediguard_tools::default_registry(store.clone());
    let config = PipelineConfig {
        max_retries: 0,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::from_config(&config, tools, store, reasoner.clone()).unwrap();

    let ctx = pipeline.run("p1").await.unwrap();
    assert_eq!(ctx.failure().unwrap().attempts, 1);
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn unknown_subject_makes_no_calls() {
    let tool_calls = Arc::new(AtomicUsize::new(0));
    let mut tools = ToolRegistry::new();
    let counter = tool_calls.clone();
    tools.register_fn(
        "lookup",
        Schema::new(vec![FieldSpec::string("subject_id")]),
        Schema::new(vec![FieldSpec::string("echo_id")]),
        move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut out = Map::new();
            out.insert("echo_id".into(), args["subject_id"].clone());
            Ok(out)
        },
    );
    let stage = Stage::new(
        "identity",
        PromptTemplate::new("Check the identity."),
        Schema::new(vec![FieldSpec::integer("fraud_risk_score")]),
    )
    .with_tool("lookup");

    let reasoner = Arc::new(Scripted::new(&[]).then_always(IDENTITY_OK));
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::from_snapshot(snapshot()));
    let pipeline = Pipeline::new(vec![stage], tools, store, reasoner.clone()).unwrap();

    let err = pipeline.run("nobody").await.unwrap_err();
    assert_eq!(err, RunError::UnknownSubject("nobody".into()));
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
    assert_eq!(reasoner.calls(), 0);

    // The same pipeline does call the tool for a known subject
    pipeline.run("p1").await.unwrap();
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn birthdate_mismatch_reaches_identity_prompt() {
    let mut data = snapshot();
    if let Some(demographics) = data.claims[1].demographics.as_mut() {
        demographics.birthdate = NaiveDate::from_ymd_opt(1980, 5, 5);
    }
    let reasoner = Arc::new(Scripted::new(&[IDENTITY_OK, BILLING_OK, DISCHARGE_OK]));
    let pipeline = builtin_pipeline(data, reasoner.clone());

    pipeline.run("p1").await.unwrap();

    let identity = &reasoner.prompts_for("identity")[0];
    assert!(identity.contains("\"is_consistent\": false"));
    assert!(identity.contains(
        "Claim c2: birthdate 1980-05-05 does not match patient record 1970-01-02"
    ));
}

#[tokio::test]
async fn accepted_results_revalidate() {
    let reasoner = Arc::new(Scripted::new(&[IDENTITY_OK, BILLING_OK, DISCHARGE_OK]));
    let pipeline = builtin_pipeline(snapshot(), reasoner);
    let ctx = pipeline.run("p1").await.unwrap();

    for (stage, (name, result)) in builtin_stages().iter().zip(ctx.results()) {
        assert_eq!(stage.name, name);
        assert_eq!(
            validate_value(&result.to_value(), &stage.output),
            Validation::Accepted(result.clone())
        );
    }
}

#[tokio::test]
async fn tool_order_decides_overlapping_field() {
    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for (name, avg) in [("ledger", 100.0), ("recalc", 250.0)] {
            registry.register_fn(
                name,
                Schema::default(),
                Schema::new(vec![FieldSpec::number("avg_cost")]),
                move |_| {
                    let mut out = Map::new();
                    out.insert("avg_cost".into(), Value::from(avg));
                    Ok(out)
                },
            );
        }
        registry
    }

    async fn prompt_with(order: [&str; 2]) -> String {
        let stage = Stage::new(
            "billing",
            PromptTemplate::new("Review the charges."),
            Schema::new(vec![FieldSpec::integer("billing_risk_score")]),
        )
        .with_tool(order[0])
        .with_tool(order[1]);

        let reasoner = Arc::new(Scripted::new(&[r#"{"billing_risk_score": 1}"#]));
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::from_snapshot(snapshot()));
        let pipeline = Pipeline::new(vec![stage], registry(), store, reasoner.clone()).unwrap();
        assert_eq!(pipeline.overlaps("billing")[0].winner, order[1]);

        pipeline
            .run_with_cancel("p1", CancellationToken::new())
            .await
            .unwrap();
        reasoner.prompts_for("billing").remove(0)
    }

    let forward = prompt_with(["ledger", "recalc"]).await;
    assert!(forward.contains("\"avg_cost\": 250.0"));
    assert!(forward.contains("the value from recalc is shown"));

    let reversed = prompt_with(["recalc", "ledger"]).await;
    assert!(reversed.contains("\"avg_cost\": 100.0"));
    assert!(reversed.contains("the value from ledger is shown"));
}
