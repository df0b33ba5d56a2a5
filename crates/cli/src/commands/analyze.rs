//! `mediguard analyze`: run the pipeline for one patient.
//!
//! Progress goes to stderr as stages advance; the run report is printed to
//! stdout as pretty JSON. Ctrl-C cancels the run at the next boundary or
//! interrupts the in-flight reasoning call.

use std::path::PathBuf;
use std::sync::Arc;

use mediguard_core::event::{DomainEvent, EventBus};
use mediguard_core::record::RecordStore;
use mediguard_pipeline::{CancellationToken, Pipeline, RunContext};
use mediguard_records::InMemoryRecordStore;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

pub async fn run(
    subject_id: &str,
    through: Option<&str>,
    records: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(records)?;

    let store: Arc<dyn RecordStore> =
        Arc::new(InMemoryRecordStore::load_json(&config.data.records_path)?);
    let tools = mediguard_tools::default_registry(store.clone());
    let reasoner = mediguard_providers::build_from_config(&config.reasoner)?;
    let bus = Arc::new(EventBus::default());
    let pipeline = Pipeline::from_config(&config.pipeline, tools, store, reasoner)?
        .with_event_bus(bus.clone());

    let mut events = bus.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = progress_line(&event) {
                        eprintln!("{line}");
                    }
                    if matches!(*event, DomainEvent::RunFinished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling run...");
            on_interrupt.cancel();
        }
    });

    info!(
        subject_id,
        through = through.unwrap_or("all"),
        provider = %config.reasoner.provider,
        "Starting analysis"
    );
    let ctx = match through {
        Some(stage) => pipeline.run_through(subject_id, stage, cancel).await?,
        None => pipeline.run_with_cancel(subject_id, cancel).await?,
    };
    let _ = progress.await;

    println!("{}", serde_json::to_string_pretty(&ctx.report())?);
    outcome(&ctx).map_err(Into::into)
}

/// `Err` with a one-line summary when a stage failed.
fn outcome(ctx: &RunContext) -> Result<(), String> {
    match ctx.failure() {
        None => Ok(()),
        Some(failure) => Err(format!(
            "Stage '{}' failed ({}) after {} attempt(s): {}",
            failure.stage, failure.reason, failure.attempts, failure.detail
        )),
    }
}

/// One human-readable progress line per event.
fn progress_line(event: &DomainEvent) -> Option<String> {
    let line = match event {
        DomainEvent::StageStarted { stage, .. } => format!("[{stage}] started"),
        DomainEvent::ToolExecuted {
            stage,
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let status = if *success { "ok" } else { "FAILED" };
            format!("[{stage}] tool {tool_name}: {status} ({duration_ms} ms)")
        }
        DomainEvent::ReasoningAttempted {
            stage,
            attempt,
            outcome,
            duration_ms,
            ..
        } => format!("[{stage}] attempt {attempt}: {outcome} ({duration_ms} ms)"),
        DomainEvent::StageAccepted { stage, attempts, .. } => {
            format!("[{stage}] accepted after {attempts} attempt(s)")
        }
        DomainEvent::StageFailed { stage, reason, .. } => format!("[{stage}] failed: {reason}"),
        DomainEvent::RunFinished { .. } => return None,
    };
    Some(line)
}
