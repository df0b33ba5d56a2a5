//! Built-in tool implementations for MediGuard.
//!
//! Tools give each stage its structured evidence: patient records, claim
//! cost statistics, charge outliers, demographic consistency checks,
//! diagnosis/procedure validation and encounter timing. Every tool is a
//! pure read over the shared [`RecordStore`] and takes the `subject_id`
//! injected by the pipeline.

pub mod charge_statistics;
pub mod claim_statistics;
pub mod diagnosis_procedure_match;
pub mod encounter_summary;
pub mod fetch_patient_data;
pub mod patient_consistency;
mod stats;

use mediguard_core::error::ToolError;
use mediguard_core::record::RecordStore;
use mediguard_core::tool::ToolRegistry;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Create a tool registry with all built-in tools bound to `store`.
pub fn default_registry(store: Arc<dyn RecordStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(fetch_patient_data::FetchPatientDataTool::new(store.clone())));
    registry.register(Box::new(claim_statistics::ClaimStatisticsTool::new(store.clone())));
    registry.register(Box::new(charge_statistics::ChargeStatisticsTool::new(store.clone())));
    registry.register(Box::new(patient_consistency::PatientConsistencyTool::new(store.clone())));
    registry.register(Box::new(
        diagnosis_procedure_match::DiagnosisProcedureMatchTool::new(store.clone()),
    ));
    registry.register(Box::new(encounter_summary::EncounterSummaryTool::new(store)));
    registry
}

/// Read the injected `subject_id` argument.
pub(crate) fn subject_id<'a>(
    tool: &str,
    arguments: &'a Map<String, Value>,
) -> Result<&'a str, ToolError> {
    arguments
        .get("subject_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::ArgumentMismatch {
            tool: tool.into(),
            reason: "missing 'subject_id' argument".into(),
        })
}

pub(crate) fn failure(tool: &str, reason: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailure {
        tool: tool.into(),
        reason: reason.to_string(),
    }
}

/// Unwrap a `json!({...})` literal into its field map.
pub(crate) fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;
    use mediguard_core::record::{Claim, ClaimLine, DemographicSnapshot, Subject};
    use mediguard_records::{InMemoryRecordStore, RecordSnapshot};
    use serde_json::{Map, Value, json};
    use std::sync::Arc;

    pub fn subject() -> Subject {
        let mut s = Subject::new("p1");
        s.ssn = "999-12-3456".into();
        s.birthdate = NaiveDate::from_ymd_opt(1970, 1, 2);
        s.first = "Ada".into();
        s.last = "Lovelace".into();
        s.address = "12 Analytical Way".into();
        s
    }

    /// Three claims with two lines each; line c3/2 is far above the rest.
    pub fn store() -> Arc<InMemoryRecordStore> {
        let mut claims = vec![
            Claim::new("c1", "p1", "E11.9", 210.0),
            Claim::new("c2", "p1", "I10", 205.0),
            Claim::new("c3", "p1", "J45", 5105.0),
        ];
        for (i, claim) in claims.iter_mut().enumerate() {
            claim.service_date = NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32);
            claim.demographics = Some(subject().snapshot());
        }
        let charges = [100.0, 110.0, 90.0, 115.0, 105.0, 5000.0];
        let lines = charges
            .iter()
            .enumerate()
            .map(|(i, &charge)| {
                let claim = format!("c{}", i / 2 + 1);
                ClaimLine::new(claim, (i % 2 + 1) as u32, format!("9921{i}"), charge)
            })
            .collect();

        Arc::new(InMemoryRecordStore::from_snapshot(RecordSnapshot {
            subjects: vec![subject(), Subject::new("p2")],
            claims,
            claim_lines: lines,
        }))
    }

    pub fn with_demographics(mut claim: Claim, snapshot: DemographicSnapshot) -> Claim {
        claim.demographics = Some(snapshot);
        claim
    }

    pub fn args(subject_id: &str) -> Map<String, Value> {
        json!({ "subject_id": subject_id }).as_object().cloned().unwrap()
    }
}
