//! Diagnosis/procedure match tool.
//!
//! Without a clinical mapping table, validation is structural: a claim with
//! no diagnosis code supports none of its procedures, and procedures beyond
//! the per-claim maximum are treated as unsupported.

use async_trait::async_trait;
use mediguard_core::error::ToolError;
use mediguard_core::record::{Claim, ClaimLine, RecordStore};
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::{failure, fields, subject_id};

pub const DEFAULT_MAX_PROCEDURES_PER_CLAIM: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub matches: usize,
    pub mismatches: Vec<String>,
    pub claims_checked: usize,
    pub invalid_diagnoses: usize,
}

impl MatchReport {
    pub fn match_percentage(&self) -> f64 {
        let total = self.matches + self.mismatches.len();
        if total == 0 {
            0.0
        } else {
            self.matches as f64 / total as f64 * 100.0
        }
    }

    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty() && self.invalid_diagnoses == 0
    }
}

pub fn analyze(claims: &[Claim], lines: &[ClaimLine], max_per_claim: usize) -> MatchReport {
    let mut report = MatchReport {
        matches: 0,
        mismatches: Vec::new(),
        claims_checked: claims.len(),
        invalid_diagnoses: 0,
    };

    for claim in claims {
        let procedures: Vec<&str> = lines
            .iter()
            .filter(|l| l.claim_id == claim.claim_id)
            .map(|l| l.procedure_code.as_str())
            .collect();

        if claim.primary_diagnosis_code.trim().is_empty() {
            report.invalid_diagnoses += 1;
            report.mismatches.extend(procedures.iter().map(|p| p.to_string()));
            continue;
        }

        let supported = procedures.len().min(max_per_claim);
        report.matches += supported;
        report
            .mismatches
            .extend(procedures[supported..].iter().map(|p| p.to_string()));
    }

    report
}

pub struct DiagnosisProcedureMatchTool {
    store: Arc<dyn RecordStore>,
}

impl DiagnosisProcedureMatchTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DiagnosisProcedureMatchTool {
    fn name(&self) -> &str {
        "diagnosis_procedure_match"
    }

    fn description(&self) -> &str {
        "Check that every claim's procedures are supported by its primary diagnosis."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::string("subject_id"),
            FieldSpec::integer("max_procedures_per_claim").at_least(1.0).optional(),
        ])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::integer("matches").at_least(0.0),
            FieldSpec::string_list("mismatches"),
            FieldSpec::number("match_percentage").range(0.0, 100.0),
            FieldSpec::boolean("is_valid"),
            FieldSpec::integer("claims_checked").at_least(0.0),
        ])
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let id = subject_id(self.name(), arguments)?;
        let max_per_claim = arguments
            .get("max_procedures_per_claim")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_PROCEDURES_PER_CLAIM);

        let claims = self
            .store
            .claims_for_subject(id)
            .map_err(|e| failure(self.name(), e))?;
        let claim_ids: Vec<String> = claims.iter().map(|c| c.claim_id.clone()).collect();
        let lines = self
            .store
            .claim_lines_for_claims(&claim_ids)
            .map_err(|e| failure(self.name(), e))?;

        let report = analyze(&claims, &lines, max_per_claim);
        debug!(
            subject_id = id,
            matches = report.matches,
            mismatches = report.mismatches.len(),
            "Diagnosis/procedure match analyzed"
        );

        Ok(fields(json!({
            "matches": report.matches,
            "match_percentage": report.match_percentage(),
            "is_valid": report.is_valid(),
            "claims_checked": report.claims_checked,
            "mismatches": report.mismatches,
        })))
    }
}
