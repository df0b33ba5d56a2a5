//! Fetch patient data tool: the subject record plus every claim and claim
//! line filed for it.

use async_trait::async_trait;
use mediguard_core::error::{StoreError, ToolError};
use mediguard_core::record::RecordStore;
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::info;

use crate::{failure, fields, subject_id};

pub struct FetchPatientDataTool {
    store: Arc<dyn RecordStore>,
}

impl FetchPatientDataTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FetchPatientDataTool {
    fn name(&self) -> &str {
        "fetch_patient_data"
    }

    fn description(&self) -> &str {
        "Fetch patient demographics, all claims and all claim lines for a patient."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![FieldSpec::string("subject_id")])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::object("patient"),
            FieldSpec::list("claims"),
            FieldSpec::list("claim_lines"),
            FieldSpec::integer("claim_count").at_least(0.0),
            FieldSpec::integer("claim_line_count").at_least(0.0),
        ])
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let id = subject_id(self.name(), arguments)?;

        let patient = self.store.subject(id).map_err(|e| match e {
            StoreError::NotFound(_) => failure(self.name(), format!("Patient ID {id} not found")),
            other => failure(self.name(), other),
        })?;
        let claims = self
            .store
            .claims_for_subject(id)
            .map_err(|e| failure(self.name(), e))?;
        let claim_ids: Vec<String> = claims.iter().map(|c| c.claim_id.clone()).collect();
        let lines = self
            .store
            .claim_lines_for_claims(&claim_ids)
            .map_err(|e| failure(self.name(), e))?;

        info!(
            subject_id = id,
            claims = claims.len(),
            claim_lines = lines.len(),
            "Fetched patient data"
        );

        Ok(fields(json!({
            "patient": patient,
            "claim_count": claims.len(),
            "claim_line_count": lines.len(),
            "claims": claims,
            "claim_lines": lines,
        })))
    }
}
