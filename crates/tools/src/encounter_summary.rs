//! Encounter summary tool: timing of the patient's most recent admission.

use async_trait::async_trait;
use mediguard_core::error::ToolError;
use mediguard_core::record::{Claim, RecordStore};
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::{failure, fields, subject_id};

/// The claim with the latest admission date, if any claim was admitted.
pub fn latest_encounter(claims: &[Claim]) -> Option<&Claim> {
    claims
        .iter()
        .filter(|c| c.admission_date.is_some())
        .max_by_key(|c| c.admission_date)
}

pub struct EncounterSummaryTool {
    store: Arc<dyn RecordStore>,
}

impl EncounterSummaryTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for EncounterSummaryTool {
    fn name(&self) -> &str {
        "encounter_summary"
    }

    fn description(&self) -> &str {
        "Summarize the latest encounter: class, admission and discharge times, and length of stay."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![FieldSpec::string("subject_id")])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::integer("encounter_count").at_least(0.0),
            FieldSpec::string("latest_encounter_class"),
            FieldSpec::string("latest_admission_date").optional(),
            FieldSpec::string("latest_discharge_date").optional(),
            FieldSpec::number("length_of_stay_hours").at_least(0.0).optional(),
            FieldSpec::boolean("open_encounter"),
        ])
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let id = subject_id(self.name(), arguments)?;
        let claims = self
            .store
            .claims_for_subject(id)
            .map_err(|e| failure(self.name(), e))?;

        let latest = latest_encounter(&claims);
        let admitted = latest.and_then(|c| c.admission_date);
        let discharged = latest.and_then(|c| c.discharge_date);
        let stay_hours = match (admitted, discharged) {
            (Some(a), Some(d)) if d >= a => Some((d - a).num_minutes() as f64 / 60.0),
            _ => None,
        };
        let open = admitted.is_some() && discharged.is_none();

        debug!(
            subject_id = id,
            encounters = claims.len(),
            open_encounter = open,
            "Encounter summary"
        );

        Ok(fields(json!({
            "encounter_count": claims.len(),
            "latest_encounter_class": latest.map(|c| c.encounter_class.clone()).unwrap_or_default(),
            "latest_admission_date": admitted.map(|d| d.to_rfc3339()),
            "latest_discharge_date": discharged.map(|d| d.to_rfc3339()),
            "length_of_stay_hours": stay_hours,
            "open_encounter": open,
        })))
    }
}
