//! Claim statistics tool: cost distribution across a patient's claims.

use async_trait::async_trait;
use mediguard_core::error::ToolError;
use mediguard_core::record::RecordStore;
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::{failure, fields, stats, subject_id};

pub struct ClaimStatisticsTool {
    store: Arc<dyn RecordStore>,
}

impl ClaimStatisticsTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ClaimStatisticsTool {
    fn name(&self) -> &str {
        "claim_statistics"
    }

    fn description(&self) -> &str {
        "Count, total, mean, extremes and sample standard deviation of a patient's claim costs."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![FieldSpec::string("subject_id")])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::integer("total_claims").at_least(0.0),
            FieldSpec::number("total_cost"),
            FieldSpec::number("avg_cost"),
            FieldSpec::number("max_cost"),
            FieldSpec::number("min_cost"),
            FieldSpec::number("cost_std_dev").at_least(0.0),
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
        let costs: Vec<f64> = claims.iter().map(|c| c.total_claim_cost).collect();

        let avg = stats::mean(&costs);
        debug!(
            subject_id = id,
            claims = costs.len(),
            avg_cost = avg,
            "Claim statistics calculated"
        );

        Ok(fields(json!({
            "total_claims": costs.len(),
            "total_cost": costs.iter().sum::<f64>(),
            "avg_cost": avg,
            "max_cost": stats::max(&costs),
            "min_cost": stats::min(&costs),
            "cost_std_dev": stats::sample_std_dev(&costs),
        })))
    }
}
