//! Charge statistics tool: per-line charge distribution and outliers.
//!
//! A line is an outlier when its charge exceeds `mean + sigma * std_dev` of
//! the *other* lines (leave-one-out, population deviation). At least three
//! lines are needed before anything is flagged.

use async_trait::async_trait;
use mediguard_core::error::ToolError;
use mediguard_core::record::{ClaimLine, RecordStore};
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::{failure, fields, stats, subject_id};

/// Default number of standard deviations above the mean.
pub const DEFAULT_OUTLIER_SIGMA: f64 = 2.0;

const MIN_LINES_FOR_OUTLIERS: usize = 3;

/// A flagged claim line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeOutlier {
    pub claim_id: String,
    pub line_id: u32,
    pub procedure_code: String,
    pub charge_amount: f64,
    /// The leave-one-out threshold the charge exceeded
    pub threshold: f64,
}

/// Find lines whose charge exceeds the leave-one-out threshold.
pub fn find_outliers(lines: &[ClaimLine], sigma: f64) -> Vec<ChargeOutlier> {
    if lines.len() < MIN_LINES_FOR_OUTLIERS {
        return Vec::new();
    }

    let charges: Vec<f64> = lines.iter().map(|l| l.charge_amount).collect();
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let others: Vec<f64> = charges
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &c)| c)
                .collect();
            let threshold = stats::mean(&others) + sigma * stats::population_std_dev(&others);
            (line.charge_amount > threshold).then(|| ChargeOutlier {
                claim_id: line.claim_id.clone(),
                line_id: line.line_id,
                procedure_code: line.procedure_code.clone(),
                charge_amount: line.charge_amount,
                threshold,
            })
        })
        .collect()
}

pub struct ChargeStatisticsTool {
    store: Arc<dyn RecordStore>,
}

impl ChargeStatisticsTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ChargeStatisticsTool {
    fn name(&self) -> &str {
        "charge_statistics"
    }

    fn description(&self) -> &str {
        "Distribution of claim-line charges for a patient, with lines far above the others flagged as outliers."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::string("subject_id"),
            FieldSpec::number("outlier_sigma").at_least(0.0).optional(),
        ])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::integer("line_count").at_least(0.0),
            FieldSpec::number("mean_charge"),
            FieldSpec::number("charge_std_dev").at_least(0.0),
            FieldSpec::number("max_charge"),
            FieldSpec::list("charge_outliers"),
        ])
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let id = subject_id(self.name(), arguments)?;
        let sigma = arguments
            .get("outlier_sigma")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_OUTLIER_SIGMA);

        let claims = self
            .store
            .claims_for_subject(id)
            .map_err(|e| failure(self.name(), e))?;
        let claim_ids: Vec<String> = claims.into_iter().map(|c| c.claim_id).collect();
        let lines = self
            .store
            .claim_lines_for_claims(&claim_ids)
            .map_err(|e| failure(self.name(), e))?;

        let charges: Vec<f64> = lines.iter().map(|l| l.charge_amount).collect();
        let outliers = find_outliers(&lines, sigma);
        debug!(
            subject_id = id,
            lines = lines.len(),
            outliers = outliers.len(),
            sigma,
            "Charge statistics calculated"
        );

        Ok(fields(json!({
            "line_count": lines.len(),
            "mean_charge": stats::mean(&charges),
            "charge_std_dev": stats::population_std_dev(&charges),
            "max_charge": stats::max(&charges),
            "charge_outliers": outliers,
        })))
    }
}
