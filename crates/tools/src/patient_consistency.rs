//! Patient consistency tool: compares the demographics recorded on each claim
//! with the patient record, and applies two claim-pattern heuristics.

use async_trait::async_trait;
use mediguard_core::error::{StoreError, ToolError};
use mediguard_core::record::{Claim, RecordStore, Subject};
use mediguard_core::schema::{FieldSpec, Schema};
use mediguard_core::tool::Tool;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::{failure, fields, stats, subject_id};

/// More distinct service dates than this is reported.
pub const MAX_DISTINCT_SERVICE_DATES: usize = 5;

/// A claim costing more than this multiple of the average is reported.
pub const HIGH_COST_FACTOR: f64 = 3.0;

/// Outcome of comparing claims against the patient record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    pub inconsistencies: Vec<String>,
    pub ssn_matches: bool,
    pub dob_matches: bool,
    pub name_matches: bool,
    pub address_matches: bool,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

fn same(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Present, non-blank snapshot values only.
fn recorded(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub fn check(subject: &Subject, claims: &[Claim]) -> ConsistencyReport {
    let mut report = ConsistencyReport {
        inconsistencies: Vec::new(),
        ssn_matches: true,
        dob_matches: true,
        name_matches: true,
        address_matches: true,
    };

    for claim in claims {
        let Some(snap) = &claim.demographics else {
            continue;
        };
        let id = &claim.claim_id;

        if let Some(ssn) = recorded(&snap.ssn) {
            if !same(ssn, &subject.ssn) {
                report.ssn_matches = false;
                report
                    .inconsistencies
                    .push(format!("Claim {id}: SSN does not match patient record"));
            }
        }

        if let Some(dob) = snap.birthdate {
            if subject.birthdate != Some(dob) {
                report.dob_matches = false;
                let expected = subject
                    .birthdate
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "none".into());
                report.inconsistencies.push(format!(
                    "Claim {id}: birthdate {dob} does not match patient record {expected}"
                ));
            }
        }

        let first = recorded(&snap.first);
        let last = recorded(&snap.last);
        let first_differs = first.is_some_and(|f| !same(f, &subject.first));
        let last_differs = last.is_some_and(|l| !same(l, &subject.last));
        if first_differs || last_differs {
            report.name_matches = false;
            report.inconsistencies.push(format!(
                "Claim {id}: name '{} {}' does not match patient record '{} {}'",
                first.unwrap_or(&subject.first),
                last.unwrap_or(&subject.last),
                subject.first,
                subject.last
            ));
        }

        if let Some(address) = recorded(&snap.address) {
            if !same(address, &subject.address) {
                report.address_matches = false;
                report.inconsistencies.push(format!(
                    "Claim {id}: address '{address}' does not match patient record"
                ));
            }
        }
    }

    let dates: HashSet<_> = claims.iter().filter_map(|c| c.service_date).collect();
    if dates.len() > MAX_DISTINCT_SERVICE_DATES {
        report.inconsistencies.push(format!(
            "Multiple unique service dates detected ({})",
            dates.len()
        ));
    }

    if claims.len() > 1 {
        let costs: Vec<f64> = claims.iter().map(|c| c.total_claim_cost).collect();
        let avg = stats::mean(&costs);
        let max = stats::max(&costs);
        if max > avg * HIGH_COST_FACTOR {
            report.inconsistencies.push(format!(
                "Unusually high claim cost detected: ${max:.2} vs avg ${avg:.2}"
            ));
        }
    }

    report
}

pub struct PatientConsistencyTool {
    store: Arc<dyn RecordStore>,
}

impl PatientConsistencyTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PatientConsistencyTool {
    fn name(&self) -> &str {
        "patient_consistency"
    }

    fn description(&self) -> &str {
        "Check SSN, date of birth, name and address on every claim against the patient record."
    }

    fn input_schema(&self) -> Schema {
        Schema::new(vec![FieldSpec::string("subject_id")])
    }

    fn output_schema(&self) -> Schema {
        Schema::new(vec![
            FieldSpec::boolean("is_consistent"),
            FieldSpec::string_list("inconsistencies"),
            FieldSpec::boolean("ssn_matches"),
            FieldSpec::boolean("dob_matches"),
            FieldSpec::boolean("name_matches"),
            FieldSpec::boolean("address_matches"),
        ])
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let id = subject_id(self.name(), arguments)?;
        let subject = self.store.subject(id).map_err(|e| match e {
            StoreError::NotFound(_) => failure(self.name(), format!("Patient ID {id} not found")),
            other => failure(self.name(), other),
        })?;
        let claims = self
            .store
            .claims_for_subject(id)
            .map_err(|e| failure(self.name(), e))?;

        let report = check(&subject, &claims);
        info!(
            subject_id = id,
            is_consistent = report.is_consistent(),
            inconsistencies = report.inconsistencies.len(),
            "Consistency check"
        );

        Ok(fields(json!({
            "is_consistent": report.is_consistent(),
            "inconsistencies": report.inconsistencies,
            "ssn_matches": report.ssn_matches,
            "dob_matches": report.dob_matches,
            "name_matches": report.name_matches,
            "address_matches": report.address_matches,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn matching_demographics_are_consistent() {
        let tool = PatientConsistencyTool::new(fixtures::store());
        let out = tool.execute(&fixtures::args("p1")).await.unwrap();
        assert_eq!(out["is_consistent"], true);
        assert_eq!(out["inconsistencies"], json!([]));
        assert!(tool.output_schema().check(&out).is_ok());
    }

    #[test]
    fn mismatched_birthdate_is_reported() {
        let subject = fixtures::subject();
        let mut other = subject.snapshot();
        other.birthdate = NaiveDate::from_ymd_opt(1980, 5, 1);
        let claims = vec![
            fixtures::with_demographics(Claim::new("c1", "p1", "I10", 100.0), subject.snapshot()),
            fixtures::with_demographics(Claim::new("c2", "p1", "I10", 120.0), other),
        ];

        let report = check(&subject, &claims);
        assert!(!report.is_consistent());
        assert!(!report.dob_matches);
        assert!(report.ssn_matches && report.name_matches && report.address_matches);
        assert_eq!(report.inconsistencies.len(), 1);
        assert!(report.inconsistencies[0].contains("c2"));
        assert!(report.inconsistencies[0].contains("1980-05-01"));
    }

    #[test]
    fn name_comparison_ignores_case_and_blank_fields() {
        let subject = fixtures::subject();
        let mut snap = subject.snapshot();
        snap.first = Some("ADA".into());
        snap.last = Some("  ".into());
        snap.ssn = None;
        let claims = vec![fixtures::with_demographics(Claim::new("c1", "p1", "I10", 1.0), snap)];
        assert!(check(&subject, &claims).is_consistent());
    }

    #[test]
    fn high_cost_and_many_dates_heuristics() {
        let subject = fixtures::subject();
        let mut claims: Vec<Claim> = (0..6)
            .map(|i| {
                let mut c = Claim::new(format!("c{i}"), "p1", "I10", 100.0);
                c.service_date = NaiveDate::from_ymd_opt(2024, 1, 1 + i);
                c
            })
            .collect();
        claims[5].total_claim_cost = 10_000.0;

        let report = check(&subject, &claims);
        assert_eq!(report.inconsistencies.len(), 2);
        assert!(report.inconsistencies[0].starts_with("Multiple unique service dates"));
        assert!(report.inconsistencies[1].contains("$10000.00"));
        assert!(report.dob_matches);
    }

    #[test]
    fn claims_without_snapshot_are_skipped() {
        let subject = fixtures::subject();
        let claims = vec![Claim::new("c1", "p1", "I10", 100.0)];
        assert!(check(&subject, &claims).is_consistent());
    }
}
