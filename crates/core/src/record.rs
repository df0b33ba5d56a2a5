//! Record domain types and the read-only store interface.
//!
//! Three linked record sets: a [`Subject`] owns many [`Claim`]s, and each
//! claim owns many [`ClaimLine`]s. Records are immutable for the duration of
//! a run; the pipeline only ever reads them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A patient, identified by a unique id, with demographic attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub ssn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub last: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

impl Subject {
    /// Create a subject with only an id; remaining attributes are empty.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ssn: String::new(),
            birthdate: None,
            first: String::new(),
            last: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip: String::new(),
            phone: String::new(),
            email: String::new(),
        }
    }

    /// The demographics a claim would be expected to carry for this subject.
    pub fn snapshot(&self) -> DemographicSnapshot {
        DemographicSnapshot {
            ssn: Some(self.ssn.clone()),
            birthdate: self.birthdate,
            first: Some(self.first.clone()),
            last: Some(self.last.clone()),
            address: Some(self.address.clone()),
        }
    }
}

/// Demographics as recorded on a claim at filing time.
///
/// Every field is optional: a claim only carries what the submitter sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A claim filed for exactly one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub subject_id: String,
    #[serde(default)]
    pub primary_diagnosis_code: String,
    #[serde(default)]
    pub primary_diagnosis_description: String,
    #[serde(default)]
    pub total_claim_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_date: Option<NaiveDate>,
    #[serde(default)]
    pub encounter_class: String,
    /// Subject demographics as submitted with this claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<DemographicSnapshot>,
}

impl Claim {
    pub fn new(
        claim_id: impl Into<String>,
        subject_id: impl Into<String>,
        diagnosis_code: impl Into<String>,
        total_claim_cost: f64,
    ) -> Self {
        Self {
            claim_id: claim_id.into(),
            subject_id: subject_id.into(),
            primary_diagnosis_code: diagnosis_code.into(),
            primary_diagnosis_description: String::new(),
            total_claim_cost,
            admission_date: None,
            discharge_date: None,
            service_date: None,
            encounter_class: String::new(),
            demographics: None,
        }
    }
}

/// A single billed line on a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub claim_id: String,
    pub line_id: u32,
    /// CPT/HCPCS procedure code
    #[serde(default)]
    pub procedure_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub charge_amount: f64,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(default)]
    pub reason_code: String,
    #[serde(default)]
    pub reason_description: String,
}

fn default_units() -> u32 {
    1
}

impl ClaimLine {
    pub fn new(
        claim_id: impl Into<String>,
        line_id: u32,
        procedure_code: impl Into<String>,
        charge_amount: f64,
    ) -> Self {
        Self {
            claim_id: claim_id.into(),
            line_id,
            procedure_code: procedure_code.into(),
            description: String::new(),
            charge_amount,
            units: default_units(),
            reason_code: String::new(),
            reason_description: String::new(),
        }
    }
}

/// The read-only query interface over the record sets.
///
/// Implementations must be safe to query from many concurrent runs; no
/// method takes `&mut self`, so no locking is involved.
pub trait RecordStore: Send + Sync {
    /// Look up a subject by id.
    fn subject(&self, id: &str) -> Result<Subject, StoreError>;

    /// All claims filed for a subject, in store order. Unknown subjects yield no claims.
    fn claims_for_subject(&self, id: &str) -> Result<Vec<Claim>, StoreError>;

    /// All lines belonging to any of the given claims, in store order.
    fn claim_lines_for_claims(&self, claim_ids: &[String]) -> Result<Vec<ClaimLine>, StoreError>;

    /// Up to `limit` subject ids, in store order.
    fn subject_ids(&self, limit: usize) -> Vec<String>;
}
