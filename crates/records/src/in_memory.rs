//! In-memory store: a snapshot of subjects, claims and claim lines.
//!
//! Indexed once at construction and never mutated afterwards, so any number
//! of concurrent runs can query it through a shared `Arc` without locking.

use mediguard_core::error::StoreError;
use mediguard_core::record::{Claim, ClaimLine, RecordStore, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// The on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSnapshot {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub claim_lines: Vec<ClaimLine>,
}

/// A read-only, indexed record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    /// Subjects in snapshot order
    subjects: Vec<Subject>,
    subject_index: HashMap<String, usize>,
    claims_by_subject: HashMap<String, Vec<Claim>>,
    lines_by_claim: HashMap<String, Vec<ClaimLine>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a snapshot.
    ///
    /// Duplicate subject ids keep the first occurrence. Claims and lines
    /// referencing unknown parents are kept but logged.
    pub fn from_snapshot(snapshot: RecordSnapshot) -> Self {
        let mut store = Self::new();

        for subject in snapshot.subjects {
            if store.subject_index.contains_key(&subject.id) {
                warn!(subject_id = %subject.id, "Duplicate subject in snapshot, keeping first");
                continue;
            }
            store.subject_index.insert(subject.id.clone(), store.subjects.len());
            store.subjects.push(subject);
        }

        for claim in snapshot.claims {
            if !store.subject_index.contains_key(&claim.subject_id) {
                warn!(
                    claim_id = %claim.claim_id,
                    subject_id = %claim.subject_id,
                    "Claim references unknown subject"
                );
            }
            store
                .claims_by_subject
                .entry(claim.subject_id.clone())
                .or_default()
                .push(claim);
        }

        let known_claims: std::collections::HashSet<&str> = store
            .claims_by_subject
            .values()
            .flatten()
            .map(|c| c.claim_id.as_str())
            .collect();
        let mut orphans = 0usize;
        let mut lines_by_claim: HashMap<String, Vec<ClaimLine>> = HashMap::new();
        for line in snapshot.claim_lines {
            if !known_claims.contains(line.claim_id.as_str()) {
                orphans += 1;
            }
            lines_by_claim.entry(line.claim_id.clone()).or_default().push(line);
        }
        if orphans > 0 {
            warn!(count = orphans, "Claim lines reference unknown claims");
        }
        store.lines_by_claim = lines_by_claim;

        store
    }

    /// Load a JSON snapshot (`{subjects, claims, claim_lines}`) from disk.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let snapshot: RecordSnapshot = serde_json::from_str(&content).map_err(|e| {
            StoreError::Unavailable(format!("invalid snapshot {}: {e}", path.display()))
        })?;

        let store = Self::from_snapshot(snapshot);
        info!(
            path = %path.display(),
            subjects = store.subjects.len(),
            claims = store.claim_count(),
            "Record snapshot loaded"
        );
        Ok(store)
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn claim_count(&self) -> usize {
        self.claims_by_subject.values().map(Vec::len).sum()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn subject(&self, id: &str) -> Result<Subject, StoreError> {
        self.subject_index
            .get(id)
            .map(|&idx| self.subjects[idx].clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn claims_for_subject(&self, id: &str) -> Result<Vec<Claim>, StoreError> {
        Ok(self.claims_by_subject.get(id).cloned().unwrap_or_default())
    }

    fn claim_lines_for_claims(&self, claim_ids: &[String]) -> Result<Vec<ClaimLine>, StoreError> {
        Ok(claim_ids
            .iter()
            .filter_map(|id| self.lines_by_claim.get(id))
            .flatten()
            .cloned()
            .collect())
    }

    fn subject_ids(&self, limit: usize) -> Vec<String> {
        self.subjects.iter().take(limit).map(|s| s.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn snapshot() -> RecordSnapshot {
        RecordSnapshot {
            subjects: vec![Subject::new("p1"), Subject::new("p2"), Subject::new("p3")],
            claims: vec![
                Claim::new("c1", "p1", "E11.9", 120.0),
                Claim::new("c2", "p1", "I10", 80.0),
                Claim::new("c3", "p2", "J45", 40.0),
            ],
            claim_lines: vec![
                ClaimLine::new("c1", 1, "99213", 60.0),
                ClaimLine::new("c1", 2, "83036", 60.0),
                ClaimLine::new("c2", 1, "99212", 80.0),
                ClaimLine::new("c3", 1, "94010", 40.0),
            ],
        }
    }

    #[test]
    fn subject_lookup() {
        let store = InMemoryRecordStore::from_snapshot(snapshot());
        assert_eq!(store.subject("p2").unwrap().id, "p2");
        assert_eq!(
            store.subject("missing"),
            Err(StoreError::NotFound("missing".into()))
        );
    }

    #[test]
    fn claims_and_lines_follow_store_order() {
        let store = InMemoryRecordStore::from_snapshot(snapshot());
        let claims = store.claims_for_subject("p1").unwrap();
        let ids: Vec<String> = claims.iter().map(|c| c.claim_id.clone()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let lines = store.claim_lines_for_claims(&ids).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].procedure_code, "99213");
        assert_eq!(lines[2].claim_id, "c2");
    }

    #[test]
    fn subject_without_claims_yields_empty() {
        let store = InMemoryRecordStore::from_snapshot(snapshot());
        assert!(store.claims_for_subject("p3").unwrap().is_empty());
        assert!(store.claim_lines_for_claims(&[]).unwrap().is_empty());
    }

    #[test]
    fn subject_ids_respects_limit_and_order() {
        let store = InMemoryRecordStore::from_snapshot(snapshot());
        assert_eq!(store.subject_ids(2), vec!["p1", "p2"]);
        assert_eq!(store.subject_ids(10).len(), 3);
    }

    #[test]
    fn duplicate_subject_keeps_first() {
        let mut snap = snapshot();
        let mut dup = Subject::new("p1");
        dup.first = "Other".into();
        snap.subjects.push(dup);
        let store = InMemoryRecordStore::from_snapshot(snap);
        assert_eq!(store.subject_count(), 3);
        assert_eq!(store.subject("p1").unwrap().first, "");
    }

    #[test]
    fn load_json_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "subjects": [{{"id": "p1", "first": "Ada", "birthdate": "1970-01-02"}}],
                "claims": [{{"claim_id": "c1", "subject_id": "p1", "total_claim_cost": 99.5,
                             "service_date": "2024-03-01"}}],
                "claim_lines": [{{"claim_id": "c1", "line_id": 1, "procedure_code": "99213",
                                  "charge_amount": 99.5}}]
            }}"#
        )
        .unwrap();

        let store = InMemoryRecordStore::load_json(file.path()).unwrap();
        let subject = store.subject("p1").unwrap();
        assert_eq!(subject.first, "Ada");
        assert_eq!(subject.birthdate, chrono::NaiveDate::from_ymd_opt(1970, 1, 2));
        assert_eq!(store.claim_count(), 1);
    }

    #[test]
    fn load_json_reports_unavailable() {
        let err =
            InMemoryRecordStore::load_json(Path::new("/nonexistent/records.json")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
