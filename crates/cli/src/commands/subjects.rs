//! `mediguard subjects`: list patient ids in the record snapshot.

use mediguard_core::record::RecordStore;
use mediguard_records::InMemoryRecordStore;
use std::path::{Path, PathBuf};

pub fn run(limit: usize, records: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(records)?;
    for id in list(&config.data.records_path, limit)? {
        println!("{id}");
    }
    Ok(())
}

fn list(path: &Path, limit: usize) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let store = InMemoryRecordStore::load_json(path)?;
    Ok(store.subject_ids(limit))
}
