//! Record store implementations for MediGuard.
//!
//! The pipeline treats the store as an external read-only query service; this
//! crate provides the in-process snapshot used by the CLI, the gateway and
//! the test suites.

pub mod in_memory;

pub use in_memory::{InMemoryRecordStore, RecordSnapshot};
