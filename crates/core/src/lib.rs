//! # MediGuard Core
//!
//! Domain types, traits, and error definitions for the MediGuard
//! claims-analysis pipeline. This crate has **no framework dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the pipeline is defined as a trait here:
//! - [`RecordStore`] is the read-only tabular store of subjects, claims and claim lines
//! - [`Tool`] is a named, schema-typed read/compute function over the store
//! - [`Reasoner`] is the natural-language reasoning capability
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted stand-ins without touching the orchestrator.

pub mod error;
pub mod event;
pub mod reasoner;
pub mod record;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use reasoner::{Reasoner, ReasoningRequest, ReasoningResponse, Usage};
pub use record::{Claim, ClaimLine, DemographicSnapshot, RecordStore, Subject};
pub use schema::{FieldKind, FieldSpec, Schema, SchemaViolation};
pub use tool::{Tool, ToolCall, ToolOutput, ToolRegistry};
