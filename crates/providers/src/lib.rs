//! Reasoning backend implementations for MediGuard.
//!
//! All backends implement the `mediguard_core::Reasoner` trait.
//! The router builds the configured backend at startup.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatReasoner;
pub use router::{build_from_config, default_base_url};
