//! Output validator: enforces a stage's output schema on reasoning output.
//!
//! Validation is strict on declared fields: any required field that is
//! absent or of the wrong type rejects the whole result. Unknown extra
//! fields are tolerated and passed through.

use mediguard_core::schema::{Schema, SchemaViolation};
use serde_json::Value;
use thiserror::Error;

use crate::context::StageResult;
use crate::extract::extract_payload;

/// Why a reasoning result was not accepted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Rejection {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("unparseable payload: {0}")]
    UnparseablePayload(String),
}

impl Rejection {
    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MissingField(_) => "missing_field",
            Rejection::TypeMismatch { .. } => "type_mismatch",
            Rejection::UnparseablePayload(_) => "unparseable_payload",
        }
    }
}

impl From<SchemaViolation> for Rejection {
    fn from(v: SchemaViolation) -> Self {
        match v {
            SchemaViolation::MissingField(field) => Rejection::MissingField(field),
            SchemaViolation::TypeMismatch {
                field,
                expected,
                found,
            } => Rejection::TypeMismatch {
                field,
                expected,
                found,
            },
        }
    }
}

/// The validator's verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Accepted(StageResult),
    Rejected(Rejection),
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted(_))
    }
}

/// Validate raw reasoning text against `schema`.
pub fn validate(raw: &str, schema: &Schema) -> Validation {
    let Some(payload) = extract_payload(raw) else {
        return Validation::Rejected(Rejection::UnparseablePayload(
            "no JSON object found in output".into(),
        ));
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => validate_value(&value, schema),
        Err(e) => Validation::Rejected(Rejection::UnparseablePayload(e.to_string())),
    }
}

/// Validate an already-parsed value against `schema`.
pub fn validate_value(value: &Value, schema: &Schema) -> Validation {
    let Value::Object(object) = value else {
        return Validation::Rejected(Rejection::UnparseablePayload(
            "payload is not a JSON object".into(),
        ));
    };

    match schema.check(object) {
        Ok(()) => Validation::Accepted(StageResult::new(object.clone())),
        Err(violation) => Validation::Rejected(violation.into()),
    }
}
