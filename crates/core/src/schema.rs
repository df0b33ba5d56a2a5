//! Field schemas: the typed contract shared by tool arguments, tool
//! outputs and stage outputs.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s. Checking is strict on
//! declared fields and lenient on everything else: unknown extra fields are
//! tolerated, while a required field that is absent or of the wrong type
//! fails the whole object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The expected type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A whole number; `min`/`max` bound it inclusively.
    Integer,
    /// Any JSON number; `min`/`max` bound it inclusively.
    Number,
    Boolean,
    String,
    /// An array whose items are all strings.
    StringList,
    /// An array of anything.
    List,
    Object,
    /// A string drawn from `values`.
    OneOf,
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Allowed values for [`FieldKind::OneOf`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            min: None,
            max: None,
            values: Vec::new(),
            required: true,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn one_of(name: impl Into<String>, values: &[&str]) -> Self {
        let mut spec = Self::new(name, FieldKind::OneOf);
        spec.values = values.iter().map(|v| v.to_string()).collect();
        spec
    }

    /// Bound a numeric field inclusively.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Human-readable expected type, e.g. `integer in [0, 100]`.
    pub fn expected(&self) -> String {
        let bounds = match (self.min, self.max) {
            (Some(lo), Some(hi)) => format!(" in [{lo}, {hi}]"),
            (Some(lo), None) => format!(" >= {lo}"),
            (None, Some(hi)) => format!(" <= {hi}"),
            (None, None) => String::new(),
        };
        match self.kind {
            FieldKind::Integer => format!("integer{bounds}"),
            FieldKind::Number => format!("number{bounds}"),
            FieldKind::Boolean => "boolean".into(),
            FieldKind::String => "string".into(),
            FieldKind::StringList => "list of strings".into(),
            FieldKind::List => "list".into(),
            FieldKind::Object => "object".into(),
            FieldKind::OneOf => format!("one of {}", self.values.join(" | ")),
        }
    }

    /// Check a present value against this field's type and bounds.
    pub fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        let ok = match self.kind {
            FieldKind::Integer => value
                .as_f64()
                .filter(|n| n.fract() == 0.0)
                .is_some_and(|n| self.in_bounds(n)),
            FieldKind::Number => value.as_f64().is_some_and(|n| self.in_bounds(n)),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::String => value.is_string(),
            FieldKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldKind::List => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::OneOf => value
                .as_str()
                .is_some_and(|s| self.values.iter().any(|v| v == s)),
        };

        if ok {
            Ok(())
        } else {
            Err(SchemaViolation::TypeMismatch {
                field: self.name.clone(),
                expected: self.expected(),
                found: describe_value(value),
            })
        }
    }

    fn in_bounds(&self, n: f64) -> bool {
        self.min.is_none_or(|lo| n >= lo) && self.max.is_none_or(|hi| n <= hi)
    }
}

/// Why an object does not satisfy a [`Schema`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaViolation {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
}

/// An ordered set of declared fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check an object against every declared field, in declaration order.
    ///
    /// The first violation wins. Optional fields are only type-checked when
    /// present and non-null.
    pub fn check(&self, object: &Map<String, Value>) -> Result<(), SchemaViolation> {
        for spec in &self.fields {
            match object.get(&spec.name) {
                None => {
                    if spec.required {
                        return Err(SchemaViolation::MissingField(spec.name.clone()));
                    }
                }
                Some(Value::Null) if !spec.required => {}
                Some(value) => spec.check(value)?,
            }
        }
        Ok(())
    }

    /// One line per field: `- name: expected (required)`.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                let req = if f.required { "required" } else { "optional" };
                format!("- {}: {} ({req})", f.name, f.expected())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<FieldSpec>> for Schema {
    fn from(fields: Vec<FieldSpec>) -> Self {
        Self::new(fields)
    }
}

/// Describe a JSON value for error messages.
fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) if s.len() > 40 => "string".into(),
        Value::String(s) => format!("string \"{s}\""),
        Value::Array(items) => format!("list of {} items", items.len()),
        Value::Object(_) => "object".into(),
    }
}
