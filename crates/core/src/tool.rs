//! Tool trait: the abstraction over the pipeline's data lookups.
//!
//! Tools are named, schema-typed functions that read from the record store
//! or compute derived statistics from it. They never mutate the store.
//! Stages declare which tools run before their reasoning step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::schema::Schema;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The typed result of a tool execution: derived field name → value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The tool that produced these fields
    pub tool: String,

    /// Derived fields, conforming to the tool's output schema
    pub fields: Map<String, Value>,
}

/// The core Tool trait.
///
/// Each tool (fetch_patient_data, claim_statistics, ...) implements this
/// trait. Tools are registered in the [`ToolRegistry`], which checks
/// arguments before execution and outputs after it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "claim_statistics").
    fn name(&self) -> &str;

    /// A description of what this tool computes.
    fn description(&self) -> &str;

    /// Declared arguments.
    fn input_schema(&self) -> Schema;

    /// Declared derived fields.
    fn output_schema(&self) -> Schema;

    /// Execute the tool with already-validated arguments.
    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError>;
}

type ToolFn = dyn Fn(&Map<String, Value>) -> Result<Map<String, Value>, String> + Send + Sync;

/// A tool assembled from a plain function and explicit schemas.
struct FnTool {
    name: String,
    description: String,
    input: Schema,
    output: Schema,
    func: Box<ToolFn>,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Schema {
        self.input.clone()
    }

    fn output_schema(&self) -> Schema {
        self.output.clone()
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        (self.func)(arguments).map_err(|reason| ToolError::ExecutionFailure {
            tool: self.name.clone(),
            reason,
        })
    }
}

/// A registry of available tools.
///
/// The pipeline uses this to:
/// 1. Verify at build time that every stage's tools exist
/// 2. Invoke tools by name with argument and output checking
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Register a plain function as a tool.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        input: Schema,
        output: Schema,
        func: F,
    ) where
        F: Fn(&Map<String, Value>) -> Result<Map<String, Value>, String> + Send + Sync + 'static,
    {
        let name = name.into();
        self.register(Box::new(FnTool {
            description: format!("{name} (function tool)"),
            name,
            input,
            output,
            func: Box::new(func),
        }));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool.
    ///
    /// Arguments are checked against the input schema before execution;
    /// the result is checked against the output schema after it. A tool that
    /// returns non-conforming output is reported as an execution failure.
    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownName(call.name.clone()))?;

        tool.input_schema()
            .check(&call.arguments)
            .map_err(|v| ToolError::ArgumentMismatch {
                tool: call.name.clone(),
                reason: v.to_string(),
            })?;

        let fields = tool.execute(&call.arguments).await?;

        tool.output_schema()
            .check(&fields)
            .map_err(|v| ToolError::ExecutionFailure {
                tool: call.name.clone(),
                reason: format!("malformed output: {v}"),
            })?;

        Ok(ToolOutput {
            tool: call.name.clone(),
            fields,
        })
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
