//! Stage definitions.
//!
//! A [`Stage`] is pure configuration: a name, the tools it always runs
//! before reasoning (in order), a prompt template and an output schema. It
//! holds no state between runs.
//!
//! Tool outputs are merged by field name in declared order, so when two
//! tools report the same derived field the later tool's value wins. Such
//! overlaps are computed from the tools' output schemas when the pipeline
//! is built (see [`Stage::overlapping_fields`]) and stated in the prompt.

use mediguard_config::StageConfig;
use mediguard_core::record::Subject;
use mediguard_core::schema::Schema;
use mediguard_core::tool::ToolRegistry;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::context::StageResult;

/// A permitted tool plus the static arguments merged into each call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
        }
    }
}

/// A derived field written by more than one of a stage's tools.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOverlap {
    pub field: String,
    /// Tools writing the field, in execution order
    pub tools: Vec<String>,
    /// The tool whose value is kept (the last one)
    pub winner: String,
}

/// Everything a template may draw on when rendering a prompt.
pub struct PromptInputs<'a> {
    pub stage: &'a str,
    pub instruction: &'a str,
    pub subject: &'a Subject,
    /// Accepted results of earlier stages, in order
    pub prior: &'a [(&'a str, &'a StageResult)],
    /// Tool outputs merged by field name
    pub evidence: &'a Map<String, Value>,
    pub overlaps: &'a [FieldOverlap],
    pub schema: &'a Schema,
}

pub type RenderFn = dyn Fn(&PromptInputs<'_>) -> String + Send + Sync;

/// An instruction plus a render function.
#[derive(Clone)]
pub struct PromptTemplate {
    instruction: String,
    render: Arc<RenderFn>,
}

impl PromptTemplate {
    /// Use the standard layout: instruction, subject, prior results, tool
    /// evidence, output contract.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            render: Arc::new(render_default),
        }
    }

    pub fn custom<F>(instruction: impl Into<String>, render: F) -> Self
    where
        F: Fn(&PromptInputs<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            instruction: instruction.into(),
            render: Arc::new(render),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn render(&self, inputs: &PromptInputs<'_>) -> String {
        (self.render)(inputs)
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("instruction", &self.instruction)
            .finish_non_exhaustive()
    }
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".into())
}

/// The standard prompt layout.
pub fn render_default(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", inputs.instruction);

    let _ = writeln!(out, "## Patient {}", inputs.subject.id);
    let _ = writeln!(out, "{}\n", pretty(inputs.subject));

    if !inputs.prior.is_empty() {
        let _ = writeln!(out, "## Prior stage results");
        for (stage, result) in inputs.prior {
            let _ = writeln!(out, "### {stage}\n{}\n", pretty(result));
        }
    }

    if !inputs.evidence.is_empty() {
        let _ = writeln!(out, "## Tool evidence");
        let _ = writeln!(out, "{}\n", pretty(inputs.evidence));
        for overlap in inputs.overlaps {
            let _ = writeln!(
                out,
                "Note: '{}' is reported by {}; the value from {} is shown.",
                overlap.field,
                overlap.tools.join(", "),
                overlap.winner
            );
        }
        if !inputs.overlaps.is_empty() {
            out.push('\n');
        }
    }

    let _ = writeln!(out, "## Required output");
    let _ = writeln!(
        out,
        "Respond with ONLY a JSON object containing these fields:\n{}",
        inputs.schema.describe()
    );
    out
}

/// A named unit pairing permitted tools with a prompt template and an
/// output schema.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub tools: Vec<ToolInvocation>,
    pub template: PromptTemplate,
    pub output: Schema,
}

impl Stage {
    pub fn new(name: impl Into<String>, template: PromptTemplate, output: Schema) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            template,
            output,
        }
    }

    /// Append a tool with no static arguments.
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(ToolInvocation::new(name));
        self
    }

    /// Append a tool with static arguments.
    pub fn with_tool_args(mut self, name: impl Into<String>, args: Map<String, Value>) -> Self {
        self.tools.push(ToolInvocation {
            name: name.into(),
            args,
        });
        self
    }

    pub fn from_config(config: &StageConfig) -> Self {
        Self {
            name: config.name.clone(),
            tools: config
                .tools
                .iter()
                .map(|t| ToolInvocation {
                    name: t.name.clone(),
                    args: t.args.clone(),
                })
                .collect(),
            template: PromptTemplate::new(config.instruction.clone()),
            output: config.output.clone(),
        }
    }

    /// Derived fields written by more than one of this stage's tools.
    ///
    /// Tools missing from `registry` are ignored here; pipeline
    /// construction rejects them separately.
    pub fn overlapping_fields(&self, registry: &ToolRegistry) -> Vec<FieldOverlap> {
        let mut writers: Vec<(String, Vec<String>)> = Vec::new();
        for invocation in &self.tools {
            let Some(tool) = registry.get(&invocation.name) else {
                continue;
            };
            for field in tool.output_schema().field_names() {
                match writers.iter_mut().find(|(f, _)| f == field) {
                    Some((_, tools)) => tools.push(invocation.name.clone()),
                    None => writers.push((field.to_string(), vec![invocation.name.clone()])),
                }
            }
        }

        writers
            .into_iter()
            .filter(|(_, tools)| tools.len() > 1)
            .filter_map(|(field, tools)| {
                let winner = tools.last()?.clone();
                Some(FieldOverlap { field, tools, winner })
            })
            .collect()
    }
}

/// The built-in identity → billing → discharge stages.
pub fn builtin_stages() -> Vec<Stage> {
    mediguard_config::default_stages()
        .iter()
        .map(Stage::from_config)
        .collect()
}
