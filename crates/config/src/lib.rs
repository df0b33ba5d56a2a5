//! Configuration loading, validation, and management for MediGuard.
//!
//! Loads configuration from `~/.mediguard/config.toml` with environment
//! variable overrides. Validates all settings at startup; the resulting
//! config is immutable for the lifetime of the process.

use mediguard_core::schema::{FieldSpec, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Upper bound on `pipeline.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// The root configuration structure.
///
/// Maps directly to `~/.mediguard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning backend configuration
    #[serde(default)]
    pub reasoner: ReasonerConfig,

    /// Stage list, retry bound and timeout
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Record snapshot location
    #[serde(default)]
    pub data: DataConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash-lite".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            api_url: None,
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ReasonerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasonerConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Additional reasoning attempts after the first; a stage makes at most
    /// `max_retries + 1` attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-call reasoning timeout
    #[serde(default = "default_reasoning_timeout")]
    pub reasoning_timeout_secs: u64,

    /// Ordered stage list
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
}

fn default_max_retries() -> u32 {
    2
}
fn default_reasoning_timeout() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            reasoning_timeout_secs: default_reasoning_timeout(),
            stages: default_stages(),
        }
    }
}

/// One configured stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    /// Role and task description placed at the top of the prompt
    #[serde(default)]
    pub instruction: String,

    /// Tools executed, in order, before reasoning
    #[serde(default)]
    pub tools: Vec<ToolInvocationConfig>,

    /// Required output fields
    #[serde(default)]
    pub output: Schema,
}

/// A permitted tool plus static arguments merged into every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl ToolInvocationConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// The built-in identity → billing → discharge sequence.
pub fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            name: "identity".into(),
            instruction: "You are the MediGuard identity and claims fraud analyst. \
                Assess the patient for identity misuse: demographic details that \
                disagree across claims (SSN, date of birth, name, address), claim \
                amounts far outside the patient's typical range, and claim sequences \
                associated with identity theft. Every inconsistency reported by the \
                consistency check must be addressed in your reasons."
                .into(),
            tools: vec![
                ToolInvocationConfig::new("fetch_patient_data"),
                ToolInvocationConfig::new("claim_statistics"),
                ToolInvocationConfig::new("patient_consistency"),
            ],
            output: Schema::new(vec![
                FieldSpec::integer("fraud_risk_score").range(0.0, 100.0),
                FieldSpec::boolean("identity_misuse_flag"),
                FieldSpec::string_list("reasons"),
            ]),
        },
        StageConfig {
            name: "billing".into(),
            instruction: "You are the MediGuard billing fraud analyst. Build on the \
                identity assessment. Look for procedures not supported by the \
                diagnosis, duplicate or add-on procedures, charges above normal \
                ranges and suspicious billing combinations. Name every charge \
                outlier in your flags."
                .into(),
            tools: vec![
                ToolInvocationConfig::new("claim_statistics"),
                ToolInvocationConfig::new("charge_statistics")
                    .with_arg("outlier_sigma", Value::from(2.0)),
                ToolInvocationConfig::new("diagnosis_procedure_match"),
            ],
            output: Schema::new(vec![
                FieldSpec::integer("billing_risk_score").range(0.0, 100.0),
                FieldSpec::string_list("billing_flags"),
                FieldSpec::string("billing_explanation"),
            ]),
        },
        StageConfig {
            name: "discharge".into(),
            instruction: "You are the MediGuard discharge coordinator. Decide whether \
                the patient is ready for discharge, list the blockers that remain \
                (pending labs, scans, paperwork, unresolved billing or identity \
                concerns) and estimate the delay in hours if not ready."
                .into(),
            tools: vec![ToolInvocationConfig::new("encounter_summary")],
            output: Schema::new(vec![
                FieldSpec::boolean("discharge_ready"),
                FieldSpec::string_list("blockers"),
                FieldSpec::number("delay_hours").at_least(0.0),
                FieldSpec::one_of("priority_level", &["LOW", "MEDIUM", "HIGH"]).optional(),
            ]),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON snapshot with `subjects`, `claims` and `claim_lines`
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

fn default_records_path() -> PathBuf {
    AppConfig::config_dir().join("records.json")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mediguard/config.toml).
    ///
    /// Also checks environment variables:
    /// - `MEDIGUARD_API_KEY` (highest priority), `OPENROUTER_API_KEY`,
    ///   `OPENAI_API_KEY`, `GOOGLE_API_KEY`
    /// - `MEDIGUARD_PROVIDER`, `MEDIGUARD_MODEL`, `MEDIGUARD_RECORDS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.reasoner.api_key.is_none() {
            self.reasoner.api_key = [
                "MEDIGUARD_API_KEY",
                "OPENROUTER_API_KEY",
                "OPENAI_API_KEY",
                "GOOGLE_API_KEY",
            ]
            .iter()
            .find_map(|key| lookup(key));
        }

        if let Some(provider) = lookup("MEDIGUARD_PROVIDER") {
            self.reasoner.provider = provider;
        }

        if let Some(model) = lookup("MEDIGUARD_MODEL") {
            self.reasoner.model = model;
        }

        if let Some(path) = lookup("MEDIGUARD_RECORDS") {
            self.data.records_path = PathBuf::from(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mediguard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoner.temperature < 0.0 || self.reasoner.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "reasoner.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.pipeline.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }

        if self.pipeline.reasoning_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.reasoning_timeout_secs must be > 0".into(),
            ));
        }

        if self.pipeline.stages.is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.stages must declare at least one stage".into(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.pipeline.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.output.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}' must declare at least one output field",
                    stage.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.reasoner.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
