//! Error types for the MediGuard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; none of them unwind across
//! a stage boundary; the pipeline turns them into stage outcomes.

use thiserror::Error;

// --- Bounded context errors ---

/// Errors raised by a [`RecordStore`](crate::record::RecordStore) query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Subject not found: {0}")]
    NotFound(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised when invoking a tool through the registry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    UnknownName(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    ArgumentMismatch { tool: String, reason: String },

    #[error("Tool execution failed: {tool}: {reason}")]
    ExecutionFailure { tool: String, reason: String },
}

impl ToolError {
    /// Short machine-readable kind, used in logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownName(_) => "unknown_name",
            ToolError::ArgumentMismatch { .. } => "argument_mismatch",
            ToolError::ExecutionFailure { .. } => "execution_failure",
        }
    }
}

/// Errors raised by the reasoning backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::ExecutionFailure {
            tool: "fetch_patient_data".into(),
            reason: "subject not found".into(),
        };
        assert!(err.to_string().contains("fetch_patient_data"));
        assert!(err.to_string().contains("subject not found"));
        assert_eq!(err.kind(), "execution_failure");
    }

    #[test]
    fn timeout_is_classified() {
        assert!(ProviderError::Timeout("60s".into()).is_timeout());
        assert!(!ProviderError::Network("reset".into()).is_timeout());
    }
}
