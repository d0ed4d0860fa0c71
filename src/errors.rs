//! Error types for the agentloop orchestrator
//!
//! Provides a single error enum with context propagation across the
//! adapter, checkpoint, and loop layers.

use thiserror::Error;

/// Main error type for the orchestration loop
#[derive(Error, Debug)]
pub enum LoopError {
    /// Requested adapter is not installed or not responding
    #[error("Adapter '{0}' is not available")]
    AdapterUnavailable(String),

    /// Auto-detection found no usable agent CLI
    #[error("No AI agent CLI found on PATH (looked for claude, q, gemini)")]
    NoAgentDetected,

    /// Prompt file is missing
    #[error("Prompt file not found: {0}")]
    PromptMissing(String),

    /// Prompt file exceeds the configured size cap
    #[error("Prompt file too large: {size} bytes exceeds limit of {limit} bytes")]
    PromptTooLarge { size: u64, limit: u64 },

    /// Git checkpoint command failed
    #[error("Git command failed: {0}")]
    Git(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Orchestrator error: {0}")]
    Generic(String),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, LoopError>;

/// Convert anyhow errors to LoopError
impl From<anyhow::Error> for LoopError {
    fn from(err: anyhow::Error) -> Self {
        LoopError::Generic(err.to_string())
    }
}
