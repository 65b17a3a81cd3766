//! Error types for autoheal
//!
//! Internal operations return `Result<T, RecoveryError>`. The public service
//! operations never surface these to callers; they degrade to a defined
//! fallback value and log the cause instead.

use thiserror::Error;

/// Main error type for the recovery pipeline
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Reasoning oracle could not be reached or answered with an error
    #[error("Reasoning oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Reasoning oracle did not answer in time
    #[error("Reasoning oracle timed out after {duration_ms}ms")]
    OracleTimeout { duration_ms: u64 },

    /// Oracle output parsed but violated the expected schema
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// JSON extraction or parsing errors
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// A primitive recovery action reported failure
    #[error("Step '{action}' failed: {reason}")]
    StepFailed { action: String, reason: String },

    /// A primitive recovery action exceeded its timeout
    #[error("Step '{action}' timed out after {duration_ms}ms")]
    StepTimeout { action: String, duration_ms: u64 },

    /// The browser driver does not implement this action
    #[error("Unsupported recovery action: {0}")]
    UnsupportedAction(String),

    /// Execution was cancelled by a stop signal
    #[error("Recovery cancelled")]
    Cancelled,

    /// External storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Recovery error: {0}")]
    Generic(String),
}

impl RecoveryError {
    /// Whether this error came from the reasoning oracle boundary
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            RecoveryError::OracleUnavailable(_)
                | RecoveryError::OracleTimeout { .. }
                | RecoveryError::SchemaViolation(_)
                | RecoveryError::JsonParseError(_)
        )
    }
}

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Convert anyhow errors to RecoveryError
impl From<anyhow::Error> for RecoveryError {
    fn from(err: anyhow::Error) -> Self {
        RecoveryError::Generic(err.to_string())
    }
}
