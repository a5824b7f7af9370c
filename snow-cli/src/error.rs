//! CLI Error Types
//!
//! Error types for the snow draw CLI application.

use snow_draw::DrawError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Entity not found
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// JSON formatting error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Engine error
    #[error("{0}")]
    DrawError(#[from] DrawError),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        CliError::ConfigError {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        CliError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        CliError::NotFound { id: id.into() }
    }

    /// Get exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigError { .. } => 1,
            CliError::InvalidArgument { .. } => 2,
            CliError::NotFound { .. } => 21,
            CliError::JsonError(_) => 6,
            CliError::DrawError(e) => match e {
                DrawError::Configuration(_) => 1,
                DrawError::Validation(_) => 2,
                DrawError::Ineligible { .. } => 3,
                DrawError::AlreadyExists { .. } => 4,
                DrawError::NotFound { .. } => 21,
                DrawError::Conflict { .. }
                | DrawError::RetryExhausted { .. }
                | DrawError::AllocationExhausted { .. }
                | DrawError::Timeout(_) => 22,
                DrawError::Storage(_) | DrawError::Serialization(_) | DrawError::CorruptState { .. } => 31,
            },
        }
    }
}
