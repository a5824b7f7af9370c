//! Draw Engine Error Types
//!
//! Error definitions for allocation, state, draw and verification operations.

use thiserror::Error;

/// Draw engine error
#[derive(Error, Debug)]
pub enum DrawError {
    /// Malformed input (batch id, winner count, batch configuration)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown participant or batch
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate batch id or mobile
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Participant refused by batch policy
    #[error("Participant {participant} is not eligible for batch {batch}: {reason}")]
    Ineligible {
        participant: u32,
        batch: u32,
        reason: String,
    },

    /// Lost an optimistic version race
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Optimistic commit retries exhausted
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Random identifier space could not produce a free value
    #[error("Identifier space exhausted for {domain} after {attempts} attempts")]
    AllocationExhausted { domain: String, attempts: u32 },

    /// Unparseable batch state document
    #[error("Corrupt state document {field}: {reason}")]
    CorruptState { field: String, reason: String },

    /// Lock wait exceeded its bound
    #[error("Store timeout: {0}")]
    Timeout(String),

    /// Backend I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Draw engine result type
pub type DrawResult<T> = Result<T, DrawError>;

impl DrawError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        DrawError::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DrawError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(entity: &'static str, id: impl ToString) -> Self {
        DrawError::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a version conflict error
    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        DrawError::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an ineligibility error
    pub fn ineligible(participant: u32, batch: u32, reason: impl Into<String>) -> Self {
        DrawError::Ineligible {
            participant,
            batch,
            reason: reason.into(),
        }
    }

    /// Whether this error is a lost optimistic race
    pub fn is_conflict(&self) -> bool {
        matches!(self, DrawError::Conflict { .. })
    }

    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DrawError::Conflict { .. }
                | DrawError::RetryExhausted { .. }
                | DrawError::AllocationExhausted { .. }
                | DrawError::Timeout(_)
                | DrawError::Storage(_)
        )
    }
}

impl From<serde_json::Error> for DrawError {
    fn from(e: serde_json::Error) -> Self {
        DrawError::Serialization(e.to_string())
    }
}

impl From<sled::Error> for DrawError {
    fn from(e: sled::Error) -> Self {
        DrawError::Storage(e.to_string())
    }
}

impl From<hex::FromHexError> for DrawError {
    fn from(e: hex::FromHexError) -> Self {
        DrawError::Serialization(format!("Hex decode error: {}", e))
    }
}
