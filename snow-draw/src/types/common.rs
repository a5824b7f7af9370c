//! Common identifier types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DrawError, DrawResult};

/// Participant identifier (six digits in the default range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// Raw value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Big-endian storage key
    pub fn to_key(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ParticipantId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Draw batch identifier
///
/// Batch ids are small positive integers. Inside participant state documents
/// they are keyed by their decimal string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u32);

impl BatchId {
    /// Create a batch id, rejecting zero
    pub fn new(value: u32) -> DrawResult<Self> {
        if value == 0 {
            return Err(DrawError::validation("batch id must be a positive integer"));
        }
        Ok(Self(value))
    }

    /// Parse an inbound batch id string
    pub fn parse(raw: &str) -> DrawResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DrawError::validation("batch id is empty"));
        }
        let value: u32 = trimmed
            .parse()
            .map_err(|_| DrawError::validation(format!("batch id is not numeric: {:?}", raw)))?;
        Self::new(value)
    }

    /// Raw value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Key used inside batch state documents
    pub fn key(&self) -> String {
        self.0.to_string()
    }

    /// Big-endian storage key
    pub fn to_key(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = DrawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
