//! Batch State Store
//!
//! Typed key-value state attached to every participant and keyed by draw
//! batch. Each field is persisted as one JSON object document mapping the
//! batch id (decimal string) to a value, e.g. `{"1":true,"3":false}`.
//!
//! Reads never fail: a missing, blank or `null` document is the empty
//! mapping, and a document that does not parse is logged and treated as
//! empty. [`BatchStateStore::try_map`] exposes the strict result for
//! diagnostics.
//!
//! The store does not enforce relationships between fields. Keeping
//! `participation[b]` consistent with `eligibility[b]` belongs to the
//! registry and the draw engine.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use tracing::warn;

use crate::error::{DrawError, DrawResult};
use crate::types::BatchId;

/// Canonical empty document
pub const EMPTY_DOCUMENT: &str = "{}";

/// Typed handle to one batch-scoped field
pub struct Field<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Field<V> {
    /// Declare a field stored under `name`
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// Document name
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for Field<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Field<V> {}

impl<V> fmt::Debug for Field<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Eligibility granted for the batch
pub const ELIGIBILITY: Field<bool> = Field::new("eligibility_status");
/// Enrolled into the batch pool
pub const PARTICIPATION: Field<bool> = Field::new("participation_status");
/// When the participant was drawn as a winner
pub const DRAW_TIME: Field<DateTime<Utc>> = Field::new("draw_times");
/// Qualifying order number
pub const ORDER_NUMBER: Field<String> = Field::new("order_numbers");
/// When the qualifying order was placed
pub const ORDER_SIGN_TIME: Field<DateTime<Utc>> = Field::new("order_sign_times");
/// Winning draw code
pub const SUCCESS_CODE: Field<String> = Field::new("success_codes");
/// Winning code has been verified
pub const VERIFICATION_STATUS: Field<bool> = Field::new("verification_status");
/// When the winning code was verified
pub const VERIFICATION_TIME: Field<DateTime<Utc>> = Field::new("verification_times");

/// Every document a participant carries
pub const DOCUMENTS: [&str; 8] = [
    ELIGIBILITY.name(),
    PARTICIPATION.name(),
    DRAW_TIME.name(),
    ORDER_NUMBER.name(),
    ORDER_SIGN_TIME.name(),
    SUCCESS_CODE.name(),
    VERIFICATION_STATUS.name(),
    VERIFICATION_TIME.name(),
];

/// Per-participant batch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchStateStore {
    documents: BTreeMap<String, String>,
}

impl Default for BatchStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStateStore {
    /// Create a store with every document set to the empty mapping
    pub fn new() -> Self {
        let mut store = Self {
            documents: BTreeMap::new(),
        };
        store.normalize();
        store
    }

    /// Build from raw persisted documents
    pub fn from_documents(documents: BTreeMap<String, String>) -> Self {
        Self { documents }
    }

    /// Raw document text for a field name
    pub fn document(&self, name: &str) -> &str {
        self.documents.get(name).map(String::as_str).unwrap_or("")
    }

    /// Fill missing, blank or `null` documents with `{}`.
    ///
    /// Unparseable documents are kept as-is until the next write to that
    /// field replaces them.
    pub fn normalize(&mut self) {
        for name in DOCUMENTS {
            let doc = self.documents.entry(name.to_string()).or_default();
            if is_blank(doc) {
                *doc = EMPTY_DOCUMENT.to_string();
            }
        }
    }

    /// Strict decode of a whole field
    pub fn try_map<V: DeserializeOwned>(&self, field: Field<V>) -> DrawResult<BTreeMap<String, V>> {
        self.raw(field.name())?
            .into_iter()
            .map(|(batch, value)| {
                serde_json::from_value(value)
                    .map(|v| (batch.clone(), v))
                    .map_err(|e| DrawError::CorruptState {
                        field: field.name().to_string(),
                        reason: format!("entry {}: {}", batch, e),
                    })
            })
            .collect()
    }

    /// Decode a whole field, degrading corrupt documents and entries to absent
    pub fn map<V: DeserializeOwned>(&self, field: Field<V>) -> BTreeMap<String, V> {
        let raw = match self.raw(field.name()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(field = field.name(), error = %e, "Batch state document unreadable, treating as empty");
                return BTreeMap::new();
            }
        };

        raw.into_iter()
            .filter_map(|(batch, value)| match serde_json::from_value(value) {
                Ok(v) => Some((batch, v)),
                Err(e) => {
                    warn!(field = field.name(), batch = %batch, error = %e, "Batch state entry has wrong type, ignoring");
                    None
                }
            })
            .collect()
    }

    /// Value for one batch
    pub fn get<V: DeserializeOwned>(&self, field: Field<V>, batch: BatchId) -> Option<V> {
        self.map(field).remove(&batch.key())
    }

    /// Value for one batch, or the type's default
    pub fn get_or_default<V: DeserializeOwned + Default>(&self, field: Field<V>, batch: BatchId) -> V {
        self.get(field, batch).unwrap_or_default()
    }

    /// Boolean flag for one batch, absent meaning false
    pub fn flag(&self, field: Field<bool>, batch: BatchId) -> bool {
        self.get_or_default(field, batch)
    }

    /// Batches that carry an entry for `field`
    pub fn batches<V: DeserializeOwned>(&self, field: Field<V>) -> Vec<BatchId> {
        self.map(field)
            .keys()
            .filter_map(|key| BatchId::parse(key).ok())
            .collect()
    }

    /// Write one batch entry and return the updated document.
    ///
    /// Entries for other batches are preserved verbatim. A corrupt document
    /// is replaced.
    pub fn set<V: Serialize>(&mut self, field: Field<V>, batch: BatchId, value: V) -> DrawResult<&str> {
        let mut raw = match self.raw(field.name()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(field = field.name(), error = %e, "Overwriting unreadable batch state document");
                Map::new()
            }
        };
        raw.insert(batch.key(), serde_json::to_value(value)?);

        let encoded = serde_json::to_string(&raw)?;
        self.documents.insert(field.name().to_string(), encoded);
        Ok(self.document(field.name()))
    }

    fn raw(&self, name: &str) -> DrawResult<Map<String, Value>> {
        let doc = self.document(name);
        if is_blank(doc) {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(doc.trim()) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DrawError::CorruptState {
                field: name.to_string(),
                reason: format!("expected an object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(DrawError::CorruptState {
                field: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn is_blank(doc: &str) -> bool {
    let trimmed = doc.trim();
    trimmed.is_empty() || trimmed == "null"
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
