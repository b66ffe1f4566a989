//! Core types shared by the mirror, the adapter and the datastore.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Raw document fields.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Stable document identifier, unique within a collection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        // A clock before the epoch maps to zero; one past i64 saturates.
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Self::saturating_micros(d.as_micros()))
            .unwrap_or_default();
        Timestamp(micros)
    }

    fn saturating_micros(micros: u128) -> i64 {
        i64::try_from(micros).unwrap_or(i64::MAX)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A snapshot of one remote document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Full slash-separated path, e.g. `restaurants/abc`.
    pub path: String,

    /// Document fields, replaced wholesale on every modification.
    pub data: Payload,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<String>, data: Payload) -> Self {
        Self {
            id: DocumentId(id.into()),
            path: path.into(),
            data,
        }
    }

    /// Build a document from a JSON object literal. Non-object values yield
    /// an empty payload.
    pub fn from_json(id: impl Into<String>, path: impl Into<String>, value: serde_json::Value) -> Self {
        let data = match value {
            serde_json::Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self::new(id, path, data)
    }

    /// Look up a field, following dots into nested objects.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        let mut parts = name.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Deserialize the payload into a model type.
    pub fn to_object<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::Value::Object(self.data.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// One change delivered by a source. Indices are relative to the mirror as
/// it stands after every earlier record of the same batch has been applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeRecord {
    Added {
        document: Document,
        new_index: usize,
    },
    Modified {
        document: Document,
        old_index: usize,
        new_index: usize,
    },
    Removed {
        document: Document,
        old_index: usize,
    },
}

impl ChangeRecord {
    pub fn document(&self) -> &Document {
        match self {
            ChangeRecord::Added { document, .. }
            | ChangeRecord::Modified { document, .. }
            | ChangeRecord::Removed { document, .. } => document,
        }
    }
}

/// An ordered set of changes taking the query result from one consistent
/// state to the next.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub changes: Vec<ChangeRecord>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<ChangeRecord>) -> Self {
        Self { changes }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<ChangeRecord> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeRecord>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}
