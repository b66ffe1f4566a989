//! Optimistic transactions over the in-memory store.

use crate::error::{Result, SyncError};
use crate::types::{Document, Payload};
use serde::Serialize;
use std::collections::HashMap;

use super::store::{to_payload, validate_document_path, Inner};

/// A buffered write.
#[derive(Clone, Debug)]
pub(crate) enum Write {
    Set(String, Payload),
    Delete(String),
}

/// Reads and buffered writes of one transaction attempt.
///
/// Reads record the version they saw; writes are held back until commit.
/// As with hosted document stores, every read must happen before the first
/// write.
pub struct Transaction<'a> {
    inner: &'a Inner,
    /// Path -> version seen (None if the document did not exist).
    reads: HashMap<String, Option<u64>>,
    writes: Vec<Write>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Read a document, recording its version for the commit check.
    pub fn get(&mut self, path: &str) -> Result<Option<Document>> {
        validate_document_path(path)?;
        if !self.writes.is_empty() {
            return Err(SyncError::InvalidArgument(
                "transaction reads must precede writes".to_string(),
            ));
        }

        let documents = self.inner.documents.read();
        let stored = documents.get(path);
        self.reads
            .insert(path.to_string(), stored.map(|s| s.version));
        Ok(stored.map(|s| s.document.clone()))
    }

    pub fn set(&mut self, path: &str, data: Payload) -> Result<()> {
        validate_document_path(path)?;
        self.writes.push(Write::Set(path.to_string(), data));
        Ok(())
    }

    pub fn set_object<T: Serialize>(&mut self, path: &str, value: &T) -> Result<()> {
        self.set(path, to_payload(value)?)
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        validate_document_path(path)?;
        self.writes.push(Write::Delete(path.to_string()));
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (HashMap<String, Option<u64>>, Vec<Write>) {
        (self.reads, self.writes)
    }
}
