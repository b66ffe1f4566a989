//! The ordered document container.

use super::operations::{validate_batch, ItemChange};
use crate::error::Result;
use crate::types::{ChangeBatch, ChangeRecord, Document, DocumentId};

/// Documents in server order. Never re-sorted locally.
#[derive(Clone, Debug, Default)]
pub struct OrderedMirror {
    items: Vec<Document>,
}

impl OrderedMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.items
    }

    /// Position of a document by identity.
    pub fn position_of(&self, id: &DocumentId) -> Option<usize> {
        self.items.iter().position(|d| &d.id == id)
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.items.iter().map(|d| d.id.clone()).collect()
    }

    /// Drop every document. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let len = self.items.len();
        self.items.clear();
        len
    }

    /// Apply a batch in record order, returning one positional change per
    /// record. A batch that fails validation changes nothing.
    pub fn apply_batch(&mut self, batch: ChangeBatch) -> Result<Vec<ItemChange>> {
        validate_batch(&self.ids(), &batch)?;

        let mut changes = Vec::with_capacity(batch.len());
        for record in batch.changes {
            changes.push(self.apply_record(record));
        }
        Ok(changes)
    }

    /// Bounds and identities were checked by `validate_batch`.
    fn apply_record(&mut self, record: ChangeRecord) -> ItemChange {
        match record {
            ChangeRecord::Added {
                document,
                new_index,
            } => {
                self.items.insert(new_index, document);
                ItemChange::Inserted { index: new_index }
            }

            ChangeRecord::Modified {
                document,
                old_index,
                new_index,
            } if old_index == new_index => {
                self.items[old_index] = document;
                ItemChange::Changed { index: old_index }
            }

            ChangeRecord::Modified {
                document,
                old_index,
                new_index,
            } => {
                self.items.remove(old_index);
                self.items.insert(new_index, document);
                ItemChange::Moved {
                    from: old_index,
                    to: new_index,
                }
            }

            ChangeRecord::Removed { old_index, .. } => {
                self.items.remove(old_index);
                ItemChange::Removed { index: old_index }
            }
        }
    }
}

impl<'a> IntoIterator for &'a OrderedMirror {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
