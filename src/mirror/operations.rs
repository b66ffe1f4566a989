//! Change record validation and positional diff types.

use crate::error::{Result, SyncError};
use crate::types::{ChangeBatch, ChangeRecord, DocumentId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A positional change to the mirror, as reported to renderers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemChange {
    Inserted { index: usize },
    Changed { index: usize },
    Moved { from: usize, to: usize },
    Removed { index: usize },
}

/// Dry-run a batch against the current identities.
///
/// Every record is checked against the list as it stands after the records
/// before it: indices must be in bounds, added identities must be new, and
/// modified or removed records must name the identity found at `old_index`.
pub fn validate_batch(current: &[DocumentId], batch: &ChangeBatch) -> Result<()> {
    let mut ids: Vec<&DocumentId> = current.iter().collect();
    let mut present: HashSet<&DocumentId> = current.iter().collect();

    for (position, record) in batch.changes.iter().enumerate() {
        match record {
            ChangeRecord::Added {
                document,
                new_index,
            } => {
                if *new_index > ids.len() {
                    return Err(out_of_bounds(position, "insert", *new_index, ids.len() + 1));
                }
                if !present.insert(&document.id) {
                    return Err(SyncError::InvariantViolation(format!(
                        "record {}: added document {} is already present",
                        position, document.id
                    )));
                }
                ids.insert(*new_index, &document.id);
            }

            ChangeRecord::Modified {
                document,
                old_index,
                new_index,
            } => {
                check_identity(&ids, position, *old_index, &document.id)?;
                ids.remove(*old_index);
                if *new_index > ids.len() {
                    return Err(out_of_bounds(position, "move", *new_index, ids.len() + 1));
                }
                ids.insert(*new_index, &document.id);
            }

            ChangeRecord::Removed {
                document,
                old_index,
            } => {
                check_identity(&ids, position, *old_index, &document.id)?;
                ids.remove(*old_index);
                present.remove(&document.id);
            }
        }
    }

    Ok(())
}

fn check_identity(
    ids: &[&DocumentId],
    position: usize,
    old_index: usize,
    expected: &DocumentId,
) -> Result<()> {
    match ids.get(old_index) {
        None => Err(out_of_bounds(position, "old", old_index, ids.len())),
        Some(found) if *found != expected => Err(SyncError::InvariantViolation(format!(
            "record {}: index {} holds {} but record names {}",
            position, old_index, found, expected
        ))),
        Some(_) => Ok(()),
    }
}

fn out_of_bounds(position: usize, kind: &str, index: usize, len: usize) -> SyncError {
    SyncError::InvariantViolation(format!(
        "record {}: {} index {} out of bounds (len {})",
        position, kind, index, len
    ))
}
