//! Ordered diff between two query results.

use crate::types::{ChangeRecord, Document, DocumentId};
use std::collections::{HashMap, HashSet};

/// Describe how to turn `old` into `new` as sequentially applicable records.
///
/// Removals come first, in ascending position, each index adjusted for the
/// removals before it. The longest run of unchanged documents that kept
/// their relative order stays put; every other surviving document is moved
/// next to its new predecessor (or modified in place when it lands where it
/// was), and new documents are inserted the same way. A document whose
/// content and relative position are unchanged produces no record.
pub fn compute_changes(old: &[Document], new: &[Document]) -> Vec<ChangeRecord> {
    let new_ids: HashSet<&DocumentId> = new.iter().map(|d| &d.id).collect();
    let mut changes = Vec::new();
    let mut working: Vec<&Document> = Vec::with_capacity(old.len().max(new.len()));

    let mut removed = 0;
    for (position, document) in old.iter().enumerate() {
        if new_ids.contains(&document.id) {
            working.push(document);
        } else {
            changes.push(ChangeRecord::Removed {
                document: document.clone(),
                old_index: position - removed,
            });
            removed += 1;
        }
    }

    let stable = stable_documents(&working, new);

    for (index, document) in new.iter().enumerate() {
        if stable.contains(&document.id) {
            continue;
        }

        // Everything before `index` in `new` is already placed, so the
        // target slot is right after the previous document.
        let found = working.iter().position(|d| d.id == document.id);
        let current = found.map(|old_index| (old_index, working.remove(old_index)));
        let new_index = match index.checked_sub(1) {
            Some(previous) => position_of(&working, &new[previous].id) + 1,
            None => 0,
        };

        match current {
            Some((old_index, before)) => {
                let unchanged = old_index == new_index && before == document;
                working.insert(new_index, document);
                if !unchanged {
                    changes.push(ChangeRecord::Modified {
                        document: document.clone(),
                        old_index,
                        new_index,
                    });
                }
            }
            None => {
                working.insert(new_index, document);
                changes.push(ChangeRecord::Added {
                    document: document.clone(),
                    new_index,
                });
            }
        }
    }

    changes
}

/// Unchanged surviving documents forming the longest subsequence that is
/// ordered the same way in `working` and `new`.
fn stable_documents<'a>(working: &[&Document], new: &'a [Document]) -> HashSet<&'a DocumentId> {
    let positions: HashMap<&DocumentId, usize> = working
        .iter()
        .enumerate()
        .map(|(position, d)| (&d.id, position))
        .collect();

    let candidates: Vec<(&DocumentId, usize)> = new
        .iter()
        .filter_map(|d| {
            let position = *positions.get(&d.id)?;
            (working[position] == d).then_some((&d.id, position))
        })
        .collect();

    let keys: Vec<usize> = candidates.iter().map(|(_, position)| *position).collect();
    longest_increasing(&keys)
        .into_iter()
        .map(|i| candidates[i].0)
        .collect()
}

/// Indices of one longest strictly increasing subsequence of `keys`.
fn longest_increasing(keys: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of an increasing run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; keys.len()];

    for (i, key) in keys.iter().enumerate() {
        let slot = tails.partition_point(|&t| keys[t] < *key);
        previous[i] = slot.checked_sub(1).map(|s| tails[s]);
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = previous[i];
    }
    run.reverse();
    run
}

fn position_of(working: &[&Document], id: &DocumentId) -> usize {
    working.iter().position(|d| &d.id == id).unwrap_or(working.len())
}
