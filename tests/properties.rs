//! Property tests: mirrors track reference lists and live query results.

use livemirror::{
    ChangeBatch, ChangeRecord, ChangeStreamSource, Direction, Document, EventSink, ListenEvent,
    ListenerRegistration, LiveQueryAdapter, MemoryDatastore, NoopObserver, Notification, Query, Result,
    StreamError, SubscriptionId,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

/// Source that never pushes anything; tests call `on_batch` directly.
struct SilentSource;

struct SilentRegistration;

impl ListenerRegistration for SilentRegistration {
    fn remove(&mut self) {}
}

impl ChangeStreamSource for SilentSource {
    fn subscribe(&self, _query: &Query, _sink: EventSink) -> Result<Box<dyn ListenerRegistration>> {
        Ok(Box::new(SilentRegistration))
    }
}

#[derive(Clone, Debug)]
enum Op {
    Add(usize),
    Modify(usize, usize),
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<usize>().prop_map(Op::Add),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Modify(a, b)),
        any::<usize>().prop_map(Op::Remove),
    ]
}

/// Turn abstract ops into valid records, applying them to `reference` as a
/// plain Vec would.
fn realize(
    ops: &[Op],
    reference: &mut Vec<Document>,
    next_id: &mut usize,
    version: &mut i64,
) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for op in ops {
        *version += 1;
        match *op {
            Op::Add(at) => {
                let index = at % (reference.len() + 1);
                let id = format!("d{}", next_id);
                *next_id += 1;
                let document = Document::from_json(id.clone(), format!("items/{}", id), json!({"v": *version}));
                reference.insert(index, document.clone());
                records.push(ChangeRecord::Added {
                    document,
                    new_index: index,
                });
            }
            Op::Modify(from, to) if !reference.is_empty() => {
                let old_index = from % reference.len();
                let mut document = reference.remove(old_index);
                document.data.insert("v".to_string(), json!(*version));
                let new_index = to % (reference.len() + 1);
                reference.insert(new_index, document.clone());
                records.push(ChangeRecord::Modified {
                    document,
                    old_index,
                    new_index,
                });
            }
            Op::Remove(at) if !reference.is_empty() => {
                let old_index = at % reference.len();
                let document = reference.remove(old_index);
                records.push(ChangeRecord::Removed {
                    document,
                    old_index,
                });
            }
            _ => {}
        }
    }
    records
}

#[derive(Clone, Debug)]
enum Write {
    Set { id: u8, rating: u8 },
    Delete { id: u8 },
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        3 => (0u8..12, 0u8..6).prop_map(|(id, rating)| Write::Set { id, rating }),
        1 => (0u8..12).prop_map(|id| Write::Delete { id }),
    ]
}

proptest! {
    #[test]
    fn mirror_matches_reference_list(
        batches in prop::collection::vec(prop::collection::vec(op_strategy(), 0..8), 1..12),
        error_after in prop::option::of(0usize..12),
    ) {
        let mut adapter = LiveQueryAdapter::new(
            SilentSource,
            Some(Query::collection("items")),
            NoopObserver,
        ).unwrap();
        adapter.start_listening().unwrap();

        let mut reference = Vec::new();
        let mut next_id = 0;
        let mut version = 0;

        for (n, ops) in batches.iter().enumerate() {
            let records = realize(ops, &mut reference, &mut next_id, &mut version);
            adapter
                .on_batch(ListenEvent::batch(SubscriptionId(1), ChangeBatch::new(records)))
                .unwrap();

            if error_after == Some(n) {
                let before = adapter.items().to_vec();
                adapter
                    .on_batch(ListenEvent::error(SubscriptionId(1), StreamError::unavailable("flaky")))
                    .unwrap();
                prop_assert_eq!(adapter.items(), before.as_slice());
            }

            prop_assert_eq!(adapter.items(), reference.as_slice());

            let unique: HashSet<_> = adapter.items().iter().map(|d| &d.id).collect();
            prop_assert_eq!(unique.len(), adapter.count());
        }
    }

    #[test]
    fn mirror_matches_live_query(
        writes in prop::collection::vec(write_strategy(), 1..40),
        limit in prop::option::of(1usize..8),
        descending in any::<bool>(),
    ) {
        let store = MemoryDatastore::new();
        let direction = if descending { Direction::Descending } else { Direction::Ascending };
        let mut query = Query::collection("restaurants").order_by("avgRating", direction);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let mut adapter = LiveQueryAdapter::new(store.clone(), Some(query.clone()), Vec::<Notification>::new()).unwrap();
        adapter.start_listening().unwrap();
        adapter.process_pending().unwrap();

        // One write touches one document; a limit can push one more across
        // the window edge.
        let most = if limit.is_some() { 2 } else { 1 };

        for write in writes {
            adapter.observer_mut().clear();
            match write {
                Write::Set { id, rating } => {
                    let data = json!({"avgRating": rating, "name": format!("r{}", id)});
                    store
                        .set(&format!("restaurants/r{}", id), data.as_object().cloned().unwrap())
                        .unwrap();
                }
                Write::Delete { id } => {
                    store.delete(&format!("restaurants/r{}", id)).unwrap();
                }
            }

            adapter.process_pending().unwrap();
            let expected = store.run_query(&query).unwrap();
            prop_assert_eq!(adapter.items(), expected.as_slice());

            let item_updates = adapter
                .observer()
                .iter()
                .filter(|n| !matches!(n, Notification::DataChanged { .. }))
                .count();
            prop_assert!(item_updates <= most, "{:?}", adapter.observer());
        }
    }
}
