//! The in-memory document store.

use crate::error::{Result, StreamError, SyncError};
use crate::query::{parent_collection, validate_collection_path, Query};
use crate::subscriptions::{
    ChangeStreamSource, DocumentEvent, DocumentStreamSource, EventSink, ListenerRegistration,
};
use crate::types::{ChangeBatch, Document, DocumentId, Payload, Timestamp};
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::diff::compute_changes;
use super::transaction::{Transaction, Write};

/// Length of generated document ids.
const AUTO_ID_LEN: usize = 20;

/// Datastore configuration.
#[derive(Clone, Debug)]
pub struct DatastoreConfig {
    /// Attempts before a conflicting transaction gives up.
    /// Default: 5
    pub max_transaction_attempts: usize,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: 5,
        }
    }
}

/// A document plus the commit that last wrote it.
#[derive(Clone, Debug)]
pub(crate) struct StoredDocument {
    pub(crate) document: Document,
    pub(crate) version: u64,
}

/// An active live query.
struct Listener {
    query: Query,
    sink: EventSink,
    /// Result last delivered to the sink.
    last: Vec<Document>,
}

/// An active single-document listener.
struct DocumentListener {
    path: String,
    sender: Sender<DocumentEvent>,
    /// Snapshot last delivered.
    last: Option<Document>,
}

pub(crate) struct Inner {
    config: DatastoreConfig,
    pub(crate) documents: RwLock<BTreeMap<String, StoredDocument>>,
    listeners: Mutex<HashMap<u64, Listener>>,
    document_listeners: Mutex<HashMap<u64, DocumentListener>>,
    /// Serializes commits, subscriptions and their broadcasts.
    write_lock: Mutex<()>,
    commit_version: AtomicU64,
    next_listener: AtomicU64,
    next_auto_id: AtomicU64,
}

/// Thread-safe in-memory document store. Clones share the same data.
#[derive(Clone)]
pub struct MemoryDatastore {
    inner: Arc<Inner>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::with_config(DatastoreConfig::default())
    }

    pub fn with_config(config: DatastoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                documents: RwLock::new(BTreeMap::new()),
                listeners: Mutex::new(HashMap::new()),
                document_listeners: Mutex::new(HashMap::new()),
                write_lock: Mutex::new(()),
                commit_version: AtomicU64::new(0),
                next_listener: AtomicU64::new(1),
                next_auto_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.inner.config
    }

    // --- Documents ---

    /// Create or overwrite a document.
    pub fn set(&self, path: &str, data: Payload) -> Result<()> {
        validate_document_path(path)?;
        self.commit(None, vec![Write::Set(path.to_string(), data)])?;
        Ok(())
    }

    /// Create or overwrite a document from a serializable model.
    pub fn set_object<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        self.set(path, to_payload(value)?)
    }

    /// Add a document with a generated id to a collection.
    pub fn add(&self, collection: &str, data: Payload) -> Result<DocumentId> {
        validate_collection_path(collection).map_err(SyncError::InvalidPath)?;
        let id = self.auto_id();
        self.set(&format!("{}/{}", collection, id), data)?;
        Ok(id)
    }

    pub fn add_object<T: Serialize>(&self, collection: &str, value: &T) -> Result<DocumentId> {
        self.add(collection, to_payload(value)?)
    }

    pub fn get(&self, path: &str) -> Result<Option<Document>> {
        validate_document_path(path)?;
        Ok(self
            .inner
            .documents
            .read()
            .get(path)
            .map(|stored| stored.document.clone()))
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete(&self, path: &str) -> Result<bool> {
        validate_document_path(path)?;
        let existed = self.inner.documents.read().contains_key(path);
        if existed {
            self.commit(None, vec![Write::Delete(path.to_string())])?;
        }
        Ok(existed)
    }

    /// One-shot query evaluation.
    pub fn run_query(&self, query: &Query) -> Result<Vec<Document>> {
        query.validate()?;
        let documents = self.inner.documents.read();
        Ok(query.evaluate(documents.values().map(|s| &s.document)))
    }

    pub fn document_count(&self) -> usize {
        self.inner.documents.read().len()
    }

    /// Generate a fresh document id.
    pub fn auto_id(&self) -> DocumentId {
        let counter = self.inner.next_auto_id.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(counter.to_le_bytes());
        hasher.update(Timestamp::now().0.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        DocumentId(digest[..AUTO_ID_LEN].to_string())
    }

    // --- Transactions ---

    /// Run `f` as an optimistic read-modify-write transaction.
    ///
    /// The closure may run several times; it must not have side effects
    /// outside the transaction. An `Err` from the closure aborts without
    /// retrying.
    pub fn run_transaction<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T>,
    {
        let attempts = self.inner.config.max_transaction_attempts.max(1);

        for attempt in 1..=attempts {
            let mut transaction = Transaction::new(&self.inner);
            let value = f(&mut transaction)?;
            let (reads, writes) = transaction.into_parts();

            if self.commit(Some(&reads), writes)? {
                return Ok(value);
            }
            debug!(attempt, "transaction conflict, retrying");
        }

        Err(SyncError::TransactionAborted { attempts })
    }

    /// Apply writes atomically and broadcast the result.
    ///
    /// With `reads`, the commit only happens if none of the read documents
    /// changed since they were read; returns false on conflict.
    fn commit(&self, reads: Option<&HashMap<String, Option<u64>>>, writes: Vec<Write>) -> Result<bool> {
        let _lock = self.inner.write_lock.lock();

        {
            let mut documents = self.inner.documents.write();

            if let Some(reads) = reads {
                let conflict = reads.iter().any(|(path, version)| {
                    documents.get(path).map(|s| s.version) != *version
                });
                if conflict {
                    return Ok(false);
                }
            }

            if writes.is_empty() {
                return Ok(true);
            }

            let version = self.inner.commit_version.fetch_add(1, Ordering::SeqCst) + 1;
            for write in writes {
                match write {
                    Write::Set(path, data) => {
                        let id = path.rsplit('/').next().unwrap_or_default().to_string();
                        let document = Document::new(id, path.clone(), data);
                        documents.insert(path, StoredDocument { document, version });
                    }
                    Write::Delete(path) => {
                        documents.remove(&path);
                    }
                }
            }
            trace!(version, "committed writes");
        }

        self.broadcast();
        Ok(true)
    }

    /// Push changed query results to every listener. Caller holds the write lock.
    fn broadcast(&self) {
        let documents = self.inner.documents.read();
        let mut listeners = self.inner.listeners.lock();
        let mut disconnected = Vec::new();

        for (id, listener) in listeners.iter_mut() {
            let result = listener
                .query
                .evaluate(documents.values().map(|s| &s.document));
            if result == listener.last {
                continue;
            }

            let batch = ChangeBatch::new(compute_changes(&listener.last, &result));
            if !listener.sink.deliver(batch) {
                disconnected.push(*id);
                continue;
            }
            listener.last = result;
        }

        for id in disconnected {
            debug!(listener = id, "dropping listener with closed sink");
            listeners.remove(&id);
        }
        drop(listeners);

        let mut document_listeners = self.inner.document_listeners.lock();
        document_listeners.retain(|id, listener| {
            let current = documents.get(&listener.path).map(|s| s.document.clone());
            if current == listener.last {
                return true;
            }
            let event = DocumentEvent::snapshot(listener.path.clone(), current.clone());
            if listener.sender.send(event).is_err() {
                debug!(listener = *id, path = %listener.path, "dropping document listener with closed channel");
                return false;
            }
            listener.last = current;
            true
        });
    }

    // --- Listeners ---

    /// Deliver an error to every query and document listener on
    /// `collection`. Returns how many listeners were reached.
    pub fn fail_listeners(&self, collection: &str, error: StreamError) -> usize {
        let queries = self
            .inner
            .listeners
            .lock()
            .values()
            .filter(|l| l.query.collection == collection)
            .filter(|l| l.sink.fail(error.clone()))
            .count();

        let documents = self
            .inner
            .document_listeners
            .lock()
            .values()
            .filter(|l| parent_collection(&l.path) == Some(collection))
            .filter(|l| {
                l.sender
                    .send(DocumentEvent::error(l.path.clone(), error.clone()))
                    .is_ok()
            })
            .count();

        queries + documents
    }

    /// Active query listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Active single-document listeners.
    pub fn document_listener_count(&self) -> usize {
        self.inner.document_listeners.lock().len()
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeStreamSource for MemoryDatastore {
    fn subscribe(&self, query: &Query, sink: EventSink) -> Result<Box<dyn ListenerRegistration>> {
        query.validate()?;
        let _lock = self.inner.write_lock.lock();

        let initial = {
            let documents = self.inner.documents.read();
            query.evaluate(documents.values().map(|s| &s.document))
        };

        let batch = compute_changes(&[], &initial).into_iter().collect();
        sink.deliver(batch);

        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        debug!(
            listener = id,
            subscription = %sink.subscription(),
            collection = %query.collection,
            initial = initial.len(),
            "registered listener"
        );
        self.inner.listeners.lock().insert(
            id,
            Listener {
                query: query.clone(),
                sink,
                last: initial,
            },
        );

        Ok(Box::new(MemoryRegistration {
            inner: Arc::downgrade(&self.inner),
            listener: id,
            removed: false,
        }))
    }
}

impl DocumentStreamSource for MemoryDatastore {
    fn listen_document(
        &self,
        path: &str,
        sender: Sender<DocumentEvent>,
    ) -> Result<Box<dyn ListenerRegistration>> {
        validate_document_path(path)?;
        let _lock = self.inner.write_lock.lock();

        let current = self
            .inner
            .documents
            .read()
            .get(path)
            .map(|s| s.document.clone());
        // A closed channel is noticed and dropped on the next broadcast.
        let _ = sender.send(DocumentEvent::snapshot(path, current.clone()));

        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        debug!(listener = id, path, exists = current.is_some(), "registered document listener");
        self.inner.document_listeners.lock().insert(
            id,
            DocumentListener {
                path: path.to_string(),
                sender,
                last: current,
            },
        );

        Ok(Box::new(MemoryRegistration {
            inner: Arc::downgrade(&self.inner),
            listener: id,
            removed: false,
        }))
    }
}

/// Registration handle for a [`MemoryDatastore`] listener. Removed on drop.
pub struct MemoryRegistration {
    inner: Weak<Inner>,
    listener: u64,
    removed: bool,
}

impl ListenerRegistration for MemoryRegistration {
    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(inner) = self.inner.upgrade() {
            // Query and document listeners share one id sequence.
            inner.listeners.lock().remove(&self.listener);
            inner.document_listeners.lock().remove(&self.listener);
            debug!(listener = self.listener, "removed listener");
        }
    }
}

impl Drop for MemoryRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

pub(crate) fn validate_document_path(path: &str) -> Result<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(SyncError::InvalidPath(format!("'{}' has an empty segment", path)));
    }
    if segments.len() % 2 != 0 {
        return Err(SyncError::InvalidPath(format!(
            "'{}' is a collection path, not a document",
            path
        )));
    }
    Ok(())
}

pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Payload> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SyncError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use crate::subscriptions::{ListenEvent, SubscriptionId};
    use crossbeam_channel::{unbounded, Receiver};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn listen(store: &MemoryDatastore, query: &Query) -> (Box<dyn ListenerRegistration>, Receiver<ListenEvent>) {
        let (sender, receiver) = unbounded();
        let registration = store
            .subscribe(query, EventSink::new(SubscriptionId(1), sender))
            .unwrap();
        (registration, receiver)
    }

    #[test]
    fn test_set_get_delete() {
        let store = MemoryDatastore::new();
        store.set("restaurants/a", payload(json!({"name": "Deli"}))).unwrap();

        let doc = store.get("restaurants/a").unwrap().unwrap();
        assert_eq!(doc.id.as_str(), "a");
        assert_eq!(doc.data["name"], "Deli");

        assert!(store.delete("restaurants/a").unwrap());
        assert!(!store.delete("restaurants/a").unwrap());
        assert!(store.get("restaurants/a").unwrap().is_none());
    }

    #[test]
    fn test_invalid_paths() {
        let store = MemoryDatastore::new();
        assert!(matches!(
            store.set("restaurants", Payload::new()),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(matches!(
            store.add("restaurants/a", Payload::new()),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(store.get("restaurants//x").is_err());
    }

    #[test]
    fn test_auto_ids_unique() {
        let store = MemoryDatastore::new();
        let a = store.add("restaurants", Payload::new()).unwrap();
        let b = store.add("restaurants", Payload::new()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), AUTO_ID_LEN);
        assert_eq!(store.document_count(), 2);
    }

    #[test]
    fn test_subscribe_delivers_initial_and_updates() {
        let store = MemoryDatastore::new();
        store.set("restaurants/a", payload(json!({"avgRating": 3.0}))).unwrap();

        let query = Query::collection("restaurants").order_by("avgRating", Direction::Descending);
        let (_registration, receiver) = listen(&store, &query);

        let initial = receiver.try_recv().unwrap().result.unwrap();
        assert_eq!(initial.len(), 1);

        store.set("restaurants/b", payload(json!({"avgRating": 4.0}))).unwrap();
        let update = receiver.try_recv().unwrap().result.unwrap();
        assert_eq!(update.len(), 1);
        assert!(matches!(
            update.changes[0],
            crate::types::ChangeRecord::Added { new_index: 0, .. }
        ));

        // Writes outside the query produce nothing.
        store.set("other/x", payload(json!({"avgRating": 1.0}))).unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_removed_registration_stops_delivery() {
        let store = MemoryDatastore::new();
        let query = Query::collection("restaurants");
        let (mut registration, receiver) = listen(&store, &query);
        receiver.try_recv().unwrap();

        registration.remove();
        registration.remove();
        assert_eq!(store.listener_count(), 0);

        store.set("restaurants/a", Payload::new()).unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_sink_drops_listener() {
        let store = MemoryDatastore::new();
        let (registration, receiver) = listen(&store, &Query::collection("restaurants"));
        std::mem::forget(registration);
        drop(receiver);

        store.set("restaurants/a", Payload::new()).unwrap();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_fail_listeners() {
        let store = MemoryDatastore::new();
        let (_registration, receiver) = listen(&store, &Query::collection("restaurants"));
        receiver.try_recv().unwrap();

        assert_eq!(store.fail_listeners("restaurants", StreamError::unavailable("offline")), 1);
        assert_eq!(store.fail_listeners("other", StreamError::unavailable("offline")), 0);

        let event = receiver.try_recv().unwrap();
        assert!(event.result.is_err());
    }

    #[test]
    fn test_document_listener_follows_writes() {
        let store = MemoryDatastore::new();
        let (sender, receiver) = unbounded();
        let mut registration = store.listen_document("restaurants/a", sender).unwrap();

        // Missing documents are reported as None.
        assert_eq!(receiver.try_recv().unwrap().result.unwrap(), None);

        store.set("restaurants/a", payload(json!({"name": "Deli"}))).unwrap();
        let snapshot = receiver.try_recv().unwrap().result.unwrap().unwrap();
        assert_eq!(snapshot.data["name"], "Deli");

        // Neighbours and identical rewrites are silent.
        store.set("restaurants/b", payload(json!({"name": "Other"}))).unwrap();
        store.set("restaurants/a", payload(json!({"name": "Deli"}))).unwrap();
        assert!(receiver.try_recv().is_err());

        store.delete("restaurants/a").unwrap();
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.path, "restaurants/a");
        assert_eq!(event.result.unwrap(), None);

        assert_eq!(store.document_listener_count(), 1);
        registration.remove();
        assert_eq!(store.document_listener_count(), 0);
        store.set("restaurants/a", Payload::new()).unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_document_listener_rejects_collection_path() {
        let store = MemoryDatastore::new();
        let (sender, _receiver) = unbounded();
        assert!(matches!(
            store.listen_document("restaurants", sender),
            Err(SyncError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_fail_listeners_reaches_document_listeners() {
        let store = MemoryDatastore::new();
        let (sender, receiver) = unbounded();
        let _registration = store.listen_document("restaurants/a", sender).unwrap();
        receiver.try_recv().unwrap();

        assert_eq!(store.fail_listeners("restaurants", StreamError::unavailable("offline")), 1);
        assert!(receiver.try_recv().unwrap().result.is_err());
    }

    #[test]
    fn test_limit_window() {
        let store = MemoryDatastore::new();
        let query = Query::collection("restaurants")
            .order_by("avgRating", Direction::Descending)
            .limit(2);
        store.set("restaurants/a", payload(json!({"avgRating": 3.0}))).unwrap();
        store.set("restaurants/b", payload(json!({"avgRating": 2.0}))).unwrap();

        let (_registration, receiver) = listen(&store, &query);
        receiver.try_recv().unwrap();

        // New top entry pushes "b" out of the window.
        store.set("restaurants/c", payload(json!({"avgRating": 5.0}))).unwrap();
        let batch = receiver.try_recv().unwrap().result.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(matches!(
            &batch.changes[0],
            crate::types::ChangeRecord::Removed { old_index: 1, document } if document.id.as_str() == "b"
        ));
        assert!(matches!(
            batch.changes[1],
            crate::types::ChangeRecord::Added { new_index: 0, .. }
        ));

        let ids: Vec<String> = store
            .run_query(&query)
            .unwrap()
            .into_iter()
            .map(|d| d.id.0)
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}
