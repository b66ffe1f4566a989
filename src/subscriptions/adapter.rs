//! Live query adapter: keeps an ordered mirror in step with a source.

use crate::error::{Result, SyncError};
use crate::mirror::{ItemChange, OrderedMirror};
use crate::query::Query;
use crate::types::Document;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use super::observer::ListObserver;
use super::source::{ChangeStreamSource, EventSink, ListenerRegistration};
use super::types::{AdapterConfig, BatchOutcome, ListenEvent, ListenState, SubscriptionId};

/// The registration currently feeding the mirror.
struct ActiveRegistration {
    id: SubscriptionId,
    handle: Box<dyn ListenerRegistration>,
}

/// Mirrors the result of one live query into an ordered list and reports
/// positional changes to an observer.
///
/// All mutation happens through `&mut self` on the thread that owns the
/// adapter. Sources push into an internal queue from wherever they run;
/// call [`process_pending`](Self::process_pending) on the owning thread to
/// apply what has arrived.
pub struct LiveQueryAdapter<S, O> {
    source: S,
    observer: O,
    config: AdapterConfig,
    query: Option<Query>,
    registration: Option<ActiveRegistration>,
    mirror: OrderedMirror,
    sender: Sender<ListenEvent>,
    receiver: Receiver<ListenEvent>,
    next_id: u64,
}

impl<S: ChangeStreamSource, O: ListObserver> LiveQueryAdapter<S, O> {
    /// Create an idle adapter. `query` may be supplied later via `set_query`.
    pub fn new(source: S, query: Option<Query>, observer: O) -> Result<Self> {
        Self::with_config(source, query, observer, AdapterConfig::default())
    }

    pub fn with_config(
        source: S,
        query: Option<Query>,
        observer: O,
        config: AdapterConfig,
    ) -> Result<Self> {
        if let Some(query) = &query {
            query.validate()?;
        }

        let (sender, receiver) = unbounded();
        Ok(Self {
            source,
            observer,
            config,
            query,
            registration: None,
            mirror: OrderedMirror::new(),
            sender,
            receiver,
            next_id: 1,
        })
    }

    /// Subscribe to the current query. No-op while already listening.
    pub fn start_listening(&mut self) -> Result<()> {
        if self.registration.is_some() {
            return Ok(());
        }
        let query = self.query.as_ref().ok_or(SyncError::NoQuery)?;

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let sink = EventSink::new(id, self.sender.clone());
        let handle = self.source.subscribe(query, sink)?;
        debug!(subscription = %id, collection = %query.collection, "started listening");

        self.registration = Some(ActiveRegistration { id, handle });
        Ok(())
    }

    /// Cancel the active subscription and empty the mirror.
    ///
    /// Emits one reset notification if a subscription was active and none
    /// otherwise.
    pub fn stop_listening(&mut self) {
        let Some(mut active) = self.registration.take() else {
            return;
        };

        active.handle.remove();
        let discarded = self.receiver.try_iter().count();
        let cleared = self.mirror.clear();
        debug!(
            subscription = %active.id,
            cleared,
            discarded,
            "stopped listening"
        );

        self.observer.on_data_set_changed();
    }

    /// Replace the query: stop, swap, start.
    ///
    /// An invalid query is rejected before anything changes.
    pub fn set_query(&mut self, query: Query) -> Result<()> {
        query.validate()?;
        self.stop_listening();
        self.query = Some(query);
        self.start_listening()
    }

    /// Apply one snapshot event.
    ///
    /// Stream errors are reported to the observer and return
    /// `Ok(BatchOutcome::StreamError)`. A batch that would break the mirror's
    /// invariants is rejected whole, reported, and returned as `Err`.
    pub fn on_batch(&mut self, event: ListenEvent) -> Result<BatchOutcome> {
        let active = match &self.registration {
            Some(active) if active.id == event.subscription => active.id,
            _ => {
                debug!(subscription = %event.subscription, "ignoring stale event");
                return Ok(BatchOutcome::Stale);
            }
        };

        let batch = match event.result {
            Ok(batch) => batch,
            Err(stream_error) => {
                warn!(subscription = %active, error = %stream_error, "stream error");
                let error = SyncError::Stream(stream_error);
                self.observer.on_error(&error);
                return Ok(BatchOutcome::StreamError);
            }
        };

        let changes = match self.mirror.apply_batch(batch) {
            Ok(changes) => changes,
            Err(e) => {
                error!(subscription = %active, error = %e, "rejected change batch");
                self.observer.on_error(&e);
                return Err(e);
            }
        };

        for change in &changes {
            match *change {
                ItemChange::Inserted { index } => self.observer.on_item_inserted(index),
                ItemChange::Changed { index } => self.observer.on_item_changed(index),
                ItemChange::Moved { from, to } => self.observer.on_item_moved(from, to),
                ItemChange::Removed { index } => self.observer.on_item_removed(index),
            }
        }
        self.observer.on_data_changed(self.mirror.len());
        trace!(
            subscription = %active,
            records = changes.len(),
            count = self.mirror.len(),
            "applied change batch"
        );

        Ok(BatchOutcome::Applied {
            records: changes.len(),
        })
    }

    /// Apply queued events in arrival order. Returns how many were consumed.
    ///
    /// Stops at the first rejected batch; later events stay queued.
    pub fn process_pending(&mut self) -> Result<usize> {
        let limit = self.config.max_events_per_pump.unwrap_or(usize::MAX);
        let mut processed = 0;

        while processed < limit {
            let Ok(event) = self.receiver.try_recv() else {
                break;
            };
            processed += 1;
            self.on_batch(event)?;
        }

        Ok(processed)
    }

    /// Wait up to `timeout` for one event and apply it.
    pub fn process_next(&mut self, timeout: Duration) -> Result<Option<BatchOutcome>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => self.on_batch(event).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // The adapter holds a sender, so the queue cannot disconnect.
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    /// Deserialize the document at `index` into a model type.
    pub fn item_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.item_at(index)
            .ok_or_else(|| {
                SyncError::InvalidArgument(format!(
                    "index {} out of range (count {})",
                    index,
                    self.count()
                ))
            })?
            .to_object()
    }
}

impl<S, O> LiveQueryAdapter<S, O> {
    pub fn count(&self) -> usize {
        self.mirror.len()
    }

    pub fn item_at(&self, index: usize) -> Option<&Document> {
        self.mirror.get(index)
    }

    pub fn items(&self) -> &[Document] {
        self.mirror.as_slice()
    }

    pub fn is_listening(&self) -> bool {
        self.registration.is_some()
    }

    pub fn state(&self) -> ListenState {
        match &self.registration {
            Some(active) => ListenState::Listening(active.id),
            None => ListenState::Idle,
        }
    }

    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Events delivered but not yet applied.
    pub fn pending_events(&self) -> usize {
        self.receiver.len()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

impl<S, O> Drop for LiveQueryAdapter<S, O> {
    fn drop(&mut self) {
        if let Some(mut active) = self.registration.take() {
            active.handle.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::subscriptions::types::Notification;
    use crate::types::{ChangeBatch, ChangeRecord};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Source that records calls and hands back its sinks for manual pushes.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        log: Arc<Mutex<Vec<String>>>,
        sinks: Arc<Mutex<Vec<EventSink>>>,
    }

    struct ScriptedRegistration {
        id: SubscriptionId,
        log: Arc<Mutex<Vec<String>>>,
        removed: bool,
    }

    impl ListenerRegistration for ScriptedRegistration {
        fn remove(&mut self) {
            if !self.removed {
                self.removed = true;
                self.log.lock().push(format!("remove {}", self.id));
            }
        }
    }

    impl ChangeStreamSource for ScriptedSource {
        fn subscribe(
            &self,
            query: &Query,
            sink: EventSink,
        ) -> Result<Box<dyn ListenerRegistration>> {
            let id = sink.subscription();
            self.log
                .lock()
                .push(format!("subscribe {} {}", id, query.collection));
            self.sinks.lock().push(sink);
            Ok(Box::new(ScriptedRegistration {
                id,
                log: Arc::clone(&self.log),
                removed: false,
            }))
        }
    }

    impl ScriptedSource {
        fn last_sink(&self) -> EventSink {
            self.sinks.lock().last().cloned().unwrap()
        }
    }

    fn doc(id: &str) -> crate::types::Document {
        crate::types::Document::from_json(id, format!("restaurants/{}", id), json!({"name": id}))
    }

    fn adapter(source: &ScriptedSource) -> LiveQueryAdapter<ScriptedSource, Vec<Notification>> {
        LiveQueryAdapter::new(
            source.clone(),
            Some(Query::collection("restaurants")),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_start_listening_is_idempotent() {
        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);

        adapter.start_listening().unwrap();
        adapter.start_listening().unwrap();

        assert_eq!(source.log.lock().len(), 1);
        assert_eq!(adapter.state(), ListenState::Listening(SubscriptionId(1)));
    }

    #[test]
    fn test_start_without_query() {
        let source = ScriptedSource::default();
        let mut adapter: LiveQueryAdapter<_, Vec<Notification>> =
            LiveQueryAdapter::new(source.clone(), None, Vec::new()).unwrap();

        assert!(matches!(adapter.start_listening(), Err(SyncError::NoQuery)));
        assert!(!adapter.is_listening());
        assert!(source.log.lock().is_empty());
    }

    #[test]
    fn test_pending_events_applied_in_order() {
        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);
        adapter.start_listening().unwrap();

        let sink = source.last_sink();
        sink.deliver(ChangeBatch::new(vec![ChangeRecord::Added {
            document: doc("a"),
            new_index: 0,
        }]));
        sink.deliver(ChangeBatch::new(vec![ChangeRecord::Added {
            document: doc("b"),
            new_index: 0,
        }]));
        assert_eq!(adapter.pending_events(), 2);

        assert_eq!(adapter.process_pending().unwrap(), 2);
        assert_eq!(adapter.item_at(0).unwrap().id.as_str(), "b");
        assert_eq!(adapter.item_at(1).unwrap().id.as_str(), "a");
        assert_eq!(
            adapter.observer().as_slice(),
            &[
                Notification::Inserted { index: 0 },
                Notification::DataChanged { count: 1 },
                Notification::Inserted { index: 0 },
                Notification::DataChanged { count: 2 },
            ]
        );
    }

    #[test]
    fn test_pump_limit() {
        let source = ScriptedSource::default();
        let mut adapter = LiveQueryAdapter::with_config(
            source.clone(),
            Some(Query::collection("restaurants")),
            Vec::new(),
            AdapterConfig {
                max_events_per_pump: Some(1),
            },
        )
        .unwrap();
        adapter.start_listening().unwrap();

        let sink = source.last_sink();
        sink.deliver(ChangeBatch::default());
        sink.deliver(ChangeBatch::default());

        assert_eq!(adapter.process_pending().unwrap(), 1);
        assert_eq!(adapter.pending_events(), 1);
        assert_eq!(adapter.process_pending().unwrap(), 1);
    }

    #[test]
    fn test_empty_batch_still_settles() {
        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);
        adapter.start_listening().unwrap();

        source.last_sink().deliver(ChangeBatch::default());
        adapter.process_pending().unwrap();

        assert_eq!(
            adapter.observer().as_slice(),
            &[Notification::DataChanged { count: 0 }]
        );
    }

    #[test]
    fn test_stop_discards_queued_events() {
        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);
        adapter.start_listening().unwrap();

        let sink = source.last_sink();
        sink.deliver(ChangeBatch::new(vec![ChangeRecord::Added {
            document: doc("a"),
            new_index: 0,
        }]));
        adapter.stop_listening();

        assert_eq!(adapter.pending_events(), 0);
        assert_eq!(adapter.process_pending().unwrap(), 0);
        assert_eq!(adapter.count(), 0);
    }

    #[test]
    fn test_stream_error_keeps_subscription() {
        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);
        adapter.start_listening().unwrap();

        let event = ListenEvent::error(SubscriptionId(1), StreamError::permission_denied("rules"));
        assert_eq!(adapter.on_batch(event).unwrap(), BatchOutcome::StreamError);
        assert!(adapter.is_listening());
    }

    #[test]
    fn test_item_as() {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }

        let source = ScriptedSource::default();
        let mut adapter = adapter(&source);
        adapter.start_listening().unwrap();
        source.last_sink().deliver(ChangeBatch::new(vec![ChangeRecord::Added {
            document: doc("a"),
            new_index: 0,
        }]));
        adapter.process_pending().unwrap();

        let named: Named = adapter.item_as(0).unwrap();
        assert_eq!(named.name, "a");
        assert!(matches!(
            adapter.item_as::<Named>(1),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_drop_removes_registration() {
        let source = ScriptedSource::default();
        {
            let mut adapter = adapter(&source);
            adapter.start_listening().unwrap();
        }
        assert_eq!(
            source.log.lock().as_slice(),
            &["subscribe sub-1 restaurants".to_string(), "remove sub-1".to_string()]
        );
    }
}
