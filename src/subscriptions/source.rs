//! The contract between an adapter and the backend pushing change batches.

use crate::error::{Result, StreamError};
use crate::query::Query;
use crate::types::ChangeBatch;
use crossbeam_channel::Sender;

use super::types::{DocumentEvent, ListenEvent, SubscriptionId};

/// A backend that pushes ordered change batches for live queries.
///
/// Implementations may deliver from any thread; the sink queues events for
/// the adapter's own thread.
pub trait ChangeStreamSource {
    /// Begin pushing batches for `query` into `sink`.
    ///
    /// Failures known up front are returned here; anything later goes
    /// through [`EventSink::fail`].
    fn subscribe(&self, query: &Query, sink: EventSink) -> Result<Box<dyn ListenerRegistration>>;
}

impl<S: ChangeStreamSource + ?Sized> ChangeStreamSource for &S {
    fn subscribe(&self, query: &Query, sink: EventSink) -> Result<Box<dyn ListenerRegistration>> {
        (**self).subscribe(query, sink)
    }
}

impl<S: ChangeStreamSource + ?Sized> ChangeStreamSource for std::sync::Arc<S> {
    fn subscribe(&self, query: &Query, sink: EventSink) -> Result<Box<dyn ListenerRegistration>> {
        (**self).subscribe(query, sink)
    }
}

/// A backend that pushes snapshots of single documents.
pub trait DocumentStreamSource {
    /// Begin pushing the document at `path` into `sender`: once right away,
    /// then whenever it changes.
    fn listen_document(
        &self,
        path: &str,
        sender: Sender<DocumentEvent>,
    ) -> Result<Box<dyn ListenerRegistration>>;
}

/// Handle to an active stream subscription.
pub trait ListenerRegistration: Send {
    /// Stop delivery. Once this returns the source sends nothing more.
    /// Calling it again is a no-op.
    fn remove(&mut self);
}

/// Sending half of an adapter's event queue, stamped with the id of the
/// registration it was handed to.
#[derive(Clone, Debug)]
pub struct EventSink {
    subscription: SubscriptionId,
    sender: Sender<ListenEvent>,
}

impl EventSink {
    pub fn new(subscription: SubscriptionId, sender: Sender<ListenEvent>) -> Self {
        Self {
            subscription,
            sender,
        }
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Push a change batch. Returns false once the adapter is gone.
    pub fn deliver(&self, batch: ChangeBatch) -> bool {
        self.sender
            .send(ListenEvent::batch(self.subscription, batch))
            .is_ok()
    }

    /// Push a stream error. Returns false once the adapter is gone.
    pub fn fail(&self, error: StreamError) -> bool {
        self.sender
            .send(ListenEvent::error(self.subscription, error))
            .is_ok()
    }
}
