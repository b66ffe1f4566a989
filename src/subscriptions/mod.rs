//! Live query subscriptions feeding ordered mirrors.
//!
//! A [`LiveQueryAdapter`] binds one [`Query`](crate::Query) to a
//! [`ChangeStreamSource`]. The source pushes snapshot events into the
//! adapter's queue from any thread; the owning thread applies them:
//! - Added / Modified / Removed records in delivery order
//! - one positional callback per record, then one `on_data_changed`
//! - stream errors reported without touching the mirror
//!
//! Every registration gets a fresh [`SubscriptionId`], and events stamped
//! with any other id are dropped, so swapping queries never applies a
//! batch from the old one.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryDatastore::new();
//! let query = Query::collection("restaurants")
//!     .order_by("avgRating", Direction::Descending)
//!     .limit(50);
//!
//! let mut adapter = LiveQueryAdapter::new(store.clone(), Some(query), renderer)?;
//! adapter.start_listening()?;
//!
//! // On the UI thread, whenever there is time:
//! adapter.process_pending()?;
//! for restaurant in adapter.items() {
//!     println!("{}", restaurant.id);
//! }
//!
//! adapter.stop_listening();
//! ```

mod adapter;
mod observer;
mod source;
mod types;

pub use adapter::LiveQueryAdapter;
pub use observer::{ChannelObserver, ListObserver, NoopObserver};
pub use source::{ChangeStreamSource, DocumentStreamSource, EventSink, ListenerRegistration};
pub use types::{
    AdapterConfig, BatchOutcome, DocumentEvent, ListenEvent, ListenState, Notification,
    SubscriptionId,
};
