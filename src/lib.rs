//! # Live Mirror
//!
//! Ordered local mirrors of live document queries, with position-accurate
//! change notifications for list renderers.
//!
//! ## Core Concepts
//!
//! - **Queries**: Collection + equality filters + one order-by + limit
//! - **Change batches**: Ordered Added / Modified / Removed records pushed by a source
//! - **Mirrors**: The local ordered copy, changed only by whole batches
//! - **Adapters**: Bind a query to a source and report insert/change/move/remove
//!
//! ## Example
//!
//! ```ignore
//! use livemirror::{Direction, LiveQueryAdapter, MemoryDatastore, Query};
//!
//! let store = MemoryDatastore::new();
//! let query = Query::collection("restaurants")
//!     .order_by("avgRating", Direction::Descending)
//!     .limit(50);
//!
//! let mut adapter = LiveQueryAdapter::new(store.clone(), Some(query), Vec::new())?;
//! adapter.start_listening()?;
//!
//! store.set("restaurants/deli", payload)?;
//! adapter.process_pending()?;
//! assert_eq!(adapter.count(), 1);
//! ```

pub mod datastore;
pub mod error;
pub mod mirror;
pub mod query;
pub mod ratings;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use datastore::{compute_changes, DatastoreConfig, MemoryDatastore, MemoryRegistration, Transaction};
pub use error::{Result, StreamError, StreamErrorCode, SyncError};
pub use mirror::{validate_batch, ItemChange, OrderedMirror};
pub use query::{compare_values, Direction, FieldFilter, OrderBy, Query};
pub use ratings::{add_rating, add_sample_restaurants, Filters, Rating, Restaurant};
pub use subscriptions::{
    AdapterConfig, BatchOutcome, ChangeStreamSource, ChannelObserver, DocumentEvent,
    DocumentStreamSource, EventSink, ListenEvent, ListObserver, ListenState, ListenerRegistration,
    LiveQueryAdapter, NoopObserver, Notification, SubscriptionId,
};
pub use types::*;
