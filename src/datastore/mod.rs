//! In-process document store with live queries and transactions.
//!
//! [`MemoryDatastore`] implements [`ChangeStreamSource`](crate::ChangeStreamSource)
//! so adapters can be driven end-to-end without a hosted backend:
//! - documents live at slash-separated paths (`restaurants/abc`)
//! - every committed write recomputes each listener's query result and
//!   pushes the difference as one ordered change batch
//! - transactions are optimistic: reads record versions, commits re-check
//!   them and the closure is re-run on conflict

mod diff;
mod store;
mod transaction;

pub use diff::compute_changes;
pub use store::{DatastoreConfig, MemoryDatastore, MemoryRegistration};
pub use transaction::Transaction;
