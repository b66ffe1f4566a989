//! Subscription types for live query mirrors.

use crate::error::{StreamError, SyncError};
use crate::mirror::ItemChange;
use crate::types::{ChangeBatch, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a [`LiveQueryAdapter`](super::LiveQueryAdapter).
#[derive(Clone, Debug, Default)]
pub struct AdapterConfig {
    /// Max queued events applied per `process_pending` call.
    /// Default: None (drain everything queued).
    pub max_events_per_pump: Option<usize>,
}

/// Unique identifier for one registration of an adapter.
///
/// A new id is allocated every time the adapter starts listening, so events
/// from a cancelled registration can always be told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Listening state of an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenState {
    Idle,
    Listening(SubscriptionId),
}

/// One snapshot event pushed by a source: a batch or an error, never both.
#[derive(Clone, Debug)]
pub struct ListenEvent {
    pub subscription: SubscriptionId,
    pub result: Result<ChangeBatch, StreamError>,
}

impl ListenEvent {
    pub fn batch(subscription: SubscriptionId, batch: ChangeBatch) -> Self {
        Self {
            subscription,
            result: Ok(batch),
        }
    }

    pub fn error(subscription: SubscriptionId, error: StreamError) -> Self {
        Self {
            subscription,
            result: Err(error),
        }
    }
}

/// One snapshot of a single watched document: its current state (`None`
/// once deleted or before it exists) or an error.
#[derive(Clone, Debug)]
pub struct DocumentEvent {
    pub path: String,
    pub result: Result<Option<Document>, StreamError>,
}

impl DocumentEvent {
    pub fn snapshot(path: impl Into<String>, document: Option<Document>) -> Self {
        Self {
            path: path.into(),
            result: Ok(document),
        }
    }

    pub fn error(path: impl Into<String>, error: StreamError) -> Self {
        Self {
            path: path.into(),
            result: Err(error),
        }
    }
}

/// What `on_batch` did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch was applied; `records` positional changes were emitted.
    Applied { records: usize },
    /// The event belonged to a registration that is no longer active.
    Stale,
    /// The source reported an error; the mirror is unchanged.
    StreamError,
}

/// Renderer-facing notifications, one per observer callback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Inserted { index: usize },
    Changed { index: usize },
    Moved { from: usize, to: usize },
    Removed { index: usize },
    /// The whole list was cleared.
    Reset,
    /// A batch settled; `count` is the new length.
    DataChanged { count: usize },
    Error { message: String, recoverable: bool },
}

impl From<ItemChange> for Notification {
    fn from(change: ItemChange) -> Self {
        match change {
            ItemChange::Inserted { index } => Notification::Inserted { index },
            ItemChange::Changed { index } => Notification::Changed { index },
            ItemChange::Moved { from, to } => Notification::Moved { from, to },
            ItemChange::Removed { index } => Notification::Removed { index },
        }
    }
}

impl From<&SyncError> for Notification {
    fn from(error: &SyncError) -> Self {
        Notification::Error {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}
