//! Error types for live query synchronization.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure category reported by a change stream source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorCode {
    PermissionDenied,
    Unavailable,
    NotFound,
    Aborted,
    Internal,
}

impl fmt::Display for StreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamErrorCode::PermissionDenied => "permission denied",
            StreamErrorCode::Unavailable => "unavailable",
            StreamErrorCode::NotFound => "not found",
            StreamErrorCode::Aborted => "aborted",
            StreamErrorCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// An error delivered by a source in place of a change batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct StreamError {
    pub code: StreamErrorCode,
    pub message: String,
}

impl StreamError {
    pub fn new(code: StreamErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StreamErrorCode::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StreamErrorCode::Unavailable, message)
    }
}

/// Main error type for adapter and datastore operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("No query configured")]
    NoQuery,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transaction aborted after {attempts} attempts")]
    TransactionAborted { attempts: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl SyncError {
    /// Stream errors are reported and recovered from; everything else is a
    /// caller or source contract failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Stream(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            SyncError::Deserialization(e.to_string())
        } else {
            SyncError::Serialization(e.to_string())
        }
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
