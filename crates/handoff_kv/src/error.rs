//! Error types for gateway operations.

use thiserror::Error;

/// Result type for gateway operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur when talking to the event log gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The key does not exist.
    #[error("key not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("store request timed out")]
    Timeout,

    /// A watch asked for history the store no longer retains.
    #[error("revision {requested} has been compacted (oldest retained {oldest})")]
    Compacted {
        /// Revision the watch asked to resume from.
        requested: i64,
        /// Oldest revision still replayable.
        oldest: i64,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl KvError {
    /// Creates a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Unavailable(_) | KvError::Timeout)
    }

    /// Returns true if this error means the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }
}
