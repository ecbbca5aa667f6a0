//! Error types for the handoff observer.

use crate::lineage::LineageError;
use handoff_kv::KvError;
use handoff_protocol::ProtocolError;
use thiserror::Error;

/// Result type for observer operations.
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Errors reported by the handoff observer.
///
/// Errors inside a processing tick are logged and counted, never returned;
/// only lifecycle calls surface errors to the caller.
#[derive(Error, Debug)]
pub enum ObserverError {
    /// Event log gateway error.
    #[error("store error: {0}")]
    Store(#[from] KvError),

    /// Event encoding or validation error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Lineage could not be resolved.
    #[error("lineage error: {0}")]
    Lineage(#[from] LineageError),

    /// The serving target rejected a mutation.
    #[error("target mutation failed: {0}")]
    Target(String),

    /// `start` was called while the loop is running.
    #[error("handoff observer is already running")]
    AlreadyRunning,

    /// No async runtime is available to run the loop.
    #[error("no async runtime: {0}")]
    Runtime(String),
}

impl ObserverError {
    /// Returns true if the failed operation can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            ObserverError::Store(err) => err.is_retryable(),
            ObserverError::Target(_) => true,
            _ => false,
        }
    }
}
