//! Error types for the handoff protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or validating events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode an event.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode an event value.
    #[error("decoding failed: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// A key does not follow the handoff key layout.
    #[error("invalid handoff key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// An event decoded but is internally inconsistent.
    #[error("invalid handoff event for segment {segment_id}: {reason}")]
    InvalidEvent {
        /// Segment the event announces.
        segment_id: i64,
        /// Why the event was rejected.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid event error.
    pub fn invalid_event(segment_id: i64, reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            segment_id,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_key("a/b", "too few components");
        assert!(err.to_string().contains("a/b"));
        assert!(err.to_string().contains("too few components"));

        let err = ProtocolError::invalid_event(7, "segment lists itself as ancestor");
        assert!(err.to_string().contains('7'));
    }
}
