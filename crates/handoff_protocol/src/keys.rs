//! Persisted key layout for handoff events.
//!
//! Keys have the form `<prefix>/<collection>/<partition>/<segment>`. Key
//! existence is the only record that an event is still pending.

use crate::error::{ProtocolError, ProtocolResult};
use crate::{CollectionId, PartitionId, SegmentId};
use std::fmt;

/// Default key prefix for handoff events.
pub const DEFAULT_HANDOFF_PREFIX: &str = "querycoord-handoff";

/// Builds the key of a handoff event.
pub fn handoff_key(
    prefix: &str,
    collection_id: CollectionId,
    partition_id: PartitionId,
    segment_id: SegmentId,
) -> String {
    format!("{prefix}/{collection_id}/{partition_id}/{segment_id}")
}

/// Builds the prefix covering every event of one collection.
///
/// The trailing separator keeps collection `1` from matching collection `10`.
pub fn collection_prefix(prefix: &str, collection_id: CollectionId) -> String {
    format!("{prefix}/{collection_id}/")
}

/// A parsed handoff key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandoffKey {
    /// Collection component.
    pub collection_id: CollectionId,
    /// Partition component.
    pub partition_id: PartitionId,
    /// Segment component.
    pub segment_id: SegmentId,
}

impl HandoffKey {
    /// Parses `key`, which must start with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidKey`] if the prefix does not match, the
    /// key does not have exactly three components after it, or a component
    /// is not an integer.
    pub fn parse(prefix: &str, key: &str) -> ProtocolResult<Self> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ProtocolError::invalid_key(key, "prefix mismatch"))?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 3 {
            return Err(ProtocolError::invalid_key(
                key,
                format!("expected 3 components, found {}", parts.len()),
            ));
        }

        let parse = |part: &str, name: &str| {
            part.parse::<i64>()
                .map_err(|_| ProtocolError::invalid_key(key, format!("{name} is not an integer")))
        };

        Ok(Self {
            collection_id: parse(parts[0], "collection")?,
            partition_id: parse(parts[1], "partition")?,
            segment_id: parse(parts[2], "segment")?,
        })
    }

    /// Formats the key under `prefix`.
    pub fn to_key(&self, prefix: &str) -> String {
        handoff_key(prefix, self.collection_id, self.partition_id, self.segment_id)
    }
}

impl fmt::Display for HandoffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.collection_id, self.partition_id, self.segment_id
        )
    }
}
