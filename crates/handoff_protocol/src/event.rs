//! Handoff event model.

use crate::error::{ProtocolError, ProtocolResult};
use crate::keys::handoff_key;
use crate::{CollectionId, FieldId, IndexId, PartitionId, SegmentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle state of a segment as reported by the data pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SegmentState {
    /// State not reported (fake compaction results carry no state).
    #[default]
    None,
    /// Segment is still accepting inserts.
    Growing,
    /// Segment no longer accepts inserts.
    Sealed,
    /// Segment is being persisted.
    Flushing,
    /// Segment is persisted.
    Flushed,
    /// Segment has been dropped.
    Dropped,
}

impl SegmentState {
    /// Returns true if a segment in this state may be handed off.
    pub fn is_sealed(&self) -> bool {
        matches!(self, SegmentState::Sealed | SegmentState::Flushed)
    }
}

/// An index built on one vector field of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldIndexInfo {
    /// Indexed field.
    pub field_id: FieldId,
    /// Index built on the field.
    pub index_id: IndexId,
}

/// A persisted announcement that a sealed segment should enter the serving
/// target, possibly replacing the segments it was compacted from.
///
/// Identity is `(collection_id, partition_id, segment_id)`; at most one live
/// event exists per segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEvent {
    /// Segment being handed off.
    pub segment_id: SegmentId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// DML channel the segment was written through. Empty when unknown.
    #[serde(default)]
    pub insert_channel: String,
    /// Segment state at announcement time.
    #[serde(default)]
    pub state: SegmentState,
    /// Segments this one replaces, in compaction order.
    #[serde(default)]
    pub compaction_from: Vec<SegmentId>,
    /// Whether the segment is a compaction result rather than a flush.
    #[serde(default)]
    pub created_by_compaction: bool,
    /// Compaction result without data: retire ancestors, add nothing.
    #[serde(default)]
    pub is_fake: bool,
    /// Indexes already built on the segment.
    #[serde(default)]
    pub index_infos: Vec<FieldIndexInfo>,
}

impl HandoffEvent {
    /// Creates a flush handoff for a freshly sealed segment.
    pub fn flushed(
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
    ) -> Self {
        Self {
            segment_id,
            collection_id,
            partition_id,
            insert_channel: String::new(),
            state: SegmentState::Sealed,
            compaction_from: Vec::new(),
            created_by_compaction: false,
            is_fake: false,
            index_infos: Vec::new(),
        }
    }

    /// Creates a compaction handoff replacing `from`.
    pub fn compacted(
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
        from: impl IntoIterator<Item = SegmentId>,
    ) -> Self {
        Self {
            compaction_from: from.into_iter().collect(),
            created_by_compaction: true,
            ..Self::flushed(collection_id, partition_id, segment_id)
        }
    }

    /// Creates a fake compaction handoff: `from` is retired and nothing is
    /// added in its place.
    pub fn fake(
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
        from: impl IntoIterator<Item = SegmentId>,
    ) -> Self {
        Self {
            state: SegmentState::None,
            is_fake: true,
            ..Self::compacted(collection_id, partition_id, segment_id, from)
        }
    }

    /// Adds a built index on `field_id`.
    #[must_use]
    pub fn with_index(mut self, field_id: FieldId, index_id: IndexId) -> Self {
        self.index_infos.push(FieldIndexInfo { field_id, index_id });
        self
    }

    /// Sets the insert channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.insert_channel = channel.into();
        self
    }

    /// Sets the segment state.
    #[must_use]
    pub fn with_state(mut self, state: SegmentState) -> Self {
        self.state = state;
        self
    }

    /// Returns the set of index IDs built on the segment.
    pub fn index_ids(&self) -> BTreeSet<IndexId> {
        self.index_infos.iter().map(|info| info.index_id).collect()
    }

    /// Returns the persisted key of this event under `prefix`.
    pub fn key(&self, prefix: &str) -> String {
        handoff_key(prefix, self.collection_id, self.partition_id, self.segment_id)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEvent`] if the segment lists itself
    /// among its ancestors, or if a fake event has no ancestors to retire.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.compaction_from.contains(&self.segment_id) {
            return Err(ProtocolError::invalid_event(
                self.segment_id,
                "segment lists itself in compaction_from",
            ));
        }
        if self.is_fake && self.compaction_from.is_empty() {
            return Err(ProtocolError::invalid_event(
                self.segment_id,
                "fake segment has nothing to replace",
            ));
        }
        Ok(())
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Encoding {
            message: e.to_string(),
        })?;
        Ok(buf)
    }

    /// Decodes from CBOR bytes and validates the result.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let event: Self = ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decoding {
            message: e.to_string(),
        })?;
        event.validate()?;
        Ok(event)
    }
}
