//! Serving targets.

use handoff_protocol::{CollectionId, HandoffEvent, PartitionId, SegmentId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A DML channel that belongs to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmChannel {
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Channel name.
    pub channel_name: String,
}

impl DmChannel {
    /// Creates a channel.
    pub fn new(collection_id: CollectionId, channel_name: impl Into<String>) -> Self {
        Self {
            collection_id,
            channel_name: channel_name.into(),
        }
    }
}

/// A sealed segment that should be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTarget {
    /// Segment ID.
    pub segment_id: SegmentId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// DML channel, empty when unknown.
    #[serde(default)]
    pub channel: String,
}

impl SegmentTarget {
    /// Creates a segment target.
    pub fn new(
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            segment_id,
            collection_id,
            partition_id,
            channel: channel.into(),
        }
    }
}

impl From<&HandoffEvent> for SegmentTarget {
    fn from(event: &HandoffEvent) -> Self {
        Self::new(
            event.collection_id,
            event.partition_id,
            event.segment_id,
            event.insert_channel.clone(),
        )
    }
}

#[derive(Default)]
struct TargetInner {
    segments: HashMap<SegmentId, SegmentTarget>,
    channels: HashMap<String, DmChannel>,
}

/// The authoritative set of segments and channels to serve.
///
/// Adds and removes are idempotent: adding a present segment or removing an
/// absent one leaves the target unchanged.
#[derive(Default)]
pub struct TargetManager {
    inner: RwLock<TargetInner>,
}

impl TargetManager {
    /// Creates an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel.
    pub fn add_dm_channel(&self, channel: DmChannel) {
        self.inner
            .write()
            .channels
            .insert(channel.channel_name.clone(), channel);
    }

    /// Returns true if the channel is in the target.
    pub fn contains_dm_channel(&self, channel_name: &str) -> bool {
        self.inner.read().channels.contains_key(channel_name)
    }

    /// Adds segments.
    pub fn add_segment(&self, segments: impl IntoIterator<Item = SegmentTarget>) {
        let mut inner = self.inner.write();
        for segment in segments {
            inner.segments.insert(segment.segment_id, segment);
        }
    }

    /// Removes a segment. Returns true if it was present.
    pub fn remove_segment(&self, segment_id: SegmentId) -> bool {
        self.inner.write().segments.remove(&segment_id).is_some()
    }

    /// Returns true if the segment is in the target.
    pub fn contains_segment(&self, segment_id: SegmentId) -> bool {
        self.inner.read().segments.contains_key(&segment_id)
    }

    /// Returns the target entry of a segment.
    pub fn get_segment(&self, segment_id: SegmentId) -> Option<SegmentTarget> {
        self.inner.read().segments.get(&segment_id).cloned()
    }

    /// Returns the sorted segment IDs targeted for a collection.
    pub fn collection_segments(&self, collection_id: CollectionId) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self
            .inner
            .read()
            .segments
            .values()
            .filter(|segment| segment.collection_id == collection_id)
            .map(|segment| segment.segment_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drops every segment and channel of a collection.
    pub fn remove_collection(&self, collection_id: CollectionId) {
        let mut inner = self.inner.write();
        inner
            .segments
            .retain(|_, segment| segment.collection_id != collection_id);
        inner
            .channels
            .retain(|_, channel| channel.collection_id != collection_id);
    }
}
