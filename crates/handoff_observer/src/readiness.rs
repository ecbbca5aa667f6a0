//! Load and index readiness checks against live distribution.

use handoff_meta::{LeaderViewManager, Meta};
use handoff_protocol::{CollectionId, HandoffEvent, IndexId, NodeId, PartitionId, SegmentId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Answers whether a handed-off segment can enter the target yet.
#[derive(Clone)]
pub struct ReadinessOracle {
    meta: Arc<Meta>,
    dist: Arc<LeaderViewManager>,
}

impl ReadinessOracle {
    /// Creates an oracle over shared metadata and leader views.
    pub fn new(meta: Arc<Meta>, dist: Arc<LeaderViewManager>) -> Self {
        Self { meta, dist }
    }

    /// Returns true if some leader of the collection serves the segment.
    ///
    /// An empty `channel` matches every channel of the collection.
    pub fn is_loaded(&self, collection_id: CollectionId, channel: &str, segment_id: SegmentId) -> bool {
        let channel = (!channel.is_empty()).then_some(channel);
        self.dist.is_segment_served(collection_id, channel, segment_id)
    }

    /// Returns true if the event's segment has every required index.
    pub fn index_satisfied(&self, event: &HandoffEvent) -> bool {
        self.missing_indexes(event).is_empty()
    }

    /// Returns the required index IDs the event's segment lacks.
    pub fn missing_indexes(&self, event: &HandoffEvent) -> BTreeSet<IndexId> {
        missing_indexes(event, &self.meta.required_index_ids(event.collection_id))
    }

    /// Returns true if the partition is currently served.
    pub fn partition_loaded(&self, collection_id: CollectionId, partition_id: PartitionId) -> bool {
        self.meta.is_partition_loaded(collection_id, partition_id)
    }

    /// Returns the leaders still writing `segment_id` as a growing segment.
    ///
    /// Informational only; handoff never waits on it.
    pub fn growing_leaders(&self, segment_id: SegmentId) -> Vec<NodeId> {
        self.dist.growing_segment_dist(segment_id)
    }
}

/// Returns the members of `required` missing from the event's indexes.
pub fn missing_indexes(event: &HandoffEvent, required: &BTreeSet<IndexId>) -> BTreeSet<IndexId> {
    let built = event.index_ids();
    required.difference(&built).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_meta::{Collection, LeaderView, LoadStatus, Partition};

    fn oracle() -> (Arc<Meta>, Arc<LeaderViewManager>, ReadinessOracle) {
        let meta = Arc::new(Meta::new());
        let dist = Arc::new(LeaderViewManager::new());
        let oracle = ReadinessOracle::new(meta.clone(), dist.clone());
        (meta, dist, oracle)
    }

    #[test]
    fn loaded_when_any_leader_serves() {
        let (_, dist, oracle) = oracle();
        assert!(!oracle.is_loaded(100, "", 3));

        dist.update(2, [LeaderView::new(2, 100, "100-dmc0").with_segment(3, 2)]);
        assert!(oracle.is_loaded(100, "", 3));
        assert!(oracle.is_loaded(100, "100-dmc0", 3));
        assert!(!oracle.is_loaded(100, "100-dmc1", 3));
        assert!(!oracle.is_loaded(200, "", 3));
    }

    #[test]
    fn index_requirement_is_superset() {
        let required = BTreeSet::from([1, 2]);
        let partial = HandoffEvent::flushed(100, 10, 3).with_index(1, 1);
        let full = partial.clone().with_index(2, 2).with_index(3, 9);

        assert_eq!(missing_indexes(&partial, &required), BTreeSet::from([2]));
        assert!(missing_indexes(&full, &required).is_empty());
        assert!(missing_indexes(&partial, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn index_satisfied_reads_collection() {
        let (meta, _, oracle) = oracle();
        let event = HandoffEvent::flushed(100, 10, 3).with_index(1, 1);
        assert!(oracle.index_satisfied(&event));

        meta.put_collection(Collection::loaded(100).with_field_index(1, 2));
        assert!(!oracle.index_satisfied(&event));
        assert_eq!(oracle.missing_indexes(&event), BTreeSet::from([2]));
    }

    #[test]
    fn partition_loaded() {
        let (meta, _, oracle) = oracle();
        meta.put_partition(Partition::loaded(111, 1));
        assert!(oracle.partition_loaded(111, 1));
        assert!(!oracle.partition_loaded(111, 2));

        meta.put_collection(Collection::loaded(100).with_status(LoadStatus::Loading));
        assert!(!oracle.partition_loaded(100, 10));
    }

    #[test]
    fn growing_leaders() {
        let (_, dist, oracle) = oracle();
        dist.update(4, [LeaderView::new(4, 100, "c").with_growing(3)]);
        assert_eq!(oracle.growing_leaders(3), vec![4]);
    }
}
