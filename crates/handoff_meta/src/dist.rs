//! Leader views reported by query nodes.

use handoff_protocol::{CollectionId, NodeId, SegmentId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where a sealed segment is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDist {
    /// Node serving the segment.
    pub node_id: NodeId,
    /// Version of the loaded copy.
    pub version: i64,
}

/// One shard leader's report of what it serves for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeaderView {
    /// Reporting leader node.
    pub id: NodeId,
    /// Collection the channel belongs to.
    pub collection_id: CollectionId,
    /// DML channel.
    pub channel: String,
    /// Sealed segments served, by segment ID.
    #[serde(default)]
    pub segments: HashMap<SegmentId, SegmentDist>,
    /// Growing segments still being written.
    #[serde(default)]
    pub growing_segments: BTreeSet<SegmentId>,
}

impl LeaderView {
    /// Creates an empty view.
    pub fn new(id: NodeId, collection_id: CollectionId, channel: impl Into<String>) -> Self {
        Self {
            id,
            collection_id,
            channel: channel.into(),
            segments: HashMap::new(),
            growing_segments: BTreeSet::new(),
        }
    }

    /// Adds a sealed segment served by `node_id`.
    #[must_use]
    pub fn with_segment(mut self, segment_id: SegmentId, node_id: NodeId) -> Self {
        self.segments.insert(
            segment_id,
            SegmentDist {
                node_id,
                version: 0,
            },
        );
        self
    }

    /// Adds a growing segment.
    #[must_use]
    pub fn with_growing(mut self, segment_id: SegmentId) -> Self {
        self.growing_segments.insert(segment_id);
        self
    }
}

/// Latest leader views, per reporting node and channel.
#[derive(Default)]
pub struct LeaderViewManager {
    views: RwLock<HashMap<NodeId, HashMap<String, LeaderView>>>,
}

impl LeaderViewManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything `leader_id` reports with `views`.
    pub fn update(&self, leader_id: NodeId, views: impl IntoIterator<Item = LeaderView>) {
        let views: HashMap<String, LeaderView> = views
            .into_iter()
            .map(|view| (view.channel.clone(), view))
            .collect();
        tracing::trace!(leader_id, channels = views.len(), "leader views updated");
        self.views.write().insert(leader_id, views);
    }

    /// Forgets a node, e.g. once it goes offline.
    pub fn remove_node(&self, leader_id: NodeId) {
        self.views.write().remove(&leader_id);
    }

    /// Returns every view reported for `collection_id`.
    pub fn collection_views(&self, collection_id: CollectionId) -> Vec<LeaderView> {
        self.views
            .read()
            .values()
            .flat_map(|views| views.values())
            .filter(|view| view.collection_id == collection_id)
            .cloned()
            .collect()
    }

    /// Returns true if any leader of `collection_id` serves the sealed
    /// segment. When `channel` is given only that channel's views count.
    pub fn is_segment_served(
        &self,
        collection_id: CollectionId,
        channel: Option<&str>,
        segment_id: SegmentId,
    ) -> bool {
        self.views
            .read()
            .values()
            .flat_map(|views| views.values())
            .filter(|view| view.collection_id == collection_id)
            .filter(|view| channel.map_or(true, |channel| view.channel == channel))
            .any(|view| view.segments.contains_key(&segment_id))
    }

    /// Returns the leaders serving `segment_id` as a sealed segment.
    pub fn sealed_segment_dist(&self, segment_id: SegmentId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .views
            .read()
            .iter()
            .filter(|(_, views)| {
                views
                    .values()
                    .any(|view| view.segments.contains_key(&segment_id))
            })
            .map(|(node, _)| *node)
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Returns the leaders still writing `segment_id` as a growing segment.
    pub fn growing_segment_dist(&self, segment_id: SegmentId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .views
            .read()
            .iter()
            .filter(|(_, views)| {
                views
                    .values()
                    .any(|view| view.growing_segments.contains(&segment_id))
            })
            .map(|(node, _)| *node)
            .collect();
        nodes.sort_unstable();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_served_by_any_leader() {
        let dist = LeaderViewManager::new();
        dist.update(1, [LeaderView::new(1, 100, "100-dmc0").with_segment(1, 1)]);
        dist.update(2, [LeaderView::new(2, 100, "100-dmc1").with_segment(2, 2)]);

        assert!(dist.is_segment_served(100, None, 1));
        assert!(dist.is_segment_served(100, None, 2));
        assert!(!dist.is_segment_served(100, None, 3));
        assert!(!dist.is_segment_served(200, None, 1));
    }

    #[test]
    fn channel_filter() {
        let dist = LeaderViewManager::new();
        dist.update(1, [LeaderView::new(1, 100, "100-dmc0").with_segment(1, 1)]);

        assert!(dist.is_segment_served(100, Some("100-dmc0"), 1));
        assert!(!dist.is_segment_served(100, Some("100-dmc1"), 1));
    }

    #[test]
    fn update_replaces_previous_report() {
        let dist = LeaderViewManager::new();
        dist.update(1, [LeaderView::new(1, 100, "c").with_segment(1, 1)]);
        dist.update(1, [LeaderView::new(1, 100, "c").with_segment(3, 1)]);

        assert!(!dist.is_segment_served(100, None, 1));
        assert!(dist.is_segment_served(100, None, 3));
        assert_eq!(dist.collection_views(100).len(), 1);
    }

    #[test]
    fn growing_and_sealed_dist() {
        let dist = LeaderViewManager::new();
        dist.update(
            1,
            [LeaderView::new(1, 100, "c").with_segment(1, 3).with_growing(3)],
        );
        dist.update(2, [LeaderView::new(2, 100, "d").with_segment(1, 4)]);

        assert_eq!(dist.sealed_segment_dist(1), vec![1, 2]);
        assert_eq!(dist.growing_segment_dist(3), vec![1]);

        dist.remove_node(1);
        assert!(dist.growing_segment_dist(3).is_empty());
        assert_eq!(dist.sealed_segment_dist(1), vec![2]);
    }
}
