//! Cluster fixtures.
//!
//! The default fixture mirrors a small loaded cluster: collection 100 with
//! partition 10, one DML channel, sealed segments 1 and 2 in the target and
//! served by leader 1, and index 1 required on field 1.

use handoff_kv::{KvStore, MemoryKv};
use handoff_meta::{
    Collection, DmChannel, LeaderView, LeaderViewManager, Meta, SegmentTarget, TargetManager,
};
use handoff_observer::{HandoffObserver, ObserverConfig, RetryConfig};
use handoff_protocol::{handoff_key, CollectionId, HandoffEvent, NodeId, PartitionId, SegmentId};
use std::sync::Arc;
use std::time::Duration;

/// Collection loaded by the fixture.
pub const COLLECTION_ID: CollectionId = 100;
/// Partition of [`COLLECTION_ID`].
pub const PARTITION_ID: PartitionId = 10;
/// DML channel of [`COLLECTION_ID`].
pub const CHANNEL: &str = "100-dmc0";
/// Vector field carrying the required index.
pub const FIELD_ID: i64 = 1;
/// Index required on [`FIELD_ID`].
pub const INDEX_ID: i64 = 1;
/// Shard leader of [`CHANNEL`].
pub const LEADER_ID: NodeId = 1;
/// Sealed segments served before any handoff.
pub const INITIAL_SEGMENTS: [SegmentId; 2] = [1, 2];

/// Observer type used with the fixture.
pub type TestObserver = HandoffObserver<Arc<MemoryKv>, Arc<TargetManager>>;

/// Returns a configuration with a short interval and fast retries.
pub fn test_config() -> ObserverConfig {
    ObserverConfig::new()
        .with_check_interval(Duration::from_millis(10))
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        )
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Filtering follows `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A loaded collection with its store, metadata, leaders and target.
pub struct ClusterFixture {
    /// Event store.
    pub kv: Arc<MemoryKv>,
    /// Load metadata.
    pub meta: Arc<Meta>,
    /// Leader views.
    pub dist: Arc<LeaderViewManager>,
    /// Serving target.
    pub target: Arc<TargetManager>,
    /// Configuration for observers built from the fixture.
    pub config: ObserverConfig,
}

impl ClusterFixture {
    /// Creates the default fixture with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates the default fixture with a custom configuration.
    pub fn with_config(config: ObserverConfig) -> Self {
        init_tracing();
        let fixture = Self {
            kv: Arc::new(MemoryKv::new()),
            meta: Arc::new(Meta::new()),
            dist: Arc::new(LeaderViewManager::new()),
            target: Arc::new(TargetManager::new()),
            config,
        };

        fixture
            .meta
            .put_collection(Collection::loaded(COLLECTION_ID).with_field_index(FIELD_ID, INDEX_ID));
        fixture
            .target
            .add_dm_channel(DmChannel::new(COLLECTION_ID, CHANNEL));
        fixture.target.add_segment(
            INITIAL_SEGMENTS
                .iter()
                .map(|&segment| SegmentTarget::new(COLLECTION_ID, PARTITION_ID, segment, CHANNEL)),
        );
        fixture.serve(&INITIAL_SEGMENTS);
        fixture
    }

    /// Builds an observer over the fixture's shared state.
    ///
    /// Several observers built from one fixture see the same store, which
    /// is how restarts are simulated.
    pub fn observer(&self) -> TestObserver {
        HandoffObserver::new(
            self.config.clone(),
            self.kv.clone(),
            self.meta.clone(),
            self.dist.clone(),
            self.target.clone(),
        )
    }

    /// Persists a handoff event, as the flush or compaction pipeline does.
    pub fn produce(&self, event: &HandoffEvent) {
        let bytes = event.encode().expect("encode handoff event");
        self.kv
            .save(&event.key(&self.config.handoff_prefix), &bytes)
            .expect("save handoff event");
    }

    /// Returns true if the event key of the segment still exists.
    pub fn handoff_key_exists(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
        segment_id: SegmentId,
    ) -> bool {
        self.kv.contains_key(&handoff_key(
            &self.config.handoff_prefix,
            collection_id,
            partition_id,
            segment_id,
        ))
    }

    /// Returns true if the event key of a fixture segment still exists.
    pub fn key_exists(&self, segment_id: SegmentId) -> bool {
        self.handoff_key_exists(COLLECTION_ID, PARTITION_ID, segment_id)
    }

    /// Makes [`LEADER_ID`] report exactly `segments` on [`CHANNEL`].
    pub fn serve(&self, segments: &[SegmentId]) {
        let view = segments
            .iter()
            .fold(LeaderView::new(LEADER_ID, COLLECTION_ID, CHANNEL), |view, &segment| {
                view.with_segment(segment, LEADER_ID)
            });
        self.dist.update(LEADER_ID, [view]);
    }

    /// Returns a flushed event carrying the required index.
    pub fn sealed_event(&self, segment_id: SegmentId) -> HandoffEvent {
        HandoffEvent::flushed(COLLECTION_ID, PARTITION_ID, segment_id)
            .with_channel(CHANNEL)
            .with_index(FIELD_ID, INDEX_ID)
    }

    /// Returns a compaction event carrying the required index.
    pub fn compacted_event(
        &self,
        segment_id: SegmentId,
        from: impl IntoIterator<Item = SegmentId>,
    ) -> HandoffEvent {
        HandoffEvent::compacted(COLLECTION_ID, PARTITION_ID, segment_id, from)
            .with_channel(CHANNEL)
            .with_index(FIELD_ID, INDEX_ID)
    }

    /// Returns the sorted segments targeted for [`COLLECTION_ID`].
    pub fn targeted(&self) -> Vec<SegmentId> {
        self.target.collection_segments(COLLECTION_ID)
    }
}

impl Default for ClusterFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_serves_initial_segments() {
        let cluster = ClusterFixture::new();
        assert_eq!(cluster.targeted(), vec![1, 2]);
        assert!(cluster.dist.is_segment_served(COLLECTION_ID, Some(CHANNEL), 1));
        assert!(cluster.meta.is_partition_loaded(COLLECTION_ID, PARTITION_ID));
    }

    #[test]
    fn produce_writes_key() {
        let cluster = ClusterFixture::new();
        cluster.produce(&cluster.sealed_event(3));
        assert!(cluster.key_exists(3));
        assert!(!cluster.key_exists(4));
    }
}
