//! Scenario files: a cluster's starting state plus the events to resolve.

use handoff_kv::{KvStore, MemoryKv};
use handoff_meta::{
    Collection, DmChannel, LeaderView, LeaderViewManager, Meta, Partition, SegmentTarget,
    TargetManager,
};
use handoff_observer::{HandoffObserver, ObserverConfig};
use handoff_protocol::{CollectionId, HandoffEvent, NodeId};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// A cluster state and the handoff events written against it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Key prefix, defaults to the observer's.
    pub handoff_prefix: Option<String>,
    /// Overrides automatic handoff.
    pub auto_handoff: Option<bool>,
    /// Collections loaded as a whole.
    pub collections: Vec<Collection>,
    /// Partitions loaded on their own.
    pub partitions: Vec<Partition>,
    /// Initial leader reports.
    pub leader_views: Vec<LeaderView>,
    /// Segments served before any handoff.
    pub target: Vec<SegmentTarget>,
    /// Collections registered but not started.
    pub registered: Vec<CollectionId>,
    /// Collections whose handoff is started.
    pub started: Vec<CollectionId>,
    /// Events persisted before the first tick, in write order.
    pub events: Vec<HandoffEvent>,
    /// Changes applied before each tick.
    pub steps: Vec<Step>,
}

/// Changes applied before one tick.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Step {
    /// New leader reports; each replaces that leader's previous one.
    pub leader_views: Vec<LeaderView>,
    /// Events persisted before the tick.
    pub events: Vec<HandoffEvent>,
}

/// A scenario materialized over in-memory collaborators.
pub struct Cluster {
    /// Event store.
    pub kv: Arc<MemoryKv>,
    /// Leader views.
    pub dist: Arc<LeaderViewManager>,
    /// Serving target.
    pub target: Arc<TargetManager>,
    /// Observer over the above, not running.
    pub observer: HandoffObserver<Arc<MemoryKv>, Arc<TargetManager>>,
}

impl Scenario {
    /// Reads a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open scenario {}: {e}", path.display()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Returns the observer configuration the scenario asks for.
    pub fn config(&self) -> ObserverConfig {
        let mut config = ObserverConfig::default();
        if let Some(prefix) = &self.handoff_prefix {
            config = config.with_handoff_prefix(prefix.clone());
        }
        if let Some(auto_handoff) = self.auto_handoff {
            config = config.with_auto_handoff(auto_handoff);
        }
        config
    }

    /// Builds the cluster and persists the initial events.
    ///
    /// Steps are left for the caller to apply.
    pub fn build(&self) -> Result<Cluster, Box<dyn std::error::Error>> {
        let kv = Arc::new(MemoryKv::new());
        let meta = Arc::new(Meta::new());
        let dist = Arc::new(LeaderViewManager::new());
        let target = Arc::new(TargetManager::new());

        for collection in &self.collections {
            meta.put_collection(collection.clone());
        }
        for partition in &self.partitions {
            meta.put_partition(partition.clone());
        }

        let channels: BTreeSet<(CollectionId, &str)> = self
            .target
            .iter()
            .filter(|segment| !segment.channel.is_empty())
            .map(|segment| (segment.collection_id, segment.channel.as_str()))
            .collect();
        for (collection_id, channel) in channels {
            target.add_dm_channel(DmChannel::new(collection_id, channel));
        }
        target.add_segment(self.target.iter().cloned());

        let observer = HandoffObserver::new(
            self.config(),
            kv.clone(),
            meta,
            dist.clone(),
            target.clone(),
        );
        let cluster = Cluster {
            kv,
            dist,
            target,
            observer,
        };
        cluster.update_views(&self.leader_views);
        for event in &self.events {
            cluster.produce(event)?;
        }

        for &collection_id in &self.registered {
            cluster.observer.register(collection_id);
        }
        for &collection_id in &self.started {
            cluster.observer.start_handoff(collection_id)?;
        }
        cluster.observer.reload()?;
        Ok(cluster)
    }

    /// Returns every collection the scenario mentions, ascending.
    pub fn collection_ids(&self) -> BTreeSet<CollectionId> {
        self.collections
            .iter()
            .map(|collection| collection.collection_id)
            .chain(self.partitions.iter().map(|partition| partition.collection_id))
            .chain(self.target.iter().map(|segment| segment.collection_id))
            .chain(self.all_events().map(|event| event.collection_id))
            .collect()
    }

    /// Iterates over the initial events, then every step's events.
    pub fn all_events(&self) -> impl Iterator<Item = &HandoffEvent> {
        self.events
            .iter()
            .chain(self.steps.iter().flat_map(|step| step.events.iter()))
    }
}

impl Cluster {
    /// Validates and persists an event.
    pub fn produce(&self, event: &HandoffEvent) -> Result<i64, Box<dyn std::error::Error>> {
        event.validate()?;
        let key = event.key(&self.observer.config().handoff_prefix);
        Ok(self.kv.save(&key, &event.encode()?)?)
    }

    /// Applies a step and reloads so its events are seen by the next tick.
    pub fn apply(&self, step: &Step) -> Result<(), Box<dyn std::error::Error>> {
        self.update_views(&step.leader_views);
        for event in &step.events {
            self.produce(event)?;
        }
        self.observer.reload()?;
        Ok(())
    }

    fn update_views(&self, views: &[LeaderView]) {
        let mut by_leader: BTreeMap<NodeId, Vec<LeaderView>> = BTreeMap::new();
        for view in views {
            by_leader.entry(view.id).or_default().push(view.clone());
        }
        for (leader_id, views) in by_leader {
            self.dist.update(leader_id, views);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "collections": [
            { "collection_id": 100, "status": "Loaded", "field_index_id": { "1": 1 } }
        ],
        "leader_views": [
            { "id": 1, "collection_id": 100, "channel": "100-dmc0",
              "segments": { "1": { "node_id": 1, "version": 0 } } }
        ],
        "target": [
            { "segment_id": 1, "collection_id": 100, "partition_id": 10, "channel": "100-dmc0" }
        ],
        "started": [100],
        "events": [
            { "segment_id": 3, "collection_id": 100, "partition_id": 10,
              "insert_channel": "100-dmc0", "state": "Flushed",
              "compaction_from": [1], "created_by_compaction": true,
              "index_infos": [{ "field_id": 1, "index_id": 1 }] }
        ],
        "steps": [
            {},
            { "leader_views": [
                { "id": 1, "collection_id": 100, "channel": "100-dmc0",
                  "segments": { "3": { "node_id": 1, "version": 0 } } }
            ] }
        ]
    }"#;

    #[test]
    fn parse_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.collections.len(), 1);
        assert_eq!(scenario.events[0].compaction_from, vec![1]);
        assert_eq!(scenario.steps.len(), 2);
        assert!(scenario.handoff_prefix.is_none());
        assert_eq!(scenario.collection_ids().into_iter().collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn build_and_apply_steps() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let cluster = scenario.build().unwrap();
        assert_eq!(cluster.observer.pending_segments(), vec![3]);

        cluster.apply(&scenario.steps[0]).unwrap();
        assert!(cluster.observer.tick().is_idle());

        cluster.apply(&scenario.steps[1]).unwrap();
        assert_eq!(cluster.observer.tick().accepted, vec![3]);
        assert_eq!(cluster.target.collection_segments(100), vec![3]);
        assert!(cluster.kv.is_empty());
    }

    #[test]
    fn invalid_event_is_refused() {
        let scenario: Scenario = serde_json::from_str(
            r#"{ "events": [ { "segment_id": 3, "collection_id": 100, "partition_id": 10,
                               "compaction_from": [3], "created_by_compaction": true } ] }"#,
        )
        .unwrap();
        assert!(scenario.build().is_err());
    }
}
