//! Pending handoff events keyed by segment.

use handoff_protocol::{CollectionId, HandoffEvent, SegmentId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A pending event together with where it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    /// Persisted key.
    pub key: String,
    /// Store revision of the last write to `key`.
    pub revision: i64,
    /// Decoded event.
    pub event: HandoffEvent,
}

/// All not-yet-settled events.
///
/// Besides live events the registry remembers keys whose value could not
/// be decoded, so their deletion can be retried, and the revisions of
/// events this observer already settled, so a late replay of the same
/// write is not taken for a new event. Segments held for an over-deep
/// lineage are tracked so that is reported once.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    events: BTreeMap<SegmentId, PendingEvent>,
    malformed: BTreeMap<String, i64>,
    settled: HashMap<String, i64>,
    too_deep: HashSet<SegmentId>,
}

impl Registry {
    /// Inserts or replaces the event of a segment.
    ///
    /// Returns false when the write is not newer than what is already known.
    pub fn upsert(&mut self, pending: PendingEvent) -> bool {
        if self
            .settled
            .get(&pending.key)
            .is_some_and(|&revision| revision >= pending.revision)
        {
            return false;
        }
        let segment_id = pending.event.segment_id;
        if let Some(existing) = self.events.get(&segment_id) {
            if existing.revision >= pending.revision {
                return false;
            }
            if existing.key != pending.key {
                tracing::warn!(
                    segment_id,
                    old_key = %existing.key,
                    new_key = %pending.key,
                    "segment re-announced under a different key"
                );
            }
        }
        self.malformed.remove(&pending.key);
        self.events.insert(segment_id, pending);
        true
    }

    pub fn get(&self, segment_id: SegmentId) -> Option<&PendingEvent> {
        self.events.get(&segment_id)
    }

    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.events.contains_key(&segment_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Removes an event after its key was deleted from the store.
    pub fn settle(&mut self, pending: &PendingEvent) {
        if self
            .events
            .get(&pending.event.segment_id)
            .is_some_and(|current| current.key == pending.key && current.revision == pending.revision)
        {
            self.events.remove(&pending.event.segment_id);
            self.too_deep.remove(&pending.event.segment_id);
        }
        self.settled.insert(pending.key.clone(), pending.revision);
    }

    /// Drops whatever is known about `key` after it disappeared from the
    /// store. Returns the dropped event, if any.
    pub fn remove_key(&mut self, key: &str) -> Option<PendingEvent> {
        self.malformed.remove(key);
        self.settled.remove(key);
        let segment_id = self
            .events
            .values()
            .find(|pending| pending.key == key)
            .map(|pending| pending.event.segment_id)?;
        self.too_deep.remove(&segment_id);
        self.events.remove(&segment_id)
    }

    /// Drops events and bookkeeping under `prefix` whose key is not live.
    /// Returns the number of events dropped.
    pub fn retain_live(&mut self, prefix: &str, is_live: impl Fn(&str) -> bool) -> usize {
        let before = self.events.len();
        self.events
            .retain(|_, pending| !pending.key.starts_with(prefix) || is_live(&pending.key));
        self.malformed
            .retain(|key, _| !key.starts_with(prefix) || is_live(key));
        self.settled
            .retain(|key, _| !key.starts_with(prefix) || is_live(key));
        self.prune_too_deep();
        before - self.events.len()
    }

    /// Drops every event of a collection. Returns the number dropped.
    pub fn remove_collection(&mut self, collection_id: CollectionId) -> usize {
        let before = self.events.len();
        self.events
            .retain(|_, pending| pending.event.collection_id != collection_id);
        self.prune_too_deep();
        before - self.events.len()
    }

    /// Returns the pending events ordered by store revision.
    pub fn snapshot(&self) -> Vec<PendingEvent> {
        let mut events: Vec<PendingEvent> = self.events.values().cloned().collect();
        events.sort_by_key(|pending| (pending.revision, pending.event.segment_id));
        events
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.events.keys().copied().collect()
    }

    /// Records a key whose value could not be decoded. Returns true if it
    /// was not already known.
    pub fn mark_malformed(&mut self, key: String, revision: i64) -> bool {
        self.malformed.insert(key, revision).is_none()
    }

    pub fn malformed_keys(&self) -> Vec<String> {
        self.malformed.keys().cloned().collect()
    }

    pub fn clear_malformed(&mut self, key: &str) {
        self.malformed.remove(key);
    }

    /// Records a segment held for an over-deep lineage. Returns true the
    /// first time, until the segment leaves the registry.
    pub fn mark_too_deep(&mut self, segment_id: SegmentId) -> bool {
        self.too_deep.insert(segment_id)
    }

    fn prune_too_deep(&mut self) {
        let events = &self.events;
        self.too_deep.retain(|segment_id| events.contains_key(segment_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(segment_id: SegmentId, revision: i64) -> PendingEvent {
        let event = HandoffEvent::flushed(100, 10, segment_id);
        PendingEvent {
            key: event.key("h"),
            revision,
            event,
        }
    }

    #[test]
    fn upsert_keeps_newest_revision() {
        let mut registry = Registry::default();
        assert!(registry.upsert(pending(3, 5)));
        assert!(!registry.upsert(pending(3, 5)));
        assert!(!registry.upsert(pending(3, 4)));
        assert!(registry.upsert(pending(3, 6)));
        assert_eq!(registry.get(3).map(|p| p.revision), Some(6));
    }

    #[test]
    fn snapshot_orders_by_revision() {
        let mut registry = Registry::default();
        registry.upsert(pending(10, 3));
        registry.upsert(pending(3, 1));
        registry.upsert(pending(9, 2));
        let order: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|p| p.event.segment_id)
            .collect();
        assert_eq!(order, vec![3, 9, 10]);
        assert_eq!(registry.segment_ids(), vec![3, 9, 10]);
    }

    #[test]
    fn settled_write_is_not_replayed() {
        let mut registry = Registry::default();
        let event = pending(3, 5);
        registry.upsert(event.clone());
        registry.settle(&event);

        assert!(!registry.contains(3));
        assert!(!registry.upsert(event.clone()));

        // A newer write of the same key is a new event.
        assert!(registry.upsert(pending(3, 8)));

        // Once the delete is observed the tombstone goes away.
        registry.remove_key(&event.key);
        assert!(registry.upsert(event));
    }

    #[test]
    fn settle_ignores_replaced_event() {
        let mut registry = Registry::default();
        let old = pending(3, 5);
        registry.upsert(old.clone());
        registry.upsert(pending(3, 7));

        registry.settle(&old);
        assert_eq!(registry.get(3).map(|p| p.revision), Some(7));
    }

    #[test]
    fn retain_live_drops_vanished_keys() {
        let mut registry = Registry::default();
        registry.upsert(pending(3, 1));
        registry.upsert(pending(4, 2));
        registry.mark_malformed("h/100/10/x".into(), 3);
        registry.mark_malformed("other/1".into(), 4);

        let dropped = registry.retain_live("h/100/", |key| key == "h/100/10/4");
        assert_eq!(dropped, 1);
        assert!(!registry.contains(3));
        assert!(registry.contains(4));
        assert_eq!(registry.malformed_keys(), vec!["other/1".to_string()]);
    }

    #[test]
    fn malformed_keys_are_tracked_once() {
        let mut registry = Registry::default();
        assert!(registry.mark_malformed("h/1".into(), 1));
        assert!(!registry.mark_malformed("h/1".into(), 2));
        registry.clear_malformed("h/1");
        assert!(registry.malformed_keys().is_empty());
    }

    #[test]
    fn too_deep_is_reported_once_per_stay() {
        let mut registry = Registry::default();
        let event = pending(3, 1);
        registry.upsert(event.clone());

        assert!(registry.mark_too_deep(3));
        assert!(!registry.mark_too_deep(3));

        registry.settle(&event);
        registry.upsert(pending(3, 2));
        assert!(registry.mark_too_deep(3));

        registry.retain_live("h/", |_| false);
        assert!(registry.mark_too_deep(3));
    }

    #[test]
    fn remove_collection() {
        let mut registry = Registry::default();
        registry.upsert(pending(3, 1));
        let other = HandoffEvent::flushed(200, 20, 4);
        registry.upsert(PendingEvent {
            key: other.key("h"),
            revision: 2,
            event: other,
        });

        assert_eq!(registry.remove_collection(100), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(4));
    }
}
