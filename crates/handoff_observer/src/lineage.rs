//! Compaction lineage over the pending events.
//!
//! The graph is rebuilt from a registry snapshot on every tick, so an
//! ancestor that is still pending and one that was settled long ago are
//! walked the same way.

use handoff_protocol::{HandoffEvent, SegmentId};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Errors raised while walking lineage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    /// The chain is deeper than the configured bound.
    #[error("lineage of segment {segment_id} exceeds {max_depth} generations")]
    DepthExceeded {
        /// Segment being resolved.
        segment_id: SegmentId,
        /// Configured bound.
        max_depth: usize,
    },

    /// The segment is its own ancestor.
    #[error("segment {segment_id} is its own ancestor")]
    Cycle {
        /// Segment being resolved.
        segment_id: SegmentId,
    },
}

/// Ancestor and descendant adjacency built from pending events.
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    parents: HashMap<SegmentId, Vec<SegmentId>>,
    child: HashMap<SegmentId, SegmentId>,
    max_depth: usize,
}

impl Lineage {
    /// Builds the graph from pending events.
    ///
    /// When two pending events claim the same ancestor, the one with the
    /// larger segment ID is taken as its descendant.
    pub fn build<'a>(events: impl IntoIterator<Item = &'a HandoffEvent>, max_depth: usize) -> Self {
        let mut parents = HashMap::new();
        let mut child: HashMap<SegmentId, SegmentId> = HashMap::new();
        for event in events {
            for &ancestor in &event.compaction_from {
                child
                    .entry(ancestor)
                    .and_modify(|existing| *existing = (*existing).max(event.segment_id))
                    .or_insert(event.segment_id);
            }
            parents.insert(event.segment_id, event.compaction_from.clone());
        }
        Self {
            parents,
            child,
            max_depth,
        }
    }

    /// Returns true if no pending event was compacted from `segment_id`.
    pub fn is_terminal(&self, segment_id: SegmentId) -> bool {
        !self.child.contains_key(&segment_id)
    }

    /// Follows descendants of `segment_id` to the newest pending one.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Cycle`] if the walk returns to a segment
    /// already visited, or [`LineageError::DepthExceeded`] past the bound.
    pub fn terminal_descendant(&self, segment_id: SegmentId) -> Result<SegmentId, LineageError> {
        let mut visited = HashSet::from([segment_id]);
        let mut current = segment_id;
        while let Some(&next) = self.child.get(&current) {
            if !visited.insert(next) {
                return Err(LineageError::Cycle { segment_id });
            }
            if visited.len() > self.max_depth + 1 {
                return Err(LineageError::DepthExceeded {
                    segment_id,
                    max_depth: self.max_depth,
                });
            }
            current = next;
        }
        Ok(current)
    }

    /// Returns every segment `segment_id` transitively replaces.
    ///
    /// Ancestors that have no pending event of their own still appear; the
    /// walk only stops descending through them.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Cycle`] if `segment_id` is reachable from
    /// itself, or [`LineageError::DepthExceeded`] when a chain is longer
    /// than the bound.
    pub fn ancestors(&self, segment_id: SegmentId) -> Result<BTreeSet<SegmentId>, LineageError> {
        let mut found = BTreeSet::new();
        let mut stack: Vec<(SegmentId, usize)> = self
            .parents
            .get(&segment_id)
            .map(|parents| parents.iter().map(|&parent| (parent, 1)).collect())
            .unwrap_or_default();

        while let Some((ancestor, depth)) = stack.pop() {
            if ancestor == segment_id {
                return Err(LineageError::Cycle { segment_id });
            }
            if depth > self.max_depth {
                return Err(LineageError::DepthExceeded {
                    segment_id,
                    max_depth: self.max_depth,
                });
            }
            if !found.insert(ancestor) {
                continue;
            }
            if let Some(parents) = self.parents.get(&ancestor) {
                stack.extend(parents.iter().map(|&parent| (parent, depth + 1)));
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chain(events: &[HandoffEvent]) -> Lineage {
        Lineage::build(events, 1024)
    }

    #[test]
    fn direct_flush_has_no_ancestors() {
        let events = [HandoffEvent::flushed(100, 10, 3)];
        let lineage = chain(&events);
        assert!(lineage.ancestors(3).unwrap().is_empty());
        assert!(lineage.is_terminal(3));
        assert_eq!(lineage.terminal_descendant(3).unwrap(), 3);
    }

    #[test]
    fn recursive_chain() {
        let events = [
            HandoffEvent::flushed(100, 10, 3),
            HandoffEvent::compacted(100, 10, 4, [3]),
            HandoffEvent::compacted(100, 10, 5, [4]),
        ];
        let lineage = chain(&events);

        assert_eq!(lineage.ancestors(5).unwrap(), BTreeSet::from([3, 4]));
        assert_eq!(lineage.ancestors(4).unwrap(), BTreeSet::from([3]));
        assert!(!lineage.is_terminal(3));
        assert!(!lineage.is_terminal(4));
        assert!(lineage.is_terminal(5));
        assert_eq!(lineage.terminal_descendant(3).unwrap(), 5);
    }

    #[test]
    fn settled_ancestors_still_count() {
        // 4 is not pending; 10 still replaces it.
        let events = [
            HandoffEvent::flushed(100, 10, 3),
            HandoffEvent::compacted(100, 10, 9, [3]),
            HandoffEvent::compacted(100, 10, 10, [4]),
        ];
        let lineage = chain(&events);
        assert_eq!(lineage.ancestors(10).unwrap(), BTreeSet::from([4]));
        assert_eq!(lineage.ancestors(9).unwrap(), BTreeSet::from([3]));
        assert_eq!(lineage.terminal_descendant(4).unwrap(), 10);
    }

    #[test]
    fn diamond_is_walked_once() {
        let events = [
            HandoffEvent::compacted(1, 1, 3, [1, 2]),
            HandoffEvent::compacted(1, 1, 4, [1, 2]),
            HandoffEvent::compacted(1, 1, 5, [3, 4]),
        ];
        let lineage = chain(&events);
        assert_eq!(lineage.ancestors(5).unwrap(), BTreeSet::from([1, 2, 3, 4]));
        assert_eq!(lineage.terminal_descendant(1).unwrap(), 5);
    }

    #[test]
    fn conflicting_descendants_pick_largest() {
        let events = [
            HandoffEvent::compacted(1, 1, 7, [1]),
            HandoffEvent::compacted(1, 1, 6, [1]),
        ];
        let lineage = chain(&events);
        assert_eq!(lineage.terminal_descendant(1).unwrap(), 7);
        assert!(lineage.is_terminal(6));
    }

    #[test]
    fn cycle_is_detected() {
        let events = [
            HandoffEvent::compacted(1, 1, 2, [3]),
            HandoffEvent::compacted(1, 1, 3, [2]),
        ];
        let lineage = chain(&events);
        assert_eq!(
            lineage.ancestors(2),
            Err(LineageError::Cycle { segment_id: 2 })
        );
        assert_eq!(
            lineage.terminal_descendant(3),
            Err(LineageError::Cycle { segment_id: 3 })
        );
    }

    #[test]
    fn depth_bound() {
        let events: Vec<HandoffEvent> = (2..=6)
            .map(|id| HandoffEvent::compacted(1, 1, id, [id - 1]))
            .collect();
        let lineage = Lineage::build(&events, 3);

        assert!(lineage.ancestors(4).is_ok());
        assert_eq!(
            lineage.ancestors(6),
            Err(LineageError::DepthExceeded {
                segment_id: 6,
                max_depth: 3
            })
        );
        assert!(matches!(
            lineage.terminal_descendant(1),
            Err(LineageError::DepthExceeded { .. })
        ));
    }

    proptest! {
        #[test]
        fn linear_chain_resolves_every_generation(len in 1usize..64) {
            let mut events = vec![HandoffEvent::flushed(1, 1, 1)];
            for id in 2..=len as i64 + 1 {
                events.push(HandoffEvent::compacted(1, 1, id, [id - 1]));
            }
            let last = len as i64 + 1;
            let lineage = chain(&events);

            let ancestors = lineage.ancestors(last).unwrap();
            prop_assert_eq!(ancestors.len(), len);
            prop_assert!(!ancestors.contains(&last));
            for id in 1..=last {
                prop_assert_eq!(lineage.terminal_descendant(id).unwrap(), last);
            }
        }

        #[test]
        fn ancestors_never_contain_self(
            edges in proptest::collection::vec((1i64..20, 1i64..20), 0..40)
        ) {
            let mut by_segment: HashMap<SegmentId, Vec<SegmentId>> = HashMap::new();
            for (segment, ancestor) in edges {
                if segment != ancestor {
                    by_segment.entry(segment).or_default().push(ancestor);
                }
            }
            let events: Vec<HandoffEvent> = by_segment
                .into_iter()
                .map(|(segment, from)| HandoffEvent::compacted(1, 1, segment, from))
                .collect();
            let lineage = chain(&events);

            for event in &events {
                if let Ok(ancestors) = lineage.ancestors(event.segment_id) {
                    prop_assert!(!ancestors.contains(&event.segment_id));
                }
            }
        }
    }
}
