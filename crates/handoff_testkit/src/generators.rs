//! Property-based test generators using proptest.
//!
//! Strategies produce events that pass [`HandoffEvent::validate`], scoped
//! to the fixture collection and partition.

use crate::fixtures::{CHANNEL, COLLECTION_ID, FIELD_ID, INDEX_ID, PARTITION_ID};
use handoff_protocol::{HandoffEvent, SegmentId, SegmentState};
use proptest::prelude::*;

/// Strategy for segment IDs above the fixture's initial segments.
pub fn segment_id_strategy() -> impl Strategy<Value = SegmentId> {
    3i64..100_000
}

/// Strategy for announced segment states.
pub fn segment_state_strategy() -> impl Strategy<Value = SegmentState> {
    prop_oneof![
        Just(SegmentState::Growing),
        Just(SegmentState::Sealed),
        Just(SegmentState::Flushing),
        Just(SegmentState::Flushed),
        Just(SegmentState::Dropped),
    ]
}

/// Strategy for a linear compaction chain.
///
/// The first event is a flush of a fresh segment; each following event is
/// compacted from the one before it. Segment IDs strictly increase and
/// every event carries the fixture's required index.
pub fn compaction_chain_strategy(max_len: usize) -> impl Strategy<Value = Vec<HandoffEvent>> {
    (segment_id_strategy(), 1..=max_len.max(1)).prop_map(|(first, len)| {
        let mut events = Vec::with_capacity(len);
        events.push(
            HandoffEvent::flushed(COLLECTION_ID, PARTITION_ID, first)
                .with_channel(CHANNEL)
                .with_index(FIELD_ID, INDEX_ID),
        );
        for offset in 1..len as i64 {
            let segment = first + offset;
            events.push(
                HandoffEvent::compacted(COLLECTION_ID, PARTITION_ID, segment, [segment - 1])
                    .with_channel(CHANNEL)
                    .with_index(FIELD_ID, INDEX_ID),
            );
        }
        events
    })
}

/// Strategy for a single event of any kind with a valid lineage.
pub fn handoff_event_strategy() -> impl Strategy<Value = HandoffEvent> {
    (
        segment_id_strategy(),
        segment_state_strategy(),
        prop::collection::btree_set(1i64..3, 0..3),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(segment, state, from, fake, indexed)| {
            let from: Vec<SegmentId> = from.into_iter().collect();
            let mut event = if fake && !from.is_empty() {
                HandoffEvent::fake(COLLECTION_ID, PARTITION_ID, segment, from)
            } else if from.is_empty() {
                HandoffEvent::flushed(COLLECTION_ID, PARTITION_ID, segment).with_state(state)
            } else {
                HandoffEvent::compacted(COLLECTION_ID, PARTITION_ID, segment, from).with_state(state)
            };
            if indexed {
                event = event.with_index(FIELD_ID, INDEX_ID);
            }
            event
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn chains_are_linear(chain in compaction_chain_strategy(8)) {
            prop_assert!(!chain.is_empty());
            prop_assert!(chain[0].compaction_from.is_empty());
            for pair in chain.windows(2) {
                prop_assert_eq!(&pair[1].compaction_from, &vec![pair[0].segment_id]);
            }
        }

        #[test]
        fn generated_events_validate(event in handoff_event_strategy()) {
            prop_assert!(event.validate().is_ok());
        }
    }
}
