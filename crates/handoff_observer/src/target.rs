//! Serving target mutations.

use crate::error::ObserverResult;
use handoff_meta::{SegmentTarget, TargetManager};
use handoff_protocol::SegmentId;
use std::sync::Arc;

/// Mutations the observer applies to the serving target.
///
/// Every call may run concurrently with other observers. Implementations
/// must make `add_segment` and `remove_segment` idempotent.
pub trait TargetMutator: Send + Sync {
    /// Adds a segment to the target.
    fn add_segment(&self, segment: SegmentTarget) -> ObserverResult<()>;

    /// Removes a segment from the target. Absent segments are not an error.
    fn remove_segment(&self, segment_id: SegmentId) -> ObserverResult<()>;

    /// Returns true if the segment is in the target.
    fn contains_segment(&self, segment_id: SegmentId) -> bool;
}

impl TargetMutator for TargetManager {
    fn add_segment(&self, segment: SegmentTarget) -> ObserverResult<()> {
        TargetManager::add_segment(self, [segment]);
        Ok(())
    }

    fn remove_segment(&self, segment_id: SegmentId) -> ObserverResult<()> {
        TargetManager::remove_segment(self, segment_id);
        Ok(())
    }

    fn contains_segment(&self, segment_id: SegmentId) -> bool {
        TargetManager::contains_segment(self, segment_id)
    }
}

impl<T: TargetMutator + ?Sized> TargetMutator for Arc<T> {
    fn add_segment(&self, segment: SegmentTarget) -> ObserverResult<()> {
        (**self).add_segment(segment)
    }

    fn remove_segment(&self, segment_id: SegmentId) -> ObserverResult<()> {
        (**self).remove_segment(segment_id)
    }

    fn contains_segment(&self, segment_id: SegmentId) -> bool {
        (**self).contains_segment(segment_id)
    }
}
