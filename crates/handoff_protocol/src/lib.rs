//! # Handoff Protocol
//!
//! Shared data model for segment handoff announcements.
//!
//! A handoff event is written by the flush/compaction pipeline when a sealed
//! segment is ready to replace growing or compacted segments in the serving
//! target. This crate defines:
//! - [`HandoffEvent`] and its supporting types
//! - The persisted key layout `<prefix>/<collection>/<partition>/<segment>`
//! - CBOR encoding of event values
//!
//! ## Example
//!
//! ```
//! use handoff_protocol::{HandoffEvent, DEFAULT_HANDOFF_PREFIX};
//!
//! let event = HandoffEvent::compacted(100, 10, 4, [3]).with_index(1, 1);
//! let bytes = event.encode().unwrap();
//! assert_eq!(HandoffEvent::decode(&bytes).unwrap(), event);
//! assert_eq!(event.key(DEFAULT_HANDOFF_PREFIX), "querycoord-handoff/100/10/4");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod keys;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{FieldIndexInfo, HandoffEvent, SegmentState};
pub use keys::{collection_prefix, handoff_key, HandoffKey, DEFAULT_HANDOFF_PREFIX};

/// Segment identifier.
pub type SegmentId = i64;
/// Collection identifier.
pub type CollectionId = i64;
/// Partition identifier.
pub type PartitionId = i64;
/// Vector field identifier.
pub type FieldId = i64;
/// Index identifier.
pub type IndexId = i64;
/// Query node identifier.
pub type NodeId = i64;
