//! # Handoff Meta
//!
//! Coordinator-side state that the handoff observer reads and writes but does
//! not own:
//! - [`Meta`]: which collections and partitions are loaded, and which indexes
//!   a collection requires
//! - [`LeaderViewManager`]: what each query node reports it is serving
//! - [`TargetManager`]: the authoritative set of segments that should be served
//!
//! All three are thread-safe and cheap to share behind an `Arc`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod dist;
mod target;

pub use collection::{Collection, LoadStatus, Meta, Partition};
pub use dist::{LeaderView, LeaderViewManager, SegmentDist};
pub use target::{DmChannel, SegmentTarget, TargetManager};
