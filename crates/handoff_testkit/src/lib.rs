//! # Handoff Testkit
//!
//! Test utilities for the handoff observer.
//!
//! This crate provides:
//! - A cluster fixture with one loaded collection, its leaders and target
//! - Fault-injecting wrappers around the event store and the target
//! - Property-based generators for events and compaction chains
//! - Async polling helpers for loop-driven tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use handoff_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn flush_handoff() {
//!     let cluster = ClusterFixture::new();
//!     let observer = cluster.observer();
//!     observer.register(COLLECTION_ID);
//!     observer.start_handoff(COLLECTION_ID).unwrap();
//!     observer.start().unwrap();
//!
//!     cluster.produce(&cluster.sealed_event(3));
//!     cluster.serve(&[1, 2, 3]);
//!     assert!(wait_for(|| cluster.target.contains_segment(3)).await);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::wait::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use wait::*;
