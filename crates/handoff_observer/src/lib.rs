//! # Handoff Observer
//!
//! Resolution engine that turns persisted segment handoff events into
//! changes of the serving target.
//!
//! This crate provides:
//! - Compaction lineage resolution over pending events
//! - Load and index readiness checks against leader views
//! - The serving target mutation seam
//! - The pending event registry and periodic processing loop
//! - Per-collection registration and loop start/stop
//!
//! ## Settlement
//!
//! Each pending event is evaluated on every tick until it is settled:
//! 1. Fake compaction results retire their ancestors straight away
//! 2. Events for unloaded partitions, unsealed segments or segments
//!    missing a required index are rejected
//! 3. Events whose segment no leader serves yet stay pending
//! 4. Anything else is accepted: the segment enters the target and every
//!    ancestor leaves it
//!
//! ## Key Invariants
//!
//! - An event's key is deleted only after its target mutation succeeded
//! - Deleting the key is the commit point; a crash before it replays the
//!   same, idempotent, transition
//! - Ancestors of a chain are settled together with its newest descendant
//! - Ticks never overlap

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lineage;
mod observer;
mod readiness;
mod registry;
mod target;

pub use config::{ObserverConfig, RetryConfig, DEFAULT_MAX_LINEAGE_DEPTH};
pub use error::{ObserverError, ObserverResult};
pub use lineage::{Lineage, LineageError};
pub use observer::{CollectionStatus, HandoffObserver, HandoffStats, RejectReason, TickReport};
pub use readiness::{missing_indexes, ReadinessOracle};
pub use registry::PendingEvent;
pub use target::TargetMutator;
