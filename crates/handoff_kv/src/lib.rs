//! # Handoff KV
//!
//! The event log gateway consumed by the handoff observer.
//!
//! Handoff events live in an ordered, revision-stamped key-value space. The
//! observer needs five operations from it: ordered prefix load, prefix
//! watch, single-key load, save and delete. [`KvStore`] captures that
//! contract; [`MemoryKv`] implements it in memory with the same revision
//! semantics as an etcd-style store.
//!
//! ## Design Principles
//!
//! - Every write bumps a single store-wide revision
//! - Prefix loads are ordered by the revision of the last write, not by key
//! - Deleting an absent key succeeds, so cleanup can be retried freely
//! - Implementations must be `Send + Sync`
//!
//! ## Example
//!
//! ```rust
//! use handoff_kv::{KvStore, MemoryKv};
//!
//! let kv = MemoryKv::new();
//! kv.save("h/1/1/10", b"a").unwrap();
//! kv.save("h/1/1/3", b"b").unwrap();
//!
//! let (entries, _rev) = kv.load_with_revision("h/").unwrap();
//! let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
//! assert_eq!(keys, vec!["h/1/1/10", "h/1/1/3"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{KvError, KvResult};
pub use memory::MemoryKv;
pub use store::{KvEntry, KvStore, WatchEvent, WatchReceiver};
