//! Gateway trait definition.

use crate::error::KvResult;
use tokio::sync::mpsc::UnboundedReceiver;

/// A stored key with its value and revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Full key.
    pub key: String,
    /// Stored value.
    pub value: Vec<u8>,
    /// Revision of the write that created the key.
    pub create_revision: i64,
    /// Revision of the most recent write to the key.
    pub mod_revision: i64,
}

/// A change observed by a prefix watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A key was created or overwritten.
    Put(KvEntry),
    /// A key was deleted.
    Delete {
        /// Deleted key.
        key: String,
        /// Revision of the delete.
        revision: i64,
    },
}

impl WatchEvent {
    /// Returns the key this event refers to.
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put(entry) => &entry.key,
            WatchEvent::Delete { key, .. } => key,
        }
    }

    /// Returns the revision at which this change happened.
    pub fn revision(&self) -> i64 {
        match self {
            WatchEvent::Put(entry) => entry.mod_revision,
            WatchEvent::Delete { revision, .. } => *revision,
        }
    }
}

/// Receiving end of a prefix watch. Closed when the store drops the watch.
pub type WatchReceiver = UnboundedReceiver<WatchEvent>;

/// An ordered, revision-stamped key-value store.
///
/// # Invariants
///
/// - Every successful `save` or `remove` of an existing key gets a revision
///   strictly greater than any earlier write
/// - `load_with_revision` returns entries ordered by ascending `mod_revision`
/// - `remove` of an absent key succeeds and produces no watch event
/// - A watch started at revision `r` delivers every change after `r` exactly
///   once and in revision order
/// - Implementations must be `Send + Sync`; every call may run concurrently
///   with calls from other observers
pub trait KvStore: Send + Sync {
    /// Loads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KvError::NotFound`] if the key does not exist.
    fn load(&self, key: &str) -> KvResult<Vec<u8>>;

    /// Loads every entry under `prefix`, ordered by write revision.
    ///
    /// Also returns the store revision the snapshot was taken at, suitable
    /// as the starting point of a [`KvStore::watch`].
    fn load_with_revision(&self, prefix: &str) -> KvResult<(Vec<KvEntry>, i64)>;

    /// Stores `value` at `key`, returning the revision of the write.
    fn save(&self, key: &str, value: &[u8]) -> KvResult<i64>;

    /// Deletes `key`. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> KvResult<()>;

    /// Watches every change under `prefix` made after `from_revision`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KvError::Compacted`] if the store no longer holds the
    /// history needed to resume from `from_revision`.
    fn watch(&self, prefix: &str, from_revision: i64) -> KvResult<WatchReceiver>;
}

impl<K: KvStore + ?Sized> KvStore for std::sync::Arc<K> {
    fn load(&self, key: &str) -> KvResult<Vec<u8>> {
        (**self).load(key)
    }

    fn load_with_revision(&self, prefix: &str) -> KvResult<(Vec<KvEntry>, i64)> {
        (**self).load_with_revision(prefix)
    }

    fn save(&self, key: &str, value: &[u8]) -> KvResult<i64> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        (**self).remove(key)
    }

    fn watch(&self, prefix: &str, from_revision: i64) -> KvResult<WatchReceiver> {
        (**self).watch(prefix, from_revision)
    }
}
