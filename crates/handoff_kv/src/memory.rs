//! In-memory gateway for tests and single-process deployments.

use crate::error::{KvError, KvResult};
use crate::store::{KvEntry, KvStore, WatchEvent, WatchReceiver};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc::{self, UnboundedSender};

/// Default number of changes retained for resuming watches.
const DEFAULT_MAX_HISTORY: usize = 10_000;

struct Watcher {
    prefix: String,
    tx: UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, KvEntry>,
    revision: i64,
    history: VecDeque<WatchEvent>,
    compacted_through: i64,
    watchers: Vec<Watcher>,
    closed: bool,
}

impl Inner {
    fn publish(&mut self, event: WatchEvent, max_history: usize) {
        self.watchers.retain(|watcher| {
            if !event.key().starts_with(&watcher.prefix) {
                return true;
            }
            // A closed receiver means the watcher went away.
            watcher.tx.send(event.clone()).is_ok()
        });

        self.history.push_back(event);
        while self.history.len() > max_history {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted_through = dropped.revision();
            }
        }
    }
}

/// An in-memory, revision-stamped key-value store.
///
/// All state sits behind one lock, so a `load_with_revision` followed by a
/// `watch` from the returned revision never misses or repeats a change.
///
/// # Example
///
/// ```rust
/// use handoff_kv::{KvStore, MemoryKv};
///
/// let kv = MemoryKv::new();
/// let rev = kv.save("h/1/1/1", b"event").unwrap();
/// assert_eq!(kv.load("h/1/1/1").unwrap(), b"event");
/// assert_eq!(kv.revision(), rev);
///
/// kv.remove("h/1/1/1").unwrap();
/// assert!(kv.load("h/1/1/1").unwrap_err().is_not_found());
/// ```
pub struct MemoryKv {
    inner: Mutex<Inner>,
    max_history: usize,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    /// Creates an empty store retaining at most `max_history` changes for
    /// watch replay.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_history,
        }
    }

    /// Returns the current store revision.
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Returns true if `key` exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Returns the number of live watches.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    /// Drops every live watch without closing the store.
    ///
    /// Watchers observe a closed channel and must re-subscribe.
    pub fn drop_watches(&self) {
        self.inner.lock().watchers.clear();
    }

    /// Closes the store. Later calls fail with [`KvError::Closed`].
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.watchers.clear();
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKv {
    fn load(&self, key: &str) -> KvResult<Vec<u8>> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(KvError::Closed);
        }
        inner
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| KvError::not_found(key))
    }

    fn load_with_revision(&self, prefix: &str) -> KvResult<(Vec<KvEntry>, i64)> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(KvError::Closed);
        }
        let mut entries: Vec<KvEntry> = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry.clone())
            .collect();
        entries.sort_by_key(|entry| entry.mod_revision);
        Ok((entries, inner.revision))
    }

    fn save(&self, key: &str, value: &[u8]) -> KvResult<i64> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(KvError::Closed);
        }
        inner.revision += 1;
        let revision = inner.revision;
        let create_revision = inner
            .entries
            .get(key)
            .map_or(revision, |existing| existing.create_revision);

        let entry = KvEntry {
            key: key.to_string(),
            value: value.to_vec(),
            create_revision,
            mod_revision: revision,
        };
        inner.entries.insert(key.to_string(), entry.clone());
        inner.publish(WatchEvent::Put(entry), self.max_history);
        Ok(revision)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(KvError::Closed);
        }
        if inner.entries.remove(key).is_none() {
            return Ok(());
        }
        inner.revision += 1;
        let revision = inner.revision;
        inner.publish(
            WatchEvent::Delete {
                key: key.to_string(),
                revision,
            },
            self.max_history,
        );
        Ok(())
    }

    fn watch(&self, prefix: &str, from_revision: i64) -> KvResult<WatchReceiver> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(KvError::Closed);
        }
        if from_revision < inner.compacted_through {
            return Err(KvError::Compacted {
                requested: from_revision,
                oldest: inner.compacted_through + 1,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in inner.history.iter() {
            if event.revision() > from_revision && event.key().starts_with(prefix) {
                // The receiver is still in scope, so this cannot fail.
                let _ = tx.send(event.clone());
            }
        }
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        tracing::debug!(prefix, from_revision, "watch registered");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let kv = MemoryKv::new();
        assert!(kv.is_empty());
        assert_eq!(kv.revision(), 0);
    }

    #[test]
    fn save_bumps_revision() {
        let kv = MemoryKv::new();
        assert_eq!(kv.save("a", b"1").unwrap(), 1);
        assert_eq!(kv.save("b", b"2").unwrap(), 2);
        assert_eq!(kv.save("a", b"3").unwrap(), 3);
        assert_eq!(kv.load("a").unwrap(), b"3");
        assert_eq!(kv.len(), 2);
    }

    #[test]
    fn overwrite_keeps_create_revision() {
        let kv = MemoryKv::new();
        kv.save("a", b"1").unwrap();
        kv.save("b", b"2").unwrap();
        kv.save("a", b"3").unwrap();

        let (entries, rev) = kv.load_with_revision("").unwrap();
        assert_eq!(rev, 3);
        assert_eq!(entries[0].key, "b");
        assert_eq!(entries[1].key, "a");
        assert_eq!(entries[1].create_revision, 1);
        assert_eq!(entries[1].mod_revision, 3);
    }

    #[test]
    fn load_with_revision_orders_by_write_not_key() {
        let kv = MemoryKv::new();
        kv.save("h/100/10/3", b"x").unwrap();
        kv.save("h/100/10/9", b"x").unwrap();
        kv.save("h/100/10/10", b"x").unwrap();
        kv.save("other/1", b"x").unwrap();

        let (entries, _) = kv.load_with_revision("h/").unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["h/100/10/3", "h/100/10/9", "h/100/10/10"]);
    }

    #[test]
    fn remove_absent_key_is_ok() {
        let kv = MemoryKv::new();
        kv.remove("missing").unwrap();
        assert_eq!(kv.revision(), 0);
    }

    #[test]
    fn load_missing_is_not_found() {
        let kv = MemoryKv::new();
        assert!(matches!(kv.load("x"), Err(KvError::NotFound { .. })));
    }

    #[test]
    fn closed_store_rejects_calls() {
        let kv = MemoryKv::new();
        kv.close();
        assert_eq!(kv.save("a", b"1"), Err(KvError::Closed));
        assert_eq!(kv.load("a"), Err(KvError::Closed));
        assert!(kv.watch("", 0).is_err());
    }

    #[test]
    fn watch_receives_changes_under_prefix() {
        let kv = MemoryKv::new();
        let mut rx = kv.watch("h/", kv.revision()).unwrap();

        kv.save("h/1", b"a").unwrap();
        kv.save("x/1", b"b").unwrap();
        kv.remove("h/1").unwrap();

        match rx.try_recv().unwrap() {
            WatchEvent::Put(entry) => assert_eq!(entry.key, "h/1"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            WatchEvent::Delete {
                key: "h/1".into(),
                revision: 3
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watch_replays_history_after_revision() {
        let kv = MemoryKv::new();
        kv.save("h/1", b"a").unwrap();
        let (_, rev) = kv.load_with_revision("h/").unwrap();
        kv.save("h/2", b"b").unwrap();

        let mut rx = kv.watch("h/", rev).unwrap();
        assert_eq!(rx.try_recv().unwrap().key(), "h/2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watch_from_compacted_revision_fails() {
        let kv = MemoryKv::with_max_history(2);
        for i in 0..5 {
            kv.save(&format!("h/{i}"), b"v").unwrap();
        }
        assert!(matches!(
            kv.watch("h/", 1),
            Err(KvError::Compacted { requested: 1, .. })
        ));
        assert!(kv.watch("h/", 3).is_ok());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let kv = MemoryKv::new();
        let rx = kv.watch("h/", 0).unwrap();
        assert_eq!(kv.watcher_count(), 1);
        drop(rx);
        kv.save("h/1", b"a").unwrap();
        assert_eq!(kv.watcher_count(), 0);
    }

    #[test]
    fn drop_watches_closes_receivers() {
        let kv = MemoryKv::new();
        let mut rx = kv.watch("h/", 0).unwrap();
        kv.drop_watches();
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
