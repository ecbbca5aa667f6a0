//! Fault injection for the event store and the serving target.

use handoff_kv::{KvEntry, KvError, KvResult, KvStore, WatchReceiver};
use handoff_meta::SegmentTarget;
use handoff_observer::{ObserverError, ObserverResult, TargetMutator};
use handoff_protocol::SegmentId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Consumes one pending fault. Returns true if the call must fail.
fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected() -> KvError {
    KvError::Unavailable("injected fault".into())
}

/// A store that fails the next N calls of selected operations.
pub struct FlakyKv<K> {
    inner: K,
    fail_loads: AtomicUsize,
    fail_removes: AtomicUsize,
    fail_watches: AtomicUsize,
    removes: AtomicUsize,
}

impl<K: KvStore> FlakyKv<K> {
    /// Wraps a store. No faults are armed.
    pub fn new(inner: K) -> Self {
        Self {
            inner,
            fail_loads: AtomicUsize::new(0),
            fail_removes: AtomicUsize::new(0),
            fail_watches: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    /// Fails the next `n` loads (single key and prefix).
    pub fn fail_next_loads(&self, n: usize) {
        self.fail_loads.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` removes.
    pub fn fail_next_removes(&self, n: usize) {
        self.fail_removes.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` watch requests.
    pub fn fail_next_watches(&self, n: usize) {
        self.fail_watches.store(n, Ordering::SeqCst);
    }

    /// Returns the number of remove calls seen, failed ones included.
    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &K {
        &self.inner
    }
}

impl<K: KvStore> KvStore for FlakyKv<K> {
    fn load(&self, key: &str) -> KvResult<Vec<u8>> {
        if take_fault(&self.fail_loads) {
            return Err(injected());
        }
        self.inner.load(key)
    }

    fn load_with_revision(&self, prefix: &str) -> KvResult<(Vec<KvEntry>, i64)> {
        if take_fault(&self.fail_loads) {
            return Err(injected());
        }
        self.inner.load_with_revision(prefix)
    }

    fn save(&self, key: &str, value: &[u8]) -> KvResult<i64> {
        self.inner.save(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.fail_removes) {
            return Err(injected());
        }
        self.inner.remove(key)
    }

    fn watch(&self, prefix: &str, from_revision: i64) -> KvResult<WatchReceiver> {
        if take_fault(&self.fail_watches) {
            return Err(injected());
        }
        self.inner.watch(prefix, from_revision)
    }
}

/// A target that fails the next N mutations.
pub struct FlakyTarget<T> {
    inner: T,
    fail_adds: AtomicUsize,
    fail_removes: AtomicUsize,
}

impl<T: TargetMutator> FlakyTarget<T> {
    /// Wraps a target. No faults are armed.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            fail_adds: AtomicUsize::new(0),
            fail_removes: AtomicUsize::new(0),
        }
    }

    /// Fails the next `n` adds.
    pub fn fail_next_adds(&self, n: usize) {
        self.fail_adds.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` removes.
    pub fn fail_next_removes(&self, n: usize) {
        self.fail_removes.store(n, Ordering::SeqCst);
    }

    /// Returns the wrapped target.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: TargetMutator> TargetMutator for FlakyTarget<T> {
    fn add_segment(&self, segment: SegmentTarget) -> ObserverResult<()> {
        if take_fault(&self.fail_adds) {
            return Err(ObserverError::Target(format!(
                "injected fault adding segment {}",
                segment.segment_id
            )));
        }
        self.inner.add_segment(segment)
    }

    fn remove_segment(&self, segment_id: SegmentId) -> ObserverResult<()> {
        if take_fault(&self.fail_removes) {
            return Err(ObserverError::Target(format!(
                "injected fault removing segment {segment_id}"
            )));
        }
        self.inner.remove_segment(segment_id)
    }

    fn contains_segment(&self, segment_id: SegmentId) -> bool {
        self.inner.contains_segment(segment_id)
    }
}
