//! The handoff observer: registry, processing loop and lifecycle.

use crate::config::ObserverConfig;
use crate::error::{ObserverError, ObserverResult};
use crate::lineage::{Lineage, LineageError};
use crate::readiness::ReadinessOracle;
use crate::registry::{PendingEvent, Registry};
use crate::target::TargetMutator;
use handoff_kv::{KvEntry, KvStore, WatchEvent, WatchReceiver};
use handoff_meta::{LeaderViewManager, Meta, SegmentTarget};
use handoff_protocol::{
    collection_prefix, CollectionId, HandoffEvent, HandoffKey, IndexId, ProtocolError,
    ProtocolResult, SegmentId, SegmentState,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Handoff state of a tracked collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Tracked, but its events are held until handoff starts.
    Registered,
    /// Events are being resolved.
    Started,
}

/// Why an event was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Automatic handoff is turned off.
    AutoHandoffDisabled,
    /// The owning partition is not served.
    PartitionNotLoaded,
    /// The segment was announced in a state that cannot be served.
    NotSealed(SegmentState),
    /// The segment lacks indexes the collection requires.
    MissingIndex(BTreeSet<IndexId>),
    /// The segment descends from itself.
    CyclicLineage,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AutoHandoffDisabled => write!(f, "auto handoff disabled"),
            RejectReason::PartitionNotLoaded => write!(f, "partition not loaded"),
            RejectReason::NotSealed(state) => write!(f, "segment is {state:?}, not sealed"),
            RejectReason::MissingIndex(missing) => write!(f, "missing indexes {missing:?}"),
            RejectReason::CyclicLineage => write!(f, "cyclic compaction lineage"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum HoldReason {
    CollectionNotStarted,
    CollectionNotRegistered,
    NotLoaded,
    LineageTooDeep,
}

impl HoldReason {
    fn as_str(self) -> &'static str {
        match self {
            HoldReason::CollectionNotStarted => "collection not started",
            HoldReason::CollectionNotRegistered => "collection not registered",
            HoldReason::NotLoaded => "segment not loaded",
            HoldReason::LineageTooDeep => "lineage too deep",
        }
    }
}

enum Decision {
    Accept(BTreeSet<SegmentId>),
    Reject(RejectReason),
    Hold(HoldReason),
}

/// Counters accumulated over the observer's lifetime.
#[derive(Debug, Clone, Default)]
pub struct HandoffStats {
    /// Processing ticks run.
    pub ticks: u64,
    /// Events accepted into the target.
    pub accepted: u64,
    /// Events rejected and deleted.
    pub rejected: u64,
    /// Ancestor events deleted together with their descendant.
    pub retired_ancestors: u64,
    /// Keys whose value could not be decoded.
    pub malformed: u64,
    /// Failed event store calls.
    pub store_failures: u64,
    /// Failed target mutations.
    pub target_failures: u64,
    /// When the last tick finished.
    pub last_tick: Option<Instant>,
    /// How long the last tick took.
    pub last_tick_duration: Duration,
}

/// Outcome of one processing tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Segments accepted, in processing order.
    pub accepted: Vec<SegmentId>,
    /// Segments rejected, with the reason.
    pub rejected: Vec<(SegmentId, RejectReason)>,
    /// Ancestor events deleted along with an accepted descendant.
    pub retired: Vec<SegmentId>,
    /// Events left pending.
    pub held: usize,
    /// Failed event store calls.
    pub store_failures: usize,
    /// Failed target mutations.
    pub target_failures: usize,
}

impl TickReport {
    /// Returns true if the tick settled nothing.
    pub fn is_idle(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty() && self.retired.is_empty()
    }
}

struct Core<K, T> {
    config: ObserverConfig,
    kv: K,
    target: T,
    oracle: ReadinessOracle,
    registry: RwLock<Registry>,
    collections: RwLock<HashMap<CollectionId, CollectionStatus>>,
    stats: RwLock<HandoffStats>,
    // Serializes ticks with reloads and watch intake.
    tick_lock: Mutex<()>,
    reload_pending: AtomicBool,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Resolves persisted handoff events into serving target changes.
///
/// Events are read from the store into an in-memory registry, either by
/// the ordered reload done on [`start`](Self::start) and
/// [`start_handoff`](Self::start_handoff) or by the store watch. Every
/// tick each pending event is accepted, rejected or left pending. Settling
/// an event always ends with deleting its key; the delete only happens
/// after the target mutation it commits has succeeded.
///
/// # Example
///
/// ```rust
/// use handoff_kv::{KvStore, MemoryKv};
/// use handoff_meta::{Collection, LeaderView, LeaderViewManager, Meta, TargetManager};
/// use handoff_observer::{HandoffObserver, ObserverConfig};
/// use handoff_protocol::HandoffEvent;
/// use std::sync::Arc;
///
/// let kv = Arc::new(MemoryKv::new());
/// let meta = Arc::new(Meta::new());
/// let dist = Arc::new(LeaderViewManager::new());
/// let target = Arc::new(TargetManager::new());
/// meta.put_collection(Collection::loaded(100));
///
/// let observer = HandoffObserver::new(
///     ObserverConfig::default(),
///     kv.clone(),
///     meta,
///     dist.clone(),
///     target.clone(),
/// );
///
/// let event = HandoffEvent::flushed(100, 10, 3);
/// kv.save(&event.key("querycoord-handoff"), &event.encode().unwrap()).unwrap();
///
/// observer.register(100);
/// observer.start_handoff(100).unwrap();
/// assert!(observer.contains_event(3));
///
/// // Held until a leader serves the segment.
/// observer.tick();
/// assert!(!target.contains_segment(3));
///
/// dist.update(1, [LeaderView::new(1, 100, "100-dmc0").with_segment(3, 1)]);
/// observer.tick();
/// assert!(target.contains_segment(3));
/// assert!(!observer.contains_event(3));
/// ```
pub struct HandoffObserver<K: KvStore + 'static, T: TargetMutator + 'static> {
    core: Arc<Core<K, T>>,
    task: Mutex<Option<LoopHandle>>,
}

impl<K: KvStore + 'static, T: TargetMutator + 'static> HandoffObserver<K, T> {
    /// Creates an observer. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: ObserverConfig,
        kv: K,
        meta: Arc<Meta>,
        dist: Arc<LeaderViewManager>,
        target: T,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                config,
                kv,
                target,
                oracle: ReadinessOracle::new(meta, dist),
                registry: RwLock::new(Registry::default()),
                collections: RwLock::new(HashMap::new()),
                stats: RwLock::new(HandoffStats::default()),
                tick_lock: Mutex::new(()),
                reload_pending: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ObserverConfig {
        &self.core.config
    }

    /// Returns the readiness oracle.
    pub fn oracle(&self) -> &ReadinessOracle {
        &self.core.oracle
    }

    /// Tracks a collection whose events must be held for now.
    ///
    /// Registering a collection whose handoff already started keeps it
    /// started.
    pub fn register(&self, collection_id: CollectionId) {
        self.core
            .collections
            .write()
            .entry(collection_id)
            .or_insert(CollectionStatus::Registered);
        debug!(collection_id, "handoff registered");
    }

    /// Starts resolving a collection's events and loads the ones already
    /// persisted, in write order. Returns the number of keys loaded.
    ///
    /// Reads are retried per the configured [`RetryConfig`](crate::RetryConfig).
    /// If they still fail, the collection stays started and a full reload
    /// is scheduled for the next tick.
    pub fn start_handoff(&self, collection_id: CollectionId) -> ObserverResult<usize> {
        self.core
            .collections
            .write()
            .insert(collection_id, CollectionStatus::Started);

        let prefix = collection_prefix(&self.core.config.handoff_prefix, collection_id);
        let retry = &self.core.config.retry;
        let mut attempt = 0;
        loop {
            let result = {
                let _tick = self.core.tick_lock.lock();
                self.core.reload(&prefix)
            };
            match result {
                Ok((loaded, _)) => {
                    info!(collection_id, events = loaded, "handoff started");
                    return Ok(loaded);
                }
                Err(err) => {
                    self.core.store_failed();
                    attempt += 1;
                    if !err.is_retryable() || attempt >= retry.max_attempts {
                        warn!(
                            collection_id,
                            attempts = attempt,
                            error = %err,
                            "failed to load handoff events, deferring to the processing loop"
                        );
                        self.core.reload_pending.store(true, Ordering::SeqCst);
                        return Err(err);
                    }
                    std::thread::sleep(retry.delay_for_attempt(attempt));
                }
            }
        }
    }

    /// Stops tracking a collection and forgets its pending events.
    ///
    /// Persisted keys are left alone; events that arrive afterwards are
    /// rejected once the collection's partitions are no longer loaded.
    pub fn unregister(&self, collection_id: CollectionId) {
        self.core.collections.write().remove(&collection_id);
        let dropped = {
            let _tick = self.core.tick_lock.lock();
            self.core.registry.write().remove_collection(collection_id)
        };
        info!(collection_id, dropped, "handoff unregistered");
    }

    /// Returns the handoff state of a collection.
    pub fn collection_status(&self, collection_id: CollectionId) -> Option<CollectionStatus> {
        self.core.collection_status(collection_id)
    }

    /// Launches the processing loop on the current tokio runtime.
    ///
    /// Every persisted event is reloaded first, in write order, and the
    /// store watch is opened from the reload's revision. If the store is
    /// temporarily unavailable the loop starts anyway and keeps retrying
    /// both on its ticks.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::AlreadyRunning`] if the loop is running,
    /// [`ObserverError::Runtime`] outside a tokio runtime, or a
    /// non-retryable store error.
    pub fn start(&self) -> ObserverResult<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.join.is_finished()) {
            return Err(ObserverError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ObserverError::Runtime(e.to_string()))?;

        let changes = match self.core.open_watch() {
            Ok(changes) => Some(changes),
            Err(err) => {
                self.core.store_failed();
                if !err.is_retryable() {
                    return Err(err);
                }
                warn!(error = %err, "failed to open handoff watch, retrying in the loop");
                self.core.reload_pending.store(true, Ordering::SeqCst);
                None
            }
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let join = runtime.spawn(core.run(changes, shutdown_rx));
        *task = Some(LoopHandle { shutdown, join });

        info!(
            interval_ms = self.core.config.check_interval.as_millis() as u64,
            pending = self.core.registry.read().len(),
            "handoff observer started"
        );
        Ok(())
    }

    /// Stops the processing loop. A tick in progress completes; no new one
    /// starts. Calling this when stopped does nothing.
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.shutdown.send(true);
        if let Err(err) = handle.join.await {
            warn!(error = %err, "handoff loop ended abnormally");
        }
        info!("handoff observer stopped");
    }

    /// Returns true if the processing loop is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.join.is_finished())
    }

    /// Reloads every persisted event in write order. Returns the number of
    /// keys loaded.
    ///
    /// The running loop does this on its own; this is for callers that
    /// drive [`tick`](Self::tick) by hand.
    pub fn reload(&self) -> ObserverResult<usize> {
        let _tick = self.core.tick_lock.lock();
        let (loaded, _) = self
            .core
            .reload(&self.core.root_prefix())
            .inspect_err(|_| self.core.store_failed())?;
        self.core.reload_pending.store(false, Ordering::SeqCst);
        Ok(loaded)
    }

    /// Runs one processing pass immediately.
    ///
    /// Passes never overlap; a call made while the loop is mid-tick waits
    /// for it.
    pub fn tick(&self) -> TickReport {
        self.core.tick()
    }

    /// Returns the IDs of pending segments, ascending.
    pub fn pending_segments(&self) -> Vec<SegmentId> {
        self.core.registry.read().segment_ids()
    }

    /// Returns the pending events ordered by store revision.
    pub fn pending_events(&self) -> Vec<PendingEvent> {
        self.core.registry.read().snapshot()
    }

    /// Returns true if an event for the segment is pending.
    pub fn contains_event(&self, segment_id: SegmentId) -> bool {
        self.core.registry.read().contains(segment_id)
    }

    /// Returns the number of pending events.
    pub fn pending_count(&self) -> usize {
        self.core.registry.read().len()
    }

    /// Returns the accumulated counters.
    pub fn stats(&self) -> HandoffStats {
        self.core.stats.read().clone()
    }
}

impl<K: KvStore + 'static, T: TargetMutator + 'static> Drop for HandoffObserver<K, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            let _ = handle.shutdown.send(true);
        }
    }
}

impl<K: KvStore + 'static, T: TargetMutator + 'static> Core<K, T> {
    async fn run(
        self: Arc<Self>,
        mut changes: Option<WatchReceiver>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                change = next_change(&mut changes) => match change {
                    Some(change) => self.apply_change(change),
                    None => {
                        warn!("handoff watch closed, reopening on next tick");
                        changes = None;
                    }
                },
                _ = interval.tick() => {
                    if changes.is_none() {
                        match self.open_watch() {
                            Ok(rx) => changes = Some(rx),
                            Err(err) => {
                                self.store_failed();
                                warn!(error = %err, "failed to reopen handoff watch");
                            }
                        }
                    }
                    self.tick();
                }
            }
        }
        debug!("handoff loop exited");
    }

    fn collection_status(&self, collection_id: CollectionId) -> Option<CollectionStatus> {
        self.collections.read().get(&collection_id).copied()
    }

    fn root_prefix(&self) -> String {
        format!("{}/", self.config.handoff_prefix)
    }

    fn store_failed(&self) {
        self.stats.write().store_failures += 1;
    }

    /// Reloads the full prefix and opens a watch right after it.
    ///
    /// Failures are left for the caller to count.
    fn open_watch(&self) -> ObserverResult<WatchReceiver> {
        let _tick = self.tick_lock.lock();
        let prefix = self.root_prefix();
        let (_, revision) = self.reload(&prefix)?;
        let changes = self.kv.watch(&prefix, revision)?;
        self.reload_pending.store(false, Ordering::SeqCst);
        Ok(changes)
    }

    /// Replaces what the registry knows under `prefix` with the store's
    /// contents. Returns the number of keys loaded and the store revision.
    ///
    /// Callers hold `tick_lock` and count failures.
    fn reload(&self, prefix: &str) -> ObserverResult<(usize, i64)> {
        let (entries, revision) = self.kv.load_with_revision(prefix)?;

        let live: HashSet<&str> = entries.iter().map(|entry| entry.key.as_str()).collect();
        let mut registry = self.registry.write();
        let dropped = registry.retain_live(prefix, |key| live.contains(key));
        for entry in &entries {
            self.ingest(&mut registry, entry);
        }
        debug!(prefix, loaded = entries.len(), dropped, revision, "handoff events reloaded");
        Ok((entries.len(), revision))
    }

    fn apply_change(&self, change: WatchEvent) {
        let _tick = self.tick_lock.lock();
        let mut registry = self.registry.write();
        match change {
            WatchEvent::Put(entry) => self.ingest(&mut registry, &entry),
            WatchEvent::Delete { key, revision } => {
                if let Some(dropped) = registry.remove_key(&key) {
                    debug!(
                        segment_id = dropped.event.segment_id,
                        revision,
                        "handoff event deleted externally"
                    );
                }
            }
        }
    }

    fn ingest(&self, registry: &mut Registry, entry: &KvEntry) {
        match self.decode_entry(entry) {
            Ok(pending) => {
                let segment_id = pending.event.segment_id;
                if registry.upsert(pending) {
                    trace!(segment_id, revision = entry.mod_revision, "handoff event observed");
                }
            }
            Err(err) => {
                registry.remove_key(&entry.key);
                if registry.mark_malformed(entry.key.clone(), entry.mod_revision) {
                    warn!(key = %entry.key, error = %err, "malformed handoff event");
                    self.stats.write().malformed += 1;
                }
            }
        }
    }

    fn decode_entry(&self, entry: &KvEntry) -> ProtocolResult<PendingEvent> {
        let key = HandoffKey::parse(&self.config.handoff_prefix, &entry.key)?;
        let event = HandoffEvent::decode(&entry.value)?;
        let identity = (event.collection_id, event.partition_id, event.segment_id);
        if (key.collection_id, key.partition_id, key.segment_id) != identity {
            return Err(ProtocolError::invalid_key(
                &entry.key,
                format!("key does not match event for segment {}", event.segment_id),
            ));
        }
        Ok(PendingEvent {
            key: entry.key.clone(),
            revision: entry.mod_revision,
            event,
        })
    }

    fn tick(&self) -> TickReport {
        let _tick = self.tick_lock.lock();
        let started = Instant::now();
        let mut report = TickReport::default();

        if self.reload_pending.swap(false, Ordering::SeqCst) {
            if let Err(err) = self.reload(&self.root_prefix()) {
                warn!(error = %err, "handoff reload failed, retrying next tick");
                self.reload_pending.store(true, Ordering::SeqCst);
                report.store_failures += 1;
            }
        }
        self.delete_malformed(&mut report);

        let snapshot = self.registry.read().snapshot();
        let lineage = Lineage::build(
            snapshot.iter().map(|pending| &pending.event),
            self.config.max_lineage_depth,
        );
        let mut settled: HashSet<SegmentId> = HashSet::new();

        for pending in &snapshot {
            let segment_id = pending.event.segment_id;
            if settled.contains(&segment_id) {
                continue;
            }
            let decision = match lineage.terminal_descendant(segment_id) {
                Ok(terminal) if terminal != segment_id => {
                    trace!(segment_id, terminal, "handoff superseded by pending descendant");
                    continue;
                }
                Ok(_) => self.evaluate(pending, &lineage),
                Err(LineageError::Cycle { .. }) => Decision::Reject(RejectReason::CyclicLineage),
                Err(LineageError::DepthExceeded { .. }) => {
                    Decision::Hold(HoldReason::LineageTooDeep)
                }
            };

            match decision {
                Decision::Accept(ancestors) => {
                    self.accept(pending, &ancestors, &mut settled, &mut report);
                }
                Decision::Reject(reason) => {
                    if self.delete_event(pending, &mut report) {
                        settled.insert(segment_id);
                        info!(
                            segment_id,
                            collection_id = pending.event.collection_id,
                            partition_id = pending.event.partition_id,
                            %reason,
                            "handoff rejected"
                        );
                        report.rejected.push((segment_id, reason));
                    }
                }
                Decision::Hold(HoldReason::LineageTooDeep) => {
                    if self.registry.write().mark_too_deep(segment_id) {
                        warn!(
                            segment_id,
                            max_depth = self.config.max_lineage_depth,
                            "handoff held, lineage too deep"
                        );
                    }
                }
                Decision::Hold(reason) => {
                    trace!(segment_id, reason = reason.as_str(), "handoff held");
                }
            }
        }
        report.held = snapshot
            .iter()
            .filter(|pending| !settled.contains(&pending.event.segment_id))
            .count();

        let mut stats = self.stats.write();
        stats.ticks += 1;
        stats.accepted += report.accepted.len() as u64;
        stats.rejected += report.rejected.len() as u64;
        stats.retired_ancestors += report.retired.len() as u64;
        stats.store_failures += report.store_failures as u64;
        stats.target_failures += report.target_failures as u64;
        stats.last_tick = Some(Instant::now());
        stats.last_tick_duration = started.elapsed();
        report
    }

    fn evaluate(&self, pending: &PendingEvent, lineage: &Lineage) -> Decision {
        let event = &pending.event;
        if !self.config.auto_handoff {
            return Decision::Reject(RejectReason::AutoHandoffDisabled);
        }

        let partition_loaded = self
            .oracle
            .partition_loaded(event.collection_id, event.partition_id);
        match self.collection_status(event.collection_id) {
            Some(CollectionStatus::Started) => {}
            Some(CollectionStatus::Registered) => {
                return Decision::Hold(HoldReason::CollectionNotStarted)
            }
            None if partition_loaded => return Decision::Hold(HoldReason::CollectionNotRegistered),
            None => return Decision::Reject(RejectReason::PartitionNotLoaded),
        }

        if !event.is_fake {
            if !partition_loaded {
                return Decision::Reject(RejectReason::PartitionNotLoaded);
            }
            if !event.state.is_sealed() {
                return Decision::Reject(RejectReason::NotSealed(event.state));
            }
            let missing = self.oracle.missing_indexes(event);
            if !missing.is_empty() {
                return Decision::Reject(RejectReason::MissingIndex(missing));
            }
            if !self
                .oracle
                .is_loaded(event.collection_id, &event.insert_channel, event.segment_id)
            {
                return Decision::Hold(HoldReason::NotLoaded);
            }
        }

        match lineage.ancestors(event.segment_id) {
            Ok(ancestors) => Decision::Accept(ancestors),
            Err(LineageError::Cycle { .. }) => Decision::Reject(RejectReason::CyclicLineage),
            Err(LineageError::DepthExceeded { .. }) => Decision::Hold(HoldReason::LineageTooDeep),
        }
    }

    fn accept(
        &self,
        pending: &PendingEvent,
        ancestors: &BTreeSet<SegmentId>,
        settled: &mut HashSet<SegmentId>,
        report: &mut TickReport,
    ) {
        let event = &pending.event;
        let segment_id = event.segment_id;

        if !event.is_fake {
            if let Err(err) = self.target.add_segment(SegmentTarget::from(event)) {
                warn!(segment_id, error = %err, "failed to add segment to target");
                report.target_failures += 1;
                return;
            }
        }
        for &ancestor in ancestors {
            if let Err(err) = self.target.remove_segment(ancestor) {
                warn!(segment_id, ancestor, error = %err, "failed to remove ancestor from target");
                report.target_failures += 1;
                return;
            }
        }

        // The descendant's own key goes last: while it exists the whole
        // transition is replayed on restart.
        let retiring: Vec<PendingEvent> = {
            let registry = self.registry.read();
            ancestors
                .iter()
                .filter_map(|&ancestor| registry.get(ancestor).cloned())
                .collect()
        };
        for ancestor in &retiring {
            if !self.delete_event(ancestor, report) {
                return;
            }
            settled.insert(ancestor.event.segment_id);
            report.retired.push(ancestor.event.segment_id);
        }
        if self.delete_event(pending, report) {
            settled.insert(segment_id);
            info!(
                segment_id,
                collection_id = event.collection_id,
                partition_id = event.partition_id,
                ancestors = ?ancestors,
                fake = event.is_fake,
                "handoff accepted"
            );
            report.accepted.push(segment_id);
        }
    }

    /// Deletes an event's key, then drops it from the registry.
    fn delete_event(&self, pending: &PendingEvent, report: &mut TickReport) -> bool {
        match self.kv.remove(&pending.key) {
            Ok(()) => {
                self.registry.write().settle(pending);
                true
            }
            Err(err) => {
                warn!(key = %pending.key, error = %err, "failed to delete handoff event");
                report.store_failures += 1;
                false
            }
        }
    }

    fn delete_malformed(&self, report: &mut TickReport) {
        let keys = self.registry.read().malformed_keys();
        for key in keys {
            match self.kv.remove(&key) {
                Ok(()) => {
                    self.registry.write().clear_malformed(&key);
                    info!(key = %key, "deleted malformed handoff event");
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to delete malformed handoff event");
                    report.store_failures += 1;
                }
            }
        }
    }
}

async fn next_change(changes: &mut Option<WatchReceiver>) -> Option<WatchEvent> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
