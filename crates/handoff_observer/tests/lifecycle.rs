//! Start, stop and registration behavior.

use handoff_observer::{CollectionStatus, ObserverError};
use handoff_testkit::prelude::*;
use std::time::Duration;

#[test]
fn start_outside_runtime_fails() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    assert!(matches!(observer.start(), Err(ObserverError::Runtime(_))));
    assert!(!observer.is_running());
}

#[tokio::test]
async fn start_twice_fails() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();

    observer.start().unwrap();
    assert!(observer.is_running());
    assert!(matches!(observer.start(), Err(ObserverError::AlreadyRunning)));

    observer.stop().await;
    assert!(!observer.is_running());

    // A stopped observer can be started again.
    observer.start().unwrap();
    assert!(observer.is_running());
    observer.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();

    observer.stop().await;
    observer.start().unwrap();
    observer.stop().await;
    observer.stop().await;
    assert!(!observer.is_running());
}

#[tokio::test]
async fn stop_halts_processing() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    observer.register(COLLECTION_ID);
    observer.start_handoff(COLLECTION_ID).unwrap();
    observer.start().unwrap();
    assert!(wait_for(|| observer.stats().ticks >= 2).await);

    observer.stop().await;
    let ticks = observer.stats().ticks;

    cluster.produce(&cluster.sealed_event(3));
    cluster.serve(&[1, 2, 3]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(observer.stats().ticks, ticks);
    assert!(cluster.key_exists(3));
    assert!(!cluster.target.contains_segment(3));
}

#[tokio::test]
async fn dropping_observer_ends_loop() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    observer.start().unwrap();
    assert_eq!(cluster.kv.watcher_count(), 1);

    drop(observer);
    assert!(wait_for(|| cluster.kv.watcher_count() == 0).await);
}

#[tokio::test]
async fn collection_status_transitions() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    assert_eq!(observer.collection_status(COLLECTION_ID), None);

    observer.register(COLLECTION_ID);
    assert_eq!(
        observer.collection_status(COLLECTION_ID),
        Some(CollectionStatus::Registered)
    );

    observer.start_handoff(COLLECTION_ID).unwrap();
    observer.register(COLLECTION_ID);
    assert_eq!(
        observer.collection_status(COLLECTION_ID),
        Some(CollectionStatus::Started)
    );

    observer.unregister(COLLECTION_ID);
    assert_eq!(observer.collection_status(COLLECTION_ID), None);
}

#[tokio::test]
async fn released_collection_events_are_rejected() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    observer.register(COLLECTION_ID);
    observer.start_handoff(COLLECTION_ID).unwrap();
    observer.start().unwrap();

    cluster.produce(&cluster.sealed_event(3));
    assert!(wait_for(|| observer.contains_event(3)).await);

    // Release: forget pending events, keep their keys.
    observer.unregister(COLLECTION_ID);
    assert_eq!(observer.pending_count(), 0);
    assert!(cluster.key_exists(3));

    cluster.meta.remove_collection(COLLECTION_ID);
    cluster.produce(&cluster.sealed_event(4));
    assert!(wait_for(|| !cluster.key_exists(4)).await);
    assert!(!cluster.target.contains_segment(4));

    observer.stop().await;
}

#[tokio::test]
async fn unregistered_loaded_collection_is_held() {
    let cluster = ClusterFixture::new();
    let observer = cluster.observer();
    observer.start().unwrap();

    cluster.produce(&cluster.sealed_event(3));
    cluster.serve(&[1, 2, 3]);
    assert!(wait_for(|| observer.contains_event(3)).await);
    assert!(consistently(Duration::from_millis(50), || cluster.key_exists(3)).await);

    observer.stop().await;
}
