//! Integration tests for the lock maintenance loop.
//!
//! This test validates:
//! - A tick renews this worker's locks and sweeps expired ones
//! - Store failures surface as TickFailed events without stopping the loop
//! - Shutdown emits Stopped and ends the task

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::timeout;

use mohe_db::InMemoryLockStore;
use mohe_jobs::{
    DistributedLockCoordinator, JobLock, LockConfig, LockMaintenance, LockStatus,
    MaintenanceEvent, WorkerIdentity,
};

const JOB: &str = "topk-refresh";

fn coordinator(store: &InMemoryLockStore) -> DistributedLockCoordinator {
    DistributedLockCoordinator::new(
        Arc::new(store.clone()),
        WorkerIdentity::new("test-host", "0000abcd"),
        LockConfig::default()
            .with_ttl(Duration::from_secs(5))
            .with_heartbeat_interval(Duration::from_millis(20)),
    )
}

async fn next_event(events: &mut broadcast::Receiver<MaintenanceEvent>) -> MaintenanceEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

#[tokio::test]
async fn test_tick_renews_and_sweeps() {
    let store = InMemoryLockStore::new();
    let coordinator = coordinator(&store);

    assert!(coordinator
        .try_acquire_lock(JOB, "place_1-100", Duration::from_secs(1))
        .await
        .unwrap());
    let mut stale = JobLock::claim(
        JOB,
        "place_101-200",
        "gone-host-00000000",
        "gone-host",
        chrono::Duration::minutes(10),
    );
    stale.expires_at = Utc::now() - chrono::Duration::hours(1);
    store.insert(stale).await;

    let maintenance = LockMaintenance::new(coordinator.clone(), vec![JOB.to_string()]);
    maintenance.tick().await;

    let own = coordinator.get_lock(JOB, "place_1-100").await.unwrap().unwrap();
    assert_eq!(own.status, LockStatus::Locked);
    assert!(own.expires_at > Utc::now() + chrono::Duration::seconds(3));

    let swept = coordinator
        .get_lock(JOB, "place_101-200")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swept.status, LockStatus::Failed);
    assert_eq!(swept.retry_count, 0);
}

#[tokio::test]
async fn test_loop_emits_events_and_stops() {
    let store = InMemoryLockStore::new();
    let coordinator = coordinator(&store);
    assert!(coordinator
        .try_acquire_lock_default(JOB, "place_1-100")
        .await
        .unwrap());

    let handle = LockMaintenance::new(coordinator, vec![JOB.to_string()]).start();
    let mut events = handle.events();

    assert_eq!(
        next_event(&mut events).await,
        MaintenanceEvent::Renewed {
            job_name: JOB.to_string(),
            count: 1
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MaintenanceEvent::ExpiredSwept {
            job_name: JOB.to_string(),
            count: 0
        }
    );

    handle.shutdown().await.unwrap();
    loop {
        if next_event(&mut events).await == MaintenanceEvent::Stopped {
            break;
        }
    }
}

#[tokio::test]
async fn test_store_failure_reported_and_loop_continues() {
    let store = InMemoryLockStore::new();
    store.set_unavailable(true);

    let handle = LockMaintenance::new(coordinator(&store), vec![JOB.to_string()]).start();
    let mut events = handle.events();

    match next_event(&mut events).await {
        MaintenanceEvent::TickFailed { job_name, .. } => assert_eq!(job_name, JOB),
        other => panic!("expected TickFailed, got {:?}", other),
    }

    store.set_unavailable(false);
    loop {
        if let MaintenanceEvent::Renewed { .. } = next_event(&mut events).await {
            break;
        }
    }
    handle.shutdown().await.unwrap();
}
