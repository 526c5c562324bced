//! Integration tests for the polling scheduler: overlap guard, adaptive fast
//! polling, failure policies and teardown.

mod common;

use common::{FakeGateway, doc, document_polling, task};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use entity_sync::config::{FailurePolicy, PollConfig};
use entity_sync::error::ErrorCode;
use entity_sync::gateway::{GatewayError, NETWORK_ERROR_MESSAGE};
use entity_sync::store::EntityStore;
use entity_sync::sync::{PollOutcome, SkipReason, SyncScheduler};
use entity_sync::types::{ProcessingStatus, TaskStatus};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_skips_fast_ticks_instead_of_queueing() {
    let gateway = Arc::new(FakeGateway::new(vec![doc("d1", ProcessingStatus::Processing)]));
    gateway.set_fetch_delay(ms(500));
    let store = Arc::new(EntityStore::with_items(vec![doc("d1", ProcessingStatus::Processing)]));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), store, document_polling(100));

    // Fast ticks at 100, 200, 300, 400, 500; the first starts a 500 ms fetch.
    scheduler.ensure_fast_polling();
    assert!(scheduler.is_fast_polling());
    sleep(ms(550)).await;

    assert_eq!(gateway.fetches(), 1);
    assert_eq!(scheduler.polls_issued(), 1);
    assert!(scheduler.ticks_skipped() >= 2);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_first_base_tick_fetches_immediately() {
    let gateway = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    let store = Arc::new(EntityStore::new());
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), PollConfig::tasks());

    scheduler.start();
    sleep(ms(10)).await;
    assert_eq!(gateway.fetches(), 1);
    assert_eq!(store.snapshot().items.len(), 1);

    // Next base tick is five minutes out.
    sleep(Duration::from_secs(299)).await;
    assert_eq!(gateway.fetches(), 1);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.fetches(), 2);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_disabled_polling_never_fetches() {
    let gateway = Arc::new(FakeGateway::new(vec![doc("d1", ProcessingStatus::Indexed)]));
    let config = PollConfig {
        enabled: false,
        ..PollConfig::documents()
    };
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::new(EntityStore::new()), config);
    scheduler.start();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(gateway.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fast_polling_stops_once_nothing_is_transient() {
    let gateway = Arc::new(FakeGateway::new(vec![
        doc("d1", ProcessingStatus::Processing),
        doc("d2", ProcessingStatus::Indexed),
    ]));
    let store = Arc::new(EntityStore::new());
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), document_polling(100));

    scheduler.start();
    sleep(ms(50)).await;
    assert_eq!(gateway.fetches(), 1);
    assert!(scheduler.is_fast_polling());

    gateway.set_server(vec![
        doc("d1", ProcessingStatus::Indexed),
        doc("d2", ProcessingStatus::Indexed),
    ]);
    sleep(ms(200)).await;
    assert_eq!(gateway.fetches(), 2);
    assert!(!store.snapshot().has_transient());
    assert!(!scheduler.is_fast_polling());

    // Only the 30 s base timer remains.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.fetches(), 2);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_fast_polling_restarts_for_new_transient_entities() {
    let gateway = Arc::new(FakeGateway::new(vec![doc("d1", ProcessingStatus::Indexed)]));
    let store = Arc::new(EntityStore::new());
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), document_polling(100));

    assert!(scheduler.poll_once().await.is_refreshed());
    assert!(!scheduler.is_fast_polling());

    gateway.set_server(vec![
        doc("d1", ProcessingStatus::Indexed),
        doc("d2", ProcessingStatus::Processing),
    ]);
    assert!(scheduler.poll_once().await.is_refreshed());
    assert!(scheduler.is_fast_polling());
    scheduler.shutdown();
    assert!(!scheduler.is_fast_polling());
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_policies_differ_per_resource() {
    // Documents clear the mirror on a failed poll.
    let docs = Arc::new(FakeGateway::new(vec![doc("d1", ProcessingStatus::Indexed)]));
    docs.fail_fetches(GatewayError::Network("connection refused".into()));
    let doc_store = Arc::new(EntityStore::with_items(vec![doc("d1", ProcessingStatus::Indexed)]));
    let doc_scheduler = SyncScheduler::new(Arc::clone(&docs), Arc::clone(&doc_store), PollConfig::documents());
    assert_eq!(doc_scheduler.config().on_failure, FailurePolicy::Clear);

    let outcome = doc_scheduler.poll_once().await;
    assert!(matches!(outcome, PollOutcome::Failed(_)));
    assert!(doc_store.snapshot().items.is_empty());
    let err = doc_scheduler.error().expect("error should be recorded");
    assert_eq!(err.code, ErrorCode::NetworkError);
    assert_eq!(err.message, NETWORK_ERROR_MESSAGE);

    // Tasks keep showing the last good data.
    let tasks = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    tasks.fail_fetches(GatewayError::Api {
        status: 500,
        message: "database is down".into(),
    });
    let task_store = Arc::new(EntityStore::with_items(vec![task("t1", "One", TaskStatus::Todo)]));
    let task_scheduler = SyncScheduler::new(Arc::clone(&tasks), Arc::clone(&task_store), PollConfig::tasks());

    let outcome = task_scheduler.poll_once().await;
    assert!(matches!(outcome, PollOutcome::Failed(_)));
    assert_eq!(task_store.snapshot().items.len(), 1);
    let err = task_scheduler.error().expect("error should be recorded");
    assert_eq!(err.code, ErrorCode::ApiError);
    assert_eq!(err.message, "database is down");
    assert_eq!(err.status, Some(500));

    // The two resources disagree on what a failed poll means for the mirror.
    assert_ne!(doc_scheduler.config().on_failure, task_scheduler.config().on_failure);
}

#[tokio::test(start_paused = true)]
async fn test_success_clears_previous_error() {
    let gateway = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    gateway.fail_fetches(GatewayError::Network("timeout".into()));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::new(EntityStore::new()), PollConfig::tasks());

    scheduler.poll_once().await;
    assert!(scheduler.error().is_some());

    *gateway.fail_fetch.lock().unwrap() = None;
    assert!(scheduler.poll_once().await.is_refreshed());
    assert!(scheduler.error().is_none());
    let summary = scheduler.summary().expect("summary after success");
    assert_eq!(summary.total_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_discards_in_flight_result() {
    let gateway = Arc::new(FakeGateway::new(vec![
        doc("d1", ProcessingStatus::Indexed),
        doc("d2", ProcessingStatus::Indexed),
    ]));
    gateway.set_fetch_delay(ms(500));
    let store = Arc::new(EntityStore::with_items(vec![doc("old", ProcessingStatus::Failed)]));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), PollConfig::documents());

    let in_flight = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.poll_once().await })
    };
    sleep(ms(100)).await;
    scheduler.shutdown();

    let outcome = in_flight.await.unwrap();
    assert_eq!(outcome, PollOutcome::Skipped(SkipReason::Stopped));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].id, "old");
    assert_eq!(snapshot.version, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_timers() {
    let gateway = Arc::new(FakeGateway::new(vec![doc("d1", ProcessingStatus::Processing)]));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::new(EntityStore::new()), document_polling(100));

    scheduler.start();
    sleep(ms(250)).await;
    let fetched = gateway.fetches();
    assert!(fetched >= 2);

    scheduler.shutdown();
    assert!(!scheduler.is_live());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.fetches(), fetched);
    assert_eq!(
        scheduler.poll_once().await,
        PollOutcome::Skipped(SkipReason::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_runs_after_delay() {
    let gateway = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    let store = Arc::new(EntityStore::new());
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), PollConfig::tasks());

    scheduler.schedule_refresh(Duration::from_secs(1));
    sleep(ms(900)).await;
    assert_eq!(gateway.fetches(), 0);
    sleep(ms(200)).await;
    assert_eq!(gateway.fetches(), 1);
    assert_eq!(store.snapshot().items.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_subscribers_see_poll_results() {
    let gateway = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    let store = Arc::new(EntityStore::new());
    let mut changes = store.subscribe();
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), PollConfig::tasks());

    scheduler.poll_once().await;
    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow(), store.snapshot().version);
}

#[tokio::test(start_paused = true)]
async fn test_backwards_status_is_reported_but_published() {
    let gateway = Arc::new(FakeGateway::new(vec![
        doc("d1", ProcessingStatus::Processing),
        doc("d2", ProcessingStatus::Indexed),
    ]));
    let store = Arc::new(EntityStore::with_items(vec![
        doc("d1", ProcessingStatus::Indexed),
        doc("d2", ProcessingStatus::Processing),
    ]));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::clone(&store), PollConfig::documents());

    assert!(scheduler.poll_once().await.is_refreshed());

    // d1 went indexed -> processing; d2 moved forward normally.
    assert_eq!(scheduler.regressions_observed(), 1);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.get("d1").unwrap().processing_status, ProcessingStatus::Processing);
    assert_eq!(snapshot.get("d2").unwrap().processing_status, ProcessingStatus::Indexed);

    // The same state again is not a new regression.
    scheduler.poll_once().await;
    assert_eq!(scheduler.regressions_observed(), 1);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_polls_reach_the_gateway_once() {
    let gateway = Arc::new(FakeGateway::new(vec![task("t1", "One", TaskStatus::Todo)]));
    gateway.set_fetch_delay(ms(200));
    let scheduler = SyncScheduler::new(Arc::clone(&gateway), Arc::new(EntityStore::new()), PollConfig::tasks());

    let polls: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.poll_once().await })
        })
        .collect();
    let mut refreshed = 0;
    for poll in polls {
        if poll.await.unwrap().is_refreshed() {
            refreshed += 1;
        }
    }

    assert_eq!(refreshed, 1);
    assert_eq!(gateway.fetches(), 1);
    assert_eq!(scheduler.ticks_skipped(), 7);
}
