//! Integration tests for optimistic mutations: create, status moves,
//! progress updates, deletes and their failure policies.

mod common;

use common::{FakeGateway, doc, ids, mirror, policy, task};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use entity_sync::config::PollConfig;
use entity_sync::error::ErrorCode;
use entity_sync::gateway::{BulkDeleteResponse, GatewayError};
use entity_sync::sync::{PollOutcome, SkipReason};
use entity_sync::types::{NewTask, ProcessingStatus, Task, TaskStatus};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn api_error(message: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        message: message.to_string(),
    }
}

/// Four tasks, mirrored identically on both sides.
fn board() -> Vec<Task> {
    vec![
        task("t1", "Implement auth", TaskStatus::Todo),
        task("t2", "Write docs", TaskStatus::Todo),
        task("t3", "Review auth flow", TaskStatus::InProgress),
        task("t4", "Ship v1", TaskStatus::Completed),
    ]
}

fn task_mirror(
    trust: bool,
) -> (
    Arc<FakeGateway<Task>>,
    Arc<entity_sync::mutations::MutationCoordinator<FakeGateway<Task>>>,
) {
    let gateway = Arc::new(FakeGateway::new(board()));
    let coordinator = mirror(Arc::clone(&gateway), board(), PollConfig::tasks(), policy(trust));
    (gateway, coordinator)
}

#[tokio::test(start_paused = true)]
async fn test_create_is_visible_before_the_server_answers() {
    let (gateway, tasks) = task_mirror(true);
    gateway.set_mutation_delay(ms(500));

    let pending = {
        let tasks = Arc::clone(&tasks);
        tokio::spawn(async move { tasks.create_task(NewTask::titled("Add login page")).await })
    };
    sleep(ms(10)).await;

    let snapshot = tasks.scheduler().store().snapshot();
    assert_eq!(snapshot.items.len(), 5);
    let placeholder = &snapshot.items[0];
    assert_eq!(placeholder.title, "Add login page");
    assert!(placeholder.is_local());

    let report = pending.await.unwrap().expect("create should not error");
    assert!(report.confirmed());
    assert_eq!(report.entity.id, "srv-1");

    let snapshot = tasks.scheduler().store().snapshot();
    assert_eq!(snapshot.items.len(), 5);
    assert_eq!(snapshot.items[0].id, "srv-1");
    assert!(snapshot.items.iter().all(|t| !t.is_local()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_keeps_local_task_under_trust() {
    let (gateway, tasks) = task_mirror(true);
    gateway.fail_mutations(api_error("Title already exists"));

    let report = tasks
        .create_task(NewTask::titled("Add login page"))
        .await
        .expect("remote failure is reported, not returned");

    assert!(!report.rolled_back);
    let err = report.remote_error.expect("remote error recorded");
    assert_eq!(err.message, "Title already exists");
    assert_eq!(tasks.error().map(|e| e.code), Some(ErrorCode::ApiError));

    let snapshot = tasks.scheduler().store().snapshot();
    let created = snapshot.get(&report.entity.id).expect("local task in store");
    assert_eq!(created.title, "Add login page");
    assert_eq!(created.status, TaskStatus::Todo);
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_drops_placeholder_without_trust() {
    let (gateway, tasks) = task_mirror(false);
    gateway.fail_mutations(GatewayError::Network("refused".into()));

    let report = tasks.create_task(NewTask::titled("Add login page")).await.unwrap();
    assert!(report.rolled_back);
    assert_eq!(ids(&tasks.scheduler().store().snapshot().items), ids(&board()));
}

#[tokio::test(start_paused = true)]
async fn test_blank_title_never_reaches_the_gateway() {
    let (gateway, tasks) = task_mirror(true);

    let err = tasks.create_task(NewTask::titled("   ")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingRequiredField);
    assert_eq!(err.field.as_deref(), Some("title"));
    assert!(err.code.is_validation());
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.creates), 0);
    assert_eq!(tasks.scheduler().store().snapshot().version, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drag_to_completed_touches_only_completion_fields() {
    let (gateway, tasks) = task_mirror(true);
    let before = tasks.scheduler().store().snapshot().get("t1").cloned().unwrap();

    let report = tasks.move_to_column("t1", TaskStatus::Completed).await.unwrap();
    assert!(report.confirmed());

    let after = tasks.scheduler().store().snapshot().get("t1").cloned().unwrap();
    assert_eq!(after.status, TaskStatus::Completed);
    assert_eq!(after.progress, 100);
    assert_eq!(after.completed_at, Some(after.updated_at));
    assert!(after.updated_at >= before.updated_at);
    assert!(after.is_consistent());

    let mut expected = before.clone();
    expected.status = after.status;
    expected.progress = after.progress;
    expected.completed_at = after.completed_at;
    expected.updated_at = after.updated_at;
    assert_eq!(after, expected);

    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.status_updates), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_onto_same_column_is_a_no_op() {
    let (gateway, tasks) = task_mirror(true);
    let report = tasks.move_to_column("t3", TaskStatus::InProgress).await.unwrap();
    assert_eq!(report.entity.status, TaskStatus::InProgress);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.status_updates), 0);
    assert_eq!(tasks.scheduler().store().snapshot().version, 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_update_of_unknown_task_is_not_sent() {
    let (gateway, tasks) = task_mirror(true);
    let err = tasks.update_status("nope", TaskStatus::Review).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::EntityNotFound);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.status_updates), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_update_policies() {
    // Trusted: the optimistic status stays.
    let (gateway, tasks) = task_mirror(true);
    gateway.fail_mutations(api_error("locked"));
    let report = tasks.update_status("t2", TaskStatus::Review).await.unwrap();
    assert!(!report.rolled_back);
    assert_eq!(report.entity.status, TaskStatus::Review);
    assert!(tasks.error().is_some());
    assert_eq!(
        tasks.scheduler().store().snapshot().get("t2").unwrap().status,
        TaskStatus::Review
    );

    // Untrusted: the prior task comes back, but updated_at never goes back.
    let (gateway, tasks) = task_mirror(false);
    gateway.fail_mutations(api_error("locked"));
    let report = tasks.update_status("t2", TaskStatus::Review).await.unwrap();
    assert!(report.rolled_back);

    let original = board().into_iter().find(|t| t.id == "t2").unwrap();
    let restored = tasks.scheduler().store().snapshot().get("t2").cloned().unwrap();
    assert_eq!(restored.status, TaskStatus::Todo);
    assert!(restored.completed_at.is_none());
    assert!(restored.updated_at > original.updated_at);
    assert_eq!(
        Task {
            updated_at: original.updated_at,
            ..restored.clone()
        },
        original
    );
}

#[tokio::test(start_paused = true)]
async fn test_rollback_keeps_latest_update_time() {
    let (gateway, tasks) = task_mirror(false);
    gateway.fail_mutations(api_error("locked"));

    tasks.update_progress("t3", 40, "").await.unwrap();
    let restored = tasks.scheduler().store().snapshot().get("t3").cloned().unwrap();
    assert_eq!(restored.progress, 0);
    assert!(restored.updated_at >= common::t0());
    assert!(restored.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_successful_update_schedules_reconciliation() {
    let (gateway, tasks) = task_mirror(true);
    tasks.update_status("t1", TaskStatus::InProgress).await.unwrap();

    sleep(ms(500)).await;
    assert_eq!(gateway.fetches(), 0);
    sleep(ms(600)).await;
    assert_eq!(gateway.fetches(), 1);

    // After reconciliation the mirror holds the server's copy.
    let server_copy = gateway.server.lock().unwrap().iter().find(|t| t.id == "t1").cloned();
    assert_eq!(tasks.scheduler().store().snapshot().get("t1").cloned(), server_copy);
}

#[tokio::test(start_paused = true)]
async fn test_progress_update() {
    let (gateway, tasks) = task_mirror(true);
    let report = tasks.update_progress("t3", 60, "halfway").await.unwrap();
    assert!(report.confirmed());
    assert_eq!(report.entity.progress, 60);
    assert_eq!(report.entity.status, TaskStatus::InProgress);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.task_updates), 1);

    let full = tasks.update_progress("t3", 100, "").await.unwrap();
    assert_eq!(full.entity.status, TaskStatus::InProgress);
    assert!(full.entity.completed_at.is_none());

    let err = tasks.update_progress("t3", 101, "").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_delete_removes_every_requested_id_and_reports_divergence() {
    let (gateway, tasks) = task_mirror(true);
    *gateway.bulk_response.lock().unwrap() = Some(BulkDeleteResponse {
        success: true,
        deleted_count: 2,
        failed_count: 1,
        remaining_count: 2,
    });

    let requested = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
    let report = tasks.bulk_delete(requested).await.unwrap();

    assert_eq!(report.requested, 3);
    assert_eq!(report.removed_locally, 3);
    assert_eq!(report.deleted_count, 2);
    assert_eq!(report.failed_count, 1);
    assert_eq!(report.unacknowledged(), 1);
    let partial = report.partial_failure.expect("partial failure surfaced");
    assert_eq!(partial.code, ErrorCode::PartialBulkFailure);
    assert!(report.remote_error.is_none());
    assert!(tasks.delete_error().is_none());

    assert_eq!(ids(&tasks.scheduler().store().snapshot().items), vec!["t4"]);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_delete_rejects_empty_selection() {
    let (gateway, tasks) = task_mirror(true);
    let err = tasks.bulk_delete(Vec::new()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.bulk_deletes), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_bulk_delete_restores_positions_without_trust() {
    let (gateway, tasks) = task_mirror(false);
    gateway.fail_mutations(GatewayError::Network("reset".into()));

    let report = tasks
        .bulk_delete(vec!["t1".to_string(), "t3".to_string()])
        .await
        .unwrap();
    assert!(report.rolled_back);
    assert!(tasks.delete_error().is_some());
    assert_eq!(ids(&tasks.scheduler().store().snapshot().items), ids(&board()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_policies() {
    let (gateway, tasks) = task_mirror(true);
    gateway.fail_mutations(api_error("forbidden"));
    let report = tasks.delete("t2").await.unwrap();
    assert!(!report.rolled_back);
    assert_eq!(report.entity.map(|t| t.id), Some("t2".to_string()));
    assert!(!tasks.scheduler().store().snapshot().contains("t2"));
    assert_eq!(tasks.delete_error().map(|e| e.message), Some("forbidden".to_string()));

    let (gateway, tasks) = task_mirror(false);
    gateway.fail_mutations(api_error("forbidden"));
    let report = tasks.delete("t2").await.unwrap();
    assert!(report.rolled_back);
    assert_eq!(ids(&tasks.scheduler().store().snapshot().items), ids(&board()));
}

#[tokio::test(start_paused = true)]
async fn test_delete_holds_busy_flag() {
    let gateway = Arc::new(FakeGateway::new(vec![
        doc("d1", ProcessingStatus::Indexed),
        doc("d2", ProcessingStatus::Indexed),
    ]));
    gateway.set_mutation_delay(ms(300));
    let documents = mirror(
        Arc::clone(&gateway),
        vec![doc("d1", ProcessingStatus::Indexed), doc("d2", ProcessingStatus::Indexed)],
        PollConfig::documents(),
        policy(true),
    );

    let pending = {
        let documents = Arc::clone(&documents);
        tokio::spawn(async move { documents.delete("d1").await })
    };
    sleep(ms(10)).await;

    assert!(documents.scheduler().busy().is_busy());
    assert_eq!(
        documents.scheduler().poll_once().await,
        PollOutcome::Skipped(SkipReason::Busy)
    );
    assert_eq!(gateway.fetches(), 0);

    let report = pending.await.unwrap().unwrap();
    assert!(report.confirmed());
    assert!(!documents.scheduler().busy().is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_mutations_after_teardown_are_refused() {
    let (gateway, tasks) = task_mirror(true);
    tasks.scheduler().shutdown();

    let err = tasks.update_status("t1", TaskStatus::Review).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Stopped);
    let err = tasks.create_task(NewTask::titled("Late")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Stopped);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.status_updates), 0);
    assert_eq!(FakeGateway::<Task>::count(&gateway.calls.creates), 0);
}
