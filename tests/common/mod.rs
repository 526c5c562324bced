//! Shared fixtures: an in-process gateway with scripted latency and failures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use entity_sync::config::{MutationPolicy, PollConfig};
use entity_sync::gateway::{
    AckResponse, BulkDeleteResponse, CollectionResponse, DeleteResponse, GatewayError,
    GatewayResult, RemoteGateway, StatusResponse, TaskGateway,
};
use entity_sync::mutations::MutationCoordinator;
use entity_sync::store::EntityStore;
use entity_sync::sync::SyncScheduler;
use entity_sync::types::{
    Difficulty, Document, Entity, NewTask, Priority, ProcessingStatus, Task, TaskStatus,
    TaskUpdate,
};

#[derive(Debug, Default)]
pub struct Calls {
    pub fetches: AtomicUsize,
    pub deletes: AtomicUsize,
    pub bulk_deletes: AtomicUsize,
    pub status_updates: AtomicUsize,
    pub creates: AtomicUsize,
    pub task_updates: AtomicUsize,
}

impl Calls {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake remote service holding its own copy of the collection.
pub struct FakeGateway<E> {
    pub server: Mutex<Vec<E>>,
    pub fetch_delay: Mutex<Duration>,
    pub mutation_delay: Mutex<Duration>,
    pub fail_fetch: Mutex<Option<GatewayError>>,
    pub fail_mutations: Mutex<Option<GatewayError>>,
    /// Returned by `bulk_delete` instead of the computed response.
    pub bulk_response: Mutex<Option<BulkDeleteResponse>>,
    pub calls: Calls,
    next_id: AtomicUsize,
}

impl<E: Entity> FakeGateway<E> {
    pub fn new(server: Vec<E>) -> Self {
        Self {
            server: Mutex::new(server),
            fetch_delay: Mutex::new(Duration::ZERO),
            mutation_delay: Mutex::new(Duration::ZERO),
            fail_fetch: Mutex::new(None),
            fail_mutations: Mutex::new(None),
            bulk_response: Mutex::new(None),
            calls: Calls::default(),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn set_server(&self, items: Vec<E>) {
        *self.server.lock().unwrap() = items;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_mutation_delay(&self, delay: Duration) {
        *self.mutation_delay.lock().unwrap() = delay;
    }

    pub fn fail_fetches(&self, err: GatewayError) {
        *self.fail_fetch.lock().unwrap() = Some(err);
    }

    pub fn fail_mutations(&self, err: GatewayError) {
        *self.fail_mutations.lock().unwrap() = Some(err);
    }

    pub fn fetches(&self) -> usize {
        self.calls.fetches.load(Ordering::SeqCst)
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn mutation_gate(&self) -> GatewayResult<()> {
        let delay = *self.mutation_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.fail_mutations.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn remove_server(&self, ids: &[String]) -> u64 {
        let mut server = self.server.lock().unwrap();
        let before = server.len();
        server.retain(|e| !ids.iter().any(|id| id == e.id()));
        (before - server.len()) as u64
    }
}

#[async_trait]
impl<E: Entity> RemoteGateway for FakeGateway<E> {
    type Item = E;

    async fn fetch_collection(&self) -> GatewayResult<CollectionResponse<E>> {
        Calls::bump(&self.calls.fetches);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_fetch.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(CollectionResponse::ok(self.server.lock().unwrap().clone()))
    }

    async fn delete(&self, id: &str) -> GatewayResult<DeleteResponse> {
        Calls::bump(&self.calls.deletes);
        self.mutation_gate().await?;
        self.remove_server(&[id.to_string()]);
        Ok(DeleteResponse {
            success: true,
            message: "deleted".into(),
            deleted_id: id.to_string(),
            remaining_count: self.server.lock().unwrap().len() as u64,
        })
    }

    async fn bulk_delete(&self, ids: &[String]) -> GatewayResult<BulkDeleteResponse> {
        Calls::bump(&self.calls.bulk_deletes);
        self.mutation_gate().await?;
        if let Some(scripted) = self.bulk_response.lock().unwrap().clone() {
            return Ok(scripted);
        }
        let deleted = self.remove_server(ids);
        Ok(BulkDeleteResponse {
            success: true,
            deleted_count: deleted,
            failed_count: ids.len() as u64 - deleted,
            remaining_count: self.server.lock().unwrap().len() as u64,
        })
    }
}

#[async_trait]
impl TaskGateway for FakeGateway<Task> {
    async fn update_status(&self, id: &str, status: TaskStatus) -> GatewayResult<StatusResponse> {
        Calls::bump(&self.calls.status_updates);
        self.mutation_gate().await?;
        let mut server = self.server.lock().unwrap();
        match server.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                *task = task.transition(status, Utc::now());
                Ok(StatusResponse { success: true })
            }
            None => Err(GatewayError::Api {
                status: 404,
                message: "Task not found".into(),
            }),
        }
    }

    async fn create_task(&self, draft: &NewTask) -> GatewayResult<Task> {
        Calls::bump(&self.calls.creates);
        self.mutation_gate().await?;
        let mut task = Task::local(draft, Utc::now());
        task.id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.server.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, update: &TaskUpdate) -> GatewayResult<AckResponse> {
        Calls::bump(&self.calls.task_updates);
        self.mutation_gate().await?;
        let mut server = self.server.lock().unwrap();
        if let Some(task) = server.iter_mut().find(|t| t.id == update.task_id) {
            *task = task.with_progress(update.progress, Utc::now());
        }
        Ok(AckResponse {
            success: true,
            message: None,
        })
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Helper to build a server-side task.
pub fn task(id: &str, title: &str, status: TaskStatus) -> Task {
    let completed = status == TaskStatus::Completed;
    Task {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        status,
        priority: Priority::Medium,
        difficulty: Difficulty::Medium,
        category: "general".into(),
        tags: Vec::new(),
        due_date: None,
        created_at: t0(),
        updated_at: t0(),
        completed_at: completed.then(t0),
        assignee: None,
        progress: if completed { 100 } else { 0 },
        subtasks: None,
    }
}

/// Helper to build an uploaded document.
pub fn doc(id: &str, status: ProcessingStatus) -> Document {
    Document {
        id: id.to_string(),
        filename: format!("{}.pdf", id),
        file_type: "pdf".into(),
        size: 2048,
        upload_time: t0(),
        processing_status: status,
        document_count: 1,
        user_id: "default_user".into(),
        source_type: "upload".into(),
    }
}

/// Document polling with a short fast interval.
pub fn document_polling(fast_ms: u64) -> PollConfig {
    PollConfig {
        fast_interval_ms: Some(fast_ms),
        ..PollConfig::documents()
    }
}

pub fn policy(optimistic_trust: bool) -> MutationPolicy {
    MutationPolicy {
        optimistic_trust,
        ..MutationPolicy::default()
    }
}

/// Helper to wire gateway, store, scheduler and coordinator together.
pub fn mirror<E: Entity>(
    gateway: Arc<FakeGateway<E>>,
    local: Vec<E>,
    poll: PollConfig,
    policy: MutationPolicy,
) -> Arc<MutationCoordinator<FakeGateway<E>>> {
    let scheduler = SyncScheduler::new(gateway, Arc::new(EntityStore::with_items(local)), poll);
    Arc::new(MutationCoordinator::new(scheduler, policy))
}

pub fn ids<E: Entity>(items: &[E]) -> Vec<String> {
    items.iter().map(|e| e.id().to_string()).collect()
}
