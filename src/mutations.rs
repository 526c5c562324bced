//! Optimistic mutations against the mirror.
//!
//! Every mutation writes the store first and then asks the gateway. What
//! happens when the gateway refuses is governed by
//! [`MutationPolicy::optimistic_trust`]:
//! - `true`: the local change stays; the failure is only recorded in
//!   [`MutationCoordinator::error`] / [`MutationCoordinator::delete_error`]
//!   and in the returned report.
//! - `false`: the local change is rolled back.
//!
//! Successful status changes and deletions schedule a reconciliation poll so
//! optimistic state is replaced by server state shortly after.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::MutationPolicy;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{RemoteGateway, TaskGateway};
use crate::sync::{SyncScheduler, lock};
use crate::types::{Entity, NewTask, Task, TaskStatus, TaskUpdate};

/// Outcome of a single-entity mutation.
#[derive(Debug, Clone, Serialize)]
pub struct MutationReport<T> {
    /// The entity as it was left in the store (or as it was removed).
    pub entity: T,
    /// Set when the gateway refused or could not be reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<SyncError>,
    /// True when the local change was reverted because of `remote_error`.
    pub rolled_back: bool,
}

impl<T> MutationReport<T> {
    pub fn confirmed(&self) -> bool {
        self.remote_error.is_none()
    }
}

/// Outcome of a bulk delete.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDeleteReport {
    pub requested: usize,
    /// Entities removed from the local store, regardless of server counts.
    pub removed_locally: usize,
    pub deleted_count: u64,
    pub failed_count: u64,
    pub remaining_count: u64,
    /// Non-fatal: the server deleted some ids but not all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_failure: Option<SyncError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<SyncError>,
    pub rolled_back: bool,
}

impl BulkDeleteReport {
    /// Local removals the server did not acknowledge. Only a later poll can
    /// bring these back.
    pub fn unacknowledged(&self) -> u64 {
        (self.removed_locally as u64).saturating_sub(self.deleted_count)
    }
}

/// Sequences optimistic store writes against gateway calls for one mirror.
pub struct MutationCoordinator<G: RemoteGateway> {
    scheduler: Arc<SyncScheduler<G>>,
    policy: MutationPolicy,
    error: Mutex<Option<SyncError>>,
    delete_error: Mutex<Option<SyncError>>,
}

impl<G: RemoteGateway> MutationCoordinator<G> {
    pub fn new(scheduler: Arc<SyncScheduler<G>>, policy: MutationPolicy) -> Self {
        Self {
            scheduler,
            policy,
            error: Mutex::new(None),
            delete_error: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler<G>> {
        &self.scheduler
    }

    pub fn policy(&self) -> &MutationPolicy {
        &self.policy
    }

    /// Last create/status/progress failure.
    pub fn error(&self) -> Option<SyncError> {
        lock(&self.error).clone()
    }

    /// Last delete or bulk-delete failure.
    pub fn delete_error(&self) -> Option<SyncError> {
        lock(&self.delete_error).clone()
    }

    pub fn clear_errors(&self) {
        *lock(&self.error) = None;
        *lock(&self.delete_error) = None;
    }

    fn ensure_live(&self) -> SyncResult<()> {
        if self.scheduler.is_live() {
            Ok(())
        } else {
            Err(SyncError::stopped())
        }
    }

    fn record(&self, slot: &Mutex<Option<SyncError>>, result: &Result<(), SyncError>) {
        *lock(slot) = result.as_ref().err().cloned();
    }

    fn reconcile(&self) {
        self.scheduler.schedule_refresh(self.policy.reconcile_delay());
    }

    /// Remove one entity locally, then delete it remotely.
    pub async fn delete(&self, id: &str) -> SyncResult<MutationReport<Option<G::Item>>> {
        self.ensure_live()?;
        let store = self.scheduler.store();
        let prior = positions(&store.snapshot().items, &[id.to_string()]);
        store.remove([id]);

        let busy = self.scheduler.busy().enter();
        let result = self.scheduler.gateway().delete(id).await;
        drop(busy);
        self.ensure_live()?;

        let result = result.map(|resp| {
            debug!(id, remaining = resp.remaining_count, "delete confirmed");
        });
        let result = result.map_err(SyncError::from);
        self.record(&self.delete_error, &result);

        let rolled_back = match &result {
            Ok(()) => {
                self.reconcile();
                false
            }
            Err(err) => {
                warn!(resource = G::Item::RESOURCE, id, "delete failed: {}", err);
                self.rollback_removal(&prior)
            }
        };

        Ok(MutationReport {
            entity: prior.into_iter().next().map(|(_, e)| e),
            remote_error: result.err(),
            rolled_back,
        })
    }

    /// Remove every requested id locally, then bulk-delete remotely.
    ///
    /// All requested ids are removed from the store even when the server
    /// reports `failed_count > 0`; the server does not say which ids failed,
    /// so the reconciliation poll is what restores them.
    pub async fn bulk_delete(&self, ids: Vec<String>) -> SyncResult<BulkDeleteReport> {
        self.ensure_live()?;
        if ids.is_empty() {
            return Err(SyncError::invalid_value("ids", "no ids selected"));
        }
        let store = self.scheduler.store();
        let prior = positions(&store.snapshot().items, &ids);
        let removed_locally = store.remove(ids.iter().cloned());

        let busy = self.scheduler.busy().enter();
        let result = self.scheduler.gateway().bulk_delete(&ids).await;
        drop(busy);
        self.ensure_live()?;

        let mut report = BulkDeleteReport {
            requested: ids.len(),
            removed_locally,
            deleted_count: 0,
            failed_count: 0,
            remaining_count: 0,
            partial_failure: None,
            remote_error: None,
            rolled_back: false,
        };

        match result {
            Ok(resp) => {
                report.deleted_count = resp.deleted_count;
                report.failed_count = resp.failed_count;
                report.remaining_count = resp.remaining_count;
                if resp.failed_count > 0 {
                    let partial = SyncError::partial_bulk_failure(resp.deleted_count, resp.failed_count);
                    warn!(
                        resource = G::Item::RESOURCE,
                        deleted = resp.deleted_count,
                        failed = resp.failed_count,
                        removed_locally,
                        "bulk delete partially failed"
                    );
                    report.partial_failure = Some(partial);
                } else {
                    info!(resource = G::Item::RESOURCE, deleted = resp.deleted_count, "bulk delete confirmed");
                }
                *lock(&self.delete_error) = None;
                self.reconcile();
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(resource = G::Item::RESOURCE, count = ids.len(), "bulk delete failed: {}", err);
                *lock(&self.delete_error) = Some(err.clone());
                report.rolled_back = self.rollback_removal(&prior);
                report.remote_error = Some(err);
            }
        }
        Ok(report)
    }

    /// Put removed entities back at their former positions. Returns whether
    /// a rollback happened.
    fn rollback_removal(&self, prior: &[(usize, G::Item)]) -> bool {
        if self.policy.optimistic_trust || prior.is_empty() {
            return false;
        }
        self.scheduler.store().apply_optimistic(|items| {
            let present: HashSet<&str> = items.iter().map(Entity::id).collect();
            let mut restored = items.to_vec();
            for (index, entity) in prior {
                if !present.contains(entity.id()) {
                    restored.insert((*index).min(restored.len()), entity.clone());
                }
            }
            restored
        });
        true
    }
}

impl<G: TaskGateway> MutationCoordinator<G> {
    /// Validate, insert a local task immediately, then create it remotely.
    ///
    /// On success the server's task (with its id) replaces the local one. On
    /// failure the local task stays in the store under `optimistic_trust`.
    pub async fn create_task(&self, draft: NewTask) -> SyncResult<MutationReport<Task>> {
        self.ensure_live()?;
        draft.validate()?;

        let store = self.scheduler.store();
        let local = Task::local(&draft, Utc::now());
        let placeholder = local.clone();
        store.apply_optimistic(|items| {
            let mut next = Vec::with_capacity(items.len() + 1);
            next.push(placeholder.clone());
            next.extend_from_slice(items);
            next
        });
        debug!(id = %local.id, "inserted local task");

        let result = self.scheduler.gateway().create_task(&draft).await;
        self.ensure_live()?;

        match result {
            Ok(created) => {
                *lock(&self.error) = None;
                info!(id = %created.id, "task created");
                store.apply_optimistic(|items| swap_in(items, &local.id, &created));
                Ok(MutationReport {
                    entity: created,
                    remote_error: None,
                    rolled_back: false,
                })
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(id = %local.id, trust = self.policy.optimistic_trust, "create failed: {}", err);
                *lock(&self.error) = Some(err.clone());
                if self.policy.optimistic_trust {
                    // A poll may have replaced the collection meanwhile
                    store.apply_optimistic(|items| swap_in(items, &local.id, &local));
                } else {
                    store.remove([local.id.as_str()]);
                }
                Ok(MutationReport {
                    entity: local,
                    remote_error: Some(err),
                    rolled_back: !self.policy.optimistic_trust,
                })
            }
        }
    }

    /// Change a task's status locally, then remotely.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> SyncResult<MutationReport<Task>> {
        self.ensure_live()?;
        let store = self.scheduler.store();
        let now = Utc::now();
        let prior = store
            .update(id, |t| t.transition(status, now))
            .ok_or_else(|| SyncError::not_found(id))?;
        debug!(id, from = %prior.status, to = %status, "status applied locally");

        let result = self
            .scheduler
            .gateway()
            .update_status(id, status)
            .await
            .map(|_| ())
            .map_err(SyncError::from);
        self.ensure_live()?;
        self.settle(id, prior, result)
    }

    /// Drop a task onto a board column. Any column accepts any task; dropping
    /// onto the task's own column changes nothing.
    pub async fn move_to_column(
        &self,
        id: &str,
        column: TaskStatus,
    ) -> SyncResult<MutationReport<Task>> {
        let current = self
            .scheduler
            .store()
            .snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::not_found(id))?;
        if current.status == column {
            return Ok(MutationReport {
                entity: current,
                remote_error: None,
                rolled_back: false,
            });
        }
        self.update_status(id, column).await
    }

    /// Set progress (and notes) locally, then `PUT /tasks`.
    pub async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        notes: impl Into<String>,
    ) -> SyncResult<MutationReport<Task>> {
        self.ensure_live()?;
        if progress > 100 {
            return Err(SyncError::invalid_value("progress", "progress must be between 0 and 100"));
        }
        let store = self.scheduler.store();
        let now = Utc::now();
        let prior = store
            .update(id, |t| t.with_progress(progress, now))
            .ok_or_else(|| SyncError::not_found(id))?;
        let update = TaskUpdate {
            task_id: id.to_string(),
            status: prior.status,
            progress: if prior.status == TaskStatus::Completed { 100 } else { progress },
            notes: notes.into(),
        };

        let result = self
            .scheduler
            .gateway()
            .update_task(&update)
            .await
            .map(|_| ())
            .map_err(SyncError::from);
        self.ensure_live()?;
        self.settle(id, prior, result)
    }

    /// Record the outcome of a single-task update and apply the policy.
    fn settle(
        &self,
        id: &str,
        prior: Task,
        result: Result<(), SyncError>,
    ) -> SyncResult<MutationReport<Task>> {
        self.record(&self.error, &result);
        let store = self.scheduler.store();
        let mut rolled_back = false;
        match &result {
            Ok(()) => self.reconcile(),
            Err(err) => {
                warn!(id, trust = self.policy.optimistic_trust, "task update failed: {}", err);
                if !self.policy.optimistic_trust {
                    rolled_back = store
                        .update(id, |current| {
                            let mut restored = prior.clone();
                            restored.updated_at = restored.updated_at.max(current.updated_at);
                            restored
                        })
                        .is_some();
                }
            }
        }
        let entity = store.snapshot().get(id).cloned().unwrap_or(prior);
        Ok(MutationReport {
            entity,
            remote_error: result.err(),
            rolled_back,
        })
    }
}

/// Entities with the given ids, paired with their index, in store order.
fn positions<E: Entity>(items: &[E], ids: &[String]) -> Vec<(usize, E)> {
    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    items
        .iter()
        .enumerate()
        .filter(|(_, e)| wanted.contains(e.id()))
        .map(|(i, e)| (i, e.clone()))
        .collect()
}

/// Replace the entity with `target_id` by `replacement`. If it is gone,
/// prepend `replacement` unless an entity with its id already exists.
fn swap_in(items: &[Task], target_id: &str, replacement: &Task) -> Vec<Task> {
    if items.iter().any(|t| t.id == target_id) {
        return items
            .iter()
            .map(|t| if t.id == target_id { replacement.clone() } else { t.clone() })
            .collect();
    }
    if items.iter().any(|t| t.id == replacement.id) {
        return items.to_vec();
    }
    let mut next = Vec::with_capacity(items.len() + 1);
    next.push(replacement.clone());
    next.extend_from_slice(items);
    next
}
