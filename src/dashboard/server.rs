//! HTTP server implementation for the dashboard.
//!
//! Serves JSON views over the live task and document mirrors and forwards
//! edits to the mutation coordinators.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ErrorCode, SyncError};
use crate::filter::{FilterState, SortDirection, SortState};
use crate::gateway::{DocumentGateway, RemoteGateway, TaskGateway};
use crate::mutations::{BulkDeleteReport, MutationCoordinator, MutationReport};
use crate::sync::RemoteSummary;
use crate::types::{Document, Entity, NewTask, Task, TaskStatus};
use crate::views::{
    DOCUMENT_FILTER_FIELDS, DOCUMENT_SEARCH_KEYS, DocumentStats, KanbanBoard, KanbanSource,
    TASK_FILTER_FIELDS, TASK_SEARCH_KEYS, TaskStats, ViewProjector,
};

/// Dashboard state shared across handlers.
pub struct DashboardServer<T: TaskGateway, D: DocumentGateway> {
    tasks: Arc<MutationCoordinator<T>>,
    documents: Arc<MutationCoordinator<D>>,
    /// Board source used when a request does not name one.
    kanban_source: KanbanSource,
}

impl<T: TaskGateway, D: DocumentGateway> Clone for DashboardServer<T, D> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
            documents: Arc::clone(&self.documents),
            kanban_source: self.kanban_source,
        }
    }
}

impl<T: TaskGateway, D: DocumentGateway> DashboardServer<T, D> {
    pub fn new(
        tasks: Arc<MutationCoordinator<T>>,
        documents: Arc<MutationCoordinator<D>>,
        kanban_source: KanbanSource,
    ) -> Self {
        Self {
            tasks,
            documents,
            kanban_source,
        }
    }

    pub fn tasks(&self) -> &Arc<MutationCoordinator<T>> {
        &self.tasks
    }

    pub fn documents(&self) -> &Arc<MutationCoordinator<D>> {
        &self.documents
    }
}

/// Error body with a status code chosen from the error code.
#[derive(Debug)]
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NetworkError
            | ErrorCode::ApiError
            | ErrorCode::DecodeError
            | ErrorCode::PartialBulkFailure => StatusCode::BAD_GATEWAY,
        };
        (status, Json(self.0)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build a projector from query parameters.
///
/// Filter fields take comma-separated values (`?status=todo,review`).
/// `search`, `sort`, `direction` and `source` are also accepted.
pub fn projector_from_query(
    params: &HashMap<String, String>,
    filter_fields: &[&str],
    default_source: KanbanSource,
) -> Result<ViewProjector, SyncError> {
    let mut filter = FilterState::new();
    for &field in filter_fields {
        if let Some(raw) = params.get(field) {
            let values = raw.split(',').map(str::trim).filter(|v| !v.is_empty());
            filter = filter.with(field, values);
        }
    }
    if let Some(query) = params.get("search") {
        filter = filter.with_search(query.as_str());
    }

    let mut projector = ViewProjector::new(filter).with_kanban_source(default_source);

    if let Some(field) = params.get("sort").filter(|f| !f.is_empty()) {
        let direction = match params.get("direction") {
            Some(d) => SortDirection::from_str(d)
                .ok_or_else(|| SyncError::invalid_value("direction", "expected asc or desc"))?,
            None => SortDirection::Asc,
        };
        projector = projector.sorted(SortState::new(field.as_str(), direction));
    }

    if let Some(source) = params.get("source") {
        projector.kanban_source = match source.as_str() {
            "filtered" => KanbanSource::Filtered,
            "unfiltered" => KanbanSource::Unfiltered,
            _ => {
                return Err(SyncError::invalid_value(
                    "source",
                    "expected filtered or unfiltered",
                ));
            }
        };
    }

    Ok(projector)
}

async fn api_tasks<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Task>> {
    let projector = projector_from_query(&params, TASK_FILTER_FIELDS, state.kanban_source)?;
    let snapshot = state.tasks.scheduler().store().snapshot();
    Ok(Json(projector.list_view(&snapshot.items, TASK_SEARCH_KEYS)))
}

async fn api_kanban<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<KanbanBoard> {
    let projector = projector_from_query(&params, TASK_FILTER_FIELDS, state.kanban_source)?;
    let snapshot = state.tasks.scheduler().store().snapshot();
    Ok(Json(projector.kanban(&snapshot.items)))
}

#[derive(Serialize)]
struct StatsResponse {
    tasks: TaskStats,
    documents: DocumentStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents_remote: Option<RemoteSummary>,
}

async fn api_stats<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
) -> Json<StatsResponse> {
    let tasks = state.tasks.scheduler().store().snapshot();
    let documents = state.documents.scheduler().store().snapshot();
    Json(StatsResponse {
        tasks: TaskStats::from_store_stats(&tasks.stats),
        documents: DocumentStats::from_store_stats(&documents.stats),
        documents_remote: state.documents.scheduler().summary(),
    })
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
    stats: DocumentStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<RemoteSummary>,
}

async fn api_documents<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<DocumentsResponse> {
    let projector = projector_from_query(&params, DOCUMENT_FILTER_FIELDS, KanbanSource::Filtered)?;
    let snapshot = state.documents.scheduler().store().snapshot();
    Ok(Json(DocumentsResponse {
        documents: projector.list_view(&snapshot.items, DOCUMENT_SEARCH_KEYS),
        stats: DocumentStats::from_store_stats(&snapshot.stats),
        remote: state.documents.scheduler().summary(),
    }))
}

/// Scheduler and coordinator state for one resource.
#[derive(Serialize)]
struct SyncStatus {
    resource: &'static str,
    live: bool,
    busy: bool,
    fast_polling: bool,
    polls_issued: u64,
    ticks_skipped: u64,
    regressions_observed: u64,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<SyncError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mutation_error: Option<SyncError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_error: Option<SyncError>,
}

fn sync_status<G: RemoteGateway>(coordinator: &MutationCoordinator<G>) -> SyncStatus {
    let scheduler = coordinator.scheduler();
    SyncStatus {
        resource: <G::Item as Entity>::RESOURCE,
        live: scheduler.is_live(),
        busy: scheduler.busy().is_busy(),
        fast_polling: scheduler.is_fast_polling(),
        polls_issued: scheduler.polls_issued(),
        ticks_skipped: scheduler.ticks_skipped(),
        regressions_observed: scheduler.regressions_observed(),
        version: scheduler.store().snapshot().version,
        error: scheduler.error(),
        mutation_error: coordinator.error(),
        delete_error: coordinator.delete_error(),
    }
}

async fn api_sync<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
) -> Json<Vec<SyncStatus>> {
    Json(vec![sync_status(&state.tasks), sync_status(&state.documents)])
}

/// Acknowledge recorded mutation and delete failures on both resources.
async fn api_clear_errors<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
) -> Json<Vec<SyncStatus>> {
    state.tasks.clear_errors();
    state.documents.clear_errors();
    info!("Mutation errors cleared");
    Json(vec![sync_status(&state.tasks), sync_status(&state.documents)])
}

async fn api_create_task<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Json(draft): Json<NewTask>,
) -> ApiResult<MutationReport<Task>> {
    Ok(Json(state.tasks.create_task(draft).await?))
}

#[derive(Deserialize)]
struct StatusBody {
    status: TaskStatus,
}

async fn api_move_task<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Path(task_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<MutationReport<Task>> {
    Ok(Json(state.tasks.move_to_column(&task_id, body.status).await?))
}

#[derive(Deserialize)]
struct ProgressBody {
    progress: u8,
    #[serde(default)]
    notes: String,
}

async fn api_task_progress<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Path(task_id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> ApiResult<MutationReport<Task>> {
    Ok(Json(
        state
            .tasks
            .update_progress(&task_id, body.progress, body.notes)
            .await?,
    ))
}

async fn api_delete_task<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Path(task_id): Path<String>,
) -> ApiResult<MutationReport<Option<Task>>> {
    Ok(Json(state.tasks.delete(&task_id).await?))
}

async fn api_delete_document<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Path(document_id): Path<String>,
) -> ApiResult<MutationReport<Option<Document>>> {
    Ok(Json(state.documents.delete(&document_id).await?))
}

#[derive(Deserialize)]
struct BulkBody {
    ids: Vec<String>,
}

async fn api_bulk_delete_tasks<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Json(body): Json<BulkBody>,
) -> ApiResult<BulkDeleteReport> {
    Ok(Json(state.tasks.bulk_delete(body.ids).await?))
}

async fn api_bulk_delete_documents<T: TaskGateway, D: DocumentGateway>(
    State(state): State<DashboardServer<T, D>>,
    Json(body): Json<BulkBody>,
) -> ApiResult<BulkDeleteReport> {
    Ok(Json(state.documents.bulk_delete(body.ids).await?))
}

/// Build the router with all dashboard routes.
pub fn build_router<T: TaskGateway, D: DocumentGateway>(state: DashboardServer<T, D>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/sync", get(api_sync::<T, D>))
        .route("/api/sync/clear-errors", post(api_clear_errors::<T, D>))
        .route("/api/stats", get(api_stats::<T, D>))
        .route("/api/tasks", get(api_tasks::<T, D>).post(api_create_task::<T, D>))
        .route("/api/tasks/kanban", get(api_kanban::<T, D>))
        .route("/api/tasks/bulk-delete", post(api_bulk_delete_tasks::<T, D>))
        .route("/api/tasks/{task_id}", axum::routing::delete(api_delete_task::<T, D>))
        .route("/api/tasks/{task_id}/status", patch(api_move_task::<T, D>))
        .route("/api/tasks/{task_id}/progress", put(api_task_progress::<T, D>))
        .route("/api/documents", get(api_documents::<T, D>))
        .route("/api/documents/bulk-delete", post(api_bulk_delete_documents::<T, D>))
        .route(
            "/api/documents/{document_id}",
            axum::routing::delete(api_delete_document::<T, D>),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle to a running dashboard server.
pub struct DashboardHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
}

impl DashboardHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Trigger shutdown of the dashboard server.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the HTTP server on `127.0.0.1:port` (`0` picks a free port).
pub async fn start_server<T: TaskGateway, D: DocumentGateway>(
    state: DashboardServer<T, D>,
    port: u16,
) -> anyhow::Result<DashboardHandle> {
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Dashboard server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Dashboard server shutting down");
            })
            .await
        {
            tracing::error!("Dashboard server error: {}", e);
        }
    });

    Ok(DashboardHandle {
        shutdown_tx: Some(shutdown_tx),
        addr: bound_addr,
    })
}
