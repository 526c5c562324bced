//! Remote service boundary.
//!
//! Every endpoint has an explicit response schema. Loosely-shaped JSON never
//! leaves this module: a body that does not decode, or an envelope reporting
//! `success: false`, becomes a [`GatewayError`].

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Document, Entity, NewTask, Task, TaskStatus, TaskUpdate};

pub use http::HttpGateway;

/// Message shown for failures where no response was received.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Check your connection and try again.";

/// Transport-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Request rejected or timed out before a response arrived.
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx response. `message` is the body's `detail`/`message`, or the status text.
    #[error("{message}")]
    Api { status: u16, message: String },
    /// 2xx response that does not match the endpoint schema.
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// `GET /{resource}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse<E> {
    pub success: bool,
    #[serde(alias = "tasks", alias = "documents")]
    pub items: Vec<E>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<u64>,
}

impl<E> CollectionResponse<E> {
    pub fn ok(items: Vec<E>) -> Self {
        let total_count = items.len() as u64;
        Self {
            success: true,
            items,
            total_count,
            indexed_count: None,
            processing_count: None,
            failed_count: None,
        }
    }
}

/// `DELETE /{resource}/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted_id: String,
    #[serde(default)]
    pub remaining_count: u64,
}

/// `DELETE /{resource}` with a list of ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub deleted_count: u64,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default)]
    pub remaining_count: u64,
}

/// `PATCH /{resource}/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
}

/// `PUT /tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Turn a `success: false` envelope into an error.
pub(crate) fn ensure_success(success: bool, message: Option<&str>) -> GatewayResult<()> {
    if success {
        Ok(())
    } else {
        Err(GatewayError::Decode(
            message
                .filter(|m| !m.is_empty())
                .unwrap_or("server reported success: false")
                .to_string(),
        ))
    }
}

/// Collection operations shared by every mirrored resource.
#[async_trait]
pub trait RemoteGateway: Send + Sync + 'static {
    type Item: Entity;

    async fn fetch_collection(&self) -> GatewayResult<CollectionResponse<Self::Item>>;

    async fn delete(&self, id: &str) -> GatewayResult<DeleteResponse>;

    async fn bulk_delete(&self, ids: &[String]) -> GatewayResult<BulkDeleteResponse>;
}

/// Task-only endpoints.
#[async_trait]
pub trait TaskGateway: RemoteGateway<Item = Task> {
    async fn update_status(&self, id: &str, status: TaskStatus) -> GatewayResult<StatusResponse>;

    /// Returns the server's copy, carrying the server-assigned id.
    async fn create_task(&self, draft: &NewTask) -> GatewayResult<Task>;

    async fn update_task(&self, update: &TaskUpdate) -> GatewayResult<AckResponse>;
}

/// Gateway for the document collection.
pub trait DocumentGateway: RemoteGateway<Item = Document> {}

impl<G: RemoteGateway<Item = Document>> DocumentGateway for G {}
