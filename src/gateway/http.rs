//! reqwest-backed gateway speaking the remote service's JSON API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;

use super::{
    AckResponse, BulkDeleteResponse, CollectionResponse, DeleteResponse, GatewayError,
    GatewayResult, RemoteGateway, StatusResponse, TaskGateway, ensure_success,
};
use crate::config::RemoteConfig;
use crate::types::{Entity, NewTask, Task, TaskStatus, TaskUpdate};

/// HTTP gateway for one resource collection.
pub struct HttpGateway<E> {
    client: Client,
    base_url: Url,
    user_id: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for HttpGateway<E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            user_id: self.user_id.clone(),
            _entity: PhantomData,
        }
    }
}

#[derive(Serialize)]
struct BulkDeleteRequest<'a> {
    ids: &'a [String],
    user_id: &'a str,
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    #[serde(flatten)]
    task: &'a NewTask,
    user_id: &'a str,
}

#[derive(Serialize)]
struct UpdateTaskRequest<'a> {
    #[serde(flatten)]
    update: &'a TaskUpdate,
    user_id: &'a str,
}

/// `POST /tasks` returns either the bare task or `{ "task": ... }`.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum CreatedTask {
    Wrapped { task: Task },
    Bare(Task),
}

impl<E: Entity> HttpGateway<E> {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base_url must be an http(s) URL: {}", config.base_url);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            user_id: config.user_id.clone(),
            _entity: PhantomData,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn with_user(&self, request: RequestBuilder) -> RequestBuilder {
        request.query(&[("user_id", self.user_id.as_str())])
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Map a non-2xx response to `GatewayError::Api`, preferring the body's
/// `detail` or `message` field over the status text.
async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let fallback = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Api {
        status: status.as_u16(),
        message: error_message_from_body(&body).unwrap_or(fallback),
    })
}

pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"].iter().find_map(|key| match value.get(*key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

#[async_trait]
impl<E: Entity> RemoteGateway for HttpGateway<E> {
    type Item = E;

    async fn fetch_collection(&self) -> GatewayResult<CollectionResponse<E>> {
        debug!(resource = E::RESOURCE, "fetching collection");
        let request = self.with_user(self.client.get(self.endpoint(&[E::RESOURCE])));
        let response: CollectionResponse<E> = self.send(request).await?;
        ensure_success(response.success, None)?;
        Ok(response)
    }

    async fn delete(&self, id: &str) -> GatewayResult<DeleteResponse> {
        let request = self.with_user(self.client.delete(self.endpoint(&[E::RESOURCE, id])));
        let response: DeleteResponse = self.send(request).await?;
        ensure_success(response.success, Some(&response.message))?;
        Ok(response)
    }

    async fn bulk_delete(&self, ids: &[String]) -> GatewayResult<BulkDeleteResponse> {
        let body = BulkDeleteRequest {
            ids,
            user_id: &self.user_id,
        };
        let request = self.client.delete(self.endpoint(&[E::RESOURCE])).json(&body);
        // Partial failures come back with success: true and failed_count > 0
        self.send(request).await
    }
}

#[async_trait]
impl TaskGateway for HttpGateway<Task> {
    async fn update_status(&self, id: &str, status: TaskStatus) -> GatewayResult<StatusResponse> {
        let request = self
            .with_user(self.client.patch(self.endpoint(&[Task::RESOURCE, id, "status"])))
            .query(&[("new_status", status.as_str())]);
        let response: StatusResponse = self.send(request).await?;
        ensure_success(response.success, None)?;
        Ok(response)
    }

    async fn create_task(&self, draft: &NewTask) -> GatewayResult<Task> {
        let body = CreateTaskRequest {
            task: draft,
            user_id: &self.user_id,
        };
        let request = self.client.post(self.endpoint(&[Task::RESOURCE])).json(&body);
        let created: CreatedTask = self.send(request).await?;
        Ok(match created {
            CreatedTask::Wrapped { task } | CreatedTask::Bare(task) => task,
        })
    }

    async fn update_task(&self, update: &TaskUpdate) -> GatewayResult<AckResponse> {
        let body = UpdateTaskRequest {
            update,
            user_id: &self.user_id,
        };
        let request = self.client.put(self.endpoint(&[Task::RESOURCE])).json(&body);
        let response: AckResponse = self.send(request).await?;
        ensure_success(response.success, response.message.as_deref())?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;

    fn gateway(base: &str) -> HttpGateway<Document> {
        HttpGateway::new(&RemoteConfig {
            base_url: base.to_string(),
            user_id: "u1".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let gw = gateway("http://localhost:8000/api/");
        let url = gw.endpoint(&["documents", "a b/c"]);
        assert_eq!(url.as_str(), "http://localhost:8000/api/documents/a%20b%2Fc");
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let gw = gateway("http://localhost:8000");
        assert_eq!(
            gw.endpoint(&["documents"]).as_str(),
            "http://localhost:8000/documents"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpGateway::<Document>::new(&RemoteConfig {
            base_url: "mailto:someone@example.com".into(),
            user_id: "u1".into(),
            timeout_secs: 5,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_error_message_from_body() {
        assert_eq!(
            error_message_from_body(r#"{"detail":"Task not found"}"#).as_deref(),
            Some("Task not found")
        );
        assert_eq!(
            error_message_from_body(r#"{"message":"Bad input"}"#).as_deref(),
            Some("Bad input")
        );
        assert_eq!(error_message_from_body("<html>oops</html>"), None);
        assert_eq!(error_message_from_body(r#"{"detail":null}"#), None);
    }
}
