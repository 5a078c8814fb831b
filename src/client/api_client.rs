//! # Claims API Client
//!
//! `RemoteApi` over the dashboard's REST endpoints.
//!
//! ## Requests
//!
//! - create: `POST {base}/api/{collection}`
//! - update: `PATCH {base}/api/{collection}/{id}` with `If-Match`
//! - delete: `DELETE {base}/api/{collection}/{id}` with `If-Match`
//!
//! Every request carries `Idempotency-Key: <mutation id>`.
//!
//! ## Responses
//!
//! - 2xx: applied; the new version comes from `ETag`, else from the body's
//!   `version` or `updatedAt`
//! - 404 on delete: applied (already gone)
//! - 409, 412: conflict; the body holds the server's current record, either
//!   bare or wrapped as `{ success: false, error: { details: { current } } }`
//! - 408, 429, 5xx, network errors, timeouts: retryable
//! - any other 4xx: permanent rejection

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, ETAG, IF_MATCH};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::client::config::Config;
use crate::client::sync::transport::{ApplyOutcome, RemoteApi, TransportError};
use crate::shared::conflict::ServerSnapshot;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::mutation::{MutationIntent, OperationKind};

pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
pub const HEALTH_PATH: &str = "/api/health";

/// HTTP implementation of [`RemoteApi`]
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    config: Config,
    client: Client,
}

impl HttpRemoteApi {
    pub fn new(config: Config) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.sync().request_timeout)
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, intent: &MutationIntent) -> (Method, String) {
        let collection = intent.entity.collection();
        match intent.operation {
            OperationKind::Create => (Method::POST, self.config.api_url(&format!("/api/{}", collection))),
            OperationKind::Update => (
                Method::PATCH,
                self.config.api_url(&format!("/api/{}/{}", collection, intent.entity_id)),
            ),
            OperationKind::Delete => (
                Method::DELETE,
                self.config.api_url(&format!("/api/{}/{}", collection, intent.entity_id)),
            ),
        }
    }

    fn build_request(&self, intent: &MutationIntent) -> reqwest::RequestBuilder {
        let (method, url) = self.endpoint(intent);
        let mut request = self
            .client
            .request(method, url)
            .header(IDEMPOTENCY_KEY, intent.id.to_string());

        if let Some(token) = self.config.get_token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if intent.operation != OperationKind::Create {
            if let Some(version) = &intent.base_version {
                request = request.header(IF_MATCH, format!("\"{}\"", version));
            }
        }

        match intent.operation {
            OperationKind::Create | OperationKind::Update => request.json(&intent.payload),
            OperationKind::Delete => request,
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn apply(&self, intent: &MutationIntent) -> Result<ApplyOutcome, TransportError> {
        let response = self.build_request(intent).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::network(format!("request timed out: {}", e))
            } else {
                TransportError::network(format!("network error: {}", e))
            }
        })?;

        let status = response.status();
        let etag = version_from_headers(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("failed to read response: {}", e)))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        tracing::debug!(
            mutation_id = %intent.id,
            status = status.as_u16(),
            "Remote API responded"
        );

        if status.is_success() {
            let version = etag.or_else(|| version_from_body(unwrap_data(&body)));
            return Ok(ApplyOutcome::Applied { version });
        }

        match status {
            StatusCode::NOT_FOUND if intent.operation == OperationKind::Delete => {
                Ok(ApplyOutcome::Applied { version: None })
            }
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                let current = current_from_conflict(body);
                let version = etag.or_else(|| version_from_body(&current));
                Ok(ApplyOutcome::Conflict(ServerSnapshot { version, body: current }))
            }
            _ => {
                let message = error_message(&body)
                    .or_else(|| (!text.is_empty()).then(|| text.clone()))
                    .unwrap_or_else(|| status.to_string());
                Err(TransportError::from_status(status.as_u16(), message))
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(self.config.api_url(HEALTH_PATH))
            .send()
            .await
            .is_ok()
    }
}

/// Strong or weak `ETag`, unquoted
fn version_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(ETAG)?.to_str().ok()?;
    let version = raw.trim().trim_start_matches("W/").trim_matches('"');
    (!version.is_empty()).then(|| version.to_string())
}

fn version_from_body(body: &Value) -> Option<String> {
    ["version", "updatedAt"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// `{ success: true, data: {...} }` → the inner record
fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if data.is_object() => data,
        _ => body,
    }
}

fn current_from_conflict(body: Value) -> Value {
    if let Some(current) = body.pointer("/error/details/current") {
        return current.clone();
    }
    if let Some(current) = body.get("current") {
        return current.clone();
    }
    match body {
        Value::Object(ref map) if map.get("success") == Some(&Value::Bool(false)) => Value::Null,
        other => unwrap_data(&other).clone(),
    }
}

/// `error` as a string, `error.message`, or a top-level `message`
fn error_message(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(message)) => return Some(message.clone()),
        Some(error) => {
            if let Some(Value::String(message)) = error.get("message") {
                return Some(message.clone());
            }
        }
        None => {}
    }
    body.get("message").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_version_from_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("W/\"17\""));
        assert_eq!(version_from_headers(&headers), Some("17".to_string()));

        headers.insert(ETAG, HeaderValue::from_static("\"\""));
        assert_eq!(version_from_headers(&headers), None);
    }

    #[test]
    fn test_version_from_body() {
        assert_eq!(version_from_body(&json!({ "version": 4 })), Some("4".to_string()));
        assert_eq!(
            version_from_body(&json!({ "updatedAt": "2024-05-01T10:00:00Z" })),
            Some("2024-05-01T10:00:00Z".to_string())
        );
        assert_eq!(version_from_body(&json!({ "id": "C1" })), None);
    }

    #[test]
    fn test_conflict_envelope_is_unwrapped() {
        let body = json!({
            "success": false,
            "error": {
                "message": "Version mismatch",
                "code": "VERSION_CONFLICT",
                "details": { "current": { "id": "C1", "version": 5 } }
            }
        });
        assert_eq!(current_from_conflict(body), json!({ "id": "C1", "version": 5 }));
        assert_eq!(current_from_conflict(json!({ "id": "C1" })), json!({ "id": "C1" }));
        assert_eq!(
            current_from_conflict(json!({ "success": false, "error": "stale" })),
            Value::Null
        );
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!({ "error": "Claim not found" })), Some("Claim not found".to_string()));
        assert_eq!(
            error_message(&json!({ "error": { "message": "Invalid amount", "code": "VALIDATION" } })),
            Some("Invalid amount".to_string())
        );
        assert_eq!(error_message(&json!({ "message": "Failed" })), Some("Failed".to_string()));
        assert_eq!(error_message(&Value::Null), None);
    }
}
