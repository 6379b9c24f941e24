// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The provider HTTP client.
//!
//! Failure classification: network errors and HTTP 502/503/504 are transient
//! (the circuit breaker counts them); every other non-success status and any
//! `success: false` envelope is permanent. The classification is a field on
//! [`ProviderError`], never a parse of its message.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use drydock_core::traits::{
    CreateSandboxRequest, RestoreSandboxRequest, SandboxCreated, SnapshotInfo, SnapshotTaken,
};
use drydock_core::types::SnapshotReason;
use drydock_core::{ProviderError, SandboxProvider};
use drydock_crypto::mint_service_token;

use crate::types::{
    CreateSandboxBody, Envelope, RestoreSandboxBody, RestoreSessionConfig, SnapshotSandboxBody,
    WarmSandboxBody,
};

/// Typed wrapper over the sandbox compute service.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl ProviderClient {
    /// Create a client for the given provider endpoint.
    pub fn new(
        base_url: impl Into<String>,
        api_secret: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::permanent(format!("failed to build HTTP client: {e}"))
                    .with_source(e)
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret: api_secret.into(),
        })
    }

    /// Derive the URL for a provider operation.
    pub fn endpoint_url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation)
    }

    fn bearer(&self) -> String {
        mint_service_token(&self.api_secret, chrono::Utc::now().timestamp_millis())
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = self.endpoint_url(operation);
        debug!(%url, "provider request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bearer())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::transient(format!("provider request failed: {e}")).with_source(e)
            })?;
        Self::read_envelope(operation, response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = self.endpoint_url(operation);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| {
                ProviderError::transient(format!("provider request failed: {e}")).with_source(e)
            })?;
        Self::read_envelope(operation, response).await
    }

    async fn read_envelope<T: DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        Self::read_envelope_optional(operation, response)
            .await?
            .ok_or_else(|| {
                ProviderError::permanent(format!("{operation}: success envelope without data"))
            })
    }

    /// Like [`read_envelope`](Self::read_envelope) but `data: null` on a
    /// success envelope is a legitimate "nothing there" answer.
    async fn read_envelope_optional<T: DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<Option<T>, ProviderError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = format!("{operation} returned {status}: {body}");
            warn!(%status, operation, "provider call failed");
            return Err(if is_transient_status(status) {
                ProviderError::transient(message)
            } else {
                ProviderError::permanent(message)
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            ProviderError::permanent(format!("{operation} returned malformed body: {e}"))
        })?;

        if !envelope.success {
            let message = envelope
                .error
                .unwrap_or_else(|| "unspecified provider error".to_string());
            return Err(ProviderError::permanent(format!("{operation}: {message}")));
        }

        Ok(envelope.data)
    }
}

/// 502/503/504 are the provider's transient statuses; everything else is not
/// worth retrying.
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

#[async_trait]
impl SandboxProvider for ProviderClient {
    async fn create_sandbox(
        &self,
        req: &CreateSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError> {
        let body = CreateSandboxBody {
            session_id: req.session_id.clone(),
            sandbox_id: req.sandbox_id.clone(),
            repo_owner: req.repo_owner.clone(),
            repo_name: req.repo_name.clone(),
            control_plane_url: req.control_plane_url.clone(),
            sandbox_auth_token: req.sandbox_auth_token.clone(),
            snapshot_id: None,
            model: req.model.clone(),
            git_user_name: req.git_user.as_ref().and_then(|u| u.github_name.clone()),
            git_user_email: req.git_user.as_ref().and_then(|u| u.github_email.clone()),
        };
        self.post("create-sandbox", &body).await
    }

    async fn warm_sandbox(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<SandboxCreated, ProviderError> {
        let body = WarmSandboxBody {
            repo_owner: repo_owner.to_string(),
            repo_name: repo_name.to_string(),
            control_plane_url: String::new(),
        };
        self.post("warm-sandbox", &body).await
    }

    async fn snapshot_sandbox(
        &self,
        object_id: &str,
        session_id: &str,
        reason: SnapshotReason,
    ) -> Result<SnapshotTaken, ProviderError> {
        let body = SnapshotSandboxBody {
            sandbox_id: object_id.to_string(),
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        };
        self.post("snapshot-sandbox", &body).await
    }

    async fn restore_sandbox(
        &self,
        req: &RestoreSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError> {
        let body = RestoreSandboxBody {
            snapshot_image_id: req.snapshot_image_id.clone(),
            session_config: RestoreSessionConfig {
                session_id: req.session_id.clone(),
                repo_owner: req.repo_owner.clone(),
                repo_name: req.repo_name.clone(),
                model: req.model.clone(),
            },
            sandbox_id: req.sandbox_id.clone(),
            control_plane_url: req.control_plane_url.clone(),
            sandbox_auth_token: req.sandbox_auth_token.clone(),
        };
        self.post("restore-sandbox", &body).await
    }

    async fn latest_snapshot(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<Option<SnapshotInfo>, ProviderError> {
        let url = self.endpoint_url("snapshot");
        let response = self
            .http
            .get(&url)
            .query(&[("repo_owner", repo_owner), ("repo_name", repo_name)])
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|e| {
                ProviderError::transient(format!("provider request failed: {e}")).with_source(e)
            })?;
        Self::read_envelope_optional("snapshot", response).await
    }

    async fn health(&self) -> Result<(), ProviderError> {
        let _: serde_json::Value = self.get("health", &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::types::FailureKind;
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> ProviderClient {
        ProviderClient::new(base_url, "provider-secret", Duration::from_secs(5)).unwrap()
    }

    fn create_request() -> CreateSandboxRequest {
        CreateSandboxRequest {
            session_id: "s1".into(),
            sandbox_id: "sb1".into(),
            repo_owner: "acme".into(),
            repo_name: "widgets".into(),
            control_plane_url: "https://coord.example".into(),
            sandbox_auth_token: "tok".into(),
            model: "claude-sonnet-4-5".into(),
            git_user: None,
        }
    }

    #[tokio::test]
    async fn create_sandbox_returns_contract_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-sandbox"))
            .and(header_exists("authorization"))
            .and(body_partial_json(serde_json::json!({
                "sandbox_id": "sb1",
                "repo_owner": "acme"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "sandbox_id": "sb1",
                    "modal_object_id": "obj-99",
                    "status": "warming",
                    "created_at": 1700000000.0
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let created = client.create_sandbox(&create_request()).await.unwrap();
        assert_eq!(created.sandbox_id, "sb1");
        assert_eq!(created.object_id.as_deref(), Some("obj-99"));
        assert_eq!(created.status, "warming");
    }

    #[tokio::test]
    async fn gateway_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-sandbox"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.create_sandbox(&create_request()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-sandbox"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.create_sandbox(&create_request()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert!(err.message.contains("400"));
    }

    #[tokio::test]
    async fn failed_envelope_is_permanent_with_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/snapshot-sandbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "Sandbox not found: obj-1"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .snapshot_sandbox("obj-1", "s1", SnapshotReason::Manual)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert!(err.message.contains("Sandbox not found"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn snapshot_returns_image_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/snapshot-sandbox"))
            .and(body_partial_json(serde_json::json!({
                "sandbox_id": "obj-1",
                "reason": "execution_complete"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "image_id": "im-7" }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let snap = client
            .snapshot_sandbox("obj-1", "s1", SnapshotReason::ExecutionComplete)
            .await
            .unwrap();
        assert_eq!(snap.image_id, "im-7");
    }

    #[tokio::test]
    async fn restore_sends_snapshot_and_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/restore-sandbox"))
            .and(body_partial_json(serde_json::json!({
                "snapshot_image_id": "im-7",
                "session_config": { "session_id": "s1", "repo_owner": "acme" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "sandbox_id": "sb2", "status": "warming" }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let restored = client
            .restore_sandbox(&RestoreSandboxRequest {
                snapshot_image_id: "im-7".into(),
                session_id: "s1".into(),
                sandbox_id: "sb2".into(),
                repo_owner: "acme".into(),
                repo_name: "widgets".into(),
                control_plane_url: "https://coord.example".into(),
                sandbox_auth_token: "tok".into(),
                model: "claude-sonnet-4-5".into(),
            })
            .await
            .unwrap();
        assert_eq!(restored.sandbox_id, "sb2");
    }

    #[tokio::test]
    async fn latest_snapshot_handles_null_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot"))
            .and(query_param("repo_owner", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": null
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let latest = client.latest_snapshot("acme", "widgets").await.unwrap();
        // `data: null` on success means "no snapshot yet".
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn warm_sandbox_posts_repo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/warm-sandbox"))
            .and(body_partial_json(serde_json::json!({ "repo_owner": "acme" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "sandbox_id": "sb-warm", "status": "warming" }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let warmed = client.warm_sandbox("acme", "widgets").await.unwrap();
        assert_eq!(warmed.sandbox_id, "sb-warm");
    }
}
