// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits seaming the external collaborators.
//!
//! The coordinator only ever talks to the sandbox compute service and the
//! version-control host through these traits; the HTTP clients live in
//! `drydock-provider` and `drydock-github`, and the test harness substitutes
//! in-memory mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DrydockError, ProviderError};
use crate::types::{PromptAuthor, SnapshotReason};

/// Parameters for creating a cold sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSandboxRequest {
    pub session_id: String,
    /// Coordinator-issued sandbox id; the bridge presents it in `X-Sandbox-ID`.
    pub sandbox_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub control_plane_url: String,
    pub sandbox_auth_token: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user: Option<PromptAuthor>,
}

/// Parameters for restoring a sandbox from a filesystem snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSandboxRequest {
    pub snapshot_image_id: String,
    pub session_id: String,
    pub sandbox_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub control_plane_url: String,
    pub sandbox_auth_token: String,
    pub model: String,
}

/// Result of a create or restore call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxCreated {
    pub sandbox_id: String,
    /// The provider's internal id, required for snapshot calls.
    #[serde(alias = "modal_object_id")]
    pub object_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Result of a snapshot call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTaken {
    pub image_id: String,
}

/// Latest stored snapshot for a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub image_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// The external sandbox compute service.
///
/// Implementations classify every failure as transient or permanent via
/// [`ProviderError::kind`]; the lifecycle manager never inspects messages.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create_sandbox(
        &self,
        req: &CreateSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError>;

    /// Best-effort prefetch of a sandbox for a repository.
    async fn warm_sandbox(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<SandboxCreated, ProviderError>;

    /// Take a filesystem snapshot of a running sandbox by provider object id.
    async fn snapshot_sandbox(
        &self,
        object_id: &str,
        session_id: &str,
        reason: SnapshotReason,
    ) -> Result<SnapshotTaken, ProviderError>;

    async fn restore_sandbox(
        &self,
        req: &RestoreSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError>;

    /// Latest snapshot stored for a repository, if any.
    async fn latest_snapshot(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<Option<SnapshotInfo>, ProviderError>;

    async fn health(&self) -> Result<(), ProviderError>;
}

/// Repository metadata from the version-control host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub default_branch: String,
}

/// A short-lived installation-scoped token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Parameters for PR creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePullRequest {
    pub repo_owner: String,
    pub repo_name: String,
    pub title: String,
    pub body: String,
    /// Head branch (the pushed session branch).
    pub head: String,
    /// Base branch (the repository default branch).
    pub base: String,
}

/// A created pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub html_url: String,
}

/// The version-control host.
///
/// Dual identity by design: `installation_token` mints the broad, short-lived
/// token used only for the push step; PR authorship always uses the prompting
/// user's own token passed to `create_pull_request`.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Fetch repository metadata with a user-scoped token.
    async fn repository(
        &self,
        owner: &str,
        repo: &str,
        user_token: &str,
    ) -> Result<Repository, DrydockError>;

    /// Mint an installation-scoped token via the signed app JWT exchange.
    async fn installation_token(&self) -> Result<InstallationToken, DrydockError>;

    /// Create a pull request authored by the prompting user.
    async fn create_pull_request(
        &self,
        req: &CreatePullRequest,
        user_token: &str,
    ) -> Result<PullRequest, DrydockError>;
}
