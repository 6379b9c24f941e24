// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push and PR orchestration.
//!
//! Push is a request/response dance over the otherwise one-way sandbox event
//! channel: the request is identified by a branch name, completion comes
//! back as a first-class `push_complete`/`push_error` event, and the pending
//! map is cleaned on every resolution path including the timer. Branch keys
//! are trimmed and lowercased to tolerate case/whitespace variation in the
//! event payload.
//!
//! Identity split: the short-lived installation token travels to the sandbox
//! for the push only; the PR itself is authored with the prompting user's
//! own token, which never reaches the sandbox.

use drydock_core::protocol::{SandboxCommand, ServerFrame};
use drydock_core::traits::CreatePullRequest;
use drydock_core::DrydockError;
use drydock_storage::queries;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::{new_id, now_ms, Command, PrCreated, PrOrigin, SessionCoordinator};

/// An in-flight push awaiting its completion event. Volatile by design:
/// actor eviction fails these fast and the caller retries.
pub(crate) struct PendingPush {
    pub reply: oneshot::Sender<Result<PrCreated, DrydockError>>,
    /// Decrypted prompting-user token, held only for the PR-create step.
    pub user_token: String,
    pub branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
}

/// Deterministic branch for a session: prefix plus the first 12 hex chars of
/// the session id.
pub fn branch_name_for_session(prefix: &str, session_id: &str) -> String {
    let short = &session_id[..session_id.len().min(12)];
    format!("{prefix}/{short}")
}

/// Correlation key for the pending-push map.
pub fn normalize_branch_key(branch: &str) -> String {
    branch.trim().to_lowercase()
}

/// PR title: first line of the prompt, truncated.
fn pr_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let mut title: String = first_line.chars().take(72).collect();
    if title.is_empty() {
        title = "Automated change".to_string();
    }
    title
}

impl SessionCoordinator {
    /// Start PR creation. On success the reply is parked in the pending-push
    /// map; on any precondition failure it is answered immediately.
    pub(crate) async fn begin_create_pr(
        &mut self,
        origin: PrOrigin,
        reply: oneshot::Sender<Result<PrCreated, DrydockError>>,
    ) -> Result<(), DrydockError> {
        match self.prepare_push(origin).await {
            Ok(pending) => {
                let key = normalize_branch_key(&pending.branch);
                let timeout_secs = self.cfg().lifecycle.push_timeout_secs;
                self.pending_pushes.insert(
                    key.clone(),
                    PendingPush {
                        reply,
                        ..pending
                    },
                );

                let self_tx = self.self_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_secs(timeout_secs)).await;
                    let _ = self_tx.send(Command::PushTimeout { key }).await;
                });
                Ok(())
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                Ok(())
            }
        }
    }

    /// Validate preconditions, mint tokens, and send the push command.
    /// Returns the pending entry (with a placeholder reply) ready to park.
    async fn prepare_push(&mut self, origin: PrOrigin) -> Result<PendingPush, DrydockError> {
        if let PrOrigin::SandboxToken(token) = &origin {
            let sandbox_id = self
                .sandbox_ref()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            self.validate_sandbox_credentials(token, &sandbox_id)?;
        }

        // The prompting user is the author of the message in flight.
        let processing = queries::messages::peek_processing(&self.db)
            .await?
            .ok_or_else(|| {
                DrydockError::Logical("no message is currently processing".to_string())
            })?;
        let author = queries::participants::get_participant(&self.db, &processing.author_id)
            .await?
            .ok_or_else(|| {
                DrydockError::Internal("processing message has no author".to_string())
            })?;

        let sealed = author.access_token_sealed.as_deref().ok_or_else(|| {
            DrydockError::Unauthenticated(
                "authentication required: prompting user has no linked access token".to_string(),
            )
        })?;
        if let Some(expires_at) = author.token_expires_at {
            if expires_at <= now_ms() {
                return Err(DrydockError::Unauthenticated(
                    "authentication required: prompting user's access token expired".to_string(),
                ));
            }
        }
        let user_token = self.open_access_token(sealed)?;

        let repo = self
            .deps
            .repo_host
            .repository(
                &self.session.repo_owner,
                &self.session.repo_name,
                &user_token,
            )
            .await?;
        queries::session::set_repo_default_branch(&self.db, &repo.default_branch, now_ms())
            .await?;
        self.session.repo_default_branch = Some(repo.default_branch.clone());

        // Installation token: broad and short-lived, for the push step only.
        let installation = self.deps.repo_host.installation_token().await?;

        let branch = branch_name_for_session("drydock", &self.session_id);
        let key = normalize_branch_key(&branch);
        if self.pending_pushes.contains_key(&key) {
            return Err(DrydockError::Logical(format!(
                "a push for branch {branch} is already in flight"
            )));
        }

        let sent = self.send_to_sandbox(&SandboxCommand::Push {
            branch_name: branch.clone(),
            repo_owner: self.session.repo_owner.clone(),
            repo_name: self.session.repo_name.clone(),
            github_token: Some(installation.token),
        });
        if !sent {
            return Err(DrydockError::Internal(
                "sandbox is not connected, cannot push".to_string(),
            ));
        }
        info!(session_id = %self.session_id, branch = %branch, "push command sent");

        let (placeholder, _) = oneshot::channel();
        Ok(PendingPush {
            reply: placeholder,
            user_token,
            branch,
            base_branch: repo.default_branch,
            title: pr_title(&processing.content),
            body: processing.content,
        })
    }

    /// The sandbox pushed the branch: create the PR as the prompting user,
    /// persist the artifact, and resolve the caller.
    pub(crate) async fn on_push_complete(&mut self, branch_name: &str) -> Result<(), DrydockError> {
        let key = normalize_branch_key(branch_name);
        let Some(pending) = self.pending_pushes.remove(&key) else {
            warn!(session_id = %self.session_id, branch_name, "push_complete with no pending push");
            return Ok(());
        };

        let result = self
            .deps
            .repo_host
            .create_pull_request(
                &CreatePullRequest {
                    repo_owner: self.session.repo_owner.clone(),
                    repo_name: self.session.repo_name.clone(),
                    title: pending.title.clone(),
                    body: pending.body.clone(),
                    head: pending.branch.clone(),
                    base: pending.base_branch.clone(),
                },
                &pending.user_token,
            )
            .await;

        match result {
            Ok(pr) => {
                let now = now_ms();
                let artifact = drydock_storage::Artifact {
                    id: new_id(),
                    artifact_type: "pull_request".to_string(),
                    url: pr.html_url.clone(),
                    metadata: Some(
                        serde_json::json!({
                            "number": pr.number,
                            "branch": pending.branch,
                        })
                        .to_string(),
                    ),
                    created_at: now,
                };
                queries::artifacts::insert_artifact(&self.db, &artifact).await?;
                queries::session::set_branch_name(&self.db, &pending.branch, now).await?;
                self.session.branch_name = Some(pending.branch.clone());

                self.broadcast(&ServerFrame::ArtifactCreated {
                    artifact: serde_json::to_value(&artifact).unwrap_or(serde_json::Value::Null),
                });
                info!(session_id = %self.session_id, url = %pr.html_url, "pull request created");

                let _ = pending.reply.send(Ok(PrCreated {
                    url: pr.html_url,
                    number: pr.number,
                    branch: pending.branch,
                }));
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "PR creation after push failed");
                let _ = pending.reply.send(Err(e));
            }
        }
        Ok(())
    }

    /// The sandbox reported a push failure: reject the caller.
    pub(crate) fn on_push_error(&mut self, branch_name: Option<&str>, error: &str) {
        let key = branch_name.map(normalize_branch_key);
        let Some(key) = key else {
            warn!(session_id = %self.session_id, error, "push_error without a branch, cannot correlate");
            return;
        };
        if let Some(pending) = self.pending_pushes.remove(&key) {
            let _ = pending.reply.send(Err(DrydockError::Internal(format!(
                "Failed to push branch {}: {error}",
                pending.branch
            ))));
        } else {
            warn!(session_id = %self.session_id, branch = %key, error, "push_error with no pending push");
        }
    }

    /// Timer expiry: if the entry is still there, the sandbox never answered.
    pub(crate) fn on_push_timeout(&mut self, key: &str) {
        if let Some(pending) = self.pending_pushes.remove(key) {
            let secs = self.cfg().lifecycle.push_timeout_secs;
            warn!(session_id = %self.session_id, branch = %pending.branch, "push timed out");
            let _ = pending.reply.send(Err(DrydockError::Internal(format!(
                "Failed to push branch: {} timed out after {secs}s",
                pending.branch
            ))));
        }
    }

    /// Eviction path: nothing in this map survives the actor.
    pub(crate) fn fail_all_pending_pushes(&mut self, reason: &str) {
        for (_, pending) in self.pending_pushes.drain() {
            let _ = pending
                .reply
                .send(Err(DrydockError::Internal(reason.to_string())));
        }
    }
}
