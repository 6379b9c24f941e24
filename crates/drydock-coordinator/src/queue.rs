// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The prompt FIFO.
//!
//! At most one message is ever `processing`; promotion is oldest-pending
//! first. A prompt with no usable sandbox stays `pending` and triggers a
//! spawn instead; the engine is re-entered when the sandbox becomes ready
//! (socket attach, git sync completion, snapshot completion).

use drydock_core::protocol::{SandboxCommand, ServerFrame};
use drydock_core::types::{MessageStatus, PromptAuthor, SandboxStatus};
use drydock_core::DrydockError;
use drydock_storage::{queries, Message};
use tracing::{debug, info, warn};

use crate::{new_id, now_ms, EnqueuePromptRequest, PromptQueued, SessionCoordinator};

impl SessionCoordinator {
    /// Durably enqueue a prompt, report its 1-based position, and kick
    /// processing. The caller's response is sent only after the insert has
    /// committed.
    pub(crate) async fn enqueue_prompt(
        &mut self,
        req: EnqueuePromptRequest,
    ) -> Result<PromptQueued, DrydockError> {
        if req.content.trim().is_empty() {
            return Err(DrydockError::InvalidInput(
                "prompt content must not be empty".to_string(),
            ));
        }
        let author = queries::participants::get_by_user_id(&self.db, &req.user_id)
            .await?
            .ok_or_else(|| {
                DrydockError::NotFound(format!("participant not found: {}", req.user_id))
            })?;
        self.enqueue_prompt_for(author.id, req).await
    }

    /// Enqueue with a resolved author (the WebSocket path already knows its
    /// participant).
    pub(crate) async fn enqueue_prompt_for(
        &mut self,
        author_id: String,
        req: EnqueuePromptRequest,
    ) -> Result<PromptQueued, DrydockError> {
        let now = now_ms();
        let message = Message {
            id: new_id(),
            author_id,
            content: req.content,
            source: req.source,
            model: req.model,
            attachments: req
                .attachments
                .as_ref()
                .map(|a| a.to_string()),
            callback_context: req.callback_context.as_ref().map(|c| c.to_string()),
            status: MessageStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        queries::messages::insert_message(&self.db, &message).await?;
        let position = queries::messages::pending_or_processing_count(&self.db).await?;
        info!(
            session_id = %self.session_id,
            message_id = %message.id,
            position,
            "prompt enqueued"
        );

        self.record_activity().await?;
        self.process_next().await?;

        Ok(PromptQueued {
            message_id: message.id,
            position,
        })
    }

    /// Promote the oldest pending message if nothing is in flight and the
    /// sandbox can take it. Without a usable sandbox this triggers a spawn
    /// and returns; the message stays `pending`.
    pub(crate) async fn process_next(&mut self) -> Result<(), DrydockError> {
        if queries::messages::peek_processing(&self.db).await?.is_some() {
            return Ok(());
        }
        let Some(next) = queries::messages::oldest_pending(&self.db).await? else {
            return Ok(());
        };

        let sandbox_ready = self
            .sandbox_ref()
            .map(|s| s.status == SandboxStatus::Ready)
            .unwrap_or(false);
        let socket_available = self
            .sandbox_ref()
            .and_then(|s| self.deps.registry.sandbox(&self.session_id, &s.id))
            .is_some();

        if !sandbox_ready || !socket_available {
            debug!(
                session_id = %self.session_id,
                message_id = %next.id,
                sandbox_ready,
                socket_available,
                "no usable sandbox, ensuring spawn"
            );
            self.ensure_sandbox_for_prompt().await?;
            return Ok(());
        }

        if !queries::messages::mark_processing(&self.db, &next.id, now_ms()).await? {
            return Ok(());
        }

        let author = queries::participants::get_participant(&self.db, &next.author_id).await?;
        let command = SandboxCommand::Prompt {
            message_id: next.id.clone(),
            content: next.content.clone(),
            model: next
                .model
                .clone()
                .unwrap_or_else(|| self.session.model.clone()),
            author: author
                .map(|p| PromptAuthor {
                    github_login: p.github_login,
                    github_name: p.github_name,
                    github_email: p.github_email,
                })
                .unwrap_or_default(),
            attachments: next
                .attachments
                .as_ref()
                .and_then(|a| serde_json::from_str(a).ok()),
        };

        if !self.send_to_sandbox(&command) {
            // The socket died between the check and the send. The message is
            // already processing; fail it so the queue does not wedge.
            warn!(session_id = %self.session_id, message_id = %next.id, "sandbox socket vanished before dispatch");
            queries::messages::complete(&self.db, &next.id, false, now_ms()).await?;
            self.ensure_sandbox_for_prompt().await?;
            return Ok(());
        }

        info!(session_id = %self.session_id, message_id = %next.id, "prompt dispatched");
        self.set_sandbox_status(SandboxStatus::Running).await?;
        self.broadcast(&ServerFrame::ProcessingStatus {
            is_processing: true,
        });
        Ok(())
    }

    /// Completion of the in-flight execution, driven by the sandbox's
    /// `execution_complete` event. The event's own message id has strict
    /// priority over the ambient processing message.
    pub(crate) async fn on_execution_complete(
        &mut self,
        message_id: &str,
        success: bool,
    ) -> Result<(), DrydockError> {
        let changed = queries::messages::complete(&self.db, message_id, success, now_ms()).await?;
        if !changed {
            debug!(
                session_id = %self.session_id,
                message_id,
                "execution_complete for a message not in processing, ignoring"
            );
        }
        info!(session_id = %self.session_id, message_id, success, "execution complete");

        self.broadcast(&ServerFrame::ProcessingStatus {
            is_processing: false,
        });
        if self
            .sandbox_ref()
            .map(|s| s.status == SandboxStatus::Running)
            .unwrap_or(false)
        {
            self.set_sandbox_status(SandboxStatus::Ready).await?;
        }

        // Snapshot on completion; promotion resumes once it lands.
        self.trigger_snapshot(drydock_core::types::SnapshotReason::ExecutionComplete)
            .await?;
        self.process_next().await?;
        Ok(())
    }

    /// Forward a stop to the sandbox. With nothing running this is a no-op;
    /// message state only changes on the resulting `execution_complete`.
    pub(crate) async fn stop_execution(&mut self) -> Result<(), DrydockError> {
        let Some(_processing) = queries::messages::peek_processing(&self.db).await? else {
            debug!(session_id = %self.session_id, "stop with no running message, no-op");
            return Ok(());
        };
        if !self.send_to_sandbox(&SandboxCommand::Stop) {
            warn!(session_id = %self.session_id, "stop requested but sandbox is not connected");
        }
        self.record_activity().await?;
        Ok(())
    }
}
