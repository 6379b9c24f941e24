// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The WebSocket hub: fan-out to clients, the single sandbox socket, and
//! event ingestion.
//!
//! Socket senders are never cached on the actor. Clients are enumerated from
//! the registry at each broadcast and the sandbox socket is re-resolved by
//! tag on each send, so an evicted-and-resumed actor keeps working against
//! sockets the gateway still holds. Client identity is cached in memory and
//! recovered from the `ws_client_mapping` row when the cache is gone; a
//! socket with neither is closed with 4002.

use drydock_core::protocol::{
    ClientFrame, PresencePeer, SandboxEvent, ServerFrame, CLOSE_INVALID_AUTH, CLOSE_STATE_LOST,
};
use drydock_core::types::{EventType, GitSyncStatus, MessageSource, SandboxStatus};
use drydock_core::DrydockError;
use drydock_storage::{queries, Event, WsClientMapping};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{SocketEntry, SocketKind, SocketOutbound};
use crate::{new_id, now_ms, ClientIdentity, EnqueuePromptRequest, SessionCoordinator};

impl SessionCoordinator {
    /// Write a frame to every client socket of this session. Write failures
    /// close the offending socket and are otherwise swallowed.
    pub(crate) fn broadcast(&self, frame: &ServerFrame) {
        let text = match serde_json::to_string(frame) {
            Ok(t) => t,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "failed to serialize frame");
                return;
            }
        };
        for (ws_id, _) in self.deps.registry.clients(&self.session_id) {
            self.deps
                .registry
                .send(&ws_id, SocketOutbound::Frame(text.clone()));
        }
    }

    /// Write one frame to one socket.
    pub(crate) fn send_to_socket(&self, ws_id: &str, frame: &ServerFrame) {
        if let Ok(text) = serde_json::to_string(frame) {
            self.deps
                .registry
                .send(ws_id, SocketOutbound::Frame(text));
        }
    }

    /// Write a command to the currently-resolved sandbox socket. Returns
    /// `false` when no socket is available; the caller decides the policy.
    pub(crate) fn send_to_sandbox(&self, command: &drydock_core::protocol::SandboxCommand) -> bool {
        let Some(sandbox) = self.sandbox_ref() else {
            return false;
        };
        let Some((ws_id, _)) = self.deps.registry.sandbox(&self.session_id, &sandbox.id) else {
            return false;
        };
        match serde_json::to_string(command) {
            Ok(text) => self.deps.registry.send(&ws_id, SocketOutbound::Frame(text)),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "failed to serialize sandbox command");
                false
            }
        }
    }

    // --- client sockets ---

    pub(crate) fn on_client_socket_opened(
        &mut self,
        ws_id: String,
        sender: mpsc::Sender<SocketOutbound>,
    ) {
        self.deps.registry.insert(
            ws_id,
            SocketEntry {
                session_id: self.session_id.clone(),
                kind: SocketKind::Client,
                tag: None,
                sender,
            },
        );
    }

    /// Authenticate a client socket with its WS token. Idempotent for
    /// duplicate subscribes: the mapping row is re-asserted.
    pub(crate) async fn on_subscribe(
        &mut self,
        ws_id: &str,
        token: &str,
        client_id: &str,
    ) -> Result<(), DrydockError> {
        let hash = drydock_crypto::sha256_hex(token);
        let Some(participant) =
            queries::participants::get_by_ws_token_hash(&self.db, &hash).await?
        else {
            self.deps.registry.send(
                ws_id,
                SocketOutbound::Close {
                    code: CLOSE_INVALID_AUTH,
                    reason: "invalid auth token".to_string(),
                },
            );
            self.deps.registry.remove(ws_id);
            return Err(DrydockError::Unauthenticated(
                "invalid websocket token".to_string(),
            ));
        };

        queries::ws_clients::upsert_mapping(
            &self.db,
            &WsClientMapping {
                ws_id: ws_id.to_string(),
                participant_id: participant.id.clone(),
                client_id: client_id.to_string(),
                created_at: now_ms(),
            },
        )
        .await?;
        self.clients.insert(
            ws_id.to_string(),
            ClientIdentity {
                participant_id: participant.id.clone(),
                client_id: client_id.to_string(),
            },
        );
        self.record_activity().await?;

        let state = self.snapshot().await?;
        self.send_to_socket(
            ws_id,
            &ServerFrame::Subscribed {
                session_id: self.session_id.clone(),
                state: serde_json::to_value(&state)
                    .map_err(|e| DrydockError::Internal(format!("state serialization: {e}")))?,
                participant_id: participant.id.clone(),
                participant: serde_json::to_value(&participant).ok(),
            },
        );

        // Presence: the newcomer gets the roster, peers get the join.
        let peers: Vec<PresencePeer> = self
            .clients
            .iter()
            .map(|(_, identity)| PresencePeer {
                participant_id: identity.participant_id.clone(),
                client_id: identity.client_id.clone(),
            })
            .collect();
        self.send_to_socket(ws_id, &ServerFrame::PresenceSync { peers });
        let join = ServerFrame::PresenceUpdate {
            participant_id: participant.id,
            client_id: client_id.to_string(),
            status: "online".to_string(),
            cursor: None,
        };
        self.broadcast_except(ws_id, &join);

        info!(session_id = %self.session_id, ws_id, client_id, "client subscribed");
        Ok(())
    }

    fn broadcast_except(&self, excluded_ws_id: &str, frame: &ServerFrame) {
        let Ok(text) = serde_json::to_string(frame) else {
            return;
        };
        for (ws_id, _) in self.deps.registry.clients(&self.session_id) {
            if ws_id != excluded_ws_id {
                self.deps
                    .registry
                    .send(&ws_id, SocketOutbound::Frame(text.clone()));
            }
        }
    }

    /// Resolve who is behind a socket: the in-memory cache first, then the
    /// persisted mapping (hibernation recovery). `None` closes with 4002.
    async fn resolve_client(&mut self, ws_id: &str) -> Result<Option<ClientIdentity>, DrydockError> {
        if let Some(identity) = self.clients.get(ws_id) {
            return Ok(Some(identity.clone()));
        }
        if let Some(mapping) = queries::ws_clients::get_mapping(&self.db, ws_id).await? {
            let identity = ClientIdentity {
                participant_id: mapping.participant_id,
                client_id: mapping.client_id,
            };
            debug!(session_id = %self.session_id, ws_id, "client identity recovered from mapping");
            self.clients.insert(ws_id.to_string(), identity.clone());
            return Ok(Some(identity));
        }
        self.deps.registry.send(
            ws_id,
            SocketOutbound::Close {
                code: CLOSE_STATE_LOST,
                reason: "state lost, please reconnect".to_string(),
            },
        );
        self.deps.registry.remove(ws_id);
        Ok(None)
    }

    pub(crate) async fn on_client_frame(
        &mut self,
        ws_id: &str,
        frame: ClientFrame,
    ) -> Result<(), DrydockError> {
        // Subscribe carries its own credentials and must work on a socket
        // with no recoverable identity (first auth, and re-auth after 4002).
        if let ClientFrame::Subscribe { token, client_id } = &frame {
            return self.on_subscribe(ws_id, token, client_id).await;
        }

        let Some(identity) = self.resolve_client(ws_id).await? else {
            return Ok(());
        };

        match frame {
            // Pings are answered at the socket task without waking the actor.
            ClientFrame::Ping | ClientFrame::Subscribe { .. } => {}
            ClientFrame::Prompt {
                content,
                model,
                attachments,
            } => {
                let queued = self
                    .enqueue_prompt_for(
                        identity.participant_id.clone(),
                        EnqueuePromptRequest {
                            user_id: String::new(),
                            content,
                            source: MessageSource::Web,
                            model,
                            attachments,
                            callback_context: None,
                        },
                    )
                    .await?;
                self.send_to_socket(
                    ws_id,
                    &ServerFrame::PromptQueued {
                        message_id: queued.message_id,
                        position: queued.position,
                    },
                );
            }
            ClientFrame::Stop => {
                self.stop_execution().await?;
            }
            ClientFrame::Typing => {
                self.record_activity().await?;
                // Typing is the warm signal; failures are the warm path's
                // problem, never the client's.
                if let Err(e) = self.warm().await {
                    debug!(session_id = %self.session_id, error = %e, "warm on typing failed");
                }
            }
            ClientFrame::Presence { status, cursor } => {
                let update = ServerFrame::PresenceUpdate {
                    participant_id: identity.participant_id.clone(),
                    client_id: identity.client_id.clone(),
                    status,
                    cursor,
                };
                self.broadcast_except(ws_id, &update);
            }
        }
        Ok(())
    }

    pub(crate) async fn on_client_disconnected(&mut self, ws_id: &str) {
        self.deps.registry.remove(ws_id);
        let identity = self.clients.remove(ws_id);
        if let Err(e) = queries::ws_clients::delete_mapping(&self.db, ws_id).await {
            warn!(session_id = %self.session_id, ws_id, error = %e, "mapping cleanup failed");
        }
        if let Some(identity) = identity {
            self.broadcast(&ServerFrame::PresenceLeave {
                client_id: identity.client_id,
            });
        }
    }

    // --- the sandbox socket ---

    /// Attach the sandbox socket after upgrade. Exactly one logical sandbox
    /// socket exists; a newcomer supersedes the old one, which is closed
    /// with a normal 1000 and an explanatory reason.
    pub(crate) async fn on_sandbox_socket_opened(
        &mut self,
        ws_id: &str,
        token: &str,
        sandbox_id: &str,
        sender: mpsc::Sender<SocketOutbound>,
    ) -> Result<(), DrydockError> {
        self.validate_sandbox_credentials(token, sandbox_id)?;

        if let Some(old_ws_id) = self.deps.registry.any_sandbox(&self.session_id) {
            if old_ws_id != ws_id {
                info!(session_id = %self.session_id, old_ws_id, "superseding previous sandbox socket");
                self.deps.registry.send(
                    &old_ws_id,
                    SocketOutbound::Close {
                        code: 1000,
                        reason: "superseded by a new sandbox connection".to_string(),
                    },
                );
                self.deps.registry.remove(&old_ws_id);
            }
        }

        self.deps.registry.insert(
            ws_id,
            SocketEntry {
                session_id: self.session_id.clone(),
                kind: SocketKind::Sandbox,
                tag: Some(sandbox_id.to_string()),
                sender,
            },
        );

        let now = now_ms();
        if let Some(s) = self.sandbox.as_mut() {
            s.last_heartbeat = Some(now);
            s.last_activity = Some(now);
        }
        queries::sandbox::set_last_heartbeat(&self.db, now).await?;
        queries::sandbox::set_last_activity(&self.db, now).await?;
        self.connect_deadline_ms = None;

        self.set_sandbox_status(SandboxStatus::Ready).await?;
        self.broadcast(&ServerFrame::SandboxReady);
        info!(session_id = %self.session_id, sandbox_id, "sandbox connected");

        self.process_next().await?;
        Ok(())
    }

    pub(crate) fn on_sandbox_disconnected(&mut self, ws_id: &str) {
        if self.deps.registry.remove(ws_id).is_some() {
            debug!(session_id = %self.session_id, ws_id, "sandbox socket closed");
        }
        // Status is left alone: heartbeat loss will mark it stale, and a
        // reconnecting bridge restores it to ready.
    }

    /// Ingest one event from the sandbox stream: persist in arrival order,
    /// update lifecycle state, and fan out.
    pub(crate) async fn on_sandbox_event(
        &mut self,
        event: SandboxEvent,
    ) -> Result<(), DrydockError> {
        self.record_activity().await?;

        match &event {
            SandboxEvent::Ready {
                agent_session_id, ..
            } => {
                if let Some(agent_id) = agent_session_id {
                    queries::session::set_agent_session_id(&self.db, agent_id, now_ms()).await?;
                    self.session.agent_session_id = Some(agent_id.clone());
                }
                return Ok(());
            }
            SandboxEvent::Heartbeat { .. } => {
                let now = now_ms();
                if let Some(s) = self.sandbox.as_mut() {
                    s.last_heartbeat = Some(now);
                }
                queries::sandbox::set_last_heartbeat(&self.db, now).await?;
                if self
                    .sandbox_ref()
                    .map(|s| s.status == SandboxStatus::Stale)
                    .unwrap_or(false)
                {
                    info!(session_id = %self.session_id, "heartbeat from stale sandbox, back to ready");
                    self.set_sandbox_status(SandboxStatus::Ready).await?;
                    self.process_next().await?;
                }
                // Heartbeats are persisted for diagnosis but not fanned out.
                self.persist_event(&event, EventType::Heartbeat).await?;
                return Ok(());
            }
            _ => {}
        }

        let event_type = match &event {
            SandboxEvent::Token { .. } => EventType::Token,
            SandboxEvent::ToolCall { .. } => EventType::ToolCall,
            SandboxEvent::ToolResult { .. } => EventType::ToolResult,
            SandboxEvent::GitSync { .. } => EventType::GitSync,
            SandboxEvent::ExecutionComplete { .. } => EventType::ExecutionComplete,
            SandboxEvent::Artifact { .. } => EventType::Artifact,
            SandboxEvent::PushComplete { .. } => EventType::PushComplete,
            SandboxEvent::PushError { .. } => EventType::PushError,
            SandboxEvent::Error { .. } => EventType::Error,
            SandboxEvent::Ready { .. } | SandboxEvent::Heartbeat { .. } => unreachable!(),
        };
        let stored = self.persist_event(&event, event_type).await?;
        self.broadcast(&ServerFrame::SandboxEvent {
            event: event_envelope(&stored),
        });

        match event {
            SandboxEvent::GitSync { status, sha } => {
                queries::sandbox::set_git_sync_status(&self.db, status).await?;
                if let Some(s) = self.sandbox.as_mut() {
                    s.git_sync_status = status;
                }
                if let Some(sha) = sha {
                    queries::session::set_current_sha(&self.db, &sha, now_ms()).await?;
                    if self.session.base_sha.is_none() {
                        self.session.base_sha = Some(sha.clone());
                    }
                    self.session.current_sha = Some(sha);
                }
                // An in-progress sync parks prompt dispatch until it lands.
                let current = self.sandbox_ref().map(|s| s.status);
                if status == GitSyncStatus::InProgress && current == Some(SandboxStatus::Ready) {
                    self.set_sandbox_status(SandboxStatus::Syncing).await?;
                } else if status == GitSyncStatus::Completed
                    && current == Some(SandboxStatus::Syncing)
                {
                    self.set_sandbox_status(SandboxStatus::Ready).await?;
                    self.process_next().await?;
                }
            }
            SandboxEvent::ExecutionComplete {
                message_id,
                success,
                ..
            } => {
                self.on_execution_complete(&message_id, success).await?;
            }
            SandboxEvent::Artifact {
                artifact_type,
                url,
                metadata,
            } => {
                let artifact = drydock_storage::Artifact {
                    id: new_id(),
                    artifact_type,
                    url,
                    metadata: metadata.map(|m| m.to_string()),
                    created_at: now_ms(),
                };
                queries::artifacts::insert_artifact(&self.db, &artifact).await?;
                self.broadcast(&ServerFrame::ArtifactCreated {
                    artifact: serde_json::to_value(&artifact)
                        .unwrap_or(serde_json::Value::Null),
                });
            }
            SandboxEvent::PushComplete { branch_name } => {
                self.on_push_complete(&branch_name).await?;
            }
            SandboxEvent::PushError { branch_name, error } => {
                self.on_push_error(branch_name.as_deref(), &error);
            }
            _ => {}
        }
        Ok(())
    }

    /// Persist an event row. The event's explicit message id wins over the
    /// ambient processing message; the ambient value is only a fallback.
    async fn persist_event(
        &mut self,
        event: &SandboxEvent,
        event_type: EventType,
    ) -> Result<Event, DrydockError> {
        let message_id = match event.message_id() {
            Some(explicit) => Some(explicit.to_string()),
            None => queries::messages::peek_processing(&self.db)
                .await?
                .map(|m| m.id),
        };
        let row = Event {
            id: new_id(),
            event_type,
            payload: serde_json::to_string(event)
                .map_err(|e| DrydockError::Internal(format!("event serialization: {e}")))?,
            message_id,
            created_at: now_ms(),
        };
        queries::events::insert_event(&self.db, &row).await?;
        Ok(row)
    }
}

/// The wire shape of a persisted event, used both for `sandbox_event`
/// broadcasts and the events listing.
pub fn event_envelope(event: &Event) -> serde_json::Value {
    serde_json::json!({
        "id": event.id,
        "type": event.event_type,
        "payload": serde_json::from_str::<serde_json::Value>(&event.payload)
            .unwrap_or(serde_json::Value::Null),
        "messageId": event.message_id,
        "createdAt": event.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_has_wire_keys() {
        let event = Event {
            id: "e1".into(),
            event_type: EventType::Token,
            payload: r#"{"type":"token","content":"hi","messageId":"m1"}"#.into(),
            message_id: Some("m1".into()),
            created_at: 42,
        };
        let value = event_envelope(&event);
        assert_eq!(value["id"], "e1");
        assert_eq!(value["type"], "token");
        assert_eq!(value["messageId"], "m1");
        assert_eq!(value["createdAt"], 42);
        assert_eq!(value["payload"]["content"], "hi");
    }
}
