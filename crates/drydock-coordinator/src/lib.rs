// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session coordinator actor.
//!
//! One [`SessionCoordinator`] exists per session, owns the session's SQLite
//! store exclusively, and processes exactly one command at a time from its
//! mailbox; the handlers are written as if single-threaded because they are.
//! Parallelism across sessions comes from the [`router::CoordinatorRouter`]
//! spawning independent actors.
//!
//! The actor is built to be evicted: everything in memory (client identity
//! cache, pending-push resolvers, deadlines) is either reloadable from the
//! store or deliberately volatile. Sockets live in the gateway-held
//! [`registry::SocketRegistry`] and are re-resolved by tag on every use.

pub mod hub;
pub mod lifecycle;
pub mod push;
pub mod queue;
pub mod registry;
pub mod router;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use drydock_config::DrydockConfig;
use drydock_core::protocol::{ClientFrame, SandboxEvent};
use drydock_core::types::{
    GitSyncStatus, MessageSource, MessageStatus, ParticipantRole, SandboxStatus, SessionStatus,
    SnapshotReason,
};
use drydock_core::{DrydockError, EventType, RepoHost, SandboxProvider};
use drydock_crypto::TokenKey;
use drydock_storage::{queries, Artifact, Database, Event, Message, Participant, Sandbox, Session, SessionIndex};

use crate::lifecycle::CircuitBreaker;
use crate::push::PendingPush;

pub use hub::event_envelope;
pub use registry::{SocketEntry, SocketKind, SocketOutbound, SocketRegistry};
pub use router::{CoordinatorRouter, CreateSessionParams};

/// Current wall-clock in integer milliseconds since epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A fresh 128-bit random id as 32 lowercase hex chars.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

type Reply<T> = oneshot::Sender<Result<T, DrydockError>>;

/// Everything a session actor needs besides its own store.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub cfg: Arc<DrydockConfig>,
    pub provider: Arc<dyn SandboxProvider>,
    pub repo_host: Arc<dyn RepoHost>,
    pub registry: SocketRegistry,
    pub index: Arc<SessionIndex>,
    pub token_key: Option<TokenKey>,
}

/// Point-in-time public view of a session, sent in `subscribed.state` and
/// returned by the full-state route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: Session,
    pub sandbox_status: Option<SandboxStatus>,
    pub git_sync_status: Option<GitSyncStatus>,
    pub is_processing: bool,
    pub queue_length: i64,
    pub connected_clients: usize,
}

/// A participant to create or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSpec {
    pub user_id: String,
    #[serde(default)]
    pub github_user_id: Option<String>,
    #[serde(default)]
    pub github_login: Option<String>,
    #[serde(default)]
    pub github_name: Option<String>,
    #[serde(default)]
    pub github_email: Option<String>,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
    /// Plaintext access token; sealed before it reaches the store.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_expires_at: Option<i64>,
}

/// A prompt to enqueue.
#[derive(Debug, Clone)]
pub struct EnqueuePromptRequest {
    pub user_id: String,
    pub content: String,
    pub source: MessageSource,
    pub model: Option<String>,
    pub attachments: Option<serde_json::Value>,
    pub callback_context: Option<serde_json::Value>,
}

/// Outcome of a durable enqueue: the message id and its 1-based queue
/// position (1 means "running immediately").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptQueued {
    pub message_id: String,
    pub position: i64,
}

/// Who is asking for PR creation.
#[derive(Debug, Clone)]
pub enum PrOrigin {
    /// An internal flow or a service-authenticated HTTP call.
    Service,
    /// The sandbox itself, presenting its bearer token.
    SandboxToken(String),
}

/// A created pull request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrCreated {
    pub url: String,
    pub number: i64,
    pub branch: String,
}

/// Identity of an authenticated client socket (volatile cache of the
/// `ws_client_mapping` row).
#[derive(Debug, Clone)]
pub(crate) struct ClientIdentity {
    pub participant_id: String,
    pub client_id: String,
}

/// Mailbox commands. Every externally visible operation of the session is
/// one of these; the mailbox serializes them.
pub(crate) enum Command {
    GetState {
        reply: Reply<SessionSnapshot>,
    },
    Warm {
        reply: Reply<SandboxStatus>,
    },
    EnqueuePrompt {
        req: EnqueuePromptRequest,
        reply: Reply<PromptQueued>,
    },
    StopExecution {
        reply: Reply<()>,
    },
    ListEvents {
        cursor: Option<i64>,
        limit: usize,
        event_type: Option<EventType>,
        message_id: Option<String>,
        reply: Reply<(Vec<Event>, bool)>,
    },
    ListMessages {
        cursor: Option<i64>,
        limit: usize,
        status: Option<MessageStatus>,
        reply: Reply<(Vec<Message>, bool)>,
    },
    ListArtifacts {
        reply: Reply<Vec<Artifact>>,
    },
    ListParticipants {
        reply: Reply<Vec<Participant>>,
    },
    AddParticipant {
        spec: ParticipantSpec,
        reply: Reply<Participant>,
    },
    MintWsToken {
        user_id: String,
        reply: Reply<String>,
    },
    SetArchived {
        archived: bool,
        reply: Reply<SessionStatus>,
    },
    CreatePr {
        origin: PrOrigin,
        reply: oneshot::Sender<Result<PrCreated, DrydockError>>,
    },
    ValidateSandbox {
        token: String,
        sandbox_id: String,
        reply: Reply<()>,
    },
    TriggerSnapshot {
        reason: SnapshotReason,
        reply: Reply<()>,
    },
    ClientSocketOpened {
        ws_id: String,
        sender: mpsc::Sender<SocketOutbound>,
    },
    Subscribe {
        ws_id: String,
        token: String,
        client_id: String,
        reply: Reply<()>,
    },
    ClientFrame {
        ws_id: String,
        frame: ClientFrame,
    },
    ClientDisconnected {
        ws_id: String,
    },
    SandboxSocketOpened {
        ws_id: String,
        token: String,
        sandbox_id: String,
        sender: mpsc::Sender<SocketOutbound>,
        reply: Reply<()>,
    },
    SandboxEventReceived {
        event: SandboxEvent,
    },
    SandboxDisconnected {
        ws_id: String,
    },
    SnapshotFinished {
        reason: SnapshotReason,
        prior: SandboxStatus,
        result: Result<String, String>,
    },
    PushTimeout {
        key: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable address of a session actor. Every method enqueues a command and
/// awaits its reply; callers therefore observe the actor's serialized order.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DrydockError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| DrydockError::Internal("session coordinator unavailable".to_string()))?;
        rx.await
            .map_err(|_| DrydockError::Internal("session coordinator dropped request".to_string()))?
    }

    /// Fire-and-forget send; drops the command if the actor is gone.
    async fn notify(&self, cmd: Command) {
        let _ = self.tx.send(cmd).await;
    }

    pub async fn state(&self) -> Result<SessionSnapshot, DrydockError> {
        self.request(|reply| Command::GetState { reply }).await
    }

    pub async fn warm(&self) -> Result<SandboxStatus, DrydockError> {
        self.request(|reply| Command::Warm { reply }).await
    }

    pub async fn enqueue_prompt(
        &self,
        req: EnqueuePromptRequest,
    ) -> Result<PromptQueued, DrydockError> {
        self.request(|reply| Command::EnqueuePrompt { req, reply })
            .await
    }

    pub async fn stop_execution(&self) -> Result<(), DrydockError> {
        self.request(|reply| Command::StopExecution { reply }).await
    }

    pub async fn list_events(
        &self,
        cursor: Option<i64>,
        limit: usize,
        event_type: Option<EventType>,
        message_id: Option<String>,
    ) -> Result<(Vec<Event>, bool), DrydockError> {
        self.request(|reply| Command::ListEvents {
            cursor,
            limit,
            event_type,
            message_id,
            reply,
        })
        .await
    }

    pub async fn list_messages(
        &self,
        cursor: Option<i64>,
        limit: usize,
        status: Option<MessageStatus>,
    ) -> Result<(Vec<Message>, bool), DrydockError> {
        self.request(|reply| Command::ListMessages {
            cursor,
            limit,
            status,
            reply,
        })
        .await
    }

    pub async fn list_artifacts(&self) -> Result<Vec<Artifact>, DrydockError> {
        self.request(|reply| Command::ListArtifacts { reply }).await
    }

    pub async fn list_participants(&self) -> Result<Vec<Participant>, DrydockError> {
        self.request(|reply| Command::ListParticipants { reply })
            .await
    }

    pub async fn add_participant(
        &self,
        spec: ParticipantSpec,
    ) -> Result<Participant, DrydockError> {
        self.request(|reply| Command::AddParticipant { spec, reply })
            .await
    }

    pub async fn mint_ws_token(&self, user_id: &str) -> Result<String, DrydockError> {
        let user_id = user_id.to_string();
        self.request(|reply| Command::MintWsToken { user_id, reply })
            .await
    }

    pub async fn set_archived(&self, archived: bool) -> Result<SessionStatus, DrydockError> {
        self.request(|reply| Command::SetArchived { archived, reply })
            .await
    }

    pub async fn create_pr(&self, origin: PrOrigin) -> Result<PrCreated, DrydockError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::CreatePr { origin, reply: tx })
            .await
            .map_err(|_| DrydockError::Internal("session coordinator unavailable".to_string()))?;
        rx.await
            .map_err(|_| DrydockError::Internal("session coordinator dropped request".to_string()))?
    }

    /// Validate a sandbox bearer + id pair without attaching a socket.
    pub async fn validate_sandbox(
        &self,
        token: &str,
        sandbox_id: &str,
    ) -> Result<(), DrydockError> {
        let token = token.to_string();
        let sandbox_id = sandbox_id.to_string();
        self.request(|reply| Command::ValidateSandbox {
            token,
            sandbox_id,
            reply,
        })
        .await
    }

    pub async fn trigger_snapshot(&self, reason: SnapshotReason) -> Result<(), DrydockError> {
        self.request(|reply| Command::TriggerSnapshot { reason, reply })
            .await
    }

    pub async fn client_socket_opened(&self, ws_id: &str, sender: mpsc::Sender<SocketOutbound>) {
        self.notify(Command::ClientSocketOpened {
            ws_id: ws_id.to_string(),
            sender,
        })
        .await;
    }

    pub async fn subscribe(
        &self,
        ws_id: &str,
        token: &str,
        client_id: &str,
    ) -> Result<(), DrydockError> {
        let ws_id = ws_id.to_string();
        let token = token.to_string();
        let client_id = client_id.to_string();
        self.request(|reply| Command::Subscribe {
            ws_id,
            token,
            client_id,
            reply,
        })
        .await
    }

    pub async fn client_frame(&self, ws_id: &str, frame: ClientFrame) {
        self.notify(Command::ClientFrame {
            ws_id: ws_id.to_string(),
            frame,
        })
        .await;
    }

    pub async fn client_disconnected(&self, ws_id: &str) {
        self.notify(Command::ClientDisconnected {
            ws_id: ws_id.to_string(),
        })
        .await;
    }

    pub async fn sandbox_socket_opened(
        &self,
        ws_id: &str,
        token: &str,
        sandbox_id: &str,
        sender: mpsc::Sender<SocketOutbound>,
    ) -> Result<(), DrydockError> {
        let ws_id = ws_id.to_string();
        let token = token.to_string();
        let sandbox_id = sandbox_id.to_string();
        self.request(|reply| Command::SandboxSocketOpened {
            ws_id,
            token,
            sandbox_id,
            sender,
            reply,
        })
        .await
    }

    pub async fn sandbox_event(&self, event: SandboxEvent) {
        self.notify(Command::SandboxEventReceived { event }).await;
    }

    pub async fn sandbox_disconnected(&self, ws_id: &str) {
        self.notify(Command::SandboxDisconnected {
            ws_id: ws_id.to_string(),
        })
        .await;
    }

    /// Graceful eviction: the actor drains its mailbox entry and stops.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// The actor. All fields are private; everything goes through the mailbox.
pub struct SessionCoordinator {
    session_id: String,
    db: Database,
    deps: CoordinatorDeps,
    self_tx: mpsc::Sender<Command>,
    /// Cached singleton row, kept in sync with every mutation.
    session: Session,
    /// Cached current sandbox row.
    sandbox: Option<Sandbox>,
    breaker: CircuitBreaker,
    /// Volatile: authenticated client identities by ws_id.
    clients: HashMap<String, ClientIdentity>,
    /// Volatile: in-flight push resolvers keyed by normalized branch name.
    pending_pushes: HashMap<String, PendingPush>,
    snapshot_in_flight: bool,
    connect_deadline_ms: Option<i64>,
    last_spawn_attempt_ms: Option<i64>,
}

impl SessionCoordinator {
    /// Load state from the store, recover from any eviction, and start the
    /// actor task. Returns the handle.
    pub async fn spawn(db: Database, deps: CoordinatorDeps) -> Result<SessionHandle, DrydockError> {
        let session = queries::session::get_session(&db)
            .await?
            .ok_or_else(|| DrydockError::NotFound("session store not initialized".to_string()))?;
        let sandbox = queries::sandbox::get_sandbox(&db).await?;

        let (tx, rx) = mpsc::channel(256);
        let breaker = CircuitBreaker::from_persisted(
            &deps.cfg.lifecycle,
            sandbox
                .as_ref()
                .map(|s| (s.circuit_breaker_failures as u32, s.circuit_breaker_opened_at))
                .unwrap_or((0, None)),
        );

        let session_id = session.id.clone();
        let mut actor = Self {
            session_id: session_id.clone(),
            db,
            deps,
            self_tx: tx.clone(),
            session,
            sandbox,
            breaker,
            clients: HashMap::new(),
            pending_pushes: HashMap::new(),
            snapshot_in_flight: false,
            connect_deadline_ms: None,
            last_spawn_attempt_ms: None,
        };
        actor.recover_after_resume().await?;

        let handle = SessionHandle { session_id, tx };
        tokio::spawn(actor.run(rx));
        Ok(handle)
    }

    /// Adjust state that cannot have survived an eviction: a provider call
    /// that was in flight is lost, so `spawning` falls back to `pending`; a
    /// `connecting`/`warming` sandbox gets a fresh connect deadline and will
    /// either re-attach its socket or fail it.
    async fn recover_after_resume(&mut self) -> Result<(), DrydockError> {
        let Some(sandbox) = self.sandbox.clone() else {
            return Ok(());
        };
        match sandbox.status {
            SandboxStatus::Spawning => {
                info!(session_id = %self.session_id, "resumed mid-spawn, returning sandbox to pending");
                self.set_sandbox_status(SandboxStatus::Pending).await?;
            }
            SandboxStatus::Connecting | SandboxStatus::Warming | SandboxStatus::Syncing => {
                self.connect_deadline_ms =
                    Some(now_ms() + (self.deps.cfg.lifecycle.connect_deadline_secs as i64) * 1000);
            }
            SandboxStatus::Snapshotting => {
                // The snapshot task died with the previous process.
                info!(session_id = %self.session_id, "resumed mid-snapshot, returning sandbox to ready");
                self.set_sandbox_status(SandboxStatus::Ready).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(session_id = %self.session_id, "session coordinator running");
        loop {
            let deadline = self.next_alarm_instant();
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown { reply }) => {
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = sleep_until_or_never(deadline) => {
                    if let Err(e) = self.on_alarm().await {
                        error!(session_id = %self.session_id, error = %e, "alarm handling failed");
                    }
                }
            }
        }
        // Pending pushes do not survive the actor; callers retry.
        self.fail_all_pending_pushes("session coordinator shut down");
        debug!(session_id = %self.session_id, "session coordinator stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::GetState { reply } => {
                let _ = reply.send(self.snapshot().await);
            }
            Command::Warm { reply } => {
                let _ = reply.send(self.warm().await);
            }
            Command::EnqueuePrompt { req, reply } => {
                let _ = reply.send(self.enqueue_prompt(req).await);
            }
            Command::StopExecution { reply } => {
                let _ = reply.send(self.stop_execution().await);
            }
            Command::ListEvents {
                cursor,
                limit,
                event_type,
                message_id,
                reply,
            } => {
                let _ = reply.send(
                    queries::events::list_events(&self.db, cursor, limit, event_type, message_id)
                        .await,
                );
            }
            Command::ListMessages {
                cursor,
                limit,
                status,
                reply,
            } => {
                let _ = reply
                    .send(queries::messages::list_messages(&self.db, cursor, limit, status).await);
            }
            Command::ListArtifacts { reply } => {
                let _ = reply.send(queries::artifacts::list_artifacts(&self.db).await);
            }
            Command::ListParticipants { reply } => {
                let _ = reply.send(queries::participants::list_participants(&self.db).await);
            }
            Command::AddParticipant { spec, reply } => {
                let _ = reply.send(self.add_participant(spec).await);
            }
            Command::MintWsToken { user_id, reply } => {
                let _ = reply.send(self.mint_ws_token(&user_id).await);
            }
            Command::SetArchived { archived, reply } => {
                let _ = reply.send(self.set_archived(archived).await);
            }
            Command::CreatePr { origin, reply } => {
                // On success the reply is parked in the pending-push map and
                // resolved by a later push_complete/push_error/timeout.
                if let Err(e) = self.begin_create_pr(origin, reply).await {
                    warn!(session_id = %self.session_id, error = %e, "PR creation could not start");
                }
            }
            Command::ValidateSandbox {
                token,
                sandbox_id,
                reply,
            } => {
                let _ = reply.send(self.validate_sandbox_credentials(&token, &sandbox_id));
            }
            Command::TriggerSnapshot { reason, reply } => {
                let _ = reply.send(self.trigger_snapshot(reason).await);
            }
            Command::ClientSocketOpened { ws_id, sender } => {
                self.on_client_socket_opened(ws_id, sender);
            }
            Command::Subscribe {
                ws_id,
                token,
                client_id,
                reply,
            } => {
                let _ = reply.send(self.on_subscribe(&ws_id, &token, &client_id).await);
            }
            Command::ClientFrame { ws_id, frame } => {
                if let Err(e) = self.on_client_frame(&ws_id, frame).await {
                    warn!(session_id = %self.session_id, ws_id, error = %e, "client frame failed");
                }
            }
            Command::ClientDisconnected { ws_id } => {
                self.on_client_disconnected(&ws_id).await;
            }
            Command::SandboxSocketOpened {
                ws_id,
                token,
                sandbox_id,
                sender,
                reply,
            } => {
                let _ = reply.send(
                    self.on_sandbox_socket_opened(&ws_id, &token, &sandbox_id, sender)
                        .await,
                );
            }
            Command::SandboxEventReceived { event } => {
                if let Err(e) = self.on_sandbox_event(event).await {
                    warn!(session_id = %self.session_id, error = %e, "sandbox event failed");
                }
            }
            Command::SandboxDisconnected { ws_id } => {
                self.on_sandbox_disconnected(&ws_id);
            }
            Command::SnapshotFinished {
                reason,
                prior,
                result,
            } => {
                if let Err(e) = self.on_snapshot_finished(reason, prior, result).await {
                    error!(session_id = %self.session_id, error = %e, "snapshot completion failed");
                }
            }
            Command::PushTimeout { key } => {
                self.on_push_timeout(&key);
            }
            Command::Shutdown { .. } => unreachable!("handled in run loop"),
        }
    }

    /// Build the public state snapshot.
    async fn snapshot(&self) -> Result<SessionSnapshot, DrydockError> {
        let is_processing = queries::messages::peek_processing(&self.db).await?.is_some();
        let queue_length = queries::messages::pending_or_processing_count(&self.db).await?;
        Ok(SessionSnapshot {
            session: self.session.clone(),
            sandbox_status: self.sandbox.as_ref().map(|s| s.status),
            git_sync_status: self.sandbox.as_ref().map(|s| s.git_sync_status),
            is_processing,
            queue_length,
            connected_clients: self.deps.registry.client_count(&self.session_id),
        })
    }

    async fn add_participant(&mut self, spec: ParticipantSpec) -> Result<Participant, DrydockError> {
        let now = now_ms();
        let sealed = match &spec.access_token {
            Some(token) => Some(self.seal_access_token(token)?),
            None => None,
        };
        let participant = Participant {
            id: new_id(),
            user_id: spec.user_id.clone(),
            github_user_id: spec.github_user_id,
            github_login: spec.github_login,
            github_name: spec.github_name,
            github_email: spec.github_email,
            role: spec.role.unwrap_or(ParticipantRole::Member),
            access_token_sealed: sealed,
            token_expires_at: spec.token_expires_at,
            ws_auth_token_hash: None,
            ws_token_created_at: None,
            joined_at: now,
        };
        queries::participants::upsert_participant(&self.db, &participant).await?;
        // Re-read: an upsert against an existing user_id keeps the old id.
        queries::participants::get_by_user_id(&self.db, &spec.user_id)
            .await?
            .ok_or_else(|| DrydockError::Internal("participant vanished after upsert".to_string()))
    }

    fn seal_access_token(&self, token: &str) -> Result<String, DrydockError> {
        let key = self.deps.token_key.as_ref().ok_or_else(|| {
            DrydockError::Config("token_encryption_key is not configured".to_string())
        })?;
        drydock_crypto::seal_hex(key, token)
    }

    pub(crate) fn open_access_token(&self, sealed: &str) -> Result<String, DrydockError> {
        let key = self.deps.token_key.as_ref().ok_or_else(|| {
            DrydockError::Config("token_encryption_key is not configured".to_string())
        })?;
        drydock_crypto::open_hex(key, sealed)
    }

    async fn mint_ws_token(&mut self, user_id: &str) -> Result<String, DrydockError> {
        let participant = queries::participants::get_by_user_id(&self.db, user_id)
            .await?
            .ok_or_else(|| DrydockError::NotFound(format!("participant not found: {user_id}")))?;
        let token = drydock_crypto::random_hex(32)?;
        let hash = drydock_crypto::sha256_hex(&token);
        queries::participants::set_ws_token_hash(&self.db, &participant.id, &hash, now_ms())
            .await?;
        Ok(token)
    }

    async fn set_archived(&mut self, archived: bool) -> Result<SessionStatus, DrydockError> {
        let status = if archived {
            SessionStatus::Archived
        } else {
            SessionStatus::Active
        };
        let now = now_ms();
        queries::session::set_status(&self.db, status, now).await?;
        self.deps
            .index
            .set_status(&self.session_id, status, now)
            .await?;
        self.session.status = status;
        self.session.updated_at = now;
        self.broadcast(&drydock_core::protocol::ServerFrame::SessionStatus { status });
        Ok(status)
    }

    // --- small shared accessors used by the split impl blocks ---

    pub(crate) fn cfg(&self) -> &DrydockConfig {
        &self.deps.cfg
    }

    pub(crate) fn sandbox_ref(&self) -> Option<&Sandbox> {
        self.sandbox.as_ref()
    }
}

async fn sleep_until_or_never(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => futures::future::pending().await,
    }
}
