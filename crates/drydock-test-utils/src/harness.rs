// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end harness.
//!
//! Builds a real router over a temp data directory with mock external
//! collaborators, then lets tests attach scripted peers the same way the
//! gateway's socket tasks do: a channel sender registered with the actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use drydock_config::DrydockConfig;
use drydock_coordinator::{
    CoordinatorRouter, CreateSessionParams, ParticipantSpec, SessionHandle, SocketOutbound,
};
use drydock_core::protocol::{SandboxCommand, SandboxEvent, ServerFrame};
use drydock_core::types::ParticipantRole;
use drydock_core::DrydockError;
use drydock_storage::{queries, Database, Sandbox};

/// Default owner identity used by [`TestHarness::create_session`].
pub const OWNER_USER_ID: &str = "user-owner";
/// The owner's plaintext access token (sealed at rest by the coordinator).
pub const OWNER_ACCESS_TOKEN: &str = "gho_owner_token";

/// Builder for the test environment.
pub struct TestHarnessBuilder {
    push_timeout_secs: u64,
    breaker_max_failures: u32,
    create_failures: usize,
    heartbeat_threshold_secs: u64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            push_timeout_secs: 5,
            breaker_max_failures: 3,
            create_failures: 0,
            heartbeat_threshold_secs: 3_600,
        }
    }

    /// Shrink the heartbeat threshold for staleness tests.
    pub fn with_heartbeat_threshold(mut self, secs: u64) -> Self {
        self.heartbeat_threshold_secs = secs;
        self
    }

    /// Shorten the push timeout for timeout tests.
    pub fn with_push_timeout(mut self, secs: u64) -> Self {
        self.push_timeout_secs = secs;
        self
    }

    pub fn with_breaker_max_failures(mut self, n: u32) -> Self {
        self.breaker_max_failures = n;
        self
    }

    /// Queue transient create failures on the mock provider.
    pub fn with_create_failures(mut self, n: usize) -> Self {
        self.create_failures = n;
        self
    }

    pub async fn build(self) -> Result<TestHarness, DrydockError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| DrydockError::Storage { source: e.into() })?;

        let mut cfg = DrydockConfig::default();
        cfg.storage.data_dir = temp_dir.path().to_string_lossy().to_string();
        cfg.auth.callback_secret = Some("test-callback-secret".to_string());
        cfg.auth.provider_api_secret = Some("test-provider-secret".to_string());
        cfg.auth.token_encryption_key = Some("11".repeat(32));
        cfg.lifecycle.push_timeout_secs = self.push_timeout_secs;
        cfg.lifecycle.breaker_max_failures = self.breaker_max_failures;
        // Tests drive spawns back to back; the cooldown would mask them.
        cfg.lifecycle.spawn_cooldown_secs = 0;
        // Keep background alarms out of short tests unless asked for.
        cfg.lifecycle.inactivity_timeout_secs = 3_600;
        cfg.lifecycle.heartbeat_threshold_secs = self.heartbeat_threshold_secs;
        let cfg = Arc::new(cfg);

        let provider = Arc::new(crate::MockProvider::new());
        provider.fail_create_transient(self.create_failures);
        let repo_host = Arc::new(crate::MockRepoHost::new());

        let router = Arc::new(
            CoordinatorRouter::new(cfg.clone(), provider.clone(), repo_host.clone()).await?,
        );

        Ok(TestHarness {
            router,
            provider,
            repo_host,
            cfg,
            _temp_dir: temp_dir,
        })
    }
}

/// A client socket stand-in: the receiver side of what the coordinator
/// writes, plus the ws_id tag the gateway would have assigned.
#[derive(Debug)]
pub struct ClientSocket {
    pub ws_id: String,
    pub rx: mpsc::Receiver<SocketOutbound>,
}

impl ClientSocket {
    /// Next parsed server frame, waiting up to two seconds. Close frames
    /// return `None`.
    pub async fn recv_frame(&mut self) -> Option<ServerFrame> {
        loop {
            let outbound = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .ok()??;
            match outbound {
                SocketOutbound::Frame(text) => {
                    if let Ok(frame) = serde_json::from_str(&text) {
                        return Some(frame);
                    }
                }
                SocketOutbound::Close { .. } => return None,
            }
        }
    }

    /// Wait for a frame matching the predicate, skipping others.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&ServerFrame) -> bool,
    ) -> Option<ServerFrame> {
        for _ in 0..64 {
            let frame = self.recv_frame().await?;
            if predicate(&frame) {
                return Some(frame);
            }
        }
        None
    }

    /// The raw close event, if the next outbound is a close.
    pub async fn recv_close(&mut self) -> Option<(u16, String)> {
        loop {
            let outbound = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .ok()??;
            if let SocketOutbound::Close { code, reason } = outbound {
                return Some((code, reason));
            }
        }
    }
}

/// The sandbox's side of the bridge protocol.
pub struct ScriptedSandbox {
    pub ws_id: String,
    pub sandbox_id: String,
    handle: SessionHandle,
    rx: mpsc::Receiver<SocketOutbound>,
}

impl ScriptedSandbox {
    /// Next command from the coordinator, waiting up to two seconds.
    pub async fn recv_command(&mut self) -> Option<SandboxCommand> {
        loop {
            let outbound = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .ok()??;
            match outbound {
                SocketOutbound::Frame(text) => {
                    if let Ok(command) = serde_json::from_str(&text) {
                        return Some(command);
                    }
                }
                SocketOutbound::Close { .. } => return None,
            }
        }
    }

    /// Feed one event into the coordinator, as the gateway read loop would.
    pub async fn send_event(&self, event: SandboxEvent) {
        self.handle.sandbox_event(event).await;
    }

    /// Run one prompt to completion: expect the prompt command, stream a few
    /// token events, and report success.
    pub async fn complete_next_prompt(&mut self) -> Option<String> {
        let command = self.recv_command().await?;
        let SandboxCommand::Prompt { message_id, .. } = command else {
            return None;
        };
        self.send_event(SandboxEvent::Token {
            content: "working on it".to_string(),
            message_id: Some(message_id.clone()),
        })
        .await;
        self.send_event(SandboxEvent::ExecutionComplete {
            message_id: message_id.clone(),
            success: true,
            error: None,
        })
        .await;
        Some(message_id)
    }
}

/// A complete coordinator environment over a temp directory.
pub struct TestHarness {
    pub router: Arc<CoordinatorRouter>,
    pub provider: Arc<crate::MockProvider>,
    pub repo_host: Arc<crate::MockRepoHost>,
    pub cfg: Arc<DrydockConfig>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Create a session for `acme/widgets` with a default owner carrying a
    /// linked access token.
    pub async fn create_session(&self) -> Result<SessionHandle, DrydockError> {
        self.router
            .create_session(CreateSessionParams {
                repo_owner: "acme".to_string(),
                repo_name: "widgets".to_string(),
                title: Some("Rename foo".to_string()),
                model: None,
                session_name: None,
                owner: ParticipantSpec {
                    user_id: OWNER_USER_ID.to_string(),
                    github_user_id: Some("99".to_string()),
                    github_login: Some("owner".to_string()),
                    github_name: Some("Owner Dev".to_string()),
                    github_email: Some("owner@example.com".to_string()),
                    role: Some(ParticipantRole::Owner),
                    access_token: Some(OWNER_ACCESS_TOKEN.to_string()),
                    token_expires_at: None,
                },
            })
            .await
    }

    fn session_db_path(&self, session_id: &str) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.cfg.storage.data_dir)
            .join("sessions")
            .join(format!("{session_id}.db"))
    }

    /// Read the current sandbox row straight from the session's store.
    pub async fn read_sandbox(&self, session_id: &str) -> Result<Option<Sandbox>, DrydockError> {
        let db = Database::open(self.session_db_path(session_id)).await?;
        let sandbox = queries::sandbox::get_sandbox(&db).await?;
        db.close().await?;
        Ok(sandbox)
    }

    /// Force the persisted sandbox status (for dead-sandbox scenarios).
    /// Callers should evict and resume the actor afterwards so it reloads.
    pub async fn set_sandbox_status(
        &self,
        session_id: &str,
        status: drydock_core::types::SandboxStatus,
    ) {
        let db = Database::open(self.session_db_path(session_id))
            .await
            .expect("session store");
        queries::sandbox::set_status(&db, status)
            .await
            .expect("status update");
        db.close().await.expect("close");
    }

    /// Attach a scripted sandbox socket using the credentials the actor
    /// persisted at spawn time.
    pub async fn connect_sandbox(
        &self,
        handle: &SessionHandle,
    ) -> Result<ScriptedSandbox, DrydockError> {
        let sandbox = self
            .read_sandbox(handle.session_id())
            .await?
            .ok_or_else(|| DrydockError::Internal("no sandbox row to connect".to_string()))?;

        let ws_id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(256);
        handle
            .sandbox_socket_opened(&ws_id, &sandbox.auth_token, &sandbox.id, tx)
            .await?;

        Ok(ScriptedSandbox {
            ws_id,
            sandbox_id: sandbox.id,
            handle: handle.clone(),
            rx,
        })
    }

    /// Mint a WS token for a user and run the subscribe flow on a fresh
    /// simulated socket. Returns the socket and the token (for re-use in
    /// hibernation tests).
    pub async fn connect_client(
        &self,
        handle: &SessionHandle,
        user_id: &str,
        client_id: &str,
    ) -> Result<(ClientSocket, String), DrydockError> {
        let token = handle.mint_ws_token(user_id).await?;
        let socket = self
            .connect_client_with_token(handle, &token, client_id)
            .await?;
        Ok((socket, token))
    }

    /// Subscribe with an existing token, as a reconnecting client would.
    pub async fn connect_client_with_token(
        &self,
        handle: &SessionHandle,
        token: &str,
        client_id: &str,
    ) -> Result<ClientSocket, DrydockError> {
        let ws_id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(64);
        handle.client_socket_opened(&ws_id, tx).await;
        handle.subscribe(&ws_id, token, client_id).await?;
        Ok(ClientSocket { ws_id, rx })
    }
}
