// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The actor router.
//!
//! Maps every `session_id` to exactly one live [`SessionCoordinator`],
//! recovering evicted actors from their per-session store on demand. The
//! router owns the cross-session index and the shared socket registry; both
//! outlive any individual actor.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use drydock_config::DrydockConfig;
use drydock_core::types::{ParticipantRole, SessionStatus};
use drydock_core::{DrydockError, RepoHost, SandboxProvider};
use drydock_crypto::TokenKey;
use drydock_storage::{
    queries, Database, Session, SessionIndex, SessionIndexEntry,
};

use crate::registry::SocketRegistry;
use crate::{
    new_id, now_ms, CoordinatorDeps, ParticipantSpec, SessionCoordinator, SessionHandle,
};

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Already lowercased by the façade.
    pub repo_owner: String,
    pub repo_name: String,
    pub title: Option<String>,
    pub model: Option<String>,
    pub session_name: Option<String>,
    /// The creating user becomes the session owner.
    pub owner: ParticipantSpec,
}

/// Routes requests to per-session actors, creating or resuming them as needed.
pub struct CoordinatorRouter {
    cfg: Arc<DrydockConfig>,
    provider: Arc<dyn SandboxProvider>,
    repo_host: Arc<dyn RepoHost>,
    registry: SocketRegistry,
    index: Arc<SessionIndex>,
    token_key: Option<TokenKey>,
    actors: DashMap<String, SessionHandle>,
}

impl CoordinatorRouter {
    pub async fn new(
        cfg: Arc<DrydockConfig>,
        provider: Arc<dyn SandboxProvider>,
        repo_host: Arc<dyn RepoHost>,
    ) -> Result<Self, DrydockError> {
        let index_path = PathBuf::from(&cfg.storage.data_dir).join("index.db");
        let index = Arc::new(SessionIndex::open(index_path).await?);

        let token_key = match &cfg.auth.token_encryption_key {
            Some(hex_key) => Some(TokenKey::from_hex(hex_key)?),
            None => None,
        };

        Ok(Self {
            cfg,
            provider,
            repo_host,
            registry: SocketRegistry::new(),
            index,
            token_key,
            actors: DashMap::new(),
        })
    }

    /// The gateway-held socket registry, shared with every actor.
    pub fn registry(&self) -> SocketRegistry {
        self.registry.clone()
    }

    fn session_db_path(&self, session_id: &str) -> PathBuf {
        PathBuf::from(&self.cfg.storage.data_dir)
            .join("sessions")
            .join(format!("{session_id}.db"))
    }

    fn deps(&self) -> CoordinatorDeps {
        CoordinatorDeps {
            cfg: self.cfg.clone(),
            provider: self.provider.clone(),
            repo_host: self.repo_host.clone(),
            registry: self.registry.clone(),
            index: self.index.clone(),
            token_key: self.token_key.clone(),
        }
    }

    /// Create a session: its store, its singleton row, its owner participant,
    /// its index entry, and its actor.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionHandle, DrydockError> {
        let session_id = new_id();
        let now = now_ms();
        let session = Session {
            id: session_id.clone(),
            session_name: params
                .session_name
                .unwrap_or_else(|| session_id.clone()),
            title: params.title,
            repo_owner: params.repo_owner,
            repo_name: params.repo_name,
            repo_default_branch: None,
            branch_name: None,
            base_sha: None,
            current_sha: None,
            agent_session_id: None,
            model: params
                .model
                .unwrap_or_else(|| self.cfg.agent.default_model.clone()),
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
        };

        let db = Database::open(self.session_db_path(&session_id)).await?;
        queries::session::create_session(&db, &session).await?;

        self.index
            .insert(&SessionIndexEntry {
                id: session.id.clone(),
                session_name: session.session_name.clone(),
                title: session.title.clone(),
                repo_owner: session.repo_owner.clone(),
                repo_name: session.repo_name.clone(),
                status: session.status,
                created_at: session.created_at,
                updated_at: session.updated_at,
            })
            .await?;

        let handle = SessionCoordinator::spawn(db, self.deps()).await?;

        // The creator joins as owner.
        let mut owner = params.owner;
        owner.role = Some(owner.role.unwrap_or(ParticipantRole::Owner));
        handle.add_participant(owner).await?;

        info!(session_id = %session_id, "session created");
        self.actors.insert(session_id, handle.clone());
        Ok(handle)
    }

    /// Resolve the live actor for a session, resuming it from its store if
    /// the previous one was evicted.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, DrydockError> {
        if let Some(handle) = self.actors.get(session_id) {
            return Ok(handle.clone());
        }

        let path = self.session_db_path(session_id);
        if !path.exists() {
            return Err(DrydockError::NotFound(format!(
                "session not found: {session_id}"
            )));
        }
        let db = Database::open(path).await?;
        let handle = SessionCoordinator::spawn(db, self.deps()).await?;
        info!(session_id, "session coordinator resumed from store");
        // Two concurrent resumes race benignly; the second wins the map and
        // the first actor idles until dropped by eviction.
        self.actors.insert(session_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// List sessions from the index, newest first.
    pub async fn list_sessions(
        &self,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<(Vec<SessionIndexEntry>, bool), DrydockError> {
        self.index.list(cursor, limit).await
    }

    /// Evict an actor, keeping its store. The next request resumes it.
    pub async fn evict(&self, session_id: &str) {
        if let Some((_, handle)) = self.actors.remove(session_id) {
            handle.shutdown().await;
            info!(session_id, "session coordinator evicted");
        }
    }

    /// Delete a session: stop the actor, drop the index entry, remove the
    /// store files.
    pub async fn delete(&self, session_id: &str) -> Result<(), DrydockError> {
        if let Some((_, handle)) = self.actors.remove(session_id) {
            handle.shutdown().await;
        }
        self.index.remove(session_id).await?;

        let path = self.session_db_path(session_id);
        if path.exists() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(session_id, error = %e, "failed to remove session store");
            }
            // WAL sidecar files.
            for suffix in ["-wal", "-shm"] {
                let mut sidecar = path.clone().into_os_string();
                sidecar.push(suffix);
                let _ = tokio::fs::remove_file(PathBuf::from(sidecar)).await;
            }
        }
        info!(session_id, "session deleted");
        Ok(())
    }
}
