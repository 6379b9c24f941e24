// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sandbox lifecycle: the state machine, the circuit breaker, the single
//! alarm, and snapshot orchestration.
//!
//! State transitions follow one table:
//!
//! | from            | event                        | to                       |
//! |-----------------|------------------------------|--------------------------|
//! | pending         | warm() / prompt arrival      | spawning                 |
//! | spawning        | create ok                    | connecting               |
//! | spawning        | create failed (transient)    | pending                  |
//! | spawning        | create failed (permanent)    | failed                   |
//! | connecting      | sandbox socket connected     | ready                    |
//! | connecting      | connect deadline exceeded    | failed                   |
//! | ready           | prompt dispatched            | running                  |
//! | running         | execution_complete           | ready (+snapshot)        |
//! | ready/running   | heartbeat too old            | stale                    |
//! | ready/running   | inactivity alarm, no clients | snapshotting -> stopped  |
//! | any             | snapshot request             | snapshotting -> prior    |
//! | any             | explicit stop                | stopped                  |

use drydock_config::model::LifecycleConfig;
use drydock_core::protocol::ServerFrame;
use drydock_core::traits::{CreateSandboxRequest, RestoreSandboxRequest};
use drydock_core::types::{GitSyncStatus, SandboxStatus, SnapshotReason};
use drydock_core::DrydockError;
use drydock_storage::{queries, Sandbox};
use tracing::{debug, info, warn};

use crate::{new_id, now_ms, Command, SessionCoordinator};

/// Why a spawn was requested. Warm is best-effort and silent; a prompt spawn
/// surfaces failures to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpawnTrigger {
    Warm,
    Prompt,
}

/// Counts consecutive transient provider failures within a window; opens for
/// a cooldown once the threshold is hit. Success closes it and resets to 0.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    max_failures: u32,
    window_ms: i64,
    cooldown_ms: i64,
    failures: u32,
    window_started_ms: Option<i64>,
    opened_at_ms: Option<i64>,
}

impl CircuitBreaker {
    pub fn new(cfg: &LifecycleConfig) -> Self {
        Self {
            max_failures: cfg.breaker_max_failures,
            window_ms: (cfg.breaker_window_secs as i64) * 1000,
            cooldown_ms: (cfg.breaker_cooldown_secs as i64) * 1000,
            failures: 0,
            window_started_ms: None,
            opened_at_ms: None,
        }
    }

    /// Rebuild from the persisted sandbox row after actor resume.
    pub fn from_persisted(cfg: &LifecycleConfig, persisted: (u32, Option<i64>)) -> Self {
        let mut breaker = Self::new(cfg);
        breaker.failures = persisted.0;
        breaker.opened_at_ms = persisted.1;
        breaker
    }

    /// Record a transient failure. Returns `true` if this one opened the breaker.
    pub fn record_failure(&mut self, now_ms: i64) -> bool {
        match self.window_started_ms {
            Some(start) if now_ms - start <= self.window_ms => {
                self.failures += 1;
            }
            _ => {
                self.window_started_ms = Some(now_ms);
                self.failures = 1;
            }
        }
        if self.failures >= self.max_failures && self.opened_at_ms.is_none() {
            self.opened_at_ms = Some(now_ms);
            return true;
        }
        false
    }

    /// A successful provider call closes the breaker entirely.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.window_started_ms = None;
        self.opened_at_ms = None;
    }

    /// Open means: a trip happened and the cooldown has not yet elapsed.
    pub fn is_open(&self, now_ms: i64) -> bool {
        match self.opened_at_ms {
            Some(opened) => now_ms - opened < self.cooldown_ms,
            None => false,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn opened_at(&self) -> Option<i64> {
        self.opened_at_ms
    }
}

impl SessionCoordinator {
    /// Update the cached and persisted sandbox status and broadcast it.
    pub(crate) async fn set_sandbox_status(
        &mut self,
        status: SandboxStatus,
    ) -> Result<(), DrydockError> {
        let Some(sandbox) = self.sandbox.as_mut() else {
            return Ok(());
        };
        if sandbox.status == status {
            return Ok(());
        }
        sandbox.status = status;
        queries::sandbox::set_status(&self.db, status).await?;
        self.broadcast(&ServerFrame::SandboxStatus { status });
        Ok(())
    }

    /// Record client/agent activity: pushes the inactivity deadline out.
    pub(crate) async fn record_activity(&mut self) -> Result<(), DrydockError> {
        let now = now_ms();
        if let Some(sandbox) = self.sandbox.as_mut() {
            sandbox.last_activity = Some(now);
            queries::sandbox::set_last_activity(&self.db, now).await?;
        }
        Ok(())
    }

    /// A new spawn may only supersede a sandbox that is pending, stale, or
    /// terminal; anything live, starting, or mid-snapshot is left alone.
    fn can_spawn_over(&self) -> bool {
        match self.sandbox.as_ref().map(|s| s.status) {
            None => true,
            Some(
                SandboxStatus::Pending
                | SandboxStatus::Stale
                | SandboxStatus::Stopped
                | SandboxStatus::Failed,
            ) => true,
            Some(_) => false,
        }
    }

    /// Best-effort prefetch. Short-circuits when the sandbox is already live
    /// or on its way up, when the breaker is open, or within the spawn
    /// cooldown; each short-circuit reports the current status.
    pub(crate) async fn warm(&mut self) -> Result<SandboxStatus, DrydockError> {
        let now = now_ms();
        if !self.can_spawn_over() {
            let status = self.sandbox.as_ref().map(|s| s.status);
            debug!(session_id = %self.session_id, ?status, "warm short-circuit: already live");
            return Ok(status.unwrap_or(SandboxStatus::Pending));
        }
        if self.breaker.is_open(now) {
            debug!(session_id = %self.session_id, "warm rejected: circuit breaker open");
            return Ok(self
                .sandbox
                .as_ref()
                .map(|s| s.status)
                .unwrap_or(SandboxStatus::Pending));
        }
        if let Some(last) = self.last_spawn_attempt_ms {
            if now - last < (self.cfg().lifecycle.spawn_cooldown_secs as i64) * 1000 {
                debug!(session_id = %self.session_id, "warm suppressed: spawn cooldown");
                return Ok(self
                    .sandbox
                    .as_ref()
                    .map(|s| s.status)
                    .unwrap_or(SandboxStatus::Pending));
            }
        }
        self.broadcast(&ServerFrame::SandboxWarming);
        self.spawn_sandbox(SpawnTrigger::Warm).await?;
        Ok(self
            .sandbox
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SandboxStatus::Pending))
    }

    /// Make sure a sandbox is coming up for a prompt. No-op while one is
    /// already live, starting, or snapshotting.
    pub(crate) async fn ensure_sandbox_for_prompt(&mut self) -> Result<(), DrydockError> {
        if !self.can_spawn_over() {
            return Ok(());
        }
        let now = now_ms();
        if self.breaker.is_open(now) {
            self.broadcast(&ServerFrame::SandboxError {
                message: "sandbox provider is unavailable, retrying shortly".to_string(),
            });
            return Ok(());
        }
        self.spawn_sandbox(SpawnTrigger::Prompt).await
    }

    /// Spawn a sandbox: restore from the last snapshot when one exists, cold
    /// create otherwise. A fresh auth token is minted and persisted before
    /// the provider is called.
    async fn spawn_sandbox(&mut self, trigger: SpawnTrigger) -> Result<(), DrydockError> {
        let now = now_ms();
        self.last_spawn_attempt_ms = Some(now);

        let snapshot_image_id = self
            .sandbox
            .as_ref()
            .and_then(|s| s.snapshot_image_id.clone());

        let sandbox = Sandbox {
            id: new_id(),
            object_id: None,
            status: SandboxStatus::Spawning,
            git_sync_status: GitSyncStatus::Pending,
            auth_token: drydock_crypto::random_hex(32)?,
            last_heartbeat: None,
            last_activity: Some(now),
            snapshot_image_id: snapshot_image_id.clone(),
            circuit_breaker_failures: self.breaker.failures() as i64,
            circuit_breaker_opened_at: self.breaker.opened_at(),
            created_at: now,
        };
        queries::sandbox::replace_sandbox(&self.db, &sandbox).await?;
        self.sandbox = Some(sandbox.clone());
        if trigger == SpawnTrigger::Prompt {
            self.broadcast(&ServerFrame::SandboxSpawning);
        }
        self.broadcast(&ServerFrame::SandboxStatus {
            status: SandboxStatus::Spawning,
        });

        // Restore first when a snapshot exists; cold create is the fallback.
        let mut restored_from: Option<String> = None;
        let created = if let Some(image_id) = snapshot_image_id {
            let restore = RestoreSandboxRequest {
                snapshot_image_id: image_id.clone(),
                session_id: self.session_id.clone(),
                sandbox_id: sandbox.id.clone(),
                repo_owner: self.session.repo_owner.clone(),
                repo_name: self.session.repo_name.clone(),
                control_plane_url: self.cfg().server.public_url.clone(),
                sandbox_auth_token: sandbox.auth_token.clone(),
                model: self.session.model.clone(),
            };
            match self.deps.provider.restore_sandbox(&restore).await {
                Ok(created) => {
                    restored_from = Some(image_id);
                    Ok(created)
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "restore failed, falling back to cold create");
                    self.broadcast(&ServerFrame::SandboxWarning {
                        message: "snapshot restore failed, starting fresh".to_string(),
                    });
                    self.create_cold(&sandbox).await
                }
            }
        } else {
            self.create_cold(&sandbox).await
        };

        match created {
            Ok(created) => {
                self.breaker.record_success();
                queries::sandbox::set_breaker(&self.db, 0, None).await?;
                if let Some(object_id) = &created.object_id {
                    queries::sandbox::set_object_id(&self.db, object_id).await?;
                }
                if let Some(s) = self.sandbox.as_mut() {
                    s.object_id = created.object_id.clone();
                    s.circuit_breaker_failures = 0;
                    s.circuit_breaker_opened_at = None;
                }
                self.connect_deadline_ms =
                    Some(now_ms() + (self.cfg().lifecycle.connect_deadline_secs as i64) * 1000);
                let next = if trigger == SpawnTrigger::Warm {
                    SandboxStatus::Warming
                } else {
                    SandboxStatus::Connecting
                };
                self.set_sandbox_status(next).await?;
                if let Some(image_id) = restored_from {
                    self.broadcast(&ServerFrame::SandboxRestored { image_id });
                }
                info!(session_id = %self.session_id, sandbox_id = %sandbox.id, "sandbox spawn accepted by provider");
                Ok(())
            }
            Err(e) if e.is_transient() => {
                let opened = self.breaker.record_failure(now_ms());
                queries::sandbox::set_breaker(
                    &self.db,
                    self.breaker.failures() as i64,
                    self.breaker.opened_at(),
                )
                .await?;
                if let Some(s) = self.sandbox.as_mut() {
                    s.circuit_breaker_failures = self.breaker.failures() as i64;
                    s.circuit_breaker_opened_at = self.breaker.opened_at();
                }
                warn!(session_id = %self.session_id, error = %e, opened, "transient spawn failure");
                self.set_sandbox_status(SandboxStatus::Pending).await?;
                if trigger == SpawnTrigger::Prompt {
                    self.broadcast(&ServerFrame::SandboxError {
                        message: format!("sandbox spawn failed, will retry: {}", e.message),
                    });
                }
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "permanent spawn failure");
                self.set_sandbox_status(SandboxStatus::Failed).await?;
                self.broadcast(&ServerFrame::SandboxError {
                    message: format!("sandbox failed: {}", e.message),
                });
                Ok(())
            }
        }
    }

    async fn create_cold(
        &self,
        sandbox: &Sandbox,
    ) -> Result<drydock_core::traits::SandboxCreated, drydock_core::ProviderError> {
        let author = queries::participants::list_participants(&self.db)
            .await
            .ok()
            .and_then(|ps| ps.into_iter().next());
        let request = CreateSandboxRequest {
            session_id: self.session_id.clone(),
            sandbox_id: sandbox.id.clone(),
            repo_owner: self.session.repo_owner.clone(),
            repo_name: self.session.repo_name.clone(),
            control_plane_url: self.cfg().server.public_url.clone(),
            sandbox_auth_token: sandbox.auth_token.clone(),
            model: self.session.model.clone(),
            git_user: author.map(|p| drydock_core::types::PromptAuthor {
                github_login: p.github_login,
                github_name: p.github_name,
                github_email: p.github_email,
            }),
        };
        self.deps.provider.create_sandbox(&request).await
    }

    /// Check sandbox credentials against the store. Used on socket upgrade
    /// and for sandbox-authenticated PR requests.
    pub(crate) fn validate_sandbox_credentials(
        &self,
        token: &str,
        sandbox_id: &str,
    ) -> Result<(), DrydockError> {
        let Some(sandbox) = self.sandbox.as_ref() else {
            return Err(DrydockError::Unauthenticated(
                "no sandbox exists for this session".to_string(),
            ));
        };
        if sandbox.status.is_dead() {
            return Err(DrydockError::Gone(format!(
                "sandbox is {}, connections are refused",
                sandbox.status
            )));
        }
        if sandbox.auth_token != token || sandbox.id != sandbox_id {
            return Err(DrydockError::Unauthenticated(
                "invalid sandbox credentials".to_string(),
            ));
        }
        Ok(())
    }

    /// Fire-and-forget snapshot. A no-op while one is already in flight or
    /// when the sandbox has no provider object yet.
    pub(crate) async fn trigger_snapshot(
        &mut self,
        reason: SnapshotReason,
    ) -> Result<(), DrydockError> {
        if self.snapshot_in_flight {
            debug!(session_id = %self.session_id, %reason, "snapshot already in flight");
            return Ok(());
        }
        let Some(sandbox) = self.sandbox.clone() else {
            return Ok(());
        };
        let Some(object_id) = sandbox.object_id.clone() else {
            debug!(session_id = %self.session_id, "no provider object to snapshot");
            return Ok(());
        };
        let prior = sandbox.status;
        self.snapshot_in_flight = true;
        self.set_sandbox_status(SandboxStatus::Snapshotting).await?;

        let provider = self.deps.provider.clone();
        let session_id = self.session_id.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            // Bounded retry: one extra attempt after a second, then report.
            let mut result = provider
                .snapshot_sandbox(&object_id, &session_id, reason)
                .await;
            if matches!(&result, Err(e) if e.is_transient()) {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                result = provider
                    .snapshot_sandbox(&object_id, &session_id, reason)
                    .await;
            }
            let result = result.map(|s| s.image_id).map_err(|e| e.to_string());
            let _ = self_tx
                .send(Command::SnapshotFinished {
                    reason,
                    prior,
                    result,
                })
                .await;
        });
        Ok(())
    }

    pub(crate) async fn on_snapshot_finished(
        &mut self,
        reason: SnapshotReason,
        prior: SandboxStatus,
        result: Result<String, String>,
    ) -> Result<(), DrydockError> {
        self.snapshot_in_flight = false;
        match result {
            Ok(image_id) => {
                queries::sandbox::set_snapshot_image(&self.db, &image_id).await?;
                if let Some(s) = self.sandbox.as_mut() {
                    s.snapshot_image_id = Some(image_id.clone());
                }
                info!(session_id = %self.session_id, image_id, %reason, "snapshot saved");
                self.broadcast(&ServerFrame::SnapshotSaved { image_id, reason });
            }
            Err(error) => {
                // Log-and-drop: snapshots never block the session.
                warn!(session_id = %self.session_id, error, %reason, "snapshot failed");
            }
        }

        if reason == SnapshotReason::PreTimeout {
            self.set_sandbox_status(SandboxStatus::Stopped).await?;
        } else if self
            .sandbox
            .as_ref()
            .map(|s| s.status == SandboxStatus::Snapshotting)
            .unwrap_or(false)
        {
            // Restore the prior status only if nothing else moved it while
            // the snapshot ran (an explicit stop must stay stopped).
            self.set_sandbox_status(prior).await?;
            // Promotion may have been parked behind the snapshot.
            self.process_next().await?;
        }
        Ok(())
    }

    /// Explicit stop of the sandbox (delete flow and inactivity path).
    pub(crate) async fn stop_sandbox(&mut self) -> Result<(), DrydockError> {
        self.set_sandbox_status(SandboxStatus::Stopped).await?;
        if let Some(sandbox) = self.sandbox.as_ref() {
            if let Some((ws_id, _)) = self.deps.registry.sandbox(&self.session_id, &sandbox.id) {
                self.deps.registry.send(
                    &ws_id,
                    crate::registry::SocketOutbound::Close {
                        code: 1000,
                        reason: "session sandbox stopped".to_string(),
                    },
                );
                self.deps.registry.remove(&ws_id);
            }
        }
        Ok(())
    }

    // --- the single alarm ---

    /// The earliest of the connect deadline, the heartbeat deadline, and the
    /// inactivity deadline, as a tokio instant. `None` when nothing is armed.
    pub(crate) fn next_alarm_instant(&self) -> Option<tokio::time::Instant> {
        let deadline_ms = self.next_alarm_ms()?;
        let now = now_ms();
        let delta = (deadline_ms - now).max(0) as u64;
        Some(tokio::time::Instant::now() + std::time::Duration::from_millis(delta))
    }

    fn next_alarm_ms(&self) -> Option<i64> {
        let lifecycle = &self.cfg().lifecycle;
        let mut earliest: Option<i64> = None;
        let mut consider = |candidate: Option<i64>| {
            if let Some(c) = candidate {
                earliest = Some(match earliest {
                    Some(e) => e.min(c),
                    None => c,
                });
            }
        };

        let Some(sandbox) = self.sandbox.as_ref() else {
            return None;
        };

        // Connect deadline while the sandbox is coming up.
        if matches!(
            sandbox.status,
            SandboxStatus::Spawning
                | SandboxStatus::Connecting
                | SandboxStatus::Warming
                | SandboxStatus::Syncing
        ) {
            consider(self.connect_deadline_ms);
        }

        // Heartbeat deadline while live.
        if sandbox.status.is_usable() {
            if let Some(hb) = sandbox.last_heartbeat {
                consider(Some(hb + (lifecycle.heartbeat_threshold_secs as i64) * 1000));
            }
        }

        // Inactivity deadline while the sandbox is not terminal. Disarmed
        // during an in-flight snapshot; completion re-arms via the run loop.
        if !matches!(
            sandbox.status,
            SandboxStatus::Stopped | SandboxStatus::Failed | SandboxStatus::Snapshotting
        ) {
            if let Some(activity) = sandbox.last_activity {
                consider(Some(
                    activity + (lifecycle.inactivity_timeout_secs as i64) * 1000,
                ));
            }
        }

        earliest
    }

    /// Dispatch whichever deadline(s) expired. Firing re-computes the next
    /// alarm implicitly via the run loop.
    pub(crate) async fn on_alarm(&mut self) -> Result<(), DrydockError> {
        let now = now_ms();
        let lifecycle = self.cfg().lifecycle.clone();
        let Some(sandbox) = self.sandbox.clone() else {
            return Ok(());
        };

        // Connect deadline.
        if matches!(
            sandbox.status,
            SandboxStatus::Spawning
                | SandboxStatus::Connecting
                | SandboxStatus::Warming
                | SandboxStatus::Syncing
        ) {
            if let Some(deadline) = self.connect_deadline_ms {
                if now >= deadline {
                    warn!(session_id = %self.session_id, "sandbox missed its connect deadline");
                    self.connect_deadline_ms = None;
                    self.set_sandbox_status(SandboxStatus::Failed).await?;
                    self.broadcast(&ServerFrame::SandboxError {
                        message: "sandbox failed to connect in time".to_string(),
                    });
                    return Ok(());
                }
            }
        }

        // Heartbeat loss makes the sandbox observationally stale.
        if sandbox.status.is_usable() {
            if let Some(hb) = sandbox.last_heartbeat {
                if now - hb >= (lifecycle.heartbeat_threshold_secs as i64) * 1000 {
                    warn!(session_id = %self.session_id, "heartbeat lost, sandbox is stale");
                    self.set_sandbox_status(SandboxStatus::Stale).await?;
                    return Ok(());
                }
            }
        }

        // Inactivity: snapshot then stop, unless a client is still attached.
        if let Some(activity) = sandbox.last_activity {
            if now - activity >= (lifecycle.inactivity_timeout_secs as i64) * 1000
                && !matches!(
                    sandbox.status,
                    SandboxStatus::Stopped | SandboxStatus::Failed | SandboxStatus::Snapshotting
                )
            {
                if self.deps.registry.client_count(&self.session_id) > 0 {
                    debug!(session_id = %self.session_id, "inactivity alarm with clients attached, re-arming");
                    self.record_activity().await?;
                } else if self.snapshot_in_flight {
                    // An unrelated snapshot is running; defer the stop.
                    self.record_activity().await?;
                } else {
                    info!(session_id = %self.session_id, "inactivity timeout, snapshotting and stopping");
                    if sandbox.object_id.is_some() {
                        self.trigger_snapshot(SnapshotReason::PreTimeout).await?;
                    } else {
                        self.stop_sandbox().await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> LifecycleConfig {
        LifecycleConfig {
            breaker_max_failures: 3,
            breaker_window_secs: 60,
            breaker_cooldown_secs: 300,
            ..LifecycleConfig::default()
        }
    }

    #[test]
    fn breaker_opens_after_threshold_within_window() {
        let mut breaker = CircuitBreaker::new(&test_cfg());
        assert!(!breaker.record_failure(1_000));
        assert!(!breaker.record_failure(2_000));
        assert!(breaker.record_failure(3_000), "third failure opens");
        assert!(breaker.is_open(3_001));
    }

    #[test]
    fn breaker_window_resets_between_sparse_failures() {
        let mut breaker = CircuitBreaker::new(&test_cfg());
        breaker.record_failure(0);
        breaker.record_failure(1_000);
        // Outside the 60 s window: the count restarts.
        assert!(!breaker.record_failure(100_000));
        assert_eq!(breaker.failures(), 1);
        assert!(!breaker.is_open(100_000));
    }

    #[test]
    fn breaker_cooldown_elapses() {
        let mut breaker = CircuitBreaker::new(&test_cfg());
        for t in [0, 1, 2] {
            breaker.record_failure(t);
        }
        assert!(breaker.is_open(10_000));
        // 300 s cooldown.
        assert!(!breaker.is_open(2 + 300_000));
    }

    #[test]
    fn breaker_success_resets_to_zero() {
        let mut breaker = CircuitBreaker::new(&test_cfg());
        breaker.record_failure(0);
        breaker.record_failure(1);
        breaker.record_failure(2);
        assert!(breaker.is_open(3));

        breaker.record_success();
        assert_eq!(breaker.failures(), 0);
        assert!(!breaker.is_open(3));
        // Counting starts over afterwards.
        assert!(!breaker.record_failure(4));
    }

    #[test]
    fn breaker_failures_nondecreasing_within_window() {
        let mut breaker = CircuitBreaker::new(&test_cfg());
        let mut last = 0;
        for t in [0, 10, 20, 30] {
            breaker.record_failure(t);
            assert!(breaker.failures() >= last);
            last = breaker.failures();
        }
    }

    #[test]
    fn breaker_restores_from_persisted_state() {
        let breaker = CircuitBreaker::from_persisted(&test_cfg(), (2, Some(50_000)));
        assert_eq!(breaker.failures(), 2);
        assert!(breaker.is_open(50_001));
        assert!(!breaker.is_open(50_000 + 300_000));
    }
}
