// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Programmable in-memory sandbox provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use drydock_core::traits::{
    CreateSandboxRequest, RestoreSandboxRequest, SandboxCreated, SnapshotInfo, SnapshotTaken,
};
use drydock_core::types::SnapshotReason;
use drydock_core::{ProviderError, SandboxProvider};

#[derive(Default)]
struct MockProviderState {
    create_failures: VecDeque<ProviderError>,
    restore_failures: VecDeque<ProviderError>,
    snapshot_failures: VecDeque<ProviderError>,
    create_calls: u32,
    restore_calls: u32,
    snapshot_calls: u32,
    snapshot_counter: u32,
    latest_snapshot: Option<String>,
}

/// A sandbox provider whose failures are scripted per operation. Successful
/// calls fabricate plausible ids; counters record what was attempted.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockProviderState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `n` transient failures for `create_sandbox`.
    pub fn fail_create_transient(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state
                .create_failures
                .push_back(ProviderError::transient("create-sandbox returned 503"));
        }
    }

    /// Queue one permanent failure for `create_sandbox`.
    pub fn fail_create_permanent(&self) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .push_back(ProviderError::permanent("create-sandbox returned 400"));
    }

    /// Queue `n` failures for `restore_sandbox`.
    pub fn fail_restore(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state
                .restore_failures
                .push_back(ProviderError::permanent("restore-sandbox: image not found"));
        }
    }

    /// Queue `n` transient failures for `snapshot_sandbox`.
    pub fn fail_snapshot_transient(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state
                .snapshot_failures
                .push_back(ProviderError::transient("snapshot-sandbox returned 503"));
        }
    }

    pub fn create_calls(&self) -> u32 {
        self.state.lock().unwrap().create_calls
    }

    pub fn restore_calls(&self) -> u32 {
        self.state.lock().unwrap().restore_calls
    }

    pub fn snapshot_calls(&self) -> u32 {
        self.state.lock().unwrap().snapshot_calls
    }
}

#[async_trait]
impl SandboxProvider for MockProvider {
    async fn create_sandbox(
        &self,
        req: &CreateSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if let Some(failure) = state.create_failures.pop_front() {
            return Err(failure);
        }
        Ok(SandboxCreated {
            sandbox_id: req.sandbox_id.clone(),
            object_id: Some(format!("obj-{}", req.sandbox_id)),
            status: "warming".to_string(),
            created_at: None,
        })
    }

    async fn warm_sandbox(
        &self,
        _repo_owner: &str,
        _repo_name: &str,
    ) -> Result<SandboxCreated, ProviderError> {
        Ok(SandboxCreated {
            sandbox_id: "warm-pool".to_string(),
            object_id: None,
            status: "warming".to_string(),
            created_at: None,
        })
    }

    async fn snapshot_sandbox(
        &self,
        object_id: &str,
        _session_id: &str,
        _reason: SnapshotReason,
    ) -> Result<SnapshotTaken, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        if let Some(failure) = state.snapshot_failures.pop_front() {
            return Err(failure);
        }
        state.snapshot_counter += 1;
        let image_id = format!("im-{}-{}", object_id, state.snapshot_counter);
        state.latest_snapshot = Some(image_id.clone());
        Ok(SnapshotTaken { image_id })
    }

    async fn restore_sandbox(
        &self,
        req: &RestoreSandboxRequest,
    ) -> Result<SandboxCreated, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.restore_calls += 1;
        if let Some(failure) = state.restore_failures.pop_front() {
            return Err(failure);
        }
        Ok(SandboxCreated {
            sandbox_id: req.sandbox_id.clone(),
            object_id: Some(format!("obj-{}", req.sandbox_id)),
            status: "warming".to_string(),
            created_at: None,
        })
    }

    async fn latest_snapshot(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<Option<SnapshotInfo>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state.latest_snapshot.as_ref().map(|image_id| SnapshotInfo {
            image_id: image_id.clone(),
            repo_owner: repo_owner.to_string(),
            repo_name: repo_name.to_string(),
            created_at: None,
        }))
    }

    async fn health(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateSandboxRequest {
        CreateSandboxRequest {
            session_id: "s1".into(),
            sandbox_id: "sb1".into(),
            repo_owner: "acme".into(),
            repo_name: "widgets".into(),
            control_plane_url: String::new(),
            sandbox_auth_token: "tok".into(),
            model: "m".into(),
            git_user: None,
        }
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let provider = MockProvider::new();
        provider.fail_create_transient(2);

        assert!(provider.create_sandbox(&create_request()).await.is_err());
        assert!(provider.create_sandbox(&create_request()).await.is_err());
        let ok = provider.create_sandbox(&create_request()).await.unwrap();
        assert_eq!(ok.object_id.as_deref(), Some("obj-sb1"));
        assert_eq!(provider.create_calls(), 3);
    }

    #[tokio::test]
    async fn snapshots_count_up() {
        let provider = MockProvider::new();
        let a = provider
            .snapshot_sandbox("obj-1", "s1", SnapshotReason::Manual)
            .await
            .unwrap();
        let b = provider
            .snapshot_sandbox("obj-1", "s1", SnapshotReason::Manual)
            .await
            .unwrap();
        assert_ne!(a.image_id, b.image_id);
        assert_eq!(provider.snapshot_calls(), 2);

        let latest = provider.latest_snapshot("acme", "widgets").await.unwrap();
        assert_eq!(latest.unwrap().image_id, b.image_id);
    }
}
