// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording in-memory repo host.

use std::sync::Mutex;

use async_trait::async_trait;

use drydock_core::traits::{CreatePullRequest, InstallationToken, PullRequest, Repository};
use drydock_core::{DrydockError, RepoHost};

/// The token the mock mints for installations.
pub const MOCK_INSTALLATION_TOKEN: &str = "ghs_mock_installation";

#[derive(Default)]
struct MockRepoHostState {
    repository_calls: Vec<String>,
    installation_tokens_minted: u32,
    created_prs: Vec<(CreatePullRequest, String)>,
}

/// A repo host that records every call and answers with canned data.
#[derive(Default)]
pub struct MockRepoHost {
    state: Mutex<MockRepoHostState>,
}

impl MockRepoHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// User tokens presented to `repository`, in call order.
    pub fn repository_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().repository_calls.clone()
    }

    pub fn installation_tokens_minted(&self) -> u32 {
        self.state.lock().unwrap().installation_tokens_minted
    }

    /// `(request, user_token)` pairs for every created PR.
    pub fn created_prs(&self) -> Vec<(CreatePullRequest, String)> {
        self.state.lock().unwrap().created_prs.clone()
    }
}

#[async_trait]
impl RepoHost for MockRepoHost {
    async fn repository(
        &self,
        _owner: &str,
        _repo: &str,
        user_token: &str,
    ) -> Result<Repository, DrydockError> {
        self.state
            .lock()
            .unwrap()
            .repository_calls
            .push(user_token.to_string());
        Ok(Repository {
            default_branch: "main".to_string(),
        })
    }

    async fn installation_token(&self) -> Result<InstallationToken, DrydockError> {
        self.state.lock().unwrap().installation_tokens_minted += 1;
        Ok(InstallationToken {
            token: MOCK_INSTALLATION_TOKEN.to_string(),
            expires_at: None,
        })
    }

    async fn create_pull_request(
        &self,
        req: &CreatePullRequest,
        user_token: &str,
    ) -> Result<PullRequest, DrydockError> {
        let mut state = self.state.lock().unwrap();
        state.created_prs.push((req.clone(), user_token.to_string()));
        let number = state.created_prs.len() as i64;
        Ok(PullRequest {
            number,
            html_url: format!(
                "https://github.com/{}/{}/pull/{number}",
                req.repo_owner, req.repo_name
            ),
        })
    }
}
