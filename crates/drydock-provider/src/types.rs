// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the provider API.
//!
//! The provider wraps every response in a `{success, data | error}` envelope.
//! Request bodies are snake_case throughout.

use serde::{Deserialize, Serialize};

/// The provider's uniform response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body for `create-sandbox`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSandboxBody {
    pub session_id: String,
    pub sandbox_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub control_plane_url: String,
    pub sandbox_auth_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_user_email: Option<String>,
}

/// Body for `warm-sandbox`.
#[derive(Debug, Clone, Serialize)]
pub struct WarmSandboxBody {
    pub repo_owner: String,
    pub repo_name: String,
    pub control_plane_url: String,
}

/// Body for `snapshot-sandbox`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSandboxBody {
    /// The provider's internal object id, not the coordinator-issued id.
    pub sandbox_id: String,
    pub session_id: String,
    pub reason: String,
}

/// Body for `restore-sandbox`.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSandboxBody {
    pub snapshot_image_id: String,
    pub session_config: RestoreSessionConfig,
    pub sandbox_id: String,
    pub control_plane_url: String,
    pub sandbox_auth_token: String,
}

/// The session config echoed into a restored sandbox's environment.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSessionConfig {
    pub session_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_success_shape() {
        let json = r#"{"success":true,"data":{"image_id":"im-1"}}"#;
        let env: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(env.success);
        assert!(env.error.is_none());
        assert_eq!(env.data.unwrap()["image_id"], "im-1");
    }

    #[test]
    fn envelope_parses_failure_shape() {
        let json = r#"{"success":false,"error":"sandbox not found"}"#;
        let env: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(!env.success);
        assert_eq!(env.error.as_deref(), Some("sandbox not found"));
    }

    #[test]
    fn create_body_is_snake_case() {
        let body = CreateSandboxBody {
            session_id: "s1".into(),
            sandbox_id: "sb1".into(),
            repo_owner: "acme".into(),
            repo_name: "widgets".into(),
            control_plane_url: "https://coord.example".into(),
            sandbox_auth_token: "tok".into(),
            snapshot_id: None,
            model: "claude-sonnet-4-5".into(),
            git_user_name: None,
            git_user_email: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"sandbox_auth_token\""));
        assert!(json.contains("\"control_plane_url\""));
        assert!(!json.contains("snapshot_id"), "None fields are omitted");
    }
}
