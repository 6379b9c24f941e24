// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain enums and small shared types.
//!
//! All enums serialize as lowercase snake_case strings, both in JSON payloads
//! and in SQLite columns. Ids are 128-bit random values rendered as 32
//! lowercase hex characters; timestamps are integer milliseconds since epoch.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle of a session. Sessions are never destroyed by the coordinator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Completed,
    Archived,
}

/// Role of a participant within a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Member,
}

/// Status of a prompt in the FIFO. Transitions are monotonic:
/// `pending -> processing -> {completed | failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Where a prompt came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Web,
    Slack,
    Extension,
    Github,
}

/// Status of the single sandbox bound to a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Pending,
    Spawning,
    Connecting,
    Warming,
    Syncing,
    Ready,
    Running,
    Stale,
    Snapshotting,
    Stopped,
    Failed,
}

impl SandboxStatus {
    /// A sandbox that can accept a prompt right now.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Terminal or observationally-dead states that refuse further sandbox
    /// connections (HTTP 410 on upgrade).
    pub fn is_dead(self) -> bool {
        matches!(self, Self::Stopped | Self::Stale)
    }
}

/// Progress of the initial repository sync inside the sandbox.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GitSyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Persisted event types, append-only per session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ToolCall,
    ToolResult,
    Token,
    Error,
    GitSync,
    Heartbeat,
    ExecutionComplete,
    PushComplete,
    PushError,
    Artifact,
}

/// Why a snapshot was taken. Carried to the provider and into `snapshot_saved`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Manual,
    ExecutionComplete,
    PreTimeout,
    HeartbeatTimeout,
}

/// Whether a provider failure may be retried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Git identity of the participant whose prompt is being executed, forwarded
/// to the sandbox for commit attribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sandbox_status_round_trips_through_strings() {
        for s in [
            SandboxStatus::Pending,
            SandboxStatus::Spawning,
            SandboxStatus::Connecting,
            SandboxStatus::Warming,
            SandboxStatus::Syncing,
            SandboxStatus::Ready,
            SandboxStatus::Running,
            SandboxStatus::Stale,
            SandboxStatus::Snapshotting,
            SandboxStatus::Stopped,
            SandboxStatus::Failed,
        ] {
            let text = s.to_string();
            assert_eq!(SandboxStatus::from_str(&text).unwrap(), s);
        }
    }

    #[test]
    fn message_status_serializes_snake_case() {
        assert_eq!(MessageStatus::Processing.to_string(), "processing");
        let json = serde_json::to_string(&MessageStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn usable_and_dead_states() {
        assert!(SandboxStatus::Ready.is_usable());
        assert!(SandboxStatus::Running.is_usable());
        assert!(!SandboxStatus::Connecting.is_usable());
        assert!(SandboxStatus::Stopped.is_dead());
        assert!(SandboxStatus::Stale.is_dead());
        assert!(!SandboxStatus::Failed.is_dead());
    }

    #[test]
    fn snapshot_reason_matches_provider_wire_values() {
        assert_eq!(SnapshotReason::ExecutionComplete.to_string(), "execution_complete");
        assert_eq!(SnapshotReason::PreTimeout.to_string(), "pre_timeout");
        assert_eq!(SnapshotReason::HeartbeatTimeout.to_string(), "heartbeat_timeout");
    }

    #[test]
    fn prompt_author_uses_camel_case_keys() {
        let author = PromptAuthor {
            github_login: Some("octocat".into()),
            github_name: Some("Octo Cat".into()),
            github_email: Some("octo@example.com".into()),
        };
        let json = serde_json::to_string(&author).unwrap();
        assert!(json.contains("\"githubName\""), "got: {json}");
        assert!(json.contains("\"githubEmail\""));
        assert!(!json.contains("github_name"));
    }
}
