// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! These types represent the rows stored in the per-session SQLite file.
//! Enums come from `drydock-core` and are persisted as their lowercase
//! string forms; all timestamps are integer milliseconds since epoch.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use drydock_core::types::{
    EventType, GitSyncStatus, MessageSource, MessageStatus, ParticipantRole, SandboxStatus,
    SessionStatus,
};

/// The singleton session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// External routing key; defaults to the id.
    pub session_name: String,
    pub title: Option<String>,
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_default_branch: Option<String>,
    pub branch_name: Option<String>,
    pub base_sha: Option<String>,
    pub current_sha: Option<String>,
    /// Session id of the agent process inside the sandbox, once reported.
    pub agent_session_id: Option<String>,
    pub model: String,
    pub status: SessionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A human or service identity with access to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub user_id: String,
    pub github_user_id: Option<String>,
    pub github_login: Option<String>,
    pub github_name: Option<String>,
    pub github_email: Option<String>,
    pub role: ParticipantRole,
    /// `hex(nonce || ciphertext)` of the access token, sealed at rest.
    pub access_token_sealed: Option<String>,
    pub token_expires_at: Option<i64>,
    /// SHA-256 hex of the current WebSocket token. The plaintext is never stored.
    pub ws_auth_token_hash: Option<String>,
    pub ws_token_created_at: Option<i64>,
    pub joined_at: i64,
}

/// A prompt in the FIFO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub source: MessageSource,
    /// Per-message model override.
    pub model: Option<String>,
    /// Serialized attachments, compact JSON.
    pub attachments: Option<String>,
    /// Opaque JSON for downstream notification.
    pub callback_context: Option<String>,
    pub status: MessageStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// An observation from the sandbox or the coordinator, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    /// Compact JSON payload as received on the wire.
    pub payload: String,
    pub message_id: Option<String>,
    pub created_at: i64,
}

/// The single sandbox instance bound to this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: String,
    /// The provider's internal id, required for snapshot calls.
    pub object_id: Option<String>,
    pub status: SandboxStatus,
    pub git_sync_status: GitSyncStatus,
    /// Token issued to this sandbox; the sandbox socket authenticates with it.
    pub auth_token: String,
    pub last_heartbeat: Option<i64>,
    pub last_activity: Option<i64>,
    pub snapshot_image_id: Option<String>,
    pub circuit_breaker_failures: i64,
    pub circuit_breaker_opened_at: Option<i64>,
    pub created_at: i64,
}

/// An externally visible product of a session (PR, screenshot, preview URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub artifact_type: String,
    pub url: String,
    pub metadata: Option<String>,
    pub created_at: i64,
}

/// Hibernation-recovery row: ws_id tag to authenticated participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsClientMapping {
    pub ws_id: String,
    pub participant_id: String,
    pub client_id: String,
    pub created_at: i64,
}

/// An entry in the cross-session index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub id: String,
    pub session_name: String,
    pub title: Option<String>,
    pub repo_owner: String,
    pub repo_name: String,
    pub status: SessionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Parse a stored enum string, reporting a column conversion failure on mismatch.
pub(crate) fn parse_enum<T>(value: String, column: usize) -> Result<T, rusqlite::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enum_accepts_stored_values() {
        let status: SandboxStatus = parse_enum("snapshotting".to_string(), 0).unwrap();
        assert_eq!(status, SandboxStatus::Snapshotting);
    }

    #[test]
    fn parse_enum_rejects_unknown_values() {
        let result: Result<MessageStatus, _> = parse_enum("exploded".to_string(), 3);
        assert!(result.is_err());
    }
}
