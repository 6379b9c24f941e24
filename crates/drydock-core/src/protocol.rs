// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket wire protocol.
//!
//! Every frame is a JSON object discriminated by `type`, with camelCase
//! payload keys. Frames are parsed into these tagged variants at the socket
//! boundary; unparsed JSON never travels further inward. Unknown frame types
//! fail deserialization and are dropped with a warning at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{GitSyncStatus, PromptAuthor, SandboxStatus, SessionStatus, SnapshotReason};

/// Close code: invalid or missing auth token.
pub const CLOSE_INVALID_AUTH: u16 = 4001;
/// Close code: in-memory state lost after hibernation; the client must reconnect.
pub const CLOSE_STATE_LOST: u16 = 4002;
/// Close code: no valid `subscribe` within the authentication window.
pub const CLOSE_AUTH_TIMEOUT: u16 = 4008;

/// Frames sent by clients (web UI, chat bot, extension) to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    #[serde(rename_all = "camelCase")]
    Subscribe { token: String, client_id: String },
    Prompt {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Value>,
    },
    Stop,
    Typing,
    Presence {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<Value>,
    },
}

/// A connected peer, reported in presence frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePeer {
    pub participant_id: String,
    pub client_id: String,
}

/// Frames broadcast by the coordinator to client sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Pong { timestamp: i64 },
    #[serde(rename_all = "camelCase")]
    Subscribed {
        session_id: String,
        state: Value,
        participant_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    PromptQueued { message_id: String, position: i64 },
    SandboxEvent { event: Value },
    PresenceSync { peers: Vec<PresencePeer> },
    #[serde(rename_all = "camelCase")]
    PresenceUpdate {
        participant_id: String,
        client_id: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    PresenceLeave { client_id: String },
    SandboxWarming,
    SandboxSpawning,
    SandboxStatus { status: SandboxStatus },
    SandboxReady,
    SandboxError { message: String },
    SandboxWarning { message: String },
    #[serde(rename_all = "camelCase")]
    SandboxRestored { image_id: String },
    #[serde(rename_all = "camelCase")]
    SnapshotSaved {
        image_id: String,
        reason: SnapshotReason,
    },
    ArtifactCreated { artifact: Value },
    SessionStatus { status: SessionStatus },
    #[serde(rename_all = "camelCase")]
    ProcessingStatus { is_processing: bool },
    Error { code: u16, message: String },
}

/// Events streamed by the sandbox bridge to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxEvent {
    /// Bridge hello, sent once per connection. Carries the agent-side session id.
    #[serde(rename_all = "camelCase")]
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sandbox_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sandbox_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Token {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool: String,
        args: Value,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    GitSync {
        status: GitSyncStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ExecutionComplete {
        message_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Artifact {
        artifact_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    PushComplete { branch_name: String },
    #[serde(rename_all = "camelCase")]
    PushError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_name: Option<String>,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl SandboxEvent {
    /// The explicit message correlation carried by the event, if any.
    ///
    /// Takes strict priority over the ambient "currently processing" message:
    /// an event from message A arriving after B began must still attach to A.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Token { message_id, .. }
            | Self::ToolCall { message_id, .. }
            | Self::ToolResult { message_id, .. }
            | Self::Error { message_id, .. } => message_id.as_deref(),
            Self::ExecutionComplete { message_id, .. } => Some(message_id),
            _ => None,
        }
    }
}

/// Commands sent by the coordinator to the sandbox bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxCommand {
    #[serde(rename_all = "camelCase")]
    Prompt {
        message_id: String,
        content: String,
        model: String,
        author: PromptAuthor,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Push {
        branch_name: String,
        repo_owner: String,
        repo_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        github_token: Option<String>,
    },
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses_camel_case() {
        let json = r#"{"type":"subscribe","token":"abc123","clientId":"web-1"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                token: "abc123".into(),
                client_id: "web-1".into()
            }
        );
    }

    #[test]
    fn prompt_frame_parses_with_optional_fields_absent() {
        let json = r#"{"type":"prompt","content":"rename foo"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Prompt {
                content,
                model,
                attachments,
            } => {
                assert_eq!(content, "rename foo");
                assert!(model.is_none());
                assert!(attachments.is_none());
            }
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let json = r#"{"type":"launch_missiles"}"#;
        assert!(serde_json::from_str::<ClientFrame>(json).is_err());
    }

    #[test]
    fn execution_complete_round_trips() {
        let json = r#"{"type":"execution_complete","messageId":"m1","success":true}"#;
        let event: SandboxEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.message_id(), Some("m1"));
        let back = serde_json::to_string(&event).unwrap();
        assert!(back.contains("\"messageId\":\"m1\""), "got: {back}");
    }

    #[test]
    fn push_complete_uses_branch_name_key() {
        let event = SandboxEvent::PushComplete {
            branch_name: "drydock/abc123".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"branchName\""), "got: {json}");
    }

    #[test]
    fn heartbeat_parses_bridge_shape() {
        let json =
            r#"{"type":"heartbeat","sandboxId":"sb-1","status":"ready","timestamp":1700000000.5}"#;
        let event: SandboxEvent = serde_json::from_str(json).unwrap();
        match event {
            SandboxEvent::Heartbeat {
                sandbox_id, status, ..
            } => {
                assert_eq!(sandbox_id.as_deref(), Some("sb-1"));
                assert_eq!(status.as_deref(), Some("ready"));
            }
            other => panic!("expected heartbeat, got {other:?}"),
        }
    }

    #[test]
    fn event_message_id_prefers_explicit_correlation() {
        let token = SandboxEvent::Token {
            content: "x".into(),
            message_id: Some("m-a".into()),
        };
        assert_eq!(token.message_id(), Some("m-a"));

        let heartbeat = SandboxEvent::Heartbeat {
            sandbox_id: None,
            status: None,
            timestamp: None,
        };
        assert_eq!(heartbeat.message_id(), None);
    }

    #[test]
    fn prompt_command_serializes_for_bridge() {
        let cmd = SandboxCommand::Prompt {
            message_id: "m1".into(),
            content: "fix the bug".into(),
            model: "claude-sonnet-4-5".into(),
            author: PromptAuthor {
                github_login: None,
                github_name: Some("Dev".into()),
                github_email: Some("dev@example.com".into()),
            },
            attachments: None,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"prompt\""));
        assert!(json.contains("\"messageId\":\"m1\""));
        assert!(json.contains("\"githubEmail\""));
    }

    #[test]
    fn server_frame_processing_status_key() {
        let frame = ServerFrame::ProcessingStatus {
            is_processing: true,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"processing_status","isProcessing":true}"#);
    }

    #[test]
    fn server_frame_snapshot_saved_round_trips() {
        let frame = ServerFrame::SnapshotSaved {
            image_id: "im-1".into(),
            reason: SnapshotReason::ExecutionComplete,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"imageId\":\"im-1\""));
        assert!(json.contains("\"reason\":\"execution_complete\""));
        let back: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
