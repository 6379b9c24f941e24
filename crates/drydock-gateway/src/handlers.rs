// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the session surface.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use drydock_coordinator::{
    event_envelope, CreateSessionParams, EnqueuePromptRequest, ParticipantSpec, PrOrigin,
};
use drydock_core::types::{EventType, MessageSource, MessageStatus};
use drydock_core::DrydockError;
use drydock_crypto::verify_service_token;

use crate::server::GatewayState;

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 200;

/// The uniform error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Adapter from the typed error to the HTTP envelope.
pub struct ApiError(pub DrydockError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DrydockError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DrydockError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            DrydockError::NotFound(_) => StatusCode::NOT_FOUND,
            DrydockError::Gone(_) => StatusCode::GONE,
            DrydockError::Logical(_) => StatusCode::CONFLICT,
            DrydockError::Provider(_) | DrydockError::RepoHost { .. } => StatusCode::BAD_GATEWAY,
            DrydockError::Config(_)
            | DrydockError::Storage { .. }
            | DrydockError::Crypto(_)
            | DrydockError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DrydockError> for ApiError {
    fn from(e: DrydockError) -> Self {
        Self(e)
    }
}

/// Paginated list envelope: `{items, cursor, hasMore}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub cursor: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

// --- public routes ---

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// --- session collection ---

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    pub owner: ParticipantSpec,
}

/// POST /sessions
pub async fn create_session(
    State(state): State<GatewayState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Response, ApiError> {
    if body.repo_owner.trim().is_empty() || body.repo_name.trim().is_empty() {
        return Err(DrydockError::InvalidInput(
            "repo_owner and repo_name are required".to_string(),
        )
        .into());
    }
    let handle = state
        .router
        .create_session(CreateSessionParams {
            // Repository identifiers normalize to lowercase at the boundary.
            repo_owner: body.repo_owner.trim().to_lowercase(),
            repo_name: body.repo_name.trim().to_lowercase(),
            title: body.title,
            model: body.model,
            session_name: body.session_name,
            owner: body.owner,
        })
        .await?;
    let snapshot = handle.state().await?;
    Ok((StatusCode::CREATED, Json(snapshot)).into_response())
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<GatewayState>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    let limit = clamp_limit(params.limit);
    let (items, has_more) = state.router.list_sessions(params.cursor, limit).await?;
    let cursor = items.last().map(|e| e.created_at);
    Ok(Json(PageBody {
        items,
        cursor,
        has_more,
    })
    .into_response())
}

// --- single-session routes ---

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    Ok(Json(handle.state().await?).into_response())
}

/// DELETE /sessions/{id}
pub async fn delete_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    // 404 for sessions that never existed.
    state.router.get(&id).await?;
    state.router.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })).into_response())
}

/// POST /sessions/{id}/warm
pub async fn warm_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    let status = handle.warm().await?;
    Ok(Json(serde_json::json!({ "status": status })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub attachments: Option<serde_json::Value>,
    #[serde(default)]
    pub callback_context: Option<serde_json::Value>,
}

/// POST /sessions/{id}/prompt
///
/// Responds only after the message is durably enqueued and processing has
/// been kicked; the body carries the id and 1-based queue position.
pub async fn enqueue_prompt(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<PromptBody>,
) -> Result<Response, ApiError> {
    let source = match body.source.as_deref() {
        None => MessageSource::Web,
        Some(s) => MessageSource::from_str(s)
            .map_err(|_| DrydockError::InvalidInput(format!("unknown source: {s}")))?,
    };
    let handle = state.router.get(&id).await?;
    let queued = handle
        .enqueue_prompt(EnqueuePromptRequest {
            user_id: body.user_id,
            content: body.content,
            source,
            model: body.model,
            attachments: body.attachments,
            callback_context: body.callback_context,
        })
        .await?;
    Ok(Json(queued).into_response())
}

/// POST /sessions/{id}/stop
///
/// A stop with nothing running is a no-op 200 and fails no message.
pub async fn stop_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    handle.stop_execution().await?;
    Ok(Json(serde_json::json!({ "stopped": true })).into_response())
}

/// GET /sessions/{id}/events
pub async fn list_events(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    let event_type = match params.event_type.as_deref() {
        None => None,
        Some(t) => Some(
            EventType::from_str(t)
                .map_err(|_| DrydockError::InvalidInput(format!("unknown event type: {t}")))?,
        ),
    };
    let limit = clamp_limit(params.limit);
    let handle = state.router.get(&id).await?;
    let (events, has_more) = handle
        .list_events(params.cursor, limit, event_type, params.message_id)
        .await?;
    let cursor = events.last().map(|e| e.created_at);
    Ok(Json(PageBody {
        items: events.iter().map(event_envelope).collect::<Vec<_>>(),
        cursor,
        has_more,
    })
    .into_response())
}

/// GET /sessions/{id}/messages
pub async fn list_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(
            MessageStatus::from_str(s)
                .map_err(|_| DrydockError::InvalidInput(format!("unknown status: {s}")))?,
        ),
    };
    let limit = clamp_limit(params.limit);
    let handle = state.router.get(&id).await?;
    let (messages, has_more) = handle.list_messages(params.cursor, limit, status).await?;
    let cursor = messages.last().map(|m| m.created_at);
    Ok(Json(PageBody {
        items: messages,
        cursor,
        has_more,
    })
    .into_response())
}

/// GET /sessions/{id}/artifacts
pub async fn list_artifacts(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    Ok(Json(serde_json::json!({ "artifacts": handle.list_artifacts().await? }))
        .into_response())
}

/// GET /sessions/{id}/participants
pub async fn list_participants(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    let participants = handle.list_participants().await?;
    Ok(Json(serde_json::json!({ "participants": participants })).into_response())
}

/// POST /sessions/{id}/participants
pub async fn add_participant(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(spec): Json<ParticipantSpec>,
) -> Result<Response, ApiError> {
    if spec.user_id.trim().is_empty() {
        return Err(DrydockError::InvalidInput("user_id is required".to_string()).into());
    }
    let handle = state.router.get(&id).await?;
    let participant = handle.add_participant(spec).await?;
    Ok((StatusCode::CREATED, Json(participant)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct WsTokenBody {
    pub user_id: String,
}

/// POST /sessions/{id}/ws-token
///
/// Mints a fresh client WebSocket token; only its SHA-256 is persisted, and
/// minting invalidates the participant's previous token.
pub async fn mint_ws_token(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<WsTokenBody>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    let token = handle.mint_ws_token(&body.user_id).await?;
    Ok(Json(serde_json::json!({ "token": token })).into_response())
}

/// POST /sessions/{id}/archive
pub async fn archive_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    let status = handle.set_archived(true).await?;
    Ok(Json(serde_json::json!({ "status": status })).into_response())
}

/// POST /sessions/{id}/unarchive
pub async fn unarchive_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.router.get(&id).await?;
    let status = handle.set_archived(false).await?;
    Ok(Json(serde_json::json!({ "status": status })).into_response())
}

/// POST /sessions/{id}/pr
///
/// Dual authentication: a valid service token acts as the internal flow; any
/// other bearer is treated as a sandbox token and validated by the session
/// coordinator against its stored `auth_token`.
pub async fn create_pr(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            DrydockError::Unauthenticated("missing Authorization bearer".to_string())
        })?;

    let origin = match state.auth.callback_secret.as_deref() {
        Some(secret)
            if verify_service_token(secret, bearer, chrono::Utc::now().timestamp_millis()) =>
        {
            PrOrigin::Service
        }
        _ => PrOrigin::SandboxToken(bearer.to_string()),
    };

    let handle = state.router.get(&id).await?;
    let created = handle.create_pr(origin).await?;
    Ok(Json(created).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(100_000)), MAX_PAGE_LIMIT);
    }

    #[test]
    fn error_mapping_matches_error_kinds() {
        let cases = [
            (DrydockError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (DrydockError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (DrydockError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DrydockError::Gone("x".into()), StatusCode::GONE),
            (DrydockError::Logical("x".into()), StatusCode::CONFLICT),
            (DrydockError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn page_body_serializes_camel_case() {
        let body = PageBody {
            items: vec![1, 2, 3],
            cursor: Some(42),
            has_more: true,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"hasMore\":true"));
        assert!(json.contains("\"cursor\":42"));
    }

    #[test]
    fn error_body_serializes_envelope() {
        let body = ErrorBody {
            error: "boom".to_string(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"boom"}"#);
    }
}
