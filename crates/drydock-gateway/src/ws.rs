// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket upgrade handling for client and sandbox sockets.
//!
//! Both kinds are distinguished by the `type` query parameter. Client
//! sockets get a fresh `ws_id` tag at accept time, a 30 s window to send a
//! valid `subscribe` (close 4008 otherwise), and a local ping→pong
//! auto-response so idle keepalives never wake the coordinator. The sandbox
//! socket is validated against the stored `auth_token` and `X-Sandbox-ID`
//! before the upgrade completes; a dead sandbox refuses with HTTP 410.
//!
//! Each inbound frame re-resolves the session actor through the router, so
//! frames arriving after an actor eviction transparently resume it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use drydock_core::protocol::{ClientFrame, SandboxEvent, ServerFrame, CLOSE_AUTH_TIMEOUT};
use drydock_core::DrydockError;
use drydock_coordinator::SocketOutbound;

use crate::handlers::ApiError;
use crate::server::GatewayState;

/// GET /sessions/{id}/ws — upgrade to a client or sandbox socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    let is_sandbox = params.get("type").map(|t| t == "sandbox").unwrap_or(false);

    // The session must exist for either kind; resolving it here also resumes
    // an evicted actor before the socket opens.
    let handle = match state.router.get(&id).await {
        Ok(handle) => handle,
        Err(e) => return ApiError(e).into_response(),
    };

    if is_sandbox {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(String::from);
        let sandbox_id = headers
            .get("x-sandbox-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let (Some(bearer), Some(sandbox_id)) = (bearer, sandbox_id) else {
            return ApiError(DrydockError::Unauthenticated(
                "sandbox sockets require Authorization and X-Sandbox-ID".to_string(),
            ))
            .into_response();
        };

        // Refuse before upgrade: 401 for bad credentials, 410 for a sandbox
        // that has moved to stopped/stale.
        if let Err(e) = handle.validate_sandbox(&bearer, &sandbox_id).await {
            return ApiError(e).into_response();
        }

        ws.on_upgrade(move |socket| {
            sandbox_socket_task(socket, state, id, bearer, sandbox_id)
        })
    } else {
        ws.on_upgrade(move |socket| client_socket_task(socket, state, id))
    }
}

/// Drive one client socket until it closes.
async fn client_socket_task(socket: WebSocket, state: GatewayState, session_id: String) {
    let ws_id = uuid::Uuid::new_v4().simple().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<SocketOutbound>(64);

    if let Ok(handle) = state.router.get(&session_id).await {
        handle.client_socket_opened(&ws_id, out_tx.clone()).await;
    }

    // Writer: outbound frames and closes from the coordinator.
    let writer_task = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                SocketOutbound::Frame(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SocketOutbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Authentication timeout: close 4008 unless a subscribe lands in time.
    let authenticated = Arc::new(AtomicBool::new(false));
    let auth_flag = authenticated.clone();
    let auth_tx = out_tx.clone();
    let auth_timeout_secs = state.cfg.lifecycle.ws_auth_timeout_secs;
    let auth_task = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(auth_timeout_secs)).await;
        if !auth_flag.load(Ordering::SeqCst) {
            let _ = auth_tx
                .send(SocketOutbound::Close {
                    code: CLOSE_AUTH_TIMEOUT,
                    reason: "authentication timeout".to_string(),
                })
                .await;
        }
    });

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => {
                let text_str: &str = &text;
                let frame: ClientFrame = match serde_json::from_str(text_str) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(ws_id, error = %e, "invalid client frame");
                        send_error(&out_tx, 400, "invalid frame").await;
                        continue;
                    }
                };

                match frame {
                    // Pong locally; idle keepalives never wake the actor.
                    ClientFrame::Ping => {
                        let pong = ServerFrame::Pong {
                            timestamp: chrono::Utc::now().timestamp_millis(),
                        };
                        if let Ok(text) = serde_json::to_string(&pong) {
                            let _ = out_tx.send(SocketOutbound::Frame(text)).await;
                        }
                    }
                    ClientFrame::Subscribe { token, client_id } => {
                        match state.router.get(&session_id).await {
                            Ok(handle) => {
                                // Re-assert the registry entry: the actor may
                                // have been resumed since accept.
                                handle.client_socket_opened(&ws_id, out_tx.clone()).await;
                                if handle.subscribe(&ws_id, &token, &client_id).await.is_ok() {
                                    authenticated.store(true, Ordering::SeqCst);
                                }
                            }
                            Err(e) => {
                                warn!(ws_id, error = %e, "session unavailable for subscribe");
                                send_error(&out_tx, 404, "session not found").await;
                            }
                        }
                    }
                    other => match state.router.get(&session_id).await {
                        Ok(handle) => handle.client_frame(&ws_id, other).await,
                        Err(e) => {
                            warn!(ws_id, error = %e, "session unavailable for frame");
                        }
                    },
                }
            }
            Message::Close(_) => break,
            // Binary, ping, pong: the protocol is JSON text only.
            _ => {}
        }
    }

    auth_task.abort();
    writer_task.abort();
    if let Ok(handle) = state.router.get(&session_id).await {
        handle.client_disconnected(&ws_id).await;
    }
    debug!(ws_id, session_id, "client socket closed");
}

/// Drive the sandbox socket until it closes.
async fn sandbox_socket_task(
    socket: WebSocket,
    state: GatewayState,
    session_id: String,
    bearer: String,
    sandbox_id: String,
) {
    let ws_id = uuid::Uuid::new_v4().simple().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<SocketOutbound>(256);

    let writer_task = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                SocketOutbound::Frame(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SocketOutbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Attach: the actor validates again, supersedes any previous sandbox
    // socket, and flips the lifecycle to ready.
    match state.router.get(&session_id).await {
        Ok(handle) => {
            if let Err(e) = handle
                .sandbox_socket_opened(&ws_id, &bearer, &sandbox_id, out_tx.clone())
                .await
            {
                warn!(ws_id, error = %e, "sandbox attach rejected");
                let _ = out_tx
                    .send(SocketOutbound::Close {
                        code: 1008,
                        reason: e.to_string(),
                    })
                    .await;
                writer_task.await.ok();
                return;
            }
        }
        Err(e) => {
            warn!(ws_id, error = %e, "session unavailable for sandbox attach");
            writer_task.abort();
            return;
        }
    }

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => {
                let text_str: &str = &text;
                let event: SandboxEvent = match serde_json::from_str(text_str) {
                    Ok(event) => event,
                    Err(e) => {
                        // Unknown event types are dropped, not fatal: the
                        // bridge may be newer than the coordinator.
                        debug!(ws_id, error = %e, "unrecognized sandbox event");
                        continue;
                    }
                };
                match state.router.get(&session_id).await {
                    Ok(handle) => handle.sandbox_event(event).await,
                    Err(e) => {
                        warn!(ws_id, error = %e, "session unavailable for sandbox event");
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer_task.abort();
    if let Ok(handle) = state.router.get(&session_id).await {
        handle.sandbox_disconnected(&ws_id).await;
    }
    debug!(ws_id, session_id, "sandbox socket closed");
}

async fn send_error(out_tx: &mpsc::Sender<SocketOutbound>, code: u16, message: &str) {
    let frame = ServerFrame::Error {
        code,
        message: message.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = out_tx.send(SocketOutbound::Frame(text)).await;
    }
}
