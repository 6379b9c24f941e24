// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route table and server startup.
//!
//! Authentication classes per route: `/health` is public; the WebSocket
//! upgrade authenticates in-protocol (subscribe frames for clients, bearer +
//! `X-Sandbox-ID` for the sandbox); `/sessions/{id}/pr` does its own dual
//! service-or-sandbox check; everything else sits behind the service HMAC
//! middleware.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use drydock_config::DrydockConfig;
use drydock_coordinator::CoordinatorRouter;
use drydock_core::DrydockError;

use crate::auth::{service_auth_middleware, AuthConfig};
use crate::handlers;
use crate::ws;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<CoordinatorRouter>,
    pub auth: AuthConfig,
    pub cfg: Arc<DrydockConfig>,
    pub start_time: Instant,
}

/// Build the full route table.
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/sessions", get(handlers::list_sessions).post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/warm", post(handlers::warm_session))
        .route("/sessions/{id}/prompt", post(handlers::enqueue_prompt))
        .route("/sessions/{id}/stop", post(handlers::stop_session))
        .route("/sessions/{id}/events", get(handlers::list_events))
        .route("/sessions/{id}/messages", get(handlers::list_messages))
        .route("/sessions/{id}/artifacts", get(handlers::list_artifacts))
        .route(
            "/sessions/{id}/participants",
            get(handlers::list_participants).post(handlers::add_participant),
        )
        .route("/sessions/{id}/ws-token", post(handlers::mint_ws_token))
        .route("/sessions/{id}/archive", post(handlers::archive_session))
        .route("/sessions/{id}/unarchive", post(handlers::unarchive_session))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            service_auth_middleware,
        ))
        .with_state(state.clone());

    // PR creation accepts either a service token or the sandbox bearer; the
    // handler does its own check, so it sits outside the middleware.
    let pr_routes = Router::new()
        .route("/sessions/{id}/pr", post(handlers::create_pr))
        .with_state(state.clone());

    // WebSocket upgrades authenticate in-protocol.
    let ws_routes = Router::new()
        .route("/sessions/{id}/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(pr_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process is told to stop.
pub async fn start_server(state: GatewayState) -> Result<(), DrydockError> {
    let addr = format!("{}:{}", state.cfg.server.host, state.cfg.server.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DrydockError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| DrydockError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_clones_into_state() {
        let auth = AuthConfig {
            callback_secret: Some("s".to_string()),
        };
        let cloned = auth.clone();
        assert_eq!(cloned.callback_secret.as_deref(), Some("s"));
    }
}
