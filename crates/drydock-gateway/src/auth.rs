// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service authentication middleware.
//!
//! Every non-public route requires `Authorization: Bearer <ms-ts>.<hex-sig>`
//! where the signature is HMAC-SHA-256 over the millisecond timestamp under
//! the shared callback secret, accepted within a plus/minus five minute
//! window with a constant-time compare. When no secret is configured the
//! middleware fails closed with 500 rather than letting anything through.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use drydock_crypto::verify_service_token;

use crate::handlers::ErrorBody;

/// Authentication configuration for the service surface.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for inbound service calls. `None` fails closed.
    pub callback_secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "callback_secret",
                &self.callback_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Extract the bearer token from an Authorization header value.
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware enforcing the service (HMAC) authentication class.
pub async fn service_auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = auth.callback_secret.as_deref() else {
        tracing::error!("service auth secret missing -- failing closed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Internal authentication not configured".to_string(),
            }),
        )
            .into_response();
    };

    let authorized = bearer_token(&request)
        .map(|token| verify_service_token(secret, token, chrono::Utc::now().timestamp_millis()))
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "invalid or missing service token".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_crypto::mint_service_token;

    #[test]
    fn auth_config_debug_redacts_secret() {
        let config = AuthConfig {
            callback_secret: Some("super-secret".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn fresh_token_passes_verification() {
        let now = chrono::Utc::now().timestamp_millis();
        let token = mint_service_token("s3cret", now);
        assert!(verify_service_token("s3cret", &token, now));
    }
}
