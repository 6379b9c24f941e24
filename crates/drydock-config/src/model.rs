// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Durations are expressed in the unit named by the
//! key (`*_secs`, `*_ms`) and converted at the point of use.

use serde::{Deserialize, Serialize};

/// Top-level Drydock configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values; secrets default to `None` and the façade fails closed without them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DrydockConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP/WebSocket server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Persistent store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Secrets and key material.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Sandbox provider endpoint.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Version-control host app identity.
    #[serde(default)]
    pub github: GithubConfig,

    /// Sandbox lifecycle tuning.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Default language model for new sessions.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            default_model: default_model(),
        }
    }
}

fn default_agent_name() -> String {
    "drydock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Publicly reachable base URL handed to sandboxes for their WebSocket
    /// connection back to the coordinator.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8820
}

fn default_public_url() -> String {
    "http://127.0.0.1:8820".to_string()
}

/// Persistent store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding `index.db` and the per-session `sessions/*.db` files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// Secrets and key material.
///
/// Two HMAC secrets are kept deliberately distinct: `callback_secret`
/// authenticates inbound service-to-service calls on the coordinator's own
/// HTTP surface, `provider_api_secret` signs outbound calls to the sandbox
/// provider. They may hold the same value in small deployments, but the
/// code never treats one as the other.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret for inbound service authentication. `None` fails closed.
    #[serde(default)]
    pub callback_secret: Option<String>,

    /// HMAC secret for outbound provider calls. `None` fails closed.
    #[serde(default)]
    pub provider_api_secret: Option<String>,

    /// 64 hex chars: the AES-256-GCM key sealing participant access tokens.
    #[serde(default)]
    pub token_encryption_key: Option<String>,
}

/// Sandbox provider endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the sandbox compute service.
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            request_timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_provider_url() -> String {
    "http://127.0.0.1:9400".to_string()
}

fn default_provider_timeout() -> u64 {
    120
}

/// Version-control host app identity.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GithubConfig {
    /// App id (`iss` claim of the signed assertion).
    #[serde(default)]
    pub app_id: Option<String>,

    /// PEM-encoded RSA private key for RS256 app assertions.
    #[serde(default)]
    pub private_key_pem: Option<String>,

    /// Installation id for installation-token issuance.
    #[serde(default)]
    pub installation_id: Option<String>,

    /// API base URL (overridable for tests and GHE).
    #[serde(default = "default_github_api")]
    pub api_base_url: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

/// Sandbox lifecycle tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Idle period after the last client/agent activity before the sandbox
    /// is snapshotted and stopped.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// A heartbeat older than this while ready/running marks the sandbox stale.
    #[serde(default = "default_heartbeat_threshold")]
    pub heartbeat_threshold_secs: u64,

    /// How long a spawned sandbox may take to open its WebSocket.
    #[serde(default = "default_connect_deadline")]
    pub connect_deadline_secs: u64,

    /// Consecutive transient provider failures that open the circuit breaker.
    #[serde(default = "default_breaker_max_failures")]
    pub breaker_max_failures: u32,

    /// Window within which those failures must fall.
    #[serde(default = "default_breaker_window")]
    pub breaker_window_secs: u64,

    /// How long the breaker stays open.
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,

    /// Minimum spacing between spawn attempts that warm requests must respect.
    #[serde(default = "default_spawn_cooldown")]
    pub spawn_cooldown_secs: u64,

    /// How long a push command may take before the pending PR request fails.
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    /// How long a client socket may stay unauthenticated before close 4008.
    #[serde(default = "default_ws_auth_timeout")]
    pub ws_auth_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            heartbeat_threshold_secs: default_heartbeat_threshold(),
            connect_deadline_secs: default_connect_deadline(),
            breaker_max_failures: default_breaker_max_failures(),
            breaker_window_secs: default_breaker_window(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            spawn_cooldown_secs: default_spawn_cooldown(),
            push_timeout_secs: default_push_timeout(),
            ws_auth_timeout_secs: default_ws_auth_timeout(),
        }
    }
}

fn default_inactivity_timeout() -> u64 {
    600
}

fn default_heartbeat_threshold() -> u64 {
    90
}

fn default_connect_deadline() -> u64 {
    120
}

fn default_breaker_max_failures() -> u32 {
    3
}

fn default_breaker_window() -> u64 {
    120
}

fn default_breaker_cooldown() -> u64 {
    300
}

fn default_spawn_cooldown() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    180
}

fn default_ws_auth_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = DrydockConfig::default();
        assert_eq!(config.agent.name, "drydock");
        assert_eq!(config.lifecycle.inactivity_timeout_secs, 600);
        assert_eq!(config.lifecycle.push_timeout_secs, 180);
        assert_eq!(config.lifecycle.breaker_max_failures, 3);
        assert!(config.auth.callback_secret.is_none());
    }

    #[test]
    fn auth_config_defaults_to_no_secrets() {
        let auth = AuthConfig::default();
        assert!(auth.callback_secret.is_none());
        assert!(auth.provider_api_secret.is_none());
        assert!(auth.token_encryption_key.is_none());
    }
}
