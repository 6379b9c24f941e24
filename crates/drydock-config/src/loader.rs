// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./drydock.toml` > `~/.config/drydock/drydock.toml`
//! > `/etc/drydock/drydock.toml` with environment variable overrides via the
//! `DRYDOCK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DrydockConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/drydock/drydock.toml` (system-wide)
/// 3. `~/.config/drydock/drydock.toml` (user XDG config)
/// 4. `./drydock.toml` (local directory)
/// 5. `DRYDOCK_*` environment variables
pub fn load_config() -> Result<DrydockConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DrydockConfig::default()))
        .merge(Toml::file("/etc/drydock/drydock.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("drydock/drydock.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("drydock.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<DrydockConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DrydockConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DrydockConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DrydockConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `DRYDOCK_AUTH_CALLBACK_SECRET` must map
/// to `auth.callback_secret`, not `auth.callback.secret`.
fn env_provider() -> Env {
    const SECTIONS: &[&str] = &[
        "agent", "server", "storage", "auth", "provider", "github", "lifecycle",
    ];
    Env::prefixed("DRYDOCK_").map(|key| {
        let key_str = key.as_str();
        for section in SECTIONS {
            if let Some(rest) = key_str.strip_prefix(&format!("{section}_")) {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.to_string().into()
    })
}
