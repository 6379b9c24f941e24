// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and merging.

use drydock_config::{load_config_from_str, DrydockConfig};

#[test]
fn empty_config_yields_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.agent.name, "drydock");
    assert_eq!(config.server.port, 8820);
    assert_eq!(config.lifecycle.inactivity_timeout_secs, 600);
    assert_eq!(config.github.api_base_url, "https://api.github.com");
}

#[test]
fn toml_overrides_defaults() {
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [lifecycle]
        inactivity_timeout_secs = 120
        push_timeout_secs = 5
    "#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.lifecycle.inactivity_timeout_secs, 120);
    assert_eq!(config.lifecycle.push_timeout_secs, 5);
    // Untouched sections keep defaults.
    assert_eq!(config.agent.default_model, "claude-sonnet-4-5");
}

#[test]
fn secrets_load_from_toml() {
    let toml = r#"
        [auth]
        callback_secret = "cb-secret"
        provider_api_secret = "provider-secret"
        token_encryption_key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
    "#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.auth.callback_secret.as_deref(), Some("cb-secret"));
    assert_eq!(
        config.auth.provider_api_secret.as_deref(),
        Some("provider-secret")
    );
    assert_eq!(
        config.auth.token_encryption_key.as_deref().map(str::len),
        Some(64)
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let toml = r#"
        [server]
        hostt = "typo"
    "#;
    let result = load_config_from_str(toml);
    assert!(result.is_err(), "unknown key should be rejected");
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
        [serverr]
        host = "oops"
    "#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn config_is_serializable_for_figment_defaults() {
    // Serialized::defaults requires the config to round-trip through serde.
    let config = DrydockConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"drydock\""));
}
