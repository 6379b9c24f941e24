// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives for the coordinator.
//!
//! Four concerns, all on `ring`:
//! - AES-256-GCM sealing of version-control access tokens at rest
//! - SHA-256 hashing of client WebSocket tokens (only the hash is stored)
//! - HMAC-SHA-256 time-bounded tokens for service-to-service calls
//! - RSA-SHA-256 signed JWT assertions of the app identity

pub mod jwt;
pub mod seal;
pub mod service_token;
pub mod token;

pub use jwt::AppSigner;
pub use seal::{open_hex, seal_hex, TokenKey};
pub use service_token::{mint_service_token, verify_service_token, SERVICE_TOKEN_MAX_SKEW_MS};
pub use token::{random_hex, sha256_hex};
