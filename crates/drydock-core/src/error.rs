// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Drydock session coordinator.

use thiserror::Error;

use crate::types::FailureKind;

/// A failure from the external sandbox compute service.
///
/// Classification is an explicit field, never a parse of the message: the
/// lifecycle manager drives its circuit breaker off `kind` alone.
#[derive(Debug, Error)]
#[error("provider error ({kind}): {message}")]
pub struct ProviderError {
    /// Whether the caller may retry (`Transient`) or must not (`Permanent`).
    pub kind: FailureKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// A retryable failure (network error, 502/503/504).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            source: None,
        }
    }

    /// A non-retryable failure (4xx, unrecognized 5xx, configuration error).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// The primary error type used across the Drydock crates.
///
/// Handlers surface one of these or a success; the gateway converts the
/// variant into the HTTP error envelope. Nothing throws across the façade
/// boundary.
#[derive(Debug, Error)]
pub enum DrydockError {
    /// Configuration errors (invalid TOML, missing required fields, bad key material).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cryptographic operation failed (seal/open, signing, malformed key).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Sandbox provider failure, classified transient or permanent.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Version-control host failure (token exchange, PR creation, repo metadata).
    #[error("repo host error: {message}")]
    RepoHost {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed request: bad JSON, missing fields, unknown enum values. HTTP 400.
    #[error("{0}")]
    InvalidInput(String),

    /// Missing or wrong credentials. HTTP 401.
    #[error("{0}")]
    Unauthenticated(String),

    /// Unknown session, participant, or message. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// The sandbox has transitioned to stopped/stale and accepts nothing further. HTTP 410.
    #[error("{0}")]
    Gone(String),

    /// An operation that contradicts current state (e.g. PR with no message
    /// in flight). Returned to the caller, never retried. HTTP 409.
    #[error("{0}")]
    Logical(String),

    /// Internal or unexpected errors. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl DrydockError {
    /// Shorthand for a repo host failure without a source.
    pub fn repo_host(message: impl Into<String>) -> Self {
        Self::RepoHost {
            message: message.into(),
            source: None,
        }
    }
}
