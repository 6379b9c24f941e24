// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the external sandbox compute service.
//!
//! Provides [`ProviderClient`], a typed wrapper over the provider's
//! create/warm/snapshot/restore endpoints. Every request carries an
//! HMAC-signed bearer token minted from the shared provider secret, bodies
//! use snake_case field names, and every failure is classified transient or
//! permanent on the error itself.

pub mod client;
pub mod types;

pub use client::ProviderClient;
