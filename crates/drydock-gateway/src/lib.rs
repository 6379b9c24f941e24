// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket façade over the session coordinators.
//!
//! The gateway is mechanically thin: it enforces the authentication class of
//! each route, normalizes identifiers at the boundary, resolves the session
//! actor through the router, and converts typed errors into the
//! `{"error": "..."}` envelope. All session semantics live in the actors.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use server::{build_router, start_server, GatewayState};
