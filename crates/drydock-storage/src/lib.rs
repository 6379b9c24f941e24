// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Drydock session coordinator.
//!
//! One WAL-mode SQLite file per session plus a small cross-session index,
//! both with embedded migrations. All writes are serialized through
//! `tokio-rusqlite`'s single background thread; the per-session coordinator
//! actor is the sole writer of its own file, so no additional locking exists
//! anywhere in this crate.

pub mod database;
pub mod index;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use index::SessionIndex;
pub use models::*;
