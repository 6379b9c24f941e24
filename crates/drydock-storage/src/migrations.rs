// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled into the binary at build time via
//! `embed_migrations!`. Per-session stores and the cross-session index have
//! separate migration sets; refinery tracks each file's applied migrations in
//! its own `refinery_schema_history` table.

use drydock_core::DrydockError;

mod session_store {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

mod session_index {
    use refinery::embed_migrations;
    embed_migrations!("index_migrations");
}

/// Run all pending per-session-store migrations against the given connection.
pub fn run_session_migrations(conn: &mut rusqlite::Connection) -> Result<(), DrydockError> {
    session_store::migrations::runner()
        .run(conn)
        .map_err(|e| DrydockError::Storage {
            source: Box::new(e),
        })?;
    Ok(())
}

/// Run all pending session-index migrations against the given connection.
pub fn run_index_migrations(conn: &mut rusqlite::Connection) -> Result<(), DrydockError> {
    session_index::migrations::runner()
        .run(conn)
        .map_err(|e| DrydockError::Storage {
            source: Box::new(e),
        })?;
    Ok(())
}
