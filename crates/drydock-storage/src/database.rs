// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer: query modules accept
//! `&Database` and go through `connection().call()`. Do NOT create additional
//! Connection instances for writes.

use std::path::Path;

use drydock_core::DrydockError;
use tracing::debug;

use crate::migrations;

const PRAGMAS: &str = "\
    PRAGMA journal_mode = WAL;\n\
    PRAGMA synchronous = NORMAL;\n\
    PRAGMA foreign_keys = ON;\n\
    PRAGMA busy_timeout = 5000;";

/// A per-session store: one SQLite file, opened in WAL mode, migrated on open.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) a per-session store and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DrydockError> {
        let path_buf = path.as_ref().to_path_buf();

        if let Some(parent) = path_buf.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DrydockError::Storage { source: e.into() })?;
        }

        // Migrations run on a short-lived blocking connection before the file
        // is handed to the async wrapper.
        let migrate_path = path_buf.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DrydockError> {
            let mut conn = rusqlite::Connection::open(&migrate_path)
                .map_err(|e| DrydockError::Storage { source: e.into() })?;
            conn.execute_batch(PRAGMAS)
                .map_err(|e| DrydockError::Storage { source: e.into() })?;
            migrations::run_session_migrations(&mut conn)
        })
        .await
        .map_err(|e| DrydockError::Storage { source: e.into() })??;

        let conn = tokio_rusqlite::Connection::open(path_buf.clone())
            .await
            .map_err(map_tr_err)?;
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path = %path_buf.display(), "session store opened");
        Ok(Self { conn })
    }

    /// The single async connection. All query modules go through this.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), DrydockError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into the shared storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> DrydockError {
    DrydockError::Storage {
        source: Box::new(e),
    }
}
