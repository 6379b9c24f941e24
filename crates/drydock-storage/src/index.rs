// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cross-session index.
//!
//! A small separate SQLite file owned by the routing layer. It exists so
//! `GET /sessions` can paginate without opening every per-session store; all
//! other state stays in the session's own file.

use std::path::Path;

use drydock_core::types::SessionStatus;
use drydock_core::DrydockError;
use rusqlite::params;
use tracing::debug;

use crate::database::map_tr_err;
use crate::migrations;
use crate::models::{parse_enum, SessionIndexEntry};

/// Handle to the index database.
pub struct SessionIndex {
    conn: tokio_rusqlite::Connection,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<SessionIndexEntry, rusqlite::Error> {
    Ok(SessionIndexEntry {
        id: row.get(0)?,
        session_name: row.get(1)?,
        title: row.get(2)?,
        repo_owner: row.get(3)?,
        repo_name: row.get(4)?,
        status: parse_enum(row.get(5)?, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const ENTRY_COLUMNS: &str =
    "id, session_name, title, repo_owner, repo_name, status, created_at, updated_at";

impl SessionIndex {
    /// Open (creating if needed) the index file and run its migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DrydockError> {
        let path_buf = path.as_ref().to_path_buf();

        if let Some(parent) = path_buf.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DrydockError::Storage { source: e.into() })?;
        }

        let migrate_path = path_buf.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DrydockError> {
            let mut conn = rusqlite::Connection::open(&migrate_path)
                .map_err(|e| DrydockError::Storage { source: e.into() })?;
            migrations::run_index_migrations(&mut conn)
        })
        .await
        .map_err(|e| DrydockError::Storage { source: e.into() })??;

        let conn = tokio_rusqlite::Connection::open(path_buf.clone())
            .await
            .map_err(map_tr_err)?;

        debug!(path = %path_buf.display(), "session index opened");
        Ok(Self { conn })
    }

    /// Register a session at creation time.
    pub async fn insert(&self, entry: &SessionIndexEntry) -> Result<(), DrydockError> {
        let e = entry.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO session_index (id, session_name, title, repo_owner,
                         repo_name, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        e.id,
                        e.session_name,
                        e.title,
                        e.repo_owner,
                        e.repo_name,
                        e.status.to_string(),
                        e.created_at,
                        e.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Look up one entry.
    pub async fn get(&self, id: &str) -> Result<Option<SessionIndexEntry>, DrydockError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM session_index WHERE id = ?1"
                ))?;
                match stmt.query_row(params![id], row_to_entry) {
                    Ok(e) => Ok(Some(e)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Mirror a status change from the per-session store.
    pub async fn set_status(
        &self,
        id: &str,
        status: SessionStatus,
        now_ms: i64,
    ) -> Result<(), DrydockError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE session_index SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.to_string(), now_ms, id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Remove a deleted session.
    pub async fn remove(&self, id: &str) -> Result<(), DrydockError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM session_index WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Cursor-paginated listing, newest first. The cursor is the `created_at`
    /// of the last returned row; `has_more` peeks `limit + 1`.
    pub async fn list(
        &self,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<(Vec<SessionIndexEntry>, bool), DrydockError> {
        self.conn
            .call(move |conn| {
                let before = cursor.unwrap_or(i64::MAX);
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM session_index
                     WHERE created_at < ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![before, (limit + 1) as i64], row_to_entry)?;
                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                let has_more = entries.len() > limit;
                entries.truncate(limit);
                Ok((entries, has_more))
            })
            .await
            .map_err(map_tr_err)
    }
}
