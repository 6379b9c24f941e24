// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session singleton operations.

use drydock_core::types::SessionStatus;
use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_enum, Session};

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        session_name: row.get(1)?,
        title: row.get(2)?,
        repo_owner: row.get(3)?,
        repo_name: row.get(4)?,
        repo_default_branch: row.get(5)?,
        branch_name: row.get(6)?,
        base_sha: row.get(7)?,
        current_sha: row.get(8)?,
        agent_session_id: row.get(9)?,
        model: row.get(10)?,
        status: parse_enum(row.get(11)?, 11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

const SESSION_COLUMNS: &str = "id, session_name, title, repo_owner, repo_name,
     repo_default_branch, branch_name, base_sha, current_sha, agent_session_id,
     model, status, created_at, updated_at";

/// Insert the singleton session row. Fails if one already exists.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), DrydockError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO session (id, session_name, title, repo_owner, repo_name,
                     repo_default_branch, branch_name, base_sha, current_sha,
                     agent_session_id, model, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    session.id,
                    session.session_name,
                    session.title,
                    session.repo_owner,
                    session.repo_name,
                    session.repo_default_branch,
                    session.branch_name,
                    session.base_sha,
                    session.current_sha,
                    session.agent_session_id,
                    session.model,
                    session.status.to_string(),
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The session row, if this store has been initialized.
pub async fn get_session(db: &Database) -> Result<Option<Session>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM session LIMIT 1"))?;
            let result = stmt.query_row([], row_to_session);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Update the session status and `updated_at`.
pub async fn set_status(
    db: &Database,
    status: SessionStatus,
    now_ms: i64,
) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE session SET status = ?1, updated_at = ?2",
                params![status.to_string(), now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the session branch after a successful push.
pub async fn set_branch_name(
    db: &Database,
    branch: &str,
    now_ms: i64,
) -> Result<(), DrydockError> {
    let branch = branch.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE session SET branch_name = ?1, updated_at = ?2",
                params![branch, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the repository default branch once fetched from the host.
pub async fn set_repo_default_branch(
    db: &Database,
    default_branch: &str,
    now_ms: i64,
) -> Result<(), DrydockError> {
    let default_branch = default_branch.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE session SET repo_default_branch = ?1, updated_at = ?2",
                params![default_branch, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the agent-side session id reported by the bridge.
pub async fn set_agent_session_id(
    db: &Database,
    agent_session_id: &str,
    now_ms: i64,
) -> Result<(), DrydockError> {
    let agent_session_id = agent_session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE session SET agent_session_id = ?1, updated_at = ?2",
                params![agent_session_id, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the latest synced commit. The first synced commit also becomes the
/// session's base.
pub async fn set_current_sha(db: &Database, sha: &str, now_ms: i64) -> Result<(), DrydockError> {
    let sha = sha.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE session SET current_sha = ?1,
                     base_sha = COALESCE(base_sha, ?1),
                     updated_at = ?2",
                params![sha, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
