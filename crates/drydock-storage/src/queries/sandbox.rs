// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sandbox row operations.
//!
//! The session holds exactly one current sandbox; replacing it deletes the
//! superseded row in the same transaction. Circuit-breaker counters ride on
//! the row so eviction does not reset breaker state.

use drydock_core::types::{GitSyncStatus, SandboxStatus};
use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_enum, Sandbox};

const SANDBOX_COLUMNS: &str = "id, object_id, status, git_sync_status, auth_token,
     last_heartbeat, last_activity, snapshot_image_id, circuit_breaker_failures,
     circuit_breaker_opened_at, created_at";

fn row_to_sandbox(row: &rusqlite::Row<'_>) -> Result<Sandbox, rusqlite::Error> {
    Ok(Sandbox {
        id: row.get(0)?,
        object_id: row.get(1)?,
        status: parse_enum(row.get(2)?, 2)?,
        git_sync_status: parse_enum(row.get(3)?, 3)?,
        auth_token: row.get(4)?,
        last_heartbeat: row.get(5)?,
        last_activity: row.get(6)?,
        snapshot_image_id: row.get(7)?,
        circuit_breaker_failures: row.get(8)?,
        circuit_breaker_opened_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Install a new current sandbox, superseding any previous row.
///
/// Breaker counters and the last snapshot image survive supersession; they
/// describe the session's relationship with the provider, not one sandbox.
pub async fn replace_sandbox(db: &Database, sandbox: &Sandbox) -> Result<(), DrydockError> {
    let s = sandbox.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM sandbox", [])?;
            tx.execute(
                "INSERT INTO sandbox (id, object_id, status, git_sync_status, auth_token,
                     last_heartbeat, last_activity, snapshot_image_id,
                     circuit_breaker_failures, circuit_breaker_opened_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    s.id,
                    s.object_id,
                    s.status.to_string(),
                    s.git_sync_status.to_string(),
                    s.auth_token,
                    s.last_heartbeat,
                    s.last_activity,
                    s.snapshot_image_id,
                    s.circuit_breaker_failures,
                    s.circuit_breaker_opened_at,
                    s.created_at,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The current sandbox row, if one has ever been created.
pub async fn get_sandbox(db: &Database) -> Result<Option<Sandbox>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SANDBOX_COLUMNS} FROM sandbox ORDER BY created_at DESC LIMIT 1"
            ))?;
            match stmt.query_row([], row_to_sandbox) {
                Ok(s) => Ok(Some(s)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Update the sandbox status.
pub async fn set_status(db: &Database, status: SandboxStatus) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sandbox SET status = ?1",
                params![status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the provider object id returned by create/restore.
pub async fn set_object_id(db: &Database, object_id: &str) -> Result<(), DrydockError> {
    let object_id = object_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE sandbox SET object_id = ?1", params![object_id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update the git sync status.
pub async fn set_git_sync_status(
    db: &Database,
    status: GitSyncStatus,
) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sandbox SET git_sync_status = ?1",
                params![status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a heartbeat.
pub async fn set_last_heartbeat(db: &Database, now_ms: i64) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE sandbox SET last_heartbeat = ?1", params![now_ms])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record client/agent activity, pushing the inactivity deadline out.
pub async fn set_last_activity(db: &Database, now_ms: i64) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE sandbox SET last_activity = ?1", params![now_ms])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a completed snapshot's image id.
pub async fn set_snapshot_image(db: &Database, image_id: &str) -> Result<(), DrydockError> {
    let image_id = image_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sandbox SET snapshot_image_id = ?1",
                params![image_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist circuit-breaker counters.
pub async fn set_breaker(
    db: &Database,
    failures: i64,
    opened_at: Option<i64>,
) -> Result<(), DrydockError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sandbox SET circuit_breaker_failures = ?1,
                     circuit_breaker_opened_at = ?2",
                params![failures, opened_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }

    fn make_sandbox(id: &str) -> Sandbox {
        Sandbox {
            id: id.to_string(),
            object_id: None,
            status: SandboxStatus::Pending,
            git_sync_status: GitSyncStatus::Pending,
            auth_token: "a".repeat(64),
            last_heartbeat: None,
            last_activity: None,
            snapshot_image_id: None,
            circuit_breaker_failures: 0,
            circuit_breaker_opened_at: None,
            created_at: 1_000,
        }
    }

    #[tokio::test]
    async fn replace_supersedes_previous_row() {
        let (db, _dir) = setup_db().await;
        replace_sandbox(&db, &make_sandbox("sb-1")).await.unwrap();

        let mut newer = make_sandbox("sb-2");
        newer.created_at = 2_000;
        replace_sandbox(&db, &newer).await.unwrap();

        let current = get_sandbox(&db).await.unwrap().unwrap();
        assert_eq!(current.id, "sb-2");

        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT COUNT(*) FROM sandbox", [], |row| row.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn field_updates_stick() {
        let (db, _dir) = setup_db().await;
        replace_sandbox(&db, &make_sandbox("sb-1")).await.unwrap();

        set_status(&db, SandboxStatus::Ready).await.unwrap();
        set_object_id(&db, "obj-77").await.unwrap();
        set_git_sync_status(&db, GitSyncStatus::Completed).await.unwrap();
        set_last_heartbeat(&db, 5_000).await.unwrap();
        set_last_activity(&db, 6_000).await.unwrap();
        set_snapshot_image(&db, "im-42").await.unwrap();
        set_breaker(&db, 2, Some(7_000)).await.unwrap();

        let s = get_sandbox(&db).await.unwrap().unwrap();
        assert_eq!(s.status, SandboxStatus::Ready);
        assert_eq!(s.object_id.as_deref(), Some("obj-77"));
        assert_eq!(s.git_sync_status, GitSyncStatus::Completed);
        assert_eq!(s.last_heartbeat, Some(5_000));
        assert_eq!(s.last_activity, Some(6_000));
        assert_eq!(s.snapshot_image_id.as_deref(), Some("im-42"));
        assert_eq!(s.circuit_breaker_failures, 2);
        assert_eq!(s.circuit_breaker_opened_at, Some(7_000));
    }

    #[tokio::test]
    async fn get_sandbox_on_fresh_store_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_sandbox(&db).await.unwrap().is_none());
    }
}
