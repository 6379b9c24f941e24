// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket-to-client mapping rows, used only for hibernation recovery.
//!
//! Created when a client authenticates; read back when a frame arrives on a
//! socket whose in-memory identity was lost with the evicted actor. Rows are
//! garbage-collected on explicit close or by TTL.

use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::WsClientMapping;

/// Insert or re-assert a mapping. Duplicate subscribes land here and are
/// idempotent by design.
pub async fn upsert_mapping(db: &Database, mapping: &WsClientMapping) -> Result<(), DrydockError> {
    let m = mapping.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO ws_client_mapping (ws_id, participant_id, client_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(ws_id) DO UPDATE SET
                     participant_id = excluded.participant_id,
                     client_id = excluded.client_id",
                params![m.ws_id, m.participant_id, m.client_id, m.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Recover the identity behind a `ws_id` tag.
pub async fn get_mapping(
    db: &Database,
    ws_id: &str,
) -> Result<Option<WsClientMapping>, DrydockError> {
    let ws_id = ws_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ws_id, participant_id, client_id, created_at
                 FROM ws_client_mapping WHERE ws_id = ?1",
            )?;
            let result = stmt.query_row(params![ws_id], |row| {
                Ok(WsClientMapping {
                    ws_id: row.get(0)?,
                    participant_id: row.get(1)?,
                    client_id: row.get(2)?,
                    created_at: row.get(3)?,
                })
            });
            match result {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a mapping on explicit socket close.
pub async fn delete_mapping(db: &Database, ws_id: &str) -> Result<(), DrydockError> {
    let ws_id = ws_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM ws_client_mapping WHERE ws_id = ?1",
                params![ws_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// TTL garbage collection. Returns the number of rows removed.
pub async fn prune_older_than(db: &Database, cutoff_ms: i64) -> Result<usize, DrydockError> {
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM ws_client_mapping WHERE created_at < ?1",
                params![cutoff_ms],
            )?;
            Ok(n)
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
        db.connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO participants (id, user_id, role, joined_at)
                     VALUES ('p1', 'u1', 'owner', 0)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        (db, dir)
    }

    fn make_mapping(ws_id: &str, at: i64) -> WsClientMapping {
        WsClientMapping {
            ws_id: ws_id.to_string(),
            participant_id: "p1".to_string(),
            client_id: "web-1".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrips() {
        let (db, _dir) = setup_db().await;
        upsert_mapping(&db, &make_mapping("ws-1", 100)).await.unwrap();

        let m = get_mapping(&db, "ws-1").await.unwrap().unwrap();
        assert_eq!(m.participant_id, "p1");
        assert_eq!(m.client_id, "web-1");
    }

    #[tokio::test]
    async fn duplicate_subscribe_reasserts_mapping() {
        let (db, _dir) = setup_db().await;
        upsert_mapping(&db, &make_mapping("ws-1", 100)).await.unwrap();

        let mut again = make_mapping("ws-1", 100);
        again.client_id = "web-2".to_string();
        upsert_mapping(&db, &again).await.unwrap();

        let m = get_mapping(&db, "ws-1").await.unwrap().unwrap();
        assert_eq!(m.client_id, "web-2");
    }

    #[tokio::test]
    async fn missing_mapping_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_mapping(&db, "ws-nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_prune() {
        let (db, _dir) = setup_db().await;
        upsert_mapping(&db, &make_mapping("ws-1", 100)).await.unwrap();
        upsert_mapping(&db, &make_mapping("ws-2", 200)).await.unwrap();
        upsert_mapping(&db, &make_mapping("ws-3", 300)).await.unwrap();

        delete_mapping(&db, "ws-1").await.unwrap();
        assert!(get_mapping(&db, "ws-1").await.unwrap().is_none());

        let pruned = prune_older_than(&db, 250).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(get_mapping(&db, "ws-2").await.unwrap().is_none());
        assert!(get_mapping(&db, "ws-3").await.unwrap().is_some());
    }
}
