// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Participant CRUD and WebSocket-token lookups.

use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_enum, Participant};

const PARTICIPANT_COLUMNS: &str = "id, user_id, github_user_id, github_login, github_name,
     github_email, role, access_token_sealed, token_expires_at, ws_auth_token_hash,
     ws_token_created_at, joined_at";

fn row_to_participant(row: &rusqlite::Row<'_>) -> Result<Participant, rusqlite::Error> {
    Ok(Participant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        github_user_id: row.get(2)?,
        github_login: row.get(3)?,
        github_name: row.get(4)?,
        github_email: row.get(5)?,
        role: parse_enum(row.get(6)?, 6)?,
        access_token_sealed: row.get(7)?,
        token_expires_at: row.get(8)?,
        ws_auth_token_hash: row.get(9)?,
        ws_token_created_at: row.get(10)?,
        joined_at: row.get(11)?,
    })
}

/// Insert a participant, or update identity fields and token of an existing
/// `(session, user_id)` row. The unique constraint on `user_id` is the
/// conflict target.
pub async fn upsert_participant(
    db: &Database,
    participant: &Participant,
) -> Result<(), DrydockError> {
    let p = participant.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO participants (id, user_id, github_user_id, github_login,
                     github_name, github_email, role, access_token_sealed,
                     token_expires_at, ws_auth_token_hash, ws_token_created_at, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(user_id) DO UPDATE SET
                     github_user_id = excluded.github_user_id,
                     github_login = excluded.github_login,
                     github_name = excluded.github_name,
                     github_email = excluded.github_email,
                     access_token_sealed = COALESCE(excluded.access_token_sealed, access_token_sealed),
                     token_expires_at = COALESCE(excluded.token_expires_at, token_expires_at)",
                params![
                    p.id,
                    p.user_id,
                    p.github_user_id,
                    p.github_login,
                    p.github_name,
                    p.github_email,
                    p.role.to_string(),
                    p.access_token_sealed,
                    p.token_expires_at,
                    p.ws_auth_token_hash,
                    p.ws_token_created_at,
                    p.joined_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a participant by internal id.
pub async fn get_participant(db: &Database, id: &str) -> Result<Option<Participant>, DrydockError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_participant) {
                Ok(p) => Ok(Some(p)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a participant by external user id.
pub async fn get_by_user_id(
    db: &Database,
    user_id: &str,
) -> Result<Option<Participant>, DrydockError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE user_id = ?1"
            ))?;
            match stmt.query_row(params![user_id], row_to_participant) {
                Ok(p) => Ok(Some(p)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve the participant whose current WebSocket token hashes to `hash`.
///
/// Regenerating a token overwrites the stored hash, so at most one
/// participant can match any plaintext token.
pub async fn get_by_ws_token_hash(
    db: &Database,
    hash: &str,
) -> Result<Option<Participant>, DrydockError> {
    let hash = hash.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE ws_auth_token_hash = ?1"
            ))?;
            match stmt.query_row(params![hash], row_to_participant) {
                Ok(p) => Ok(Some(p)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// All participants, oldest first.
pub async fn list_participants(db: &Database) -> Result<Vec<Participant>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants ORDER BY joined_at ASC"
            ))?;
            let rows = stmt.query_map([], row_to_participant)?;
            let mut participants = Vec::new();
            for row in rows {
                participants.push(row?);
            }
            Ok(participants)
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite the participant's WS token hash. Old tokens stop validating.
pub async fn set_ws_token_hash(
    db: &Database,
    participant_id: &str,
    hash: &str,
    now_ms: i64,
) -> Result<(), DrydockError> {
    let participant_id = participant_id.to_string();
    let hash = hash.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE participants SET ws_auth_token_hash = ?1, ws_token_created_at = ?2
                 WHERE id = ?3",
                params![hash, now_ms, participant_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the sealed access token and its expiry.
pub async fn set_access_token(
    db: &Database,
    participant_id: &str,
    sealed: &str,
    expires_at: Option<i64>,
) -> Result<(), DrydockError> {
    let participant_id = participant_id.to_string();
    let sealed = sealed.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE participants SET access_token_sealed = ?1, token_expires_at = ?2
                 WHERE id = ?3",
                params![sealed, expires_at, participant_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::types::ParticipantRole;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }

    fn make_participant(id: &str, user_id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            user_id: user_id.to_string(),
            github_user_id: Some("99".to_string()),
            github_login: Some("octocat".to_string()),
            github_name: Some("Octo Cat".to_string()),
            github_email: Some("octo@example.com".to_string()),
            role: ParticipantRole::Owner,
            access_token_sealed: None,
            token_expires_at: None,
            ws_auth_token_hash: None,
            ws_token_created_at: None,
            joined_at: 1_000,
        }
    }

    #[tokio::test]
    async fn upsert_and_lookup_roundtrips() {
        let (db, _dir) = setup_db().await;
        upsert_participant(&db, &make_participant("p1", "u1"))
            .await
            .unwrap();

        let by_id = get_participant(&db, "p1").await.unwrap().unwrap();
        assert_eq!(by_id.user_id, "u1");
        assert_eq!(by_id.role, ParticipantRole::Owner);

        let by_user = get_by_user_id(&db, "u1").await.unwrap().unwrap();
        assert_eq!(by_user.id, "p1");
    }

    #[tokio::test]
    async fn duplicate_user_id_updates_in_place() {
        let (db, _dir) = setup_db().await;
        upsert_participant(&db, &make_participant("p1", "u1"))
            .await
            .unwrap();

        let mut again = make_participant("p2", "u1");
        again.github_login = Some("newlogin".to_string());
        upsert_participant(&db, &again).await.unwrap();

        // (session, user_id) stays unique: still one row, original id.
        let all = list_participants(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "p1");
        assert_eq!(all[0].github_login.as_deref(), Some("newlogin"));
    }

    #[tokio::test]
    async fn ws_token_hash_overwrite_invalidates_old() {
        let (db, _dir) = setup_db().await;
        upsert_participant(&db, &make_participant("p1", "u1"))
            .await
            .unwrap();

        set_ws_token_hash(&db, "p1", "hash-a", 2_000).await.unwrap();
        assert!(get_by_ws_token_hash(&db, "hash-a").await.unwrap().is_some());

        set_ws_token_hash(&db, "p1", "hash-b", 3_000).await.unwrap();
        assert!(get_by_ws_token_hash(&db, "hash-a").await.unwrap().is_none());
        assert!(get_by_ws_token_hash(&db, "hash-b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn access_token_update_sticks() {
        let (db, _dir) = setup_db().await;
        upsert_participant(&db, &make_participant("p1", "u1"))
            .await
            .unwrap();

        set_access_token(&db, "p1", "deadbeef", Some(9_999))
            .await
            .unwrap();
        let p = get_participant(&db, "p1").await.unwrap().unwrap();
        assert_eq!(p.access_token_sealed.as_deref(), Some("deadbeef"));
        assert_eq!(p.token_expires_at, Some(9_999));
    }
}
