// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message FIFO operations.
//!
//! The queue invariants live in the SQL: `mark_processing` refuses to run
//! while another message is processing, completion only moves messages out
//! of `processing`, and promotion order is ascending `created_at`. Status
//! transitions are monotonic; there is no SQL path backwards.

use drydock_core::types::MessageStatus;
use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_enum, Message};

const MESSAGE_COLUMNS: &str = "id, author_id, content, source, model, attachments,
     callback_context, status, created_at, started_at, completed_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    Ok(Message {
        id: row.get(0)?,
        author_id: row.get(1)?,
        content: row.get(2)?,
        source: parse_enum(row.get(3)?, 3)?,
        model: row.get(4)?,
        attachments: row.get(5)?,
        callback_context: row.get(6)?,
        status: parse_enum(row.get(7)?, 7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

/// Persist a new pending message.
pub async fn insert_message(db: &Database, message: &Message) -> Result<(), DrydockError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, author_id, content, source, model, attachments,
                     callback_context, status, created_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    m.id,
                    m.author_id,
                    m.content,
                    m.source.to_string(),
                    m.model,
                    m.attachments,
                    m.callback_context,
                    m.status.to_string(),
                    m.created_at,
                    m.started_at,
                    m.completed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a message by id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, DrydockError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_message) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The oldest pending message, if any.
pub async fn oldest_pending(db: &Database) -> Result<Option<Message>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC LIMIT 1"
            ))?;
            match stmt.query_row([], row_to_message) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The message currently in `processing`, if any. At most one exists.
pub async fn peek_processing(db: &Database) -> Result<Option<Message>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE status = 'processing' LIMIT 1"
            ))?;
            match stmt.query_row([], row_to_message) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Move a pending message into `processing`, guarding the at-most-one invariant.
///
/// Returns `true` if the message moved. Returns `false` without effect when
/// the message is not pending or another message is already processing.
pub async fn mark_processing(db: &Database, id: &str, now_ms: i64) -> Result<bool, DrydockError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = 'processing', started_at = ?2
                 WHERE id = ?1 AND status = 'pending'
                   AND NOT EXISTS (SELECT 1 FROM messages WHERE status = 'processing')",
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Complete a processing message. Idempotent: a message already completed or
/// failed is left untouched and `false` is returned.
pub async fn complete(
    db: &Database,
    id: &str,
    success: bool,
    now_ms: i64,
) -> Result<bool, DrydockError> {
    let id = id.to_string();
    let next = if success {
        MessageStatus::Completed
    } else {
        MessageStatus::Failed
    };
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = ?2, completed_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, next.to_string(), now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending plus processing count: the 1-based queue position reported to an
/// enqueuer immediately after its insert.
pub async fn pending_or_processing_count(db: &Database) -> Result<i64, DrydockError> {
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE status IN ('pending', 'processing')",
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Cursor-paginated message listing, oldest first. Returns `(rows, has_more)`
/// by peeking `limit + 1` rows.
pub async fn list_messages(
    db: &Database,
    cursor: Option<i64>,
    limit: usize,
    status: Option<MessageStatus>,
) -> Result<(Vec<Message>, bool), DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE created_at > ?1"
            );
            if status.is_some() {
                sql.push_str(" AND status = ?3");
            }
            sql.push_str(" ORDER BY created_at ASC, rowid ASC LIMIT ?2");

            let after = cursor.unwrap_or(i64::MIN);
            let peek = (limit + 1) as i64;
            let mut messages = Vec::new();

            let mut stmt = conn.prepare(&sql)?;
            match status {
                Some(s) => {
                    let rows =
                        stmt.query_map(params![after, peek, s.to_string()], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let rows = stmt.query_map(params![after, peek], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }

            let has_more = messages.len() > limit;
            messages.truncate(limit);
            Ok((messages, has_more))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::types::MessageSource;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).await.unwrap();
        // Messages reference a participant.
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

    fn make_message(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            author_id: "p1".to_string(),
            content: format!("prompt {id}"),
            source: MessageSource::Web,
            model: None,
            attachments: None,
            callback_context: None,
            status: MessageStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn fifo_promotes_oldest_pending() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m2", 200)).await.unwrap();
        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        insert_message(&db, &make_message("m3", 300)).await.unwrap();

        let next = oldest_pending(&db).await.unwrap().unwrap();
        assert_eq!(next.id, "m1");
    }

    #[tokio::test]
    async fn at_most_one_processing() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        insert_message(&db, &make_message("m2", 200)).await.unwrap();

        assert!(mark_processing(&db, "m1", 150).await.unwrap());
        // Second mark is refused while m1 is in flight.
        assert!(!mark_processing(&db, "m2", 160).await.unwrap());

        let processing = peek_processing(&db).await.unwrap().unwrap();
        assert_eq!(processing.id, "m1");
        assert_eq!(processing.started_at, Some(150));
    }

    #[tokio::test]
    async fn complete_is_idempotent_and_monotonic() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        assert!(mark_processing(&db, "m1", 150).await.unwrap());

        assert!(complete(&db, "m1", true, 200).await.unwrap());
        // Second completion is a no-op.
        assert!(!complete(&db, "m1", false, 300).await.unwrap());

        let m = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(m.status, MessageStatus::Completed);
        assert_eq!(m.completed_at, Some(200));

        // No back-transition to processing either.
        assert!(!mark_processing(&db, "m1", 400).await.unwrap());
    }

    #[tokio::test]
    async fn complete_failure_marks_failed() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        mark_processing(&db, "m1", 150).await.unwrap();
        complete(&db, "m1", false, 200).await.unwrap();

        let m = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(m.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn queue_position_counts_pending_and_processing() {
        let (db, _dir) = setup_db().await;
        assert_eq!(pending_or_processing_count(&db).await.unwrap(), 0);

        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        insert_message(&db, &make_message("m2", 200)).await.unwrap();
        mark_processing(&db, "m1", 150).await.unwrap();
        assert_eq!(pending_or_processing_count(&db).await.unwrap(), 2);

        complete(&db, "m1", true, 300).await.unwrap();
        assert_eq!(pending_or_processing_count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pagination_peeks_limit_plus_one() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            insert_message(&db, &make_message(&format!("m{i}"), 100 + i))
                .await
                .unwrap();
        }

        let (page, has_more) = list_messages(&db, None, 2, None).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].id, "m0");

        let cursor = page.last().unwrap().created_at;
        let (page, has_more) = list_messages(&db, Some(cursor), 3, None).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(!has_more);
        assert_eq!(page[0].id, "m2");
    }

    #[tokio::test]
    async fn pagination_filters_by_status() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", 100)).await.unwrap();
        insert_message(&db, &make_message("m2", 200)).await.unwrap();
        mark_processing(&db, "m1", 150).await.unwrap();
        complete(&db, "m1", true, 160).await.unwrap();

        let (done, _) = list_messages(&db, None, 10, Some(MessageStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "m1");

        let (pending, _) = list_messages(&db, None, 10, Some(MessageStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "m2");
    }
}
