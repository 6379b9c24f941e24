// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only event log operations.

use drydock_core::types::EventType;
use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_enum, Event};

const EVENT_COLUMNS: &str = "id, event_type, payload, message_id, created_at";

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<Event, rusqlite::Error> {
    Ok(Event {
        id: row.get(0)?,
        event_type: parse_enum(row.get(1)?, 1)?,
        payload: row.get(2)?,
        message_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Append an event. Events are never updated or deleted.
pub async fn insert_event(db: &Database, event: &Event) -> Result<(), DrydockError> {
    let e = event.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO events (id, event_type, payload, message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    e.id,
                    e.event_type.to_string(),
                    e.payload,
                    e.message_id,
                    e.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Cursor-paginated event listing in arrival order.
///
/// The cursor is the `created_at` of the last returned row; `has_more` is the
/// result of peeking `limit + 1` rows. Optional filters narrow by event type
/// and message correlation.
pub async fn list_events(
    db: &Database,
    cursor: Option<i64>,
    limit: usize,
    event_type: Option<EventType>,
    message_id: Option<String>,
) -> Result<(Vec<Event>, bool), DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut sql =
                format!("SELECT {EVENT_COLUMNS} FROM events WHERE created_at > ?1");
            let mut bindings: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(cursor.unwrap_or(i64::MIN))];

            if let Some(t) = event_type {
                sql.push_str(&format!(" AND event_type = ?{}", bindings.len() + 1));
                bindings.push(Box::new(t.to_string()));
            }
            if let Some(mid) = message_id {
                sql.push_str(&format!(" AND message_id = ?{}", bindings.len() + 1));
                bindings.push(Box::new(mid));
            }

            sql.push_str(&format!(
                " ORDER BY created_at ASC, id ASC LIMIT ?{}",
                bindings.len() + 1
            ));
            bindings.push(Box::new((limit + 1) as i64));

            let mut stmt = conn.prepare(&sql)?;
            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                bindings.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params_ref.as_slice(), row_to_event)?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            let has_more = events.len() > limit;
            events.truncate(limit);
            Ok((events, has_more))
        })
        .await
        .map_err(map_tr_err)
}

/// Total number of persisted events (test and diagnostics helper).
pub async fn count_events(db: &Database) -> Result<i64, DrydockError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
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
        (db, dir)
    }

    fn make_event(id: &str, event_type: EventType, message_id: Option<&str>, at: i64) -> Event {
        Event {
            id: id.to_string(),
            event_type,
            payload: r#"{"content":"x"}"#.to_string(),
            message_id: message_id.map(String::from),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn events_list_in_arrival_order() {
        let (db, _dir) = setup_db().await;
        insert_event(&db, &make_event("e1", EventType::Token, Some("m1"), 100))
            .await
            .unwrap();
        insert_event(&db, &make_event("e2", EventType::ToolCall, Some("m1"), 200))
            .await
            .unwrap();
        insert_event(&db, &make_event("e3", EventType::Heartbeat, None, 300))
            .await
            .unwrap();

        let (events, has_more) = list_events(&db, None, 10, None, None).await.unwrap();
        assert_eq!(
            events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["e1", "e2", "e3"]
        );
        assert!(!has_more);
    }

    #[tokio::test]
    async fn pagination_cursor_is_last_created_at() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            insert_event(
                &db,
                &make_event(&format!("e{i}"), EventType::Token, None, 100 + i),
            )
            .await
            .unwrap();
        }

        let (page1, has_more) = list_events(&db, None, 2, None, None).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert!(has_more);

        let cursor = page1.last().unwrap().created_at;
        let (page2, has_more) = list_events(&db, Some(cursor), 10, None, None).await.unwrap();
        assert_eq!(page2.len(), 3);
        assert!(!has_more);
        assert_eq!(page2[0].id, "e2");
    }

    #[tokio::test]
    async fn exactly_limit_rows_reports_no_more() {
        let (db, _dir) = setup_db().await;
        for i in 0..3 {
            insert_event(
                &db,
                &make_event(&format!("e{i}"), EventType::Token, None, 100 + i),
            )
            .await
            .unwrap();
        }

        let (page, has_more) = list_events(&db, None, 3, None, None).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(!has_more);
    }

    #[tokio::test]
    async fn filters_by_type_and_message() {
        let (db, _dir) = setup_db().await;
        insert_event(&db, &make_event("e1", EventType::Token, Some("m1"), 100))
            .await
            .unwrap();
        insert_event(&db, &make_event("e2", EventType::Token, Some("m2"), 200))
            .await
            .unwrap();
        insert_event(&db, &make_event("e3", EventType::GitSync, None, 300))
            .await
            .unwrap();

        let (tokens, _) = list_events(&db, None, 10, Some(EventType::Token), None)
            .await
            .unwrap();
        assert_eq!(tokens.len(), 2);

        let (m1_events, _) = list_events(&db, None, 10, None, Some("m1".to_string()))
            .await
            .unwrap();
        assert_eq!(m1_events.len(), 1);
        assert_eq!(m1_events[0].id, "e1");

        let (both, _) = list_events(
            &db,
            None,
            10,
            Some(EventType::Token),
            Some("m2".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, "e2");
    }
}
