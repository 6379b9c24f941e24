// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact operations. Artifacts are append-only.

use drydock_core::DrydockError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Artifact;

/// Append an artifact.
pub async fn insert_artifact(db: &Database, artifact: &Artifact) -> Result<(), DrydockError> {
    let a = artifact.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO artifacts (id, artifact_type, url, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![a.id, a.artifact_type, a.url, a.metadata, a.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All artifacts, oldest first.
pub async fn list_artifacts(db: &Database) -> Result<Vec<Artifact>, DrydockError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, artifact_type, url, metadata, created_at
                 FROM artifacts ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Artifact {
                    id: row.get(0)?,
                    artifact_type: row.get(1)?,
                    url: row.get(2)?,
                    metadata: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut artifacts = Vec::new();
            for row in rows {
                artifacts.push(row?);
            }
            Ok(artifacts)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn insert_and_list_roundtrips() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).await.unwrap();

        insert_artifact(
            &db,
            &Artifact {
                id: "a1".to_string(),
                artifact_type: "pull_request".to_string(),
                url: "https://github.com/acme/widgets/pull/7".to_string(),
                metadata: Some(r#"{"number":7}"#.to_string()),
                created_at: 100,
            },
        )
        .await
        .unwrap();
        insert_artifact(
            &db,
            &Artifact {
                id: "a2".to_string(),
                artifact_type: "screenshot".to_string(),
                url: "https://cdn.example.com/shot.png".to_string(),
                metadata: None,
                created_at: 200,
            },
        )
        .await
        .unwrap();

        let all = list_artifacts(&db).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a1");
        assert_eq!(all[1].artifact_type, "screenshot");
    }
}
