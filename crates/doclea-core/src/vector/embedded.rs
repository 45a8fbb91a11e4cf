//! Embedded vector store: a plain `rusqlite` table plus in-process
//! linear-scan KNN (§4.B). No SQLite vector extension is assumed to be
//! present, so this is a normal table of `(id, embedding_blob)` with a
//! sibling payload table — a deliberate simplification noted in
//! `DESIGN.md`.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    l2_to_similarity, overfetch_limit, CollectionInfo, PointKind, Result, ScoredPoint,
    VectorFilter, VectorPayload, VectorStore, VectorStoreError,
};

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// SQLite-table-backed [`VectorStore`]. Shares the `Mutex<Connection>` +
/// PRAGMA convention the relational store uses (§4.C).
pub struct EmbeddedVectorStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl EmbeddedVectorStore {
    pub fn new(conn: Connection, dimensions: usize) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vector_points (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS vector_payloads (
                id TEXT PRIMARY KEY REFERENCES vector_points(id) ON DELETE CASCADE,
                memory_id TEXT,
                kind TEXT,
                type TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                related_files TEXT NOT NULL DEFAULT '[]',
                importance REAL NOT NULL DEFAULT 0.0
            );
            CREATE INDEX IF NOT EXISTS idx_vector_payloads_memory_id
                ON vector_payloads(memory_id);",
        )
        .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    fn kind_str(kind: PointKind) -> &'static str {
        match kind {
            PointKind::Memory => "memory",
            PointKind::Entity => "entity",
            PointKind::CommunityReport => "community_report",
        }
    }

    fn kind_from_str(s: &str) -> Option<PointKind> {
        match s {
            "memory" => Some(PointKind::Memory),
            "entity" => Some(PointKind::Entity),
            "community_report" => Some(PointKind::CommunityReport),
            _ => None,
        }
    }
}

#[async_trait]
impl VectorStore for EmbeddedVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: VectorPayload) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        tx.execute("DELETE FROM vector_points WHERE id = ?1", params![id])
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        tx.execute(
            "INSERT INTO vector_points (id, embedding) VALUES (?1, ?2)",
            params![id, encode_vector(&vector)],
        )
        .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        let tags = serde_json::to_string(&payload.tags).unwrap_or_else(|_| "[]".to_string());
        let files =
            serde_json::to_string(&payload.related_files).unwrap_or_else(|_| "[]".to_string());

        tx.execute(
            "INSERT INTO vector_payloads
                (id, memory_id, kind, type, tags, related_files, importance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                memory_id = excluded.memory_id,
                kind = excluded.kind,
                type = excluded.type,
                tags = excluded.tags,
                related_files = excluded.related_files,
                importance = excluded.importance",
            params![
                id,
                payload.memory_id,
                payload.kind.map(Self::kind_str),
                payload.r#type,
                tags,
                files,
                payload.importance,
            ],
        )
        .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        tx.commit().map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize, filter: &VectorFilter) -> Result<Vec<ScoredPoint>> {
        if query.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.embedding, y.memory_id, y.kind, y.type, y.tags, y.related_files, y.importance
                 FROM vector_points p
                 JOIN vector_payloads y ON y.id = p.id",
            )
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let embedding: Vec<u8> = row.get(1)?;
                let tags_json: String = row.get(5)?;
                let files_json: String = row.get(6)?;
                let payload = VectorPayload {
                    memory_id: row.get(2)?,
                    kind: row.get::<_, Option<String>>(3)?.and_then(|k| Self::kind_from_str(&k)),
                    r#type: row.get(4)?,
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    related_files: serde_json::from_str(&files_json).unwrap_or_default(),
                    importance: row.get(7)?,
                };
                Ok((id, decode_vector(&embedding), payload))
            })
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        let overfetch = overfetch_limit(limit, filter);
        let mut scored: Vec<ScoredPoint> = Vec::new();
        for row in rows {
            let (id, vector, payload) = row.map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
            let distance = l2_distance(query, &vector);
            scored.push(ScoredPoint {
                id,
                score: l2_to_similarity(distance),
                payload,
            });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(overfetch);

        scored.retain(|p| filter.matches(&p.payload));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM vector_points WHERE id = ?1", params![id])
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_memory_id(&self, memory_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let ids: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT id FROM vector_payloads WHERE memory_id = ?1")
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
            let rows = stmt
                .query_map(params![memory_id], |row| row.get(0))
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?
        };
        for id in &ids {
            conn.execute("DELETE FROM vector_points WHERE id = ?1", params![id])
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        }
        Ok(ids.len())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let conn = self.conn.lock().unwrap();
        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM vector_points", [], |row| row.get(0))
            .optional()
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?
            .unwrap_or(0);
        Ok(CollectionInfo {
            vector_count: count,
            dimensions: self.dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::FilterClause;

    fn store() -> EmbeddedVectorStore {
        let conn = Connection::open_in_memory().unwrap();
        EmbeddedVectorStore::new(conn, 3).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_search_finds_the_point() {
        let store = store();
        store
            .upsert("a", vec![1.0, 0.0, 0.0], VectorPayload::default())
            .await
            .unwrap();
        let results = store.search(&[1.0, 0.0, 0.0], 5, &VectorFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = store();
        let err = store.upsert("a", vec![1.0, 0.0], VectorPayload::default()).await;
        assert!(matches!(err, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_delete_then_insert() {
        let store = store();
        store
            .upsert("a", vec![1.0, 0.0, 0.0], VectorPayload::default())
            .await
            .unwrap();
        store
            .upsert("a", vec![0.0, 1.0, 0.0], VectorPayload::default())
            .await
            .unwrap();
        let info = store.collection_info().await.unwrap();
        assert_eq!(info.vector_count, 1);
    }

    #[tokio::test]
    async fn search_applies_metadata_filter_after_knn() {
        let store = store();
        store
            .upsert(
                "a",
                vec![1.0, 0.0, 0.0],
                VectorPayload {
                    r#type: Some("decision".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                "b",
                vec![1.0, 0.0, 0.0],
                VectorPayload {
                    r#type: Some("note".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![FilterClause::MatchType("decision".to_string())],
        };
        let results = store.search(&[1.0, 0.0, 0.0], 5, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn delete_by_memory_id_removes_all_matching_points() {
        let store = store();
        store
            .upsert(
                "a",
                vec![1.0, 0.0, 0.0],
                VectorPayload {
                    memory_id: Some("m1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                "b",
                vec![0.0, 1.0, 0.0],
                VectorPayload {
                    memory_id: Some("m1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let removed = store.delete_by_memory_id("m1").await.unwrap();
        assert_eq!(removed, 2);
        let info = store.collection_info().await.unwrap();
        assert_eq!(info.vector_count, 0);
    }
}
