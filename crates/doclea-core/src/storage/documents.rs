//! Document, Chunk, and embedding-cache CRUD (§3, §4.D).

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{Storage, StorageError};
use crate::memory::{Chunk, ChunkMetadata, Document, EmbeddingCacheEntry};

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let headers_json: String = row.get("headers")?;
    Ok(Chunk {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        content: row.get("content")?,
        token_count: row.get::<_, i64>("token_count")? as usize,
        vector_id: row.get("vector_id")?,
        start_offset: row.get::<_, i64>("start_offset")? as usize,
        end_offset: row.get::<_, i64>("end_offset")? as usize,
        metadata: ChunkMetadata {
            headers: serde_json::from_str(&headers_json).unwrap_or_default(),
            level: row.get::<_, i64>("level")? as usize,
            start_line: row.get::<_, i64>("start_line")? as usize,
            end_line: row.get::<_, i64>("end_line")? as usize,
            has_frontmatter: row.get::<_, i64>("has_frontmatter")? != 0,
            has_code_block: row.get::<_, i64>("has_code_block")? != 0,
        },
    })
}

impl Storage {
    /// Inserts a document and its chunks transactionally: either all rows
    /// land, or none do.
    pub fn store_document(&self, title: &str, content: &str, chunks: Vec<Chunk>, now: i64) -> super::Result<(Document, Vec<Chunk>)> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
        };

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![document.id, document.title, document.content, document.created_at],
        )?;

        let mut stored_chunks = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            chunk.document_id = document.id.clone();
            if chunk.id.is_empty() {
                chunk.id = Uuid::new_v4().to_string();
            }
            tx.execute(
                "INSERT INTO chunks (id, document_id, content, token_count, vector_id, start_offset, end_offset,
                    headers, level, start_line, end_line, has_frontmatter, has_code_block)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
                params![
                    chunk.id,
                    chunk.document_id,
                    chunk.content,
                    chunk.token_count as i64,
                    chunk.vector_id,
                    chunk.start_offset as i64,
                    chunk.end_offset as i64,
                    serde_json::to_string(&chunk.metadata.headers)?,
                    chunk.metadata.level as i64,
                    chunk.metadata.start_line as i64,
                    chunk.metadata.end_line as i64,
                    chunk.metadata.has_frontmatter as i64,
                    chunk.metadata.has_code_block as i64,
                ],
            )?;
            stored_chunks.push(chunk);
        }
        tx.commit()?;
        Ok((document, stored_chunks))
    }

    pub fn get_document(&self, id: &str) -> super::Result<Document> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, title, content, created_at FROM documents WHERE id = ?1",
            params![id],
            row_to_document,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn delete_document(&self, id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list_chunks_for_document(&self, document_id: &str) -> super::Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, token_count, vector_id, start_offset, end_offset,
                headers, level, start_line, end_line, has_frontmatter, has_code_block
             FROM chunks WHERE document_id = ?1 ORDER BY start_offset",
        )?;
        let rows = stmt.query_map(params![document_id], row_to_chunk)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_documents(&self) -> super::Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, title, content, created_at FROM documents ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_document)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_all_chunks(&self) -> super::Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, token_count, vector_id, start_offset, end_offset,
                headers, level, start_line, end_line, has_frontmatter, has_code_block
             FROM chunks ORDER BY document_id, start_offset",
        )?;
        let rows = stmt.query_map([], row_to_chunk)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Restores a document row verbatim (export/import, §4.M) — unlike
    /// [`Storage::store_document`] this preserves the given id rather than
    /// minting a fresh one.
    pub fn insert_document(&self, document: &Document) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (id, title, content, created_at) VALUES (?1,?2,?3,?4)",
            params![document.id, document.title, document.content, document.created_at],
        )?;
        Ok(())
    }

    /// Restores a chunk row verbatim (export/import, §4.M).
    pub fn insert_chunk(&self, chunk: &Chunk) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chunks (id, document_id, content, token_count, vector_id, start_offset, end_offset,
                headers, level, start_line, end_line, has_frontmatter, has_code_block)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                chunk.id,
                chunk.document_id,
                chunk.content,
                chunk.token_count as i64,
                chunk.vector_id,
                chunk.start_offset as i64,
                chunk.end_offset as i64,
                serde_json::to_string(&chunk.metadata.headers)?,
                chunk.metadata.level as i64,
                chunk.metadata.start_line as i64,
                chunk.metadata.end_line as i64,
                chunk.metadata.has_frontmatter as i64,
                chunk.metadata.has_code_block as i64,
            ],
        )?;
        Ok(())
    }

    pub fn set_chunk_vector_id(&self, chunk_id: &str, vector_id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE chunks SET vector_id = ?2 WHERE id = ?1",
            params![chunk_id, vector_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(chunk_id.to_string()));
        }
        Ok(())
    }

    pub fn get_cached_embedding(&self, content_hash: &str, model: &str) -> super::Result<Option<EmbeddingCacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT content_hash, model, vector, created_at FROM embedding_cache WHERE content_hash = ?1 AND model = ?2",
                params![content_hash, model],
                |row| {
                    let blob: Vec<u8> = row.get("vector")?;
                    Ok(EmbeddingCacheEntry {
                        content_hash: row.get("content_hash")?,
                        model: row.get("model")?,
                        embedding: blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn put_cached_embedding(&self, entry: &EmbeddingCacheEntry) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob: Vec<u8> = entry.embedding.iter().flat_map(|v| v.to_le_bytes()).collect();
        conn.execute(
            "INSERT INTO embedding_cache (content_hash, model, vector, created_at) VALUES (?1,?2,?3,?4)
             ON CONFLICT(content_hash, model) DO UPDATE SET vector = excluded.vector, created_at = excluded.created_at",
            params![entry.content_hash, entry.model, blob, entry.created_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: String::new(),
            document_id: String::new(),
            content: "chunk body".into(),
            token_count: 2,
            vector_id: None,
            start_offset: 0,
            end_offset: 10,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn store_document_persists_chunks_with_document_id_backfilled() {
        let storage = Storage::open_in_memory().unwrap();
        let (document, chunks) = storage
            .store_document("Title", "full content", vec![sample_chunk()], 1000)
            .unwrap();
        assert_eq!(chunks[0].document_id, document.id);
        let fetched = storage.list_chunks_for_document(&document.id).unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[test]
    fn deleting_document_cascades_to_chunks() {
        let storage = Storage::open_in_memory().unwrap();
        let (document, _) = storage
            .store_document("Title", "full content", vec![sample_chunk()], 1000)
            .unwrap();
        storage.delete_document(&document.id).unwrap();
        assert!(storage.list_chunks_for_document(&document.id).unwrap().is_empty());
    }

    #[test]
    fn embedding_cache_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let entry = EmbeddingCacheEntry {
            content_hash: "abc".into(),
            model: "transformers".into(),
            embedding: vec![0.1, 0.2, 0.3],
            created_at: 1000,
        };
        storage.put_cached_embedding(&entry).unwrap();
        let fetched = storage.get_cached_embedding("abc", "transformers").unwrap().unwrap();
        assert!((fetched.embedding[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn embedding_cache_miss_returns_none() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.get_cached_embedding("missing", "m").unwrap().is_none());
    }
}
