//! `Memory` CRUD (§3, §4.C).

use std::collections::BTreeSet;
use std::str::FromStr;

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{Storage, StorageError};
use crate::memory::{DecayFunction, IngestInput, Memory, MemoryType};

fn join_set(set: &BTreeSet<String>) -> String {
    serde_json::to_string(set).unwrap_or_else(|_| "[]".into())
}

fn split_set(s: &str) -> BTreeSet<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn decay_function_str(d: DecayFunction) -> &'static str {
    match d {
        DecayFunction::Exponential => "exponential",
        DecayFunction::Linear => "linear",
        DecayFunction::Step => "step",
        DecayFunction::None => "none",
    }
}

fn decay_function_from_str(s: &str) -> Option<DecayFunction> {
    match s {
        "exponential" => Some(DecayFunction::Exponential),
        "linear" => Some(DecayFunction::Linear),
        "step" => Some(DecayFunction::Step),
        "none" => Some(DecayFunction::None),
        _ => None,
    }
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let memory_type_str: String = row.get("memory_type")?;
    let tags_json: String = row.get("tags")?;
    let files_json: String = row.get("related_files")?;
    let experts_json: String = row.get("experts")?;
    let decay_function_str: Option<String> = row.get("decay_function")?;

    Ok(Memory {
        id: row.get("id")?,
        memory_type: MemoryType::from_str(&memory_type_str).unwrap_or_default(),
        title: row.get("title")?,
        content: row.get("content")?,
        summary: row.get("summary")?,
        importance: row.get("importance")?,
        tags: split_set(&tags_json),
        related_files: serde_json::from_str(&files_json).unwrap_or_default(),
        git_commit: row.get("git_commit")?,
        source_pr: row.get("source_pr")?,
        experts: split_set(&experts_json),
        created_at: row.get("created_at")?,
        accessed_at: row.get("accessed_at")?,
        access_count: row.get("access_count")?,
        needs_review: row.get::<_, i64>("needs_review")? != 0,
        vector_id: row.get("vector_id")?,
        decay_rate: row.get("decay_rate")?,
        last_refreshed_at: row.get("last_refreshed_at")?,
        confidence_floor: row.get("confidence_floor")?,
        decay_function: decay_function_str.as_deref().and_then(decay_function_from_str),
    })
}

const MEMORY_COLUMNS: &str = "id, memory_type, title, content, summary, importance, tags, related_files,
    git_commit, source_pr, experts, created_at, accessed_at, access_count, needs_review,
    vector_id, decay_rate, last_refreshed_at, confidence_floor, decay_function";

impl Storage {
    /// Creates a new memory from ingest input, stamping `createdAt` ==
    /// `accessedAt` == `now` and `accessCount = 0`.
    pub fn store_memory(&self, input: IngestInput, now: i64) -> super::Result<Memory> {
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            memory_type: input.memory_type,
            title: input.title,
            content: input.content,
            summary: input.summary,
            importance: input.importance,
            tags: input.tags,
            related_files: input.related_files,
            git_commit: input.git_commit,
            source_pr: input.source_pr,
            experts: input.experts,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        };
        self.insert_memory(&memory)?;
        Ok(memory)
    }

    pub fn insert_memory(&self, memory: &Memory) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)"),
            params![
                memory.id,
                memory.memory_type.as_str(),
                memory.title,
                memory.content,
                memory.summary,
                memory.importance,
                join_set(&memory.tags),
                serde_json::to_string(&memory.related_files)?,
                memory.git_commit,
                memory.source_pr,
                join_set(&memory.experts),
                memory.created_at,
                memory.accessed_at,
                memory.access_count,
                memory.needs_review as i64,
                memory.vector_id,
                memory.decay_rate,
                memory.last_refreshed_at,
                memory.confidence_floor,
                memory.decay_function.map(decay_function_str),
            ],
        )?;
        Ok(())
    }

    pub fn get_memory(&self, id: &str) -> super::Result<Memory> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            params![id],
            row_to_memory,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Bumps `accessCount` and `accessedAt` (invariant 1/3: monotonic,
    /// non-decreasing).
    pub fn touch_memory(&self, id: &str, now: i64) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET access_count = access_count + 1, accessed_at = MAX(accessed_at, ?2) WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn update_memory(&self, memory: &Memory) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET memory_type=?2, title=?3, content=?4, summary=?5, importance=?6,
                tags=?7, related_files=?8, git_commit=?9, source_pr=?10, experts=?11,
                accessed_at=?12, access_count=?13, needs_review=?14, vector_id=?15,
                decay_rate=?16, last_refreshed_at=?17, confidence_floor=?18, decay_function=?19
             WHERE id = ?1",
            params![
                memory.id,
                memory.memory_type.as_str(),
                memory.title,
                memory.content,
                memory.summary,
                memory.importance,
                join_set(&memory.tags),
                serde_json::to_string(&memory.related_files)?,
                memory.git_commit,
                memory.source_pr,
                join_set(&memory.experts),
                memory.accessed_at,
                memory.access_count,
                memory.needs_review as i64,
                memory.vector_id,
                memory.decay_rate,
                memory.last_refreshed_at,
                memory.confidence_floor,
                memory.decay_function.map(decay_function_str),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(memory.id.clone()));
        }
        Ok(())
    }

    pub fn delete_memory(&self, id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list_memories(&self) -> super::Result<Vec<Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at"))?;
        let rows = stmt.query_map([], row_to_memory)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// FTS5 keyword search. `sanitize_fts5_query` strips characters FTS5's
    /// query syntax would otherwise interpret as operators.
    pub fn search_memories_by_keyword(&self, query: &str, limit: usize) -> super::Result<Vec<Memory>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.conn.lock().unwrap();
        let sql = "SELECT m.id, m.memory_type, m.title, m.content, m.summary, m.importance, m.tags,
                m.related_files, m.git_commit, m.source_pr, m.experts, m.created_at, m.accessed_at,
                m.access_count, m.needs_review, m.vector_id, m.decay_rate, m.last_refreshed_at,
                m.confidence_floor, m.decay_function
             FROM memories m
             JOIN memories_fts f ON f.rowid = m.rowid
             WHERE memories_fts MATCH ?1
             ORDER BY rank LIMIT ?2";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![sanitized, limit as i64], row_to_memory)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Escapes FTS5 query-syntax characters so stored content containing them
/// can't be used to inject boolean/NEAR operators into search.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_input() -> IngestInput {
        IngestInput {
            memory_type: MemoryType::Decision,
            title: "Use WAL mode".into(),
            content: "We chose WAL mode for concurrent readers.".into(),
            summary: None,
            importance: 0.8,
            tags: BTreeSet::from(["storage".to_string()]),
            related_files: vec!["src/storage/mod.rs".to_string()],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
        }
    }

    #[test]
    fn store_then_get_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(sample_input(), 1000).unwrap();
        let fetched = storage.get_memory(&memory.id).unwrap();
        assert_eq!(fetched.title, "Use WAL mode");
        assert_eq!(fetched.access_count, 0);
    }

    #[test]
    fn touch_memory_increments_access_count_and_keeps_accessed_at_monotonic() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(sample_input(), 1000).unwrap();
        storage.touch_memory(&memory.id, 2000).unwrap();
        storage.touch_memory(&memory.id, 1500).unwrap();
        let fetched = storage.get_memory(&memory.id).unwrap();
        assert_eq!(fetched.access_count, 2);
        assert_eq!(fetched.accessed_at, 2000);
    }

    #[test]
    fn get_missing_memory_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(matches!(storage.get_memory("missing"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn delete_memory_removes_it() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(sample_input(), 1000).unwrap();
        storage.delete_memory(&memory.id).unwrap();
        assert!(storage.get_memory(&memory.id).is_err());
    }

    #[test]
    fn keyword_search_finds_matching_memory() {
        let storage = Storage::open_in_memory().unwrap();
        storage.store_memory(sample_input(), 1000).unwrap();
        let results = storage.search_memories_by_keyword("WAL", 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn sanitize_fts5_query_strips_operators() {
        let sanitized = sanitize_fts5_query("foo OR \"bar\" -baz*");
        assert!(!sanitized.contains('*'));
        assert!(!sanitized.contains("OR \""));
    }
}
