//! Memory-relation and cross-layer-relation CRUD (§4.H, §4.I).

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{Storage, StorageError};
use crate::memory::{
    CrossLayerDirection, CrossLayerRelation, CrossLayerSuggestion, CrossLayerType, DetectionMethod,
    MemoryRelation, RelationStatus, RelationSuggestion, RelationType,
};

fn status_str(s: RelationStatus) -> &'static str {
    match s {
        RelationStatus::Pending => "pending",
        RelationStatus::Approved => "approved",
        RelationStatus::Rejected => "rejected",
    }
}

fn status_from_str(s: &str) -> RelationStatus {
    match s {
        "approved" => RelationStatus::Approved,
        "rejected" => RelationStatus::Rejected,
        _ => RelationStatus::Pending,
    }
}

fn detection_method_str(m: DetectionMethod) -> &'static str {
    match m {
        DetectionMethod::Semantic => "semantic",
        DetectionMethod::Keyword => "keyword",
        DetectionMethod::FileOverlap => "file_overlap",
        DetectionMethod::Temporal => "temporal",
        DetectionMethod::CodeReference => "code_reference",
        DetectionMethod::FilePath => "file_path",
    }
}

fn detection_method_from_str(s: &str) -> DetectionMethod {
    match s {
        "keyword" => DetectionMethod::Keyword,
        "file_overlap" => DetectionMethod::FileOverlap,
        "temporal" => DetectionMethod::Temporal,
        "code_reference" => DetectionMethod::CodeReference,
        "file_path" => DetectionMethod::FilePath,
        _ => DetectionMethod::Semantic,
    }
}

fn cross_layer_type_str(t: CrossLayerType) -> &'static str {
    match t {
        CrossLayerType::Documents => "documents",
        CrossLayerType::Addresses => "addresses",
        CrossLayerType::Exemplifies => "exemplifies",
    }
}

fn cross_layer_type_from_str(s: &str) -> CrossLayerType {
    match s {
        "addresses" => CrossLayerType::Addresses,
        "exemplifies" => CrossLayerType::Exemplifies,
        _ => CrossLayerType::Documents,
    }
}

fn cross_layer_direction_str(d: CrossLayerDirection) -> &'static str {
    match d {
        CrossLayerDirection::MemoryToCode => "memory_to_code",
        CrossLayerDirection::CodeToMemory => "code_to_memory",
    }
}

fn cross_layer_direction_from_str(s: &str) -> CrossLayerDirection {
    match s {
        "code_to_memory" => CrossLayerDirection::CodeToMemory,
        _ => CrossLayerDirection::MemoryToCode,
    }
}

fn row_to_relation(row: &rusqlite::Row) -> rusqlite::Result<MemoryRelation> {
    let relation_type: String = row.get("relation_type")?;
    Ok(MemoryRelation {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relation_type: relation_type.parse().unwrap_or(RelationType::RelatedTo),
        weight: row.get("weight")?,
        metadata: row.get("metadata")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_suggestion(row: &rusqlite::Row) -> rusqlite::Result<RelationSuggestion> {
    let status: String = row.get("status")?;
    let method: String = row.get("detection_method")?;
    Ok(RelationSuggestion {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        suggested_type: row.get("suggested_type")?,
        confidence: row.get("confidence")?,
        reason: row.get("reason")?,
        detection_method: detection_method_from_str(&method),
        status: status_from_str(&status),
        created_at: row.get("created_at")?,
        reviewed_at: row.get("reviewed_at")?,
    })
}

fn row_to_cross_layer_relation(row: &rusqlite::Row) -> rusqlite::Result<CrossLayerRelation> {
    let relation_type: String = row.get("relation_type")?;
    let direction: String = row.get("direction")?;
    Ok(CrossLayerRelation {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        code_node_id: row.get("code_node_id")?,
        relation_type: cross_layer_type_from_str(&relation_type),
        direction: cross_layer_direction_from_str(&direction),
        confidence: row.get("confidence")?,
        metadata: row.get("metadata")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_cross_layer_suggestion(row: &rusqlite::Row) -> rusqlite::Result<CrossLayerSuggestion> {
    let relation_type: String = row.get("relation_type")?;
    let direction: String = row.get("direction")?;
    let status: String = row.get("status")?;
    Ok(CrossLayerSuggestion {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        code_node_id: row.get("code_node_id")?,
        relation_type: cross_layer_type_from_str(&relation_type),
        direction: cross_layer_direction_from_str(&direction),
        confidence: row.get("confidence")?,
        reason: row.get("reason")?,
        status: status_from_str(&status),
        created_at: row.get("created_at")?,
        reviewed_at: row.get("reviewed_at")?,
    })
}

impl Storage {
    /// Materializes a relation. Unique on `(source, target, type)`
    /// (invariant 2); a conflicting insert is surfaced so the suggestion
    /// queue can drain the duplicate instead of failing the caller.
    pub fn insert_memory_relation(&self, relation: &MemoryRelation) -> super::Result<()> {
        if relation.source_id == relation.target_id {
            return Err(StorageError::Conflict("relation source and target must differ".into()));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memory_relations (id, source_id, target_id, relation_type, weight, metadata, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                relation.id,
                relation.source_id,
                relation.target_id,
                relation.relation_type.as_str(),
                relation.weight,
                relation.metadata,
                relation.created_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                StorageError::Conflict(format!(
                    "relation ({}, {}, {}) already exists",
                    relation.source_id,
                    relation.target_id,
                    relation.relation_type.as_str()
                ))
            }
            other => StorageError::Database(other),
        })?;
        Ok(())
    }

    /// Every materialized memory relation, used by the export path (§4.M).
    pub fn list_all_memory_relations(&self) -> super::Result<Vec<MemoryRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relation_type, weight, metadata, created_at
             FROM memory_relations ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_relation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_relations_for_memory(&self, memory_id: &str) -> super::Result<Vec<MemoryRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relation_type, weight, metadata, created_at
             FROM memory_relations WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let rows = stmt.query_map(params![memory_id], row_to_relation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Used by the import path's `overwrite` conflict strategy (§4.M) —
    /// a no-op `Ok(())` if the id is already absent.
    pub fn delete_memory_relation(&self, id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM memory_relations WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Used by the import path's `overwrite` conflict strategy (§4.M).
    pub fn delete_cross_layer_relation(&self, id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cross_layer_relations WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Unique on `id`; a re-imported suggestion with the same id surfaces
    /// as `Conflict` so the import path's conflict strategy (§4.M) can
    /// decide whether to skip, overwrite, or fail.
    pub fn insert_relation_suggestion(&self, suggestion: &RelationSuggestion) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO relation_suggestions
                (id, source_id, target_id, suggested_type, confidence, reason, detection_method, status, created_at, reviewed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                suggestion.id,
                suggestion.source_id,
                suggestion.target_id,
                suggestion.suggested_type,
                suggestion.confidence,
                suggestion.reason,
                detection_method_str(suggestion.detection_method),
                status_str(suggestion.status),
                suggestion.created_at,
                suggestion.reviewed_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StorageError::Conflict(format!("relation suggestion {} already exists", suggestion.id))
            }
            other => StorageError::Database(other),
        })?;
        Ok(())
    }

    /// Used by the import path's `overwrite` conflict strategy (§4.M) —
    /// a no-op `Ok(())` if the id is already absent.
    pub fn delete_relation_suggestion(&self, id: &str) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM relation_suggestions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn list_pending_relation_suggestions(&self) -> super::Result<Vec<RelationSuggestion>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, suggested_type, confidence, reason, detection_method, status, created_at, reviewed_at
             FROM relation_suggestions WHERE status = 'pending' ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_suggestion)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Reviews one suggestion: marks `status` and, on approval, materializes
    /// a [`MemoryRelation`] (collapsing extended suggested types like
    /// `causes`/`solves` into `references`, per §9's open question).
    pub fn review_relation_suggestion(&self, id: &str, approve: bool, now: i64) -> super::Result<Option<MemoryRelation>> {
        let conn = self.conn.lock().unwrap();
        let suggestion = conn
            .query_row(
                "SELECT id, source_id, target_id, suggested_type, confidence, reason, detection_method, status, created_at, reviewed_at
                 FROM relation_suggestions WHERE id = ?1",
                params![id],
                row_to_suggestion,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let new_status = if approve { RelationStatus::Approved } else { RelationStatus::Rejected };
        conn.execute(
            "UPDATE relation_suggestions SET status = ?2, reviewed_at = ?3 WHERE id = ?1",
            params![id, status_str(new_status), now],
        )?;

        if !approve {
            return Ok(None);
        }

        let relation_type: RelationType = suggestion.suggested_type.parse().unwrap_or(RelationType::References);
        let relation = MemoryRelation {
            id: Uuid::new_v4().to_string(),
            source_id: suggestion.source_id,
            target_id: suggestion.target_id,
            relation_type,
            weight: suggestion.confidence,
            metadata: Some(suggestion.reason),
            created_at: now,
        };
        self.insert_memory_relation_locked(&conn, &relation)?;
        Ok(Some(relation))
    }

    fn insert_memory_relation_locked(&self, conn: &rusqlite::Connection, relation: &MemoryRelation) -> super::Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO memory_relations (id, source_id, target_id, relation_type, weight, metadata, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                relation.id,
                relation.source_id,
                relation.target_id,
                relation.relation_type.as_str(),
                relation.weight,
                relation.metadata,
                relation.created_at,
            ],
        )?;
        Ok(())
    }

    /// Materializes a cross-layer relation directly (the auto-approve path
    /// of §4.I, bypassing the suggestion queue). Unique on
    /// `(memoryId, codeNodeId, type)` (invariant 6).
    pub fn insert_cross_layer_relation(&self, relation: &CrossLayerRelation) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO cross_layer_relations
                (id, memory_id, code_node_id, relation_type, direction, confidence, metadata, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                relation.id,
                relation.memory_id,
                relation.code_node_id,
                cross_layer_type_str(relation.relation_type),
                cross_layer_direction_str(relation.direction),
                relation.confidence,
                relation.metadata,
                relation.created_at,
            ],
        )?;
        Ok(())
    }

    /// Every materialized cross-layer relation, used by the export path (§4.M).
    pub fn list_all_cross_layer_relations(&self) -> super::Result<Vec<CrossLayerRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, code_node_id, relation_type, direction, confidence, metadata, created_at
             FROM cross_layer_relations ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_cross_layer_relation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Existing cross-layer relations touching `memory_id`, used to filter
    /// out candidates the detector (§4.I) would otherwise re-suggest.
    pub fn list_cross_layer_relations_for_memory(&self, memory_id: &str) -> super::Result<Vec<CrossLayerRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, code_node_id, relation_type, direction, confidence, metadata, created_at
             FROM cross_layer_relations WHERE memory_id = ?1",
        )?;
        let rows = stmt.query_map(params![memory_id], row_to_cross_layer_relation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Existing cross-layer relations touching `code_node_id`.
    pub fn list_cross_layer_relations_for_code_node(&self, code_node_id: &str) -> super::Result<Vec<CrossLayerRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, code_node_id, relation_type, direction, confidence, metadata, created_at
             FROM cross_layer_relations WHERE code_node_id = ?1",
        )?;
        let rows = stmt.query_map(params![code_node_id], row_to_cross_layer_relation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_cross_layer_suggestion(&self, suggestion: &CrossLayerSuggestion) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cross_layer_suggestions
                (id, memory_id, code_node_id, relation_type, direction, confidence, reason, status, created_at, reviewed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                suggestion.id,
                suggestion.memory_id,
                suggestion.code_node_id,
                cross_layer_type_str(suggestion.relation_type),
                cross_layer_direction_str(suggestion.direction),
                suggestion.confidence,
                suggestion.reason,
                status_str(suggestion.status),
                suggestion.created_at,
                suggestion.reviewed_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_pending_cross_layer_suggestions(&self) -> super::Result<Vec<CrossLayerSuggestion>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, code_node_id, relation_type, direction, confidence, reason, status, created_at, reviewed_at
             FROM cross_layer_suggestions WHERE status = 'pending' ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_cross_layer_suggestion)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn review_cross_layer_suggestion(&self, id: &str, approve: bool, now: i64) -> super::Result<Option<CrossLayerRelation>> {
        let conn = self.conn.lock().unwrap();
        let suggestion = conn
            .query_row(
                "SELECT id, memory_id, code_node_id, relation_type, direction, confidence, reason, status, created_at, reviewed_at
                 FROM cross_layer_suggestions WHERE id = ?1",
                params![id],
                row_to_cross_layer_suggestion,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let new_status = if approve { RelationStatus::Approved } else { RelationStatus::Rejected };
        conn.execute(
            "UPDATE cross_layer_suggestions SET status = ?2, reviewed_at = ?3 WHERE id = ?1",
            params![id, status_str(new_status), now],
        )?;

        if !approve {
            return Ok(None);
        }

        let relation = CrossLayerRelation {
            id: Uuid::new_v4().to_string(),
            memory_id: suggestion.memory_id,
            code_node_id: suggestion.code_node_id,
            relation_type: suggestion.relation_type,
            direction: suggestion.direction,
            confidence: suggestion.confidence,
            metadata: Some(suggestion.reason),
            created_at: now,
        };
        conn.execute(
            "INSERT OR IGNORE INTO cross_layer_relations
                (id, memory_id, code_node_id, relation_type, direction, confidence, metadata, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                relation.id,
                relation.memory_id,
                relation.code_node_id,
                cross_layer_type_str(relation.relation_type),
                cross_layer_direction_str(relation.direction),
                relation.confidence,
                relation.metadata,
                relation.created_at,
            ],
        )?;
        Ok(Some(relation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::memory::{IngestInput, MemoryType};

    fn seed_two_memories(storage: &Storage) -> (String, String) {
        let a = storage
            .store_memory(
                IngestInput {
                    memory_type: MemoryType::Note,
                    title: "A".into(),
                    content: "a".into(),
                    summary: None,
                    importance: 0.5,
                    tags: BTreeSet::new(),
                    related_files: vec![],
                    git_commit: None,
                    source_pr: None,
                    experts: BTreeSet::new(),
                },
                1000,
            )
            .unwrap();
        let b = storage
            .store_memory(
                IngestInput {
                    memory_type: MemoryType::Note,
                    title: "B".into(),
                    content: "b".into(),
                    summary: None,
                    importance: 0.5,
                    tags: BTreeSet::new(),
                    related_files: vec![],
                    git_commit: None,
                    source_pr: None,
                    experts: BTreeSet::new(),
                },
                1000,
            )
            .unwrap();
        (a.id, b.id)
    }

    #[test]
    fn relation_rejects_self_loop() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, _) = seed_two_memories(&storage);
        let relation = MemoryRelation {
            id: Uuid::new_v4().to_string(),
            source_id: a.clone(),
            target_id: a,
            relation_type: RelationType::RelatedTo,
            weight: 1.0,
            metadata: None,
            created_at: 1000,
        };
        assert!(matches!(storage.insert_memory_relation(&relation), Err(StorageError::Conflict(_))));
    }

    #[test]
    fn duplicate_relation_is_a_conflict() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, b) = seed_two_memories(&storage);
        let relation = MemoryRelation {
            id: Uuid::new_v4().to_string(),
            source_id: a,
            target_id: b,
            relation_type: RelationType::RelatedTo,
            weight: 1.0,
            metadata: None,
            created_at: 1000,
        };
        storage.insert_memory_relation(&relation).unwrap();
        let mut dup = relation.clone();
        dup.id = Uuid::new_v4().to_string();
        assert!(matches!(storage.insert_memory_relation(&dup), Err(StorageError::Conflict(_))));
    }

    #[test]
    fn approving_a_suggestion_materializes_a_relation() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, b) = seed_two_memories(&storage);
        let suggestion = RelationSuggestion {
            id: Uuid::new_v4().to_string(),
            source_id: a,
            target_id: b,
            suggested_type: "related_to".into(),
            confidence: 0.9,
            reason: "shared file".into(),
            detection_method: DetectionMethod::FileOverlap,
            status: RelationStatus::Pending,
            created_at: 1000,
            reviewed_at: None,
        };
        storage.insert_relation_suggestion(&suggestion).unwrap();
        let relation = storage.review_relation_suggestion(&suggestion.id, true, 2000).unwrap();
        assert!(relation.is_some());
        assert!(storage.list_pending_relation_suggestions().unwrap().is_empty());
    }

    #[test]
    fn rejecting_a_suggestion_materializes_nothing() {
        let storage = Storage::open_in_memory().unwrap();
        let (a, b) = seed_two_memories(&storage);
        let suggestion = RelationSuggestion {
            id: Uuid::new_v4().to_string(),
            source_id: a,
            target_id: b,
            suggested_type: "related_to".into(),
            confidence: 0.9,
            reason: "shared file".into(),
            detection_method: DetectionMethod::FileOverlap,
            status: RelationStatus::Pending,
            created_at: 1000,
            reviewed_at: None,
        };
        storage.insert_relation_suggestion(&suggestion).unwrap();
        let relation = storage.review_relation_suggestion(&suggestion.id, false, 2000).unwrap();
        assert!(relation.is_none());
    }
}
