//! GraphRAG entity/relationship/community/report CRUD (§4.K).

use rusqlite::{params, OptionalExtension};

use super::{Storage, StorageError};
use crate::memory::{GraphCommunity, GraphEntity, GraphRelationship, GraphReport};

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<GraphEntity> {
    Ok(GraphEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: row.get("entity_type")?,
        description: row.get("description")?,
        vector_id: row.get("vector_id")?,
    })
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<GraphRelationship> {
    Ok(GraphRelationship {
        id: row.get("id")?,
        source_entity_id: row.get("source_entity_id")?,
        target_entity_id: row.get("target_entity_id")?,
        relationship_type: row.get("relationship_type")?,
        strength: row.get("strength")?,
    })
}

fn row_to_community(row: &rusqlite::Row) -> rusqlite::Result<GraphCommunity> {
    let entity_ids_json: String = row.get("entity_ids")?;
    Ok(GraphCommunity {
        id: row.get("id")?,
        level: row.get::<_, i64>("level")? as u32,
        entity_ids: serde_json::from_str(&entity_ids_json).unwrap_or_default(),
    })
}

fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<GraphReport> {
    Ok(GraphReport {
        id: row.get("id")?,
        community_id: row.get("community_id")?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        full_content: row.get("full_content")?,
        vector_id: row.get("vector_id")?,
    })
}

impl Storage {
    pub fn upsert_graph_entity(&self, entity: &GraphEntity) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_entities (id, name, entity_type, description, vector_id) VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, entity_type=excluded.entity_type,
                description=excluded.description, vector_id=excluded.vector_id",
            params![entity.id, entity.name, entity.entity_type, entity.description, entity.vector_id],
        )?;
        Ok(())
    }

    pub fn get_graph_entity(&self, id: &str) -> super::Result<GraphEntity> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, entity_type, description, vector_id FROM graph_entities WHERE id = ?1",
            params![id],
            row_to_entity,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn insert_graph_relationship(&self, relationship: &GraphRelationship) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_relationships (id, source_entity_id, target_entity_id, relationship_type, strength)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                relationship.id,
                relationship.source_entity_id,
                relationship.target_entity_id,
                relationship.relationship_type,
                relationship.strength,
            ],
        )?;
        Ok(())
    }

    pub fn list_relationships_for_entity(&self, entity_id: &str) -> super::Result<Vec<GraphRelationship>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_entity_id, target_entity_id, relationship_type, strength
             FROM graph_relationships WHERE source_entity_id = ?1 OR target_entity_id = ?1",
        )?;
        let rows = stmt.query_map(params![entity_id], row_to_relationship)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn upsert_graph_community(&self, community: &GraphCommunity) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_communities (id, level, entity_ids) VALUES (?1,?2,?3)
             ON CONFLICT(id) DO UPDATE SET level=excluded.level, entity_ids=excluded.entity_ids",
            params![community.id, community.level, serde_json::to_string(&community.entity_ids)?],
        )?;
        Ok(())
    }

    pub fn list_communities_at_level(&self, level: u32) -> super::Result<Vec<GraphCommunity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, level, entity_ids FROM graph_communities WHERE level = ?1")?;
        let rows = stmt.query_map(params![level], row_to_community)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn upsert_graph_report(&self, report: &GraphReport) -> super::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_reports (id, community_id, title, summary, full_content, vector_id)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(id) DO UPDATE SET title=excluded.title, summary=excluded.summary,
                full_content=excluded.full_content, vector_id=excluded.vector_id",
            params![report.id, report.community_id, report.title, report.summary, report.full_content, report.vector_id],
        )?;
        Ok(())
    }

    pub fn get_graph_report(&self, id: &str) -> super::Result<GraphReport> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, community_id, title, summary, full_content, vector_id FROM graph_reports WHERE id = ?1",
            params![id],
            row_to_report,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_graph_entity_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let mut entity = GraphEntity {
            id: "e1".into(),
            name: "PostgreSQL".into(),
            entity_type: "technology".into(),
            description: None,
            vector_id: None,
        };
        storage.upsert_graph_entity(&entity).unwrap();
        entity.description = Some("relational database".into());
        storage.upsert_graph_entity(&entity).unwrap();
        let fetched = storage.get_graph_entity("e1").unwrap();
        assert_eq!(fetched.description.as_deref(), Some("relational database"));
    }

    #[test]
    fn community_round_trips_entity_ids() {
        let storage = Storage::open_in_memory().unwrap();
        let community = GraphCommunity {
            id: "c1".into(),
            level: 0,
            entity_ids: vec!["e1".into(), "e2".into()],
        };
        storage.upsert_graph_community(&community).unwrap();
        let fetched = storage.list_communities_at_level(0).unwrap();
        assert_eq!(fetched[0].entity_ids.len(), 2);
    }
}
