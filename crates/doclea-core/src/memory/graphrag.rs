//! Entity/community/report entities GraphRAG builds on (§3, §4.K).

use serde::{Deserialize, Serialize};

/// An entity identified by canonical name + type (e.g. `("PostgreSQL",
/// "technology")`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
}

/// A typed, weighted edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: String,
    /// In `[1, 10]`.
    pub strength: f32,
}

/// A group of entities at a given hierarchy level (Leiden/Louvain-style
/// community detection is out of scope here — communities are assigned by
/// the ingestion pipeline and stored as-is).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphCommunity {
    pub id: String,
    pub level: u32,
    pub entity_ids: Vec<String>,
}

/// A natural-language summary of a [`GraphCommunity`], the unit the global
/// GraphRAG search leg (§4.K) ranks and returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphReport {
    pub id: String,
    pub community_id: String,
    pub title: String,
    pub summary: String,
    pub full_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
}
