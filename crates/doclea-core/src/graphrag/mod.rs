//! GraphRAG search (§4.K)
//!
//! Entity and community-report vectors share the embedded/remote vector
//! store with memory vectors, discriminated by [`crate::vector::PointKind`].
//! Resolving an entity back to the memories that support it is done by
//! name match against memory content — the data model has no direct
//! entity→memory edge table, so this mirrors the cross-layer detector's
//! keyword-matching approach (documented in `DESIGN.md`).

use std::collections::HashSet;

use serde::Serialize;

use crate::embeddings::EmbeddingProvider;
use crate::memory::{GraphCommunity, GraphEntity, GraphReport, Memory};
use crate::storage::{Result as StorageResult, Storage};
use crate::vector::{FilterClause, PointKind, VectorFilter, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Local,
    Global,
}

#[derive(Debug, Clone)]
pub struct GraphRagQuery {
    pub query: String,
    pub mode: SearchMode,
    pub limit: usize,
    pub community_level: u32,
    pub max_iterations: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityHit {
    pub community: GraphCommunity,
    pub report: GraphReport,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSearchResult {
    pub source_communities: Vec<CommunityHit>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMemory {
    pub memory: Memory,
    pub entity_id: String,
    pub relation_type: Option<String>,
    pub strength: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSearchResult {
    pub entities: Vec<GraphEntity>,
    pub evidence: Vec<EvidenceMemory>,
}

#[derive(Debug, Clone)]
pub enum GraphRagResult {
    Global(GlobalSearchResult),
    Local(LocalSearchResult),
}

/// Embeds `canonicalName + type + description`, the text a background
/// indexing job should feed an entity's vector with (§4.K).
pub fn entity_index_text(entity: &GraphEntity) -> String {
    format!("{} {} {}", entity.name, entity.entity_type, entity.description.as_deref().unwrap_or(""))
}

async fn global_search(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &GraphRagQuery,
) -> StorageResult<GlobalSearchResult> {
    let Ok(embedding) = embedder.embed(&query.query).await else {
        return Ok(GlobalSearchResult::default());
    };
    let filter = VectorFilter { must: vec![FilterClause::MatchType(format!("level:{}", query.community_level))] };
    let hits = vector_store.search(&embedding.vector, query.limit, &filter).await.unwrap_or_default();

    let communities = storage.list_communities_at_level(query.community_level)?;
    let mut source_communities = Vec::new();

    for hit in hits {
        if hit.payload.kind != Some(PointKind::CommunityReport) {
            continue;
        }
        let Some(report_id) = hit.payload.memory_id else { continue };
        let Ok(report) = storage.get_graph_report(&report_id) else { continue };
        let Some(community) = communities.iter().find(|c| c.id == report.community_id).cloned() else { continue };
        source_communities.push(CommunityHit { community, report, score: hit.score });
    }

    Ok(GlobalSearchResult { source_communities })
}

fn memories_matching_entity<'a>(entity: &GraphEntity, all: &'a [Memory]) -> Vec<&'a Memory> {
    let needle = entity.name.to_lowercase();
    all.iter().filter(|m| m.content.to_lowercase().contains(&needle) || m.title.to_lowercase().contains(&needle)).collect()
}

async fn local_search(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &GraphRagQuery,
) -> StorageResult<LocalSearchResult> {
    let Ok(embedding) = embedder.embed(&query.query).await else {
        return Ok(LocalSearchResult::default());
    };
    let hits = vector_store.search(&embedding.vector, query.limit, &VectorFilter::default()).await.unwrap_or_default();

    let mut entities: Vec<GraphEntity> = Vec::new();
    let mut seen_entity_ids: HashSet<String> = HashSet::new();
    let mut frontier: Vec<(String, f32)> = Vec::new();

    for hit in hits {
        if hit.payload.kind != Some(PointKind::Entity) {
            continue;
        }
        let Some(entity_id) = hit.payload.memory_id else { continue };
        if let Ok(entity) = storage.get_graph_entity(&entity_id) {
            if seen_entity_ids.insert(entity.id.clone()) {
                frontier.push((entity.id.clone(), hit.score));
                entities.push(entity);
            }
        }
    }

    let mut edge_strength: std::collections::HashMap<String, (f32, String)> = std::collections::HashMap::new();
    let depth = query.max_iterations.min(query.max_depth).max(1);

    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for (entity_id, base_score) in &frontier {
            for relationship in storage.list_relationships_for_entity(entity_id)? {
                let neighbor_id = if relationship.source_entity_id == *entity_id {
                    relationship.target_entity_id.clone()
                } else {
                    relationship.source_entity_id.clone()
                };
                if !seen_entity_ids.insert(neighbor_id.clone()) {
                    continue;
                }
                if let Ok(neighbor) = storage.get_graph_entity(&neighbor_id) {
                    let strength = base_score * (relationship.strength / 10.0);
                    edge_strength.insert(neighbor.id.clone(), (strength, relationship.relationship_type.clone()));
                    next_frontier.push((neighbor.id.clone(), strength));
                    entities.push(neighbor);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    let all_memories = storage.list_memories()?;
    let mut evidence = Vec::new();
    let mut seen_memory_ids: HashSet<String> = HashSet::new();

    for entity in &entities {
        let (strength, relation_type) = edge_strength.get(&entity.id).cloned().map(|(s, t)| (s, Some(t))).unwrap_or((1.0, None));
        for memory in memories_matching_entity(entity, &all_memories) {
            if !seen_memory_ids.insert(memory.id.clone()) {
                continue;
            }
            evidence.push(EvidenceMemory {
                memory: memory.clone(),
                entity_id: entity.id.clone(),
                relation_type: relation_type.clone(),
                strength,
            });
        }
    }

    Ok(LocalSearchResult { entities, evidence })
}

/// Dispatches to the local or global leg per `query.mode` (§4.K).
pub async fn search(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &GraphRagQuery,
) -> StorageResult<GraphRagResult> {
    match query.mode {
        SearchMode::Global => global_search(storage, vector_store, embedder, query).await.map(GraphRagResult::Global),
        SearchMode::Local => local_search(storage, vector_store, embedder, query).await.map(GraphRagResult::Local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_index_text_combines_name_type_and_description() {
        let entity = GraphEntity {
            id: "e1".into(),
            name: "PostgreSQL".into(),
            entity_type: "technology".into(),
            description: Some("relational database".into()),
            vector_id: None,
        };
        let text = entity_index_text(&entity);
        assert!(text.contains("PostgreSQL"));
        assert!(text.contains("technology"));
        assert!(text.contains("relational database"));
    }

    #[test]
    fn memories_matching_entity_is_case_insensitive() {
        let entity = GraphEntity { id: "e1".into(), name: "PostgreSQL".into(), entity_type: "technology".into(), description: None, vector_id: None };
        let memory = crate::memory::Memory {
            id: "m1".into(),
            memory_type: crate::memory::MemoryType::Note,
            title: "t".into(),
            content: "we switched to postgresql last quarter".into(),
            summary: None,
            importance: 0.5,
            tags: Default::default(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: Default::default(),
            created_at: 0,
            accessed_at: 0,
            access_count: 0,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        };
        let matches = memories_matching_entity(&entity, std::slice::from_ref(&memory));
        assert_eq!(matches.len(), 1);
    }
}
