use crate::chunking::estimate_tokens;
use crate::embeddings::EmbeddingProvider;
use crate::graphrag::{self, GraphRagQuery, GraphRagResult};
use crate::memory::Memory;
use crate::relations::extract_keywords;
use crate::scoring::{self, ScoringConfig};
use crate::storage::{Result as StorageResult, Storage};
use crate::vector::{PointKind, VectorFilter, VectorStore};

use super::cache::BuildSlot;
use super::{compute_fingerprint, ContextCache, ContextFilters, ContextQuery, ContextResult, ContextTemplate, EvidenceItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Rag,
    Kag,
    GraphRag,
}

struct Section {
    text: String,
    tokens: usize,
    score: f32,
    leg: Leg,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn passes_filters(memory: &Memory, filters: &ContextFilters) -> bool {
    if !filters.memory_types.is_empty() && !filters.memory_types.contains(&memory.memory_type) {
        return false;
    }
    if !filters.tags.is_empty() && !filters.tags.iter().any(|t| memory.tags.contains(t)) {
        return false;
    }
    if !filters.related_files.is_empty() && !filters.related_files.iter().any(|f| memory.related_files.contains(f)) {
        return false;
    }
    true
}

/// RAG leg: embed the query, overfetch from the vector store, re-rank via
/// §4.F and format the top `query.limit` memories.
async fn rag_leg(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &ContextQuery,
    scoring_config: &ScoringConfig,
    now: i64,
) -> StorageResult<Vec<Section>> {
    let Ok(embedding) = embedder.embed(&query.query).await else {
        return Ok(vec![]);
    };
    let overfetch = (query.limit.max(1) * scoring_config.search_overfetch.max(1)).max(query.limit);
    let hits = vector_store.search(&embedding.vector, overfetch, &VectorFilter::default()).await.unwrap_or_default();

    let mut candidates = Vec::new();
    for hit in hits {
        if matches!(hit.payload.kind, Some(kind) if kind != PointKind::Memory) {
            continue;
        }
        let Some(memory_id) = hit.payload.memory_id else { continue };
        let Ok(memory) = storage.get_memory(&memory_id) else { continue };
        if !passes_filters(&memory, &query.filters) {
            continue;
        }
        candidates.push((memory, hit.score));
    }

    let ranked = scoring::rerank(candidates, scoring_config, now, query.limit);
    Ok(ranked
        .into_iter()
        .map(|(memory, scored)| {
            let body = truncate(&memory.content, query.template.body_chars());
            let text = format!("### {} [{}]\n{body}", memory.title, memory.memory_type.as_str());
            Section { tokens: estimate_tokens(&text), text, score: scored.final_score, leg: Leg::Rag }
        })
        .collect())
}

/// KAG leg: match query keywords against code node name/signature/summary
/// and pack each node's immediate outgoing neighborhood.
fn kag_leg(storage: &Storage, query: &ContextQuery) -> StorageResult<Vec<Section>> {
    let keywords = extract_keywords(&query.query);
    let nodes = storage.list_code_nodes_matching_keywords(&keywords, query.limit)?;

    let mut sections = Vec::new();
    for node in nodes {
        let mut node_text = node.name.clone();
        if let Some(sig) = &node.signature {
            node_text.push(' ');
            node_text.push_str(sig);
        }
        if let Some(summary) = &node.summary {
            node_text.push(' ');
            node_text.push_str(summary);
        }
        let node_keywords = extract_keywords(&node_text);
        let score = scoring::jaccard(&keywords, &node_keywords).max(0.1);

        let neighbors: Vec<String> = storage
            .list_edges_from(&node.id)?
            .into_iter()
            .take(5)
            .map(|e| format!("{} {}", e.edge_type.as_str(), e.to_node))
            .collect();

        let mut text = format!("### {} `{}` ({})\n", node.node_type.as_str(), node.name, node.file_path);
        if let Some(sig) = &node.signature {
            text.push_str(sig);
            text.push('\n');
        }
        if let Some(summary) = &node.summary {
            text.push_str(&truncate(summary, query.template.body_chars()));
        }
        if !neighbors.is_empty() {
            text.push_str(&format!("\nrelated: {}", neighbors.join(", ")));
        }

        sections.push(Section { tokens: estimate_tokens(&text), text, score, leg: Leg::Kag });
    }
    Ok(sections)
}

/// GraphRAG leg (§4.K): runs local or global search per
/// `query.graphrag_mode` and packs communities/entities as sections plus
/// their supporting memories as evidence.
async fn graphrag_leg(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &ContextQuery,
) -> StorageResult<(Vec<Section>, Vec<EvidenceItem>)> {
    let graph_query = GraphRagQuery {
        query: query.query.clone(),
        mode: query.graphrag_mode,
        limit: query.limit,
        community_level: 0,
        max_iterations: 2,
        max_depth: 2,
    };
    let result = graphrag::search(storage, vector_store, embedder, &graph_query).await?;

    let mut sections = Vec::new();
    let mut evidence = Vec::new();

    match result {
        GraphRagResult::Global(global) => {
            for hit in global.source_communities {
                let body = if query.template == ContextTemplate::Detailed { &hit.report.full_content } else { &hit.report.summary };
                let text = format!("### Community report: {}\n{}", hit.report.title, truncate(body, query.template.body_chars()));
                sections.push(Section { tokens: estimate_tokens(&text), text, score: hit.score, leg: Leg::GraphRag });
            }
        }
        GraphRagResult::Local(local) => {
            for entity in &local.entities {
                let text = format!(
                    "### Entity: {} ({})\n{}",
                    entity.name,
                    entity.entity_type,
                    truncate(entity.description.as_deref().unwrap_or(""), query.template.body_chars())
                );
                sections.push(Section { tokens: estimate_tokens(&text), text, score: 0.5, leg: Leg::GraphRag });
            }
            for item in local.evidence {
                evidence.push(EvidenceItem {
                    memory_id: item.memory.id.clone(),
                    title: item.memory.title.clone(),
                    relation_type: item.relation_type.clone(),
                });
            }
        }
    }

    Ok((sections, evidence))
}

/// Greedily packs the highest-scoring sections first, skipping
/// over-budget candidates and continuing with smaller ones rather than
/// stopping at the first oversized section (§4.L step 4).
fn pack(mut sections: Vec<Section>, token_budget: usize) -> ContextResult {
    sections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut blocks = Vec::new();
    let mut remaining = token_budget;
    let mut tokens_used = 0;
    let (mut rag, mut kag, mut graphrag) = (0, 0, 0);

    for section in sections {
        if section.tokens > remaining {
            continue;
        }
        remaining -= section.tokens;
        tokens_used += section.tokens;
        match section.leg {
            Leg::Rag => rag += 1,
            Leg::Kag => kag += 1,
            Leg::GraphRag => graphrag += 1,
        }
        blocks.push(section.text);
    }

    ContextResult {
        context: blocks.join("\n\n"),
        sections_included: rag + kag + graphrag,
        rag_sections: rag,
        kag_sections: kag,
        graphrag_sections: graphrag,
        tokens: tokens_used,
        evidence: None,
        cache_hit: false,
    }
}

/// Builds a context from scratch: runs every enabled leg, then packs the
/// combined candidate sections into `query.token_budget` (§4.L steps 3-5).
pub async fn build_context(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &ContextQuery,
    scoring_config: &ScoringConfig,
    now: i64,
) -> StorageResult<ContextResult> {
    let mut sections = rag_leg(storage, vector_store, embedder, query, scoring_config, now).await?;

    if query.include_code_graph {
        sections.extend(kag_leg(storage, query)?);
    }

    let mut evidence = Vec::new();
    if query.include_graphrag {
        let (graphrag_sections, graphrag_evidence) = graphrag_leg(storage, vector_store, embedder, query).await?;
        sections.extend(graphrag_sections);
        evidence = graphrag_evidence;
    }

    let mut result = pack(sections, query.token_budget);
    if query.include_evidence && !evidence.is_empty() {
        result.evidence = Some(evidence);
    }
    Ok(result)
}

/// Fingerprinted cache wrapper around [`build_context`] (§4.L steps 1-2,
/// §5's at-most-one-build-per-fingerprint guarantee).
pub async fn get_or_build(
    cache: &ContextCache,
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    query: &ContextQuery,
    scoring_config: &ScoringConfig,
    now: i64,
) -> StorageResult<ContextResult> {
    let fingerprint = compute_fingerprint(query);

    if let Some(cached) = cache.get(&fingerprint, now) {
        return Ok(ContextResult { cache_hit: true, ..cached });
    }

    match cache.claim_build(&fingerprint) {
        BuildSlot::Leader(tx) => {
            let result = build_context(storage, vector_store, embedder, query, scoring_config, now).await;
            match &result {
                Ok(built) => cache.insert(fingerprint.clone(), built.clone(), now),
                Err(_) => {}
            }
            cache.finish_build(&fingerprint, tx);
            result
        }
        BuildSlot::Follower(mut rx) => {
            // `rx` was cloned from the in-flight entry before this point, so
            // it observes the leader's completion on `changed()` even if the
            // leader already finished — unlike `Notify::notify_waiters`,
            // `watch` doesn't drop the signal for late subscribers.
            let _ = rx.changed().await;
            Ok(cache.get(&fingerprint, now).unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_skips_oversized_and_keeps_smaller_lower_scored() {
        let sections = vec![
            Section { text: "big".into(), tokens: 100, score: 0.9, leg: Leg::Rag },
            Section { text: "small".into(), tokens: 10, score: 0.5, leg: Leg::Kag },
        ];
        let result = pack(sections, 20);
        assert_eq!(result.sections_included, 1);
        assert_eq!(result.context, "small");
        assert_eq!(result.kag_sections, 1);
    }

    #[test]
    fn pack_respects_budget_and_orders_by_score() {
        let sections = vec![
            Section { text: "low".into(), tokens: 5, score: 0.1, leg: Leg::Rag },
            Section { text: "high".into(), tokens: 5, score: 0.9, leg: Leg::Rag },
        ];
        let result = pack(sections, 100);
        assert_eq!(result.context, "high\n\nlow");
        assert_eq!(result.rag_sections, 2);
    }
}
