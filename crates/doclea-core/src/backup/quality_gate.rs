//! Quality gate (§4.M)
//!
//! Runs a fixture of golden queries through the store's retrieval legs —
//! vector search for memories, GraphRAG local search for entities — and
//! reports recall/precision per query against configured thresholds,
//! with per-query diffs naming exactly what was missed.

use std::collections::HashSet;

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::graphrag::{self, GraphRagQuery, GraphRagResult, SearchMode};
use crate::storage::Storage;
use crate::vector::{PointKind, VectorFilter, VectorStore};

#[derive(Debug, Clone)]
pub struct GoldenQuery {
    pub id: String,
    pub query: String,
    pub expected_memory_ids: Vec<String>,
    pub expected_entity_names: Vec<String>,
    pub recall_k: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QualityGateConfig {
    pub min_memory_recall: f32,
    pub min_entity_recall: f32,
    pub min_precision_at_k: f32,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self { min_memory_recall: 0.8, min_entity_recall: 0.7, min_precision_at_k: 0.5 }
    }
}

#[derive(Debug, Clone)]
pub struct QueryDiff {
    pub query_id: String,
    pub memory_recall: f32,
    pub entity_recall: f32,
    pub precision_at_k: f32,
    pub missing_memory_ids: Vec<String>,
    pub missing_entity_names: Vec<String>,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct QualityGateReport {
    pub passed: bool,
    pub queries: Vec<QueryDiff>,
}

fn recall(expected: &[String], retrieved: &[String]) -> (f32, Vec<String>) {
    if expected.is_empty() {
        return (1.0, vec![]);
    }
    let retrieved: HashSet<&str> = retrieved.iter().map(String::as_str).collect();
    let missing: Vec<String> = expected.iter().filter(|id| !retrieved.contains(id.as_str())).cloned().collect();
    let hits = expected.len() - missing.len();
    (hits as f32 / expected.len() as f32, missing)
}

/// Evaluates every query in `queries` against the current store and
/// returns a report that fails (`passed = false`) as soon as any query
/// drops below `config`'s thresholds.
pub async fn run_quality_gate(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    queries: &[GoldenQuery],
    config: &QualityGateConfig,
) -> Result<QualityGateReport> {
    let mut diffs = Vec::with_capacity(queries.len());

    for golden in queries {
        let Ok(embedding) = embedder.embed(&golden.query).await else {
            diffs.push(QueryDiff {
                query_id: golden.id.clone(),
                memory_recall: 0.0,
                entity_recall: 0.0,
                precision_at_k: 0.0,
                missing_memory_ids: golden.expected_memory_ids.clone(),
                missing_entity_names: golden.expected_entity_names.clone(),
                passed: false,
            });
            continue;
        };

        let hits = vector_store.search(&embedding.vector, golden.recall_k, &VectorFilter::default()).await?;
        let memory_ids: Vec<String> = hits
            .iter()
            .filter(|p| p.payload.kind == Some(PointKind::Memory))
            .filter_map(|p| p.payload.memory_id.clone())
            .collect();
        let (memory_recall, missing_memory_ids) = recall(&golden.expected_memory_ids, &memory_ids);

        let precision_at_k = if golden.expected_memory_ids.is_empty() {
            1.0
        } else if memory_ids.is_empty() {
            0.0
        } else {
            let relevant = memory_ids.iter().filter(|id| golden.expected_memory_ids.contains(id)).count();
            relevant as f32 / memory_ids.len() as f32
        };

        let entity_names: Vec<String> = if golden.expected_entity_names.is_empty() {
            vec![]
        } else {
            let query = GraphRagQuery {
                query: golden.query.clone(),
                mode: SearchMode::Local,
                limit: golden.recall_k,
                community_level: 0,
                max_iterations: 2,
                max_depth: 2,
            };
            match graphrag::search(storage, vector_store, embedder, &query).await? {
                GraphRagResult::Local(result) => result.entities.into_iter().map(|e| e.name).collect(),
                GraphRagResult::Global(_) => vec![],
            }
        };
        let (entity_recall, missing_entity_names) = recall(&golden.expected_entity_names, &entity_names);

        let passed = memory_recall >= config.min_memory_recall
            && entity_recall >= config.min_entity_recall
            && precision_at_k >= config.min_precision_at_k;

        diffs.push(QueryDiff {
            query_id: golden.id.clone(),
            memory_recall,
            entity_recall,
            precision_at_k,
            missing_memory_ids,
            missing_entity_names,
            passed,
        });
    }

    let passed = diffs.iter().all(|d| d.passed);
    Ok(QualityGateReport { passed, queries: diffs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TransformersProvider;
    use crate::memory::{IngestInput, MemoryType};
    use crate::vector::{EmbeddedVectorStore, VectorPayload};
    use rusqlite::Connection;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn golden_query_with_no_expectations_always_passes() {
        let storage = Storage::open_in_memory().unwrap();
        let vector_store = EmbeddedVectorStore::new(Connection::open_in_memory().unwrap(), 8).unwrap();
        let embedder = TransformersProvider::new(8);
        let queries = vec![GoldenQuery {
            id: "q1".into(),
            query: "anything".into(),
            expected_memory_ids: vec![],
            expected_entity_names: vec![],
            recall_k: 5,
        }];
        let report = run_quality_gate(&storage, &vector_store, &embedder, &queries, &QualityGateConfig::default()).await.unwrap();
        assert!(report.passed);
    }

    #[tokio::test]
    async fn missing_expected_memory_fails_the_gate() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage
            .store_memory(
                IngestInput {
                    memory_type: MemoryType::Note,
                    title: "A".into(),
                    content: "connection pooling design".into(),
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
        let vector_store = EmbeddedVectorStore::new(Connection::open_in_memory().unwrap(), 8).unwrap();
        let embedder = TransformersProvider::new(8);
        let unrelated = embedder.embed("unrelated content about cats").await.unwrap();
        vector_store
            .upsert("v1", unrelated.vector, VectorPayload { memory_id: Some("other-memory".into()), kind: Some(PointKind::Memory), ..Default::default() })
            .await
            .unwrap();

        let queries = vec![GoldenQuery {
            id: "q1".into(),
            query: "connection pooling".into(),
            expected_memory_ids: vec![memory.id],
            expected_entity_names: vec![],
            recall_k: 5,
        }];
        let report = run_quality_gate(&storage, &vector_store, &embedder, &queries, &QualityGateConfig::default()).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.queries[0].memory_recall, 0.0);
        assert_eq!(report.queries[0].missing_memory_ids.len(), 1);
    }
}
