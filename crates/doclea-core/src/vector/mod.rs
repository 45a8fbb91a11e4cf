//! Vector store (§4.B)
//!
//! One [`VectorStore`] trait, two implementations: [`EmbeddedVectorStore`]
//! (a plain `rusqlite` table plus in-process linear-scan KNN — no real
//! SQLite vector extension or HNSW index is used, a deliberate
//! simplification recorded in `DESIGN.md`) and [`RemoteVectorStore`] (a
//! typed REST client for a Qdrant-like service).

mod embedded;
mod remote;

pub use embedded::EmbeddedVectorStore;
pub use remote::RemoteVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Narrow error type for the vector store component.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("vector id not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Discriminates which logical collection a point belongs to, so GraphRAG's
/// entity/community-report vectors can live in the same store as memory
/// vectors (§4.K).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Memory,
    Entity,
    CommunityReport,
}

/// Payload stored alongside a vector, used for post-KNN metadata filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorPayload {
    /// The id of the domain object this vector represents: a memory id
    /// when `kind == Memory`, an entity id when `kind == Entity`, a report
    /// id when `kind == CommunityReport` (§4.K resolves GraphRAG hits back
    /// through this field rather than a per-kind column).
    pub memory_id: Option<String>,
    pub kind: Option<PointKind>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub importance: f32,
}

/// A single filter clause, mirroring a Qdrant-style `{key, match|range}`.
#[derive(Debug, Clone)]
pub enum FilterClause {
    MatchType(String),
    MatchTag(String),
    MatchFile(String),
    MinImportance(f32),
}

/// `must` semantics: every clause has to hold (§4.B).
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FilterClause>,
}

impl VectorFilter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    fn matches(&self, payload: &VectorPayload) -> bool {
        self.must.iter().all(|clause| match clause {
            FilterClause::MatchType(t) => payload.r#type.as_deref() == Some(t.as_str()),
            FilterClause::MatchTag(tag) => payload.tags.iter().any(|t| t == tag),
            FilterClause::MatchFile(file) => payload.related_files.iter().any(|f| f == file),
            FilterClause::MinImportance(min) => payload.importance >= *min,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub vector_count: usize,
    pub dimensions: usize,
}

/// Converts an L2 distance into the `[0, 1]`-ish similarity the embedded
/// store reports, matching §4.B: `max(0, 1 - d/2)`.
pub fn l2_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).max(0.0)
}

/// Identical contract across both variants (§4.B).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Transactional delete-then-insert; `vector.len()` must equal the
    /// configured dimension.
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: VectorPayload) -> Result<()>;

    /// KNN first, then metadata filtering; overfetches `min(limit*5, 100)`
    /// when `filter` is non-empty and trims to `limit` after filtering.
    async fn search(&self, query: &[f32], limit: usize, filter: &VectorFilter) -> Result<Vec<ScoredPoint>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Removes every vector whose payload carries this `memoryId`.
    async fn delete_by_memory_id(&self, memory_id: &str) -> Result<usize>;

    async fn collection_info(&self) -> Result<CollectionInfo>;
}

/// Shared overfetch rule: `min(limit * 5, 100)` when a filter is present,
/// otherwise exactly `limit`.
pub(crate) fn overfetch_limit(limit: usize, filter: &VectorFilter) -> usize {
    if filter.is_empty() {
        limit
    } else {
        (limit.saturating_mul(5)).min(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_to_similarity_clamps_at_zero() {
        assert_eq!(l2_to_similarity(4.0), 0.0);
        assert!((l2_to_similarity(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overfetch_limit_is_bounded_at_100() {
        let filter = VectorFilter {
            must: vec![FilterClause::MinImportance(0.5)],
        };
        assert_eq!(overfetch_limit(30, &filter), 100);
        assert_eq!(overfetch_limit(5, &filter), 25);
    }

    #[test]
    fn overfetch_limit_without_filter_is_exact() {
        let filter = VectorFilter::default();
        assert_eq!(overfetch_limit(30, &filter), 30);
    }

    #[test]
    fn filter_matches_requires_every_clause() {
        let payload = VectorPayload {
            r#type: Some("decision".to_string()),
            importance: 0.8,
            ..Default::default()
        };
        let filter = VectorFilter {
            must: vec![
                FilterClause::MatchType("decision".to_string()),
                FilterClause::MinImportance(0.9),
            ],
        };
        assert!(!filter.matches(&payload));
    }
}
