//! Context builder + cache (§4.L)
//!
//! Assembles a token-budgeted context block from three legs — RAG
//! (semantic memory search, re-ranked via §4.F), KAG (code-graph
//! neighborhoods) and GraphRAG (§4.K) — behind a fingerprinted,
//! at-most-one-build-per-fingerprint cache (§5).

mod builder;
mod cache;

pub use builder::{build_context, get_or_build};
pub use cache::ContextCache;

use sha2::{Digest, Sha256};

use crate::graphrag::SearchMode;
use crate::memory::MemoryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTemplate {
    Default,
    Compact,
    Detailed,
}

impl ContextTemplate {
    fn as_str(&self) -> &'static str {
        match self {
            ContextTemplate::Default => "default",
            ContextTemplate::Compact => "compact",
            ContextTemplate::Detailed => "detailed",
        }
    }

    /// Character budget a single section's body is truncated to before
    /// packing, per template verbosity.
    fn body_chars(&self) -> usize {
        match self {
            ContextTemplate::Compact => 160,
            ContextTemplate::Default => 600,
            ContextTemplate::Detailed => 2000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextFilters {
    pub memory_types: Vec<MemoryType>,
    pub tags: Vec<String>,
    pub related_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContextQuery {
    pub query: String,
    pub token_budget: usize,
    pub include_code_graph: bool,
    pub include_graphrag: bool,
    pub include_evidence: bool,
    pub template: ContextTemplate,
    pub filters: ContextFilters,
    pub graphrag_mode: SearchMode,
    pub limit: usize,
}

impl Default for ContextQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            token_budget: 2000,
            include_code_graph: true,
            include_graphrag: false,
            include_evidence: false,
            template: ContextTemplate::Default,
            filters: ContextFilters::default(),
            graphrag_mode: SearchMode::Local,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub memory_id: String,
    pub title: String,
    pub relation_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContextResult {
    pub context: String,
    pub sections_included: usize,
    pub rag_sections: usize,
    pub kag_sections: usize,
    pub graphrag_sections: usize,
    pub tokens: usize,
    pub evidence: Option<Vec<EvidenceItem>>,
    pub cache_hit: bool,
}

pub(crate) type Fingerprint = String;

/// Stable hash of every input that affects the built context: query text
/// (trimmed, lowercased), token budget, boolean flags, template and
/// sorted filter values (§4.L step 1).
pub(crate) fn compute_fingerprint(query: &ContextQuery) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(query.query.trim().to_lowercase().as_bytes());
    hasher.update(query.token_budget.to_le_bytes());
    hasher.update(query.limit.to_le_bytes());
    hasher.update([
        query.include_code_graph as u8,
        query.include_graphrag as u8,
        query.include_evidence as u8,
        matches!(query.graphrag_mode, SearchMode::Global) as u8,
    ]);
    hasher.update(query.template.as_str().as_bytes());

    let mut types: Vec<&str> = query.filters.memory_types.iter().map(|t| t.as_str()).collect();
    types.sort_unstable();
    for t in &types {
        hasher.update(t.as_bytes());
    }

    let mut tags = query.filters.tags.clone();
    tags.sort();
    for t in &tags {
        hasher.update(t.as_bytes());
    }

    let mut files = query.filters.related_files.clone();
    files.sort();
    for f in &files {
        hasher.update(f.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_filter_reordering() {
        let mut a = ContextQuery { query: "connection pooling".into(), ..ContextQuery::default() };
        a.filters.tags = vec!["db".into(), "perf".into()];
        let mut b = a.clone();
        b.filters.tags = vec!["perf".into(), "db".into()];
        assert_eq!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_token_budget() {
        let a = ContextQuery { query: "x".into(), token_budget: 1000, ..ContextQuery::default() };
        let b = ContextQuery { token_budget: 2000, ..a.clone() };
        assert_ne!(compute_fingerprint(&a), compute_fingerprint(&b));
    }
}
