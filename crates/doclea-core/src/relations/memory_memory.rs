//! Memory–memory relation detector (§4.H).

use std::collections::HashMap;

use uuid::Uuid;

use super::extract_keywords;
use crate::embeddings::EmbeddingProvider;
use crate::memory::{DetectionMethod, Memory, MemoryRelation, MemoryType, RelationStatus, RelationSuggestion};
use crate::scoring::jaccard;
use crate::storage::{Result as StorageResult, Storage};
use crate::vector::{PointKind, VectorFilter, VectorStore};

#[derive(Debug, Clone)]
pub struct RelationDetectorConfig {
    pub semantic_threshold: f32,
    pub suggestion_threshold: f32,
    pub auto_approve_threshold: f32,
    pub temporal_window_days: f32,
    pub semantic_candidate_limit: usize,
}

impl Default for RelationDetectorConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.75,
            suggestion_threshold: 0.5,
            auto_approve_threshold: 0.85,
            temporal_window_days: 3.0,
            semantic_candidate_limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    target_id: String,
    confidence: f32,
    reason: String,
    method: DetectionMethod,
}

/// Outcome of applying the §4.H pipeline to one source memory.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub materialized: Vec<MemoryRelation>,
    pub suggested: Vec<RelationSuggestion>,
}

async fn semantic_candidates(
    source: &Memory,
    embedder: &dyn EmbeddingProvider,
    vector_store: &dyn VectorStore,
    config: &RelationDetectorConfig,
) -> Vec<Candidate> {
    let embedding = match embedder.embed(&source.content).await {
        Ok(e) => e,
        Err(_) => return vec![],
    };
    let hits = match vector_store.search(&embedding.vector, config.semantic_candidate_limit, &VectorFilter::default()).await {
        Ok(h) => h,
        Err(_) => return vec![],
    };
    hits.into_iter()
        .filter(|hit| hit.payload.kind.unwrap_or(PointKind::Memory) == PointKind::Memory)
        .filter_map(|hit| {
            let target_id = hit.payload.memory_id?;
            if target_id == source.id || hit.score < config.semantic_threshold {
                return None;
            }
            Some(Candidate {
                target_id,
                confidence: hit.score,
                reason: format!("semantic similarity {:.2}", hit.score),
                method: DetectionMethod::Semantic,
            })
        })
        .collect()
}

fn keyword_candidates(source: &Memory, all: &[Memory], config: &RelationDetectorConfig) -> Vec<Candidate> {
    let mut source_keywords = extract_keywords(&source.content);
    source_keywords.extend(source.tags.iter().cloned());

    all.iter()
        .filter(|m| m.id != source.id)
        .filter_map(|target| {
            let mut target_keywords = extract_keywords(&target.content);
            target_keywords.extend(target.tags.iter().cloned());
            if !source.tags.iter().any(|t| target.tags.contains(t)) {
                return None;
            }
            let overlap = jaccard(&source_keywords, &target_keywords);
            if overlap < config.suggestion_threshold {
                return None;
            }
            let confidence = (overlap * 1.2).min(1.0);
            Some(Candidate {
                target_id: target.id.clone(),
                confidence,
                reason: format!("keyword/tag overlap {:.2}", overlap),
                method: DetectionMethod::Keyword,
            })
        })
        .collect()
}

fn file_overlap_candidates(source: &Memory, all: &[Memory], config: &RelationDetectorConfig) -> Vec<Candidate> {
    all.iter()
        .filter(|m| m.id != source.id)
        .filter_map(|target| {
            let overlap = jaccard(&source.related_files, &target.related_files);
            if overlap < config.suggestion_threshold {
                return None;
            }
            let confidence = (overlap * 1.1).min(1.0);
            Some(Candidate {
                target_id: target.id.clone(),
                confidence,
                reason: format!("related-file overlap {:.2}", overlap),
                method: DetectionMethod::FileOverlap,
            })
        })
        .collect()
}

fn temporal_candidates(source: &Memory, all: &[Memory], config: &RelationDetectorConfig) -> Vec<Candidate> {
    all.iter()
        .filter(|m| m.id != source.id)
        .filter_map(|target| {
            let diff_days = ((target.created_at - source.created_at).abs() as f32) / 86_400.0;
            if diff_days > config.temporal_window_days {
                return None;
            }
            let linear = (1.0 - diff_days / config.temporal_window_days.max(f32::EPSILON)).max(0.0);
            let confidence = linear * 0.8;
            if confidence <= config.suggestion_threshold + 0.1 {
                return None;
            }
            Some(Candidate {
                target_id: target.id.clone(),
                confidence,
                reason: format!("created within {diff_days:.1} days"),
                method: DetectionMethod::Temporal,
            })
        })
        .collect()
}

const SOLVES_MARKERS: [&str; 4] = ["fixes", "resolves", "solves", "addresses"];
const CAUSES_MARKERS: [&str; 4] = ["causes", "leads to", "results in", "triggers"];

/// Pair-of-types heuristic inference (§4.H), layered with lexical cues for
/// the extended `causes`/`solves` labels; falls back to `related_to`.
/// `causes`/`solves`/`exemplifies` all collapse to `references` when a
/// candidate is auto-approved and materialized — only the pending
/// suggestion keeps the richer label.
fn infer_relation_type(source: &Memory, target: &Memory) -> &'static str {
    use MemoryType::*;

    let mentions = |markers: &[&str]| {
        let source_lower = source.content.to_lowercase();
        let target_lower = target.content.to_lowercase();
        markers.iter().any(|m| source_lower.contains(m) || target_lower.contains(m))
    };

    let touches_solution = matches!((source.memory_type, target.memory_type), (Solution, _) | (_, Solution));
    if touches_solution && mentions(&SOLVES_MARKERS) {
        return "solves";
    }

    match (source.memory_type, target.memory_type) {
        (Decision, Solution) | (Solution, Decision) => "implements",
        (Pattern, Solution) | (Solution, Pattern) => "exemplifies",
        (Decision, Architecture) | (Architecture, Decision) => "requires",
        (Solution, Solution) => "related_to",
        (Decision, Decision) => "supersedes",
        _ if mentions(&CAUSES_MARKERS) => "causes",
        _ => "related_to",
    }
}

fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_target: HashMap<String, Candidate> = HashMap::new();
    for candidate in candidates {
        by_target
            .entry(candidate.target_id.clone())
            .and_modify(|existing| {
                if candidate.confidence > existing.confidence {
                    existing.confidence = candidate.confidence;
                }
                existing.reason = format!("{}; {}", existing.reason, candidate.reason);
            })
            .or_insert(candidate);
    }
    by_target.into_values().collect()
}

/// Runs the full §4.H pipeline for `source` and applies the outcome to
/// storage: materializes auto-approved relations, queues suggestions for
/// the rest, discards anything below `suggestion_threshold`.
pub async fn detect_memory_relations(
    storage: &Storage,
    embedder: &dyn EmbeddingProvider,
    vector_store: &dyn VectorStore,
    source: &Memory,
    config: &RelationDetectorConfig,
    now: i64,
) -> StorageResult<DetectionOutcome> {
    let all = storage.list_memories()?;
    let existing = storage.list_relations_for_memory(&source.id)?;
    let already_linked: std::collections::HashSet<String> = existing
        .iter()
        .flat_map(|r| [r.source_id.clone(), r.target_id.clone()])
        .filter(|id| id != &source.id)
        .collect();

    let (semantic, keyword, file_overlap, temporal) = tokio::join!(
        semantic_candidates(source, embedder, vector_store, config),
        async { keyword_candidates(source, &all, config) },
        async { file_overlap_candidates(source, &all, config) },
        async { temporal_candidates(source, &all, config) },
    );

    let all_by_id: HashMap<&str, &Memory> = all.iter().map(|m| (m.id.as_str(), m)).collect();

    let candidates: Vec<Candidate> = [semantic, keyword, file_overlap, temporal]
        .into_iter()
        .flatten()
        .filter(|c| c.target_id != source.id && !already_linked.contains(&c.target_id))
        .collect();

    let mut outcome = DetectionOutcome::default();
    for candidate in dedupe(candidates) {
        let Some(target) = all_by_id.get(candidate.target_id.as_str()) else { continue };
        let suggested_type = infer_relation_type(source, target);

        if candidate.confidence >= config.auto_approve_threshold {
            let relation_type = suggested_type.parse().unwrap_or(crate::memory::RelationType::References);
            let relation = MemoryRelation {
                id: Uuid::new_v4().to_string(),
                source_id: source.id.clone(),
                target_id: candidate.target_id.clone(),
                relation_type,
                weight: candidate.confidence,
                metadata: Some(candidate.reason.clone()),
                created_at: now,
            };
            storage.insert_memory_relation(&relation)?;
            outcome.materialized.push(relation);
        } else if candidate.confidence >= config.suggestion_threshold {
            let suggestion = RelationSuggestion {
                id: Uuid::new_v4().to_string(),
                source_id: source.id.clone(),
                target_id: candidate.target_id.clone(),
                suggested_type: suggested_type.to_string(),
                confidence: candidate.confidence,
                reason: candidate.reason.clone(),
                detection_method: candidate.method,
                status: RelationStatus::Pending,
                created_at: now,
                reviewed_at: None,
            };
            storage.insert_relation_suggestion(&suggestion)?;
            outcome.suggested.push(suggestion);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn memory(id: &str, memory_type: MemoryType, content: &str, created_at: i64) -> Memory {
        Memory {
            id: id.to_string(),
            memory_type,
            title: id.to_string(),
            content: content.to_string(),
            summary: None,
            importance: 0.5,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
            created_at,
            accessed_at: created_at,
            access_count: 0,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        }
    }

    #[test]
    fn infers_implements_between_decision_and_solution() {
        let a = memory("a", MemoryType::Decision, "", 0);
        let b = memory("b", MemoryType::Solution, "", 0);
        assert_eq!(infer_relation_type(&a, &b), "implements");
    }

    #[test]
    fn unknown_pair_defaults_to_related_to() {
        let a = memory("a", MemoryType::Note, "", 0);
        let b = memory("b", MemoryType::Note, "", 0);
        assert_eq!(infer_relation_type(&a, &b), "related_to");
    }

    #[test]
    fn infers_solves_when_solution_content_names_a_fix() {
        let a = memory("a", MemoryType::Decision, "switch to connection pooling", 0);
        let b = memory("b", MemoryType::Solution, "this fixes the exhaustion under load", 0);
        assert_eq!(infer_relation_type(&a, &b), "solves");
    }

    #[test]
    fn infers_causes_when_note_content_names_a_trigger() {
        let a = memory("a", MemoryType::Note, "unbounded retries causes the queue backlog", 0);
        let b = memory("b", MemoryType::Note, "queue backlog", 0);
        assert_eq!(infer_relation_type(&a, &b), "causes");
    }

    #[test]
    fn temporal_candidates_decay_linearly_with_day_diff() {
        let source = memory("a", MemoryType::Note, "", 0);
        let near = memory("b", MemoryType::Note, "", 86_400);
        let far = memory("c", MemoryType::Note, "", 86_400 * 10);
        let config = RelationDetectorConfig { temporal_window_days: 3.0, suggestion_threshold: 0.1, ..RelationDetectorConfig::default() };
        let candidates = temporal_candidates(&source, &[near, far], &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].target_id, "b");
    }

    #[test]
    fn dedupe_keeps_max_confidence_and_merges_reasons() {
        let candidates = vec![
            Candidate { target_id: "x".into(), confidence: 0.6, reason: "a".into(), method: DetectionMethod::Keyword },
            Candidate { target_id: "x".into(), confidence: 0.9, reason: "b".into(), method: DetectionMethod::FileOverlap },
        ];
        let deduped = dedupe(candidates);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
        assert!(deduped[0].reason.contains('a') && deduped[0].reason.contains('b'));
    }
}
