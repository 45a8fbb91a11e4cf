//! Scoring engine (§4.F)
//!
//! Combines semantic similarity (from the vector store), recency,
//! confidence (via the decay engine, §4.G) and access frequency into one
//! score, then applies boost rules. Every function takes `now` explicitly
//! so ranking is reproducible.

use crate::decay::{effective_confidence, DecayConfig};
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencyDecay {
    Exponential,
    Linear,
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyNormalization {
    Log,
    Linear,
    Sigmoid,
}

#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub semantic: f32,
    pub recency: f32,
    pub confidence: f32,
    pub frequency: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self { semantic: 0.5, recency: 0.2, confidence: 0.2, frequency: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagMatch {
    Any,
    All,
}

/// A condition a memory must satisfy for its boost factor to apply
/// (§4.F's boost-condition list).
#[derive(Debug, Clone)]
pub enum BoostCondition {
    Recency { max_days: f32 },
    Importance { min_value: f32 },
    Frequency { min_access_count: i64 },
    Staleness { min_days: f32 },
    MemoryType { types: Vec<crate::memory::MemoryType> },
    Tags { tags: Vec<String>, match_mode: TagMatch },
}

#[derive(Debug, Clone)]
pub struct BoostRule {
    pub condition: BoostCondition,
    pub factor: f32,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub recency_decay: RecencyDecay,
    pub recency_half_life_days: f32,
    pub recency_full_decay_days: f32,
    pub recency_step_thresholds: Vec<(f32, f32)>,
    pub frequency_normalization: FrequencyNormalization,
    pub frequency_max_count: f32,
    pub frequency_sigmoid_k: f32,
    pub cold_start_score: f32,
    pub decay_enabled: bool,
    pub decay: DecayConfig,
    pub boosts: Vec<BoostRule>,
    pub search_overfetch: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            recency_decay: RecencyDecay::Exponential,
            recency_half_life_days: 14.0,
            recency_full_decay_days: 90.0,
            recency_step_thresholds: vec![(7.0, 1.0), (30.0, 0.6), (90.0, 0.3)],
            frequency_normalization: FrequencyNormalization::Log,
            frequency_max_count: 50.0,
            frequency_sigmoid_k: 0.2,
            cold_start_score: 0.2,
            decay_enabled: true,
            decay: DecayConfig::default(),
            boosts: vec![],
            search_overfetch: 4,
        }
    }
}

fn clip01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Recency score from `ageDays = max(0, (now - accessedAt)/86400)`.
pub fn recency_score(accessed_at: i64, now: i64, config: &ScoringConfig) -> f32 {
    let age_days = ((now - accessed_at) as f32 / 86_400.0).max(0.0);
    match config.recency_decay {
        RecencyDecay::Exponential => 0.5_f32.powf(age_days / config.recency_half_life_days.max(f32::EPSILON)),
        RecencyDecay::Linear => (1.0 - age_days / config.recency_full_decay_days.max(f32::EPSILON)).max(0.0),
        RecencyDecay::Step => {
            let mut score = 1.0;
            for (days, threshold_score) in &config.recency_step_thresholds {
                if age_days >= *days {
                    score = *threshold_score;
                }
            }
            score
        }
    }
}

/// Frequency score from access count, normalized against `frequencyMaxCount`.
pub fn frequency_score(access_count: i64, config: &ScoringConfig) -> f32 {
    if access_count == 0 {
        return config.cold_start_score;
    }
    let count = access_count as f32;
    let max_count = config.frequency_max_count.max(1.0);
    match config.frequency_normalization {
        FrequencyNormalization::Log => (count.ln_1p()) / (max_count.ln_1p()).max(f32::EPSILON),
        FrequencyNormalization::Linear => (count / max_count).min(1.0),
        FrequencyNormalization::Sigmoid => 1.0 / (1.0 + (-config.frequency_sigmoid_k * (count - max_count / 2.0)).exp()),
    }
}

/// Confidence score: raw importance when decay is disabled, else the
/// decay engine's effective confidence (§4.G).
pub fn confidence_score(memory: &Memory, config: &ScoringConfig, now: i64) -> f32 {
    if config.decay_enabled {
        effective_confidence(memory, &config.decay, now).effective_confidence
    } else {
        memory.importance
    }
}

pub(crate) fn jaccard(a: &[String], b: &[String]) -> f32 {
    use std::collections::HashSet;
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f32;
    let union = set_a.union(&set_b).count() as f32;
    if union == 0.0 { 0.0 } else { intersection / union }
}

fn condition_matches(condition: &BoostCondition, memory: &Memory, now: i64, staleness_score: Option<f32>) -> bool {
    match condition {
        BoostCondition::Recency { max_days } => {
            let age_days = (now - memory.accessed_at) as f32 / 86_400.0;
            age_days <= *max_days
        }
        BoostCondition::Importance { min_value } => memory.importance >= *min_value,
        BoostCondition::Frequency { min_access_count } => memory.access_count >= *min_access_count,
        BoostCondition::Staleness { min_days } => {
            let age_days = (now - memory.anchor_timestamp()) as f32 / 86_400.0;
            staleness_score.map(|s| s > 0.0).unwrap_or(age_days >= *min_days)
        }
        BoostCondition::MemoryType { types } => types.contains(&memory.memory_type),
        BoostCondition::Tags { tags, match_mode } => match match_mode {
            TagMatch::Any => tags.iter().any(|t| memory.tags.contains(t)),
            TagMatch::All => tags.iter().all(|t| memory.tags.contains(t)),
        },
    }
}

/// Product of every boost rule whose condition matches `memory`.
pub fn boost_factor(memory: &Memory, config: &ScoringConfig, now: i64, staleness_score: Option<f32>) -> f32 {
    config
        .boosts
        .iter()
        .filter(|rule| condition_matches(&rule.condition, memory, now, staleness_score))
        .map(|rule| rule.factor)
        .product()
}

/// A memory scored against a query, ready for re-ranking (§4.F, §4.L).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMemory {
    pub final_score: f32,
    pub semantic_score: f32,
    pub recency_score: f32,
    pub confidence_score: f32,
    pub frequency_score: f32,
    pub boost_factor: f32,
}

/// Scores one memory given its semantic similarity from a vector search.
pub fn score_memory(memory: &Memory, semantic_score: f32, config: &ScoringConfig, now: i64) -> ScoredMemory {
    let recency = recency_score(memory.accessed_at, now, config);
    let confidence = confidence_score(memory, config, now);
    let frequency = frequency_score(memory.access_count, config);

    let w = &config.weights;
    let base = clip01(
        semantic_score * w.semantic + recency * w.recency + confidence * w.confidence + frequency * w.frequency,
    );
    let boost = boost_factor(memory, config, now, None);
    let final_score = clip01(base * boost);

    ScoredMemory {
        final_score,
        semantic_score,
        recency_score: recency,
        confidence_score: confidence,
        frequency_score: frequency,
        boost_factor: boost,
    }
}

/// Re-ranks `candidates` (memory + its raw semantic score) and returns the
/// top `limit`, highest score first (§4.F, §4.L step 3).
pub fn rerank(candidates: Vec<(Memory, f32)>, config: &ScoringConfig, now: i64, limit: usize) -> Vec<(Memory, ScoredMemory)> {
    let mut scored: Vec<(Memory, ScoredMemory)> = candidates
        .into_iter()
        .map(|(memory, semantic)| {
            let score = score_memory(&memory, semantic, config, now);
            (memory, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.final_score.partial_cmp(&a.1.final_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn memory(importance: f32, accessed_at: i64, access_count: i64) -> Memory {
        Memory {
            id: "m1".into(),
            memory_type: crate::memory::MemoryType::Note,
            title: "t".into(),
            content: "c".into(),
            summary: None,
            importance,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
            created_at: 0,
            accessed_at,
            access_count,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        }
    }

    #[test]
    fn recency_score_decays_exponentially_by_half_life() {
        let config = ScoringConfig { recency_half_life_days: 10.0, ..ScoringConfig::default() };
        let score = recency_score(0, 10 * 86_400, &config);
        assert!((score - 0.5).abs() < 1e-4);
    }

    #[test]
    fn cold_start_uses_configured_score() {
        let config = ScoringConfig { cold_start_score: 0.33, ..ScoringConfig::default() };
        assert_eq!(frequency_score(0, &config), 0.33);
    }

    #[test]
    fn frequency_linear_caps_at_one() {
        let config = ScoringConfig { frequency_normalization: FrequencyNormalization::Linear, frequency_max_count: 10.0, ..ScoringConfig::default() };
        assert_eq!(frequency_score(100, &config), 1.0);
    }

    #[test]
    fn decay_disabled_uses_raw_importance() {
        let m = memory(0.6, 0, 0);
        let config = ScoringConfig { decay_enabled: false, ..ScoringConfig::default() };
        assert_eq!(confidence_score(&m, &config, 1_000_000), 0.6);
    }

    #[test]
    fn boost_rule_applies_when_condition_matches() {
        let m = memory(0.9, 0, 0);
        let config = ScoringConfig {
            boosts: vec![BoostRule { condition: BoostCondition::Importance { min_value: 0.5 }, factor: 1.5 }],
            ..ScoringConfig::default()
        };
        assert_eq!(boost_factor(&m, &config, 0, None), 1.5);
    }

    #[test]
    fn boost_rule_does_not_apply_when_condition_fails() {
        let m = memory(0.2, 0, 0);
        let config = ScoringConfig {
            boosts: vec![BoostRule { condition: BoostCondition::Importance { min_value: 0.5 }, factor: 1.5 }],
            ..ScoringConfig::default()
        };
        assert_eq!(boost_factor(&m, &config, 0, None), 1.0);
    }

    #[test]
    fn final_score_is_clipped_to_one_even_with_boost() {
        let m = memory(1.0, 0, 100);
        let config = ScoringConfig {
            weights: Weights { semantic: 1.0, recency: 1.0, confidence: 1.0, frequency: 1.0 },
            boosts: vec![BoostRule { condition: BoostCondition::Importance { min_value: 0.0 }, factor: 10.0 }],
            ..ScoringConfig::default()
        };
        let scored = score_memory(&m, 1.0, &config, 0);
        assert_eq!(scored.final_score, 1.0);
    }

    #[test]
    fn rerank_sorts_descending_and_truncates() {
        let config = ScoringConfig::default();
        let candidates = vec![(memory(0.1, 0, 0), 0.1), (memory(0.9, 0, 0), 0.9), (memory(0.5, 0, 0), 0.5)];
        let ranked = rerank(candidates, &config, 0, 2);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].1.final_score >= ranked[1].1.final_score);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        assert_eq!(jaccard(&["a".to_string()], &["b".to_string()]), 0.0);
    }
}
