//! Staleness engine (§4.J)
//!
//! Three signals — time decay, contradictions, related-memory freshness —
//! each producing an optional `{score, weight, reason}`; the aggregate is
//! the weighted mean of whichever signals actually fired.

use std::collections::{HashSet, VecDeque};

use crate::memory::Memory;
use crate::storage::{Result as StorageResult, Storage};

#[derive(Debug, Clone)]
pub struct StalenessConfig {
    pub time_decay_weight: f32,
    pub time_decay_threshold_days: f32,
    pub contradiction_weight: f32,
    pub negation_markers: Vec<String>,
    pub related_updates_weight: f32,
    pub max_bfs_depth: usize,
    pub fresh_threshold: f32,
    pub stale_threshold: f32,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            time_decay_weight: 0.5,
            time_decay_threshold_days: 90.0,
            contradiction_weight: 0.6,
            negation_markers: vec![
                "no longer".to_string(),
                "deprecated".to_string(),
                "replaced by".to_string(),
                "instead of".to_string(),
                "not recommended".to_string(),
            ],
            related_updates_weight: 0.4,
            max_bfs_depth: 2,
            fresh_threshold: 0.3,
            stale_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessStatus {
    Fresh,
    Stale,
    Obsolete,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub name: &'static str,
    pub score: f32,
    pub weight: f32,
    pub reason: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StalenessReport {
    pub aggregated_score: f32,
    pub signals: Vec<Signal>,
    pub status: StalenessStatus,
    pub suggested_action: String,
}

fn time_decay_signal(memory: &Memory, now: i64, config: &StalenessConfig) -> Option<Signal> {
    let age_days = ((now - memory.anchor_timestamp()) as f32 / 86_400.0).max(0.0);
    if age_days < 7.0 {
        return None;
    }
    let score = (age_days / config.time_decay_threshold_days).min(1.0);
    if score < 0.1 {
        return None;
    }
    Some(Signal {
        name: "time_decay",
        score,
        weight: config.time_decay_weight,
        reason: format!("{age_days:.0} days since last refresh"),
        metadata: None,
    })
}

fn contradiction_signal(memory: &Memory, all: &[Memory], config: &StalenessConfig) -> Option<Signal> {
    let keywords = super::relations::extract_keywords(&memory.content);
    let mut contradicting = Vec::new();

    for other in all {
        if other.id == memory.id || other.created_at <= memory.created_at {
            continue;
        }
        let other_lower = other.content.to_lowercase();
        let has_marker = config.negation_markers.iter().any(|marker| other_lower.contains(marker.as_str()));
        if !has_marker {
            continue;
        }
        let other_keywords = super::relations::extract_keywords(&other.content);
        if keywords.iter().any(|k| other_keywords.contains(k)) {
            contradicting.push(other.title.clone());
        }
    }

    if contradicting.is_empty() {
        return None;
    }
    let score = (contradicting.len() as f32 / 3.0).min(1.0);
    Some(Signal {
        name: "contradictions",
        score,
        weight: config.contradiction_weight,
        reason: format!("{} newer memories appear to contradict this one", contradicting.len()),
        metadata: serde_json::to_string(&contradicting).ok(),
    })
}

fn related_updates_signal(storage: &Storage, memory: &Memory, config: &StalenessConfig) -> StorageResult<Option<Signal>> {
    let mut visited: HashSet<String> = HashSet::from([memory.id.clone()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(memory.id.clone(), 0)]);
    let mut fresher: Vec<(String, String)> = Vec::new();
    let mut score_accum = 0.0f32;

    while let Some((current_id, depth)) = queue.pop_front() {
        if depth >= config.max_bfs_depth {
            continue;
        }
        for relation in storage.list_relations_for_memory(&current_id)? {
            let neighbor_id = if relation.source_id == current_id { relation.target_id.clone() } else { relation.source_id.clone() };
            if !visited.insert(neighbor_id.clone()) {
                continue;
            }
            if let Ok(neighbor) = storage.get_memory(&neighbor_id) {
                if neighbor.anchor_timestamp() > memory.anchor_timestamp() {
                    score_accum += 0.25;
                    fresher.push((neighbor.title.clone(), relation.relation_type.as_str().to_string()));
                }
                queue.push_back((neighbor_id, depth + 1));
            }
        }
    }

    if fresher.is_empty() {
        return Ok(None);
    }
    Ok(Some(Signal {
        name: "related_updates",
        score: score_accum.min(1.0),
        weight: config.related_updates_weight,
        reason: format!("{} related memories are fresher", fresher.len()),
        metadata: serde_json::to_string(&fresher).ok(),
    }))
}

fn suggested_action(status: StalenessStatus) -> &'static str {
    match status {
        StalenessStatus::Fresh => "none",
        StalenessStatus::Stale => "review",
        StalenessStatus::Obsolete => "archive_or_update",
    }
}

/// Aggregates the three signals into one staleness report (§4.J).
pub fn evaluate_staleness(storage: &Storage, memory: &Memory, config: &StalenessConfig, now: i64) -> StorageResult<StalenessReport> {
    let all = storage.list_memories()?;

    let mut signals = Vec::new();
    if let Some(s) = time_decay_signal(memory, now, config) {
        signals.push(s);
    }
    if let Some(s) = contradiction_signal(memory, &all, config) {
        signals.push(s);
    }
    if let Some(s) = related_updates_signal(storage, memory, config)? {
        signals.push(s);
    }

    let aggregated_score = if signals.is_empty() {
        0.0
    } else {
        let total_weight: f32 = signals.iter().map(|s| s.weight).sum();
        if total_weight <= 0.0 {
            0.0
        } else {
            signals.iter().map(|s| s.score * s.weight).sum::<f32>() / total_weight
        }
    };

    let status = if aggregated_score >= config.stale_threshold {
        StalenessStatus::Obsolete
    } else if aggregated_score >= config.fresh_threshold {
        StalenessStatus::Stale
    } else {
        StalenessStatus::Fresh
    };

    Ok(StalenessReport {
        aggregated_score,
        signals,
        status,
        suggested_action: suggested_action(status).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{IngestInput, MemoryType};
    use std::collections::BTreeSet;

    fn input(title: &str, content: &str) -> IngestInput {
        IngestInput {
            memory_type: MemoryType::Note,
            title: title.to_string(),
            content: content.to_string(),
            summary: None,
            importance: 0.5,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
        }
    }

    #[test]
    fn fresh_memory_under_seven_days_has_no_time_decay_signal() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(input("a", "use connection pooling"), 1000).unwrap();
        let report = evaluate_staleness(&storage, &memory, &StalenessConfig::default(), 1000 + 86_400 * 3).unwrap();
        assert!(report.signals.iter().all(|s| s.name != "time_decay"));
        assert_eq!(report.status, StalenessStatus::Fresh);
    }

    #[test]
    fn old_memory_without_contradictions_is_time_decay_only() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(input("a", "use connection pooling"), 0).unwrap();
        let config = StalenessConfig { time_decay_threshold_days: 30.0, ..StalenessConfig::default() };
        let report = evaluate_staleness(&storage, &memory, &config, 86_400 * 60).unwrap();
        assert!(report.signals.iter().any(|s| s.name == "time_decay"));
        assert!(report.aggregated_score > 0.0);
    }

    #[test]
    fn contradiction_signal_fires_on_negation_marker_and_shared_keywords() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = storage.store_memory(input("old", "use connection pooling for database access"), 0).unwrap();
        storage.store_memory(input("new", "connection pooling is deprecated, use a managed proxy instead"), 1000).unwrap();
        let report = evaluate_staleness(&storage, &memory, &StalenessConfig::default(), 2000).unwrap();
        assert!(report.signals.iter().any(|s| s.name == "contradictions"));
    }

    #[test]
    fn related_updates_signal_finds_fresher_neighbor_via_bfs() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.store_memory(input("a", "alpha"), 0).unwrap();
        let b = storage.store_memory(input("b", "beta"), 5000).unwrap();
        let relation = crate::memory::MemoryRelation {
            id: "r1".into(),
            source_id: a.id.clone(),
            target_id: b.id.clone(),
            relation_type: crate::memory::RelationType::RelatedTo,
            weight: 1.0,
            metadata: None,
            created_at: 0,
        };
        storage.insert_memory_relation(&relation).unwrap();
        let report = evaluate_staleness(&storage, &a, &StalenessConfig::default(), 100_000).unwrap();
        assert!(report.signals.iter().any(|s| s.name == "related_updates"));
    }
}
