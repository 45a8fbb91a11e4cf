//! Cross-layer (memory↔code) relation detector (§4.I).

use std::collections::HashMap;

use uuid::Uuid;

use super::extract_keywords;
use crate::memory::{CodeNode, CodeNodeType, CrossLayerDirection, CrossLayerRelation, CrossLayerSuggestion, CrossLayerType, Memory, MemoryType, RelationStatus};
use crate::storage::{Result as StorageResult, Storage};

#[derive(Debug, Clone)]
pub struct CrossLayerDetectorConfig {
    pub suggestion_threshold: f32,
    pub auto_approve_threshold: f32,
}

impl Default for CrossLayerDetectorConfig {
    fn default() -> Self {
        Self { suggestion_threshold: 0.5, auto_approve_threshold: 0.85 }
    }
}

#[derive(Clone)]
struct Candidate {
    code_node_id: String,
    relation_type: CrossLayerType,
    confidence: f32,
    reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub materialized: Vec<CrossLayerRelation>,
    pub suggested: Vec<CrossLayerSuggestion>,
}

/// Extracts backtick-quoted identifiers, e.g. `` `parse_config` ``.
fn extract_backtick_identifiers(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = content.char_indices();
    while let Some((start, c)) = chars.next() {
        if c != '`' {
            continue;
        }
        if let Some(end) = content[start + 1..].find('`') {
            let ident = &content[start + 1..start + 1 + end];
            if !ident.is_empty() && !ident.contains('\n') {
                out.push(ident.to_string());
            }
        }
    }
    out
}

/// Extracts plausible file paths from content: whitespace-delimited
/// tokens containing a `/` or a recognizable source extension.
fn extract_file_paths(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-'))
        .filter(|w| w.contains('/') || w.ends_with(".rs") || w.ends_with(".ts") || w.ends_with(".py") || w.ends_with(".go"))
        .map(|w| w.to_string())
        .collect()
}

/// From a memory: backtick identifiers matched against code-graph node
/// names (0.9) and per-related-file non-module node enumeration (0.75).
pub async fn detect_cross_layer_from_memory(
    storage: &Storage,
    memory: &Memory,
    config: &CrossLayerDetectorConfig,
    now: i64,
) -> StorageResult<DetectionOutcome> {
    let identifiers = extract_backtick_identifiers(&memory.content);
    let mut files: Vec<String> = memory.related_files.clone();
    files.extend(extract_file_paths(&memory.content));
    files.sort();
    files.dedup();

    let mut candidates: Vec<Candidate> = Vec::new();

    for file in &files {
        let nodes = storage.list_code_nodes_for_file(file)?;
        for node in &nodes {
            if identifiers.iter().any(|id| id == &node.name) {
                candidates.push(Candidate {
                    code_node_id: node.id.clone(),
                    relation_type: CrossLayerType::Documents,
                    confidence: 0.9,
                    reason: format!("content references `{}`", node.name),
                });
            } else if node.node_type != CodeNodeType::Module {
                candidates.push(Candidate {
                    code_node_id: node.id.clone(),
                    relation_type: CrossLayerType::Documents,
                    confidence: 0.75,
                    reason: format!("memory lists file {file}"),
                });
            }
        }
    }

    let existing = storage.list_cross_layer_relations_for_memory(&memory.id)?;
    let already_linked: std::collections::HashSet<String> = existing.iter().map(|r| r.code_node_id.clone()).collect();

    apply_from_memory(storage, memory, dedupe(candidates, &already_linked), config, now)
}

fn dedupe(candidates: Vec<Candidate>, already_linked: &std::collections::HashSet<String>) -> Vec<Candidate> {
    let mut by_node: HashMap<String, Candidate> = HashMap::new();
    for candidate in candidates {
        if already_linked.contains(&candidate.code_node_id) {
            continue;
        }
        by_node
            .entry(candidate.code_node_id.clone())
            .and_modify(|existing| {
                if candidate.confidence > existing.confidence {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }
    by_node.into_values().collect()
}

fn apply_from_memory(
    storage: &Storage,
    memory: &Memory,
    candidates: Vec<Candidate>,
    config: &CrossLayerDetectorConfig,
    now: i64,
) -> StorageResult<DetectionOutcome> {
    let mut outcome = DetectionOutcome::default();
    for candidate in candidates {
        if candidate.confidence >= config.auto_approve_threshold {
            let relation = CrossLayerRelation {
                id: Uuid::new_v4().to_string(),
                memory_id: memory.id.clone(),
                code_node_id: candidate.code_node_id,
                relation_type: candidate.relation_type,
                direction: CrossLayerDirection::MemoryToCode,
                confidence: candidate.confidence,
                metadata: Some(candidate.reason),
                created_at: now,
            };
            storage.insert_cross_layer_relation(&relation)?;
            outcome.materialized.push(relation);
        } else if candidate.confidence >= config.suggestion_threshold {
            let suggestion = CrossLayerSuggestion {
                id: Uuid::new_v4().to_string(),
                memory_id: memory.id.clone(),
                code_node_id: candidate.code_node_id,
                relation_type: candidate.relation_type,
                direction: CrossLayerDirection::MemoryToCode,
                confidence: candidate.confidence,
                reason: candidate.reason,
                status: RelationStatus::Pending,
                created_at: now,
                reviewed_at: None,
            };
            storage.insert_cross_layer_suggestion(&suggestion)?;
            outcome.suggested.push(suggestion);
        }
    }
    Ok(outcome)
}

fn keyword_overlap(memory: &Memory, node: &CodeNode) -> f32 {
    let memory_keywords = extract_keywords(&memory.content);
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
    crate::scoring::jaccard(&memory_keywords, &node_keywords)
}

/// From a code node: `addresses` (decision/architecture memories
/// referencing the node's file) and `exemplifies` (pattern memories
/// referencing the node's name or sharing keyword overlap).
pub async fn detect_cross_layer_from_code(
    storage: &Storage,
    node: &CodeNode,
    config: &CrossLayerDetectorConfig,
    now: i64,
) -> StorageResult<DetectionOutcome> {
    let all_memories = storage.list_memories()?;
    let existing = storage.list_cross_layer_relations_for_code_node(&node.id)?;
    let already_linked: std::collections::HashSet<String> = existing.iter().map(|r| r.memory_id.clone()).collect();

    let mut by_memory: HashMap<String, (CrossLayerType, f32, String)> = HashMap::new();

    for memory in &all_memories {
        if already_linked.contains(&memory.id) {
            continue;
        }
        let references_file = memory.related_files.iter().any(|f| f == &node.file_path) || memory.content.contains(&node.file_path);

        if matches!(memory.memory_type, MemoryType::Decision | MemoryType::Architecture) && references_file {
            let overlap = keyword_overlap(memory, node);
            if overlap >= 0.2 {
                let confidence = (0.6 + 0.15 * overlap).min(0.75);
                by_memory
                    .entry(memory.id.clone())
                    .and_modify(|(_, c, _)| {
                        if confidence > *c {
                            *c = confidence;
                        }
                    })
                    .or_insert((CrossLayerType::Addresses, confidence, format!("addresses {} (overlap {:.2})", node.name, overlap)));
            }
        }

        if memory.memory_type == MemoryType::Pattern {
            let references_name = memory.content.contains(&node.name);
            let overlap = keyword_overlap(memory, node);
            let confidence = if references_name {
                0.85
            } else if overlap >= 0.4 {
                (0.65 + 0.15 * overlap).min(0.8)
            } else {
                0.0
            };
            if confidence > 0.0 {
                by_memory
                    .entry(memory.id.clone())
                    .and_modify(|(_, c, _)| {
                        if confidence > *c {
                            *c = confidence;
                        }
                    })
                    .or_insert((CrossLayerType::Exemplifies, confidence, format!("exemplifies {} (overlap {:.2})", node.name, overlap)));
            }
        }
    }

    let mut outcome = DetectionOutcome::default();
    for (memory_id, (relation_type, confidence, reason)) in by_memory {
        if confidence >= config.auto_approve_threshold {
            let relation = CrossLayerRelation {
                id: Uuid::new_v4().to_string(),
                memory_id,
                code_node_id: node.id.clone(),
                relation_type,
                direction: CrossLayerDirection::CodeToMemory,
                confidence,
                metadata: Some(reason),
                created_at: now,
            };
            storage.insert_cross_layer_relation(&relation)?;
            outcome.materialized.push(relation);
        } else if confidence >= config.suggestion_threshold {
            let suggestion = CrossLayerSuggestion {
                id: Uuid::new_v4().to_string(),
                memory_id,
                code_node_id: node.id.clone(),
                relation_type,
                direction: CrossLayerDirection::CodeToMemory,
                confidence,
                reason,
                status: RelationStatus::Pending,
                created_at: now,
                reviewed_at: None,
            };
            storage.insert_cross_layer_suggestion(&suggestion)?;
            outcome.suggested.push(suggestion);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_backtick_identifiers() {
        let ids = extract_backtick_identifiers("see `parse_config` and `Storage::open`");
        assert_eq!(ids, vec!["parse_config".to_string(), "Storage::open".to_string()]);
    }

    #[test]
    fn extracts_file_paths_from_prose() {
        let paths = extract_file_paths("fixed in src/storage/mod.rs today");
        assert_eq!(paths, vec!["src/storage/mod.rs".to_string()]);
    }

    #[test]
    fn keyword_overlap_uses_name_signature_and_summary() {
        let memory = Memory {
            id: "m".into(),
            memory_type: MemoryType::Decision,
            title: "t".into(),
            content: "we decided to validate config before startup".into(),
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
        let node = CodeNode {
            id: "n".into(),
            node_type: CodeNodeType::Function,
            name: "validate_config".into(),
            file_path: "src/config.rs".into(),
            start_line: None,
            end_line: None,
            signature: None,
            summary: Some("validates config before startup".into()),
            metadata: Default::default(),
        };
        assert!(keyword_overlap(&memory, &node) > 0.0);
    }
}
