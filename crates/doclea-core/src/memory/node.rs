//! The `Memory` entity (§3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kind of project knowledge a memory captures.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Decision,
    Solution,
    Pattern,
    Architecture,
    #[default]
    Note,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Decision => "decision",
            MemoryType::Solution => "solution",
            MemoryType::Pattern => "pattern",
            MemoryType::Architecture => "architecture",
            MemoryType::Note => "note",
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decision" => Ok(MemoryType::Decision),
            "solution" => Ok(MemoryType::Solution),
            "pattern" => Ok(MemoryType::Pattern),
            "architecture" => Ok(MemoryType::Architecture),
            "note" => Ok(MemoryType::Note),
            other => Err(format!("unknown memory type: {other}")),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-memory confidence-decay function override (§4.G). `None` on the
/// memory means "use the global config's default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayFunction {
    Exponential,
    Linear,
    Step,
    None,
}

/// A persisted unit of project knowledge.
///
/// `vectorId` rebinds whenever the memory is re-embedded (content update);
/// `accessCount` is monotonic and `accessedAt` is non-decreasing, enforced
/// by the storage layer rather than by this struct (invariants 1 and 3).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Base importance in `[0,1]`, the confidence input before decay.
    pub importance: f32,
    pub tags: BTreeSet<String>,
    /// Order matters (most-recently-touched first is a common caller
    /// convention); uniqueness is enforced by the storage layer.
    pub related_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_pr: Option<String>,
    pub experts: BTreeSet<String>,
    pub created_at: i64,
    pub accessed_at: i64,
    pub access_count: i64,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,

    // Confidence-decay overrides (§4.G); absent means "use global config".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_floor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_function: Option<DecayFunction>,
}

impl Memory {
    /// Anchor timestamp used by decay/staleness calculations: the last
    /// refresh, else the later of access/creation (§4.G, §4.J).
    pub fn anchor_timestamp(&self) -> i64 {
        self.last_refreshed_at
            .unwrap_or_else(|| self.accessed_at.max(self.created_at))
    }

    /// A memory is pinned (exempt from decay) when its override decay rate
    /// is exactly zero.
    pub fn is_pinned(&self) -> bool {
        self.decay_rate == Some(0.0)
    }
}

/// Input for `store` — a trust boundary, so unknown fields are rejected
/// (field-injection guard).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestInput {
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub source_pr: Option<String>,
    #[serde(default)]
    pub experts: BTreeSet<String>,
}

fn default_importance() -> f32 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_roundtrip() {
        for t in [
            MemoryType::Decision,
            MemoryType::Solution,
            MemoryType::Pattern,
            MemoryType::Architecture,
            MemoryType::Note,
        ] {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
    }

    #[test]
    fn anchor_prefers_last_refreshed() {
        let mut m = sample_memory();
        m.created_at = 100;
        m.accessed_at = 200;
        m.last_refreshed_at = Some(50);
        assert_eq!(m.anchor_timestamp(), 50);
        m.last_refreshed_at = None;
        assert_eq!(m.anchor_timestamp(), 200);
    }

    #[test]
    fn pinned_memory_has_zero_decay_rate() {
        let mut m = sample_memory();
        assert!(!m.is_pinned());
        m.decay_rate = Some(0.0);
        assert!(m.is_pinned());
    }

    #[test]
    fn ingest_input_rejects_unknown_fields() {
        let json = r#"{"type":"decision","title":"t","content":"c","malicious":"x"}"#;
        let parsed: Result<IngestInput, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    fn sample_memory() -> Memory {
        Memory {
            id: "m1".into(),
            memory_type: MemoryType::Decision,
            title: "t".into(),
            content: "c".into(),
            summary: None,
            importance: 0.5,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
            created_at: 0,
            accessed_at: 0,
            access_count: 0,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        }
    }
}
