//! Memory↔memory and memory↔code relation entities (§3).

use serde::{Deserialize, Serialize};

/// Edge type between two memories.
///
/// The extended types `causes`/`solves` that the relation detector (§4.H)
/// can infer collapse to `References` when materialized into storage —
/// preserved for compatibility with stored data (§9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    References,
    Implements,
    Extends,
    RelatedTo,
    Supersedes,
    Requires,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::References => "references",
            RelationType::Implements => "implements",
            RelationType::Extends => "extends",
            RelationType::RelatedTo => "related_to",
            RelationType::Supersedes => "supersedes",
            RelationType::Requires => "requires",
        }
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "references" => Ok(RelationType::References),
            "implements" => Ok(RelationType::Implements),
            "extends" => Ok(RelationType::Extends),
            "related_to" => Ok(RelationType::RelatedTo),
            "supersedes" => Ok(RelationType::Supersedes),
            "requires" => Ok(RelationType::Requires),
            other => Err(format!("unknown relation type: {other}")),
        }
    }
}

/// A materialized, directed edge between two memories.
///
/// Invariant 2: `source != target` and `(source, target, type)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRelation {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    /// In `(0, 1]`.
    pub weight: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: i64,
}

/// Review status of a pending relation/cross-layer candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A candidate memory-to-memory relation awaiting human review, or already
/// reviewed (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSuggestion {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// The richer, possibly extended type (`causes`/`solves` survive here
    /// even though a materialized `MemoryRelation` would collapse them).
    pub suggested_type: String,
    pub confidence: f32,
    pub reason: String,
    pub detection_method: DetectionMethod,
    pub status: RelationStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<i64>,
}

/// Which candidate source produced a suggestion (§4.H, §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Semantic,
    Keyword,
    FileOverlap,
    Temporal,
    CodeReference,
    FilePath,
}

/// Direction of a cross-layer relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossLayerDirection {
    MemoryToCode,
    CodeToMemory,
}

/// Type of relationship between a memory and a code node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossLayerType {
    Documents,
    Addresses,
    Exemplifies,
}

/// A materialized memory↔code edge.
///
/// Invariant 6: unique on `(memoryId, codeNodeId, type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLayerRelation {
    pub id: String,
    pub memory_id: String,
    pub code_node_id: String,
    pub relation_type: CrossLayerType,
    pub direction: CrossLayerDirection,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: i64,
}

/// A pending cross-layer candidate, mirroring [`CrossLayerRelation`] with a
/// review status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLayerSuggestion {
    pub id: String,
    pub memory_id: String,
    pub code_node_id: String,
    pub relation_type: CrossLayerType,
    pub direction: CrossLayerDirection,
    pub confidence: f32,
    pub reason: String,
    pub status: RelationStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<i64>,
}
