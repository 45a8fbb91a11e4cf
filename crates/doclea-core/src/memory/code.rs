//! Code-graph entities (§3, §4.E).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of symbol a [`CodeNode`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeNodeType {
    Function,
    Class,
    Interface,
    Type,
    Module,
    Package,
}

impl CodeNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeNodeType::Function => "function",
            CodeNodeType::Class => "class",
            CodeNodeType::Interface => "interface",
            CodeNodeType::Type => "type",
            CodeNodeType::Module => "module",
            CodeNodeType::Package => "package",
        }
    }
}

/// A node in the code symbol graph, produced by ingesting a symbol-index
/// file (§4.E). Lifecycle is tied to ingestion runs: re-ingesting a
/// document replaces its nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub id: String,
    pub node_type: CodeNodeType,
    pub name: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Edge type between two code nodes (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeEdgeType {
    Calls,
    Imports,
    Implements,
    Extends,
    References,
    DependsOn,
}

impl CodeEdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeEdgeType::Calls => "calls",
            CodeEdgeType::Imports => "imports",
            CodeEdgeType::Implements => "implements",
            CodeEdgeType::Extends => "extends",
            CodeEdgeType::References => "references",
            CodeEdgeType::DependsOn => "depends_on",
        }
    }
}

/// A directed edge in the code graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdge {
    pub id: String,
    pub from_node: String,
    pub to_node: String,
    pub edge_type: CodeEdgeType,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: i64,
}
