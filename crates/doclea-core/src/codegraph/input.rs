//! Symbol-index wire shapes (§4.E), SCIP-like: a JSON document listing
//! per-file symbols and occurrences.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolIndex {
    pub documents: Vec<SymbolDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDocument {
    pub relative_path: String,
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// The symbol's fully-qualified descriptor, e.g.
    /// `crate/module/parse_config().` — the trailing suffix hints at kind
    /// when `kind` is absent.
    pub symbol: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub documentation: Vec<String>,
    #[serde(default)]
    pub enclosing_symbol: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub symbol: String,
    #[serde(default)]
    pub is_implementation: bool,
    #[serde(default)]
    pub is_type_definition: bool,
    #[serde(default)]
    pub is_reference: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub symbol: String,
    /// `[line, col, endCol]` or `[line, col, endLine, endCol]`, 0-based.
    pub range: Vec<u32>,
    #[serde(default)]
    pub symbol_roles: u32,
}

pub const ROLE_DEFINITION: u32 = 0x1;
pub const ROLE_IMPORT: u32 = 0x2;
pub const ROLE_WRITE: u32 = 0x4;
#[allow(dead_code)]
pub const ROLE_READ: u32 = 0x8;

impl Occurrence {
    pub fn is_definition(&self) -> bool {
        self.symbol_roles & ROLE_DEFINITION != 0
    }

    pub fn is_import(&self) -> bool {
        self.symbol_roles & ROLE_IMPORT != 0
    }

    /// Normalizes the compact range convention to 1-based inclusive
    /// `(start_line, end_line)` (§4.E rule 4).
    pub fn line_range(&self) -> (u32, u32) {
        match self.range.len() {
            3 => (self.range[0] + 1, self.range[0] + 1),
            4 => (self.range[0] + 1, self.range[2] + 1),
            _ => (self.range.first().copied().unwrap_or(0) + 1, self.range.first().copied().unwrap_or(0) + 1),
        }
    }
}
