//! Symbol-index → CodeNode/CodeEdge mapper (§4.E).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::input::{SymbolDocument, SymbolIndex, SymbolInfo};
use super::MappedDocument;
use crate::memory::{CodeEdge, CodeEdgeType, CodeNode, CodeNodeType};

fn kind_from_descriptor(symbol: &str) -> Option<CodeNodeType> {
    if symbol.ends_with("().") {
        Some(CodeNodeType::Function)
    } else if symbol.ends_with('#') {
        Some(CodeNodeType::Class)
    } else if symbol.ends_with('/') {
        Some(CodeNodeType::Module)
    } else {
        None
    }
}

fn kind_from_documentation(docs: &[String]) -> Option<CodeNodeType> {
    let joined = docs.join(" ").to_lowercase();
    if joined.contains("interface") {
        Some(CodeNodeType::Interface)
    } else if joined.contains("class") {
        Some(CodeNodeType::Class)
    } else if joined.contains("namespace") {
        Some(CodeNodeType::Module)
    } else if joined.contains("type") {
        Some(CodeNodeType::Type)
    } else if joined.contains("function") || joined.contains("=>") {
        Some(CodeNodeType::Function)
    } else {
        None
    }
}

fn infer_kind(symbol: &SymbolInfo) -> Option<CodeNodeType> {
    if let Some(kind) = &symbol.kind {
        return match kind.to_lowercase().as_str() {
            "function" => Some(CodeNodeType::Function),
            "class" => Some(CodeNodeType::Class),
            "interface" => Some(CodeNodeType::Interface),
            "type" => Some(CodeNodeType::Type),
            "module" => Some(CodeNodeType::Module),
            "package" => Some(CodeNodeType::Package),
            _ => None,
        };
    }
    kind_from_descriptor(&symbol.symbol).or_else(|| kind_from_documentation(&symbol.documentation))
}

/// Finds the occurrence's smallest enclosing *definition* symbol: the
/// shortest `enclosing_symbol` chain entry that is itself defined in this
/// document (§4.E rule 3).
fn smallest_enclosing_definition(symbol: &str, by_symbol: &HashMap<&str, &SymbolInfo>) -> Option<String> {
    let mut current = by_symbol.get(symbol)?.enclosing_symbol.clone();
    while let Some(candidate) = current {
        if by_symbol.contains_key(candidate.as_str()) {
            return Some(candidate);
        }
        current = by_symbol.get(candidate.as_str()).and_then(|s| s.enclosing_symbol.clone());
    }
    None
}

fn map_document(document: &SymbolDocument, now: i64) -> MappedDocument {
    let by_symbol: HashMap<&str, &SymbolInfo> = document.symbols.iter().map(|s| (s.symbol.as_str(), s)).collect();

    let mut definition_range: HashMap<&str, (u32, u32)> = HashMap::new();
    for occurrence in &document.occurrences {
        if occurrence.is_definition() {
            definition_range.entry(occurrence.symbol.as_str()).or_insert_with(|| occurrence.line_range());
        }
    }

    let mut node_id_by_symbol: HashMap<String, String> = HashMap::new();
    let mut nodes = Vec::new();

    for symbol in &document.symbols {
        let Some(kind) = infer_kind(symbol) else { continue };
        let id = Uuid::new_v4().to_string();
        node_id_by_symbol.insert(symbol.symbol.clone(), id.clone());
        let range = definition_range.get(symbol.symbol.as_str()).copied();
        nodes.push(CodeNode {
            id,
            node_type: kind,
            name: symbol.display_name.clone().unwrap_or_else(|| symbol.symbol.clone()),
            file_path: document.relative_path.clone(),
            start_line: range.map(|(start, _)| start),
            end_line: range.map(|(_, end)| end),
            signature: None,
            summary: symbol.documentation.first().cloned(),
            metadata: HashMap::new(),
        });
    }

    let mut edges = Vec::new();
    let mut seen_edges: HashSet<(String, String, CodeEdgeType)> = HashSet::new();

    let mut push_edge = |from: String, to: String, edge_type: CodeEdgeType, edges: &mut Vec<CodeEdge>| {
        let key = (from.clone(), to.clone(), edge_type);
        if seen_edges.insert(key) {
            edges.push(CodeEdge {
                id: Uuid::new_v4().to_string(),
                from_node: from,
                to_node: to,
                edge_type,
                metadata: HashMap::new(),
                created_at: now,
            });
        }
    };

    // Rule 2: relationships → implements/extends/references.
    for symbol in &document.symbols {
        let Some(from_id) = node_id_by_symbol.get(&symbol.symbol) else { continue };
        for relationship in &symbol.relationships {
            let Some(to_id) = node_id_by_symbol.get(&relationship.symbol) else { continue };
            if relationship.is_implementation {
                push_edge(from_id.clone(), to_id.clone(), CodeEdgeType::Implements, &mut edges);
            }
            if relationship.is_type_definition {
                push_edge(from_id.clone(), to_id.clone(), CodeEdgeType::Extends, &mut edges);
            }
            if relationship.is_reference {
                push_edge(from_id.clone(), to_id.clone(), CodeEdgeType::References, &mut edges);
            }
        }
    }

    // Rule 3: non-definition occurrences → calls/imports, from the
    // smallest enclosing definition to the referenced symbol.
    for occurrence in &document.occurrences {
        if occurrence.is_definition() {
            continue;
        }
        let Some(to_id) = node_id_by_symbol.get(&occurrence.symbol) else { continue };
        let Some(enclosing) = smallest_enclosing_definition(&occurrence.symbol, &by_symbol) else { continue };
        let Some(from_id) = node_id_by_symbol.get(&enclosing) else { continue };
        let edge_type = if occurrence.is_import() { CodeEdgeType::Imports } else { CodeEdgeType::Calls };
        push_edge(from_id.clone(), to_id.clone(), edge_type, &mut edges);
    }

    MappedDocument {
        file_path: document.relative_path.clone(),
        nodes,
        edges,
    }
}

pub fn map_symbol_index(index: &SymbolIndex, now: i64) -> Vec<MappedDocument> {
    index.documents.iter().map(|d| map_document(d, now)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegraph::{Occurrence, Relationship, SymbolInfo};

    fn symbol(symbol: &str, kind: Option<&str>, enclosing: Option<&str>) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            display_name: None,
            documentation: vec![],
            enclosing_symbol: enclosing.map(|s| s.to_string()),
            kind: kind.map(|s| s.to_string()),
            relationships: vec![],
        }
    }

    #[test]
    fn infers_function_kind_from_descriptor_suffix() {
        let s = symbol("crate/parse_config().", None, None);
        assert_eq!(infer_kind(&s), Some(CodeNodeType::Function));
    }

    #[test]
    fn infers_class_kind_from_hash_suffix() {
        let s = symbol("crate/Config#", None, None);
        assert_eq!(infer_kind(&s), Some(CodeNodeType::Class));
    }

    #[test]
    fn infers_module_kind_from_slash_suffix() {
        let s = symbol("crate/config/", None, None);
        assert_eq!(infer_kind(&s), Some(CodeNodeType::Module));
    }

    #[test]
    fn explicit_kind_takes_priority_over_inference() {
        let s = symbol("crate/Foo#", Some("interface"), None);
        assert_eq!(infer_kind(&s), Some(CodeNodeType::Interface));
    }

    #[test]
    fn implementation_relationship_becomes_implements_edge() {
        let mut parent = symbol("crate/Impl#", Some("class"), None);
        parent.relationships = vec![Relationship {
            symbol: "crate/Trait#".to_string(),
            is_implementation: true,
            is_type_definition: false,
            is_reference: false,
        }];
        let trait_symbol = symbol("crate/Trait#", Some("interface"), None);
        let document = SymbolDocument {
            relative_path: "src/lib.rs".into(),
            symbols: vec![parent, trait_symbol],
            occurrences: vec![],
        };
        let mapped = map_document(&document, 1000);
        assert_eq!(mapped.edges.len(), 1);
        assert_eq!(mapped.edges[0].edge_type, CodeEdgeType::Implements);
    }

    #[test]
    fn non_definition_occurrence_becomes_calls_edge_from_enclosing_definition() {
        let caller = symbol("crate/main().", Some("function"), None);
        let callee = symbol("crate/helper().", Some("function"), None);
        let document = SymbolDocument {
            relative_path: "src/main.rs".into(),
            symbols: vec![caller, callee],
            occurrences: vec![Occurrence {
                symbol: "crate/helper().".to_string(),
                range: vec![10, 4, 10],
                symbol_roles: 0,
            }],
        };
        let mapped = map_document(&document, 1000);
        assert_eq!(mapped.edges.len(), 1);
        assert_eq!(mapped.edges[0].edge_type, CodeEdgeType::Calls);
    }

    #[test]
    fn import_role_becomes_imports_edge() {
        let caller = symbol("crate/main().", Some("function"), None);
        let imported = symbol("crate/other_module/", Some("module"), None);
        let document = SymbolDocument {
            relative_path: "src/main.rs".into(),
            symbols: vec![caller, imported],
            occurrences: vec![Occurrence {
                symbol: "crate/other_module/".to_string(),
                range: vec![1, 0, 20],
                symbol_roles: super::super::input::ROLE_IMPORT,
            }],
        };
        let mapped = map_document(&document, 1000);
        assert_eq!(mapped.edges[0].edge_type, CodeEdgeType::Imports);
    }

    #[test]
    fn duplicate_occurrences_suppress_duplicate_edges() {
        let caller = symbol("crate/main().", Some("function"), None);
        let callee = symbol("crate/helper().", Some("function"), None);
        let document = SymbolDocument {
            relative_path: "src/main.rs".into(),
            symbols: vec![caller, callee],
            occurrences: vec![
                Occurrence { symbol: "crate/helper().".to_string(), range: vec![10, 4, 10], symbol_roles: 0 },
                Occurrence { symbol: "crate/helper().".to_string(), range: vec![12, 4, 10], symbol_roles: 0 },
            ],
        };
        let mapped = map_document(&document, 1000);
        assert_eq!(mapped.edges.len(), 1);
    }
}
