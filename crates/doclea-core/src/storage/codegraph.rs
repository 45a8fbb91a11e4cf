//! Code-graph CRUD (§4.E).

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::{Storage, StorageError};
use crate::memory::{CodeEdge, CodeEdgeType, CodeNode, CodeNodeType};

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<CodeNode> {
    let node_type: String = row.get("node_type")?;
    let metadata_json: String = row.get("metadata")?;
    Ok(CodeNode {
        id: row.get("id")?,
        node_type: node_type_from_str(&node_type),
        name: row.get("name")?,
        file_path: row.get("file_path")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        signature: row.get("signature")?,
        summary: row.get("summary")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}

fn node_type_from_str(s: &str) -> CodeNodeType {
    match s {
        "class" => CodeNodeType::Class,
        "interface" => CodeNodeType::Interface,
        "type" => CodeNodeType::Type,
        "module" => CodeNodeType::Module,
        "package" => CodeNodeType::Package,
        _ => CodeNodeType::Function,
    }
}

fn edge_type_from_str(s: &str) -> CodeEdgeType {
    match s {
        "imports" => CodeEdgeType::Imports,
        "implements" => CodeEdgeType::Implements,
        "extends" => CodeEdgeType::Extends,
        "references" => CodeEdgeType::References,
        "depends_on" => CodeEdgeType::DependsOn,
        _ => CodeEdgeType::Calls,
    }
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<CodeEdge> {
    let edge_type: String = row.get("edge_type")?;
    let metadata_json: String = row.get("metadata")?;
    Ok(CodeEdge {
        id: row.get("id")?,
        from_node: row.get("from_node")?,
        to_node: row.get("to_node")?,
        edge_type: edge_type_from_str(&edge_type),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get("created_at")?,
    })
}

impl Storage {
    /// Replaces every node/edge belonging to `file_path`'s prior ingestion
    /// run with the new set (§4.E: "re-ingesting a document replaces its
    /// nodes").
    pub fn replace_code_graph_for_file(&self, file_path: &str, nodes: Vec<CodeNode>, edges: Vec<CodeEdge>) -> super::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM code_nodes WHERE file_path = ?1", params![file_path])?;

        for node in &nodes {
            tx.execute(
                "INSERT INTO code_nodes (id, node_type, name, file_path, start_line, end_line, signature, summary, metadata)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    node.id,
                    node.node_type.as_str(),
                    node.name,
                    node.file_path,
                    node.start_line,
                    node.end_line,
                    node.signature,
                    node.summary,
                    serde_json::to_string(&node.metadata)?,
                ],
            )?;
        }
        for edge in &edges {
            tx.execute(
                "INSERT OR IGNORE INTO code_edges (id, from_node, to_node, edge_type, metadata, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    edge.id,
                    edge.from_node,
                    edge.to_node,
                    edge.edge_type.as_str(),
                    serde_json::to_string(&edge.metadata)?,
                    edge.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_code_node(&self, id: &str) -> super::Result<CodeNode> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, node_type, name, file_path, start_line, end_line, signature, summary, metadata
             FROM code_nodes WHERE id = ?1",
            params![id],
            row_to_node,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn list_code_nodes_for_file(&self, file_path: &str) -> super::Result<Vec<CodeNode>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, node_type, name, file_path, start_line, end_line, signature, summary, metadata
             FROM code_nodes WHERE file_path = ?1",
        )?;
        let rows = stmt.query_map(params![file_path], row_to_node)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_edges_from(&self, node_id: &str) -> super::Result<Vec<CodeEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, from_node, to_node, edge_type, metadata, created_at FROM code_edges WHERE from_node = ?1",
        )?;
        let rows = stmt.query_map(params![node_id], row_to_edge)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `LIKE`-based keyword match over `name`/`signature`/`summary`, used
    /// by the context builder's KAG leg (§4.L). No FTS index backs code
    /// nodes, so this is a linear scan bounded by `limit`.
    pub fn list_code_nodes_matching_keywords(&self, keywords: &[String], limit: usize) -> super::Result<Vec<CodeNode>> {
        if keywords.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, node_type, name, file_path, start_line, end_line, signature, summary, metadata
             FROM code_nodes
             WHERE name LIKE ?1 OR signature LIKE ?1 OR summary LIKE ?1
             LIMIT ?2",
        )?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for keyword in keywords {
            let pattern = format!("%{keyword}%");
            let rows = stmt.query_map(params![pattern, limit as i64], row_to_node)?;
            for row in rows {
                let node = row?;
                if seen.insert(node.id.clone()) {
                    out.push(node);
                }
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(id: &str, file_path: &str) -> CodeNode {
        CodeNode {
            id: id.to_string(),
            node_type: CodeNodeType::Function,
            name: "parse_config".into(),
            file_path: file_path.to_string(),
            start_line: Some(10),
            end_line: Some(20),
            signature: Some("fn parse_config() -> Config".into()),
            summary: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn replace_code_graph_drops_prior_nodes_for_the_file() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .replace_code_graph_for_file("src/config.rs", vec![sample_node("n1", "src/config.rs")], vec![])
            .unwrap();
        storage
            .replace_code_graph_for_file("src/config.rs", vec![sample_node("n2", "src/config.rs")], vec![])
            .unwrap();
        let nodes = storage.list_code_nodes_for_file("src/config.rs").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "n2");
    }

    #[test]
    fn get_code_node_returns_not_found_for_missing_id() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.get_code_node("missing").is_err());
    }
}
