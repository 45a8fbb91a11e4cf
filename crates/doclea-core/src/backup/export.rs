//! Export (§4.M)
//!
//! No partial exports: every memory, document, chunk, relation and
//! pending suggestion currently in the store is serialized into one
//! versioned document.

use serde::{Deserialize, Serialize};

use crate::config::VectorProviderKind;
use crate::error::Result;
use crate::memory::{Chunk, CrossLayerRelation, Document, Memory, MemoryRelation, RelationSuggestion};
use crate::storage::Storage;

pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub memories: Vec<Memory>,
    pub documents: Vec<Document>,
    pub chunks: Vec<Chunk>,
    pub memory_relations: Vec<MemoryRelation>,
    pub cross_layer_relations: Vec<CrossLayerRelation>,
    /// There is no standalone "pending memory" entity in the data model —
    /// this carries the pending relation-suggestion review queue, the
    /// closest thing the store has to it.
    pub pending_memories: Vec<RelationSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub total_memories: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: i64,
    pub backend_type: String,
    pub storage_mode: String,
    pub schema_version: u32,
    pub data: ExportData,
    pub metadata: ExportMetadata,
}

/// Builds a complete export document as of `now`.
pub fn export(storage: &Storage, vector_provider: VectorProviderKind, embedding_provider: &str, embedding_model: &str, now: i64) -> Result<ExportDocument> {
    let memories = storage.list_memories()?;
    let documents = storage.list_documents()?;
    let chunks = storage.list_all_chunks()?;
    let memory_relations = storage.list_all_memory_relations()?;
    let cross_layer_relations = storage.list_all_cross_layer_relations()?;
    let pending_memories = storage.list_pending_relation_suggestions()?;
    let schema_version = storage.schema_version()?;

    let backend_type = match vector_provider {
        VectorProviderKind::Embedded => "embedded",
        VectorProviderKind::Remote => "remote",
    }
    .to_string();

    Ok(ExportDocument {
        version: EXPORT_FORMAT_VERSION.to_string(),
        exported_at: now,
        backend_type,
        storage_mode: "sqlite".to_string(),
        schema_version,
        metadata: ExportMetadata {
            total_memories: memories.len(),
            embedding_provider: embedding_provider.to_string(),
            embedding_model: embedding_model.to_string(),
        },
        data: ExportData { memories, documents, chunks, memory_relations, cross_layer_relations, pending_memories },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{IngestInput, MemoryType};
    use std::collections::BTreeSet;

    #[test]
    fn export_carries_every_stored_memory_and_stamps_metadata() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .store_memory(
                IngestInput {
                    memory_type: MemoryType::Note,
                    title: "A".into(),
                    content: "a".into(),
                    summary: None,
                    importance: 0.5,
                    tags: BTreeSet::new(),
                    related_files: vec![],
                    git_commit: None,
                    source_pr: None,
                    experts: BTreeSet::new(),
                },
                1000,
            )
            .unwrap();

        let document = export(&storage, VectorProviderKind::Embedded, "transformers", "transformers-hash-projection", 2000).unwrap();
        assert_eq!(document.version, EXPORT_FORMAT_VERSION);
        assert_eq!(document.data.memories.len(), 1);
        assert_eq!(document.metadata.total_memories, 1);
        assert_eq!(document.backend_type, "embedded");
    }

    #[test]
    fn export_round_trips_through_json() {
        let storage = Storage::open_in_memory().unwrap();
        let document = export(&storage, VectorProviderKind::Embedded, "transformers", "m", 1000).unwrap();
        let json = serde_json::to_string(&document).unwrap();
        let parsed: ExportDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version, document.version);
    }
}
