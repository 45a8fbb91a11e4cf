//! Import (§4.M)
//!
//! Restores an [`ExportDocument`] under a chosen [`ConflictStrategy`].
//! With `reembed = true`, every restored memory and chunk is re-embedded
//! through the currently configured provider and gets a fresh vector id,
//! rather than trusting the export's original vector ids — those may not
//! resolve to anything in the target vector store at all.

use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::error::{DocleaError, Result};
use crate::storage::{Storage, StorageError};
use crate::vector::{PointKind, VectorPayload, VectorStore};

use super::export::ExportDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    Skip,
    Overwrite,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub memories_imported: usize,
    pub memories_skipped: usize,
    pub documents_imported: usize,
    pub documents_skipped: usize,
    pub chunks_imported: usize,
    pub memory_relations_imported: usize,
    pub memory_relations_skipped: usize,
    pub cross_layer_relations_imported: usize,
    pub pending_memories_imported: usize,
    pub pending_memories_skipped: usize,
    /// Set when the export was produced under a different embedding
    /// provider/model and wasn't re-embedded on the way in — the restored
    /// vectors no longer match what the currently configured provider
    /// would produce, so semantic search over them is unreliable until a
    /// re-embed.
    pub reembedding_required: bool,
}

/// Restores `document` into `storage`. `embedder`/`vector_store` are only
/// consulted when `reembed` is true; pass `None`/`None` otherwise.
/// `current_embedding_provider`/`current_embedding_model` are the live
/// configuration, compared against the export's metadata to decide
/// `ImportReport::reembedding_required`.
#[allow(clippy::too_many_arguments)]
pub async fn import(
    storage: &Storage,
    document: &ExportDocument,
    strategy: ConflictStrategy,
    reembed: bool,
    embedder: Option<&dyn EmbeddingProvider>,
    vector_store: Option<&dyn VectorStore>,
    current_embedding_provider: &str,
    current_embedding_model: &str,
) -> Result<ImportReport> {
    let reembedding_required = !reembed
        && (document.metadata.embedding_provider != current_embedding_provider
            || document.metadata.embedding_model != current_embedding_model);
    let mut report = ImportReport { reembedding_required, ..ImportReport::default() };

    for memory in &document.data.memories {
        let mut memory = memory.clone();
        if storage.get_memory(&memory.id).is_ok() {
            match strategy {
                ConflictStrategy::Skip => {
                    report.memories_skipped += 1;
                    continue;
                }
                ConflictStrategy::Error => return Err(DocleaError::Conflict(format!("memory {} already exists", memory.id))),
                ConflictStrategy::Overwrite => storage.delete_memory(&memory.id)?,
            }
        }
        if reembed {
            if let (Some(embedder), Some(vector_store)) = (embedder, vector_store) {
                let embedding = embedder.embed(&memory.content).await?;
                let vector_id = Uuid::new_v4().to_string();
                vector_store
                    .upsert(
                        &vector_id,
                        embedding.vector,
                        VectorPayload {
                            memory_id: Some(memory.id.clone()),
                            kind: Some(PointKind::Memory),
                            r#type: Some(memory.memory_type.as_str().to_string()),
                            tags: memory.tags.iter().cloned().collect(),
                            related_files: memory.related_files.clone(),
                            importance: memory.importance,
                        },
                    )
                    .await?;
                memory.vector_id = Some(vector_id);
            }
        }
        storage.insert_memory(&memory)?;
        report.memories_imported += 1;
    }

    for doc in &document.data.documents {
        if storage.get_document(&doc.id).is_ok() {
            match strategy {
                ConflictStrategy::Skip => {
                    report.documents_skipped += 1;
                    continue;
                }
                ConflictStrategy::Error => return Err(DocleaError::Conflict(format!("document {} already exists", doc.id))),
                ConflictStrategy::Overwrite => storage.delete_document(&doc.id)?,
            }
        }
        storage.insert_document(doc)?;
        report.documents_imported += 1;

        for chunk in document.data.chunks.iter().filter(|c| c.document_id == doc.id) {
            let mut chunk = chunk.clone();
            if reembed {
                if let (Some(embedder), Some(vector_store)) = (embedder, vector_store) {
                    let embedding = embedder.embed(&chunk.content).await?;
                    let vector_id = Uuid::new_v4().to_string();
                    vector_store.upsert(&vector_id, embedding.vector, VectorPayload::default()).await?;
                    chunk.vector_id = Some(vector_id);
                }
            }
            storage.insert_chunk(&chunk)?;
            report.chunks_imported += 1;
        }
    }

    for relation in &document.data.memory_relations {
        match storage.insert_memory_relation(relation) {
            Ok(()) => report.memory_relations_imported += 1,
            Err(StorageError::Conflict(_)) => match strategy {
                ConflictStrategy::Skip => report.memory_relations_skipped += 1,
                ConflictStrategy::Error => return Err(DocleaError::Conflict(format!("relation {} already exists", relation.id))),
                ConflictStrategy::Overwrite => {
                    storage.delete_memory_relation(&relation.id)?;
                    storage.insert_memory_relation(relation)?;
                    report.memory_relations_imported += 1;
                }
            },
            Err(e) => return Err(e.into()),
        }
    }

    for relation in &document.data.cross_layer_relations {
        storage.insert_cross_layer_relation(relation)?;
        report.cross_layer_relations_imported += 1;
    }

    for suggestion in &document.data.pending_memories {
        match storage.insert_relation_suggestion(suggestion) {
            Ok(()) => report.pending_memories_imported += 1,
            Err(StorageError::Conflict(_)) => match strategy {
                ConflictStrategy::Skip => report.pending_memories_skipped += 1,
                ConflictStrategy::Error => {
                    return Err(DocleaError::Conflict(format!("pending memory {} already exists", suggestion.id)))
                }
                ConflictStrategy::Overwrite => {
                    storage.delete_relation_suggestion(&suggestion.id)?;
                    storage.insert_relation_suggestion(suggestion)?;
                    report.pending_memories_imported += 1;
                }
            },
            Err(e) => return Err(e.into()),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::export::export;
    use crate::config::VectorProviderKind;
    use crate::memory::{IngestInput, MemoryType};
    use std::collections::BTreeSet;

    fn sample_input(title: &str) -> IngestInput {
        IngestInput {
            memory_type: MemoryType::Note,
            title: title.into(),
            content: "body".into(),
            summary: None,
            importance: 0.5,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn import_restores_every_memory_into_a_fresh_store() {
        let source = Storage::open_in_memory().unwrap();
        source.store_memory(sample_input("A"), 1000).unwrap();
        source.store_memory(sample_input("B"), 1000).unwrap();
        let document = export(&source, VectorProviderKind::Embedded, "transformers", "m", 2000).unwrap();

        let target = Storage::open_in_memory().unwrap();
        let report = import(&target, &document, ConflictStrategy::Skip, false, None, None, "transformers", "m").await.unwrap();
        assert_eq!(report.memories_imported, 2);
        assert_eq!(target.list_memories().unwrap().len(), 2);
        assert!(!report.reembedding_required);
    }

    #[tokio::test]
    async fn skip_strategy_leaves_existing_memory_untouched() {
        let source = Storage::open_in_memory().unwrap();
        let memory = source.store_memory(sample_input("A"), 1000).unwrap();
        let document = export(&source, VectorProviderKind::Embedded, "transformers", "m", 2000).unwrap();

        let report = import(&source, &document, ConflictStrategy::Skip, false, None, None, "transformers", "m").await.unwrap();
        assert_eq!(report.memories_skipped, 1);
        assert_eq!(report.memories_imported, 0);
        assert_eq!(source.get_memory(&memory.id).unwrap().title, "A");
    }

    #[tokio::test]
    async fn error_strategy_fails_on_existing_memory() {
        let source = Storage::open_in_memory().unwrap();
        source.store_memory(sample_input("A"), 1000).unwrap();
        let document = export(&source, VectorProviderKind::Embedded, "transformers", "m", 2000).unwrap();

        let result = import(&source, &document, ConflictStrategy::Error, false, None, None, "transformers", "m").await;
        assert!(matches!(result, Err(DocleaError::Conflict(_))));
    }

    #[tokio::test]
    async fn overwrite_strategy_replaces_existing_memory() {
        let source = Storage::open_in_memory().unwrap();
        let memory = source.store_memory(sample_input("A"), 1000).unwrap();
        let mut document = export(&source, VectorProviderKind::Embedded, "transformers", "m", 2000).unwrap();
        document.data.memories[0].title = "A renamed".into();

        let report =
            import(&source, &document, ConflictStrategy::Overwrite, false, None, None, "transformers", "m").await.unwrap();
        assert_eq!(report.memories_imported, 1);
        assert_eq!(source.get_memory(&memory.id).unwrap().title, "A renamed");
    }

    #[tokio::test]
    async fn mismatched_embedding_model_without_reembed_flags_reembedding_required() {
        let source = Storage::open_in_memory().unwrap();
        source.store_memory(sample_input("A"), 1000).unwrap();
        let document = export(&source, VectorProviderKind::Embedded, "transformers", "old-model", 2000).unwrap();

        let target = Storage::open_in_memory().unwrap();
        let report =
            import(&target, &document, ConflictStrategy::Skip, false, None, None, "transformers", "new-model").await.unwrap();
        assert!(report.reembedding_required);
    }

    #[tokio::test]
    async fn reembed_clears_reembedding_required_even_with_mismatched_model() {
        let source = Storage::open_in_memory().unwrap();
        source.store_memory(sample_input("A"), 1000).unwrap();
        let document = export(&source, VectorProviderKind::Embedded, "transformers", "old-model", 2000).unwrap();

        let target = Storage::open_in_memory().unwrap();
        let embedder = crate::embeddings::TransformersProvider::new(8);
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let vector_store = crate::vector::EmbeddedVectorStore::new(conn, 8).unwrap();
        let report = import(
            &target,
            &document,
            ConflictStrategy::Skip,
            true,
            Some(&embedder),
            Some(&vector_store),
            "transformers",
            "new-model",
        )
        .await
        .unwrap();
        assert!(!report.reembedding_required);
    }
}
