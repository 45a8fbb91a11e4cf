//! Document / Chunk / embedding-cache entities (§3).

use serde::{Deserialize, Serialize};

/// A source document that has been split into chunks. Chunks are owned by
/// their document; deleting the document cascades (storage layer's
/// `ON DELETE CASCADE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Full original content, kept so chunk offsets remain meaningful.
    pub content: String,
    pub created_at: i64,
}

/// Metadata carried by a chunk, produced by the markdown chunker (§4.D).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub headers: Vec<String>,
    pub level: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub has_frontmatter: bool,
    pub has_code_block: bool,
}

/// An ordered slice of a document's content.
///
/// Invariant 5: `[start_offset, end_offset)` lies within the document's
/// length, and a document's chunks are disjoint and ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub token_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// A cached embedding keyed by `(contentHash, model)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingCacheEntry {
    pub content_hash: String,
    pub model: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}
