//! Core data model (§3)
//!
//! The `Memory` entity and everything that references it: documents and
//! chunks, the embedding cache, memory-to-memory relations and their
//! review queue, the code graph, cross-layer relations, and the
//! entity/community/report shapes GraphRAG builds on.

mod code;
mod document;
mod graphrag;
mod node;
mod relation;

pub use code::{CodeEdge, CodeEdgeType, CodeNode, CodeNodeType};
pub use document::{Chunk, ChunkMetadata, Document, EmbeddingCacheEntry};
pub use graphrag::{GraphCommunity, GraphEntity, GraphRelationship, GraphReport};
pub use node::{DecayFunction, IngestInput, Memory, MemoryType};
pub use relation::{
    CrossLayerDirection, CrossLayerRelation, CrossLayerSuggestion, CrossLayerType,
    DetectionMethod, MemoryRelation, RelationStatus, RelationSuggestion, RelationType,
};
