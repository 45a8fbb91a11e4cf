//! Error taxonomy
//!
//! One [`thiserror`] enum per concern (storage, embeddings, vector store,
//! chunking, migrations), plus a crate-level [`DocleaError`] that wraps them
//! via `#[from]`. Leaf components fail fast with their narrow error type;
//! callers that need to cross a component boundary convert into
//! `DocleaError`. The context builder (§4.L) is the one place that catches
//! leg-level failures instead of propagating them — see
//! [`crate::context::builder`].

use crate::chunking::ChunkError;
use crate::embeddings::EmbedError;
use crate::storage::{MigrationError, StorageError};
use crate::vector::VectorStoreError;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, DocleaError>;

/// Top-level error taxonomy (§7).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DocleaError {
    /// Missing or ill-typed config fields, surfaced at startup.
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    /// Relational or vector store connectivity failed. Retried on the next
    /// request, never retried mid-request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A schema migration failed; fatal for writes until resolved.
    #[error("schema migration to v{version} failed: {cause}")]
    SchemaMigrationFailed {
        version: u32,
        cause: String,
        backup_path: Option<String>,
    },

    /// An embedding call failed. Detection legs degrade to empty; the
    /// context builder annotates the result instead of failing outright.
    #[error("embedding[{provider}] {phase} failed: {status}")]
    EmbedFailure {
        provider: String,
        status: String,
        phase: EmbedPhase,
    },

    /// A vector's length did not match the configured model dimension.
    /// Fatal per call.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    VectorDimensionMismatch { expected: usize, actual: usize },

    /// Requested id absent. Non-fatal, caller-visible.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-key violation (e.g. a duplicate relation). The suggestion
    /// queue drains it rather than failing the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cooperative cancellation. No partial side effects beyond the last
    /// committed transaction.
    #[error("cancelled")]
    Cancelled,

    /// A bounded detection/ingestion queue is full.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Which call phase an embedding failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPhase {
    Single,
    Batch,
}

impl std::fmt::Display for EmbedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedPhase::Single => write!(f, "embed"),
            EmbedPhase::Batch => write!(f, "embed batch"),
        }
    }
}
