//! Embedding provider adapter (§4.A)
//!
//! One [`EmbeddingProvider`] trait, multiple backends dispatched through a
//! single enum (`local-tei`, `openai`, `nomic`, `voyage`, `ollama`, and an
//! in-process `transformers` fallback), plus a [`CachedEmbeddingClient`]
//! wrapper that any provider can sit behind.

mod cache;
mod providers;

pub use cache::CachedEmbeddingClient;
pub use providers::{HttpEmbeddingProvider, OllamaProvider, ProviderKind, TransformersProvider};

use crate::error::EmbedPhase;
use async_trait::async_trait;

/// Narrow error type for the embedding component (§7's `EmbedFailure`).
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding[{provider}] {phase} failed: {status}")]
    Request {
        provider: String,
        status: String,
        phase: EmbedPhase,
    },
    #[error("invalid embedding vector: {0}")]
    InvalidVector(String),
}

pub type Result<T> = std::result::Result<T, EmbedError>;

/// The uniform shape every provider returns, regardless of backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Validates a raw vector against the configured model dimension: non-empty,
/// every component finite, length equal to `expected_dim`. Mismatches are
/// fatal per §4.A ("Vectors are validated ... mismatches are fatal").
pub fn validate_vector(vector: &[f32], expected_dim: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(EmbedError::InvalidVector("empty vector".into()));
    }
    if vector.len() != expected_dim {
        return Err(EmbedError::InvalidVector(format!(
            "expected {expected_dim} dimensions, got {}",
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::InvalidVector("non-finite component".into()));
    }
    Ok(())
}

/// Cosine similarity of two equal-length vectors. Returns `0.0` for
/// mismatched lengths or zero-norm inputs rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// An embedding backend. `embed_batch`'s default emulates batching with
/// sequential `embed` calls — exactly what the `ollama` backend needs
/// (§4.A: "batch is emulated by sequential calls (ollama)"); HTTP batch
/// backends override it with a single request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn validate_vector_rejects_mismatched_dimension() {
        assert!(validate_vector(&[1.0, 2.0], 3).is_err());
    }

    #[test]
    fn validate_vector_rejects_non_finite() {
        assert!(validate_vector(&[1.0, f32::NAN], 2).is_err());
    }

    #[test]
    fn validate_vector_rejects_empty() {
        assert!(validate_vector(&[], 0).is_err());
    }
}
