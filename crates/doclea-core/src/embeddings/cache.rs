//! Content-addressed embedding cache (§4.A: "embeddings are cached by
//! `(contentHash, model)`; a cache hit never calls the provider").

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, Embedding, Result};

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Wraps any [`EmbeddingProvider`] with an in-memory `(contentHash, model)`
/// cache. The in-process map is a convenience layer in front of the
/// relational store's `embedding_cache` table (§3); call sites that need
/// durability persist through [`crate::storage`] directly and populate this
/// cache on load.
pub struct CachedEmbeddingClient<P: EmbeddingProvider> {
    inner: P,
    cache: Mutex<HashMap<(String, String), Embedding>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingClient<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Seeds the cache from a previously persisted entry, e.g. when
    /// rehydrating `embedding_cache` rows at startup.
    pub fn seed(&self, content_hash: String, model: String, embedding: Embedding) {
        self.cache.lock().unwrap().insert((content_hash, model), embedding);
    }

    fn lookup(&self, text: &str) -> Option<Embedding> {
        let key = (content_hash(text), self.inner.model().to_string());
        self.cache.lock().unwrap().get(&key).cloned()
    }

    fn store(&self, text: &str, embedding: &Embedding) {
        let key = (content_hash(text), self.inner.model().to_string());
        self.cache.lock().unwrap().insert(key, embedding.clone());
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingClient<P> {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(hit) = self.lookup(text) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.store(text, &embedding);
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        let mut misses = Vec::new();
        let mut miss_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.lookup(text) {
                Some(hit) => results.push(Some(hit)),
                None => {
                    results.push(None);
                    misses.push(text.clone());
                    miss_indices.push(i);
                }
            }
        }

        if !misses.is_empty() {
            let fetched = self.inner.embed_batch(&misses).await?;
            for (idx, embedding) in miss_indices.into_iter().zip(fetched) {
                self.store(&texts[idx], &embedding);
                results[idx] = Some(embedding);
            }
        }

        Ok(results.into_iter().map(|e| e.expect("filled above")).collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TransformersProvider;

    #[tokio::test]
    async fn cache_hit_returns_identical_vector_without_recompute() {
        let cached = CachedEmbeddingClient::new(TransformersProvider::new(32));
        let first = cached.embed("hello world").await.unwrap();
        let second = cached.embed("hello world").await.unwrap();
        assert_eq!(first.vector, second.vector);
    }

    #[tokio::test]
    async fn cache_distinguishes_distinct_content() {
        let cached = CachedEmbeddingClient::new(TransformersProvider::new(32));
        let a = cached.embed("alpha").await.unwrap();
        let b = cached.embed("beta").await.unwrap();
        assert_ne!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn batch_embed_mixes_cache_hits_and_misses() {
        let cached = CachedEmbeddingClient::new(TransformersProvider::new(32));
        let _ = cached.embed("alpha").await.unwrap();
        let batch = cached
            .embed_batch(&["alpha".to_string(), "gamma".to_string()])
            .await
            .unwrap();
        let direct_alpha = cached.embed("alpha").await.unwrap();
        let direct_gamma = cached.embed("gamma").await.unwrap();
        assert_eq!(batch[0].vector, direct_alpha.vector);
        assert_eq!(batch[1].vector, direct_gamma.vector);
    }
}
