//! Provider backends behind the [`EmbeddingProvider`] trait (§4.A).
//!
//! `openai`, `nomic`, `voyage` and `local-tei` share one HTTP shape
//! (`POST {endpoint}` with a bearer token and a JSON body, response holding
//! `data[].embedding`) and are all served by [`HttpEmbeddingProvider`] with a
//! per-kind request/response adapter. `ollama` uses its own single-text
//! endpoint and emulates batch by calling it sequentially. `transformers`
//! never leaves the process: it hashes tokens into a fixed-width vector and
//! L2-normalizes, which keeps retrieval deterministic in tests and when no
//! model server is reachable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{validate_vector, EmbedError, Embedding, EmbeddingProvider, Result};
use crate::error::EmbedPhase;

/// Which HTTP-shaped backend a [`HttpEmbeddingProvider`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Nomic,
    Voyage,
    LocalTei,
}

impl ProviderKind {
    fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Nomic => "nomic",
            ProviderKind::Voyage => "voyage",
            ProviderKind::LocalTei => "local-tei",
        }
    }

    /// OpenAI/Nomic/local-tei share the `{input: [...]}` request shape;
    /// Voyage uses `{input: [...], model}` with the model always present.
    fn request_body(&self, texts: &[String], model: &str) -> serde_json::Value {
        match self {
            ProviderKind::OpenAi | ProviderKind::Nomic | ProviderKind::LocalTei => json!({
                "input": texts,
                "model": model,
            }),
            ProviderKind::Voyage => json!({
                "input": texts,
                "model": model,
                "input_type": "document",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStyleResponse {
    data: Vec<OpenAiStyleDatum>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStyleDatum {
    embedding: Vec<f32>,
}

/// Shared implementation for every bearer-token, JSON-body, `reqwest`-backed
/// embedding API (§4.A ambient stack note).
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        kind: ProviderKind,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            kind,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        }
    }

    async fn call(&self, texts: &[String], phase: EmbedPhase) -> Result<Vec<Embedding>> {
        let body = self.kind.request_body(texts, &self.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Request {
                provider: self.kind.name().to_string(),
                status: e.to_string(),
                phase,
            })?;

        if !response.status().is_success() {
            return Err(EmbedError::Request {
                provider: self.kind.name().to_string(),
                status: response.status().to_string(),
                phase,
            });
        }

        let parsed: OpenAiStyleResponse = response.json().await.map_err(|e| EmbedError::Request {
            provider: self.kind.name().to_string(),
            status: e.to_string(),
            phase,
        })?;

        parsed
            .data
            .into_iter()
            .map(|d| {
                validate_vector(&d.embedding, self.dimensions)?;
                Ok(Embedding {
                    vector: d.embedding,
                    model: self.model.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let texts = [text.to_string()];
        let mut out = self.call(&texts, EmbedPhase::Single).await?;
        out.pop().ok_or_else(|| EmbedError::Request {
            provider: self.kind.name().to_string(),
            status: "empty response".into(),
            phase: EmbedPhase::Single,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.call(texts, EmbedPhase::Batch).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

/// Ollama's local `/api/embeddings` endpoint takes one prompt per request;
/// there is no batch endpoint, so `embed_batch` falls back to the trait's
/// default sequential loop.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OllamaProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| EmbedError::Request {
                provider: "ollama".to_string(),
                status: e.to_string(),
                phase: EmbedPhase::Single,
            })?;

        if !response.status().is_success() {
            return Err(EmbedError::Request {
                provider: "ollama".to_string(),
                status: response.status().to_string(),
                phase: EmbedPhase::Single,
            });
        }

        let parsed: OllamaResponse = response.json().await.map_err(|e| EmbedError::Request {
            provider: "ollama".to_string(),
            status: e.to_string(),
            phase: EmbedPhase::Single,
        })?;

        validate_vector(&parsed.embedding, self.dimensions)?;
        Ok(Embedding {
            vector: parsed.embedding,
            model: self.model.clone(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Deterministic in-process fallback: hash each whitespace token into a
/// bucket of a fixed-width vector, accumulate, L2-normalize. Never calls out
/// to the network, so it is also what the quality gate (§4.M) uses to
/// produce reproducible golden-query embeddings.
pub struct TransformersProvider {
    dimensions: usize,
    model: String,
}

impl TransformersProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: "transformers-hash-projection".to_string(),
        }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let bucket = (fnv1a(token.as_bytes()) as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for TransformersProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let vector = self.project(text);
        if vector.iter().all(|v| *v == 0.0) {
            // An empty or all-whitespace text still needs a unit vector:
            // project a sentinel token instead of returning an all-zero one.
            let vector = self.project("\u{0}empty");
            return Ok(Embedding {
                vector,
                model: self.model.clone(),
            });
        }
        Ok(Embedding {
            vector,
            model: self.model.clone(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transformers_embed_is_deterministic() {
        let provider = TransformersProvider::new(64);
        let a = provider.embed("fn parse_config").await.unwrap();
        let b = provider.embed("fn parse_config").await.unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn transformers_embed_is_unit_length() {
        let provider = TransformersProvider::new(64);
        let e = provider.embed("a distinctive phrase about storage").await.unwrap();
        let norm: f32 = e.vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn transformers_embed_handles_empty_text() {
        let provider = TransformersProvider::new(32);
        let e = provider.embed("").await.unwrap();
        assert_eq!(e.dimensions(), 32);
    }

    #[tokio::test]
    async fn transformers_batch_matches_sequential_embed() {
        let provider = TransformersProvider::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        let single_a = provider.embed("alpha").await.unwrap();
        let single_b = provider.embed("beta").await.unwrap();
        assert_eq!(batch[0].vector, single_a.vector);
        assert_eq!(batch[1].vector, single_b.vector);
    }
}
