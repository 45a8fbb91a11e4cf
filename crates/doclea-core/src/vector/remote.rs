//! Remote vector store: a typed REST client speaking a Qdrant-like
//! `{must:[{key,match|range}]}` filter shape (§4.B).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{CollectionInfo, FilterClause, Result, ScoredPoint, VectorFilter, VectorPayload, VectorStore, VectorStoreError};

pub struct RemoteVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    dimensions: usize,
}

impl RemoteVectorStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
            api_key,
            dimensions,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/collections/{}{}", self.base_url, self.collection, path);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn build_filter(filter: &VectorFilter) -> serde_json::Value {
        let must: Vec<serde_json::Value> = filter
            .must
            .iter()
            .map(|clause| match clause {
                FilterClause::MatchType(t) => json!({"key": "type", "match": {"value": t}}),
                FilterClause::MatchTag(tag) => json!({"key": "tags", "match": {"value": tag}}),
                FilterClause::MatchFile(file) => json!({"key": "relatedFiles", "match": {"value": file}}),
                FilterClause::MinImportance(min) => json!({"key": "importance", "range": {"gte": min}}),
            })
            .collect();
        json!({ "must": must })
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

#[derive(Debug, Serialize)]
struct UpsertPoint {
    id: String,
    vector: Vec<f32>,
    payload: VectorPayload,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    filter: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    score: f32,
    payload: VectorPayload,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfoResult,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResult {
    vectors_count: usize,
}

#[async_trait]
impl VectorStore for RemoteVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: VectorPayload) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        let body = UpsertRequest {
            points: vec![UpsertPoint {
                id: id.to_string(),
                vector,
                payload,
            }],
        };
        let response = self
            .request(reqwest::Method::PUT, "/points")
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Unavailable(response.status().to_string()));
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize, filter: &VectorFilter) -> Result<Vec<ScoredPoint>> {
        if query.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let body = SearchRequest {
            vector: query.to_vec(),
            limit,
            filter: Self::build_filter(filter),
        };
        let response = self
            .request(reqwest::Method::POST, "/points/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Unavailable(response.status().to_string()));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        Ok(parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: hit.id,
                score: hit.score,
                payload: hit.payload,
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let body = json!({ "points": [id] });
        let response = self
            .request(reqwest::Method::POST, "/points/delete")
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Unavailable(response.status().to_string()));
        }
        Ok(())
    }

    async fn delete_by_memory_id(&self, memory_id: &str) -> Result<usize> {
        let body = json!({
            "filter": { "must": [{"key": "memoryId", "match": {"value": memory_id}}] }
        });
        let response = self
            .request(reqwest::Method::POST, "/points/delete")
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Unavailable(response.status().to_string()));
        }
        // The server reports how many points matched; without a response
        // body contract we conservatively report zero and let the caller
        // re-query if it needs an exact count.
        Ok(0)
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let response = self
            .request(reqwest::Method::GET, "")
            .send()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorStoreError::Unavailable(response.status().to_string()));
        }
        let parsed: CollectionInfoResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        Ok(CollectionInfo {
            vector_count: parsed.result.vectors_count,
            dimensions: self.dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_filter_translates_every_clause_kind() {
        let filter = VectorFilter {
            must: vec![
                FilterClause::MatchType("decision".to_string()),
                FilterClause::MinImportance(0.5),
            ],
        };
        let json = RemoteVectorStore::build_filter(&filter);
        assert_eq!(json["must"].as_array().unwrap().len(), 2);
    }
}
