//! Configuration document (§6)
//!
//! One JSON document at `<project>/.doclea/config.json`. Every string
//! field accepts `${NAME}` environment-variable interpolation, resolved
//! before [`Config::validate`] runs. Unknown fields are ignored — this is
//! an evolving document, not a trust boundary ([`crate::memory::IngestInput`]
//! is the trust boundary and rejects unknown fields instead).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decay::DecayConfig;
use crate::error::DocleaError;
use crate::scoring::ScoringConfig;
use crate::staleness::StalenessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorProviderKind {
    #[default]
    Embedded,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderName {
    LocalTei,
    OpenAi,
    Nomic,
    Voyage,
    Ollama,
    Transformers,
}

impl Default for EmbeddingProviderName {
    fn default() -> Self {
        EmbeddingProviderName::Transformers
    }
}

impl EmbeddingProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProviderName::LocalTei => "local-tei",
            EmbeddingProviderName::OpenAi => "open-ai",
            EmbeddingProviderName::Nomic => "nomic",
            EmbeddingProviderName::Voyage => "voyage",
            EmbeddingProviderName::Ollama => "ollama",
            EmbeddingProviderName::Transformers => "transformers",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSection {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorSection {
    pub provider: VectorProviderKind,
    pub db_path: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub collection_name: Option<String>,
    pub vector_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSection {
    pub provider: EmbeddingProviderName,
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub cache_dir: Option<String>,
    pub dimensions: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderName::default(),
            endpoint: None,
            model: "transformers-hash-projection".to_string(),
            api_key: None,
            cache_dir: None,
            dimensions: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionSection {
    pub semantic_threshold: Option<f32>,
    pub suggestion_threshold: Option<f32>,
    pub auto_approve_threshold: Option<f32>,
    pub temporal_window_days: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextCacheSection {
    pub max_entries: usize,
    pub ttl_secs: i64,
}

impl Default for ContextCacheSection {
    fn default() -> Self {
        Self { max_entries: 256, ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationsSection {
    pub backup_before_destructive: Option<bool>,
}

/// The full config document; every section round-trips through
/// `config.json` with unrecognized fields ignored (§9: "unknown optional
/// fields are ignored, unknown required fields are rejected").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub storage: StorageSection,
    pub vector: VectorSection,
    pub embedding: EmbeddingSection,
    pub scoring: ScoringConfigDoc,
    pub staleness: StalenessConfigDoc,
    pub detection: DetectionSection,
    pub context_cache: ContextCacheSection,
    pub migrations: MigrationsSection,
}

/// §4.F's scoring config, in the document's plain-field shape. Converts
/// into [`ScoringConfig`] via [`ScoringConfigDoc::resolve`]; boost rules
/// aren't configurable from this document and keep the engine default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfigDoc {
    pub semantic_weight: f32,
    pub recency_weight: f32,
    pub confidence_weight: f32,
    pub frequency_weight: f32,
    pub recency_half_life_days: f32,
    pub decay_enabled: bool,
    pub half_life_days: f32,
}

impl Default for ScoringConfigDoc {
    fn default() -> Self {
        let defaults = ScoringConfig::default();
        Self {
            semantic_weight: defaults.weights.semantic,
            recency_weight: defaults.weights.recency,
            confidence_weight: defaults.weights.confidence,
            frequency_weight: defaults.weights.frequency,
            recency_half_life_days: defaults.recency_half_life_days,
            decay_enabled: defaults.decay_enabled,
            half_life_days: defaults.decay.half_life_secs as f32 / 86_400.0,
        }
    }
}

impl ScoringConfigDoc {
    pub fn resolve(&self) -> ScoringConfig {
        let mut config = ScoringConfig {
            weights: crate::scoring::Weights {
                semantic: self.semantic_weight,
                recency: self.recency_weight,
                confidence: self.confidence_weight,
                frequency: self.frequency_weight,
            },
            recency_half_life_days: self.recency_half_life_days,
            decay_enabled: self.decay_enabled,
            ..ScoringConfig::default()
        };
        config.decay = DecayConfig { half_life_secs: (self.half_life_days * 86_400.0) as i64, ..config.decay };
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StalenessConfigDoc {
    pub time_decay_threshold_days: f32,
    pub fresh_threshold: f32,
    pub stale_threshold: f32,
}

impl Default for StalenessConfigDoc {
    fn default() -> Self {
        let defaults = StalenessConfig::default();
        Self {
            time_decay_threshold_days: defaults.time_decay_threshold_days,
            fresh_threshold: defaults.fresh_threshold,
            stale_threshold: defaults.stale_threshold,
        }
    }
}

impl StalenessConfigDoc {
    pub fn resolve(&self) -> StalenessConfig {
        StalenessConfig {
            time_decay_threshold_days: self.time_decay_threshold_days,
            fresh_threshold: self.fresh_threshold,
            stale_threshold: self.stale_threshold,
            ..StalenessConfig::default()
        }
    }
}

/// Replaces every `${NAME}` occurrence in `value` with the environment
/// variable of the same name, leaving the placeholder untouched if the
/// variable isn't set (resolved at load time, not parse time, so a
/// missing variable surfaces as a normal `ConfigInvalid` during
/// [`Config::validate`] rather than a silent empty string).
fn interpolate(value: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '$' && value[i..].starts_with("${") {
            if let Some(end) = value[i + 2..].find('}') {
                let name = &value[i + 2..i + 2 + end];
                match env.get(name) {
                    Some(v) => out.push_str(v),
                    None => out.push_str(&value[i..i + 2 + end + 1]),
                }
                for _ in 0..(end + 2) {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn interpolate_opt(value: &Option<String>, env: &HashMap<String, String>) -> Option<String> {
    value.as_ref().map(|v| interpolate(v, env))
}

impl Config {
    /// Parses a config document from JSON text.
    pub fn parse(text: &str) -> Result<Self, DocleaError> {
        serde_json::from_str(text).map_err(|e| DocleaError::ConfigInvalid(e.to_string()))
    }

    /// Resolves every `${NAME}` placeholder against `env` (callers pass
    /// `std::env::vars().collect()` in production, a fixed map in tests).
    pub fn interpolate(&mut self, env: &HashMap<String, String>) {
        self.storage.db_path = interpolate_opt(&self.storage.db_path, env);
        self.vector.db_path = interpolate_opt(&self.vector.db_path, env);
        self.vector.url = interpolate_opt(&self.vector.url, env);
        self.vector.api_key = interpolate_opt(&self.vector.api_key, env);
        self.vector.collection_name = interpolate_opt(&self.vector.collection_name, env);
        self.embedding.endpoint = interpolate_opt(&self.embedding.endpoint, env);
        self.embedding.api_key = interpolate_opt(&self.embedding.api_key, env);
        self.embedding.cache_dir = interpolate_opt(&self.embedding.cache_dir, env);
        self.embedding.model = interpolate(&self.embedding.model, env);
    }

    /// Rejects config that would fail at the first real call rather than
    /// at startup (§7: `ConfigInvalid` "surfaced at startup").
    pub fn validate(&self) -> Result<(), DocleaError> {
        if self.vector.provider == VectorProviderKind::Remote && self.vector.url.is_none() {
            return Err(DocleaError::ConfigInvalid("vector.url is required when vector.provider = remote".to_string()));
        }
        if matches!(
            self.embedding.provider,
            EmbeddingProviderName::OpenAi | EmbeddingProviderName::Nomic | EmbeddingProviderName::Voyage | EmbeddingProviderName::LocalTei
        ) && self.embedding.api_key.is_none()
            && self.embedding.endpoint.is_none()
        {
            return Err(DocleaError::ConfigInvalid(format!(
                "embedding.endpoint or embedding.apiKey is required for provider {:?}",
                self.embedding.provider
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(DocleaError::ConfigInvalid("embedding.dimensions must be > 0".to_string()));
        }
        if self.context_cache.max_entries == 0 {
            return Err(DocleaError::ConfigInvalid("contextCache.maxEntries must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_optional_fields_are_ignored() {
        let config = Config::parse(r#"{"storage": {"dbPath": "x.db", "extraField": 1}}"#).unwrap();
        assert_eq!(config.storage.db_path.as_deref(), Some("x.db"));
    }

    #[test]
    fn interpolates_env_vars_in_place() {
        let mut config = Config::default();
        config.vector.url = Some("${QDRANT_URL}/collections".to_string());
        let mut env = HashMap::new();
        env.insert("QDRANT_URL".to_string(), "https://vectors.local".to_string());
        config.interpolate(&env);
        assert_eq!(config.vector.url.as_deref(), Some("https://vectors.local/collections"));
    }

    #[test]
    fn missing_env_var_leaves_placeholder_untouched() {
        let mut config = Config::default();
        config.vector.url = Some("${MISSING}".to_string());
        config.interpolate(&HashMap::new());
        assert_eq!(config.vector.url.as_deref(), Some("${MISSING}"));
    }

    #[test]
    fn remote_vector_provider_without_url_is_invalid() {
        let mut config = Config::default();
        config.vector.provider = VectorProviderKind::Remote;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn scoring_doc_round_trips_through_resolve() {
        let doc = ScoringConfigDoc { semantic_weight: 0.7, ..ScoringConfigDoc::default() };
        let resolved = doc.resolve();
        assert_eq!(resolved.weights.semantic, 0.7);
    }
}
