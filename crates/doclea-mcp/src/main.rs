//! doclea MCP server entry point
//!
//! Resolves the on-disk [`Config`] document, wires up the configured
//! embedding/vector backends, and serves JSON-RPC over stdio (§6).

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use doclea_core::config::{Config, EmbeddingProviderName, VectorProviderKind};
use doclea_core::context::ContextCache;
use doclea_core::embeddings::{
    CachedEmbeddingClient, EmbeddingProvider, HttpEmbeddingProvider, OllamaProvider, ProviderKind, TransformersProvider,
};
use doclea_core::relations::cross_layer::CrossLayerDetectorConfig;
use doclea_core::relations::memory_memory::RelationDetectorConfig;
use doclea_core::storage::Storage;
use doclea_core::vector::{EmbeddedVectorStore, RemoteVectorStore, VectorStore};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::protocol::stdio::StdioTransport;
use crate::server::{AppState, McpServer};

#[derive(Debug, Parser)]
#[command(name = "doclea-mcp", version, about = "Persistent retrieval and knowledge-graph MCP server")]
struct Cli {
    /// Directory holding doclea.db, config.json and the vector store. Defaults to
    /// the platform project-data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn load_config(data_dir: &std::path::Path) -> Config {
    let config_path = data_dir.join("config.json");
    let mut config = match std::fs::read_to_string(&config_path) {
        Ok(text) => match Config::parse(&text) {
            Ok(c) => c,
            Err(e) => {
                error!("invalid config at {}: {e}", config_path.display());
                std::process::exit(1);
            }
        },
        Err(_) => {
            info!("no config.json at {}, using defaults", config_path.display());
            Config::default()
        }
    };
    config.interpolate(&std::env::vars().collect());
    if let Err(e) = config.validate() {
        error!("config validation failed: {e}");
        std::process::exit(1);
    }
    config
}

fn build_embedder(config: &Config) -> Arc<dyn EmbeddingProvider> {
    let dimensions = config.embedding.dimensions;
    let model = config.embedding.model.clone();
    let endpoint = config.embedding.endpoint.clone().unwrap_or_default();
    let api_key = config.embedding.api_key.clone().unwrap_or_default();

    match config.embedding.provider {
        EmbeddingProviderName::Transformers => Arc::new(CachedEmbeddingClient::new(TransformersProvider::new(dimensions))),
        EmbeddingProviderName::Ollama => Arc::new(CachedEmbeddingClient::new(OllamaProvider::new(endpoint, model, dimensions))),
        EmbeddingProviderName::OpenAi => {
            Arc::new(CachedEmbeddingClient::new(HttpEmbeddingProvider::new(ProviderKind::OpenAi, endpoint, api_key, model, dimensions)))
        }
        EmbeddingProviderName::Nomic => {
            Arc::new(CachedEmbeddingClient::new(HttpEmbeddingProvider::new(ProviderKind::Nomic, endpoint, api_key, model, dimensions)))
        }
        EmbeddingProviderName::Voyage => {
            Arc::new(CachedEmbeddingClient::new(HttpEmbeddingProvider::new(ProviderKind::Voyage, endpoint, api_key, model, dimensions)))
        }
        EmbeddingProviderName::LocalTei => {
            Arc::new(CachedEmbeddingClient::new(HttpEmbeddingProvider::new(ProviderKind::LocalTei, endpoint, api_key, model, dimensions)))
        }
    }
}

fn build_vector_store(config: &Config, data_dir: &std::path::Path) -> Arc<dyn VectorStore> {
    let dimensions = config.vector.vector_size.unwrap_or(config.embedding.dimensions);

    match config.vector.provider {
        VectorProviderKind::Remote => {
            let url = config.vector.url.clone().expect("validated at startup");
            let collection = config.vector.collection_name.clone().unwrap_or_else(|| "doclea".to_string());
            Arc::new(RemoteVectorStore::new(url, collection, config.vector.api_key.clone(), dimensions))
        }
        VectorProviderKind::Embedded => {
            let path = config
                .vector
                .db_path
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("vectors.db"));
            let conn = rusqlite::Connection::open(&path).unwrap_or_else(|e| {
                error!("failed to open vector store at {}: {e}", path.display());
                std::process::exit(1);
            });
            let store = EmbeddedVectorStore::new(conn, dimensions).unwrap_or_else(|e| {
                error!("failed to initialize vector store: {e}");
                std::process::exit(1);
            });
            Arc::new(store)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("doclea MCP server v{} starting", env!("CARGO_PKG_VERSION"));

    let data_dir = match cli.data_dir {
        Some(p) => p,
        None => match directories::ProjectDirs::from("ai", "doclea", "doclea") {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => {
                error!("could not determine a project data directory; pass --data-dir");
                std::process::exit(1);
            }
        },
    };
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("failed to create data directory {}: {e}", data_dir.display());
        std::process::exit(1);
    }

    let config = load_config(&data_dir);

    let db_path = config.storage.db_path.clone().map(PathBuf::from).unwrap_or_else(|| data_dir.join("doclea.db"));
    let storage = match Storage::open(Some(db_path.clone())) {
        Ok(s) => {
            info!("storage opened at {}", db_path.display());
            Arc::new(s)
        }
        Err(e) => {
            error!("failed to open storage: {e}");
            std::process::exit(1);
        }
    };

    let embedder = build_embedder(&config);
    info!(provider = ?config.embedding.provider, model = embedder.model(), "embedding provider ready");

    let vector_store = build_vector_store(&config, &data_dir);

    let context_cache = Arc::new(ContextCache::new(config.context_cache.max_entries, config.context_cache.ttl_secs));

    let scoring = config.scoring.resolve();
    let decay = scoring.decay.clone();
    let staleness = config.staleness.resolve();

    let relation_detector = RelationDetectorConfig {
        semantic_threshold: config.detection.semantic_threshold.unwrap_or_else(|| RelationDetectorConfig::default().semantic_threshold),
        suggestion_threshold: config
            .detection
            .suggestion_threshold
            .unwrap_or_else(|| RelationDetectorConfig::default().suggestion_threshold),
        auto_approve_threshold: config
            .detection
            .auto_approve_threshold
            .unwrap_or_else(|| RelationDetectorConfig::default().auto_approve_threshold),
        temporal_window_days: config
            .detection
            .temporal_window_days
            .unwrap_or_else(|| RelationDetectorConfig::default().temporal_window_days),
        ..RelationDetectorConfig::default()
    };

    let cross_layer_detector = CrossLayerDetectorConfig {
        suggestion_threshold: config
            .detection
            .suggestion_threshold
            .unwrap_or_else(|| CrossLayerDetectorConfig::default().suggestion_threshold),
        auto_approve_threshold: config
            .detection
            .auto_approve_threshold
            .unwrap_or_else(|| CrossLayerDetectorConfig::default().auto_approve_threshold),
    };

    let state = Arc::new(AppState {
        storage,
        embedder,
        vector_store,
        config,
        context_cache,
        scoring,
        decay,
        staleness,
        relation_detector,
        cross_layer_detector,
    });

    let server = McpServer::new(state);
    let transport = StdioTransport::new();

    info!("serving MCP over stdio");
    if let Err(e) = transport.run(server).await {
        error!("server error: {e}");
        std::process::exit(1);
    }

    warn!("doclea MCP server shutting down");
}
