//! MCP server core
//!
//! Routes JSON-RPC requests to the tool dispatcher (§6: "a stable set of
//! named operations"). One `McpServer` per connection, sharing an
//! [`AppState`] across every tool call.

use std::collections::HashMap;
use std::sync::Arc;

use doclea_core::config::Config;
use doclea_core::context::ContextCache;
use doclea_core::decay::DecayConfig;
use doclea_core::embeddings::EmbeddingProvider;
use doclea_core::relations::cross_layer::CrossLayerDetectorConfig;
use doclea_core::relations::memory_memory::RelationDetectorConfig;
use doclea_core::scoring::ScoringConfig;
use doclea_core::staleness::StalenessConfig;
use doclea_core::storage::Storage;
use doclea_core::vector::VectorStore;
use tracing::{debug, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerInfo,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;

/// Everything a tool call needs, shared across the lifetime of a server
/// connection. `embedder`/`vector_store` are trait objects because the
/// concrete backend is chosen once at startup from [`Config`].
pub struct AppState {
    pub storage: Arc<Storage>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub config: Config,
    pub context_cache: Arc<ContextCache>,
    pub scoring: ScoringConfig,
    pub decay: DecayConfig,
    pub staleness: StalenessConfig,
    pub relation_detector: RelationDetectorConfig,
    pub cross_layer_detector: CrossLayerDetectorConfig,
}

pub struct McpServer {
    state: Arc<AppState>,
    initialized: bool,
}

impl McpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, initialized: false }
    }

    /// Handles one JSON-RPC request; `None` means the request was a
    /// notification and no response should be written back.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let negotiated_version =
            if request.protocol_version.as_str() < MCP_VERSION { request.protocol_version.clone() } else { MCP_VERSION.to_string() };

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo { name: "doclea".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "doclea is a persistent retrieval and knowledge-graph service. Use 'store' to save a \
                 memory or document, 'search' to retrieve a token-budgeted context, 'detect_relations' \
                 and 'suggest_crosslayer' to surface connections, and 'graphrag_search' for entity-level \
                 queries over the code/memory graph."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult { tools: tools::list_tools() };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call parameters")),
        };

        let args = request.arguments.unwrap_or(serde_json::Value::Null);
        let result = match tools::dispatch(&request.name, args, &self.state).await {
            Ok(value) => CallToolResult::ok(value),
            Err(tools::ToolError::UnknownTool(name)) => {
                return Err(JsonRpcError::method_not_found_with_message(&format!("unknown tool: {name}")))
            }
            Err(tools::ToolError::InvalidParams(message)) => return Err(JsonRpcError::invalid_params(&message)),
            Err(err) => CallToolResult::failed(&err.to_string()),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}
