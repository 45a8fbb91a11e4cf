//! Tool dispatcher (§6 tool surface)
//!
//! One named operation per spec §6: `store`, `search`, `get`, `update`,
//! `delete`, `init`, `detect_relations`, `get_suggestions`,
//! `review_suggestion`, `bulk_review`, `suggest_relations`,
//! `suggest_crosslayer`, `get_crosslayer_suggestions`, `review_crosslayer`,
//! `bulk_review_crosslayer`, `refresh_confidence`, `graphrag_search`,
//! `changelog`, `commit_message`, `pr_description`, `suggest_reviewers`,
//! `export`, `import`. Each deserializes its own typed params from the
//! tool call's `arguments` object and returns a JSON result.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use doclea_core::backup::{self, ConflictStrategy, ExportDocument};
use doclea_core::chunking::chunk_markdown;
use doclea_core::codegraph::{map_symbol_index, SymbolIndex};
use doclea_core::context::{ContextFilters, ContextQuery, ContextTemplate};
use doclea_core::decay;
use doclea_core::graphrag::{self, GraphRagQuery, GraphRagResult, SearchMode};
use doclea_core::memory::{Chunk, IngestInput, MemoryType};
use doclea_core::relations::{cross_layer, memory_memory};
use doclea_core::vector::{PointKind, VectorPayload};
use doclea_core::DocleaError;

use crate::protocol::messages::ToolDescription;
use crate::server::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Core(#[from] DocleaError),
    #[error("'{0}' is out of scope for this server — it belongs to a git-porcelain collaborator, not the retrieval engine")]
    Unsupported(&'static str),
}

fn params<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn list_tools() -> Vec<ToolDescription> {
    let names: &[(&str, &str)] = &[
        ("store", "Stores a memory or, with kind=\"document\", chunks and stores a markdown document."),
        ("search", "Builds a token-budgeted context block from semantic, code-graph and GraphRAG legs."),
        ("get", "Fetches one memory by id."),
        ("update", "Updates a memory's fields in place."),
        ("delete", "Deletes a memory by id."),
        ("init", "Ingests a compiler-accurate symbol-index document into the code graph."),
        ("detect_relations", "Runs the memory\u{2194}memory relation detector against a source memory."),
        ("get_suggestions", "Lists pending memory\u{2194}memory relation suggestions."),
        ("review_suggestion", "Approves or rejects one pending relation suggestion."),
        ("bulk_review", "Approves or rejects a batch of pending relation suggestions."),
        ("suggest_relations", "Alias of detect_relations — self-persists materialized and pending relations."),
        ("suggest_crosslayer", "Runs the memory\u{2194}code cross-layer detector."),
        ("get_crosslayer_suggestions", "Lists pending cross-layer suggestions for a memory or code node."),
        ("review_crosslayer", "Approves or rejects one pending cross-layer suggestion."),
        ("bulk_review_crosslayer", "Approves or rejects a batch of pending cross-layer suggestions."),
        ("refresh_confidence", "Resets a memory's decay anchor and optionally bumps its importance."),
        ("graphrag_search", "Local or global GraphRAG search over the entity/community graph."),
        ("changelog", "Out of scope — git history is not tracked by this service."),
        ("commit_message", "Out of scope — not a git-porcelain collaborator."),
        ("pr_description", "Out of scope — not a git-porcelain collaborator."),
        ("suggest_reviewers", "Out of scope — not a git-porcelain collaborator."),
        ("export", "Exports every memory, document, chunk, relation and pending suggestion as one JSON document."),
        ("import", "Restores an export document under a chosen conflict strategy."),
    ];
    names
        .iter()
        .map(|(name, description)| ToolDescription {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema(serde_json::json!({}), &[]),
        })
        .collect()
}

pub async fn dispatch(name: &str, args: Value, state: &AppState) -> Result<Value, ToolError> {
    match name {
        "store" => store(args, state).await,
        "search" => search(args, state).await,
        "get" => get(args, state).await,
        "update" => update(args, state).await,
        "delete" => delete(args, state).await,
        "init" => init(args, state).await,
        "detect_relations" | "suggest_relations" => detect_relations(args, state).await,
        "get_suggestions" => get_suggestions(args, state).await,
        "review_suggestion" => review_suggestion(args, state).await,
        "bulk_review" => bulk_review(args, state).await,
        "suggest_crosslayer" => suggest_crosslayer(args, state).await,
        "get_crosslayer_suggestions" => get_crosslayer_suggestions(args, state).await,
        "review_crosslayer" => review_crosslayer(args, state).await,
        "bulk_review_crosslayer" => bulk_review_crosslayer(args, state).await,
        "refresh_confidence" => refresh_confidence(args, state).await,
        "graphrag_search" => graphrag_search(args, state).await,
        "export" => export(args, state).await,
        "import" => import(args, state).await,
        "changelog" => Err(ToolError::Unsupported("changelog")),
        "commit_message" => Err(ToolError::Unsupported("commit_message")),
        "pr_description" => Err(ToolError::Unsupported("pr_description")),
        "suggest_reviewers" => Err(ToolError::Unsupported("suggest_reviewers")),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

// ---------------------------------------------------------------------
// store / get / update / delete
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreParams {
    #[serde(default)]
    kind: StoreKind,
    #[serde(default)]
    memory_type: MemoryType,
    #[serde(default)]
    title: String,
    content: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default = "default_importance")]
    importance: f32,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    related_files: Vec<String>,
    #[serde(default)]
    git_commit: Option<String>,
    #[serde(default)]
    source_pr: Option<String>,
    #[serde(default)]
    experts: BTreeSet<String>,
}

fn default_importance() -> f32 {
    0.5
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    #[default]
    Memory,
    Document,
}

async fn store(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: StoreParams = params(args)?;
    let now = now();

    match p.kind {
        StoreKind::Memory => {
            let input = IngestInput {
                memory_type: p.memory_type,
                title: p.title,
                content: p.content,
                summary: p.summary,
                importance: p.importance,
                tags: p.tags,
                related_files: p.related_files,
                git_commit: p.git_commit,
                source_pr: p.source_pr,
                experts: p.experts,
            };
            let mut memory = state.storage.store_memory(input, now).map_err(DocleaError::from)?;
            let embedding = state.embedder.embed(&memory.content).await.map_err(DocleaError::from)?;
            let vector_id = Uuid::new_v4().to_string();
            state
                .vector_store
                .upsert(
                    &vector_id,
                    embedding.vector,
                    VectorPayload {
                        memory_id: Some(memory.id.clone()),
                        kind: Some(PointKind::Memory),
                        r#type: Some(memory.memory_type.as_str().to_string()),
                        tags: memory.tags.iter().cloned().collect(),
                        related_files: memory.related_files.clone(),
                        importance: memory.importance,
                    },
                )
                .await
                .map_err(DocleaError::from)?;
            memory.vector_id = Some(vector_id);
            state.storage.update_memory(&memory).map_err(DocleaError::from)?;
            Ok(serde_json::to_value(memory).unwrap())
        }
        StoreKind::Document => {
            let raw_chunks = chunk_markdown(&p.content, 400).map_err(DocleaError::from)?;
            let mut chunks = Vec::with_capacity(raw_chunks.len());
            for raw in raw_chunks {
                let embedding = state.embedder.embed(&raw.content).await.map_err(DocleaError::from)?;
                let vector_id = Uuid::new_v4().to_string();
                state.vector_store.upsert(&vector_id, embedding.vector, VectorPayload::default()).await.map_err(DocleaError::from)?;
                chunks.push(Chunk {
                    id: String::new(),
                    document_id: String::new(),
                    content: raw.content,
                    token_count: raw.token_count,
                    vector_id: Some(vector_id),
                    start_offset: raw.start_offset,
                    end_offset: raw.end_offset,
                    metadata: raw.metadata,
                });
            }
            let (document, stored_chunks) = state.storage.store_document(&p.title, &p.content, chunks, now).map_err(DocleaError::from)?;
            Ok(serde_json::json!({ "document": document, "chunks": stored_chunks }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

async fn get(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: IdParams = params(args)?;
    let memory = state.storage.get_memory(&p.id).map_err(DocleaError::from)?;
    Ok(serde_json::to_value(memory).unwrap())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    importance: Option<f32>,
    #[serde(default)]
    tags: Option<BTreeSet<String>>,
    #[serde(default)]
    related_files: Option<Vec<String>>,
    #[serde(default)]
    reembed: bool,
}

async fn update(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: UpdateParams = params(args)?;
    let mut memory = state.storage.get_memory(&p.id).map_err(DocleaError::from)?;

    if let Some(title) = p.title {
        memory.title = title;
    }
    let content_changed = p.content.is_some();
    if let Some(content) = p.content {
        memory.content = content;
    }
    if let Some(summary) = p.summary {
        memory.summary = Some(summary);
    }
    if let Some(importance) = p.importance {
        memory.importance = importance.clamp(0.0, 1.0);
    }
    if let Some(tags) = p.tags {
        memory.tags = tags;
    }
    if let Some(related_files) = p.related_files {
        memory.related_files = related_files;
    }

    if p.reembed || content_changed {
        let embedding = state.embedder.embed(&memory.content).await.map_err(DocleaError::from)?;
        let vector_id = Uuid::new_v4().to_string();
        state
            .vector_store
            .upsert(
                &vector_id,
                embedding.vector,
                VectorPayload {
                    memory_id: Some(memory.id.clone()),
                    kind: Some(PointKind::Memory),
                    r#type: Some(memory.memory_type.as_str().to_string()),
                    tags: memory.tags.iter().cloned().collect(),
                    related_files: memory.related_files.clone(),
                    importance: memory.importance,
                },
            )
            .await
            .map_err(DocleaError::from)?;
        memory.vector_id = Some(vector_id);
    }

    state.storage.update_memory(&memory).map_err(DocleaError::from)?;
    Ok(serde_json::to_value(memory).unwrap())
}

async fn delete(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: IdParams = params(args)?;
    state.storage.delete_memory(&p.id).map_err(DocleaError::from)?;
    state.vector_store.delete_by_memory_id(&p.id).await.map_err(DocleaError::from)?;
    Ok(serde_json::json!({ "deleted": p.id }))
}

// ---------------------------------------------------------------------
// search
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    query: String,
    #[serde(default = "default_token_budget")]
    token_budget: usize,
    #[serde(default = "default_true")]
    include_code_graph: bool,
    #[serde(default)]
    include_graphrag: bool,
    #[serde(default)]
    include_evidence: bool,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_token_budget() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    10
}

async fn search(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: SearchParams = params(args)?;
    let query = ContextQuery {
        query: p.query,
        token_budget: p.token_budget,
        include_code_graph: p.include_code_graph,
        include_graphrag: p.include_graphrag,
        include_evidence: p.include_evidence,
        template: ContextTemplate::Default,
        filters: ContextFilters::default(),
        graphrag_mode: SearchMode::Local,
        limit: p.limit,
    };
    let result = doclea_core::context::get_or_build(
        &state.context_cache,
        &state.storage,
        state.vector_store.as_ref(),
        state.embedder.as_ref(),
        &query,
        &state.scoring,
        now(),
    )
    .await
    .map_err(DocleaError::from)?;
    Ok(serde_json::json!({
        "context": result.context,
        "sectionsIncluded": result.sections_included,
        "ragSections": result.rag_sections,
        "kagSections": result.kag_sections,
        "graphragSections": result.graphrag_sections,
        "tokens": result.tokens,
        "cacheHit": result.cache_hit,
    }))
}

// ---------------------------------------------------------------------
// init — code-graph ingestion
// ---------------------------------------------------------------------

async fn init(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let index: SymbolIndex = params(args)?;
    let mapped = map_symbol_index(&index, now());
    let mut files = Vec::with_capacity(mapped.len());
    let mut node_count = 0;
    let mut edge_count = 0;
    for doc in mapped {
        node_count += doc.nodes.len();
        edge_count += doc.edges.len();
        state.storage.replace_code_graph_for_file(&doc.file_path, doc.nodes, doc.edges).map_err(DocleaError::from)?;
        files.push(doc.file_path);
    }
    Ok(serde_json::json!({ "filesIngested": files, "nodes": node_count, "edges": edge_count }))
}

// ---------------------------------------------------------------------
// memory<->memory relation detection + suggestion review
// ---------------------------------------------------------------------

async fn detect_relations(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: IdParams = params(args)?;
    let memory = state.storage.get_memory(&p.id).map_err(DocleaError::from)?;
    let outcome = memory_memory::detect_memory_relations(
        &state.storage,
        state.embedder.as_ref(),
        state.vector_store.as_ref(),
        &memory,
        &state.relation_detector,
        now(),
    )
    .await
    .map_err(DocleaError::from)?;
    Ok(serde_json::json!({ "materialized": outcome.materialized, "suggested": outcome.suggested }))
}

async fn get_suggestions(_args: Value, state: &AppState) -> Result<Value, ToolError> {
    let suggestions = state.storage.list_pending_relation_suggestions().map_err(DocleaError::from)?;
    Ok(serde_json::to_value(suggestions).unwrap())
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    id: String,
    approve: bool,
}

async fn review_suggestion(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: ReviewParams = params(args)?;
    let relation = state.storage.review_relation_suggestion(&p.id, p.approve, now()).map_err(DocleaError::from)?;
    Ok(serde_json::json!({ "relation": relation }))
}

#[derive(Debug, Deserialize)]
struct BulkReviewParams {
    ids: Vec<String>,
    approve: bool,
}

async fn bulk_review(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: BulkReviewParams = params(args)?;
    let now = now();
    let mut relations = Vec::new();
    for id in &p.ids {
        if let Some(relation) = state.storage.review_relation_suggestion(id, p.approve, now).map_err(DocleaError::from)? {
            relations.push(relation);
        }
    }
    Ok(serde_json::json!({ "reviewed": p.ids.len(), "relations": relations }))
}

// ---------------------------------------------------------------------
// cross-layer (memory<->code) detection + suggestion review
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrossLayerSourceParams {
    #[serde(default)]
    memory_id: Option<String>,
    #[serde(default)]
    code_node_id: Option<String>,
}

async fn suggest_crosslayer(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: CrossLayerSourceParams = params(args)?;
    let now = now();
    let outcome = match (p.memory_id, p.code_node_id) {
        (Some(memory_id), None) => {
            let memory = state.storage.get_memory(&memory_id).map_err(DocleaError::from)?;
            cross_layer::detect_cross_layer_from_memory(&state.storage, &memory, &state.cross_layer_detector, now)
                .await
                .map_err(DocleaError::from)?
        }
        (None, Some(code_node_id)) => {
            let node = state.storage.get_code_node(&code_node_id).map_err(DocleaError::from)?;
            cross_layer::detect_cross_layer_from_code(&state.storage, &node, &state.cross_layer_detector, now)
                .await
                .map_err(DocleaError::from)?
        }
        _ => return Err(ToolError::InvalidParams("exactly one of memoryId/codeNodeId is required".to_string())),
    };
    Ok(serde_json::json!({ "materialized": outcome.materialized, "suggested": outcome.suggested }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrossLayerSuggestionsParams {
    #[serde(default)]
    memory_id: Option<String>,
    #[serde(default)]
    code_node_id: Option<String>,
}

async fn get_crosslayer_suggestions(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: CrossLayerSuggestionsParams = params(args)?;
    let pending = state.storage.list_pending_cross_layer_suggestions().map_err(DocleaError::from)?;
    let filtered: Vec<_> = pending
        .into_iter()
        .filter(|s| p.memory_id.as_deref().is_none_or(|id| s.memory_id == id))
        .filter(|s| p.code_node_id.as_deref().is_none_or(|id| s.code_node_id == id))
        .collect();
    Ok(serde_json::to_value(filtered).unwrap())
}

async fn review_crosslayer(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: ReviewParams = params(args)?;
    let relation = state.storage.review_cross_layer_suggestion(&p.id, p.approve, now()).map_err(DocleaError::from)?;
    Ok(serde_json::json!({ "relation": relation }))
}

async fn bulk_review_crosslayer(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: BulkReviewParams = params(args)?;
    let now = now();
    let mut relations = Vec::new();
    for id in &p.ids {
        if let Some(relation) = state.storage.review_cross_layer_suggestion(id, p.approve, now).map_err(DocleaError::from)? {
            relations.push(relation);
        }
    }
    Ok(serde_json::json!({ "reviewed": p.ids.len(), "relations": relations }))
}

// ---------------------------------------------------------------------
// refresh_confidence
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshConfidenceParams {
    id: String,
    #[serde(default)]
    new_importance: Option<f32>,
}

async fn refresh_confidence(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: RefreshConfidenceParams = params(args)?;
    let mut memory = state.storage.get_memory(&p.id).map_err(DocleaError::from)?;
    let result = decay::refresh(&mut memory, &state.decay, now(), p.new_importance);
    state.storage.update_memory(&memory).map_err(DocleaError::from)?;
    Ok(serde_json::json!({ "before": result.before, "after": result.after, "memory": memory }))
}

// ---------------------------------------------------------------------
// graphrag_search
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRagSearchParams {
    query: String,
    #[serde(default)]
    global: bool,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    community_level: u32,
    #[serde(default = "default_iterations")]
    max_iterations: usize,
    #[serde(default = "default_depth")]
    max_depth: usize,
}

fn default_iterations() -> usize {
    2
}

fn default_depth() -> usize {
    2
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[serde(untagged)]
enum GraphRagSearchResponse {
    Local { entities: Vec<doclea_core::memory::GraphEntity>, evidence: Vec<graphrag::EvidenceMemory> },
    Global { source_communities: Vec<graphrag::CommunityHit> },
}

async fn graphrag_search(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: GraphRagSearchParams = params(args)?;
    let query = GraphRagQuery {
        query: p.query,
        mode: if p.global { SearchMode::Global } else { SearchMode::Local },
        limit: p.limit,
        community_level: p.community_level,
        max_iterations: p.max_iterations,
        max_depth: p.max_depth,
    };
    let result = graphrag::search(&state.storage, state.vector_store.as_ref(), state.embedder.as_ref(), &query)
        .await
        .map_err(DocleaError::from)?;
    let response = match result {
        GraphRagResult::Local(local) => GraphRagSearchResponse::Local { entities: local.entities, evidence: local.evidence },
        GraphRagResult::Global(global) => GraphRagSearchResponse::Global { source_communities: global.source_communities },
    };
    Ok(serde_json::to_value(response).unwrap())
}

// ---------------------------------------------------------------------
// export / import
// ---------------------------------------------------------------------

async fn export(_args: Value, state: &AppState) -> Result<Value, ToolError> {
    let embedding_model = state.embedder.model().to_string();
    let document = backup::export(
        &state.storage,
        state.config.vector.provider,
        state.config.embedding.provider.as_str(),
        &embedding_model,
        now(),
    )
    .map_err(ToolError::Core)?;
    Ok(serde_json::to_value(document).unwrap())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    document: ExportDocument,
    #[serde(default)]
    strategy: ImportStrategyParam,
    #[serde(default)]
    reembed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ImportStrategyParam {
    #[default]
    Skip,
    Overwrite,
    Error,
}

impl From<ImportStrategyParam> for ConflictStrategy {
    fn from(value: ImportStrategyParam) -> Self {
        match value {
            ImportStrategyParam::Skip => ConflictStrategy::Skip,
            ImportStrategyParam::Overwrite => ConflictStrategy::Overwrite,
            ImportStrategyParam::Error => ConflictStrategy::Error,
        }
    }
}

async fn import(args: Value, state: &AppState) -> Result<Value, ToolError> {
    let p: ImportParams = params(args)?;
    let (embedder, vector_store): (Option<&dyn doclea_core::embeddings::EmbeddingProvider>, Option<&dyn doclea_core::vector::VectorStore>) =
        if p.reembed { (Some(state.embedder.as_ref()), Some(state.vector_store.as_ref())) } else { (None, None) };
    let current_embedding_model = state.embedder.model().to_string();
    let report = backup::import(
        &state.storage,
        &p.document,
        p.strategy.into(),
        p.reembed,
        embedder,
        vector_store,
        state.config.embedding.provider.as_str(),
        &current_embedding_model,
    )
    .await
    .map_err(ToolError::Core)?;
    Ok(serde_json::json!({
        "memoriesImported": report.memories_imported,
        "memoriesSkipped": report.memories_skipped,
        "documentsImported": report.documents_imported,
        "documentsSkipped": report.documents_skipped,
        "chunksImported": report.chunks_imported,
        "memoryRelationsImported": report.memory_relations_imported,
        "memoryRelationsSkipped": report.memory_relations_skipped,
        "crossLayerRelationsImported": report.cross_layer_relations_imported,
        "pendingMemoriesImported": report.pending_memories_imported,
        "pendingMemoriesSkipped": report.pending_memories_skipped,
        "reembeddingRequired": report.reembedding_required,
    }))
}

