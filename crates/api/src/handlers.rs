//! Route handlers

use axum::extract::{Query, State};
use axum::Json;
use kgraph_core::{
    EdgeView, GraphStats, GraphStatus, KgError, KgResult, KgTask, NodeView, Version, GRAPH_NAME,
};
use kgraph_engine::TriggerReceipt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::response::{ApiJson, ApiResult};
use crate::AppState;

/// Optional trigger body; both fields are advisory.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerBody {
    /// Must be the single graph this instance manages, when given.
    pub graph_name: Option<String>,
    /// Free-form caller tag, logged only.
    pub trigger_source: Option<String>,
}

fn check_trigger_body(body: &Option<Json<TriggerBody>>) -> KgResult<()> {
    if let Some(Json(body)) = body {
        if let Some(name) = &body.graph_name {
            if name != GRAPH_NAME {
                return Err(KgError::BadRequest(format!(
                    "unknown graph {name:?}; this instance manages {GRAPH_NAME:?}"
                )));
            }
        }
        if let Some(source) = &body.trigger_source {
            info!(trigger_source = %source, "trigger received");
        }
    }
    Ok(())
}

/// POST `/kg/build/full`
pub async fn build_full(
    State(state): State<AppState>,
    body: Option<Json<TriggerBody>>,
) -> ApiResult<TriggerReceipt> {
    check_trigger_body(&body)?;
    Ok(ApiJson(state.orchestrator.trigger_full().await?))
}

/// POST `/kg/update/incremental`
pub async fn update_incremental(
    State(state): State<AppState>,
    body: Option<Json<TriggerBody>>,
) -> ApiResult<TriggerReceipt> {
    check_trigger_body(&body)?;
    Ok(ApiJson(state.orchestrator.trigger_incremental().await?))
}

/// GET `/kg/status` payload.
#[derive(Debug, Serialize)]
pub struct StatusPayload {
    /// Current state-machine position.
    pub status: GraphStatus,
    /// The published version, if any.
    pub latest_ready_version: Option<Version>,
    /// The running task's record, while one runs.
    pub current_task: Option<KgTask>,
}

/// GET `/kg/status`
pub async fn status(State(state): State<AppState>) -> ApiResult<StatusPayload> {
    let snapshot = state.meta.read_state().await?;
    let current_task = match &snapshot.current_task_id {
        Some(task_id) => state.meta.get_task(task_id).await?,
        None => None,
    };
    Ok(ApiJson(StatusPayload {
        status: snapshot.status,
        latest_ready_version: snapshot.latest_ready_version,
        current_task,
    }))
}

/// The version every read binds to: `latest_ready_version` at request time.
async fn current_version(state: &AppState) -> KgResult<Version> {
    state
        .meta
        .read_state()
        .await?
        .latest_ready_version
        .ok_or(KgError::NoReadyVersion)
}

/// GET `/kg/types/entities` payload.
#[derive(Debug, Serialize)]
pub struct EntityTypesPayload {
    /// The version the listing was read from.
    pub version: Version,
    /// Distinct entity labels.
    pub entity_types: Vec<String>,
}

/// GET `/kg/types/entities`
pub async fn entity_types(State(state): State<AppState>) -> ApiResult<EntityTypesPayload> {
    let version = current_version(&state).await?;
    let entity_types = state.graph.entity_types(&version).await?;
    Ok(ApiJson(EntityTypesPayload {
        version,
        entity_types,
    }))
}

/// GET `/kg/types/relations` payload.
#[derive(Debug, Serialize)]
pub struct RelationTypesPayload {
    /// The version the listing was read from.
    pub version: Version,
    /// Distinct predicates.
    pub relation_types: Vec<String>,
}

/// GET `/kg/types/relations`
pub async fn relation_types(State(state): State<AppState>) -> ApiResult<RelationTypesPayload> {
    let version = current_version(&state).await?;
    let relation_types = state.graph.relation_types(&version).await?;
    Ok(ApiJson(RelationTypesPayload {
        version,
        relation_types,
    }))
}

/// GET `/kg/query` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    /// Keyword for subgraph expansion; the whole graph when absent.
    pub q: Option<String>,
    /// Node cap; the configured default when absent.
    pub limit_nodes: Option<usize>,
    /// Edge cap; the configured default when absent.
    pub limit_edges: Option<usize>,
    /// BFS depth; the configured default when absent.
    pub depth: Option<usize>,
    /// Set false to omit property bags.
    pub include_properties: Option<bool>,
}

/// GET `/kg/query` payload.
#[derive(Debug, Serialize)]
pub struct QueryPayload {
    /// The version the slice was read from.
    pub version: Version,
    /// Nodes, up to the cap.
    pub nodes: Vec<NodeView>,
    /// Edges, up to the cap.
    pub edges: Vec<EdgeView>,
    /// True when a cap cut the result short.
    pub truncated: bool,
}

/// GET `/kg/query`
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<QueryPayload> {
    let version = current_version(&state).await?;
    let limit_nodes = params.limit_nodes.unwrap_or(state.query.default_limit_nodes);
    let limit_edges = params.limit_edges.unwrap_or(state.query.default_limit_edges);
    let depth = params.depth.unwrap_or(state.query.default_depth);

    let mut slice = match params.q.as_deref().filter(|q| !q.is_empty()) {
        Some(keyword) => {
            state
                .graph
                .subgraph(&version, keyword, depth, limit_nodes, limit_edges)
                .await?
        }
        None => {
            state
                .graph
                .full_graph(&version, limit_nodes, limit_edges)
                .await?
        }
    };
    if !params.include_properties.unwrap_or(true) {
        slice = slice.without_properties();
    }

    Ok(ApiJson(QueryPayload {
        version,
        nodes: slice.nodes,
        edges: slice.edges,
        truncated: slice.truncated,
    }))
}

/// GET `/kg/stats` payload.
#[derive(Debug, Serialize)]
pub struct StatsPayload {
    /// The version the counts were read from.
    pub version: Version,
    /// Aggregate counts.
    #[serde(flatten)]
    pub stats: GraphStats,
}

/// GET `/kg/stats`
pub async fn stats(State(state): State<AppState>) -> ApiResult<StatsPayload> {
    let version = current_version(&state).await?;
    let stats = state.graph.stats(&version).await?;
    Ok(ApiJson(StatsPayload { version, stats }))
}
