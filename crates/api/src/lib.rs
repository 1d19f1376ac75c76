//! HTTP surface for kgraphd
//!
//! A thin axum layer: trigger endpoints delegate to the orchestrator, read
//! endpoints capture `latest_ready_version` per request and dispatch
//! versioned store reads. Readers never observe building state; they only
//! ever see committed versions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handlers;
pub mod response;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use kgraph_core::config::{QueryConfig, ServerConfig};
use kgraph_core::{GraphStore, KgError, KgResult, MetadataStore};
use kgraph_engine::Orchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The build state machine.
    pub orchestrator: Arc<Orchestrator>,
    /// Metadata reads for status and version capture.
    pub meta: Arc<dyn MetadataStore>,
    /// Versioned graph reads.
    pub graph: Arc<dyn GraphStore>,
    /// Defaults applied when a query omits its limits.
    pub query: QueryConfig,
}

/// The `/kg` route tree.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/kg/build/full", post(handlers::build_full))
        .route("/kg/update/incremental", post(handlers::update_incremental))
        .route("/kg/status", get(handlers::status))
        .route("/kg/types/entities", get(handlers::entity_types))
        .route("/kg/types/relations", get(handlers::relation_types))
        .route("/kg/query", get(handlers::query))
        .route("/kg/stats", get(handlers::stats))
        .with_state(state)
}

/// CORS layer from `server.cors_allow_origins`; `"*"` means any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(parsed)
    }
}

/// Bind and serve until `shutdown` fires.
pub async fn serve(
    cfg: &ServerConfig,
    app: Router,
    shutdown: CancellationToken,
) -> KgResult<()> {
    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .map_err(KgError::Io)?;
    info!(host = %cfg.host, port = cfg.port, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(KgError::Io)
}
