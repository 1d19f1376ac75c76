//! Neo4j-backed stores
//!
//! Layout in the database:
//! - one `KGState` node keyed by `graph_name` (the singleton metadata row)
//! - one `KGTask` node per trigger, keyed by `task_id`
//! - graph data under a single `KGNode` label and `KG_REL` relationship
//!   type, distinguished by `entity_label` / `predicate` plus the mandatory
//!   `kg_version` tag
//!
//! The admission CAS and both commits execute as single Cypher statements
//! whose conditional `SET` rides on Neo4j's per-node write locks, so
//! concurrent callers are totally ordered even across processes.

mod convert;
mod graph;
mod metadata;

use kgraph_core::config::Neo4jConfig;
use kgraph_core::{KgError, KgResult};
use neo4rs::Graph;
use tracing::info;

pub(crate) use convert::{bag_to_bolt, limit_param, props_to_bag};

/// Neo4j-backed [`kgraph_core::MetadataStore`] and [`kgraph_core::GraphStore`].
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect with the given configuration, resolving the password through
    /// its env indirection if needed.
    pub async fn connect(cfg: &Neo4jConfig) -> KgResult<Self> {
        let password = cfg.resolved_password()?;
        let mut builder = neo4rs::ConfigBuilder::default()
            .uri(&cfg.uri)
            .user(&cfg.username)
            .password(&password);
        if let Some(db) = &cfg.database {
            builder = builder.db(db.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| KgError::Config(format!("neo4j config: {e}")))?;
        let graph = Graph::connect(config).await.map_err(store_err)?;
        info!(uri = %cfg.uri, "connected to neo4j");
        Ok(Neo4jStore { graph })
    }

    /// Wrap an already-connected driver handle.
    pub fn from_graph(graph: Graph) -> Self {
        Neo4jStore { graph }
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }
}

pub(crate) fn store_err(e: neo4rs::Error) -> KgError {
    KgError::Store(e.to_string())
}
