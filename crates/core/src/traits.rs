//! Store and pipeline seams
//!
//! The orchestrator, query surface, and tests all work against these traits.
//! Production wires the Neo4j-backed implementations from `kgraph-store`;
//! tests wire the in-memory ones.

use crate::error::KgResult;
use crate::graph::{EdgeRecord, GraphSlice, GraphStats, KnowledgeGraph, NodeRecord};
use crate::state::{GraphStatus, KgState, KgTask};
use crate::version::Version;
use async_trait::async_trait;

/// Outcome of the admission compare-and-set.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// The caller now owns the state. For incremental acquires,
    /// `base_version` is the `latest_ready_version` snapshotted atomically
    /// with the transition.
    Acquired {
        /// Base version captured at acquire time; `None` for full builds.
        base_version: Option<Version>,
    },
    /// Another task owns the state; the observed state is returned unchanged.
    Conflict(KgState),
    /// Incremental acquire was refused because no version was ever published.
    NoBase,
}

/// Durable global state and task history, with single-writer admission.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the singleton state, creating it as IDLE on first access.
    async fn read_state(&self) -> KgResult<KgState>;

    /// Atomically promote the state to `target` and insert `task`, iff the
    /// current status admits. Incremental acquires (`target == Updating`)
    /// additionally require a published base version and record it on the
    /// task. Concurrent callers observe a total order; exactly one wins.
    async fn try_acquire(&self, target: GraphStatus, task: &KgTask) -> KgResult<AcquireOutcome>;

    /// Publish `new_version` and close the task as succeeded, in one
    /// transaction. Rejected with [`crate::KgError::StaleTask`] when
    /// `task_id` no longer owns the state; never lowers the published
    /// version.
    async fn commit_success(&self, task_id: &str, new_version: &Version) -> KgResult<()>;

    /// Close the task as failed, leaving `latest_ready_version` untouched.
    async fn commit_failure(&self, task_id: &str, error: &str) -> KgResult<()>;

    /// Sweep a crashed run: when the status is still running at startup, fail
    /// the owning task with "server restarted". Idempotent. Returns the swept
    /// task id, if any.
    async fn recover_on_startup(&self) -> KgResult<Option<String>>;

    /// Fetch one task record.
    async fn get_task(&self, task_id: &str) -> KgResult<Option<KgTask>>;

    /// All versions that were ever published, newest first.
    async fn list_ready_versions(&self) -> KgResult<Vec<Version>>;
}

/// Versioned graph persistence and query.
///
/// Every operation takes an explicit version; there is no cross-version
/// read or write.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge nodes by (`kg_version`, `entity_label`, `name`); property bags
    /// overwrite.
    async fn upsert_nodes(&self, version: &Version, nodes: &[NodeRecord]) -> KgResult<()>;

    /// Merge edges by (`kg_version`, source, target, `predicate`); property
    /// bags overwrite. Edges whose endpoints are absent in `version` are
    /// skipped.
    async fn upsert_edges(&self, version: &Version, edges: &[EdgeRecord]) -> KgResult<()>;

    /// Detach-delete every node tagged `version`, taking the version's edges
    /// with them. Returns the number of nodes removed.
    async fn delete_version(&self, version: &Version) -> KgResult<u64>;

    /// Distinct entity labels in `version`, sorted.
    async fn entity_types(&self, version: &Version) -> KgResult<Vec<String>>;

    /// Distinct predicates in `version`, sorted.
    async fn relation_types(&self, version: &Version) -> KgResult<Vec<String>>;

    /// Aggregate counts for `version`.
    async fn stats(&self, version: &Version) -> KgResult<GraphStats>;

    /// Up to `limit_nodes` nodes and `limit_edges` edges of `version`.
    /// Truncation order is stable within a call.
    async fn full_graph(
        &self,
        version: &Version,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice>;

    /// Keyword subgraph expansion: seed nodes whose `name` contains `query`
    /// (case-sensitive), then BFS up to `depth` hops along edges of
    /// `version`, stopping immediately when a limit is reached. An empty seed
    /// set yields an empty, non-truncated slice.
    async fn subgraph(
        &self,
        version: &Version,
        query: &str,
        depth: usize,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice>;
}

/// Data-source hooks supplying input text to the pipelines.
///
/// Implementations are registered under a name at program start and selected
/// by `hooks.module` in the configuration. Both methods raise on failure;
/// the orchestrator records the error with a `hook:` prefix.
#[async_trait]
pub trait DataHooks: Send + Sync {
    /// Ordered text chunks for a full rebuild.
    async fn full_data(&self) -> KgResult<Vec<String>>;

    /// Ordered text chunks produced since `since_version`. How "since" is
    /// interpreted is the implementation's responsibility; the core only
    /// forwards the base version.
    async fn incremental_data(&self, since_version: &Version) -> KgResult<Vec<String>>;
}

/// Text-to-graph extraction.
///
/// Given text chunks and an optional prior graph, produce the complete
/// [`KnowledgeGraph`] for a new version. Implementations route every
/// upstream call through a rate-limited caller.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Build a graph from `chunks`, extending `base` when given.
    async fn build(
        &self,
        chunks: &[String],
        base: Option<&KnowledgeGraph>,
    ) -> KgResult<KnowledgeGraph>;
}
