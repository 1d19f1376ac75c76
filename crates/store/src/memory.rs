//! In-memory store implementations
//!
//! Semantically equivalent to the Neo4j backend: same admission CAS, same
//! commit guards, same versioned isolation and truncation behavior. The
//! engine and API test suites run entirely against these.

use async_trait::async_trait;
use chrono::Utc;
use kgraph_core::{
    AcquireOutcome, EdgeRecord, EdgeView, GraphSlice, GraphStats, GraphStatus, GraphStore, KgError,
    KgResult, KgState, KgTask, MetadataStore, NodeRecord, NodeView, PropertyBag, Version,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Default)]
struct MetaInner {
    state: Option<KgState>,
    tasks: HashMap<String, KgTask>,
}

/// In-memory [`MetadataStore`] with the same CAS and commit guards as the
/// Neo4j backend.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<MetaInner>,
}

impl MemoryMetadataStore {
    /// An empty store; the state row is created IDLE on first read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the state row, bypassing the CAS. Test-only seam for simulating
    /// a crash that left a running status behind.
    pub fn force_state(&self, state: KgState) {
        self.inner.lock().state = Some(state);
    }

    /// Insert a task record directly. Pairs with [`Self::force_state`].
    pub fn force_task(&self, task: KgTask) {
        self.inner.lock().tasks.insert(task.task_id.clone(), task);
    }
}

fn state_of(inner: &mut MetaInner) -> &mut KgState {
    inner.state.get_or_insert_with(KgState::initial)
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn read_state(&self) -> KgResult<KgState> {
        let mut inner = self.inner.lock();
        Ok(state_of(&mut inner).clone())
    }

    async fn try_acquire(&self, target: GraphStatus, task: &KgTask) -> KgResult<AcquireOutcome> {
        let mut inner = self.inner.lock();
        let state = state_of(&mut inner).clone();

        if state.status.is_running() {
            return Ok(AcquireOutcome::Conflict(state));
        }
        let base_version = match target {
            GraphStatus::Updating => match state.latest_ready_version.clone() {
                Some(v) => Some(v),
                None => return Ok(AcquireOutcome::NoBase),
            },
            _ => None,
        };

        let mut stored = task.clone();
        stored.base_version = base_version.clone();
        stored.started_at = Utc::now();
        inner.tasks.insert(stored.task_id.clone(), stored);

        let state = state_of(&mut inner);
        state.status = target;
        state.current_task_id = Some(task.task_id.clone());
        state.updated_at = Utc::now();

        Ok(AcquireOutcome::Acquired { base_version })
    }

    async fn commit_success(&self, task_id: &str, new_version: &Version) -> KgResult<()> {
        let mut inner = self.inner.lock();
        let state = state_of(&mut inner);
        if state.current_task_id.as_deref() != Some(task_id) {
            return Err(KgError::StaleTask(task_id.to_string()));
        }
        if let Some(latest) = &state.latest_ready_version {
            if new_version <= latest {
                return Err(KgError::Store(format!(
                    "commit of {new_version} would not advance latest ready version {latest}"
                )));
            }
        }
        state.status = GraphStatus::Ready;
        state.latest_ready_version = Some(new_version.clone());
        state.current_task_id = None;
        state.updated_at = Utc::now();

        if let Some(task) = inner.tasks.get_mut(task_id) {
            task.finished_at = Some(Utc::now());
            task.progress = Some(100);
        }
        Ok(())
    }

    async fn commit_failure(&self, task_id: &str, error: &str) -> KgResult<()> {
        let mut inner = self.inner.lock();
        let state = state_of(&mut inner);
        if state.current_task_id.as_deref() != Some(task_id) {
            return Err(KgError::StaleTask(task_id.to_string()));
        }
        state.status = GraphStatus::Failed;
        state.current_task_id = None;
        state.updated_at = Utc::now();

        if let Some(task) = inner.tasks.get_mut(task_id) {
            task.finished_at = Some(Utc::now());
            task.error = Some(error.to_string());
        }
        Ok(())
    }

    async fn recover_on_startup(&self) -> KgResult<Option<String>> {
        let crashed = {
            let mut inner = self.inner.lock();
            let state = state_of(&mut inner);
            if state.status.is_running() {
                state.current_task_id.clone()
            } else {
                return Ok(None);
            }
        };
        match crashed {
            Some(task_id) => {
                self.commit_failure(&task_id, "server restarted").await?;
                Ok(Some(task_id))
            }
            None => {
                // Running status with no owner: repair directly.
                let mut inner = self.inner.lock();
                let state = state_of(&mut inner);
                state.status = GraphStatus::Failed;
                state.updated_at = Utc::now();
                Ok(None)
            }
        }
    }

    async fn get_task(&self, task_id: &str) -> KgResult<Option<KgTask>> {
        Ok(self.inner.lock().tasks.get(task_id).cloned())
    }

    async fn list_ready_versions(&self) -> KgResult<Vec<Version>> {
        let inner = self.inner.lock();
        let mut versions: Vec<Version> = inner
            .tasks
            .values()
            .filter(|t| t.finished_at.is_some() && t.error.is_none())
            .map(|t| t.version.clone())
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone)]
struct StoredNode {
    id: u64,
    entity_label: String,
    name: String,
    properties: PropertyBag,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    id: u64,
    source_id: u64,
    target_id: u64,
    predicate: String,
    properties: PropertyBag,
}

#[derive(Debug, Default)]
struct VersionData {
    nodes: Vec<StoredNode>,
    edges: Vec<StoredEdge>,
}

#[derive(Debug, Default)]
struct GraphInner {
    versions: BTreeMap<String, VersionData>,
    next_id: u64,
}

/// In-memory [`GraphStore`] with per-version element-id assignment and the
/// same truncation semantics as the Neo4j backend.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    inner: Mutex<GraphInner>,
}

impl MemoryGraphStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The versions currently holding any data, unordered. Test seam.
    pub fn versions_present(&self) -> Vec<Version> {
        self.inner
            .lock()
            .versions
            .keys()
            .map(|v| Version::from(v.as_str()))
            .collect()
    }
}

fn node_view(node: &StoredNode) -> NodeView {
    NodeView {
        id: node.id.to_string(),
        labels: vec![node.entity_label.clone()],
        name: Some(node.name.clone()),
        properties: Some(node.properties.clone()),
    }
}

fn edge_view(edge: &StoredEdge) -> EdgeView {
    EdgeView {
        id: edge.id.to_string(),
        predicate: edge.predicate.clone(),
        source: edge.source_id.to_string(),
        target: edge.target_id.to_string(),
        properties: Some(edge.properties.clone()),
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_nodes(&self, version: &Version, nodes: &[NodeRecord]) -> KgResult<()> {
        let mut inner = self.inner.lock();
        let mut next_id = inner.next_id;
        let data = inner.versions.entry(version.as_str().to_string()).or_default();
        for node in nodes {
            if let Some(existing) = data
                .nodes
                .iter_mut()
                .find(|n| n.entity_label == node.entity_label && n.name == node.name)
            {
                existing.properties = node.properties.clone();
            } else {
                data.nodes.push(StoredNode {
                    id: next_id,
                    entity_label: node.entity_label.clone(),
                    name: node.name.clone(),
                    properties: node.properties.clone(),
                });
                next_id += 1;
            }
        }
        inner.next_id = next_id;
        Ok(())
    }

    async fn upsert_edges(&self, version: &Version, edges: &[EdgeRecord]) -> KgResult<()> {
        let mut inner = self.inner.lock();
        let mut next_id = inner.next_id;
        let data = inner.versions.entry(version.as_str().to_string()).or_default();
        for edge in edges {
            let source_id = data
                .nodes
                .iter()
                .find(|n| n.entity_label == edge.source.entity_label && n.name == edge.source.name)
                .map(|n| n.id);
            let target_id = data
                .nodes
                .iter()
                .find(|n| n.entity_label == edge.target.entity_label && n.name == edge.target.name)
                .map(|n| n.id);
            // Endpoints absent in this version: the edge is skipped
            let (Some(source_id), Some(target_id)) = (source_id, target_id) else {
                continue;
            };
            if let Some(existing) = data.edges.iter_mut().find(|e| {
                e.source_id == source_id && e.target_id == target_id && e.predicate == edge.predicate
            }) {
                existing.properties = edge.properties.clone();
            } else {
                data.edges.push(StoredEdge {
                    id: next_id,
                    source_id,
                    target_id,
                    predicate: edge.predicate.clone(),
                    properties: edge.properties.clone(),
                });
                next_id += 1;
            }
        }
        inner.next_id = next_id;
        Ok(())
    }

    async fn delete_version(&self, version: &Version) -> KgResult<u64> {
        let mut inner = self.inner.lock();
        Ok(inner
            .versions
            .remove(version.as_str())
            .map(|data| data.nodes.len() as u64)
            .unwrap_or(0))
    }

    async fn entity_types(&self, version: &Version) -> KgResult<Vec<String>> {
        let inner = self.inner.lock();
        let mut labels: Vec<String> = inner
            .versions
            .get(version.as_str())
            .map(|data| {
                data.nodes
                    .iter()
                    .map(|n| n.entity_label.clone())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        labels.sort();
        Ok(labels)
    }

    async fn relation_types(&self, version: &Version) -> KgResult<Vec<String>> {
        let inner = self.inner.lock();
        let mut predicates: Vec<String> = inner
            .versions
            .get(version.as_str())
            .map(|data| {
                data.edges
                    .iter()
                    .map(|e| e.predicate.clone())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        predicates.sort();
        Ok(predicates)
    }

    async fn stats(&self, version: &Version) -> KgResult<GraphStats> {
        let inner = self.inner.lock();
        Ok(inner
            .versions
            .get(version.as_str())
            .map(|data| GraphStats {
                entity_count: data.nodes.len() as u64,
                relation_count: data.edges.len() as u64,
                node_type_count: data
                    .nodes
                    .iter()
                    .map(|n| n.entity_label.as_str())
                    .collect::<HashSet<_>>()
                    .len() as u64,
            })
            .unwrap_or_default())
    }

    async fn full_graph(
        &self,
        version: &Version,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice> {
        let inner = self.inner.lock();
        let Some(data) = inner.versions.get(version.as_str()) else {
            return Ok(GraphSlice::default());
        };
        let truncated = data.nodes.len() > limit_nodes || data.edges.len() > limit_edges;
        let nodes: Vec<NodeView> = data.nodes.iter().take(limit_nodes).map(node_view).collect();
        let kept: HashSet<u64> = data
            .nodes
            .iter()
            .take(limit_nodes)
            .map(|n| n.id)
            .collect();
        let edges: Vec<EdgeView> = data
            .edges
            .iter()
            .filter(|e| kept.contains(&e.source_id) && kept.contains(&e.target_id))
            .take(limit_edges)
            .map(edge_view)
            .collect();
        Ok(GraphSlice {
            nodes,
            edges,
            truncated,
        })
    }

    async fn subgraph(
        &self,
        version: &Version,
        query: &str,
        depth: usize,
        limit_nodes: usize,
        limit_edges: usize,
    ) -> KgResult<GraphSlice> {
        let inner = self.inner.lock();
        let Some(data) = inner.versions.get(version.as_str()) else {
            return Ok(GraphSlice::default());
        };

        let mut visited: Vec<&StoredNode> = Vec::new();
        let mut visited_ids: HashSet<u64> = HashSet::new();
        let mut edges: Vec<&StoredEdge> = Vec::new();
        let mut edge_ids: HashSet<u64> = HashSet::new();
        let mut truncated = false;

        let mut frontier: VecDeque<u64> = VecDeque::new();
        for node in data.nodes.iter().filter(|n| n.name.contains(query)) {
            if visited.len() >= limit_nodes {
                truncated = true;
                break;
            }
            visited.push(node);
            visited_ids.insert(node.id);
            frontier.push_back(node.id);
        }
        if visited.is_empty() {
            return Ok(GraphSlice::default());
        }

        'expand: for _hop in 0..depth {
            if truncated || frontier.is_empty() {
                break;
            }
            let current: Vec<u64> = frontier.drain(..).collect();
            for edge in &data.edges {
                let touches = current.contains(&edge.source_id) || current.contains(&edge.target_id);
                if !touches {
                    continue;
                }
                for neighbor in [edge.source_id, edge.target_id] {
                    if visited_ids.contains(&neighbor) {
                        continue;
                    }
                    if visited.len() >= limit_nodes {
                        truncated = true;
                        break 'expand;
                    }
                    let node = data
                        .nodes
                        .iter()
                        .find(|n| n.id == neighbor)
                        .expect("edge endpoint exists within its version");
                    visited.push(node);
                    visited_ids.insert(neighbor);
                    frontier.push_back(neighbor);
                }
                if visited_ids.contains(&edge.source_id)
                    && visited_ids.contains(&edge.target_id)
                    && !edge_ids.contains(&edge.id)
                {
                    if edges.len() >= limit_edges {
                        truncated = true;
                        break 'expand;
                    }
                    edges.push(edge);
                    edge_ids.insert(edge.id);
                }
            }
        }

        Ok(GraphSlice {
            nodes: visited.into_iter().map(node_view).collect(),
            edges: edges.into_iter().map(edge_view).collect(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::{NodeKey, TaskKind};
    use std::sync::Arc;

    fn version(s: &str) -> Version {
        Version::from(s)
    }

    fn task(kind: TaskKind, v: &str) -> KgTask {
        KgTask::new(kind, version(v))
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn first_read_creates_idle_state() {
        let meta = MemoryMetadataStore::new();
        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Idle);
        assert!(state.latest_ready_version.is_none());
        assert!(state.current_task_id.is_none());
    }

    #[tokio::test]
    async fn acquire_then_conflict_until_commit() {
        let meta = MemoryMetadataStore::new();
        let t1 = task(TaskKind::FullBuild, "100");

        assert!(matches!(
            meta.try_acquire(GraphStatus::Building, &t1).await.unwrap(),
            AcquireOutcome::Acquired { base_version: None }
        ));

        let t2 = task(TaskKind::FullBuild, "101");
        match meta.try_acquire(GraphStatus::Building, &t2).await.unwrap() {
            AcquireOutcome::Conflict(state) => {
                assert_eq!(state.status, GraphStatus::Building);
                assert_eq!(state.current_task_id.as_deref(), Some("100"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        meta.commit_success("100", &version("100")).await.unwrap();
        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Ready);
        assert_eq!(state.latest_ready_version, Some(version("100")));
        assert!(state.current_task_id.is_none());
    }

    #[tokio::test]
    async fn exactly_one_concurrent_acquire_wins() {
        let meta = Arc::new(MemoryMetadataStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let meta = meta.clone();
            handles.push(tokio::spawn(async move {
                let t = task(TaskKind::FullBuild, &format!("{}", 1000 + i));
                meta.try_acquire(GraphStatus::Building, &t).await.unwrap()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if matches!(h.await.unwrap(), AcquireOutcome::Acquired { .. }) {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn incremental_without_base_is_refused() {
        let meta = MemoryMetadataStore::new();
        let t = task(TaskKind::IncrementalUpdate, "100");
        assert!(matches!(
            meta.try_acquire(GraphStatus::Updating, &t).await.unwrap(),
            AcquireOutcome::NoBase
        ));
        // And the state is untouched
        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Idle);
    }

    #[tokio::test]
    async fn incremental_snapshots_base_at_acquire() {
        let meta = MemoryMetadataStore::new();
        let t1 = task(TaskKind::FullBuild, "100");
        meta.try_acquire(GraphStatus::Building, &t1).await.unwrap();
        meta.commit_success("100", &version("100")).await.unwrap();

        let t2 = task(TaskKind::IncrementalUpdate, "200");
        match meta.try_acquire(GraphStatus::Updating, &t2).await.unwrap() {
            AcquireOutcome::Acquired { base_version } => {
                assert_eq!(base_version, Some(version("100")));
            }
            other => panic!("expected acquire, got {other:?}"),
        }
        let stored = meta.get_task("200").await.unwrap().unwrap();
        assert_eq!(stored.base_version, Some(version("100")));
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_and_changes_nothing() {
        let meta = MemoryMetadataStore::new();
        let t1 = task(TaskKind::FullBuild, "100");
        meta.try_acquire(GraphStatus::Building, &t1).await.unwrap();

        assert!(matches!(
            meta.commit_success("999", &version("999")).await,
            Err(KgError::StaleTask(_))
        ));
        assert!(matches!(
            meta.commit_failure("999", "nope").await,
            Err(KgError::StaleTask(_))
        ));

        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Building);
        assert_eq!(state.current_task_id.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn commit_never_lowers_latest_ready_version() {
        let meta = MemoryMetadataStore::new();
        let t1 = task(TaskKind::FullBuild, "200");
        meta.try_acquire(GraphStatus::Building, &t1).await.unwrap();
        meta.commit_success("200", &version("200")).await.unwrap();

        let t2 = task(TaskKind::FullBuild, "100");
        meta.try_acquire(GraphStatus::Building, &t2).await.unwrap();
        assert!(meta.commit_success("100", &version("100")).await.is_err());
    }

    #[tokio::test]
    async fn failure_commit_preserves_latest_ready_version() {
        let meta = MemoryMetadataStore::new();
        let t1 = task(TaskKind::FullBuild, "100");
        meta.try_acquire(GraphStatus::Building, &t1).await.unwrap();
        meta.commit_success("100", &version("100")).await.unwrap();

        let t2 = task(TaskKind::FullBuild, "200");
        meta.try_acquire(GraphStatus::Building, &t2).await.unwrap();
        meta.commit_failure("200", "extraction failed").await.unwrap();

        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Failed);
        assert_eq!(state.latest_ready_version, Some(version("100")));

        let failed = meta.get_task("200").await.unwrap().unwrap();
        assert_eq!(failed.error.as_deref(), Some("extraction failed"));
        assert!(failed.finished_at.is_some());
    }

    #[tokio::test]
    async fn recovery_sweeps_a_crashed_run() {
        let meta = MemoryMetadataStore::new();
        let t = task(TaskKind::FullBuild, "100");
        meta.try_acquire(GraphStatus::Building, &t).await.unwrap();

        // Simulated crash: no commit ever happens; restart recovers.
        let swept = meta.recover_on_startup().await.unwrap();
        assert_eq!(swept.as_deref(), Some("100"));

        let state = meta.read_state().await.unwrap();
        assert_eq!(state.status, GraphStatus::Failed);
        assert!(state.current_task_id.is_none());
        let failed = meta.get_task("100").await.unwrap().unwrap();
        assert_eq!(failed.error.as_deref(), Some("server restarted"));

        // Idempotent
        assert!(meta.recover_on_startup().await.unwrap().is_none());

        // A subsequent trigger succeeds
        let t2 = task(TaskKind::FullBuild, "200");
        assert!(matches!(
            meta.try_acquire(GraphStatus::Building, &t2).await.unwrap(),
            AcquireOutcome::Acquired { .. }
        ));
    }

    #[tokio::test]
    async fn ready_versions_are_listed_newest_first() {
        let meta = MemoryMetadataStore::new();
        for v in ["100", "300", "200"] {
            let t = task(TaskKind::FullBuild, v);
            meta.try_acquire(GraphStatus::Building, &t).await.unwrap();
            if v == "200" {
                meta.commit_failure(v, "boom").await.unwrap();
            } else {
                meta.commit_success(v, &version(v)).await.unwrap();
            }
        }
        let versions = meta.list_ready_versions().await.unwrap();
        assert_eq!(versions, vec![version("300"), version("100")]);
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    fn sample_nodes() -> Vec<NodeRecord> {
        vec![
            NodeRecord::new("Person", "Alice"),
            NodeRecord::new("Person", "Bob"),
            NodeRecord::new("City", "Paris"),
        ]
    }

    fn sample_edges() -> Vec<EdgeRecord> {
        vec![
            EdgeRecord::new(
                NodeKey::new("Person", "Alice"),
                NodeKey::new("Person", "Bob"),
                "knows",
            ),
            EdgeRecord::new(
                NodeKey::new("Person", "Bob"),
                NodeKey::new("City", "Paris"),
                "lives_in",
            ),
        ]
    }

    #[tokio::test]
    async fn versions_are_fully_isolated() {
        let store = MemoryGraphStore::new();
        let v1 = version("100");
        let v2 = version("200");
        store.upsert_nodes(&v1, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v1, &sample_edges()).await.unwrap();
        store
            .upsert_nodes(&v2, &[NodeRecord::new("Person", "Carol")])
            .await
            .unwrap();

        let s1 = store.stats(&v1).await.unwrap();
        assert_eq!(s1.entity_count, 3);
        assert_eq!(s1.relation_count, 2);
        assert_eq!(s1.node_type_count, 2);

        let s2 = store.stats(&v2).await.unwrap();
        assert_eq!(s2.entity_count, 1);
        assert_eq!(s2.relation_count, 0);

        let slice = store.full_graph(&v1, usize::MAX, usize::MAX).await.unwrap();
        assert_eq!(slice.nodes.len(), 3);
        assert!(!slice.truncated);
        assert!(slice.nodes.iter().all(|n| n.name.as_deref() != Some("Carol")));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_keys() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        let stats = store.stats(&v).await.unwrap();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.relation_count, 2);
    }

    #[tokio::test]
    async fn edge_with_missing_endpoint_is_skipped() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store
            .upsert_nodes(&v, &[NodeRecord::new("Person", "Alice")])
            .await
            .unwrap();
        store
            .upsert_edges(
                &v,
                &[EdgeRecord::new(
                    NodeKey::new("Person", "Alice"),
                    NodeKey::new("Person", "Ghost"),
                    "knows",
                )],
            )
            .await
            .unwrap();
        assert_eq!(store.stats(&v).await.unwrap().relation_count, 0);
    }

    #[tokio::test]
    async fn delete_version_removes_all_data() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        assert_eq!(store.delete_version(&v).await.unwrap(), 3);
        assert_eq!(store.stats(&v).await.unwrap(), GraphStats::default());
        assert_eq!(store.delete_version(&v).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn type_listings_are_sorted_and_distinct() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        assert_eq!(store.entity_types(&v).await.unwrap(), vec!["City", "Person"]);
        assert_eq!(
            store.relation_types(&v).await.unwrap(),
            vec!["knows", "lives_in"]
        );
    }

    #[tokio::test]
    async fn full_graph_truncates_at_limits() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        let slice = store.full_graph(&v, 2, usize::MAX).await.unwrap();
        assert_eq!(slice.nodes.len(), 2);
        assert!(slice.truncated);
    }

    #[tokio::test]
    async fn subgraph_expands_by_hops() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        // Depth 1 from Alice reaches Bob but not Paris
        let one = store
            .subgraph(&v, "Alice", 1, usize::MAX, usize::MAX)
            .await
            .unwrap();
        let names: Vec<_> = one.nodes.iter().filter_map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(one.edges.len(), 1);

        // Depth 2 reaches Paris
        let two = store
            .subgraph(&v, "Alice", 2, usize::MAX, usize::MAX)
            .await
            .unwrap();
        assert_eq!(two.nodes.len(), 3);
        assert_eq!(two.edges.len(), 2);
    }

    #[tokio::test]
    async fn subgraph_match_is_case_sensitive_substring() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();

        let hit = store
            .subgraph(&v, "lic", 1, usize::MAX, usize::MAX)
            .await
            .unwrap();
        assert_eq!(hit.nodes.len(), 1);

        let miss = store
            .subgraph(&v, "alice", 1, usize::MAX, usize::MAX)
            .await
            .unwrap();
        assert!(miss.nodes.is_empty());
        assert!(!miss.truncated);
    }

    #[tokio::test]
    async fn subgraph_stops_at_node_limit() {
        let store = MemoryGraphStore::new();
        let v = version("100");
        store.upsert_nodes(&v, &sample_nodes()).await.unwrap();
        store.upsert_edges(&v, &sample_edges()).await.unwrap();

        let slice = store.subgraph(&v, "Alice", 3, 2, usize::MAX).await.unwrap();
        assert_eq!(slice.nodes.len(), 2);
        assert!(slice.truncated);
    }
}
