//! The build state machine
//!
//! Triggers race on the metadata CAS; the winner's pipeline runs as a
//! background task while the trigger returns immediately with the receipt.
//! Pipelines never overlap: admission is refused until the running task
//! commits, fails, or is swept by startup recovery.
//!
//! Failure handling: any error out of the pipeline runs a best-effort
//! delete of the new version's partial writes, then records the failure.
//! A partial write is never observable either way, because publication only
//! happens through `latest_ready_version`.

use kgraph_core::config::{RetentionConfig, TaskConfig};
use kgraph_core::{
    AcquireOutcome, DataHooks, Extractor, GraphStatus, GraphStore, KgError, KgResult, KgTask,
    MetadataStore, TaskKind, Version,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::retention;

/// What a successful trigger returns to the client.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerReceipt {
    /// Id of the admitted task.
    pub task_id: String,
    /// The running status the state moved to.
    pub status: GraphStatus,
    /// The version the pipeline writes under.
    pub version: Version,
    /// For incremental updates, the base captured at admission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_version: Option<Version>,
}

/// Coordinates triggers, pipelines, commits, and recovery.
pub struct Orchestrator {
    meta: Arc<dyn MetadataStore>,
    graph: Arc<dyn GraphStore>,
    hooks: Arc<dyn DataHooks>,
    extractor: Arc<dyn Extractor>,
    retention: RetentionConfig,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Wire an orchestrator. `shutdown` is cancelled by the server on
    /// graceful shutdown and propagates into running pipelines.
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        graph: Arc<dyn GraphStore>,
        hooks: Arc<dyn DataHooks>,
        extractor: Arc<dyn Extractor>,
        retention: RetentionConfig,
        task: &TaskConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Orchestrator {
            meta,
            graph,
            hooks,
            extractor,
            retention,
            timeout: task.timeout_s.map(Duration::from_secs),
            shutdown,
        })
    }

    /// Sweep a run that was still marked running when the process died.
    pub async fn recover_on_startup(&self) -> KgResult<()> {
        if let Some(task_id) = self.meta.recover_on_startup().await? {
            warn!(task_id, "recovered crashed run; task failed as restarted");
        }
        Ok(())
    }

    /// Trigger a full rebuild. Returns 409-shaped
    /// [`KgError::TaskRunning`] when another pipeline owns the state.
    pub async fn trigger_full(self: &Arc<Self>) -> KgResult<TriggerReceipt> {
        self.admit(TaskKind::FullBuild).await
    }

    /// Trigger an incremental update. Additionally fails with
    /// [`KgError::NoBaseVersion`] when no full build ever completed.
    pub async fn trigger_incremental(self: &Arc<Self>) -> KgResult<TriggerReceipt> {
        self.admit(TaskKind::IncrementalUpdate).await
    }

    async fn admit(self: &Arc<Self>, kind: TaskKind) -> KgResult<TriggerReceipt> {
        let version = Version::now();
        let task = KgTask::new(kind, version.clone());
        let target = kind.running_status();

        match self.meta.try_acquire(target, &task).await? {
            AcquireOutcome::Acquired { base_version } => {
                info!(
                    task_id = %task.task_id,
                    kind = kind.as_str(),
                    base = base_version.as_ref().map(Version::as_str).unwrap_or("-"),
                    "pipeline admitted"
                );
                let receipt = TriggerReceipt {
                    task_id: task.task_id.clone(),
                    status: target,
                    version,
                    base_version: base_version.clone(),
                };
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    orchestrator.run_pipeline(task, base_version).await;
                });
                Ok(receipt)
            }
            AcquireOutcome::Conflict(state) => {
                let task_id = state.current_task_id.unwrap_or_default();
                Err(KgError::TaskRunning {
                    status: state.status,
                    // Task ids double as versions
                    version: task_id.clone(),
                    task_id,
                })
            }
            AcquireOutcome::NoBase => Err(KgError::NoBaseVersion),
        }
    }

    async fn run_pipeline(&self, task: KgTask, base_version: Option<Version>) {
        let outcome = self.execute_bounded(&task, base_version.as_ref()).await;
        match outcome {
            Ok(()) => {
                if let Err(e) = self.meta.commit_success(&task.task_id, &task.version).await {
                    error!(task_id = %task.task_id, error = %e, "success commit failed");
                    self.fail_task(&task, &format!("commit: {e}")).await;
                    return;
                }
                info!(task_id = %task.task_id, version = %task.version, "version published");
                retention::sweep(self.meta.as_ref(), self.graph.as_ref(), &self.retention).await;
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "pipeline failed");
                self.fail_task(&task, &e.to_string()).await;
            }
        }
    }

    /// Run the pipeline under the configured wall-time budget and the
    /// shutdown token. Dropping the pipeline future aborts in-flight
    /// upstream calls and store round trips.
    async fn execute_bounded(&self, task: &KgTask, base: Option<&Version>) -> KgResult<()> {
        let work = self.execute(task, base);
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(KgError::Cancelled),
            result = async {
                match self.timeout {
                    Some(budget) => match tokio::time::timeout(budget, work).await {
                        Ok(result) => result,
                        Err(_) => Err(KgError::Timeout(budget.as_secs())),
                    },
                    None => work.await,
                }
            } => result,
        }
    }

    async fn execute(&self, task: &KgTask, base: Option<&Version>) -> KgResult<()> {
        let chunks = match task.kind {
            TaskKind::FullBuild => self.hooks.full_data().await.map_err(as_hook_error)?,
            TaskKind::IncrementalUpdate => {
                let base = base.ok_or(KgError::NoBaseVersion)?;
                self.hooks
                    .incremental_data(base)
                    .await
                    .map_err(as_hook_error)?
            }
        };
        info!(task_id = %task.task_id, chunks = chunks.len(), "hook data loaded");

        let base_graph = match (task.kind, base) {
            (TaskKind::IncrementalUpdate, Some(base)) => Some(
                self.graph
                    .full_graph(base, usize::MAX, usize::MAX)
                    .await?
                    .to_knowledge_graph(),
            ),
            _ => None,
        };

        let kg = self.extractor.build(&chunks, base_graph.as_ref()).await?;
        info!(
            task_id = %task.task_id,
            nodes = kg.nodes.len(),
            edges = kg.edges.len(),
            "extraction complete"
        );

        self.graph.upsert_nodes(&task.version, &kg.nodes).await?;
        self.graph.upsert_edges(&task.version, &kg.edges).await?;
        Ok(())
    }

    async fn fail_task(&self, task: &KgTask, message: &str) {
        // Best-effort removal of whatever the failed run managed to write
        match self.graph.delete_version(&task.version).await {
            Ok(0) => {}
            Ok(nodes) => info!(task_id = %task.task_id, nodes, "removed partial write"),
            Err(e) => {
                // The orphan stays invisible: it was never published
                warn!(task_id = %task.task_id, error = %e, "partial-write cleanup failed");
            }
        }
        if let Err(e) = self.meta.commit_failure(&task.task_id, message).await {
            error!(task_id = %task.task_id, error = %e, "failure commit did not apply");
        }
    }
}

fn as_hook_error(e: KgError) -> KgError {
    match e {
        KgError::Hook(_) => e,
        other => KgError::Hook(other.to_string()),
    }
}
