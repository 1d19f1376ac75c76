//! Metadata store over Neo4j
//!
//! The CAS, both commits, and crash recovery are each one Cypher statement.
//! Conditional transitions use the `WITH … WHERE …` form so the `SET` only
//! runs when the guard holds; a missing result row tells the caller the
//! guard failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kgraph_core::{
    AcquireOutcome, GraphStatus, KgError, KgResult, KgState, KgTask, MetadataStore, TaskKind,
    Version, GRAPH_NAME,
};
use neo4rs::query;
use tracing::warn;

use super::{store_err, Neo4jStore};

const READ_STATE: &str = "
MERGE (s:KGState {graph_name: $graph_name})
ON CREATE SET s.status = 'IDLE', s.updated_at = $now
RETURN s.status AS status,
       s.latest_ready_version AS latest_ready_version,
       s.current_task_id AS current_task_id,
       s.updated_at AS updated_at
";

const TRY_ACQUIRE: &str = "
MERGE (s:KGState {graph_name: $graph_name})
ON CREATE SET s.status = 'IDLE', s.updated_at = $now
WITH s
WHERE NOT s.status IN ['BUILDING', 'UPDATING']
  AND (NOT $require_base OR s.latest_ready_version IS NOT NULL)
SET s.status = $target,
    s.current_task_id = $task_id,
    s.updated_at = $now
CREATE (t:KGTask {
    task_id: $task_id,
    type: $kind,
    version: $version,
    base_version: CASE WHEN $require_base THEN s.latest_ready_version ELSE null END,
    started_at: $now,
    progress: 0
})
RETURN t.base_version AS base_version
";

const COMMIT_SUCCESS: &str = "
MATCH (s:KGState {graph_name: $graph_name})
WHERE s.current_task_id = $task_id
  AND (s.latest_ready_version IS NULL
       OR size(s.latest_ready_version) < size($version)
       OR (size(s.latest_ready_version) = size($version)
           AND s.latest_ready_version < $version))
SET s.status = 'READY',
    s.latest_ready_version = $version,
    s.current_task_id = null,
    s.updated_at = $now
WITH s
MATCH (t:KGTask {task_id: $task_id})
SET t.finished_at = $now, t.progress = 100
RETURN t.task_id AS task_id
";

const COMMIT_FAILURE: &str = "
MATCH (s:KGState {graph_name: $graph_name})
WHERE s.current_task_id = $task_id
SET s.status = 'FAILED',
    s.current_task_id = null,
    s.updated_at = $now
WITH s
MATCH (t:KGTask {task_id: $task_id})
SET t.finished_at = $now, t.error = $error
RETURN t.task_id AS task_id
";

const CRASHED_TASK: &str = "
MATCH (s:KGState {graph_name: $graph_name})
WHERE s.status IN ['BUILDING', 'UPDATING']
RETURN s.current_task_id AS task_id
";

const REPAIR_ORPHANED_STATE: &str = "
MATCH (s:KGState {graph_name: $graph_name})
WHERE s.status IN ['BUILDING', 'UPDATING'] AND s.current_task_id IS NULL
SET s.status = 'FAILED', s.updated_at = $now
";

const GET_TASK: &str = "
MATCH (t:KGTask {task_id: $task_id})
RETURN t.task_id AS task_id, t.type AS type, t.version AS version,
       t.base_version AS base_version, t.started_at AS started_at,
       t.finished_at AS finished_at, t.progress AS progress, t.error AS error
";

const LIST_READY_VERSIONS: &str = "
MATCH (t:KGTask)
WHERE t.finished_at IS NOT NULL AND t.error IS NULL
RETURN t.version AS version
";

fn now_param() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_status(raw: &str) -> KgResult<GraphStatus> {
    raw.parse().map_err(KgError::Store)
}

#[async_trait]
impl MetadataStore for Neo4jStore {
    async fn read_state(&self) -> KgResult<KgState> {
        let mut rows = self
            .graph()
            .execute(
                query(READ_STATE)
                    .param("graph_name", GRAPH_NAME)
                    .param("now", now_param()),
            )
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| KgError::Store("state row missing after merge".to_string()))?;

        let status: String = row.get("status").map_err(|e| KgError::Store(e.to_string()))?;
        let latest: Option<String> = row
            .get("latest_ready_version")
            .map_err(|e| KgError::Store(e.to_string()))?;
        let task: Option<String> = row
            .get("current_task_id")
            .map_err(|e| KgError::Store(e.to_string()))?;
        let updated: Option<String> = row
            .get("updated_at")
            .map_err(|e| KgError::Store(e.to_string()))?;

        Ok(KgState {
            graph_name: GRAPH_NAME.to_string(),
            status: parse_status(&status)?,
            latest_ready_version: latest.map(Version::from),
            current_task_id: task,
            updated_at: parse_time(updated).unwrap_or_else(Utc::now),
        })
    }

    async fn try_acquire(&self, target: GraphStatus, task: &KgTask) -> KgResult<AcquireOutcome> {
        let require_base = target == GraphStatus::Updating;
        let mut rows = self
            .graph()
            .execute(
                query(TRY_ACQUIRE)
                    .param("graph_name", GRAPH_NAME)
                    .param("now", now_param())
                    .param("require_base", require_base)
                    .param("target", target.as_str())
                    .param("task_id", task.task_id.as_str())
                    .param("kind", task.kind.as_str())
                    .param("version", task.version.as_str()),
            )
            .await
            .map_err(store_err)?;

        if let Some(row) = rows.next().await.map_err(store_err)? {
            let base: Option<String> = row
                .get("base_version")
                .map_err(|e| KgError::Store(e.to_string()))?;
            return Ok(AcquireOutcome::Acquired {
                base_version: base.map(Version::from),
            });
        }

        // The guard failed: distinguish a running owner from a missing base.
        let state = self.read_state().await?;
        if state.status.is_running() {
            Ok(AcquireOutcome::Conflict(state))
        } else {
            Ok(AcquireOutcome::NoBase)
        }
    }

    async fn commit_success(&self, task_id: &str, new_version: &Version) -> KgResult<()> {
        let mut rows = self
            .graph()
            .execute(
                query(COMMIT_SUCCESS)
                    .param("graph_name", GRAPH_NAME)
                    .param("now", now_param())
                    .param("task_id", task_id)
                    .param("version", new_version.as_str()),
            )
            .await
            .map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(_) => Ok(()),
            None => Err(KgError::StaleTask(task_id.to_string())),
        }
    }

    async fn commit_failure(&self, task_id: &str, error: &str) -> KgResult<()> {
        let mut rows = self
            .graph()
            .execute(
                query(COMMIT_FAILURE)
                    .param("graph_name", GRAPH_NAME)
                    .param("now", now_param())
                    .param("task_id", task_id)
                    .param("error", error),
            )
            .await
            .map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(_) => Ok(()),
            None => Err(KgError::StaleTask(task_id.to_string())),
        }
    }

    async fn recover_on_startup(&self) -> KgResult<Option<String>> {
        let mut rows = self
            .graph()
            .execute(query(CRASHED_TASK).param("graph_name", GRAPH_NAME))
            .await
            .map_err(store_err)?;
        let Some(row) = rows.next().await.map_err(store_err)? else {
            return Ok(None);
        };
        let task_id: Option<String> = row
            .get("task_id")
            .map_err(|e| KgError::Store(e.to_string()))?;

        match task_id {
            Some(task_id) => {
                self.commit_failure(&task_id, "server restarted").await?;
                Ok(Some(task_id))
            }
            None => {
                warn!("running status with no current task; repairing state row");
                self.graph()
                    .run(
                        query(REPAIR_ORPHANED_STATE)
                            .param("graph_name", GRAPH_NAME)
                            .param("now", now_param()),
                    )
                    .await
                    .map_err(store_err)?;
                Ok(None)
            }
        }
    }

    async fn get_task(&self, task_id: &str) -> KgResult<Option<KgTask>> {
        let mut rows = self
            .graph()
            .execute(query(GET_TASK).param("task_id", task_id))
            .await
            .map_err(store_err)?;
        let Some(row) = rows.next().await.map_err(store_err)? else {
            return Ok(None);
        };

        let get_str = |key: &str| -> KgResult<String> {
            row.get(key).map_err(|e| KgError::Store(e.to_string()))
        };
        let get_opt = |key: &str| -> KgResult<Option<String>> {
            row.get(key).map_err(|e| KgError::Store(e.to_string()))
        };

        let kind: TaskKind = get_str("type")?.parse().map_err(KgError::Store)?;
        let progress: Option<i64> = row
            .get("progress")
            .map_err(|e| KgError::Store(e.to_string()))?;

        Ok(Some(KgTask {
            task_id: get_str("task_id")?,
            kind,
            version: Version::from(get_str("version")?),
            base_version: get_opt("base_version")?.map(Version::from),
            started_at: parse_time(get_opt("started_at")?).unwrap_or_else(Utc::now),
            finished_at: parse_time(get_opt("finished_at")?),
            progress: progress.map(|p| p.clamp(0, 100) as u8),
            error: get_opt("error")?,
        }))
    }

    async fn list_ready_versions(&self) -> KgResult<Vec<Version>> {
        let mut rows = self
            .graph()
            .execute(query(LIST_READY_VERSIONS))
            .await
            .map_err(store_err)?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let v: String = row
                .get("version")
                .map_err(|e| KgError::Store(e.to_string()))?;
            versions.push(Version::from(v));
        }
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }
}
