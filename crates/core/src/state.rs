//! Durable metadata records
//!
//! `KgState` is the singleton row that gates all writes: at most one task may
//! hold a running status at a time, and `latest_ready_version` is the only
//! publication point for completed builds. `KgTask` is the per-trigger
//! history record.

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The single graph this instance manages.
pub const GRAPH_NAME: &str = "default";

/// Global state of the graph.
///
/// Admitting states accept new triggers; `Building` and `Updating` reject
/// them with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphStatus {
    /// No build has ever been triggered.
    Idle,
    /// A full build pipeline is running.
    Building,
    /// An incremental update pipeline is running.
    Updating,
    /// The last pipeline committed successfully.
    Ready,
    /// The last pipeline failed; a ready version may still exist.
    Failed,
}

impl GraphStatus {
    /// Whether a new trigger may be admitted in this state.
    pub fn is_admitting(self) -> bool {
        !self.is_running()
    }

    /// Whether a pipeline currently owns the state.
    pub fn is_running(self) -> bool {
        matches!(self, GraphStatus::Building | GraphStatus::Updating)
    }

    /// The canonical uppercase name stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            GraphStatus::Idle => "IDLE",
            GraphStatus::Building => "BUILDING",
            GraphStatus::Updating => "UPDATING",
            GraphStatus::Ready => "READY",
            GraphStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for GraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(GraphStatus::Idle),
            "BUILDING" => Ok(GraphStatus::Building),
            "UPDATING" => Ok(GraphStatus::Updating),
            "READY" => Ok(GraphStatus::Ready),
            "FAILED" => Ok(GraphStatus::Failed),
            other => Err(format!("unknown graph status: {other}")),
        }
    }
}

/// The singleton metadata row.
///
/// Invariants maintained by the metadata store:
/// - `status` is running ⇔ `current_task_id` is set
/// - `latest_ready_version` only ever advances to strictly greater versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KgState {
    /// Primary key; fixed to [`GRAPH_NAME`] for this single-graph instance.
    pub graph_name: String,
    /// Current position in the state machine.
    pub status: GraphStatus,
    /// The last published version, if any build ever completed.
    pub latest_ready_version: Option<Version>,
    /// Task that currently owns the state, while running.
    pub current_task_id: Option<String>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl KgState {
    /// Fresh state for a graph that has never been built.
    pub fn initial() -> Self {
        KgState {
            graph_name: GRAPH_NAME.to_string(),
            status: GraphStatus::Idle,
            latest_ready_version: None,
            current_task_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// What kind of pipeline a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Rebuild the graph from the full data set.
    FullBuild,
    /// Extend the latest ready graph from new data.
    IncrementalUpdate,
}

impl TaskKind {
    /// The running status a task of this kind holds while executing.
    pub fn running_status(self) -> GraphStatus {
        match self {
            TaskKind::FullBuild => GraphStatus::Building,
            TaskKind::IncrementalUpdate => GraphStatus::Updating,
        }
    }

    /// The snake_case name stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::FullBuild => "full_build",
            TaskKind::IncrementalUpdate => "incremental_update",
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_build" => Ok(TaskKind::FullBuild),
            "incremental_update" => Ok(TaskKind::IncrementalUpdate),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

/// One trigger's history record.
///
/// Immutable once `finished_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KgTask {
    /// Unique id; equal to the task's version.
    pub task_id: String,
    /// Pipeline kind.
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// The version this task writes under.
    pub version: Version,
    /// For incremental updates, the version the build extends.
    pub base_version: Option<Version>,
    /// When the trigger was admitted.
    pub started_at: DateTime<Utc>,
    /// When the pipeline reached a terminal state; `None` while running.
    pub finished_at: Option<DateTime<Utc>>,
    /// Coarse completion percentage, when the pipeline reports it.
    pub progress: Option<u8>,
    /// Failure message; set only on failed tasks.
    pub error: Option<String>,
}

impl KgTask {
    /// A new running task of the given kind. The version doubles as the id.
    pub fn new(kind: TaskKind, version: Version) -> Self {
        KgTask {
            task_id: version.as_str().to_string(),
            kind,
            version,
            base_version: None,
            started_at: Utc::now(),
            finished_at: None,
            progress: Some(0),
            error: None,
        }
    }
}
