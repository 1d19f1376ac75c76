//! Error types for the knowledge-graph service
//!
//! One unified error enum covers every layer. The HTTP surface maps each
//! variant to one of the wire error codes via [`KgError::code`]; variants
//! that never surface over HTTP (pipeline-internal failures recorded on the
//! task) fall back to the generic store code.

use crate::state::GraphStatus;
use std::io;
use thiserror::Error;

/// Result type alias for kgraphd operations.
pub type KgResult<T> = std::result::Result<T, KgError>;

/// Error types for the knowledge-graph service.
#[derive(Debug, Error)]
pub enum KgError {
    /// A pipeline already owns the state; the trigger lost the admission CAS.
    #[error("task {task_id} is already running with status {status}")]
    TaskRunning {
        /// The running status observed at admission.
        status: GraphStatus,
        /// The task holding the state.
        task_id: String,
        /// The version that task writes under.
        version: String,
    },

    /// Incremental update was triggered before any full build completed.
    #[error("incremental update requires a prior completed full build")]
    NoBaseVersion,

    /// A read arrived before any version was published.
    #[error("no completed graph version is available")]
    NoReadyVersion,

    /// A data hook raised. Message is prefixed `hook:` when recorded.
    #[error("hook: {0}")]
    Hook(String),

    /// Extraction failed: retries exhausted or a permanent upstream error.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Graph database error.
    #[error("graph database error: {0}")]
    Store(String),

    /// A commit was attempted by a task that no longer owns the state.
    #[error("task {0} is not the current task")]
    StaleTask(String),

    /// The pipeline exceeded its configured wall-time budget.
    #[error("pipeline exceeded {0}s timeout")]
    Timeout(u64),

    /// The pipeline was cancelled by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed client input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Invalid or unloadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (config file, hook file access).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl KgError {
    /// The wire error code for this error.
    ///
    /// The code set is closed: {TASK_RUNNING, NO_BASE_VERSION, HOOK_FAILED,
    /// NEO4J_ERROR, BAD_REQUEST, NOT_FOUND}. Pipeline-internal variants map
    /// to NEO4J_ERROR, the generic server-side code.
    pub fn code(&self) -> &'static str {
        match self {
            KgError::TaskRunning { .. } => "TASK_RUNNING",
            KgError::NoBaseVersion => "NO_BASE_VERSION",
            KgError::NoReadyVersion => "NOT_FOUND",
            KgError::Hook(_) => "HOOK_FAILED",
            KgError::BadRequest(_) | KgError::Config(_) => "BAD_REQUEST",
            KgError::Store(_)
            | KgError::StaleTask(_)
            | KgError::Extraction(_)
            | KgError::Timeout(_)
            | KgError::Cancelled
            | KgError::Io(_) => "NEO4J_ERROR",
        }
    }

    /// Whether this error aborted a pipeline because of cancellation or
    /// timeout rather than a component failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, KgError::Timeout(_) | KgError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_stay_in_the_closed_set() {
        let all = [
            KgError::TaskRunning {
                status: GraphStatus::Building,
                task_id: "1".into(),
                version: "1".into(),
            },
            KgError::NoBaseVersion,
            KgError::NoReadyVersion,
            KgError::Hook("boom".into()),
            KgError::Extraction("boom".into()),
            KgError::Store("boom".into()),
            KgError::StaleTask("1".into()),
            KgError::Timeout(30),
            KgError::Cancelled,
            KgError::BadRequest("boom".into()),
            KgError::Config("boom".into()),
        ];
        let allowed = [
            "TASK_RUNNING",
            "NO_BASE_VERSION",
            "HOOK_FAILED",
            "NEO4J_ERROR",
            "BAD_REQUEST",
            "NOT_FOUND",
        ];
        for e in &all {
            assert!(allowed.contains(&e.code()), "unexpected code {}", e.code());
        }
    }

    #[test]
    fn hook_message_carries_prefix() {
        assert_eq!(
            KgError::Hook("source unavailable".into()).to_string(),
            "hook: source unavailable"
        );
    }
}
