//! Post-commit version retention
//!
//! After each successful commit the sweeper lists all published versions,
//! keeps the newest `max_versions`, and deletes the rest. The currently
//! latest version is never deleted, whatever the listing says. Sweep
//! problems are logged and never fail the just-committed task.

use kgraph_core::config::RetentionConfig;
use kgraph_core::{GraphStore, MetadataStore};
use tracing::{info, warn};

/// Run one retention sweep.
pub async fn sweep(meta: &dyn MetadataStore, graph: &dyn GraphStore, cfg: &RetentionConfig) {
    if !cfg.enable_cleanup {
        return;
    }
    let keep = cfg.max_versions.max(1);

    let versions = match meta.list_ready_versions().await {
        Ok(versions) => versions,
        Err(e) => {
            warn!(error = %e, "retention sweep could not list versions");
            return;
        }
    };
    let latest = match meta.read_state().await {
        Ok(state) => state.latest_ready_version,
        Err(e) => {
            warn!(error = %e, "retention sweep could not read state");
            return;
        }
    };

    for stale in versions.iter().skip(keep) {
        if latest.as_ref() == Some(stale) {
            warn!(version = %stale, "refusing to sweep the latest ready version");
            continue;
        }
        match graph.delete_version(stale).await {
            Ok(nodes) => info!(version = %stale, nodes, "retention sweep removed version"),
            Err(e) => warn!(version = %stale, error = %e, "retention sweep failed for version"),
        }
    }
}
