//! Data-source hook registry and built-ins
//!
//! Hook implementations are registered under a name at program start;
//! `hooks.module` in the configuration selects one. The configuration names
//! a registry key, never an import path.
//!
//! Built-ins:
//! - `fs`: text files under a directory; incremental means files modified
//!   after the base version's timestamp
//! - [`StaticHooks`]: fixed in-process chunks, for tests and demos

use async_trait::async_trait;
use kgraph_core::config::HooksConfig;
use kgraph_core::{DataHooks, KgError, KgResult, Version};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::info;

/// Builds a hook implementation from its configuration section.
pub type HookFactory = fn(&HooksConfig) -> KgResult<Arc<dyn DataHooks>>;

static HOOK_REGISTRY: Lazy<RwLock<HashMap<String, HookFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a hook implementation under `name`. Later registrations of the
/// same name win, so embedders can shadow the built-ins.
pub fn register_hooks(name: &str, factory: HookFactory) {
    HOOK_REGISTRY.write().insert(name.to_string(), factory);
    info!(hook = name, "registered data hook");
}

/// Register the built-in hook implementations. Called once from `main`.
pub fn register_builtin_hooks() {
    register_hooks("fs", |cfg| Ok(Arc::new(FsHooks::from_config(cfg))));
}

/// Resolve the configured hook implementation from the registry.
pub fn resolve_hooks(cfg: &HooksConfig) -> KgResult<Arc<dyn DataHooks>> {
    let registry = HOOK_REGISTRY.read();
    let factory = registry.get(&cfg.module).ok_or_else(|| {
        KgError::Config(format!(
            "hooks.module {:?} is not registered (available: {:?})",
            cfg.module,
            registry.keys().collect::<Vec<_>>()
        ))
    })?;
    factory(cfg)
}

// ============================================================================
// fs hook
// ============================================================================

/// Reads chunks from text files under one directory.
///
/// Full data is every `.txt`/`.md` file in filename order; incremental data
/// is the subset whose modification time is after the base version's
/// timestamp. That interpretation of "since" suits versions generated by
/// this service (epoch milliseconds); foreign version strings yield the full
/// set again.
pub struct FsHooks {
    root: PathBuf,
}

impl FsHooks {
    /// A hook rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsHooks { root: root.into() }
    }

    /// Root directory comes from `hooks.full`, defaulting to `./data`.
    pub fn from_config(cfg: &HooksConfig) -> Self {
        FsHooks::new(cfg.full.clone().unwrap_or_else(|| "./data".to_string()))
    }

    async fn chunk_files(&self, modified_after_ms: Option<i64>) -> KgResult<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| KgError::Hook(format!("{}: {e}", self.root.display())))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| KgError::Hook(e.to_string()))?
        {
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "txt" || ext == "md");
            if !is_text {
                continue;
            }
            if let Some(cutoff) = modified_after_ms {
                let modified = entry
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .map_err(|e| KgError::Hook(e.to_string()))?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                if millis <= cutoff {
                    continue;
                }
            }
            names.push(path);
        }
        names.sort();

        let mut chunks = Vec::with_capacity(names.len());
        for path in names {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| KgError::Hook(format!("{}: {e}", path.display())))?;
            if !text.trim().is_empty() {
                chunks.push(text);
            }
        }
        Ok(chunks)
    }
}

#[async_trait]
impl DataHooks for FsHooks {
    async fn full_data(&self) -> KgResult<Vec<String>> {
        self.chunk_files(None).await
    }

    async fn incremental_data(&self, since_version: &Version) -> KgResult<Vec<String>> {
        self.chunk_files(since_version.timestamp_millis()).await
    }
}

// ============================================================================
// static hook
// ============================================================================

/// Fixed chunks handed out as-is. Test and demo seam.
#[derive(Debug, Clone, Default)]
pub struct StaticHooks {
    full: Vec<String>,
    incremental: Vec<String>,
}

impl StaticHooks {
    /// A hook serving `full` for rebuilds and `incremental` for updates.
    pub fn new(full: Vec<String>, incremental: Vec<String>) -> Self {
        StaticHooks { full, incremental }
    }
}

#[async_trait]
impl DataHooks for StaticHooks {
    async fn full_data(&self) -> KgResult<Vec<String>> {
        Ok(self.full.clone())
    }

    async fn incremental_data(&self, _since_version: &Version) -> KgResult<Vec<String>> {
        Ok(self.incremental.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn fs_hook_reads_text_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("b.txt", "second"), ("a.txt", "first"), ("skip.json", "{}")] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(body.as_bytes()).unwrap();
        }

        let hook = FsHooks::new(dir.path());
        let chunks = hook.full_data().await.unwrap();
        assert_eq!(chunks, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn fs_hook_incremental_filters_by_version_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "old").unwrap();

        let hook = FsHooks::new(dir.path());
        // A version far in the future excludes everything
        let future = Version::from("9999999999999");
        assert!(hook.incremental_data(&future).await.unwrap().is_empty());

        // A version at epoch includes everything
        let epoch = Version::from("0");
        assert_eq!(hook.incremental_data(&epoch).await.unwrap(), vec!["old"]);
    }

    #[tokio::test]
    async fn fs_hook_raises_on_missing_directory() {
        let hook = FsHooks::new("/definitely/not/here");
        assert!(matches!(
            hook.full_data().await,
            Err(KgError::Hook(_))
        ));
    }

    #[tokio::test]
    async fn registry_resolves_registered_modules() {
        register_builtin_hooks();
        let cfg = HooksConfig {
            module: "fs".to_string(),
            full: Some("/tmp".to_string()),
            incremental: None,
        };
        assert!(resolve_hooks(&cfg).is_ok());

        let missing = HooksConfig {
            module: "postgres".to_string(),
            full: None,
            incremental: None,
        };
        assert!(matches!(resolve_hooks(&missing), Err(KgError::Config(_))));
    }
}
