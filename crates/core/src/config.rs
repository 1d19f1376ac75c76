//! YAML configuration tree
//!
//! The file path is given on the command line; every section is optional and
//! falls back to defaults, so a minimal deployment only names the Neo4j
//! endpoint. Secrets support `*_env` indirection, resolved against the
//! process environment at use time so the file itself can be committed.

use crate::error::{KgError, KgResult};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Graph database connection.
    pub neo4j: Neo4jConfig,
    /// Version retention policy.
    pub retention: RetentionConfig,
    /// Read-path defaults.
    pub query: QueryConfig,
    /// Data-source hook selection.
    pub hooks: HooksConfig,
    /// Pipeline-level limits.
    pub task: TaskConfig,
    /// Chat-completion upstream used for extraction.
    pub llm: LlmConfig,
    /// Embeddings upstream; extraction skips embeddings when unset.
    pub embeddings: Option<UpstreamConfig>,
}

impl Config {
    /// Load and parse the YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> KgResult<Config> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&raw)
            .map_err(|e| KgError::Config(format!("{}: {e}", path.as_ref().display())))
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Allowed CORS origins; `"*"` allows any.
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8040,
            cors_allow_origins: vec!["*".to_string()],
        }
    }
}

/// Graph database connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Bolt URI.
    pub uri: String,
    /// Username.
    pub username: String,
    /// Literal password; prefer `password_env` outside development.
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,
    /// Database name; the server default when unset.
    pub database: Option<String>,
}

impl Neo4jConfig {
    /// Resolve the password, preferring the literal over the env indirection.
    pub fn resolved_password(&self) -> KgResult<String> {
        if let Some(p) = self.password.as_ref().filter(|p| !p.is_empty()) {
            return Ok(p.clone());
        }
        if let Some(var) = &self.password_env {
            return std::env::var(var)
                .map_err(|_| KgError::Config(format!("neo4j password env {var} is not set")));
        }
        Err(KgError::Config(
            "neo4j.password or neo4j.password_env is required".to_string(),
        ))
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Neo4jConfig {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: None,
            password_env: Some("NEO4J_PASSWORD".to_string()),
            database: None,
        }
    }
}

/// Version retention policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How many READY versions to keep, newest first. Must be positive.
    pub max_versions: usize,
    /// Whether the post-commit sweep runs at all.
    pub enable_cleanup: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            max_versions: 3,
            enable_cleanup: true,
        }
    }
}

/// Read-path defaults applied when a query omits its limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Node cap for `/kg/query`.
    pub default_limit_nodes: usize,
    /// Edge cap for `/kg/query`.
    pub default_limit_edges: usize,
    /// BFS depth for keyword subgraph expansion.
    pub default_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_limit_nodes: 200,
            default_limit_edges: 400,
            default_depth: 1,
        }
    }
}

/// Data-source hook selection.
///
/// `module` names an entry in the hook registry; hook implementations are
/// registered at program start, not loaded from an import path. `full` and
/// `incremental` are passed through to the selected implementation, which may
/// use them to pick sub-sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Registry key of the hook implementation.
    pub module: String,
    /// Implementation-specific selector for the full-data source.
    pub full: Option<String>,
    /// Implementation-specific selector for the incremental source.
    pub incremental: Option<String>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        HooksConfig {
            module: "fs".to_string(),
            full: None,
            incremental: None,
        }
    }
}

/// Pipeline-level limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Wall-time budget for one pipeline, in seconds. Unlimited when unset.
    pub timeout_s: Option<u64>,
}

/// Requests-per-minute and tokens-per-minute caps over a 60 s sliding window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute; unlimited when unset.
    pub rpm: Option<u32>,
    /// Tokens per minute; unlimited when unset.
    pub tpm: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            rpm: Some(60),
            tpm: Some(90_000),
        }
    }
}

/// Cap on simultaneously outstanding upstream calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Hard cap on in-flight calls.
    pub max_in_flight: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        ConcurrencyConfig { max_in_flight: 4 }
    }
}

/// Exponential backoff retry policy for transient upstream errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay, seconds.
    pub initial_backoff_s: f64,
    /// Backoff ceiling, seconds.
    pub max_backoff_s: f64,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_backoff_s: 1.0,
            max_backoff_s: 30.0,
            backoff_multiplier: 2.0,
        }
    }
}

/// One upstream API endpoint with its traffic policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Literal API key; prefer `api_key_env` outside development.
    pub api_key: Option<String>,
    /// Name of an environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    pub api_base_url: String,
    /// Model identifier.
    pub model: String,
    /// RPM/TPM caps.
    pub rate_limit: RateLimitConfig,
    /// In-flight cap.
    pub concurrency: ConcurrencyConfig,
    /// Transient-error retry policy.
    pub retry: RetryConfig,
}

impl UpstreamConfig {
    /// Resolve the API key, preferring the literal over the env indirection.
    /// Returns `None` when neither is configured (keyless local endpoints).
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(k) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(k.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            api_key: None,
            api_key_env: None,
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            rate_limit: RateLimitConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// The chat-completion upstream plus sampling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Endpoint and traffic policy.
    #[serde(flatten)]
    pub upstream: UpstreamConfig,
    /// Completion token cap per call.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Repetition penalty; passed through to compatible providers.
    pub repetition_penalty: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            upstream: UpstreamConfig::default(),
            max_tokens: 2048,
            temperature: 0.0,
            repetition_penalty: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 8040);
        assert_eq!(cfg.retention.max_versions, 3);
        assert!(cfg.retention.enable_cleanup);
        assert_eq!(cfg.query.default_depth, 1);
        assert!(cfg.embeddings.is_none());
        assert_eq!(cfg.hooks.module, "fs");
        assert!(cfg.task.timeout_s.is_none());
    }

    #[test]
    fn sections_parse() {
        let cfg: Config = serde_yaml::from_str(
            r#"
server:
  host: 127.0.0.1
  port: 9000
  cors_allow_origins: ["http://localhost:3000"]
neo4j:
  uri: bolt://db:7687
  username: neo4j
  password: secret
retention:
  max_versions: 2
  enable_cleanup: false
query:
  default_limit_nodes: 50
task:
  timeout_s: 600
llm:
  api_base_url: http://llm:8000/v1
  model: qwen2.5-32b
  max_tokens: 4096
  temperature: 0.2
  rate_limit:
    rpm: 120
    tpm: 200000
  concurrency:
    max_in_flight: 8
  retry:
    max_retries: 5
    initial_backoff_s: 0.5
embeddings:
  api_base_url: http://emb:8000/v1
  model: bge-m3
"#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.neo4j.resolved_password().unwrap(), "secret");
        assert_eq!(cfg.retention.max_versions, 2);
        assert!(!cfg.retention.enable_cleanup);
        assert_eq!(cfg.query.default_limit_nodes, 50);
        // Unset query fields keep their defaults
        assert_eq!(cfg.query.default_limit_edges, 400);
        assert_eq!(cfg.task.timeout_s, Some(600));
        assert_eq!(cfg.llm.upstream.model, "qwen2.5-32b");
        assert_eq!(cfg.llm.upstream.rate_limit.rpm, Some(120));
        assert_eq!(cfg.llm.upstream.concurrency.max_in_flight, 8);
        assert_eq!(cfg.llm.upstream.retry.max_retries, 5);
        assert_eq!(cfg.llm.max_tokens, 4096);
        assert_eq!(cfg.embeddings.as_ref().unwrap().model, "bge-m3");
    }

    #[test]
    fn password_env_indirection() {
        std::env::set_var("KG_TEST_NEO4J_PW", "from-env");
        let cfg: Neo4jConfig = serde_yaml::from_str(
            r#"
uri: bolt://db:7687
username: neo4j
password_env: KG_TEST_NEO4J_PW
"#,
        )
        .unwrap();
        assert_eq!(cfg.resolved_password().unwrap(), "from-env");
    }

    #[test]
    fn missing_password_is_a_config_error() {
        let cfg = Neo4jConfig {
            password: None,
            password_env: None,
            ..Neo4jConfig::default()
        };
        assert!(matches!(
            cfg.resolved_password(),
            Err(KgError::Config(_))
        ));
    }
}
