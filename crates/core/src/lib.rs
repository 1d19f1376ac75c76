//! Core types for the knowledge-graph service
//!
//! This crate defines the vocabulary shared by every other layer:
//! - Version: timestamp-string identifier of one complete graph build
//! - KgState / KgTask: the durable metadata records
//! - Graph records: nodes, edges, and the read-side views
//! - Error: the unified error type for all kgraphd APIs
//! - Config: the YAML configuration tree
//! - Traits: the MetadataStore / GraphStore / DataHooks / Extractor seams
//!
//! The crate is deliberately free of I/O. Store backends, the HTTP surface,
//! and the pipeline engine all depend on this crate and never on each other's
//! internals.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod graph;
pub mod state;
pub mod traits;
pub mod version;

pub use config::{
    Config, ConcurrencyConfig, HooksConfig, LlmConfig, Neo4jConfig, QueryConfig, RateLimitConfig,
    RetentionConfig, RetryConfig, ServerConfig, TaskConfig, UpstreamConfig,
};
pub use error::{KgError, KgResult};
pub use graph::{
    EdgeRecord, EdgeView, GraphSlice, GraphStats, KnowledgeGraph, NodeKey, NodeRecord, NodeView,
    PropertyBag,
};
pub use state::{GraphStatus, KgState, KgTask, TaskKind, GRAPH_NAME};
pub use traits::{AcquireOutcome, DataHooks, Extractor, GraphStore, MetadataStore};
pub use version::Version;
