//! Build orchestration for kgraphd
//!
//! This crate owns everything between a trigger and a published version:
//! - Orchestrator: admission through the metadata CAS, pipeline execution,
//!   commit/failure handling, startup recovery
//! - Retention: the post-commit sweep of old versions
//! - Hooks: the data-source registry and built-in implementations
//! - Extraction: the LLM-backed extractor and its upstream clients
//!
//! The engine is the only component that coordinates across the stores, the
//! extractor, and the limiter. It never retries a pipeline; retries live
//! inside the rate-limited caller, and clients retry triggers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extract;
pub mod hooks;
pub mod llm;
pub mod orchestrator;
pub mod retention;
pub mod testing;

pub use extract::LlmExtractor;
pub use hooks::{register_builtin_hooks, register_hooks, resolve_hooks, FsHooks, StaticHooks};
pub use orchestrator::{Orchestrator, TriggerReceipt};
