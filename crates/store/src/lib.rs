//! Store backends for kgraphd
//!
//! Two families of implementations of the `kgraph-core` store traits:
//! - `neo4j`: the production backend. Metadata, task history, and all graph
//!   data live in one Neo4j database; the admission CAS rides on Neo4j's
//!   write serialization so it survives restarts and accidental double
//!   deployment.
//! - `memory`: lock-protected in-process stores with identical semantics,
//!   used by the engine and API test suites.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod neo4j;

pub use memory::{MemoryGraphStore, MemoryMetadataStore};
pub use neo4j::Neo4jStore;
