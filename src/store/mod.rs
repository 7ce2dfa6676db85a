//! Store Adapters (§4.D): capability ports the core consumes for
//! persistence, each with an in-memory Mock so the engine runs
//! without external services.
//!
//! Generalizes the teacher's single `Storage` trait into five ports:
//! a synchronous relational store (kept as the teacher's
//! `rusqlite`-backed pattern) plus async vector/graph/KV/blob ports
//! new to this specification.

pub mod blob;
pub mod graph;
pub mod kv;
pub mod relational;
pub mod sqlite;
pub mod vector;

pub use blob::{BlobStore, MockBlobStore};
pub use graph::{GraphEntity, GraphRelation, GraphStore, MockGraphStore};
pub use kv::{KvStore, MockKvStore};
pub use relational::{RelationalStats, RelationalStore};
pub use sqlite::SqliteRelationalStore;
pub use vector::{MockVectorStore, VectorHit, VectorStore};
#[cfg(feature = "usearch-hnsw")]
pub use vector::UsearchVectorStore;

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "dpa-state.db";

/// Default database path relative to the working directory, overridable
/// via `--db`/`DPA_DB_PATH` (§6.1).
pub const DEFAULT_DB_PATH: &str = ".dpa/dpa-state.db";
