//! Core domain entities (§3 of the specification): `Document`, `Chunk`,
//! `Artifact`, `Pipeline`/`Stage`, and `Conversation`/`Message`.
//!
//! These are plain data types with small amounts of derived behavior;
//! persistence lives in [`crate::store`], orchestration in
//! [`crate::pipeline`] and [`crate::analyzer`].

pub mod artifact;
pub mod chunk;
pub mod conversation;
pub mod document;
pub mod pipeline;
pub mod stage;

pub use artifact::{Artifact, ArtifactType};
pub use chunk::{Chunk, ChunkBuilder, ChunkType};
pub use conversation::{Citation, Conversation, Message, Role};
pub use document::{Document, DocumentStatus};
pub use pipeline::{AnalysisDepth, Pipeline, PipelineOptions};
pub use stage::{Stage, StageStatus, StageType};
