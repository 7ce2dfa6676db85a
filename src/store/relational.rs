//! The relational store port (§4.D): typed repositories for the five
//! persisted entities of §3, generalizing the teacher's `Storage`
//! trait (`init`/`is_initialized`/`reset` plus buffer/chunk CRUD) to
//! `Document`/`Pipeline`+`Stage`/`Artifact`/`Conversation`+`Message`.

use crate::core::{
    Artifact, ArtifactType, Chunk, Conversation, Document, Message, Pipeline, Stage,
};
use crate::error::Result;

/// Aggregate counts mirroring the teacher's `StorageStats`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RelationalStats {
    /// Number of documents stored.
    pub document_count: usize,
    /// Number of chunks stored across all documents.
    pub chunk_count: usize,
    /// Number of pipelines stored.
    pub pipeline_count: usize,
    /// Number of artifacts stored.
    pub artifact_count: usize,
    /// Schema version, as reported by the backing store.
    pub schema_version: u32,
}

/// Typed persistence for the five core entities plus chunks.
///
/// Implementations must be `Send + Sync`; the Pipeline runner and QA
/// Orchestrator both hold a shared `Arc<dyn RelationalStore>`.
pub trait RelationalStore: Send + Sync {
    /// Initializes the schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    fn init(&self) -> Result<()>;

    // ---- Document ----

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document already exists or insertion fails.
    fn insert_document(&self, document: &Document) -> Result<()>;

    /// Fetches a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document(&self, doc_id: &str) -> Result<Option<Document>>;

    /// Fetches all documents belonging to a project, used to scope the
    /// Hybrid Retriever and QA Orchestrator to a project's corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn documents_for_project(&self, project_id: &str) -> Result<Vec<Document>>;

    /// Persists an updated document (status/timestamps).
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist or update fails.
    fn update_document(&self, document: &Document) -> Result<()>;

    // ---- Chunks ----

    /// Replaces all chunks for `doc_id` with `chunks` transactionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Fetches all chunks for a document, in source order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_chunks(&self, doc_id: &str) -> Result<Vec<Chunk>>;

    /// Fetches a single chunk by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_chunk(&self, chunk_id: i64) -> Result<Option<Chunk>>;

    // ---- Pipeline / Stage ----

    /// Inserts a new pipeline together with its initial stage rows,
    /// enforcing the at-most-one-active-pipeline-per-document
    /// invariant (§5) as a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConflictError::ActivePipelineExists`]
    /// (surfaced as `Error::Conflict`) if `doc_id` already has an
    /// active pipeline.
    fn insert_pipeline(&self, pipeline: &Pipeline, stages: &[Stage]) -> Result<()>;

    /// Fetches a pipeline by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>>;

    /// Persists pipeline-level field updates (progress, flags).
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline does not exist or update fails.
    fn update_pipeline(&self, pipeline: &Pipeline) -> Result<()>;

    /// Returns the active (not completed, not interrupted) pipeline
    /// for a document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn active_pipeline_for_document(&self, doc_id: &str) -> Result<Option<Pipeline>>;

    /// Fetches all stages of a pipeline, ordered by stage type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_stages(&self, pipeline_id: &str) -> Result<Vec<Stage>>;

    /// Persists a stage row update (status, progress, result, error).
    ///
    /// # Errors
    ///
    /// Returns an error if the stage does not exist or update fails.
    fn update_stage(&self, stage: &Stage) -> Result<()>;

    // ---- Artifact ----

    /// Inserts a new artifact version.
    ///
    /// # Errors
    ///
    /// Returns an error if insertion fails.
    fn insert_artifact(&self, artifact: &Artifact) -> Result<()>;

    /// Fetches the latest version of an artifact for `(doc_id, type)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_latest_artifact(
        &self,
        doc_id: &str,
        artifact_type: ArtifactType,
    ) -> Result<Option<Artifact>>;

    // ---- Conversation / Message ----

    /// Inserts a new conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if insertion fails.
    fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Fetches a conversation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Appends a message to a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if insertion fails.
    fn append_message(&self, message: &Message) -> Result<()>;

    /// Fetches all messages of a conversation, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Aggregate statistics, mirroring the teacher's `Storage::stats`.
    ///
    /// # Errors
    ///
    /// Returns an error if any underlying count query fails.
    fn stats(&self) -> Result<RelationalStats>;

    // ---- Keyword search ----

    /// Full-text search over `doc_id`'s chunks, keyword leg of the
    /// Hybrid Retriever (§4.E). Returns `(chunk_id, score)` pairs
    /// ordered descending by score (higher is better).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search_chunks_fts(&self, doc_id: &str, query: &str, limit: usize) -> Result<Vec<(i64, f64)>>;
}
