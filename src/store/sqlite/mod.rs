//! `SQLite`-backed [`RelationalStore`](super::relational::RelationalStore).
//!
//! Keeps the teacher's `SqliteStorage` connection/pragma setup and
//! schema-versioning pattern, wrapped in a `Mutex` so the store can be
//! shared as `Arc<dyn RelationalStore>` across async stage runners
//! (the teacher's `Storage` trait takes `&mut self` under the
//! assumption of a single owner; here the analyzer, pipeline runner,
//! and QA Orchestrator all hold the same store concurrently).

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use schema::{CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL};

use crate::core::{
    Artifact, ArtifactType, Chunk, ChunkBuilder, ChunkMetadata, ChunkType, Citation, Conversation,
    Document, DocumentStatus, Message, Pipeline, PipelineOptions, Role, Stage, StageStatus,
    StageType,
};
use crate::error::{ConflictError, Error, Result, StoreError};

use super::relational::{RelationalStats, RelationalStore};

/// `SQLite`-backed relational store.
pub struct SqliteRelationalStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRelationalStore {
    /// Opens or creates a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Opens an in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path to the backing file, `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON;", [])?;
    let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    Ok(())
}

fn status_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Uploaded => "uploaded",
        DocumentStatus::Summarizing => "summarizing",
        DocumentStatus::Summarized => "summarized",
        DocumentStatus::Indexing => "indexing",
        DocumentStatus::Indexed => "indexed",
        DocumentStatus::Analyzing => "analyzing",
        DocumentStatus::Analyzed => "analyzed",
        DocumentStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<DocumentStatus> {
    Ok(match s {
        "uploaded" => DocumentStatus::Uploaded,
        "summarizing" => DocumentStatus::Summarizing,
        "summarized" => DocumentStatus::Summarized,
        "indexing" => DocumentStatus::Indexing,
        "indexed" => DocumentStatus::Indexed,
        "analyzing" => DocumentStatus::Analyzing,
        "analyzed" => DocumentStatus::Analyzed,
        "failed" => DocumentStatus::Failed,
        other => return Err(Error::from(StoreError::Relational(format!("unknown document status: {other}")))),
    })
}

fn stage_type_str(kind: StageType) -> &'static str {
    match kind {
        StageType::Summary => "summary",
        StageType::Index => "index",
        StageType::Graph => "graph",
        StageType::Analysis => "analysis",
    }
}

fn parse_stage_type(s: &str) -> Result<StageType> {
    Ok(match s {
        "summary" => StageType::Summary,
        "index" => StageType::Index,
        "graph" => StageType::Graph,
        "analysis" => StageType::Analysis,
        other => return Err(Error::from(StoreError::Relational(format!("unknown stage type: {other}")))),
    })
}

fn stage_status_str(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Completed => "completed",
        StageStatus::Failed => "failed",
        StageStatus::Cancelled => "cancelled",
    }
}

fn parse_stage_status(s: &str) -> Result<StageStatus> {
    Ok(match s {
        "pending" => StageStatus::Pending,
        "running" => StageStatus::Running,
        "completed" => StageStatus::Completed,
        "failed" => StageStatus::Failed,
        "cancelled" => StageStatus::Cancelled,
        other => return Err(Error::from(StoreError::Relational(format!("unknown stage status: {other}")))),
    })
}

fn chunk_type_str(kind: ChunkType) -> &'static str {
    match kind {
        ChunkType::Body => "body",
        ChunkType::Heading => "heading",
        ChunkType::List => "list",
        ChunkType::Code => "code",
        ChunkType::Table => "table",
        ChunkType::KeyInfo => "key_info",
    }
}

fn parse_chunk_type(s: &str) -> ChunkType {
    match s {
        "heading" => ChunkType::Heading,
        "list" => ChunkType::List,
        "code" => ChunkType::Code,
        "table" => ChunkType::Table,
        "key_info" => ChunkType::KeyInfo,
        _ => ChunkType::Body,
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, Vec<u8>, String, String, String, i64, i64)> {
    Ok((
        row.get("doc_id")?,
        row.get("filename")?,
        row.get("mime")?,
        row.get("bytes")?,
        row.get("owner_id")?,
        row.get("project_id")?,
        row.get("status")?,
        row.get("created_at")?,
        row.get("updated_at")?,
    ))
}

impl RelationalStore for SqliteRelationalStore {
    fn init(&self) -> Result<()> {
        let conn = self.conn();
        let is_init: i64 = conn.query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))?;
        if is_init == 0 {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
        } else {
            let version: Option<String> = conn.query_row(GET_VERSION_SQL, [], |row| row.get(0)).optional()?;
            if version.is_none() {
                conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
            }
        }
        Ok(())
    }

    fn insert_document(&self, document: &Document) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (doc_id, filename, mime, bytes, owner_id, project_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document.doc_id,
                document.filename,
                document.mime,
                document.bytes,
                document.owner_id,
                document.project_id,
                status_str(document.status),
                document.created_at,
                document.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT doc_id, filename, mime, bytes, owner_id, project_id, status, created_at, updated_at
                 FROM documents WHERE doc_id = ?1",
                params![doc_id],
                row_to_document,
            )
            .optional()?;
        row.map(|(doc_id, filename, mime, bytes, owner_id, project_id, status, created_at, updated_at)| {
            Ok(Document {
                doc_id,
                filename,
                mime,
                bytes,
                owner_id,
                project_id,
                status: parse_status(&status)?,
                created_at,
                updated_at,
            })
        })
        .transpose()
    }

    fn documents_for_project(&self, project_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT doc_id, filename, mime, bytes, owner_id, project_id, status, created_at, updated_at
             FROM documents WHERE project_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_document)?;
        rows.map(|r| {
            r.map_err(Into::into).and_then(
                |(doc_id, filename, mime, bytes, owner_id, project_id, status, created_at, updated_at)| {
                    Ok(Document {
                        doc_id,
                        filename,
                        mime,
                        bytes,
                        owner_id,
                        project_id,
                        status: parse_status(&status)?,
                        created_at,
                        updated_at,
                    })
                },
            )
        })
        .collect()
    }

    fn update_document(&self, document: &Document) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE documents SET filename = ?2, mime = ?3, status = ?4, updated_at = ?5 WHERE doc_id = ?1",
            params![
                document.doc_id,
                document.filename,
                document.mime,
                status_str(document.status),
                document.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(Error::from(crate::error::NotFoundError::Document {
                doc_id: document.doc_id.clone(),
            }));
        }
        Ok(())
    }

    fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(StoreError::from)?;
        tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (doc_id, text, range_start, range_end, chunk_index, chunk_type, strategy, quality_score, context_window, embedding, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    doc_id,
                    chunk.text,
                    chunk.range.start as i64,
                    chunk.range.end as i64,
                    chunk.index as i64,
                    chunk_type_str(chunk.chunk_type),
                    chunk.strategy,
                    f64::from(chunk.quality_score),
                    chunk.context_window,
                    chunk.embedding.as_deref().map(embedding_to_blob),
                    serde_json::to_string(&chunk.metadata)?,
                ],
            )?;
        }
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn get_chunks(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, doc_id, text, range_start, range_end, chunk_index, chunk_type, strategy, quality_score, context_window, embedding, metadata
             FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![doc_id], row_to_chunk)?;
        rows.map(|r| r.map_err(Into::into).and_then(|r| r)).collect()
    }

    fn get_chunk(&self, chunk_id: i64) -> Result<Option<Chunk>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, doc_id, text, range_start, range_end, chunk_index, chunk_type, strategy, quality_score, context_window, embedding, metadata
             FROM chunks WHERE id = ?1",
            params![chunk_id],
            row_to_chunk,
        )
        .optional()?
        .transpose()
    }

    fn insert_pipeline(&self, pipeline: &Pipeline, stages: &[Stage]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pipelines WHERE doc_id = ?1 AND completed = 0 AND interrupted = 0",
            params![pipeline.doc_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(Error::from(ConflictError::ActivePipelineExists {
                doc_id: pipeline.doc_id.clone(),
                pipeline_id: pipeline.pipeline_id.clone(),
            }));
        }
        tx.execute(
            "INSERT INTO pipelines (pipeline_id, doc_id, options, current_stage, overall_progress, interrupted, completed, can_resume, started_at, completed_at, ext)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                pipeline.pipeline_id,
                pipeline.doc_id,
                serde_json::to_string(&pipeline.options)?,
                pipeline.current_stage.map(stage_type_str),
                pipeline.overall_progress,
                pipeline.interrupted,
                pipeline.completed,
                pipeline.can_resume,
                pipeline.started_at,
                pipeline.completed_at,
                serde_json::to_string(&pipeline.ext)?,
            ],
        )?;
        for stage in stages {
            tx.execute(
                "INSERT INTO pipeline_stages (pipeline_id, stage_type, status, progress, started_at, completed_at, duration_seconds, can_interrupt, message, result, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    stage.pipeline_id,
                    stage_type_str(stage.stage_type),
                    stage_status_str(stage.status),
                    stage.progress,
                    stage.started_at,
                    stage.completed_at,
                    stage.duration_seconds,
                    stage.can_interrupt,
                    stage.message,
                    stage.result.as_ref().map(serde_json::Value::to_string),
                    stage.error.as_ref().map(serde_json::to_string).transpose()?,
                ],
            )?;
        }
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT pipeline_id, doc_id, options, current_stage, overall_progress, interrupted, completed, can_resume, started_at, completed_at, ext
             FROM pipelines WHERE pipeline_id = ?1",
            params![pipeline_id],
            row_to_pipeline,
        )
        .optional()?
        .transpose()
    }

    fn update_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE pipelines SET current_stage = ?2, overall_progress = ?3, interrupted = ?4, completed = ?5, can_resume = ?6, completed_at = ?7, ext = ?8 WHERE pipeline_id = ?1",
            params![
                pipeline.pipeline_id,
                pipeline.current_stage.map(stage_type_str),
                pipeline.overall_progress,
                pipeline.interrupted,
                pipeline.completed,
                pipeline.can_resume,
                pipeline.completed_at,
                serde_json::to_string(&pipeline.ext)?,
            ],
        )?;
        if changed == 0 {
            return Err(Error::from(crate::error::NotFoundError::Pipeline {
                pipeline_id: pipeline.pipeline_id.clone(),
            }));
        }
        Ok(())
    }

    fn active_pipeline_for_document(&self, doc_id: &str) -> Result<Option<Pipeline>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT pipeline_id, doc_id, options, current_stage, overall_progress, interrupted, completed, can_resume, started_at, completed_at, ext
             FROM pipelines WHERE doc_id = ?1 AND completed = 0 AND interrupted = 0",
            params![doc_id],
            row_to_pipeline,
        )
        .optional()?
        .transpose()
    }

    fn get_stages(&self, pipeline_id: &str) -> Result<Vec<Stage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, pipeline_id, stage_type, status, progress, started_at, completed_at, duration_seconds, can_interrupt, message, result, error
             FROM pipeline_stages WHERE pipeline_id = ?1 ORDER BY stage_type",
        )?;
        let rows = stmt.query_map(params![pipeline_id], row_to_stage)?;
        rows.map(|r| r.map_err(Into::into).and_then(|r| r)).collect()
    }

    fn update_stage(&self, stage: &Stage) -> Result<()> {
        let Some(id) = stage.id else {
            return Err(Error::internal("cannot update a stage with no assigned id"));
        };
        let changed = self.conn().execute(
            "UPDATE pipeline_stages SET status = ?2, progress = ?3, started_at = ?4, completed_at = ?5, duration_seconds = ?6, message = ?7, result = ?8, error = ?9 WHERE id = ?1",
            params![
                id,
                stage_status_str(stage.status),
                stage.progress,
                stage.started_at,
                stage.completed_at,
                stage.duration_seconds,
                stage.message,
                stage.result.as_ref().map(serde_json::Value::to_string),
                stage.error.as_ref().map(serde_json::to_string).transpose()?,
            ],
        )?;
        if changed == 0 {
            return Err(Error::internal(format!("stage {id} does not exist")));
        }
        Ok(())
    }

    fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.conn().execute(
            "INSERT INTO artifacts (doc_id, artifact_type, version, content, created_at, model_used, token_usage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                artifact.doc_id,
                artifact.artifact_type.as_str(),
                artifact.version,
                artifact.content.to_string(),
                artifact.created_at,
                artifact.model_used,
                artifact.token_usage.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    fn get_latest_artifact(&self, doc_id: &str, artifact_type: ArtifactType) -> Result<Option<Artifact>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, doc_id, artifact_type, version, content, created_at, model_used, token_usage
             FROM artifacts WHERE doc_id = ?1 AND artifact_type = ?2 ORDER BY version DESC LIMIT 1",
            params![doc_id, artifact_type.as_str()],
            row_to_artifact,
        )
        .optional()?
        .transpose()
    }

    fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO conversations (conversation_id, project_id, created_at) VALUES (?1, ?2, ?3)",
            params![conversation.conversation_id, conversation.project_id, conversation.created_at],
        )?;
        Ok(())
    }

    fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT conversation_id, project_id, created_at FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
            |row| {
                Ok(Conversation {
                    conversation_id: row.get(0)?,
                    project_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    fn append_message(&self, message: &Message) -> Result<()> {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        self.conn().execute(
            "INSERT INTO messages (conversation_id, role, content, citations, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.conversation_id,
                role,
                message.content,
                serde_json::to_string(&message.citations)?,
                message.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, citations, created_at FROM messages WHERE conversation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![conversation_id], row_to_message)?;
        rows.map(|r| r.map_err(Into::into).and_then(|r| r)).collect()
    }

    fn stats(&self) -> Result<RelationalStats> {
        let conn = self.conn();
        let document_count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let pipeline_count: i64 = conn.query_row("SELECT COUNT(*) FROM pipelines", [], |row| row.get(0))?;
        let artifact_count: i64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(RelationalStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            pipeline_count: pipeline_count as usize,
            artifact_count: artifact_count as usize,
            schema_version: CURRENT_SCHEMA_VERSION,
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn search_chunks_fts(&self, doc_id: &str, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        // FTS5 bm25() returns negative scores, more negative = better match; negate so
        // higher is better, matching vector cosine similarity's direction.
        let fts_query = query
            .split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(
            r"
            SELECT chunks_fts.rowid, -bm25(chunks_fts) as score
            FROM chunks_fts
            JOIN chunks ON chunks.id = chunks_fts.rowid
            WHERE chunks_fts MATCH ?1 AND chunks.doc_id = ?2
            ORDER BY score DESC
            LIMIT ?3
            ",
        )?;
        let rows = stmt.query_map(params![fts_query, doc_id, limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        })?;
        rows.map(|r| r.map_err(Into::into)).collect()
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Chunk>> {
    let id: i64 = row.get(0)?;
    let doc_id: String = row.get(1)?;
    let text: String = row.get(2)?;
    let range_start: i64 = row.get(3)?;
    let range_end: i64 = row.get(4)?;
    let chunk_index: i64 = row.get(5)?;
    let chunk_type: String = row.get(6)?;
    let strategy: String = row.get(7)?;
    let quality_score: f64 = row.get(8)?;
    let context_window: Option<String> = row.get(9)?;
    let embedding: Option<Vec<u8>> = row.get(10)?;
    let metadata: String = row.get(11)?;

    Ok((|| -> Result<Chunk> {
        let mut chunk = ChunkBuilder::new()
            .doc_id(doc_id)
            .text(text)
            .range(range_start as usize..range_end as usize)
            .index(chunk_index as usize)
            .chunk_type(parse_chunk_type(&chunk_type))
            .strategy(strategy)
            .quality_score(quality_score as f32)
            .build();
        chunk.id = Some(id);
        if let Some(cw) = context_window {
            chunk.context_window = Some(cw);
        }
        chunk.embedding = embedding.as_deref().map(blob_to_embedding);
        chunk.metadata = serde_json::from_str::<ChunkMetadata>(&metadata)?;
        Ok(chunk)
    })())
}

fn row_to_pipeline(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Pipeline>> {
    let pipeline_id: String = row.get(0)?;
    let doc_id: String = row.get(1)?;
    let options: String = row.get(2)?;
    let current_stage: Option<String> = row.get(3)?;
    let overall_progress: f64 = row.get(4)?;
    let interrupted: bool = row.get(5)?;
    let completed: bool = row.get(6)?;
    let can_resume: bool = row.get(7)?;
    let started_at: i64 = row.get(8)?;
    let completed_at: Option<i64> = row.get(9)?;
    let ext: String = row.get(10)?;

    Ok((|| -> Result<Pipeline> {
        Ok(Pipeline {
            pipeline_id,
            doc_id,
            options: serde_json::from_str::<PipelineOptions>(&options)?,
            current_stage: current_stage.map(|s| parse_stage_type(&s)).transpose()?,
            overall_progress,
            interrupted,
            completed,
            can_resume,
            started_at,
            completed_at,
            ext: serde_json::from_str(&ext)?,
        })
    })())
}

fn row_to_stage(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Stage>> {
    let id: i64 = row.get(0)?;
    let pipeline_id: String = row.get(1)?;
    let stage_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let progress: i64 = row.get(4)?;
    let started_at: Option<i64> = row.get(5)?;
    let completed_at: Option<i64> = row.get(6)?;
    let duration_seconds: Option<i64> = row.get(7)?;
    let can_interrupt: bool = row.get(8)?;
    let message: Option<String> = row.get(9)?;
    let result: Option<String> = row.get(10)?;
    let error: Option<String> = row.get(11)?;

    Ok((|| -> Result<Stage> {
        Ok(Stage {
            id: Some(id),
            pipeline_id,
            stage_type: parse_stage_type(&stage_type)?,
            status: parse_stage_status(&status)?,
            progress: progress as u8,
            started_at,
            completed_at,
            duration_seconds,
            can_interrupt,
            message,
            result: result.map(|r| serde_json::from_str(&r)).transpose()?,
            error: error.map(|e| serde_json::from_str(&e)).transpose()?,
        })
    })())
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Artifact>> {
    let id: i64 = row.get(0)?;
    let doc_id: String = row.get(1)?;
    let artifact_type: String = row.get(2)?;
    let version: i64 = row.get(3)?;
    let content: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let model_used: Option<String> = row.get(6)?;
    let token_usage: Option<i64> = row.get(7)?;

    Ok((|| -> Result<Artifact> {
        let artifact_type = match artifact_type.as_str() {
            "summary" => ArtifactType::Summary,
            "outline" => ArtifactType::Outline,
            "knowledge_graph" => ArtifactType::KnowledgeGraph,
            "analysis_report" => ArtifactType::AnalysisReport,
            other => return Err(Error::from(StoreError::Relational(format!("unknown artifact type: {other}")))),
        };
        Ok(Artifact {
            id: Some(id),
            doc_id,
            artifact_type,
            version: version as u32,
            content: serde_json::from_str(&content)?,
            created_at,
            model_used,
            token_usage: token_usage.map(|v| v as u64),
        })
    })())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Message>> {
    let id: i64 = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let content: String = row.get(3)?;
    let citations: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;

    Ok((|| -> Result<Message> {
        let role = match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => return Err(Error::from(StoreError::Relational(format!("unknown message role: {other}")))),
        };
        Ok(Message {
            id: Some(id),
            conversation_id,
            role,
            content,
            citations: serde_json::from_str::<Vec<Citation>>(&citations)?,
            created_at,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, Pipeline, PipelineOptions, Stage, StageType};

    fn store() -> SqliteRelationalStore {
        let store = SqliteRelationalStore::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    #[test]
    fn document_round_trips() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hello".to_vec(), "u1", "p1", 100);
        store.insert_document(&doc).unwrap();
        let fetched = store.get_document("d1").unwrap().unwrap();
        assert_eq!(fetched.bytes, b"hello");
        assert_eq!(fetched.status, DocumentStatus::Uploaded);
    }

    #[test]
    fn chunks_replace_atomically() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hello world".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        let chunks = vec![ChunkBuilder::new().doc_id("d1").text("hello").range(0..5).index(0).build()];
        store.replace_chunks("d1", &chunks).unwrap();
        assert_eq!(store.get_chunks("d1").unwrap().len(), 1);
        store.replace_chunks("d1", &[]).unwrap();
        assert!(store.get_chunks("d1").unwrap().is_empty());
    }

    #[test]
    fn second_active_pipeline_is_rejected() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        let options = PipelineOptions::default();
        let p1 = Pipeline::new("pipe-1", "d1", options, 0);
        store.insert_pipeline(&p1, &[Stage::new("pipe-1", StageType::Summary)]).unwrap();

        let p2 = Pipeline::new("pipe-2", "d1", options, 0);
        let err = store.insert_pipeline(&p2, &[Stage::new("pipe-2", StageType::Summary)]).unwrap_err();
        assert_eq!(err.code(), "Conflict");
    }

    #[test]
    fn completed_pipeline_frees_the_slot() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        let options = PipelineOptions::default();
        let mut p1 = Pipeline::new("pipe-1", "d1", options, 0);
        store.insert_pipeline(&p1, &[Stage::new("pipe-1", StageType::Summary)]).unwrap();
        p1.mark_completed(10);
        store.update_pipeline(&p1).unwrap();

        let p2 = Pipeline::new("pipe-2", "d1", options, 0);
        store.insert_pipeline(&p2, &[Stage::new("pipe-2", StageType::Summary)]).unwrap();
    }

    #[test]
    fn artifact_versions_are_independently_retrievable() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        let a1 = Artifact::new("d1", ArtifactType::Summary, serde_json::json!("v1"), 0);
        store.insert_artifact(&a1).unwrap();
        let a2 = a1.next_version(serde_json::json!("v2"), 1);
        store.insert_artifact(&a2).unwrap();

        let latest = store.get_latest_artifact("d1", ArtifactType::Summary).unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.content, serde_json::json!("v2"));
    }

    #[test]
    fn messages_preserve_conversation_order() {
        let store = store();
        let convo = Conversation::new("c1", "p1", 0);
        store.insert_conversation(&convo).unwrap();
        store.append_message(&Message::user("c1", "first", 0)).unwrap();
        store.append_message(&Message::user("c1", "second", 1)).unwrap();

        let messages = store.get_messages("c1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn documents_for_project_excludes_other_projects() {
        let store = store();
        store.insert_document(&Document::new("d1", "a.txt", "text/plain", b"a".to_vec(), "u1", "proj-a", 0)).unwrap();
        store.insert_document(&Document::new("d2", "b.txt", "text/plain", b"b".to_vec(), "u1", "proj-a", 1)).unwrap();
        store.insert_document(&Document::new("d3", "c.txt", "text/plain", b"c".to_vec(), "u1", "proj-b", 2)).unwrap();

        let docs = store.documents_for_project("proj-a").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.project_id == "proj-a"));
    }

    #[test]
    fn fts_search_is_scoped_to_document() {
        let store = store();
        let d1 = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        let d2 = Document::new("d2", "g.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&d1).unwrap();
        store.insert_document(&d2).unwrap();
        store
            .replace_chunks("d1", &[ChunkBuilder::new().doc_id("d1").text("rust programming language").range(0..26).index(0).build()])
            .unwrap();
        store
            .replace_chunks("d2", &[ChunkBuilder::new().doc_id("d2").text("rust programming language").range(0..26).index(0).build()])
            .unwrap();

        let hits = store.search_chunks_fts("d1", "rust", 10).unwrap();
        assert_eq!(hits.len(), 1);

        let d1_chunks = store.get_chunks("d1").unwrap();
        assert_eq!(hits[0].0, d1_chunks[0].id.unwrap());
    }

    #[test]
    fn embedding_round_trips_through_blob() {
        let store = store();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        let mut chunk = ChunkBuilder::new().doc_id("d1").text("hi").range(0..2).index(0).build();
        chunk.embedding = Some(vec![0.1, 0.2, -0.3]);
        store.replace_chunks("d1", std::slice::from_ref(&chunk)).unwrap();

        let fetched = &store.get_chunks("d1").unwrap()[0];
        let embedding = fetched.embedding.as_ref().unwrap();
        assert!((embedding[0] - 0.1).abs() < 1e-6);
        assert!((embedding[2] + 0.3).abs() < 1e-6);
    }
}
