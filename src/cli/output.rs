//! Output formatting for CLI commands.
//!
//! Supports text, JSON, and NDJSON output formats.

use serde::Serialize;
use std::fmt::Write;

use crate::core::{Artifact, Document, Pipeline};
use crate::progress::ProgressSnapshot;
use crate::qa::AnswerPacket;
use crate::search::RetrievedChunk;
use crate::store::RelationalStats;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
    /// Newline-delimited JSON (NDJSON) for streaming.
    /// Each record is a single JSON object on its own line.
    Ndjson,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" | "stream" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Returns true if this format is a streaming format.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Ndjson)
    }
}

/// Formats aggregate store statistics.
#[must_use]
pub fn format_status(stats: &RelationalStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_status_text(stats),
        OutputFormat::Json | OutputFormat::Ndjson => format_json(stats),
    }
}

fn format_status_text(stats: &RelationalStats) -> String {
    let mut output = String::new();
    output.push_str("DPA Status\n");
    output.push_str("==========\n\n");
    let _ = writeln!(output, "  Documents:  {}", stats.document_count);
    let _ = writeln!(output, "  Chunks:     {}", stats.chunk_count);
    let _ = writeln!(output, "  Pipelines:  {}", stats.pipeline_count);
    let _ = writeln!(output, "  Artifacts:  {}", stats.artifact_count);
    let _ = writeln!(output, "  Schema:     v{}", stats.schema_version);
    output
}

/// Formats the result of an upload (and, if requested, the pipeline
/// it started).
#[must_use]
pub fn format_upload(document: &Document, pipeline_id: Option<&str>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Uploaded {} as document {}", document.filename, document.doc_id);
            let _ = writeln!(output, "  Size:   {}", format_size(document.size()));
            let _ = writeln!(output, "  Status: {:?}", document.status);
            if let Some(id) = pipeline_id {
                let _ = writeln!(output, "  Pipeline: {id}");
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            #[derive(Serialize)]
            struct UploadResult<'a> {
                doc_id: &'a str,
                filename: &'a str,
                status: crate::core::DocumentStatus,
                pipeline_id: Option<&'a str>,
            }
            format_json(&UploadResult {
                doc_id: &document.doc_id,
                filename: &document.filename,
                status: document.status,
                pipeline_id,
            })
        }
    }
}

/// Formats a freshly started or resumed pipeline id.
#[must_use]
pub fn format_pipeline_started(pipeline_id: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("Started pipeline {pipeline_id}\n"),
        OutputFormat::Json | OutputFormat::Ndjson => format_json(&serde_json::json!({ "pipeline_id": pipeline_id })),
    }
}

/// Formats a one-word acknowledgement of an interrupt/resume request.
#[must_use]
pub fn format_pipeline_action(action: &str, pipeline_id: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{action} pipeline {pipeline_id}\n"),
        OutputFormat::Json | OutputFormat::Ndjson => {
            format_json(&serde_json::json!({ "action": action, "pipeline_id": pipeline_id }))
        }
    }
}

/// Formats a polled progress snapshot.
#[must_use]
pub fn format_progress(snapshot: &ProgressSnapshot, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Pipeline {} (document {})", snapshot.pipeline_id, snapshot.doc_id);
            let _ = writeln!(output, "  Overall: {:.0}%", snapshot.overall_progress * 100.0);
            let _ = writeln!(output, "  Terminal: {}", snapshot.terminal);
            for stage in &snapshot.stages {
                let _ = writeln!(output, "  {:?}: {:?} ({}%)", stage.stage_type, stage.status, stage.progress);
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(snapshot),
    }
}

/// Formats one live progress event (used while `--follow`ing, one
/// record per line regardless of format since the caller streams).
#[must_use]
pub fn format_progress_event(event: &crate::progress::ProgressEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let stage = event.stage_type.map_or_else(|| "-".to_string(), |s| format!("{s:?}"));
            let status = event.stage_status.map_or_else(|| "-".to_string(), |s| format!("{s:?}"));
            format!(
                "[{}] {stage} -> {status} ({:.0}%) overall={:.0}%{}\n",
                event.pipeline_id,
                f64::from(event.stage_progress.unwrap_or(0)),
                event.overall_progress * 100.0,
                event.message.as_deref().map_or_else(String::new, |m| format!(" ({m})")),
            )
        }
        OutputFormat::Json | OutputFormat::Ndjson => format!("{}\n", format_json(event)),
    }
}

/// Formats a pipeline's current persisted state.
#[must_use]
pub fn format_pipeline(pipeline: &Pipeline, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Pipeline {} (document {})", pipeline.pipeline_id, pipeline.doc_id);
            let _ = writeln!(output, "  Completed:   {}", pipeline.completed);
            let _ = writeln!(output, "  Interrupted: {}", pipeline.interrupted);
            let _ = writeln!(output, "  Can resume:  {}", pipeline.can_resume);
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(pipeline),
    }
}

/// Formats an artifact.
#[must_use]
pub fn format_artifact(artifact: &Artifact, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Artifact {} v{} for document {}", artifact.artifact_type.as_str(), artifact.version, artifact.doc_id);
            let _ = writeln!(
                output,
                "{}",
                serde_json::to_string_pretty(&artifact.content).unwrap_or_default()
            );
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(artifact),
    }
}

/// Formats a [`QaOrchestrator::answer`](crate::qa::QaOrchestrator::answer) result.
#[must_use]
pub fn format_answer(packet: &AnswerPacket, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "{}", packet.answer);
            if !packet.citations.is_empty() {
                output.push_str("\nCitations:\n");
                for citation in &packet.citations {
                    let _ = writeln!(
                        output,
                        "  [chunk {}] {} (score {:.3}, {:?})",
                        citation.chunk_id, citation.doc_id, citation.score, citation.source
                    );
                }
            }
            if !packet.uncited_sentences.is_empty() {
                output.push_str("\nUncited sentences:\n");
                for sentence in &packet.uncited_sentences {
                    let _ = writeln!(output, "  {sentence}");
                }
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(packet),
    }
}

/// Formats a list of retrieved chunks.
#[must_use]
pub fn format_retrieval(chunks: &[RetrievedChunk], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if chunks.is_empty() {
                return "No matching chunks.\n".to_string();
            }
            let mut output = String::new();
            for chunk in chunks {
                let _ = writeln!(
                    output,
                    "[chunk {}] {} (score {:.3}, {:?})",
                    chunk.chunk_id, chunk.doc_id, chunk.score, chunk.source
                );
                let _ = writeln!(output, "  {}", truncate(&chunk.text.replace('\n', " "), 160));
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json_chunks(chunks),
    }
}

fn format_json_chunks(chunks: &[RetrievedChunk]) -> String {
    #[derive(Serialize)]
    struct ChunkOut<'a> {
        doc_id: &'a str,
        chunk_id: i64,
        score: f64,
        source: crate::search::RetrievalSource,
        text: &'a str,
    }
    let out: Vec<ChunkOut<'_>> = chunks
        .iter()
        .map(|c| ChunkOut {
            doc_id: &c.doc_id,
            chunk_id: c.chunk_id,
            score: c.score,
            source: c.source,
            text: &c.text,
        })
        .collect();
    format_json(&out)
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats an error for output.
///
/// When format is JSON or NDJSON, returns a structured error object.
/// When format is Text, returns the error message string.
#[must_use]
pub fn format_error(error: &crate::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let suggestion = get_error_suggestion(error);
            let json = serde_json::json!({
                "success": false,
                "error": {
                    "type": error.code(),
                    "message": error.to_string(),
                    "retriable": error.retriable(),
                    "suggestion": suggestion
                }
            });
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

/// A short recovery suggestion for the error kinds where one is
/// obvious from the CLI surface alone.
const fn get_error_suggestion(error: &crate::Error) -> Option<&'static str> {
    use crate::error::{ConflictError, InputError, NotFoundError};

    match error {
        crate::Error::Input(InputError::UnsupportedMime { .. }) => {
            Some("supported mime types: text/plain, text/markdown, text/html, application/json")
        }
        crate::Error::Input(InputError::EmptyDocument) => Some("the uploaded file had no content"),
        crate::Error::NotFound(NotFoundError::Document { .. }) => Some("check the document id with a prior upload"),
        crate::Error::NotFound(NotFoundError::Pipeline { .. }) => Some("check the pipeline id returned by upload/process"),
        crate::Error::NotFound(NotFoundError::Artifact { .. }) => Some("the requested stage may not have run yet"),
        crate::Error::NotFound(NotFoundError::Conversation { .. }) => Some("omit --conversation to start a new one"),
        crate::Error::Conflict(ConflictError::ActivePipelineExists { .. }) => {
            Some("wait for the active pipeline to finish, or interrupt it first")
        }
        crate::Error::Conflict(ConflictError::NotResumable { .. }) => Some("this pipeline cannot be resumed"),
        crate::Error::GatewayTransient(_) | crate::Error::StoreUnavailable(_) => Some("this operation is retriable"),
        _ => None,
    }
}

/// Formats a byte size as human-readable.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s[..max_len].to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactType, DocumentStatus};
    use crate::error::{InputError, NotFoundError};
    use crate::search::RetrievalSource;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("unknown"), OutputFormat::Text);
    }

    #[test]
    fn test_output_format_ndjson() {
        assert_eq!(OutputFormat::parse("ndjson"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("NDJSON"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("jsonl"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("stream"), OutputFormat::Ndjson);
        assert!(OutputFormat::Ndjson.is_streaming());
        assert!(!OutputFormat::Json.is_streaming());
        assert!(!OutputFormat::Text.is_streaming());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(100), "100 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello World", 8), "Hello...");
    }

    #[test]
    fn test_format_pipeline_action() {
        let text = format_pipeline_action("Interrupted", "pipe-1", OutputFormat::Text);
        assert!(text.contains("Interrupted pipeline pipe-1"));
        let json = format_pipeline_action("Resumed", "pipe-1", OutputFormat::Json);
        assert!(json.contains("\"action\": \"Resumed\""));
    }

    #[test]
    fn test_format_status() {
        let stats = RelationalStats {
            document_count: 2,
            chunk_count: 10,
            pipeline_count: 1,
            artifact_count: 3,
            schema_version: 1,
        };
        let text = format_status(&stats, OutputFormat::Text);
        assert!(text.contains("Documents:  2"));
        let json = format_status(&stats, OutputFormat::Json);
        assert!(json.contains("\"document_count\": 2"));
    }

    #[test]
    fn test_format_upload() {
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        let text = format_upload(&doc, Some("pipe-1"), OutputFormat::Text);
        assert!(text.contains("d1"));
        assert!(text.contains("pipe-1"));
        let json = format_upload(&doc, None, OutputFormat::Json);
        assert!(json.contains("\"doc_id\""));
    }

    #[test]
    fn test_format_artifact() {
        let artifact = Artifact::new("d1", ArtifactType::Summary, serde_json::json!({"summary_500": "x"}), 0);
        let text = format_artifact(&artifact, OutputFormat::Text);
        assert!(text.contains("summary"));
        let json = format_artifact(&artifact, OutputFormat::Json);
        assert!(json.contains("\"artifact_type\""));
    }

    #[test]
    fn test_format_retrieval_empty() {
        let chunks: Vec<RetrievedChunk> = Vec::new();
        let text = format_retrieval(&chunks, OutputFormat::Text);
        assert!(text.contains("No matching chunks"));
        let json = format_retrieval(&chunks, OutputFormat::Json);
        assert!(json.contains('['));
    }

    #[test]
    fn test_format_retrieval_with_data() {
        let chunks = vec![RetrievedChunk {
            doc_id: "d1".to_string(),
            chunk_id: 1,
            text: "hello world".to_string(),
            score: 0.75,
            source: RetrievalSource::Fused,
        }];
        let text = format_retrieval(&chunks, OutputFormat::Text);
        assert!(text.contains("chunk 1"));
        assert!(text.contains("hello world"));
        let json = format_retrieval(&chunks, OutputFormat::Json);
        assert!(json.contains("\"chunk_id\": 1"));
    }

    #[test]
    fn test_format_error_text() {
        let err: crate::Error = InputError::EmptyDocument.into();
        let text = format_error(&err, OutputFormat::Text);
        assert!(text.contains("empty"));
    }

    #[test]
    fn test_format_error_json_has_suggestion() {
        let err: crate::Error = NotFoundError::Document { doc_id: "d1".to_string() }.into();
        let json = format_error(&err, OutputFormat::Json);
        assert!(json.contains("\"type\": \"NotFound\""));
        assert!(json.contains("suggestion"));
    }

    #[test]
    fn document_status_in_upload_output() {
        let mut doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        doc.set_status(DocumentStatus::Indexed, 10);
        let json = format_upload(&doc, None, OutputFormat::Json);
        assert!(json.contains("indexed"));
    }
}
