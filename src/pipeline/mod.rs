//! The Processing Pipeline (§4.G): runs a document's requested stages
//! (SUMMARY, INDEX, GRAPH, ANALYSIS) in fixed order, each under a
//! deadline and a cancellation token, reporting through the
//! [`crate::progress`] bus.
//!
//! Stage-timeout default and cancellation-token plumbing are grounded
//! in the sibling repo's `AgentConfig` (`timeout: Duration`,
//! `DEFAULT_TIMEOUT_SECS`); the race between stage work, a deadline
//! sleep, and a cancellation signal is the conventional
//! `tokio::select!` shape, using `tokio_util::sync::CancellationToken`
//! (already in the dependency set used by the `tokio` ecosystem this
//! crate otherwise builds on).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::core::{
    Artifact, ArtifactType, ChunkType, DocumentStatus, Pipeline, PipelineOptions, Stage,
    StageStatus, StageType,
};
use crate::error::{ConflictError, Error, ErrorObject, NotFoundError, Result};
use crate::gateway::Gateway;
use crate::progress::ProgressBus;
use crate::store::{GraphStore, KvStore, RelationalStore, VectorStore};

/// Default per-stage timeout (§4.G / §6.2): ten minutes.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;

/// Drives a [`Pipeline`] through its enabled [`Stage`]s.
///
/// Held as `Arc<PipelineRunner>` by callers so `start`/`resume` can
/// spawn the run as a detached task and return the pipeline id
/// immediately (§5: "non-blocking submission").
pub struct PipelineRunner {
    relational: Arc<dyn RelationalStore>,
    analyzer: Analyzer,
    vector: Arc<dyn VectorStore>,
    gateway: Arc<dyn Gateway>,
    progress: Arc<ProgressBus>,
    stage_timeout: Duration,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl PipelineRunner {
    /// Creates a runner over the given capability ports, with the
    /// default stage timeout.
    #[must_use]
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        gateway: Arc<dyn Gateway>,
        checkpoints: Arc<dyn KvStore>,
        progress: Arc<ProgressBus>,
    ) -> Self {
        let analyzer = Analyzer::new(relational.clone(), graph, gateway.clone(), checkpoints);
        Self {
            relational,
            analyzer,
            vector,
            gateway,
            progress,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the per-stage timeout (§6.2 cascading configuration).
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Creates and persists a new pipeline for `doc_id`, spawns its
    /// execution, and returns immediately with the pipeline id.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::ActivePipelineExists`] if `doc_id`
    /// already has an active pipeline (§5 uniqueness invariant).
    pub async fn start(self: &Arc<Self>, doc_id: &str, options: PipelineOptions, now: i64) -> Result<String> {
        if let Some(active) = self.relational.active_pipeline_for_document(doc_id)? {
            return Err(Error::from(ConflictError::ActivePipelineExists {
                doc_id: doc_id.to_string(),
                pipeline_id: active.pipeline_id,
            }));
        }

        let pipeline_id = new_id("pipeline");
        let pipeline = Pipeline::new(pipeline_id.clone(), doc_id, options, now);
        let stages: Vec<Stage> = options
            .enabled_stages()
            .into_iter()
            .map(|stage_type| Stage::new(pipeline_id.clone(), stage_type))
            .collect();
        self.relational.insert_pipeline(&pipeline, &stages)?;

        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(pipeline_id.clone(), token.clone());

        let runner = Arc::clone(self);
        let spawn_id = pipeline_id.clone();
        tokio::spawn(async move {
            runner.run_to_completion(&spawn_id, token).await;
        });

        Ok(pipeline_id)
    }

    /// Resumes an interrupted, resumable pipeline from its next pending
    /// or incomplete stage.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::NotResumable`] if the pipeline is not
    /// `interrupted` with `can_resume`, or [`NotFoundError::Pipeline`]
    /// if it does not exist.
    pub async fn resume(self: &Arc<Self>, pipeline_id: &str) -> Result<()> {
        let pipeline = self
            .relational
            .get_pipeline(pipeline_id)?
            .ok_or_else(|| Error::from(NotFoundError::Pipeline { pipeline_id: pipeline_id.to_string() }))?;
        if !pipeline.interrupted || !pipeline.can_resume {
            return Err(Error::from(ConflictError::NotResumable {
                pipeline_id: pipeline_id.to_string(),
            }));
        }

        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(pipeline_id.to_string(), token.clone());

        let runner = Arc::clone(self);
        let spawn_id = pipeline_id.to_string();
        tokio::spawn(async move {
            runner.run_to_completion(&spawn_id, token).await;
        });
        Ok(())
    }

    /// Signals cancellation for a running pipeline. Honored at the next
    /// safe point (a stage boundary); does not block for that to
    /// happen.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Pipeline`] if the pipeline is not
    /// currently running under this runner.
    pub fn interrupt(&self, pipeline_id: &str) -> Result<()> {
        let tokens = self.tokens.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let token = tokens
            .get(pipeline_id)
            .ok_or_else(|| Error::from(NotFoundError::Pipeline { pipeline_id: pipeline_id.to_string() }))?;
        token.cancel();
        Ok(())
    }

    async fn run_to_completion(self: Arc<Self>, pipeline_id: &str, token: CancellationToken) {
        if let Err(err) = self.run(pipeline_id, &token).await {
            warn!(%pipeline_id, %err, "pipeline run ended with an infrastructure error");
        }
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(pipeline_id);
    }

    async fn run(&self, pipeline_id: &str, token: &CancellationToken) -> Result<()> {
        let Some(mut pipeline) = self.relational.get_pipeline(pipeline_id)? else {
            return Ok(());
        };
        let mut stages = self.relational.get_stages(pipeline_id)?;
        stages.sort_by_key(|s| s.stage_type);

        for i in 0..stages.len() {
            if matches!(stages[i].status, StageStatus::Completed | StageStatus::Failed) {
                continue;
            }
            stages[i].reset_for_resume();

            pipeline.current_stage = Some(stages[i].stage_type);
            if !stages[i].transition(StageStatus::Running, now_unix()) {
                continue;
            }
            self.progress.publish_stage_update(&pipeline, &stages[i], &stages, None, now_unix())?;

            let outcome = tokio::select! {
                () = token.cancelled() => StageOutcome::Cancelled,
                () = tokio::time::sleep(self.stage_timeout) => StageOutcome::TimedOut,
                result = self.run_stage_work(&pipeline, &stages[i]) => StageOutcome::Finished(result),
            };

            match outcome {
                StageOutcome::Finished(Ok(())) => {
                    stages[i].set_progress(100);
                    let _ = stages[i].transition(StageStatus::Completed, now_unix());
                }
                StageOutcome::Finished(Err(err)) => {
                    stages[i].error = Some(ErrorObject::from(&err));
                    let _ = stages[i].transition(StageStatus::Failed, now_unix());
                    pipeline.mark_interrupted();
                    pipeline.can_resume = err.retriable();
                    self.finalize_document_status(&pipeline.doc_id, DocumentStatus::Failed)?;
                    let message = err.to_string();
                    self.progress.publish_stage_update(&pipeline, &stages[i], &stages, Some(message), now_unix())?;
                    return Ok(());
                }
                StageOutcome::Cancelled => {
                    let _ = stages[i].transition(StageStatus::Cancelled, now_unix());
                    pipeline.mark_interrupted();
                    pipeline.can_resume = true;
                    self.progress.publish_stage_update(&pipeline, &stages[i], &stages, Some("interrupted".to_string()), now_unix())?;
                    return Ok(());
                }
                StageOutcome::TimedOut => {
                    // Deadline expiry always fails the stage, never
                    // cancels it, regardless of `can_interrupt` (see
                    // `DESIGN.md`'s resolution of this open question).
                    let timeout_err = Error::from(crate::error::CancelledError::DeadlineExceeded {
                        deadline_secs: self.stage_timeout.as_secs(),
                    });
                    stages[i].error = Some(ErrorObject::from(&timeout_err));
                    let _ = stages[i].transition(StageStatus::Failed, now_unix());
                    pipeline.mark_interrupted();
                    pipeline.can_resume = false;
                    self.progress.publish_stage_update(&pipeline, &stages[i], &stages, Some("timed out".to_string()), now_unix())?;
                    return Ok(());
                }
            }

            let progress_pairs: Vec<(StageType, u8)> = stages.iter().map(|s| (s.stage_type, s.progress)).collect();
            pipeline.recompute_overall_progress(&progress_pairs);
            self.progress.publish_stage_update(&pipeline, &stages[i], &stages, None, now_unix())?;
        }

        pipeline.mark_completed(now_unix());
        self.finalize_document_status(&pipeline.doc_id, DocumentStatus::Analyzed)?;
        if let Some(last) = stages.last().cloned() {
            self.progress.publish_stage_update(&pipeline, &last, &stages, Some("pipeline completed".to_string()), now_unix())?;
        } else {
            self.relational.update_pipeline(&pipeline)?;
        }
        Ok(())
    }

    async fn run_stage_work(&self, pipeline: &Pipeline, stage: &Stage) -> Result<()> {
        match stage.stage_type {
            StageType::Summary => self.run_summary_stage(&pipeline.doc_id).await,
            StageType::Index => self.run_index_stage(&pipeline.doc_id).await,
            StageType::Graph => self.run_graph_stage(&pipeline.doc_id).await,
            StageType::Analysis => {
                self.run_analysis_stage(&pipeline.doc_id, &pipeline.pipeline_id, pipeline.options).await
            }
        }
    }

    async fn run_summary_stage(&self, doc_id: &str) -> Result<()> {
        let (summary, _chunks) = self.analyzer.quick_summary(doc_id).await?;
        let content = serde_json::json!({ "summary_500": summary.words_500, "summary_2000": summary.words_2000 });
        self.persist_artifact(doc_id, ArtifactType::Summary, content)?;
        self.advance_document_status(doc_id, DocumentStatus::Summarized)
    }

    async fn run_index_stage(&self, doc_id: &str) -> Result<()> {
        let document = self
            .relational
            .get_document(doc_id)?
            .ok_or_else(|| Error::from(NotFoundError::Document { doc_id: doc_id.to_string() }))?;
        let outcome = crate::chunking::default_chunker().chunk_with_outcome(doc_id, &document.text(), None, None)?;
        self.relational.replace_chunks(doc_id, &outcome.into_chunks())?;
        let chunks = self.relational.get_chunks(doc_id)?;

        if chunks.is_empty() {
            return self.advance_document_status(doc_id, DocumentStatus::Indexed);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.gateway.embed(&texts).await?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let Some(id) = chunk.id else { continue };
            let payload = serde_json::json!({
                "text": chunk.text,
                "index": chunk.index,
                "chunk_type": matches!(chunk.chunk_type, ChunkType::Body),
            });
            self.vector.upsert(doc_id, &id.to_string(), embedding, payload).await?;
        }

        self.advance_document_status(doc_id, DocumentStatus::Indexed)
    }

    async fn run_graph_stage(&self, doc_id: &str) -> Result<()> {
        let (entities, relations) = self.analyzer.quick_graph(doc_id).await?;
        let content = serde_json::json!({
            "entity_count": entities.len(),
            "relation_count": relations.len(),
        });
        self.persist_artifact(doc_id, ArtifactType::KnowledgeGraph, content)?;
        Ok(())
    }

    /// The analysis run id is the owning pipeline id, so a cancelled
    /// stage resumes from its analyzer checkpoint instead of starting a
    /// fresh run under a new id (§4.G).
    async fn run_analysis_stage(&self, doc_id: &str, run_id: &str, options: PipelineOptions) -> Result<()> {
        match self.analyzer.resume(doc_id, run_id).await {
            Ok(_) => Ok(()),
            Err(Error::NotFound(_)) => {
                self.analyzer.run(doc_id, "comprehensive analysis", options.analysis_depth, run_id).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn persist_artifact(&self, doc_id: &str, artifact_type: ArtifactType, content: serde_json::Value) -> Result<()> {
        let now = now_unix();
        let artifact = match self.relational.get_latest_artifact(doc_id, artifact_type)? {
            Some(existing) => existing.next_version(content, now),
            None => Artifact::new(doc_id, artifact_type, content, now),
        };
        self.relational.insert_artifact(&artifact)
    }

    fn advance_document_status(&self, doc_id: &str, status: DocumentStatus) -> Result<()> {
        self.finalize_document_status(doc_id, status)
    }

    fn finalize_document_status(&self, doc_id: &str, status: DocumentStatus) -> Result<()> {
        if let Some(mut document) = self.relational.get_document(doc_id)? {
            document.set_status(status, now_unix());
            self.relational.update_document(&document)?;
        }
        Ok(())
    }
}

enum StageOutcome {
    Finished(Result<()>),
    Cancelled,
    TimedOut,
}

fn now_unix() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    )
    .unwrap_or(0)
}

/// Generates a unique id prefixed for readability in logs and CLI
/// output.
fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}
