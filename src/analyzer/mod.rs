//! The Advanced Document Analyzer (§4.F): a state machine over one
//! document's cognitive stages, `prepare -> macro -> explore ->
//! critique -> integrate -> output -> done`, plus `failed`.
//!
//! Flattens the "cyclic references between Analyzer and sub-agents"
//! pattern into pure node functions over [`AnalyzerState`], restructured
//! as an explicit `match` over [`Stage`] rather than one long async
//! function since every stage must checkpoint. Per-stage retry reuses
//! the gateway's own [`crate::gateway::retry_with_backoff`] rather than
//! a second backoff implementation, since it already encodes the N=2
//! bounded-retry shape this stage runner needs.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::{default_chunker, ChunkConfig, FixedChunker};
use crate::core::{Artifact, ArtifactType, Chunk, Document, PipelineOptions};
use crate::core::pipeline::AnalysisDepth;
use crate::error::{Error, Result};
use crate::gateway::{retry_with_backoff, CompletionRequest, Gateway, RetryConfig};
use crate::store::{GraphEntity, GraphRelation, GraphStore, KvStore, RelationalStore};
use crate::text::{detect_structure, SectionKind};

/// Cognitive stage of the analyzer's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Load text, detect language/type, produce the initial chunk set.
    Prepare,
    /// Progressive summaries and the four-dimensional outline.
    Macro,
    /// Knowledge graph construction.
    Explore,
    /// Evidence chains, cross-references, critical-thinking signals.
    Critique,
    /// Executive summary, key insights, action items.
    Integrate,
    /// Persist the analysis report artifact.
    Output,
    /// Terminal success.
    Done,
    /// Terminal failure; see `AnalyzerState.errors` for the reason.
    Failed,
}

/// One dimension of the outline produced by the `macro` stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outline {
    /// Logical (argument-structure) headings.
    pub logical: Vec<String>,
    /// Topical groupings.
    pub topical: Vec<String>,
    /// Temporal/sequential markers.
    pub temporal: Vec<String>,
    /// Causal chains.
    pub causal: Vec<String>,
}

/// The five progressive summary levels the `macro` stage produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroSummary {
    /// ~50-word gist.
    pub words_50: String,
    /// ~200-word summary.
    pub words_200: String,
    /// ~500-word summary. This is the level persisted as the SUMMARY
    /// stage's artifact content (see `DESIGN.md`'s resolution of the
    /// overlapping-summary-representations open question).
    pub words_500: String,
    /// ~1000-word summary.
    pub words_1000: String,
    /// ~2000-word summary.
    pub words_2000: String,
}

/// A claim plus the evidence chain supporting it (`critique` stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// The claim text.
    pub text: String,
    /// Supporting passages or chunk references.
    pub support: Vec<String>,
    /// Strength score in `[0, 1]`.
    pub strength: f32,
}

/// Wall-clock duration spent in one stage, recorded for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDuration {
    /// Which stage this measures.
    pub stage: Stage,
    /// Elapsed seconds.
    pub seconds: i64,
}

/// The analyzer's full working state, checkpointed after every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerState {
    /// Document under analysis.
    pub doc_id: String,
    /// Identifies this run among possibly several for the same document.
    pub run_id: String,
    /// Free-text analysis goal.
    pub goal: String,
    /// Requested depth.
    pub depth: AnalysisDepth,
    /// Current stage.
    pub stage: Stage,
    /// Chunk set produced by `prepare` (and possibly re-chunked once on
    /// the outline-quality loop-back).
    pub chunks: Vec<Chunk>,
    /// Four-dimensional outline from `macro`.
    pub outline: Outline,
    /// Progressive summaries from `macro`.
    pub summary: MacroSummary,
    /// Entities extracted by `explore`.
    pub entities: Vec<GraphEntity>,
    /// Relations extracted by `explore`.
    pub relations: Vec<GraphRelation>,
    /// Claims analyzed by `critique`.
    pub claims: Vec<Claim>,
    /// Mean evidence strength across `claims`, `0.0` if none.
    pub evidence_strength: f32,
    /// Logical fallacies / skewed framing noted by `critique`.
    pub biases: Vec<String>,
    /// Unstated assumptions noted by `critique`.
    pub assumptions: Vec<String>,
    /// Executive summary from `integrate`.
    pub synthesis: Option<String>,
    /// Concrete next steps from `integrate`.
    pub action_items: Vec<String>,
    /// Overall confidence in `[0, 1]`.
    pub confidence: f32,
    /// Gateway tokens consumed so far.
    pub tokens_used: u64,
    /// Per-stage wall-clock durations, in the order they ran.
    pub durations: Vec<StageDuration>,
    /// Accumulated error messages, one per failed attempt.
    pub errors: Vec<String>,
    /// Whether `prepare` has already been re-run once on a low-quality
    /// outline; bounds the loop-back to at most one retry (§4.F).
    prepare_rerun_done: bool,
}

impl AnalyzerState {
    /// Creates a fresh state at `Stage::Prepare`.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, run_id: impl Into<String>, goal: impl Into<String>, depth: AnalysisDepth) -> Self {
        Self {
            doc_id: doc_id.into(),
            run_id: run_id.into(),
            goal: goal.into(),
            depth,
            stage: Stage::Prepare,
            chunks: Vec::new(),
            outline: Outline::default(),
            summary: MacroSummary::default(),
            entities: Vec::new(),
            relations: Vec::new(),
            claims: Vec::new(),
            evidence_strength: 0.0,
            biases: Vec::new(),
            assumptions: Vec::new(),
            synthesis: None,
            action_items: Vec::new(),
            confidence: 0.0,
            tokens_used: 0,
            durations: Vec::new(),
            errors: Vec::new(),
            prepare_rerun_done: false,
        }
    }
}

/// Number of attempts (including the first) per stage before giving up,
/// matching the spec's "N=2 retries" (two retries, three attempts).
const STAGE_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_attempts: 3,
    base_delay: Duration::from_millis(200),
    max_delay: Duration::from_secs(10),
};

/// Outline-quality threshold below which `prepare` is re-run once with
/// a plain fixed-size chunker instead of the hybrid one.
const OUTLINE_QUALITY_THRESHOLD: f32 = 0.15;

fn checkpoint_key(doc_id: &str, run_id: &str) -> String {
    format!("analyzer_checkpoint:{doc_id}:{run_id}")
}

/// Drives [`AnalyzerState`] through its cognitive stages, checkpointing
/// after every transition via the KV store port.
pub struct Analyzer {
    relational: Arc<dyn RelationalStore>,
    graph: Arc<dyn GraphStore>,
    gateway: Arc<dyn Gateway>,
    checkpoints: Arc<dyn KvStore>,
}

impl Analyzer {
    /// Creates an analyzer over the given capability ports.
    #[must_use]
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        graph: Arc<dyn GraphStore>,
        gateway: Arc<dyn Gateway>,
        checkpoints: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            relational,
            graph,
            gateway,
            checkpoints,
        }
    }

    /// Runs a fresh analysis of `doc_id` at `depth` toward `goal`,
    /// driving every stage to a terminal state (`Done` or `Failed`).
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures (checkpoint
    /// persistence, document lookup); business-level stage failures are
    /// recorded in the returned state's `errors` with `stage = Failed`.
    pub async fn run(&self, doc_id: &str, goal: &str, depth: AnalysisDepth, run_id: &str) -> Result<AnalyzerState> {
        let state = AnalyzerState::new(doc_id, run_id, goal, depth);
        self.drive(state).await
    }

    /// Resumes a checkpointed run, continuing from the next stage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::NotFoundError`] if no checkpoint exists
    /// for `(doc_id, run_id)`.
    pub async fn resume(&self, doc_id: &str, run_id: &str) -> Result<AnalyzerState> {
        let state = self.load_checkpoint(doc_id, run_id).await?;
        self.drive(state).await
    }

    async fn load_checkpoint(&self, doc_id: &str, run_id: &str) -> Result<AnalyzerState> {
        let raw = self
            .checkpoints
            .get(&checkpoint_key(doc_id, run_id))
            .await?
            .ok_or_else(|| Error::from(crate::error::NotFoundError::Pipeline {
                pipeline_id: format!("analyzer-run:{run_id}"),
            }))?;
        serde_json::from_slice(&raw).map_err(|err| Error::internal(format!("corrupt analyzer checkpoint: {err}")))
    }

    async fn save_checkpoint(&self, state: &AnalyzerState) -> Result<()> {
        let bytes = serde_json::to_vec(state).map_err(|err| Error::internal(format!("checkpoint serialization failed: {err}")))?;
        self.checkpoints.set(&checkpoint_key(&state.doc_id, &state.run_id), bytes, None).await
    }

    async fn drive(&self, mut state: AnalyzerState) -> Result<AnalyzerState> {
        loop {
            if matches!(state.stage, Stage::Done | Stage::Failed) {
                return Ok(state);
            }

            let stage = state.stage;
            let started = now_unix();
            info!(doc_id = %state.doc_id, run_id = %state.run_id, ?stage, "analyzer stage starting");

            let outcome = retry_with_backoff(STAGE_RETRY_CONFIG, || self.run_stage(&mut state)).await;

            state.durations.push(StageDuration {
                stage,
                seconds: now_unix() - started,
            });

            match outcome {
                Ok(next) => {
                    state.stage = next;
                }
                Err(err) => {
                    warn!(doc_id = %state.doc_id, run_id = %state.run_id, ?stage, %err, "analyzer stage failed terminally");
                    state.errors.push(format!("{stage:?}: {err}"));
                    state.stage = Stage::Failed;
                }
            }

            self.save_checkpoint(&state).await?;
        }
    }

    /// Runs only `prepare` + `macro`, for the Pipeline's SUMMARY stage
    /// (§4.G), which wants the progressive summaries without the rest
    /// of the cognitive state machine or an `AnalysisReport` artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing or either stage's
    /// gateway call exhausts its retries.
    pub async fn quick_summary(&self, doc_id: &str) -> Result<(MacroSummary, Vec<Chunk>)> {
        let mut state = AnalyzerState::new(doc_id, format!("summary-{doc_id}"), "summarize", AnalysisDepth::Basic);
        retry_with_backoff(STAGE_RETRY_CONFIG, || self.prepare(&mut state)).await?;
        retry_with_backoff(STAGE_RETRY_CONFIG, || self.macro_stage(&mut state)).await?;
        Ok((state.summary, state.chunks))
    }

    /// Runs only `prepare` + `explore`, for the Pipeline's GRAPH stage
    /// (§4.G). `explore` already writes entities/relations through the
    /// graph store port as it extracts them.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing or either stage's
    /// gateway call exhausts its retries.
    pub async fn quick_graph(&self, doc_id: &str) -> Result<(Vec<GraphEntity>, Vec<GraphRelation>)> {
        let mut state = AnalyzerState::new(doc_id, format!("graph-{doc_id}"), "extract graph", AnalysisDepth::Standard);
        retry_with_backoff(STAGE_RETRY_CONFIG, || self.prepare(&mut state)).await?;
        retry_with_backoff(STAGE_RETRY_CONFIG, || self.explore(&mut state)).await?;
        Ok((state.entities, state.relations))
    }

    /// Runs one stage's node function, returning the next stage to
    /// transition to. `&mut state` is reborrowed each retry attempt so a
    /// partial mutation from a failed attempt is visible on the next.
    async fn run_stage(&self, state: &mut AnalyzerState) -> Result<Stage> {
        match state.stage {
            Stage::Prepare => self.prepare(state).await,
            Stage::Macro => self.macro_stage(state).await,
            Stage::Explore => self.explore(state).await,
            Stage::Critique => self.critique(state).await,
            Stage::Integrate => self.integrate(state).await,
            Stage::Output => self.output(state).await,
            Stage::Done | Stage::Failed => Ok(state.stage),
        }
    }

    async fn prepare(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let doc = self
            .relational
            .get_document(&state.doc_id)?
            .ok_or_else(|| Error::from(crate::error::NotFoundError::Document { doc_id: state.doc_id.clone() }))?;
        let text = doc.text();

        let config: Option<ChunkConfig> = None;
        let outcome = if state.prepare_rerun_done {
            FixedChunker::new().chunk(&state.doc_id, &text, config.as_ref())
        } else {
            default_chunker()
                .chunk_with_outcome(&state.doc_id, &text, config.as_ref(), None)
                .map(crate::chunking::ChunkingOutcome::into_chunks)
        };
        state.chunks = outcome?;
        Ok(Stage::Macro)
    }

    async fn macro_stage(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let combined: String = state
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Summarize the following text at five lengths (50, 200, 500, 1000, 2000 words) \
             and extract an outline with logical, topical, temporal, and causal dimensions. \
             Respond as JSON: {{\"words_50\":...,\"words_200\":...,\"words_500\":...,\
             \"words_1000\":...,\"words_2000\":...,\"outline\":{{\"logical\":[...],\
             \"topical\":[...],\"temporal\":[...],\"causal\":[...]}}}}.\n\nText:\n{combined}"
        );
        let request = CompletionRequest::new(prompt);
        let (text, usage) = self.gateway.complete(&request).await?;
        state.tokens_used += usage.prompt_tokens + usage.completion_tokens;

        match parse_macro_response(&text) {
            Some((summary, outline)) => {
                state.summary = summary;
                state.outline = outline;
            }
            None => {
                state.summary = heuristic_summary(&combined);
                state.outline = heuristic_outline(&combined);
            }
        }

        if state.depth == AnalysisDepth::Basic {
            return Ok(Stage::Integrate);
        }

        if outline_structure_score(&state.outline) < OUTLINE_QUALITY_THRESHOLD && !state.prepare_rerun_done {
            state.prepare_rerun_done = true;
            return Ok(Stage::Prepare);
        }

        Ok(Stage::Explore)
    }

    async fn explore(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let mode = match state.depth {
            AnalysisDepth::Basic | AnalysisDepth::Standard => "quick",
            AnalysisDepth::Deep => "focused",
            AnalysisDepth::Expert | AnalysisDepth::Comprehensive => "comprehensive",
        };

        let combined: String = state
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Extract typed entities (person, org, concept, tech, place, event, product) and \
             relations (defines, contains, influences, contrasts, uses, creates, belongs_to, \
             related_to) from the text below, in {mode} mode. Respond as JSON: \
             {{\"entities\":[{{\"name\":...,\"kind\":...}}],\"relations\":[{{\"from\":...,\"to\":...,\"kind\":...}}]}}.\
             \n\nText:\n{combined}"
        );
        let request = CompletionRequest::new(prompt);
        let (text, usage) = self.gateway.complete(&request).await?;
        state.tokens_used += usage.prompt_tokens + usage.completion_tokens;

        let (entities, relations) = parse_explore_response(&text).unwrap_or_default();

        for entity in &entities {
            self.graph.upsert_entity(&state.doc_id, entity.clone()).await?;
        }
        for relation in &relations {
            self.graph.upsert_relation(&state.doc_id, relation.clone()).await?;
        }
        state.entities = entities;
        state.relations = relations;

        if state.depth >= AnalysisDepth::Deep {
            Ok(Stage::Critique)
        } else {
            Ok(Stage::Integrate)
        }
    }

    async fn critique(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let combined: String = state
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Analyze evidence chains (claim, supporting passages, strength in [0,1]), internal \
             consistency, logical fallacies, unstated assumptions, and alternative views in the \
             text below. Respond as JSON: {{\"claims\":[{{\"text\":...,\"support\":[...],\
             \"strength\":...}}],\"biases\":[...],\"assumptions\":[...]}}.\n\nText:\n{combined}"
        );
        let request = CompletionRequest::new(prompt);
        let (text, usage) = self.gateway.complete(&request).await?;
        state.tokens_used += usage.prompt_tokens + usage.completion_tokens;

        let (claims, biases, assumptions) = parse_critique_response(&text).unwrap_or_default();
        state.evidence_strength = mean_strength(&claims);
        state.claims = claims;
        state.biases = biases;
        state.assumptions = assumptions;

        Ok(Stage::Integrate)
    }

    async fn integrate(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let prompt = format!(
            "Given this 500-word summary:\n{}\n\nand these claims: {:?}\n\nWrite a short \
             executive summary and list concrete action items. Respond as JSON: \
             {{\"synthesis\":...,\"action_items\":[...],\"confidence\":...}}.",
            state.summary.words_500, state.claims
        );
        let request = CompletionRequest::new(prompt);
        let (text, usage) = self.gateway.complete(&request).await?;
        state.tokens_used += usage.prompt_tokens + usage.completion_tokens;

        match parse_integrate_response(&text) {
            Some((synthesis, action_items, confidence)) => {
                state.synthesis = Some(synthesis);
                state.action_items = action_items;
                state.confidence = confidence;
            }
            None => {
                state.synthesis = Some(state.summary.words_500.clone());
                state.action_items = if state.claims.is_empty() {
                    vec!["Review findings manually; automatic synthesis was unavailable.".to_string()]
                } else {
                    vec!["Review the identified claims and their supporting evidence.".to_string()]
                };
                state.confidence = 0.4;
            }
        }

        Ok(Stage::Output)
    }

    async fn output(&self, state: &mut AnalyzerState) -> Result<Stage> {
        let content = serde_json::to_value(&*state).map_err(|err| Error::internal(format!("failed to serialize analysis report: {err}")))?;
        let now = now_unix();
        let artifact = match self.relational.get_latest_artifact(&state.doc_id, ArtifactType::AnalysisReport)? {
            Some(existing) => existing.next_version(content, now),
            None => Artifact::new(&state.doc_id, ArtifactType::AnalysisReport, content, now),
        };
        self.relational.insert_artifact(&artifact)?;

        if let Some(mut doc) = self.relational.get_document(&state.doc_id)? {
            doc.set_status(crate::core::DocumentStatus::Analyzed, now);
            self.relational.update_document(&doc)?;
        }

        Ok(Stage::Done)
    }
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

/// Whether `doc`'s initial skim (first chunk, at the `prepare` stage)
/// looks low-quality: very short, or almost entirely non-prose.
#[must_use]
pub fn quality_is_low(doc: &Document) -> bool {
    let text = doc.text();
    text.len() < 200 || detect_structure(&text).iter().all(|s| s.kind != SectionKind::Body)
}

fn mean_strength(claims: &[Claim]) -> f32 {
    if claims.is_empty() {
        return 0.0;
    }
    claims.iter().map(|c| c.strength).sum::<f32>() / claims.len() as f32
}

/// A crude structure-quality score for an outline: the fraction of its
/// four dimensions that carry at least one entry.
fn outline_structure_score(outline: &Outline) -> f32 {
    let filled = [&outline.logical, &outline.topical, &outline.temporal, &outline.causal]
        .iter()
        .filter(|v| !v.is_empty())
        .count();
    filled as f32 / 4.0
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_macro_response(text: &str) -> Option<(MacroSummary, Outline)> {
    #[derive(Deserialize)]
    struct Parsed {
        words_50: String,
        words_200: String,
        words_500: String,
        words_1000: String,
        words_2000: String,
        outline: Outline,
    }
    let json = extract_json_object(text)?;
    let parsed: Parsed = serde_json::from_str(json).ok()?;
    Some((
        MacroSummary {
            words_50: parsed.words_50,
            words_200: parsed.words_200,
            words_500: parsed.words_500,
            words_1000: parsed.words_1000,
            words_2000: parsed.words_2000,
        },
        parsed.outline,
    ))
}

fn heuristic_summary(text: &str) -> MacroSummary {
    let words: Vec<&str> = text.split_whitespace().collect();
    let level = |n: usize| words.iter().take(n).copied().collect::<Vec<_>>().join(" ");
    MacroSummary {
        words_50: level(50),
        words_200: level(200),
        words_500: level(500),
        words_1000: level(1000),
        words_2000: level(2000),
    }
}

fn heuristic_outline(text: &str) -> Outline {
    let headings: Vec<String> = detect_structure(text)
        .into_iter()
        .filter(|s| s.kind == SectionKind::Heading)
        .map(|s| text[s.start..s.end].trim().to_string())
        .collect();
    Outline {
        logical: headings.clone(),
        topical: headings,
        temporal: Vec::new(),
        causal: Vec::new(),
    }
}

#[derive(Deserialize)]
struct RawEntity {
    name: String,
    kind: String,
}

#[derive(Deserialize)]
struct RawRelation {
    from: String,
    to: String,
    kind: String,
}

fn parse_explore_response(text: &str) -> Option<(Vec<GraphEntity>, Vec<GraphRelation>)> {
    #[derive(Deserialize)]
    struct Parsed {
        entities: Vec<RawEntity>,
        relations: Vec<RawRelation>,
    }
    let json = extract_json_object(text)?;
    let parsed: Parsed = serde_json::from_str(json).ok()?;
    let entities = parsed
        .entities
        .into_iter()
        .map(|e| GraphEntity {
            id: normalize_entity_id(&e.name),
            name: e.name,
            kind: e.kind,
            chunk_ids: Vec::new(),
        })
        .collect();
    let relations = parsed
        .relations
        .into_iter()
        .map(|r| GraphRelation {
            from: normalize_entity_id(&r.from),
            to: normalize_entity_id(&r.to),
            kind: r.kind,
        })
        .collect();
    Some((entities, relations))
}

fn normalize_entity_id(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_critique_response(text: &str) -> Option<(Vec<Claim>, Vec<String>, Vec<String>)> {
    #[derive(Deserialize)]
    struct Parsed {
        claims: Vec<Claim>,
        biases: Vec<String>,
        assumptions: Vec<String>,
    }
    let json = extract_json_object(text)?;
    let parsed: Parsed = serde_json::from_str(json).ok()?;
    Some((parsed.claims, parsed.biases, parsed.assumptions))
}

fn parse_integrate_response(text: &str) -> Option<(String, Vec<String>, f32)> {
    #[derive(Deserialize)]
    struct Parsed {
        synthesis: String,
        action_items: Vec<String>,
        confidence: f32,
    }
    let json = extract_json_object(text)?;
    let parsed: Parsed = serde_json::from_str(json).ok()?;
    Some((parsed.synthesis, parsed.action_items, parsed.confidence.clamp(0.0, 1.0)))
}

/// Resolves `options.analysis_depth` into the analyzer depth, falling
/// back to the pipeline-options default when analysis was not
/// requested (callers outside the ANALYSIS stage still need a depth to
/// pass to standalone `Analyzer::run` calls, e.g. from the CLI).
#[must_use]
pub fn depth_from_options(options: PipelineOptions) -> AnalysisDepth {
    options.analysis_depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::store::sqlite::SqliteRelationalStore;
    use crate::store::{MockGraphStore, MockKvStore};

    fn setup(depth: AnalysisDepth) -> (Analyzer, Arc<SqliteRelationalStore>, Document) {
        let relational = Arc::new(SqliteRelationalStore::in_memory().unwrap());
        relational.init().unwrap();
        let graph = Arc::new(MockGraphStore::new());
        let gateway = Arc::new(MockGateway::default());
        let checkpoints = Arc::new(MockKvStore::new());
        let analyzer = Analyzer::new(relational.clone(), graph, gateway, checkpoints);

        let text = "# Introduction\n\nThis document explains the widget subsystem in detail. \
                    It covers design, usage, and caveats across several paragraphs of prose \
                    so the chunker has enough material to split on sentence and structural \
                    boundaries rather than falling back to a single chunk.\n\n# Conclusion\n\n\
                    The subsystem is stable and recommended for production use."
            .repeat(3);
        let doc = Document::new("d1", "f.md", "text/markdown", text.into_bytes(), "u1", "p1", 0);
        relational.insert_document(&doc).unwrap();

        let _ = depth;
        (analyzer, relational, doc)
    }

    #[tokio::test]
    async fn basic_depth_stops_after_macro() {
        let (analyzer, _store, doc) = setup(AnalysisDepth::Basic);
        let state = analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Basic, "run-1").await.unwrap();
        assert_eq!(state.stage, Stage::Done);
        assert!(state.entities.is_empty());
        assert!(!state.action_items.is_empty());
    }

    #[tokio::test]
    async fn standard_depth_runs_explore_but_not_critique() {
        let (analyzer, _store, doc) = setup(AnalysisDepth::Standard);
        let state = analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Standard, "run-2").await.unwrap();
        assert_eq!(state.stage, Stage::Done);
        assert!(state.claims.is_empty());
    }

    #[tokio::test]
    async fn deep_depth_runs_critique() {
        let (analyzer, _store, doc) = setup(AnalysisDepth::Deep);
        let state = analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Deep, "run-3").await.unwrap();
        assert_eq!(state.stage, Stage::Done);
        // The mock gateway does not return parseable JSON, so critique's
        // heuristic fallback (empty claims) is exercised, not an error.
        assert!(state.claims.is_empty());
        assert!(state.durations.iter().any(|d| d.stage == Stage::Critique));
    }

    #[tokio::test]
    async fn output_persists_analysis_report_artifact() {
        let (analyzer, store, doc) = setup(AnalysisDepth::Basic);
        analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Basic, "run-4").await.unwrap();
        let artifact = store.get_latest_artifact(&doc.doc_id, ArtifactType::AnalysisReport).unwrap();
        assert!(artifact.is_some());
        assert_eq!(artifact.unwrap().version, 1);
    }

    #[tokio::test]
    async fn rerunning_output_bumps_artifact_version() {
        let (analyzer, store, doc) = setup(AnalysisDepth::Basic);
        analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Basic, "run-5").await.unwrap();
        analyzer.run(&doc.doc_id, "summarize", AnalysisDepth::Basic, "run-6").await.unwrap();
        let artifact = store.get_latest_artifact(&doc.doc_id, ArtifactType::AnalysisReport).unwrap().unwrap();
        assert_eq!(artifact.version, 2);
    }

    #[tokio::test]
    async fn resume_continues_from_checkpoint() {
        let (analyzer, _store, doc) = setup(AnalysisDepth::Basic);
        // Simulate a crash after prepare by checkpointing manually then
        // resuming, rather than racing the real async stages.
        let mut state = AnalyzerState::new(&doc.doc_id, "run-7", "summarize", AnalysisDepth::Basic);
        state.stage = Stage::Macro;
        state.chunks = default_chunker()
            .chunk_with_outcome(&doc.doc_id, &doc.text(), None, None)
            .unwrap()
            .into_chunks();
        analyzer.save_checkpoint(&state).await.unwrap();

        let resumed = analyzer.resume(&doc.doc_id, "run-7").await.unwrap();
        assert_eq!(resumed.stage, Stage::Done);
    }

    #[test]
    fn outline_structure_score_counts_filled_dimensions() {
        let outline = Outline {
            logical: vec!["a".to_string()],
            topical: vec!["b".to_string()],
            temporal: Vec::new(),
            causal: Vec::new(),
        };
        assert!((outline_structure_score(&outline) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn quality_is_low_flags_very_short_documents() {
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u", "p", 0);
        assert!(quality_is_low(&doc));
    }
}
