//! The `Pipeline` entity (§3): a concrete execution of a selected
//! subset of top-level stages over a document.

use serde::{Deserialize, Serialize};

use super::stage::StageType;

/// Which top-level stages a pipeline (or an upload request) enables.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Upload without any further processing. Always implied `true`
    /// (§6): every upload at minimum reaches `uploaded`.
    pub upload_only: bool,
    /// Enable the SUMMARY stage.
    pub generate_summary: bool,
    /// Enable the INDEX stage.
    pub create_index: bool,
    /// Enable the GRAPH stage.
    pub build_graph: bool,
    /// Enable the ANALYSIS stage.
    pub deep_analysis: bool,
    /// Depth to run the analyzer at when `deep_analysis` is set.
    pub analysis_depth: AnalysisDepth,
}

/// Analyzer depth (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    /// Stops after `macro`.
    Basic,
    /// Default depth.
    #[default]
    Standard,
    /// Enables `critique`.
    Deep,
    /// Deeper critique / broader knowledge graph mode.
    Expert,
    /// Most exhaustive; comprehensive knowledge-graph mode.
    Comprehensive,
}

impl PipelineOptions {
    /// The ordered list of stage types this configuration enables.
    #[must_use]
    pub fn enabled_stages(self) -> Vec<StageType> {
        let mut stages = Vec::new();
        if self.generate_summary {
            stages.push(StageType::Summary);
        }
        if self.create_index {
            stages.push(StageType::Index);
        }
        if self.build_graph {
            stages.push(StageType::Graph);
        }
        if self.deep_analysis {
            stages.push(StageType::Analysis);
        }
        stages
    }
}

/// A concrete execution of a document's requested stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Opaque, unique identity.
    pub pipeline_id: String,
    /// Owning document id.
    pub doc_id: String,
    /// Which stages this pipeline runs.
    pub options: PipelineOptions,
    /// The stage currently executing, if any.
    pub current_stage: Option<StageType>,
    /// Weighted mean of stage progresses, in `[0, 1]`.
    pub overall_progress: f64,
    /// Whether an interrupt or deadline has fired for this pipeline.
    pub interrupted: bool,
    /// Whether every enabled stage reached a terminal state
    /// successfully.
    pub completed: bool,
    /// Whether `resume_pipeline` may be called.
    pub can_resume: bool,
    /// Start timestamp, Unix seconds.
    pub started_at: i64,
    /// Completion timestamp, Unix seconds, once terminal.
    pub completed_at: Option<i64>,
    /// Free-form extension data.
    pub ext: serde_json::Value,
}

impl Pipeline {
    /// Creates a new, not-yet-started pipeline for `doc_id`.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, doc_id: impl Into<String>, options: PipelineOptions, now: i64) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            doc_id: doc_id.into(),
            options,
            current_stage: None,
            overall_progress: 0.0,
            interrupted: false,
            completed: false,
            can_resume: false,
            started_at: now,
            completed_at: None,
            ext: serde_json::Value::Null,
        }
    }

    /// Recomputes `overall_progress` as the weight-normalized mean of
    /// `(stage_type, progress_0_to_100)` pairs for every enabled stage.
    /// Missing stages (not yet created) count as zero progress.
    pub fn recompute_overall_progress(&mut self, stage_progress: &[(StageType, u8)]) {
        let enabled = self.options.enabled_stages();
        if enabled.is_empty() {
            self.overall_progress = 1.0;
            return;
        }
        let total_weight: f64 = enabled.iter().map(|s| s.weight()).sum();
        let weighted_sum: f64 = enabled
            .iter()
            .map(|stage_type| {
                let progress = stage_progress
                    .iter()
                    .find(|(t, _)| t == stage_type)
                    .map_or(0u8, |(_, p)| *p);
                stage_type.weight() * f64::from(progress) / 100.0
            })
            .sum();
        self.overall_progress = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        };
    }

    /// Marks the pipeline completed: `overall_progress` is forced to
    /// `1.0` (§3 invariant: `completed ⇒ overall_progress = 1`).
    pub fn mark_completed(&mut self, now: i64) {
        self.completed = true;
        self.interrupted = false;
        self.overall_progress = 1.0;
        self.completed_at = Some(now);
        self.current_stage = None;
    }

    /// Marks the pipeline interrupted (§3 invariant:
    /// `interrupted ⇒ ¬completed`).
    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
        self.completed = false;
    }
}
