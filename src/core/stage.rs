//! The `Stage` entity (§3): one unit of pipeline work, ordered by
//! `StageType` and transitioning through a fixed status lattice.

use serde::{Deserialize, Serialize};

/// Which top-level pipeline stage this is. Ordering is fixed:
/// `Summary < Index < Graph < Analysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Produces a `summary` artifact from the analyzer's macro output.
    Summary,
    /// Chunks, embeds, and upserts vectors.
    Index,
    /// Extracts entities/relations into the graph store.
    Graph,
    /// Runs the full analyzer at the requested depth.
    Analysis,
}

impl StageType {
    /// Relative weight used when averaging stage progress into
    /// `Pipeline.overall_progress` (§4.G: "weights fixed per stage
    /// type (INDEX heaviest)").
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Summary => 0.15,
            Self::Index => 0.4,
            Self::Graph => 0.2,
            Self::Analysis => 0.25,
        }
    }
}

/// Lifecycle status of a [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecoverable (or exhausted-retry) error.
    Failed,
    /// Stopped by an interrupt or deadline before completing.
    Cancelled,
}

impl StageStatus {
    /// Whether this status is terminal for the stage (the runner will
    /// not transition out of it without an explicit resume).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is one of the transitions §8 property 1
    /// allows: `pending->running`, `running->completed`,
    /// `running->failed`, `running->cancelled`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

/// One stage of a [`super::Pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Database identity, `None` until persisted.
    pub id: Option<i64>,
    /// Owning pipeline id.
    pub pipeline_id: String,
    /// Stage kind.
    pub stage_type: StageType,
    /// Current lifecycle status.
    pub status: StageStatus,
    /// Progress within the stage, `0..=100`.
    pub progress: u8,
    /// Start timestamp, Unix seconds, once running.
    pub started_at: Option<i64>,
    /// Completion timestamp, Unix seconds, once terminal.
    pub completed_at: Option<i64>,
    /// Duration once terminal, derived from `started_at`/`completed_at`.
    pub duration_seconds: Option<i64>,
    /// Whether this stage honors interrupt at sub-unit boundaries as
    /// opposed to only at its own start/end.
    pub can_interrupt: bool,
    /// Human-readable progress message.
    pub message: Option<String>,
    /// Stage result payload (JSON), set on completion.
    pub result: Option<serde_json::Value>,
    /// Structured error object, set on failure.
    pub error: Option<crate::error::ErrorObject>,
}

impl Stage {
    /// Creates a pending stage.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, stage_type: StageType) -> Self {
        Self {
            id: None,
            pipeline_id: pipeline_id.into(),
            stage_type,
            status: StageStatus::Pending,
            progress: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            can_interrupt: true,
            message: None,
            result: None,
            error: None,
        }
    }

    /// Transitions to `next`, returning `false` without mutating state
    /// if the transition is not allowed (§8 property 1).
    #[must_use]
    pub fn transition(&mut self, next: StageStatus, now: i64) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        match next {
            StageStatus::Running => self.started_at = Some(now),
            StageStatus::Completed | StageStatus::Failed | StageStatus::Cancelled => {
                self.completed_at = Some(now);
                self.duration_seconds = self.started_at.map(|start| now - start);
            }
            StageStatus::Pending => {}
        }
        self.status = next;
        true
    }

    /// Sets `progress`, clamped to `[0, 100]` and never allowed to
    /// decrease (§4.G: "progress is monotonically non-decreasing").
    pub fn set_progress(&mut self, progress: u8) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }

    /// Requeues a `Cancelled` stage as `Pending` so the runner retries
    /// it on resume (§4.G: "a cancelled stage may be resumed"). No-op
    /// for any other status. Timing and progress are cleared since the
    /// stage is about to restart; `result` is kept so the retried work
    /// can inspect it for a checkpoint to continue from.
    pub fn reset_for_resume(&mut self) {
        if self.status == StageStatus::Cancelled {
            self.status = StageStatus::Pending;
            self.started_at = None;
            self.completed_at = None;
            self.duration_seconds = None;
            self.progress = 0;
            self.error = None;
        }
    }
}
