//! The Progress Bus (§4.H): fans out [`ProgressEvent`]s to subscribers
//! per pipeline, persisting to the relational store before fanout so a
//! concurrent [`get_progress`](ProgressBus::get_progress) poll never
//! observes an event that hasn't landed in storage yet.
//!
//! Grounded in the teacher's persist-before-derived-computation pattern
//! (`Context`/`Buffer` save before any dependent read) and built on
//! `tokio::sync::broadcast`, one channel per pipeline, which already
//! implements the "drop slow subscribers" idiom this port needs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::core::{Pipeline, Stage, StageStatus, StageType};
use crate::error::Result;
use crate::store::RelationalStore;

/// Bounded per-subscriber queue depth. A subscriber that falls more
/// than this many events behind is dropped (`recv` returns `None`).
const CHANNEL_CAPACITY: usize = 256;

/// A point-in-time status snapshot for one stage.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct StageSnapshot {
    /// Which stage this snapshot describes.
    pub stage_type: StageType,
    /// Current status.
    pub status: StageStatus,
    /// Current progress, `0..=100`.
    pub progress: u8,
}

/// A progress update, matching the external event payload shape (§6):
/// `{pipeline_id, doc_id, stage_type, stage_status, stage_progress,
/// overall_progress, message, timestamp, terminal}`, extended with a
/// full per-stage snapshot so `subscribe` callers don't need a
/// separate `get_progress` round-trip to see the whole picture.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProgressEvent {
    /// Owning pipeline.
    pub pipeline_id: String,
    /// Owning document.
    pub doc_id: String,
    /// The stage that changed, if this event was stage-scoped.
    pub stage_type: Option<StageType>,
    /// That stage's new status.
    pub stage_status: Option<StageStatus>,
    /// That stage's new progress.
    pub stage_progress: Option<u8>,
    /// Weighted overall pipeline progress, `[0, 1]`.
    pub overall_progress: f64,
    /// Status/progress of every stage the pipeline enabled.
    pub stages: Vec<StageSnapshot>,
    /// Optional human-readable note (e.g. a retry or degrade decision).
    pub message: Option<String>,
    /// Unix timestamp the event was produced.
    pub timestamp: i64,
    /// Whether the pipeline reached a terminal state with this event.
    pub terminal: bool,
}

/// A polled, on-demand snapshot of a pipeline's progress, computed
/// directly from persisted state rather than the live event stream.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressSnapshot {
    /// Owning pipeline.
    pub pipeline_id: String,
    /// Owning document.
    pub doc_id: String,
    /// Weighted overall pipeline progress, `[0, 1]`.
    pub overall_progress: f64,
    /// Status/progress of every stage the pipeline enabled.
    pub stages: Vec<StageSnapshot>,
    /// Whether the pipeline has reached a terminal state.
    pub terminal: bool,
}

/// A live subscription to one pipeline's progress events.
///
/// Wraps a [`broadcast::Receiver`] rather than a generic `Stream` since
/// the crate carries no stream-combinator dependency beyond
/// `futures-util`; callers `loop { let Some(event) = sub.recv().await
/// ... }`. Ends (`recv` returns `None`) on a terminal event, channel
/// closure, or this subscriber falling behind (`Lagged`), matching the
/// "bounded delivery, drop slow subscribers" invariant (§5/§8).
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressEvent>,
    done: bool,
}

impl ProgressSubscription {
    /// Awaits the next event, or `None` once the sequence has ended.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }
        match self.receiver.recv().await {
            Ok(event) => {
                if event.terminal {
                    self.done = true;
                }
                Some(event)
            }
            Err(broadcast::error::RecvError::Closed | broadcast::error::RecvError::Lagged(_)) => {
                self.done = true;
                None
            }
        }
    }
}

/// Fans out progress updates per pipeline, persisting before fanout.
pub struct ProgressBus {
    relational: Arc<dyn RelationalStore>,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    /// Creates a bus backed by `relational` for persistence and polling.
    #[must_use]
    pub fn new(relational: Arc<dyn RelationalStore>) -> Self {
        Self {
            relational,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel_for(&self, pipeline_id: &str) -> broadcast::Sender<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        channels
            .entry(pipeline_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Persists `pipeline` and `stage`'s current state, then publishes
    /// a [`ProgressEvent`] to this pipeline's subscribers. Stage runners
    /// call this after every transition rather than writing to the
    /// store directly, so persistence always precedes fanout.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; no event is published in
    /// that case.
    pub fn publish_stage_update(
        &self,
        pipeline: &Pipeline,
        stage: &Stage,
        all_stages: &[Stage],
        message: Option<String>,
        now: i64,
    ) -> Result<()> {
        self.relational.update_pipeline(pipeline)?;
        self.relational.update_stage(stage)?;

        let stages = all_stages
            .iter()
            .map(|s| StageSnapshot {
                stage_type: s.stage_type,
                status: s.status,
                progress: s.progress,
            })
            .collect();
        let terminal = pipeline.completed || (pipeline.interrupted && stage.status.is_terminal());
        let event = ProgressEvent {
            pipeline_id: pipeline.pipeline_id.clone(),
            doc_id: pipeline.doc_id.clone(),
            stage_type: Some(stage.stage_type),
            stage_status: Some(stage.status),
            stage_progress: Some(stage.progress),
            overall_progress: pipeline.overall_progress,
            stages,
            message,
            timestamp: now,
            terminal,
        };

        // No subscribers is not an error; `send` only fails when the
        // channel has zero receivers.
        let _ = self.channel_for(&pipeline.pipeline_id).send(event);
        Ok(())
    }

    /// Subscribes to a pipeline's progress events.
    #[must_use]
    pub fn subscribe(&self, pipeline_id: &str) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.channel_for(pipeline_id).subscribe(),
            done: false,
        }
    }

    /// Computes a progress snapshot directly from persisted state,
    /// for callers that prefer polling over subscribing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::NotFoundError::Pipeline`] if the
    /// pipeline does not exist.
    pub fn get_progress(&self, pipeline_id: &str) -> Result<ProgressSnapshot> {
        let pipeline = self
            .relational
            .get_pipeline(pipeline_id)?
            .ok_or_else(|| crate::error::Error::from(crate::error::NotFoundError::Pipeline {
                pipeline_id: pipeline_id.to_string(),
            }))?;
        let stages = self
            .relational
            .get_stages(pipeline_id)?
            .into_iter()
            .map(|s| StageSnapshot {
                stage_type: s.stage_type,
                status: s.status,
                progress: s.progress,
            })
            .collect();
        Ok(ProgressSnapshot {
            pipeline_id: pipeline.pipeline_id.clone(),
            doc_id: pipeline.doc_id.clone(),
            overall_progress: pipeline.overall_progress,
            stages,
            terminal: pipeline.completed || pipeline.interrupted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineOptions, StageStatus};
    use crate::store::sqlite::SqliteRelationalStore;

    fn setup() -> (ProgressBus, Arc<SqliteRelationalStore>, Pipeline, Stage) {
        let store = Arc::new(SqliteRelationalStore::in_memory().unwrap());
        store.init().unwrap();
        let doc = crate::core::Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u", "p", 0);
        store.insert_document(&doc).unwrap();

        let options = PipelineOptions {
            generate_summary: true,
            ..Default::default()
        };
        let pipeline = Pipeline::new("pipe1", "d1", options, 0);
        let stage = Stage::new("pipe1", StageType::Summary);
        store.insert_pipeline(&pipeline, std::slice::from_ref(&stage)).unwrap();

        let bus = ProgressBus::new(store.clone());
        (bus, store, pipeline, stage)
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let (bus, _store, pipeline, mut stage) = setup();
        let mut sub = bus.subscribe(&pipeline.pipeline_id);

        stage.transition(StageStatus::Running, 1);
        bus.publish_stage_update(&pipeline, &stage, std::slice::from_ref(&stage), None, 1).unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.pipeline_id, "pipe1");
        assert_eq!(event.stage_status, Some(StageStatus::Running));
        assert!(!event.terminal);
    }

    #[tokio::test]
    async fn terminal_event_ends_the_subscription() {
        let (bus, _store, mut pipeline, mut stage) = setup();
        let mut sub = bus.subscribe(&pipeline.pipeline_id);

        stage.transition(StageStatus::Running, 1);
        stage.transition(StageStatus::Completed, 2);
        pipeline.mark_completed(2);
        bus.publish_stage_update(&pipeline, &stage, std::slice::from_ref(&stage), None, 2).unwrap();

        let event = sub.recv().await.unwrap();
        assert!(event.terminal);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_persists_before_fanout() {
        let (bus, store, pipeline, mut stage) = setup();
        stage.transition(StageStatus::Running, 1);
        bus.publish_stage_update(&pipeline, &stage, std::slice::from_ref(&stage), None, 1).unwrap();

        let persisted = store.get_stages(&pipeline.pipeline_id).unwrap();
        assert_eq!(persisted[0].status, StageStatus::Running);
    }

    #[test]
    fn get_progress_reflects_persisted_state() {
        let (bus, _store, pipeline, _stage) = setup();
        let snapshot = bus.get_progress(&pipeline.pipeline_id).unwrap();
        assert_eq!(snapshot.stages.len(), 1);
        assert!(!snapshot.terminal);
    }

    #[test]
    fn get_progress_unknown_pipeline_errors() {
        let (bus, _store, _pipeline, _stage) = setup();
        assert!(bus.get_progress("missing").is_err());
    }

    #[tokio::test]
    async fn subscribing_before_any_publish_does_not_block_forever() {
        let (bus, _store, pipeline, _stage) = setup();
        let sub = bus.subscribe(&pipeline.pipeline_id);
        drop(sub);
    }
}
