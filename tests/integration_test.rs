//! Integration tests for DPA.
//!
//! Builds the engine's capability ports directly (relational store,
//! mock vector/graph/KV stores, mock gateway) the same way the CLI's
//! command dispatcher wires them, rather than going through the
//! binary, so assertions can reach into persisted state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dpa_core::core::{
    AnalysisDepth, ArtifactType, Document, DocumentStatus, PipelineOptions,
};
use dpa_core::error::{GatewayPermanentError, Result};
use dpa_core::gateway::{CompletionDelta, CompletionRequest, Gateway, MockGateway, TokenUsage};
use dpa_core::pipeline::PipelineRunner;
use dpa_core::progress::ProgressBus;
use dpa_core::search::{HybridRetriever, RetrieveOptions};
use dpa_core::store::{
    GraphStore, KvStore, MockGraphStore, MockKvStore, MockVectorStore, RelationalStore,
    SqliteRelationalStore, VectorStore,
};
use futures_util::stream::BoxStream;
use tempfile::TempDir;

/// Creates an isolated on-disk relational store, mirroring the
/// teacher's `create_test_storage` helper.
fn create_test_store() -> (Arc<dyn RelationalStore>, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let store = SqliteRelationalStore::open(&db_path).expect("failed to open store");
    store.init().expect("failed to init schema");
    (Arc::new(store), temp_dir)
}

/// Builds the full engine (store, runner, progress bus, retriever)
/// over a deterministic mock gateway, the same shape as a CLI
/// invocation's wiring but held directly for test assertions.
fn build_engine() -> (Arc<dyn RelationalStore>, Arc<PipelineRunner>, Arc<ProgressBus>, TempDir) {
    let (relational, temp_dir) = create_test_store();
    let vector: Arc<dyn VectorStore> = Arc::new(MockVectorStore::new());
    let graph: Arc<dyn GraphStore> = Arc::new(MockGraphStore::new());
    let checkpoints: Arc<dyn KvStore> = Arc::new(MockKvStore::new());
    let gateway: Arc<dyn Gateway> = Arc::new(MockGateway::default());
    let progress = Arc::new(ProgressBus::new(relational.clone()));
    let pipeline = Arc::new(
        PipelineRunner::new(relational.clone(), vector, graph, gateway, checkpoints, progress.clone())
            .with_stage_timeout(Duration::from_secs(5)),
    );
    (relational, pipeline, progress, temp_dir)
}

fn upload(relational: &Arc<dyn RelationalStore>, doc_id: &str, bytes: &[u8]) -> Document {
    let document = Document::new(doc_id, "test.md", "text/markdown", bytes.to_vec(), "owner-1", "project-1", 0);
    relational.insert_document(&document).expect("insert_document failed");
    document
}

/// Polls `get_progress` until the pipeline reaches a terminal state,
/// failing the test if it does not within a bounded number of polls.
async fn wait_for_terminal(progress: &ProgressBus, pipeline_id: &str) -> dpa_core::progress::ProgressSnapshot {
    for _ in 0..200 {
        let snapshot = progress.get_progress(pipeline_id).expect("get_progress failed");
        if snapshot.terminal {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pipeline {pipeline_id} did not reach a terminal state in time");
}

#[test]
fn relational_store_init_and_stats() {
    let (store, _temp) = create_test_store();

    let stats = store.stats().expect("stats failed");
    assert_eq!(stats.document_count, 0);
    assert_eq!(stats.chunk_count, 0);
    assert_eq!(stats.pipeline_count, 0);
}

#[test]
fn document_crud_round_trips() {
    let (store, _temp) = create_test_store();

    let document = upload(&store, "doc-1", b"hello world");
    let loaded = store.get_document("doc-1").expect("get_document failed");
    assert!(loaded.is_some());
    let loaded = loaded.expect("document should exist");
    assert_eq!(loaded.bytes, document.bytes);
    assert_eq!(loaded.status, DocumentStatus::Uploaded);

    let for_project = store.documents_for_project("project-1").expect("documents_for_project failed");
    assert_eq!(for_project.len(), 1);

    let mut updated = loaded;
    updated.set_status(DocumentStatus::Summarized, 100);
    store.update_document(&updated).expect("update_document failed");
    let reloaded = store.get_document("doc-1").expect("get_document failed").expect("document should still exist");
    assert_eq!(reloaded.status, DocumentStatus::Summarized);
}

#[test]
fn chunks_replace_and_fetch() {
    use dpa_core::core::Chunk;

    let (store, _temp) = create_test_store();
    upload(&store, "doc-1", b"Hello, world! This is test content.");

    let chunks = vec![
        Chunk::new("doc-1", "Hello, world!".to_string(), 0..13, 0),
        Chunk::new("doc-1", " This is test content.".to_string(), 13..36, 1),
    ];
    store.replace_chunks("doc-1", &chunks).expect("replace_chunks failed");

    let loaded = store.get_chunks("doc-1").expect("get_chunks failed");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].text, "Hello, world!");
    assert_eq!(loaded[1].index, 1);

    let single = store.get_chunk(loaded[0].id.expect("chunk should have an id")).expect("get_chunk failed");
    assert!(single.is_some());

    // Replacing again must not accumulate rows (no duplicates).
    store.replace_chunks("doc-1", &chunks).expect("replace_chunks failed");
    let reloaded = store.get_chunks("doc-1").expect("get_chunks failed");
    assert_eq!(reloaded.len(), 2);
}

#[test]
fn chunker_strategies_are_selectable_by_name() {
    use dpa_core::chunking::{available_strategies, create_chunker, FixedChunker};

    let strategies = available_strategies();
    assert!(strategies.contains(&"fixed"));
    assert!(strategies.contains(&"semantic"));
    assert!(strategies.contains(&"hybrid"));

    assert!(create_chunker("fixed").is_ok());
    assert!(create_chunker("semantic").is_ok());
    assert!(create_chunker("unknown").is_err());

    let content = "Line one.\nLine two.\nLine three.";
    let chunker = FixedChunker::new();
    let chunks = chunker.chunk("doc-1", content, None).expect("chunk failed");
    assert!(!chunks.is_empty());
}

/// E1: a minimal upload with no stages enabled leaves the document
/// `uploaded` with no pipeline and no chunks/artifacts.
#[test]
fn e1_minimal_upload_creates_no_pipeline() {
    let (store, _temp) = create_test_store();
    let document = upload(&store, "doc-1", b"Hello world");

    let options = PipelineOptions::default();
    assert!(options.enabled_stages().is_empty());

    assert_eq!(document.status, DocumentStatus::Uploaded);
    assert!(store.active_pipeline_for_document("doc-1").expect("query failed").is_none());
    assert!(store.get_chunks("doc-1").expect("get_chunks failed").is_empty());
    assert!(store
        .get_latest_artifact("doc-1", ArtifactType::Summary)
        .expect("get_latest_artifact failed")
        .is_none());
}

/// E2: requesting only `generate_summary` runs a single-stage pipeline
/// to completion and produces one summary artifact.
#[tokio::test]
async fn e2_summary_only_pipeline_completes() {
    let (relational, pipeline, progress, _temp) = build_engine();
    let body = "# Heading One\n\n".to_string()
        + &"This is a paragraph of prose. ".repeat(200)
        + "\n\n# Heading Two\n\n"
        + &"More prose follows here. ".repeat(200);
    upload(&relational, "doc-1", body.as_bytes());

    let options = PipelineOptions { generate_summary: true, ..PipelineOptions::default() };
    let pipeline_id = pipeline.start("doc-1", options, 0).await.expect("start failed");

    let snapshot = wait_for_terminal(&progress, &pipeline_id).await;
    assert!((snapshot.overall_progress - 1.0).abs() < f64::EPSILON);

    let persisted = relational.get_pipeline(&pipeline_id).expect("get_pipeline failed").expect("pipeline should exist");
    assert!(persisted.completed);

    let artifact = relational
        .get_latest_artifact("doc-1", ArtifactType::Summary)
        .expect("get_latest_artifact failed")
        .expect("summary artifact should exist");
    assert!(!artifact.content.is_null());

    let document = relational.get_document("doc-1").expect("get_document failed").expect("document should exist");
    assert_eq!(document.status, DocumentStatus::Summarized);
}

/// E3: interrupting a pipeline immediately after it starts cancels its
/// first stage; resuming it then drives it to completion, with chunks
/// present exactly once (no duplicate rows from the first, aborted
/// attempt).
#[tokio::test]
async fn e3_interrupt_then_resume_reaches_completion() {
    let (relational, pipeline, progress, _temp) = build_engine();
    let body = "Paragraph text. ".repeat(500);
    upload(&relational, "doc-1", body.as_bytes());

    let options = PipelineOptions { generate_summary: true, create_index: true, ..PipelineOptions::default() };
    let pipeline_id = pipeline.start("doc-1", options, 0).await.expect("start failed");

    // current-thread runtime: the spawned run has not executed yet, so
    // this cancels before the first stage does any real work.
    pipeline.interrupt(&pipeline_id).expect("interrupt failed");

    wait_for_terminal(&progress, &pipeline_id).await;
    let persisted = relational.get_pipeline(&pipeline_id).expect("get_pipeline failed").expect("pipeline should exist");
    assert!(!persisted.completed);
    assert!(persisted.interrupted);
    assert!(persisted.can_resume);

    let stages = relational.get_stages(&pipeline_id).expect("get_stages failed");
    assert!(
        stages.iter().any(|s| s.status == dpa_core::core::StageStatus::Cancelled),
        "expected the in-flight stage to have been cancelled"
    );

    pipeline.resume(&pipeline_id).await.expect("resume failed");
    wait_for_terminal(&progress, &pipeline_id).await;

    let completed = relational.get_pipeline(&pipeline_id).expect("get_pipeline failed").expect("pipeline should exist");
    assert!(completed.completed);

    let chunks = relational.get_chunks("doc-1").expect("get_chunks failed");
    assert!(!chunks.is_empty());
    let mut hashes: Vec<_> = chunks.iter().map(|c| (c.doc_id.clone(), c.index)).collect();
    let before = hashes.len();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), before, "chunks must not be duplicated across interrupt+resume");
}

/// E4: with the graph leg producing nothing, the retriever still
/// returns results via its vector/keyword legs.
#[tokio::test]
async fn e4_hybrid_retrieval_falls_back_without_graph() {
    let (relational, pipeline, progress, _temp) = build_engine();
    let body = "The defined term X appears here. ".repeat(50) + "Unrelated filler text follows. ";
    upload(&relational, "doc-1", body.as_bytes());

    let options = PipelineOptions { create_index: true, ..PipelineOptions::default() };
    let pipeline_id = pipeline.start("doc-1", options, 0).await.expect("start failed");
    wait_for_terminal(&progress, &pipeline_id).await;

    let vector: Arc<dyn VectorStore> = Arc::new(MockVectorStore::new());
    let graph: Arc<dyn GraphStore> = Arc::new(MockGraphStore::new());
    let gateway: Arc<dyn Gateway> = Arc::new(MockGateway::default());
    let retriever = HybridRetriever::new(relational.clone(), vector, graph, gateway);

    let results = retriever
        .retrieve("What is the defined term X?", "project-1", &RetrieveOptions::with_top_k(5))
        .await
        .expect("retrieve failed");
    // The fresh vector store above has no vectors upserted, so only the
    // keyword leg can surface anything; the call must still succeed.
    assert!(results.iter().all(|r| matches!(
        r.source,
        dpa_core::search::RetrievalSource::Vector
            | dpa_core::search::RetrievalSource::Keyword
            | dpa_core::search::RetrievalSource::Fused
    )));
}

/// E5: a `basic` depth analysis request still produces an analysis
/// report artifact even though the deeper stages are skipped.
#[tokio::test]
async fn e5_deep_analysis_at_basic_depth_still_produces_report() {
    let (relational, pipeline, progress, _temp) = build_engine();
    let body = "Quality is low in this document. ".repeat(100);
    upload(&relational, "doc-1", body.as_bytes());

    let options = PipelineOptions {
        deep_analysis: true,
        analysis_depth: AnalysisDepth::Basic,
        ..PipelineOptions::default()
    };
    let pipeline_id = pipeline.start("doc-1", options, 0).await.expect("start failed");
    let snapshot = wait_for_terminal(&progress, &pipeline_id).await;
    assert!((snapshot.overall_progress - 1.0).abs() < f64::EPSILON);

    let report = relational
        .get_latest_artifact("doc-1", ArtifactType::AnalysisReport)
        .expect("get_latest_artifact failed")
        .expect("analysis report should exist");
    assert!(!report.content.is_null());
}

/// A gateway whose `embed` always fails with a permanent error,
/// exercising E6's failure-surfacing path without a live provider.
struct FailingGateway;

#[async_trait]
impl Gateway for FailingGateway {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(GatewayPermanentError::QuotaExhausted { provider: "test".to_string() }.into())
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<(String, TokenUsage)> {
        Ok(("unused".to_string(), TokenUsage::default()))
    }

    async fn stream_complete(&self, _request: &CompletionRequest) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        Ok(Box::pin(futures_util::stream::empty()))
    }
}

/// E6: a permanent gateway fault during INDEX fails that stage,
/// leaves the pipeline non-resumable, and delivers a terminal event.
#[tokio::test]
async fn e6_permanent_gateway_error_fails_the_stage() {
    let (relational, temp_dir) = create_test_store();
    let _ = &temp_dir;
    upload(&relational, "doc-1", b"Some content that will be chunked and embedded.");

    let vector: Arc<dyn VectorStore> = Arc::new(MockVectorStore::new());
    let graph: Arc<dyn GraphStore> = Arc::new(MockGraphStore::new());
    let checkpoints: Arc<dyn KvStore> = Arc::new(MockKvStore::new());
    let gateway: Arc<dyn Gateway> = Arc::new(FailingGateway);
    let progress = Arc::new(ProgressBus::new(relational.clone()));
    let pipeline = Arc::new(
        PipelineRunner::new(relational.clone(), vector, graph, gateway, checkpoints, progress.clone())
            .with_stage_timeout(Duration::from_secs(5)),
    );

    let options = PipelineOptions { create_index: true, ..PipelineOptions::default() };
    let pipeline_id = pipeline.start("doc-1", options, 0).await.expect("start failed");

    let mut subscription = progress.subscribe(&pipeline_id);
    let mut terminal_event = None;
    while let Some(event) = subscription.recv().await {
        if event.terminal {
            terminal_event = Some(event);
            break;
        }
    }
    let terminal_event = terminal_event.expect("a terminal progress event must be delivered");
    assert!(terminal_event.message.is_some());

    let persisted = relational.get_pipeline(&pipeline_id).expect("get_pipeline failed").expect("pipeline should exist");
    assert!(!persisted.completed);
    assert!(!persisted.can_resume);

    let stages = relational.get_stages(&pipeline_id).expect("get_stages failed");
    let index_stage = stages
        .into_iter()
        .find(|s| s.stage_type == dpa_core::core::StageType::Index)
        .expect("index stage should exist");
    assert_eq!(index_stage.status, dpa_core::core::StageStatus::Failed);
    let error = index_stage.error.expect("failed stage should carry an error object");
    assert_eq!(error.code, "GatewayPermanent");
}

mod property_tests {
    use dpa_core::core::Chunk;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chunk_size_matches_content(content in "[a-z]{1,100}") {
            let chunk = Chunk::new("doc-1", content.clone(), 0..content.len(), 0);
            prop_assert_eq!(chunk.size(), content.len());
        }

        #[test]
        fn chunk_byte_range_reports_consistent_size(start in 0usize..1000, len in 1usize..100) {
            let content = "x".repeat(len);
            let end = start + len;
            let chunk = Chunk::new("doc-1", content, start..end, 0);
            prop_assert_eq!(chunk.start(), start);
            prop_assert_eq!(chunk.end(), end);
            prop_assert_eq!(chunk.range_size(), len);
        }

        #[test]
        fn non_overlapping_adjacent_chunks_do_not_overlap(first_len in 1usize..200, second_len in 1usize..200) {
            let first = Chunk::new("doc-1", "a".repeat(first_len), 0..first_len, 0);
            let second = Chunk::new("doc-1", "b".repeat(second_len), first_len..(first_len + second_len), 1);
            prop_assert!(!first.overlaps_with(&second));
        }
    }
}
