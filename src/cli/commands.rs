//! Command dispatch: wires the capability ports up from [`DpaConfig`]
//! and runs each [`Commands`] variant against them.
//!
//! One process builds its stores and gateway fresh per invocation; the
//! CLI is a thin client over the same engine a long-lived server would
//! embed, not a separate code path.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{DpaConfig, GatewayKind};
use crate::core::{AnalysisDepth, ArtifactType, Document, PipelineOptions};
use crate::error::{Error, InputError, NotFoundError, Result};
use crate::gateway::{build_gateway, Gateway};
use crate::io::FileReader;
use crate::pipeline::PipelineRunner;
use crate::progress::ProgressBus;
use crate::qa::QaOrchestrator;
use crate::search::{HybridRetriever, RetrieveOptions};
use crate::store::{
    GraphStore, KvStore, MockGraphStore, MockKvStore, MockVectorStore, RelationalStore,
    SqliteRelationalStore, VectorStore,
};
#[cfg(feature = "usearch-hnsw")]
use crate::store::UsearchVectorStore;

use super::output::{
    format_answer, format_artifact, format_pipeline_action, format_pipeline_started, format_progress,
    format_progress_event, format_retrieval, format_upload, OutputFormat,
};
use super::parser::{Cli, Commands};

/// The capability ports a single CLI invocation wires together.
struct Context {
    relational: Arc<dyn RelationalStore>,
    pipeline: Arc<PipelineRunner>,
    progress: Arc<ProgressBus>,
    retriever: HybridRetriever,
    qa: QaOrchestrator,
}

impl Context {
    fn build(cli: &Cli) -> Result<Self> {
        let mut builder = DpaConfig::builder().db_path(cli.get_db_path()).gateway(GatewayKind::parse(&cli.gateway));
        if let Some(key) = &cli.api_key {
            builder = builder.api_key(key.clone());
        }
        let config = builder.from_env().build()?;

        let gateway: Arc<dyn Gateway> = build_gateway(&config)?;

        let relational: Arc<dyn RelationalStore> = Arc::new(SqliteRelationalStore::open(&config.db_path)?);
        relational.init()?;

        #[cfg(feature = "usearch-hnsw")]
        let vector: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        #[cfg(not(feature = "usearch-hnsw"))]
        let vector: Arc<dyn VectorStore> = Arc::new(MockVectorStore::new());

        let graph: Arc<dyn GraphStore> = Arc::new(MockGraphStore::new());
        let checkpoints: Arc<dyn KvStore> = Arc::new(MockKvStore::new());

        let progress = Arc::new(ProgressBus::new(relational.clone()));
        let pipeline = Arc::new(
            PipelineRunner::new(relational.clone(), vector.clone(), graph.clone(), gateway.clone(), checkpoints, progress.clone())
                .with_stage_timeout(config.stage_timeout),
        );
        let retriever = HybridRetriever::new(relational.clone(), vector.clone(), graph.clone(), gateway.clone());
        let qa = QaOrchestrator::new(
            relational.clone(),
            HybridRetriever::new(relational.clone(), vector, graph, gateway.clone()),
            gateway,
        );

        Ok(Self { relational, pipeline, progress, retriever, qa })
    }
}

/// Dispatches `cli`'s subcommand and renders the result in its chosen format.
///
/// # Errors
///
/// Returns any error raised while building the engine or running the
/// requested operation.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let ctx = Context::build(cli)?;

    match &cli.command {
        Commands::Upload { file, project, owner, summary, index, graph, analyze, depth } => {
            cmd_upload(&ctx, file, project, owner, *summary, *index, *graph, *analyze, depth, format).await
        }
        Commands::Process { doc_id, summary, index, graph, analyze, depth } => {
            cmd_process(&ctx, doc_id, *summary, *index, *graph, *analyze, depth, format).await
        }
        Commands::Progress { pipeline_id, follow } => cmd_progress(&ctx, pipeline_id, *follow, format).await,
        Commands::Interrupt { pipeline_id } => cmd_interrupt(&ctx, pipeline_id, format),
        Commands::Resume { pipeline_id } => cmd_resume(&ctx, pipeline_id, format).await,
        Commands::Artifact { doc_id, r#type } => cmd_artifact(&ctx, doc_id, r#type, format),
        Commands::Ask { question, project, conversation, strict_citations } => {
            cmd_ask(&ctx, question, project, conversation.as_deref(), *strict_citations, format).await
        }
        Commands::Retrieve { query, project, top_k } => cmd_retrieve(&ctx, query, project, *top_k, format).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_upload(
    ctx: &Context,
    file: &Path,
    project: &str,
    owner: &str,
    summary: bool,
    index: bool,
    graph: bool,
    analyze: bool,
    depth: &str,
    format: OutputFormat,
) -> Result<String> {
    let bytes = FileReader::open(file)?.read_to_bytes()?;
    if bytes.is_empty() {
        return Err(InputError::EmptyDocument.into());
    }

    let mime = guess_mime(file);
    if !crate::core::document::is_supported_mime(mime) {
        return Err(InputError::UnsupportedMime { mime: mime.to_string() }.into());
    }

    let filename = file
        .file_name()
        .map_or_else(|| file.to_string_lossy().to_string(), |n| n.to_string_lossy().to_string());

    let now = now_unix();
    let doc_id = new_id("doc");
    let document = Document::new(doc_id.clone(), filename, mime, bytes, owner, project, now);
    ctx.relational.insert_document(&document)?;

    let options = build_options(summary, index, graph, analyze, depth)?;
    let pipeline_id = if options.enabled_stages().is_empty() {
        None
    } else {
        Some(ctx.pipeline.start(&doc_id, options, now).await?)
    };

    Ok(format_upload(&document, pipeline_id.as_deref(), format))
}

async fn cmd_process(
    ctx: &Context,
    doc_id: &str,
    summary: bool,
    index: bool,
    graph: bool,
    analyze: bool,
    depth: &str,
    format: OutputFormat,
) -> Result<String> {
    ctx.relational
        .get_document(doc_id)?
        .ok_or_else(|| Error::from(NotFoundError::Document { doc_id: doc_id.to_string() }))?;

    let options = build_options(summary, index, graph, analyze, depth)?;
    let pipeline_id = ctx.pipeline.start(doc_id, options, now_unix()).await?;
    Ok(format_pipeline_started(&pipeline_id, format))
}

async fn cmd_progress(ctx: &Context, pipeline_id: &str, follow: bool, format: OutputFormat) -> Result<String> {
    if !follow {
        let snapshot = ctx.progress.get_progress(pipeline_id)?;
        return Ok(format_progress(&snapshot, format));
    }

    ctx.relational
        .get_pipeline(pipeline_id)?
        .ok_or_else(|| Error::from(NotFoundError::Pipeline { pipeline_id: pipeline_id.to_string() }))?;

    use std::io::Write;
    let mut subscription = ctx.progress.subscribe(pipeline_id);
    let mut stdout = std::io::stdout();
    while let Some(event) = subscription.recv().await {
        write!(stdout, "{}", format_progress_event(&event, format))?;
        stdout.flush()?;
    }
    Ok(String::new())
}

fn cmd_interrupt(ctx: &Context, pipeline_id: &str, format: OutputFormat) -> Result<String> {
    ctx.pipeline.interrupt(pipeline_id)?;
    Ok(format_pipeline_action("Interrupted", pipeline_id, format))
}

async fn cmd_resume(ctx: &Context, pipeline_id: &str, format: OutputFormat) -> Result<String> {
    ctx.pipeline.resume(pipeline_id).await?;
    Ok(format_pipeline_action("Resumed", pipeline_id, format))
}

fn cmd_artifact(ctx: &Context, doc_id: &str, type_str: &str, format: OutputFormat) -> Result<String> {
    let artifact_type = parse_artifact_type(type_str)?;
    let artifact = ctx.relational.get_latest_artifact(doc_id, artifact_type)?.ok_or_else(|| {
        Error::from(NotFoundError::Artifact { doc_id: doc_id.to_string(), artifact_type: artifact_type.as_str().to_string() })
    })?;
    Ok(format_artifact(&artifact, format))
}

async fn cmd_ask(
    ctx: &Context,
    question: &str,
    project: &str,
    conversation: Option<&str>,
    strict_citations: bool,
    format: OutputFormat,
) -> Result<String> {
    let packet = ctx.qa.answer(question, project, conversation, strict_citations, now_unix()).await?;
    Ok(format_answer(&packet, format))
}

async fn cmd_retrieve(ctx: &Context, query: &str, project: &str, top_k: usize, format: OutputFormat) -> Result<String> {
    let options = RetrieveOptions::with_top_k(top_k);
    let chunks = ctx.retriever.retrieve(query, project, &options).await?;
    Ok(format_retrieval(&chunks, format))
}

fn build_options(summary: bool, index: bool, graph: bool, analyze: bool, depth: &str) -> Result<PipelineOptions> {
    Ok(PipelineOptions {
        upload_only: !(summary || index || graph || analyze),
        generate_summary: summary,
        create_index: index,
        build_graph: graph,
        deep_analysis: analyze,
        analysis_depth: parse_analysis_depth(depth)?,
    })
}

fn parse_analysis_depth(s: &str) -> Result<AnalysisDepth> {
    Ok(match s.to_lowercase().as_str() {
        "basic" => AnalysisDepth::Basic,
        "standard" => AnalysisDepth::Standard,
        "deep" => AnalysisDepth::Deep,
        "expert" => AnalysisDepth::Expert,
        "comprehensive" => AnalysisDepth::Comprehensive,
        other => return Err(InputError::InvalidArgument { message: format!("unknown analysis depth: {other}") }.into()),
    })
}

fn parse_artifact_type(s: &str) -> Result<ArtifactType> {
    Ok(match s.to_lowercase().as_str() {
        "summary" => ArtifactType::Summary,
        "outline" => ArtifactType::Outline,
        "knowledge_graph" | "graph" => ArtifactType::KnowledgeGraph,
        "analysis_report" | "analysis" => ArtifactType::AnalysisReport,
        other => return Err(InputError::InvalidArgument { message: format!("unknown artifact type: {other}") }.into()),
    })
}

/// Guesses a mime type from a file extension, covering the types
/// [`crate::core::document::is_supported_mime`] accepts. No crate in
/// the dependency tree does content sniffing, so this is extension-only.
fn guess_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("md" | "markdown") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs() as i64)
}

/// Generates a unique id prefixed for readability, mirroring the
/// pipeline runner's own id generator.
fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_mime_matches_supported_extensions() {
        assert_eq!(guess_mime(Path::new("a.md")), "text/markdown");
        assert_eq!(guess_mime(Path::new("a.html")), "text/html");
        assert_eq!(guess_mime(Path::new("a.json")), "application/json");
        assert_eq!(guess_mime(Path::new("a.txt")), "text/plain");
        assert_eq!(guess_mime(Path::new("a")), "text/plain");
    }

    #[test]
    fn parse_analysis_depth_rejects_unknown() {
        assert!(parse_analysis_depth("standard").is_ok());
        assert!(parse_analysis_depth("nonsense").is_err());
    }

    #[test]
    fn parse_artifact_type_accepts_aliases() {
        assert_eq!(parse_artifact_type("graph").unwrap(), ArtifactType::KnowledgeGraph);
        assert_eq!(parse_artifact_type("analysis").unwrap(), ArtifactType::AnalysisReport);
        assert!(parse_artifact_type("nonsense").is_err());
    }

    #[test]
    fn new_id_is_unique_across_calls() {
        let a = new_id("doc");
        let b = new_id("doc");
        assert_ne!(a, b);
        assert!(a.starts_with("doc-"));
    }

    #[test]
    fn build_options_upload_only_when_no_stage_flags_set() {
        let options = build_options(false, false, false, false, "standard").unwrap();
        assert!(options.upload_only);
        assert!(options.enabled_stages().is_empty());
    }
}
