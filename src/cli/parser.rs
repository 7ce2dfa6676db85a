//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DPA: a staged document-analysis and question-answering engine.
#[derive(Parser, Debug)]
#[command(name = "dpa")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the DPA state database.
    ///
    /// Defaults to `.dpa/dpa-state.db` in the current directory.
    #[arg(short, long, env = "DPA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Which Gateway implementation to use (mock, live).
    #[arg(long, default_value = "mock", global = true, env = "DPA_GATEWAY")]
    pub gateway: String,

    /// API key for a live gateway provider.
    #[arg(long, global = true, env = "DPA_API_KEY")]
    pub api_key: Option<String>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands, one per external operation (§6).
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Uploads a document, optionally starting processing immediately.
    Upload {
        /// Path to the file to upload.
        file: PathBuf,

        /// Owning project id.
        #[arg(long, default_value = "default")]
        project: String,

        /// Owning user id.
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Generate the macro summary.
        #[arg(long)]
        summary: bool,

        /// Build the chunk/embedding index.
        #[arg(long)]
        index: bool,

        /// Build the knowledge graph.
        #[arg(long)]
        graph: bool,

        /// Run the full cognitive analyzer.
        #[arg(long)]
        analyze: bool,

        /// Analyzer depth when `--analyze` is set.
        #[arg(long, default_value = "standard")]
        depth: String,
    },

    /// Starts processing for an already-uploaded document.
    Process {
        /// Document id.
        doc_id: String,

        /// Generate the macro summary.
        #[arg(long)]
        summary: bool,

        /// Build the chunk/embedding index.
        #[arg(long)]
        index: bool,

        /// Build the knowledge graph.
        #[arg(long)]
        graph: bool,

        /// Run the full cognitive analyzer.
        #[arg(long)]
        analyze: bool,

        /// Analyzer depth when `--analyze` is set.
        #[arg(long, default_value = "standard")]
        depth: String,
    },

    /// Reports a pipeline's progress.
    Progress {
        /// Pipeline id.
        pipeline_id: String,

        /// Stream live progress events instead of a single snapshot.
        #[arg(short, long)]
        follow: bool,
    },

    /// Requests cancellation of a running pipeline.
    Interrupt {
        /// Pipeline id.
        pipeline_id: String,
    },

    /// Resumes an interrupted, resumable pipeline.
    Resume {
        /// Pipeline id.
        pipeline_id: String,
    },

    /// Fetches a produced artifact.
    Artifact {
        /// Document id.
        doc_id: String,

        /// Artifact type (summary, outline, knowledge_graph, analysis_report).
        #[arg(long, default_value = "summary")]
        r#type: String,
    },

    /// Asks a question over a project's indexed documents.
    Ask {
        /// The question text.
        question: String,

        /// Scoping project id.
        #[arg(long, default_value = "default")]
        project: String,

        /// Existing conversation id to continue, if any.
        #[arg(long)]
        conversation: Option<String>,

        /// Flag sentences with no supporting chunk citation.
        #[arg(long)]
        strict_citations: bool,
    },

    /// Runs the Hybrid Retriever directly, without synthesis.
    Retrieve {
        /// The search query.
        query: String,

        /// Scoping project id.
        #[arg(long, default_value = "default")]
        project: String,

        /// Number of results to return.
        #[arg(long, default_value = "20")]
        top_k: usize,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::store::DEFAULT_DB_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_db_path() {
        let cli = Cli {
            db_path: None,
            verbose: false,
            format: "text".to_string(),
            gateway: "mock".to_string(),
            api_key: None,
            command: Commands::Progress { pipeline_id: "p1".to_string(), follow: false },
        };
        assert_eq!(cli.get_db_path(), PathBuf::from(crate::store::DEFAULT_DB_PATH));
    }

    #[test]
    fn test_custom_db_path() {
        let cli = Cli {
            db_path: Some(PathBuf::from("/custom/path.db")),
            verbose: false,
            format: "text".to_string(),
            gateway: "mock".to_string(),
            api_key: None,
            command: Commands::Progress { pipeline_id: "p1".to_string(), follow: false },
        };
        assert_eq!(cli.get_db_path(), PathBuf::from("/custom/path.db"));
    }
}
