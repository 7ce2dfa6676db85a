//! CLI layer for the `dpa` binary.
//!
//! Provides the command-line interface using clap, with one
//! subcommand per external operation: uploading and processing
//! documents, polling or streaming pipeline progress, interrupting
//! and resuming pipelines, fetching artifacts, and asking or
//! retrieving over a project's indexed corpus.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
