//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Legal document question answering.
#[derive(Debug, Parser)]
#[command(name = "docvqa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file; defaults apply when omitted
    #[arg(short, long, global = true, env = "DOCVQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Answer one question and print the JSON response
    Ask(AskArgs),

    /// Rebuild the vector collection from a directory of statutes
    Ingest(IngestArgs),

    /// Validate the configuration and print it with defaults applied
    CheckConfig,
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Overrides `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Overrides `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// File holding pre-extracted document text
    #[arg(short, long, conflicts_with = "image")]
    pub document: Option<PathBuf>,

    /// Scanned document image
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Print the run report alongside the response
    #[arg(long)]
    pub report: bool,
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Directory of .txt and .md files
    pub dir: PathBuf,
}
