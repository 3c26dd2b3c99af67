//! Subcommand implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::Engine;

use docvqa_core::AskRequest;
use docvqa_runtime::{Orchestrator, RuntimeConfig};

use crate::cli::{AskArgs, IngestArgs, ServeArgs};
use crate::server::{self, AppState};

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            tracing::debug!("No config file given, using defaults");
            Ok(RuntimeConfig::default())
        }
    }
}

pub async fn serve(mut config: RuntimeConfig, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = config.bind_addr();
    tracing::info!(project = %config.project_name, model = %config.llm.model, "Starting server");

    let orchestrator = Orchestrator::from_config(config).context("Failed to build orchestrator")?;
    server::serve(AppState::new(orchestrator), &addr)
        .await
        .with_context(|| format!("Server on {} failed", addr))
}

pub async fn ask(config: RuntimeConfig, args: AskArgs) -> Result<()> {
    if args.question.trim().is_empty() {
        bail!("Question must not be empty");
    }

    let mut request = AskRequest::question(args.question);
    if let Some(path) = &args.document {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        request = request.with_document(text);
    }
    if let Some(path) = &args.image {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        request = request.with_image(base64::engine::general_purpose::STANDARD.encode(bytes));
    }

    let orchestrator = Orchestrator::from_config(config).context("Failed to build orchestrator")?;
    let (response, report) = orchestrator.ask(request).await?;

    let output = if args.report {
        serde_json::json!({ "response": response, "report": report })
    } else {
        serde_json::to_value(&response)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn ingest(config: RuntimeConfig, args: IngestArgs) -> Result<()> {
    config.validate()?;
    let search = docvqa_runtime::orchestrator::qdrant_search(&config)?;

    let summary = docvqa_runtime::ingest::ingest(&args.dir, &config.ingest, &search)
        .await
        .with_context(|| format!("Failed to ingest {}", args.dir.display()))?;

    println!(
        "Indexed {} chunks from {} files into '{}'",
        summary.written,
        summary.files,
        search.collection()
    );
    Ok(())
}

pub fn check_config(config: &RuntimeConfig) -> Result<()> {
    config.validate()?;
    print!("{}", serde_yaml::to_string(&config.redacted())?);
    eprintln!("Configuration is valid");
    Ok(())
}
