//! Debate runner.
//!
//! Wires the debate engine to an OpenAI-compatible generation endpoint, a
//! Postgres snapshot store and a transcript directory, then runs one
//! subcommand and prints its result as JSON.
//!
//! ```bash
//! debate-agents start inventory-team "Safety stock for slow movers" \
//!     --context '{"slow_movers": 412}' --priority high
//! DEBATE_GENERATION=false debate-agents start-all "Quarter close"
//! debate-agents history --domain cost --limit 5
//! ```

mod commands;
mod config;
mod generation;
mod postgres;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::generation::{DisabledGenerator, SharedTextGenerator};
use coordination::{
    DebateEngine, FileTranscriptSink, MemoryDebateStore, NullTranscriptSink, SharedDebateStore,
    SharedTranscriptSink,
};
use tracing::{info, warn};

use crate::commands::{Command, Runner};
use crate::config::AppConfig;
use crate::generation::HttpTextGenerator;
use crate::postgres::PostgresDebateStore;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (overrides DEBATE_CONFIG, default ./debate.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `coordination=trace` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Leave restored debates where they are instead of resuming them
    #[arg(long, default_value_t = false)]
    no_resume: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("DEBATE_CONFIG").ok().map(PathBuf::from));
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let generator: SharedTextGenerator = if config.generator.enabled {
        info!(url = %config.generator.url, model = %config.generator.model, "Using HTTP generator");
        Arc::new(
            HttpTextGenerator::new(config.generator.clone())
                .context("Failed to create HTTP client")?,
        )
    } else {
        info!("Generation disabled, all rounds use fallback content");
        Arc::new(DisabledGenerator)
    };

    let store: SharedDebateStore = match &config.storage.database_url {
        Some(url) => Arc::new(
            PostgresDebateStore::connect(url)
                .await
                .context("Failed to connect to Postgres")?,
        ),
        None => {
            warn!("No database configured, debates are not kept between runs");
            MemoryDebateStore::new().shared()
        }
    };

    let transcripts: SharedTranscriptSink = match &config.storage.transcript_dir {
        Some(dir) => Arc::new(
            FileTranscriptSink::open(dir)
                .await
                .with_context(|| format!("Failed to open transcript directory {}", dir.display()))?,
        ),
        None => Arc::new(NullTranscriptSink),
    };

    let engine = DebateEngine::builder(config.engine.clone())
        .with_generator(generator)
        .with_store(store)
        .with_transcripts(transcripts.clone())
        .build()
        .context("Invalid engine configuration")?;

    let report = engine
        .start(!args.no_resume)
        .await
        .context("Failed to restore debates")?;
    info!(
        admitted = report.admitted.len(),
        queued = report.queued.len(),
        skipped = report.skipped.len(),
        history = report.history_loaded,
        "Engine started"
    );

    let runner = Runner::new(
        &engine,
        transcripts,
        Duration::from_secs(config.storage.wait_secs),
    );
    let outcome = runner.run(args.command).await;
    engine.shutdown().await;

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
