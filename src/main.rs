//! Query Cascade CLI
//!
//! Answers one natural-language question against a SQLite file and prints
//! the JSON response.
//!
//! Usage:
//!   query-cascade --database clinic.db --metadata semantic_metadata.json \
//!     "How many patients are over 65?"
//!
//! Provider selection and credentials come from the config file
//! (~/.query-cascade/config.json by default) overlaid with environment
//! variables; a `.env` file in the working directory is honoured.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use query_cascade::services::router_from_settings;
use query_cascade::storage::{ConfigService, Dataset, SqliteDataset};
use query_cascade::{QueryRequest, QueryService};

/// Self-correcting natural-language to SQL
#[derive(Parser, Debug)]
#[command(name = "query-cascade", version)]
#[command(about = "Answer a natural-language question against a SQLite database")]
struct Cli {
    /// SQLite database file to query (opened read-only)
    #[arg(long, short = 'd')]
    database: PathBuf,

    /// Config file (default: ~/.query-cascade/config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Semantic metadata JSON with table and column descriptions
    #[arg(long, short = 'm')]
    metadata: Option<PathBuf>,

    /// Skip the planning step
    #[arg(long)]
    fast: bool,

    /// Force the multi-role topology on or off (default from config)
    #[arg(long)]
    multi_agent: Option<bool>,

    /// Attempt ceiling (default from config)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Wall-clock budget in seconds (default from config)
    #[arg(long)]
    timeout: Option<f64>,

    /// Caller identity recorded in logs
    #[arg(long)]
    caller: Option<String>,

    /// The question to answer
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigService::from_path(path),
        None => ConfigService::new(),
    }
    .context("failed to load configuration")?;
    config
        .apply_environment(|key| std::env::var(key).ok())
        .context("invalid environment configuration")?;
    let settings = Arc::new(config.settings().clone());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut dataset = SqliteDataset::open(&cli.database)
        .with_context(|| format!("failed to open {}", cli.database.display()))?
        .with_max_rows(settings.max_result_rows);
    if let Some(path) = &cli.metadata {
        dataset = match dataset.clone().load_metadata(path) {
            Ok(with_meta) => with_meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring semantic metadata");
                dataset
            }
        };
    }
    let dataset: Arc<dyn Dataset> = Arc::new(dataset);

    let router = router_from_settings(&settings);
    let service = QueryService::new(dataset, router, settings).await;

    let mut request = QueryRequest::new(cli.question.join(" "));
    if cli.fast {
        request.fast_mode = Some(true);
    }
    request.caller = cli.caller;
    request.multi_agent = cli.multi_agent;
    request.max_attempts = cli.max_attempts;
    request.timeout_seconds = cli.timeout;

    let response = service.answer(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(2);
    }
    Ok(())
}
