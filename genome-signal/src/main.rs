//! Genome Watcher - discourse signal pipeline CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genome_common::config::Config;
use genome_common::logging::init_logging_with_exclusions;
use genome_signal::reports::{agent_report, build_report, timeline, TimelineFilter};
use genome_signal::taxonomy::EventType;
use genome_signal::post::parse_batch;
use genome_signal::{AnalysisWorker, BatchSummary, Pipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "genome-watcher")]
#[command(version)]
#[command(about = "Discourse signal pipeline for AI-agent communities", long_about = None)]
struct Cli {
    /// Config file (default: ~/.genome-watcher/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force rule-based classification
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the background analysis worker until Ctrl-C
    Run,

    /// Ingest and process posts from a JSON array file
    Analyze {
        file: PathBuf,

        /// Also print a trend summary of the batch
        #[arg(long)]
        trends: bool,
    },

    /// Print aggregate views as JSON
    Report {
        /// Analyses and events considered
        #[arg(long, default_value = "50")]
        window: usize,

        /// Show one agent's trajectory and shifts instead
        #[arg(long)]
        agent: Option<String>,

        /// Show the event timeline filtered by type (e.g. identity_shift)
        #[arg(long)]
        event_type: Option<String>,

        /// Show the event timeline filtered by date prefix (e.g. 2026-01-28)
        #[arg(long)]
        date: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load_with_env()?,
    };
    if cli.mock {
        config.mock_mode = true;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    info!("Genome Watcher v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Analyze { file, trends } => analyze(config, &file, trends).await,
        Commands::Report {
            window,
            agent,
            event_type,
            date,
        } => report(config, window, agent, event_type, date).await,
        Commands::Config => print_json(&config),
    }
}

async fn open_pipeline(config: &Config) -> Result<Arc<Pipeline>> {
    let pipeline = Pipeline::from_config(config)?;
    pipeline.load().await?;
    Ok(Arc::new(pipeline))
}

async fn run(config: Config) -> Result<()> {
    if !config.worker.enabled {
        warn!("Analysis worker disabled in config, nothing to run");
        return Ok(());
    }

    let pipeline = open_pipeline(&config).await?;
    let worker = Arc::new(AnalysisWorker::new(config.worker.clone(), pipeline));

    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    worker.stop().await;

    handle.await.context("Worker task panicked")?
}

#[derive(Serialize)]
struct AnalyzeSummary {
    #[serde(flatten)]
    batch: BatchSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    trends: Option<genome_signal::classifier::TrendSummary>,
}

async fn analyze(config: Config, file: &Path, trends: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut posts = parse_batch(&raw).with_context(|| format!("Failed to parse posts from {}", file.display()))?;
    posts.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let pipeline = open_pipeline(&config).await?;
    let pacing = if pipeline.analyzer().classifier().name() == "rules" {
        Duration::ZERO
    } else {
        Duration::from_millis(config.worker.pacing_ms)
    };

    let batch = pipeline.process_batch(&posts, pacing).await;
    let trends = if trends {
        Some(pipeline.analyzer().analyze_trends(&posts).await)
    } else {
        None
    };
    print_json(&AnalyzeSummary { batch, trends })
}

async fn report(
    config: Config,
    window: usize,
    agent: Option<String>,
    event_type: Option<String>,
    date: Option<String>,
) -> Result<()> {
    let pipeline = open_pipeline(&config).await?;

    if let Some(agent_id) = agent {
        return match agent_report(&pipeline, &agent_id).await {
            Some(report) => print_json(&report),
            None => anyhow::bail!("No profile for agent {agent_id}"),
        };
    }

    if event_type.is_some() || date.is_some() {
        let filter = TimelineFilter {
            event_type: event_type.as_deref().map(EventType::from),
            date,
        };
        return print_json(&timeline(&pipeline, &filter).await?);
    }

    print_json(&build_report(&pipeline, window).await?)
}
