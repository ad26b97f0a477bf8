//! CLI command definitions for scan-forge.
//!
//! The CLI is a thin shell: it loads the immutable batch configuration,
//! applies a handful of overrides, wires up the components, and hands off
//! to the orchestrator. The process exits 0 whenever orchestration itself
//! completes, regardless of how many individual repositories failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::execution::DockerRunner;
use crate::pipeline::outcome::{collect_outcomes, write_aggregate};
use crate::pipeline::BatchOrchestrator;
use crate::publish::{HfPublishConfig, HfPublisher};

/// Default configuration file path.
const DEFAULT_CONFIG: &str = "scan-forge.yaml";

/// Batch-run a containerized scanner over pinned repository snapshots.
#[derive(Parser)]
#[command(name = "scan-forge")]
#[command(about = "Batch-run a containerized scanner over pinned repository snapshots")]
#[command(version)]
#[command(
    long_about = "scan-forge downloads repository snapshots at pinned revisions, runs a \
containerized scanner over each inside a bounded worker pool, archives per-run output, and \
records one durable outcome per run.\n\nExample usage:\n  scan-forge run --config scan-forge.yaml --workers 8"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the batch pipeline over the input list.
    Run(RunArgs),

    /// Rebuild the aggregate file from per-run outcome records.
    ///
    /// Useful after a killed batch: the per-run records survive even when
    /// the aggregate was never written.
    #[command(alias = "agg")]
    Aggregate(AggregateArgs),
}

/// Arguments for `scan-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the YAML batch configuration.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Override the input JSONL file from the config.
    #[arg(short, long)]
    pub input: Option<String>,

    /// Override the worker pool size from the config.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Override the scanner image from the config.
    #[arg(long)]
    pub image: Option<String>,

    /// Skip inputs that already have a per-run outcome record.
    #[arg(long)]
    pub resume: bool,

    /// HuggingFace API token for dataset upload.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Print the batch summary as JSON on stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `scan-forge aggregate`.
#[derive(Parser, Debug)]
pub struct AggregateArgs {
    /// Path to the YAML batch configuration.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Override the aggregate output file from the config.
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Aggregate(args) => cmd_aggregate(args),
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = Config::load(Path::new(&args.config))?;

    if let Some(input) = args.input {
        config.input_file = PathBuf::from(input);
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(image) = args.image {
        config.docker.image = image;
    }
    if args.resume {
        config.resume = true;
    }
    config.validate()?;

    let publisher = if config.publish.enabled {
        let token = args
            .hf_token
            .ok_or_else(|| anyhow::anyhow!("publishing is enabled but no HF token was provided"))?;
        let publisher = HfPublisher::new(HfPublishConfig {
            repo_id: config.publish.repo_id.clone(),
            token,
            private: config.publish.private,
        })?;
        publisher.ensure_repo_exists().await?;
        Some(Arc::new(publisher))
    } else {
        None
    };

    let runner = Arc::new(DockerRunner::new(&config.docker));
    let orchestrator = BatchOrchestrator::new(Arc::new(config), runner, publisher);
    let summary = orchestrator.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn cmd_aggregate(args: AggregateArgs) -> anyhow::Result<()> {
    let mut config = Config::load(Path::new(&args.config))?;
    if let Some(output) = args.output {
        config.output_file = PathBuf::from(output);
    }

    let outcomes = collect_outcomes(&config.dirs.json_results)?;
    write_aggregate(&config.output_file, &outcomes)?;
    info!(
        records = outcomes.len(),
        path = %config.output_file.display(),
        "Aggregate rebuilt from per-run records"
    );

    Ok(())
}
