//! `run-mm` — the main market-making process entrypoint (§6).
//!
//! Loads a strategy config and its referenced venue catalogue, resolves
//! paper vs. live mode, and hands both to `mm_bot::runner::run`, which
//! drives the per-symbol quoters until a shutdown signal or kill-switch
//! trip unwinds them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mm_bot::config::StrategyConfig;
use mm_bot::runner::{self, RunMode};

#[derive(Parser, Debug)]
#[command(name = "run-mm", about = "Runs the market-making engine against a strategy config")]
struct Args {
    /// Path to the strategy config YAML.
    #[arg(long, env = "MM_CONFIG")]
    config: PathBuf,

    /// Run against the in-memory paper connector instead of a live venue.
    #[arg(long, conflicts_with = "live")]
    paper: bool,

    /// Run against the live REST/websocket connector.
    #[arg(long, conflicts_with = "paper")]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    if !args.paper && !args.live {
        anyhow::bail!("one of --paper or --live is required");
    }
    let mode = if args.live { RunMode::Live } else { RunMode::Paper };

    let result = run(args, mode).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "run-mm exited with an error");
    }
    result
}

async fn run(args: Args, mode: RunMode) -> Result<()> {
    let config = StrategyConfig::load(&args.config)
        .with_context(|| format!("loading strategy config from {}", args.config.display()))?;
    let venues = config
        .load_venues()
        .with_context(|| format!("loading venue catalogue from {}", config.venues_path().display()))?;

    tracing::info!(
        mode = ?mode,
        symbols = config.symbols.len(),
        "starting mm-bot"
    );

    runner::run(config, venues, mode).await
}
