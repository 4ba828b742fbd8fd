//! `run-backtest` — replays the quoting model against a random-walk price
//! simulation and writes the CSV summary the CLI contract promises (§6).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mm_bot::backtest::{self, BacktestMode};
use mm_bot::config::StrategyConfig;

#[derive(Parser, Debug)]
#[command(name = "run-backtest", about = "Runs the quoting model against a simulated price path")]
struct Args {
    /// Path to the strategy config YAML (only the first symbol + quote section are used).
    #[arg(long, env = "MM_CONFIG")]
    config: PathBuf,

    /// Replay mode: `event` (full feature extraction per tick) or `vectorized` (flat features).
    #[arg(long, default_value = "event")]
    mode: String,

    /// Path to write the CSV report to.
    #[arg(long)]
    output: PathBuf,

    /// Number of simulated ticks to run.
    #[arg(long, default_value_t = 20_000)]
    steps: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let mode: BacktestMode = args.mode.parse().context("parsing --mode")?;

    let config = StrategyConfig::load(&args.config)
        .with_context(|| format!("loading strategy config from {}", args.config.display()))?;

    tracing::info!(mode = ?mode, steps = args.steps, "running backtest");
    let report = backtest::run(&config, mode, args.steps)?;

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    std::fs::write(&args.output, report.to_csv())
        .with_context(|| format!("writing backtest report to {}", args.output.display()))?;

    tracing::info!(
        pnl = report.pnl,
        sharpe = report.sharpe,
        sortino = report.sortino,
        trades = report.trades,
        max_drawdown = report.max_drawdown,
        "backtest complete"
    );
    println!("{}", report.to_csv());
    Ok(())
}
