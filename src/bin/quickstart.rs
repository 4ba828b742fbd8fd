//! `quickstart` — scaffolds a user strategy config, venue catalogue, and
//! `.env` file from the bundled templates under `configs/`, then optionally
//! runs the bot (§6, SPEC_FULL.md §6).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mm_bot::config::StrategyConfig;
use mm_bot::runner::{self, RunMode};

const CONFIG_TEMPLATE: &str = include_str!("../../configs/config.yaml");
const VENUES_TEMPLATE: &str = include_str!("../../configs/venues.yaml");
const ENV_TEMPLATE: &str = include_str!("../../configs/.env.example");

#[derive(Parser, Debug)]
#[command(name = "quickstart", about = "Scaffolds strategy/venue config and optionally runs the bot")]
struct Args {
    /// Directory to scaffold config.yaml, venues.yaml, and .env into.
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Scaffold against the paper connector.
    #[arg(long, conflicts_with = "live")]
    paper: bool,

    /// Scaffold against the live connector.
    #[arg(long, conflicts_with = "paper")]
    live: bool,

    /// Only scaffold files and validate; do not start the engine.
    #[arg(long)]
    init_only: bool,
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

    let config_dir = if args.config.is_dir() || args.config.extension().is_none() {
        args.config.clone()
    } else {
        args.config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let config_path = config_dir.join("config.yaml");
    let venues_path = config_dir.join("venues.yaml");
    let env_path = config_dir.join(".env");

    scaffold(&config_path, CONFIG_TEMPLATE)?;
    scaffold(&venues_path, VENUES_TEMPLATE)?;
    scaffold(&env_path, ENV_TEMPLATE)?;

    let config = StrategyConfig::load(&config_path)
        .with_context(|| format!("validating scaffolded config at {}", config_path.display()))?;
    config
        .load_venues()
        .with_context(|| format!("validating scaffolded venues at {}", venues_path.display()))?;

    tracing::info!(
        config = %config_path.display(),
        venues = %venues_path.display(),
        env = %env_path.display(),
        "scaffolded strategy config"
    );

    if args.init_only {
        println!("Scaffolded config at {}", config_dir.display());
        return Ok(());
    }

    let venues = config.load_venues()?;
    runner::run(config, venues, mode).await
}

/// Writes `template` to `path` unless a file already sits there — quickstart
/// never clobbers a config a user has since edited.
fn scaffold(path: &Path, template: &str) -> Result<()> {
    if path.exists() {
        tracing::info!(path = %path.display(), "already exists, leaving in place");
        return Ok(());
    }
    std::fs::write(path, template).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
