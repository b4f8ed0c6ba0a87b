use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// Revenue competitions for storefronts, with escrowed prizes.
#[derive(Debug, Parser)]
#[command(name = "cartbrawl", version, about)]
struct Cli {
    /// Path to the configuration file. Defaults to `cartbrawl.toml`.
    #[arg(long, short, global = true, env = "CARTBRAWL_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    cli.command.execute(config).await
}
