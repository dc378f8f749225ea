// src/main.rs — Analyst entry point

use clap::Parser;

use analyst::cli::{run, Cli};
use analyst::infra::config::Config;
use analyst::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Respects RUST_LOG; -v raises the fallback level.
    logger::init_logging(if cli.verbose { "debug" } else { "warn" });

    if let Err(e) = try_main(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    run::run_analysis(&cli, config).await
}
