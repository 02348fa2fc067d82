//! # Service endpoint CLI entry point

use anyhow::Context;
use clap::Parser;
use serviceendpoints::{
    cli::{Cli, run},
    config::ConfigLoader,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_loader = match cli.env_dir.clone() {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = config_loader.load().context("loading configuration")?;
    init_tracing(&config).context("initializing telemetry")?;

    tracing::debug!(profile = %config.profile, generation = %config.schema_generation, "configuration loaded");

    let output = run(cli.command, &config).await?;
    println!("{output}");
    Ok(())
}
