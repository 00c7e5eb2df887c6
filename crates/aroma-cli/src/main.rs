use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aroma_cli::cli::{Cli, Commands};
use aroma_cli::commands::{cmd_info, cmd_intensity, cmd_power, cmd_rename, cmd_scan};
use aroma_cli::config::Config;
use aroma_cli::util::{build_client, require_device};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            timeout,
            all,
            format,
        } => {
            let client = build_client(config.client).await?;
            cmd_scan(&client, timeout, all, format, cli.quiet).await
        }
        Commands::Power { state, device } => {
            let identifier = require_device(config.resolve_device(device.device))?;
            let client = build_client(config.client).await?;
            cmd_power(&client, &identifier, state, cli.quiet).await
        }
        Commands::Intensity { level, device } => {
            let identifier = require_device(config.resolve_device(device.device))?;
            let client = build_client(config.client).await?;
            cmd_intensity(&client, &identifier, level, cli.quiet).await
        }
        Commands::Rename { name, device } => {
            let identifier = require_device(config.resolve_device(device.device))?;
            let client = build_client(config.client).await?;
            cmd_rename(&client, &identifier, &name, cli.quiet).await
        }
        Commands::Info { device, format } => {
            let identifier = require_device(config.resolve_device(device.device))?;
            let client = build_client(config.client).await?;
            cmd_info(&client, &identifier, format, cli.quiet).await
        }
    }
}
