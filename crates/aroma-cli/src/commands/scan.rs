//! Scan command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use aroma_core::DiffuserClient;

use crate::cli::OutputFormat;
use crate::format::{as_json, format_scan_text};
use crate::style;
use crate::util::write_output;

pub async fn cmd_scan(
    client: &DiffuserClient,
    timeout: Duration,
    all: bool,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let spinner = if !quiet && matches!(format, OutputFormat::Text) {
        Some(style::scanning_spinner(timeout))
    } else {
        None
    };

    let scanned = scan_for(client, timeout).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    scanned?;

    if let Some(error) = client.last_scan_error() {
        return Err(error).context("Scan ended early");
    }

    let devices: Vec<_> = client
        .all_devices()
        .into_iter()
        .filter(|d| all || d.has_name())
        .collect();

    let content = match format {
        OutputFormat::Json => as_json(&devices)?,
        OutputFormat::Text => format_scan_text(&devices, quiet),
    };
    write_output(&content)
}

async fn scan_for(client: &DiffuserClient, timeout: Duration) -> Result<()> {
    client
        .scan_for_peripherals()
        .await
        .context("Failed to scan for devices")?;
    tokio::time::sleep(timeout).await;
    client.stop_scan_peripherals().await?;
    Ok(())
}
