//! Info command implementation.

use anyhow::Result;
use aroma_core::DiffuserClient;

use crate::cli::OutputFormat;
use crate::format::{as_json, format_info_text};
use crate::util::{connect, write_output};

pub async fn cmd_info(
    client: &DiffuserClient,
    identifier: &str,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let show_progress = !quiet && matches!(format, OutputFormat::Text);
    connect(client, identifier, show_progress).await?;
    let snapshot = client.session_snapshot();
    client.disconnect_from_device(true).await.ok();

    let content = match format {
        OutputFormat::Json => as_json(&snapshot)?,
        OutputFormat::Text => format_info_text(&snapshot),
    };
    write_output(&content)
}
