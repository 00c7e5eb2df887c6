//! Intensity command implementation.

use anyhow::{Context, Result};
use aroma_core::DiffuserClient;

use crate::util::connect;

pub async fn cmd_intensity(
    client: &DiffuserClient,
    identifier: &str,
    level: i32,
    quiet: bool,
) -> Result<()> {
    let device = connect(client, identifier, !quiet).await?;
    let levels = client.session_snapshot().total_levels();

    let result = client
        .set_intensity(level)
        .await
        .context("Failed to set intensity");
    client.disconnect_from_device(true).await.ok();
    let applied = result?;

    if !quiet {
        if i32::from(applied) != level {
            eprintln!("Level {} is out of range, using {}", level, applied);
        }
        println!(
            "{} intensity set to {}/{}",
            device.display_name(),
            applied,
            levels
        );
    }
    Ok(())
}
