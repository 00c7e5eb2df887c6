//! Rename command implementation.

use anyhow::{Context, Result};
use aroma_core::DiffuserClient;
use aroma_types::DeviceName;

use crate::util::connect;

pub async fn cmd_rename(
    client: &DiffuserClient,
    identifier: &str,
    name: &str,
    quiet: bool,
) -> Result<()> {
    // Reject bad names before touching Bluetooth.
    let name = DeviceName::new(name).context("Invalid device name")?;
    let device = connect(client, identifier, !quiet).await?;

    let result = client
        .rename_device(name.as_str())
        .await
        .context("Failed to rename device");
    client.disconnect_from_device(true).await.ok();
    result?;

    if !quiet {
        println!("Renamed {} to {}", device.display_name(), name);
    }
    Ok(())
}
