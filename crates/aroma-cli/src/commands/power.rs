//! Power command implementation.

use anyhow::{Context, Result};
use aroma_core::DiffuserClient;

use crate::cli::PowerState;
use crate::util::connect;

pub async fn cmd_power(
    client: &DiffuserClient,
    identifier: &str,
    state: PowerState,
    quiet: bool,
) -> Result<()> {
    let device = connect(client, identifier, !quiet).await?;

    let result = client
        .set_power(state.is_on())
        .await
        .context("Failed to set power");
    client.disconnect_from_device(true).await.ok();
    result?;

    if !quiet {
        println!(
            "{} turned {}",
            device.display_name(),
            if state.is_on() { "on" } else { "off" }
        );
    }
    Ok(())
}
