//! Example: Controlling a Diffuser
//!
//! Connects to the diffuser named by `AROMA_DEVICE`, turns it on at half
//! intensity for a minute while the heartbeat keeps the link alive, then
//! turns it off again.
//!
//! Run with: `AROMA_DEVICE=AA:BB:CC:DD:EE:FF cargo run --example control_diffuser`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use aroma_core::btle::{BtleAdapterControl, BtleTransport};
use aroma_core::{ClientConfig, DiffuserClient, Peripheral};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let id = env::var("AROMA_DEVICE").map_err(|_| "set AROMA_DEVICE to a device identifier")?;

    let transport = BtleTransport::new().await?;
    let adapter = BtleAdapterControl::new(transport.adapter().clone());
    let client = DiffuserClient::new(Arc::new(transport), Arc::new(adapter), ClientConfig::default());

    // Populate the adapter's peripheral cache.
    client.scan_for_peripherals().await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let device = client
        .all_devices()
        .into_iter()
        .find(|d| d.id == id)
        .unwrap_or_else(|| Peripheral::new(id.clone(), None, None));

    println!("Connecting to {}...", device.display_name());
    client.connect_to_device(&device).await?;

    let snapshot = client.session_snapshot();
    let model = if snapshot.model_name.is_empty() {
        "unknown"
    } else {
        snapshot.model_name.as_str()
    };
    println!("Connected (model: {}, {} levels)", model, snapshot.total_levels());

    client.set_power(true).await?;
    let level = client
        .set_intensity(i32::from(snapshot.total_levels()) / 2)
        .await?;
    println!("Running at level {} for one minute", level);
    tokio::time::sleep(Duration::from_secs(60)).await;

    client.set_power(false).await?;
    client.disconnect_from_device(false).await?;
    println!("Done");
    Ok(())
}
