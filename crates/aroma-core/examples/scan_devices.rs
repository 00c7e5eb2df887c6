//! Example: Scanning for Diffusers
//!
//! This example checks Bluetooth readiness, scans for ten seconds and
//! lists every peripheral advertising the diffuser service.
//!
//! Run with: `cargo run --example scan_devices`

use std::sync::Arc;
use std::time::Duration;

use aroma_core::btle::{BtleAdapterControl, BtleTransport};
use aroma_core::uuids::DIFFUSER_SERVICE;
use aroma_core::{ClientConfig, DiffuserClient, ScanConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let transport = BtleTransport::new().await?;
    let adapter = BtleAdapterControl::new(transport.adapter().clone());
    let config =
        ClientConfig::default().scan(ScanConfig::default().service_filter(vec![DIFFUSER_SERVICE]));
    let client = DiffuserClient::new(Arc::new(transport), Arc::new(adapter), config);

    println!("Scanning for diffusers...");
    println!();

    client.scan_for_peripherals().await?;
    tokio::time::sleep(Duration::from_secs(10)).await;
    client.stop_scan_peripherals().await?;

    let devices = client.all_devices();
    if devices.is_empty() {
        println!("No diffusers found.");
        println!();
        println!("Make sure:");
        println!("  - The diffuser is plugged in");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - No phone app is connected to it");
    } else {
        println!("Found {} device(s):", devices.len());
        println!();

        for device in &devices {
            let rssi = device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string());
            println!("  {}", device.display_name());
            println!("    Identifier: {}", device.id);
            println!("    RSSI: {}", rssi);
            println!();
        }
    }

    Ok(())
}
