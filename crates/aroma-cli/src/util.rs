//! Utility functions for CLI operations.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indicatif::ProgressBar;
use aroma_core::btle::{BtleAdapterControl, BtleTransport};
use aroma_core::{ClientConfig, DiffuserClient, Peripheral};
use tokio::time::{Instant, sleep};

use crate::style;

/// How long to look for the requested device before connecting anyway.
const FIND_TIMEOUT: Duration = Duration::from_secs(8);

/// Poll interval while waiting for the requested device to be discovered.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Get device identifier, with helpful error message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.ok_or_else(|| {
        anyhow!(
            "No device specified. Use --device <ID> or set AROMA_DEVICE environment variable.\n\
             Run 'aroma scan' to find nearby devices."
        )
    })
}

/// Build a client over the first system Bluetooth adapter.
pub async fn build_client(config: ClientConfig) -> Result<DiffuserClient> {
    let transport = BtleTransport::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let adapter = BtleAdapterControl::new(transport.adapter().clone());
    Ok(DiffuserClient::new(
        Arc::new(transport),
        Arc::new(adapter),
        config,
    ))
}

/// Find the device by a short scan, then connect and authenticate.
///
/// The adapter only knows peripherals it has seen advertise, so the scan
/// runs until the device shows up or [`FIND_TIMEOUT`] elapses. A spinner is
/// shown on stderr when `show_progress` is set and stderr is a terminal.
pub async fn connect(
    client: &DiffuserClient,
    identifier: &str,
    show_progress: bool,
) -> Result<Peripheral> {
    let spinner = (show_progress && io::stderr().is_terminal())
        .then(|| style::connecting_spinner(identifier));

    let result = find_and_connect(client, identifier, spinner.as_ref()).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    result
}

async fn find_and_connect(
    client: &DiffuserClient,
    identifier: &str,
    spinner: Option<&ProgressBar>,
) -> Result<Peripheral> {
    client
        .scan_for_peripherals()
        .await
        .context("Failed to start scan")?;

    let deadline = Instant::now() + FIND_TIMEOUT;
    let found = loop {
        if let Some(device) = find_device(&client.all_devices(), identifier) {
            break Some(device);
        }
        if Instant::now() >= deadline {
            break None;
        }
        sleep(FIND_POLL_INTERVAL).await;
    };

    let device = found.unwrap_or_else(|| {
        tracing::warn!(device = identifier, "Device not seen while scanning, trying anyway");
        Peripheral::new(identifier, None, None)
    });
    if let Some(sp) = spinner {
        sp.set_message(format!("Connecting to {}...", device.display_name()));
    }
    client
        .connect_to_device(&device)
        .await
        .with_context(|| format!("Failed to connect to {}", identifier))?;
    Ok(device)
}

/// Match a discovered device by identifier (case-insensitive) or exact name.
pub fn find_device(devices: &[Peripheral], identifier: &str) -> Option<Peripheral> {
    devices
        .iter()
        .find(|d| d.id.eq_ignore_ascii_case(identifier))
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.name.as_deref() == Some(identifier))
        })
        .cloned()
}

/// Write command output to stdout.
pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err();
        assert!(err.to_string().contains("AROMA_DEVICE"));
    }

    #[test]
    fn test_find_device_by_id_or_name() {
        let devices = vec![
            Peripheral::new("AA:BB:CC:DD:EE:FF", Some("Hallway".into()), None),
            Peripheral::new("11:22:33:44:55:66", None, None),
        ];
        assert_eq!(
            find_device(&devices, "aa:bb:cc:dd:ee:ff").map(|d| d.id),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            find_device(&devices, "Hallway").map(|d| d.id),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert!(find_device(&devices, "Kitchen").is_none());
    }
}
