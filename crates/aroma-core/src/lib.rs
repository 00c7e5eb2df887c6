//! Core BLE library for scent diffusers.
//!
//! This crate implements the session and protocol layer for diffusers that
//! speak the single-characteristic `fff0`/`fff6` protocol: permission and
//! adapter gating, discovery, the connect-and-authenticate handshake, the
//! command codec and the keep-alive heartbeat.
//!
//! # Features
//!
//! - **Readiness gate**: platform permission sets and adapter power handling
//! - **Discovery**: ordered, de-duplicated registry fed by a cancellable scan
//! - **Session lifecycle**: one active link, published as immutable snapshots
//! - **Commands**: power, intensity (clamped per model), rename, model query
//! - **Heartbeat**: periodic keep-alive sharing the single write queue
//! - **Pluggable transport**: btleplug on desktop, [`mock`] for tests
//!
//! # Supported Devices
//!
//! | Model | Intensity levels |
//! |-------|------------------|
//! | EA313 | 9 |
//! | EA316 | 20 |
//!
//! Unrecognized diffusers that expose the service still work, with 20 levels.
//!
//! # Platform Differences
//!
//! - **Android**: API 31+ requests scan/connect/advertise permissions, older
//!   versions request fine location. The adapter can be turned on for the user.
//! - **iOS**: one Bluetooth permission; the user must turn the adapter on.
//! - **Desktop**: no permission requests. Devices are identified by MAC
//!   address on Linux/Windows and by a CoreBluetooth UUID on macOS.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use aroma_core::btle::{BtleAdapterControl, BtleTransport};
//! use aroma_core::{ClientConfig, DiffuserClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BtleTransport::new().await?;
//!     let adapter = BtleAdapterControl::new(transport.adapter().clone());
//!     let client = DiffuserClient::new(Arc::new(transport), Arc::new(adapter), ClientConfig::default());
//!
//!     client.scan_for_peripherals().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     client.stop_scan_peripherals().await?;
//!
//!     if let Some(device) = client.all_devices().first() {
//!         client.connect_to_device(device).await?;
//!         client.set_power(true).await?;
//!         client.set_intensity(10).await?;
//!         client.disconnect_from_device(false).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod link;
pub mod mock;
pub mod platform;
pub mod registry;
pub mod scan;
pub mod session;
pub mod traits;
pub mod util;

// Core exports
pub use client::DiffuserClient;
pub use commands::Command;
pub use config::{ClientConfig, ConfigError, GateConfig, ScanConfig, SessionConfig};
pub use error::{AdapterUnavailableReason, Error, Result, TransportError, TransportResult};
pub use events::{
    AdapterEvent, ClientEvent, DisconnectReason, EventDispatcher, EventReceiver, EventSender,
    Notification,
};
pub use gate::{GateStatus, PermissionGate, Readiness};
pub use platform::{Permission, PermissionStatus, Platform};
pub use registry::DeviceRegistry;
pub use scan::Scanner;
pub use session::{ConnectionSession, FailureReason, SessionPhase, SessionSnapshot};
pub use traits::{AdapterControl, AdapterState, ScanRequest, ServiceInfo, Transport};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from aroma-types
pub use aroma_types::uuid as uuids;
pub use aroma_types::{DeviceName, ModelInfo, ParseError, Peripheral};
