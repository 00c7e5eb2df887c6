//! Command-line interface for BLE scent diffusers.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby diffusers |
//! | `power` | Turn a diffuser on or off |
//! | `intensity` | Set the intensity level |
//! | `rename` | Rename a diffuser |
//! | `info` | Show the model and intensity range |
//!
//! # Configuration
//!
//! Settings are read from `--config <PATH>`, or from `aroma/aroma.toml` in
//! the platform config directory when it exists. The file holds the client
//! timing settings and an optional default `device`.
//!
//! # Environment Variables
//!
//! - `AROMA_DEVICE`: Default device identifier (overridden by `--device`)
//! - `RUST_LOG`: Log filter (overridden by `--verbose` / `--quiet`)
//!
//! # Examples
//!
//! ```bash
//! aroma scan --timeout 15s
//! aroma power on --device AA:BB:CC:DD:EE:FF
//! AROMA_DEVICE=AA:BB:CC:DD:EE:FF aroma intensity 12
//! aroma rename "Living Room" -d AA:BB:CC:DD:EE:FF
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod style;
pub mod util;

// Re-export core dependencies for convenience
pub use aroma_core;
pub use aroma_types;
