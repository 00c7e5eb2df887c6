//! CLI argument definitions using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifier (MAC address or UUID), or use AROMA_DEVICE env var
    #[arg(short, long, env = "AROMA_DEVICE")]
    pub device: Option<String>,
}

/// Power state argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

#[derive(Debug, Parser)]
#[command(name = "aroma")]
#[command(author, version, about = "CLI for BLE scent diffusers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to aroma.toml in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby diffusers
    Scan {
        /// How long to scan (e.g. "10s", "1m")
        #[arg(short, long, default_value = "10s", value_parser = parse_duration)]
        timeout: Duration,

        /// Also list peripherals that do not advertise a name
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Turn a diffuser on or off
    Power {
        #[arg(value_enum)]
        state: PowerState,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Set the intensity level (clamped to the model's range)
    Intensity {
        #[arg(allow_negative_numbers = true)]
        level: i32,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Rename a diffuser
    Rename {
        /// New name (at least 3 characters, Latin-1 only)
        name: String,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Connect and show the model and intensity range
    Info {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}
