//! Configuration file management.
//!
//! The CLI reads one TOML file: the client settings understood by
//! [`ClientConfig`] plus an optional default `device`.
//!
//! ```toml
//! device = "AA:BB:CC:DD:EE:FF"
//!
//! [session]
//! connect_timeout = "20s"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aroma_core::ClientConfig;
use serde::{Deserialize, Serialize};

/// Configuration file name inside the platform config directory.
const CONFIG_FILE: &str = "aroma.toml";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier
    #[serde(default)]
    pub device: Option<String>,

    /// Client timing settings
    #[serde(default, flatten)]
    pub client: ClientConfig,
}

impl Config {
    /// Default config file path (`<config dir>/aroma/aroma.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("aroma").join(CONFIG_FILE))
    }

    /// Load the explicit config file, or the default one if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .client
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Resolve the device from the argument (or env var), falling back to config.
    pub fn resolve_device(&self, device: Option<String>) -> Option<String> {
        device.or_else(|| self.device.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_device_and_client_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aroma.toml");
        fs::write(
            &path,
            "device = \"AA:BB\"\n\n[session]\nconnect_timeout = \"20s\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.device.as_deref(), Some("AA:BB"));
        assert_eq!(
            config.client.session.connect_timeout,
            Duration::from_secs(20)
        );
        assert_eq!(
            config.client.session.heartbeat_interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aroma.toml");
        fs::write(&path, "[session]\nheartbeat_interval = \"0s\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_resolve_device_prefers_argument() {
        let config = Config {
            device: Some("CONFIG".into()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_device(Some("ARG".into())).as_deref(),
            Some("ARG")
        );
        assert_eq!(config.resolve_device(None).as_deref(), Some("CONFIG"));
        assert_eq!(Config::default().resolve_device(None), None);
    }
}
