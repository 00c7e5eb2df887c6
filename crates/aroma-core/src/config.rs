//! Client configuration.
//!
//! All timing knobs of the gate, scanner and session live here. Every
//! struct has sensible defaults and `#[must_use]` builder setters, and the
//! whole tree can be loaded from TOML with durations written as humantime
//! strings:
//!
//! ```toml
//! event_capacity = 100
//!
//! [gate]
//! adapter_enable_timeout = "10s"
//!
//! [scan]
//! allow_duplicates = false
//!
//! [session]
//! connect_timeout = "30s"
//! heartbeat_interval = "5s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;

/// Default wait for the adapter to power on after an enable request.
const DEFAULT_ADAPTER_ENABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between adapter state polls while waiting for power-on.
const DEFAULT_ADAPTER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single characteristic write.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default keep-alive period.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait for the model-number notification.
const DEFAULT_MODEL_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration load errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to parse config: {0}")]
    Syntax(#[from] toml::de::Error),
}

/// Permission/adapter gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// How long to wait for the adapter to report powered-on after enabling it.
    #[serde(with = "humantime_serde")]
    pub adapter_enable_timeout: Duration,
    /// How often to re-check the adapter state while waiting.
    #[serde(with = "humantime_serde")]
    pub adapter_poll_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            adapter_enable_timeout: DEFAULT_ADAPTER_ENABLE_TIMEOUT,
            adapter_poll_interval: DEFAULT_ADAPTER_POLL_INTERVAL,
        }
    }
}

impl GateConfig {
    /// Set the adapter enable timeout.
    #[must_use]
    pub fn adapter_enable_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_enable_timeout = timeout;
        self
    }

    /// Set the adapter poll interval.
    #[must_use]
    pub fn adapter_poll_interval(mut self, interval: Duration) -> Self {
        self.adapter_poll_interval = interval;
        self
    }
}

/// Scanner settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Advertised services to filter on. `None` reports every peripheral.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_filter: Option<Vec<Uuid>>,
    /// Report every advertisement rather than one per peripheral.
    pub allow_duplicates: bool,
}

impl ScanConfig {
    /// Only report peripherals advertising one of these services.
    #[must_use]
    pub fn service_filter(mut self, services: Vec<Uuid>) -> Self {
        self.service_filter = Some(services);
        self
    }

    /// Report repeated advertisements.
    #[must_use]
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// Connection session settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use aroma_core::config::SessionConfig;
///
/// let config = SessionConfig::default()
///     .connect_timeout(Duration::from_secs(15))
///     .heartbeat_interval(Duration::from_secs(10));
/// assert_eq!(config.write_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for establishing the link.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for service discovery after the link is up.
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Duration,
    /// Timeout for each characteristic write.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Period between keep-alive writes while ready.
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// How long to wait for the model-number notification.
    #[serde(with = "humantime_serde")]
    pub model_query_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            model_query_timeout: DEFAULT_MODEL_QUERY_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the model query timeout.
    #[must_use]
    pub fn model_query_timeout(mut self, timeout: Duration) -> Self {
        self.model_query_timeout = timeout;
        self
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Gate settings.
    pub gate: GateConfig,
    /// Scanner settings.
    pub scan: ScanConfig,
    /// Session settings.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            gate: GateConfig::default(),
            scan: ScanConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the gate settings.
    #[must_use]
    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Replace the scan settings.
    #[must_use]
    pub fn scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    /// Replace the session settings.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every timeout and interval is usable.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("gate.adapter_enable_timeout", self.gate.adapter_enable_timeout),
            ("gate.adapter_poll_interval", self.gate.adapter_poll_interval),
            ("session.connect_timeout", self.session.connect_timeout),
            ("session.discovery_timeout", self.session.discovery_timeout),
            ("session.write_timeout", self.session.write_timeout),
            ("session.heartbeat_interval", self.session.heartbeat_interval),
            ("session.model_query_timeout", self.session.model_query_timeout),
        ];

        let mut errors: Vec<String> = durations
            .iter()
            .filter(|(_, d)| d.is_zero())
            .map(|(field, _)| format!("{} must be greater than zero", field))
            .collect();

        if self.event_capacity == 0 {
            errors.push("event_capacity must be greater than zero".to_string());
        }
        if matches!(&self.scan.service_filter, Some(services) if services.is_empty()) {
            errors.push("scan.service_filter must not be an empty list".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_config(errors.join("; ")))
        }
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.session.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.session.model_query_timeout, Duration::from_secs(3));
        assert_eq!(config.gate.adapter_enable_timeout, Duration::from_secs(10));
        assert_eq!(config.event_capacity, 100);
        assert!(config.scan.service_filter.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .session(SessionConfig::default().write_timeout(Duration::from_secs(2)))
            .scan(ScanConfig::default().allow_duplicates(true))
            .event_capacity(16);
        assert_eq!(config.session.write_timeout, Duration::from_secs(2));
        assert!(config.scan.allow_duplicates);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_from_toml_with_humantime_durations() {
        let config = ClientConfig::from_toml(
            r#"
            [session]
            connect_timeout = "45s"
            heartbeat_interval = "2s 500ms"

            [scan]
            service_filter = ["0000fff0-0000-1000-8000-00805f9b34fb"]
            "#,
        )
        .unwrap();
        assert_eq!(config.session.connect_timeout, Duration::from_secs(45));
        assert_eq!(config.session.heartbeat_interval, Duration::from_millis(2500));
        // Unspecified keys keep their defaults
        assert_eq!(config.session.write_timeout, Duration::from_secs(5));
        assert_eq!(
            config.scan.service_filter,
            Some(vec![aroma_types::uuids::DIFFUSER_SERVICE])
        );
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ClientConfig::from_toml("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_bad_duration_is_config_error() {
        let err = ClientConfig::from_toml("[session]\nconnect_timeout = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Syntax(_))));
    }

    #[test]
    fn test_validation_rejects_zero() {
        let config = ClientConfig::default()
            .session(SessionConfig::default().heartbeat_interval(Duration::ZERO))
            .event_capacity(0);
        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("session.heartbeat_interval"));
        assert!(message.contains("event_capacity"));
    }

    #[test]
    fn test_validation_rejects_empty_filter() {
        let config = ClientConfig::default().scan(ScanConfig::default().service_filter(vec![]));
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ClientConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("connect_timeout = \"30s\""));
        assert_eq!(ClientConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/nonexistent/aroma.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Read { .. })));
    }
}
