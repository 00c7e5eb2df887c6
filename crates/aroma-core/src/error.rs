//! Error types for aroma-core.
//!
//! Two layers of errors exist in this crate:
//!
//! - [`TransportError`] is what a [`Transport`](crate::traits::Transport) or
//!   [`AdapterControl`](crate::traits::AdapterControl) implementation returns.
//!   It may wrap raw `btleplug` errors.
//! - [`Error`] is the taxonomy surfaced by the scanner, the session and the
//!   [`DiffuserClient`](crate::client::DiffuserClient). Transport errors are
//!   translated into it at the component boundary, so UI code never matches
//!   on a raw BLE error.
//!
//! # Error Recovery Strategies
//!
//! | Error | User-facing action | Retried automatically |
//! |-------|--------------------|-----------------------|
//! | [`Error::PermissionDenied`] | Retry or open settings | No |
//! | [`Error::AdapterUnavailable`] | Open Bluetooth settings | No |
//! | [`Error::AdapterNotReady`] | Call `ensure_ready` first | No |
//! | [`Error::ScanError`] | Scan again | No |
//! | [`Error::ConnectTimeout`] | Retry same or another device | No |
//! | [`Error::ConnectError`] | Retry same or another device | No |
//! | [`Error::IncompatibleDevice`] | Pick another device | No |
//! | [`Error::AuthenticationFailed`] | Retry | No |
//! | [`Error::CommandFailed`] | Dismiss; session stays connected | No |
//! | [`Error::DisconnectFailed`] | None; the session is already idle | No |
//!
//! Heartbeat write failures never become an [`Error`]; they are logged and
//! the next heartbeat is scheduled.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::platform::Permission;
use crate::session::SessionPhase;

/// Errors surfaced by the diffuser session layer.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The user refused an OS permission required for BLE.
    #[error("Permission denied: {permission}")]
    PermissionDenied {
        /// The permission that was refused.
        permission: Permission,
        /// Platform settings location to send the user to, if any.
        settings_url: Option<&'static str>,
    },

    /// The Bluetooth radio is off and could not be turned on.
    #[error("Bluetooth adapter unavailable: {reason}")]
    AdapterUnavailable {
        /// Why the adapter could not be used.
        reason: AdapterUnavailableReason,
        /// Platform settings location to send the user to, if any.
        settings_url: Option<&'static str>,
    },

    /// Scanning was requested before the permission gate reported ready.
    #[error("Bluetooth adapter not ready; permissions and adapter state must be checked first")]
    AdapterNotReady,

    /// The adapter reported an error while scanning.
    #[error("Scan failed: {0}")]
    ScanError(String),

    /// The connection attempt did not complete in time.
    #[error("Connection to {device_id} timed out after {duration:?}")]
    ConnectTimeout {
        /// The device that was being connected.
        device_id: String,
        /// The bound that elapsed.
        duration: Duration,
    },

    /// The adapter rejected or aborted the connection.
    #[error("Connection to {device_id} failed: {reason}")]
    ConnectError {
        /// The device that was being connected.
        device_id: String,
        /// Description of the failure.
        reason: String,
    },

    /// The peripheral lacks the diffuser service or characteristic.
    #[error("Device {device_id} is not a compatible diffuser (missing {missing})")]
    IncompatibleDevice {
        /// The rejected device.
        device_id: String,
        /// The service or characteristic UUID that was not found.
        missing: Uuid,
    },

    /// The authentication write did not succeed.
    #[error("Authentication with {device_id} failed: {reason}")]
    AuthenticationFailed {
        /// The device that rejected authentication.
        device_id: String,
        /// Description of the failure.
        reason: String,
    },

    /// A user command (rename, power, intensity) could not be written.
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed {
        /// Name of the command.
        command: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// The transport failed to close the link. Session state was cleaned up regardless.
    #[error("Disconnect from {device_id} failed: {reason}")]
    DisconnectFailed {
        /// The device that was being disconnected.
        device_id: String,
        /// Description of the failure.
        reason: String,
    },

    /// A command needs a ready session.
    #[error("No ready session (session is {phase})")]
    NotReady {
        /// The phase the session was in.
        phase: SessionPhase,
    },

    /// A rename target failed validation.
    #[error("Invalid device name: {0}")]
    InvalidName(#[from] aroma_types::ParseError),

    /// The operation was cancelled by a competing disconnect.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why the Bluetooth adapter is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AdapterUnavailableReason {
    /// No Bluetooth adapter was found.
    NoAdapter,
    /// The platform cannot enable Bluetooth programmatically; the user must.
    ManualEnableRequired,
    /// The enable request itself failed.
    EnableFailed(String),
    /// The adapter did not report powered-on within the wait bound.
    EnableTimedOut(Duration),
    /// The adapter state could not be read.
    StateUnavailable(String),
}

impl std::fmt::Display for AdapterUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
            Self::ManualEnableRequired => write!(f, "Bluetooth is off; turn it on in settings"),
            Self::EnableFailed(msg) => write!(f, "enabling Bluetooth failed: {}", msg),
            Self::EnableTimedOut(d) => write!(f, "Bluetooth did not power on within {:?}", d),
            Self::StateUnavailable(msg) => write!(f, "adapter state unavailable: {}", msg),
        }
    }
}

impl Error {
    /// Create a connect error from a transport failure.
    pub fn connect_error(device_id: impl Into<String>, source: &TransportError) -> Self {
        Self::ConnectError {
            device_id: device_id.into(),
            reason: source.to_string(),
        }
    }

    /// Create a command failure from a transport failure.
    pub fn command_failed(command: &'static str, source: &TransportError) -> Self {
        Self::CommandFailed {
            command,
            reason: source.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// The settings location the UI should offer, if this error is resolved there.
    pub fn settings_url(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { settings_url, .. }
            | Self::AdapterUnavailable { settings_url, .. } => *settings_url,
            _ => None,
        }
    }

    /// Whether offering a "try again" action makes sense.
    ///
    /// Nothing in this crate retries on its own; this only classifies.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::ScanError(_)
                | Self::ConnectTimeout { .. }
                | Self::ConnectError { .. }
                | Self::AuthenticationFailed { .. }
                | Self::CommandFailed { .. }
        )
    }
}

/// Errors returned by transport and adapter implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Bluetooth Low Energy error from btleplug.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No peripheral with the given identifier is known to the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Required characteristic not present on the connected peripheral.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: Uuid,
    },

    /// Operation attempted while not connected.
    #[error("Not connected to device")]
    NotConnected,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The OS refused access to Bluetooth.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether the failure is the OS refusing Bluetooth access.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::Bluetooth(btleplug::Error::PermissionDenied)
        )
    }
}

/// Result type alias using aroma-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by transport and adapter implementations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConnectTimeout {
            device_id: "AA:BB".to_string(),
            duration: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("AA:BB"));
        assert!(err.to_string().contains("30s"));

        let err = Error::IncompatibleDevice {
            device_id: "AA:BB".to_string(),
            missing: aroma_types::uuids::COMMAND_CHARACTERISTIC,
        };
        assert!(err.to_string().contains("0000fff6"));

        let err = Error::NotReady {
            phase: SessionPhase::Idle,
        };
        assert_eq!(err.to_string(), "No ready session (session is idle)");
    }

    #[test]
    fn test_command_failed_from_transport() {
        let err = Error::command_failed("rename", &TransportError::NotConnected);
        assert_eq!(
            err.to_string(),
            "Command 'rename' failed: Not connected to device"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_settings_url() {
        let err = Error::AdapterUnavailable {
            reason: AdapterUnavailableReason::ManualEnableRequired,
            settings_url: Some("App-Prefs:Bluetooth"),
        };
        assert_eq!(err.settings_url(), Some("App-Prefs:Bluetooth"));
        assert!(!err.is_retryable());

        assert_eq!(Error::AdapterNotReady.settings_url(), None);
    }

    #[test]
    fn test_incompatible_device_is_not_retryable() {
        let err = Error::IncompatibleDevice {
            device_id: "AA:BB".to_string(),
            missing: aroma_types::uuids::DIFFUSER_SERVICE,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_invalid_name_conversion() {
        let err: Error = aroma_types::ParseError::EmptyName.into();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn test_transport_permission_detection() {
        assert!(TransportError::PermissionDenied.is_permission_denied());
        assert!(TransportError::Bluetooth(btleplug::Error::PermissionDenied).is_permission_denied());
        assert!(!TransportError::NotConnected.is_permission_denied());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<TransportError>();
    }
}
