//! Capability traits the session layer is built on.
//!
//! [`Transport`] and [`AdapterControl`] abstract over the real BLE stack
//! ([`BtleTransport`](crate::btle::BtleTransport)) and test doubles
//! ([`MockTransport`](crate::mock::MockTransport)). Everything above them,
//! from the gate to the facade, is written against these traits only.
//!
//! # Example
//!
//! ```ignore
//! use aroma_core::{Transport, uuids};
//!
//! async fn power_on<T: Transport + ?Sized>(transport: &T, id: &str) -> aroma_core::TransportResult<()> {
//!     transport
//!         .write(id, uuids::DIFFUSER_SERVICE, uuids::COMMAND_CHARACTERISTIC, &[0x2d, 0x01, 0x01])
//!         .await
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransportResult;
use crate::events::{AdapterEventStream, DiscoveryStream, NotificationStream};
use crate::platform::{Permission, Platform, PermissionStatus};

/// Power state of the Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// The radio is on.
    PoweredOn,
    /// The radio is off.
    PoweredOff,
    /// No usable adapter.
    Unavailable,
    /// The stack has not reported a state yet.
    Unknown,
}

impl AdapterState {
    /// Whether scanning and connecting are possible.
    pub fn is_powered_on(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }
}

/// Parameters for a discovery scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Only report peripherals advertising one of these services. `None` reports everything.
    pub services: Option<Vec<Uuid>>,
    /// Stop after this long. `None` scans until stopped.
    pub duration: Option<Duration>,
    /// Report every advertisement instead of one per peripheral.
    pub allow_duplicates: bool,
}

/// A GATT service and the characteristics found under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristic UUIDs under the service.
    pub characteristics: Vec<Uuid>,
}

impl ServiceInfo {
    /// Create a service description.
    pub fn new(uuid: Uuid, characteristics: Vec<Uuid>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Whether the service exposes the given characteristic.
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics.contains(&uuid)
    }
}

/// OS permission and adapter power control.
///
/// On phones this is backed by the host's permission APIs; on desktop it is
/// [`BtleAdapterControl`](crate::btle::BtleAdapterControl).
#[async_trait]
pub trait AdapterControl: Send + Sync {
    /// The platform whose rules apply.
    fn platform(&self) -> Platform;

    /// Request (or check) one permission.
    async fn request_permission(&self, permission: Permission) -> TransportResult<PermissionStatus>;

    /// Current adapter power state.
    async fn adapter_state(&self) -> TransportResult<AdapterState>;

    /// Ask the OS to power the adapter on.
    ///
    /// Completion is observed through [`adapter_state`](Self::adapter_state).
    async fn enable_adapter(&self) -> TransportResult<()>;
}

/// BLE central operations addressed by peripheral id.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start scanning and return the discovery stream.
    ///
    /// Dropping the stream does not stop the adapter scan; call
    /// [`stop_scan`](Self::stop_scan).
    async fn start_scan(&self, request: ScanRequest) -> TransportResult<DiscoveryStream>;

    /// Stop scanning. Safe to call when not scanning.
    async fn stop_scan(&self) -> TransportResult<()>;

    /// Open a link to the peripheral.
    async fn connect(&self, id: &str) -> TransportResult<()>;

    /// Close the link to the peripheral.
    async fn disconnect(&self, id: &str) -> TransportResult<()>;

    /// Discover GATT services on a connected peripheral.
    async fn discover_services(&self, id: &str) -> TransportResult<Vec<ServiceInfo>>;

    /// Write with response.
    async fn write(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> TransportResult<()>;

    /// Enable notifications and return the notification stream.
    async fn subscribe(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<NotificationStream>;

    /// Disable notifications.
    async fn unsubscribe(&self, id: &str, service: Uuid, characteristic: Uuid)
    -> TransportResult<()>;

    /// Adapter-reported events (disconnects, power changes).
    async fn events(&self) -> TransportResult<AdapterEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use aroma_types::uuids;

    #[test]
    fn test_service_info_characteristics() {
        let service = ServiceInfo::new(
            uuids::DIFFUSER_SERVICE,
            vec![uuids::COMMAND_CHARACTERISTIC],
        );
        assert!(service.has_characteristic(uuids::COMMAND_CHARACTERISTIC));
        assert!(!service.has_characteristic(uuids::DIFFUSER_SERVICE));
    }

    #[test]
    fn test_scan_request_default_is_unfiltered() {
        let request = ScanRequest::default();
        assert!(request.services.is_none());
        assert!(request.duration.is_none());
        assert!(!request.allow_duplicates);
    }

    #[test]
    fn test_adapter_state() {
        assert!(AdapterState::PoweredOn.is_powered_on());
        assert!(!AdapterState::Unknown.is_powered_on());
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn _assert(_: Option<&dyn Transport>, _: Option<&dyn AdapterControl>) {}
    }
}
