//! Session facade.
//!
//! [`DiffuserClient`] wires the gate, registry, scanner and connection
//! session together over one transport and is the only surface UIs need.
//! It is constructed explicitly; there is no global instance.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use aroma_types::Peripheral;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver};
use crate::gate::{GateStatus, PermissionGate, Readiness};
use crate::registry::DeviceRegistry;
use crate::scan::Scanner;
use crate::session::{ConnectionSession, SessionSnapshot};
use crate::traits::{AdapterControl, Transport};

/// Discovers and controls diffusers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use aroma_core::{ClientConfig, DiffuserClient};
/// use aroma_core::mock::{MockAdapter, MockTransport};
/// use aroma_core::platform::Platform;
///
/// #[tokio::main]
/// async fn main() -> aroma_core::Result<()> {
///     let transport = Arc::new(MockTransport::builder().diffuser("AA:BB", Some("EA316")).build());
///     let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
///     let client = DiffuserClient::new(transport, adapter, ClientConfig::default());
///
///     client.ensure_ready().await?;
///     client.connect_to_device(&aroma_core::Peripheral::new("AA:BB", None, None)).await?;
///     client.set_power(true).await?;
///     assert!(client.is_powered_on());
///     Ok(())
/// }
/// ```
pub struct DiffuserClient {
    gate: Arc<PermissionGate>,
    registry: Arc<DeviceRegistry>,
    scanner: Scanner,
    session: ConnectionSession,
    events: EventDispatcher,
}

impl std::fmt::Debug for DiffuserClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffuserClient")
            .field("gate", &self.gate)
            .field("devices", &self.registry.len())
            .field("scanner", &self.scanner)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl DiffuserClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        adapter: Arc<dyn AdapterControl>,
        config: ClientConfig,
    ) -> Self {
        let events = EventDispatcher::new(config.event_capacity);
        let gate = Arc::new(PermissionGate::new(adapter, config.gate));
        let registry = Arc::new(DeviceRegistry::new());
        let scanner = Scanner::new(
            transport.clone(),
            gate.clone(),
            registry.clone(),
            events.clone(),
            config.scan,
        );
        let session = ConnectionSession::new(transport, config.session, events.clone());
        Self {
            gate,
            registry,
            scanner,
            session,
            events,
        }
    }

    /// Like [`new`](Self::new), but rejects an invalid configuration.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        adapter: Arc<dyn AdapterControl>,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(transport, adapter, config))
    }

    /// Request permissions and make sure the adapter is on.
    pub async fn ensure_ready(&self) -> Result<Readiness> {
        self.gate.ensure_ready().await
    }

    /// Outcome of the last readiness check.
    pub fn gate_status(&self) -> GateStatus {
        self.gate.status()
    }

    /// Check readiness, then start scanning with the configured filter.
    ///
    /// Previously discovered devices are forgotten.
    pub async fn scan_for_peripherals(&self) -> Result<()> {
        self.gate.ensure_ready().await?;
        self.scanner.start(None).await
    }

    /// Stop scanning. Safe to call when not scanning.
    pub async fn stop_scan_peripherals(&self) -> Result<()> {
        self.scanner.stop().await
    }

    /// Stop any scan, then connect and authenticate.
    pub async fn connect_to_device(&self, peripheral: &Peripheral) -> Result<()> {
        if self.scanner.is_scanning() {
            debug!("Stopping scan before connecting");
        }
        self.scanner.stop().await?;
        self.session.connect(peripheral).await
    }

    /// Disconnect from the current device. See [`ConnectionSession::disconnect`].
    pub async fn disconnect_from_device(&self, force: bool) -> Result<()> {
        self.session.disconnect(force).await
    }

    pub async fn rename_device(&self, name: &str) -> Result<()> {
        self.session.rename(name).await
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.session.set_power(on).await
    }

    /// Set the intensity; returns the level applied after clamping.
    pub async fn set_intensity(&self, level: i32) -> Result<u8> {
        self.session.set_intensity(level).await
    }

    /// Discovered devices in first-seen order.
    pub fn all_devices(&self) -> Vec<Peripheral> {
        self.registry.values()
    }

    /// The connected device, while the session is ready.
    pub fn connected_device(&self) -> Option<Peripheral> {
        self.session.snapshot().device
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Recognized model of the connected device; empty if unknown.
    pub fn model_name(&self) -> String {
        self.session.snapshot().model_name
    }

    pub fn is_powered_on(&self) -> bool {
        self.session.snapshot().is_powered_on
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Receiver that observes every session transition.
    pub fn watch_session(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.watch()
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The error that ended the most recent scan, if any.
    pub fn last_scan_error(&self) -> Option<Error> {
        self.scanner.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdapter, MockTransport};
    use crate::platform::Platform;
    use crate::traits::AdapterState;

    fn client(transport: &Arc<MockTransport>, adapter: &Arc<MockAdapter>) -> DiffuserClient {
        DiffuserClient::new(transport.clone(), adapter.clone(), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_scan_checks_gate_first() {
        let transport = Arc::new(MockTransport::new());
        let adapter = Arc::new(
            MockAdapter::builder()
                .platform(Platform::Ios)
                .adapter_state(AdapterState::PoweredOff)
                .build(),
        );
        let client = client(&transport, &adapter);

        let err = client.scan_for_peripherals().await.unwrap_err();
        assert_eq!(err.settings_url(), Some("App-Prefs:Bluetooth"));
        assert_eq!(client.gate_status(), GateStatus::Denied);
        assert_eq!(transport.start_scan_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_stops_scan() {
        let transport = Arc::new(MockTransport::builder().diffuser("AA", None).build());
        let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
        let client = client(&transport, &adapter);

        client.scan_for_peripherals().await.unwrap();
        assert!(client.is_scanning());

        client
            .connect_to_device(&Peripheral::new("AA", None, None))
            .await
            .unwrap();
        assert!(!client.is_scanning());
        assert_eq!(transport.stop_scan_count(), 1);
        assert_eq!(client.connected_device().map(|d| d.id), Some("AA".into()));
    }

    #[test]
    fn test_with_config_validates() {
        let transport = Arc::new(MockTransport::new());
        let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
        let config = ClientConfig::default().event_capacity(0);
        assert!(matches!(
            DiffuserClient::with_config(transport, adapter, config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
