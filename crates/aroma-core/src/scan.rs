//! Device discovery.
//!
//! The [`Scanner`] owns at most one scan at a time. Each scan clears the
//! [`DeviceRegistry`], starts the transport scan and spawns a single task
//! that folds the discovery stream into the registry until the scan is
//! stopped or the adapter reports an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, DiscoveryStream, EventDispatcher};
use crate::gate::PermissionGate;
use crate::registry::DeviceRegistry;
use crate::traits::{ScanRequest, Transport};

struct ActiveScan {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared between the scanner and its consumer task.
struct Shared {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    events: EventDispatcher,
    scanning: AtomicBool,
    last_error: RwLock<Option<String>>,
}

/// Scans for peripherals and feeds the registry.
pub struct Scanner {
    shared: Arc<Shared>,
    gate: Arc<PermissionGate>,
    config: ScanConfig,
    active: Mutex<Option<ActiveScan>>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("scanning", &self.is_scanning())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<PermissionGate>,
        registry: Arc<DeviceRegistry>,
        events: EventDispatcher,
        config: ScanConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                registry,
                events,
                scanning: AtomicBool::new(false),
                last_error: RwLock::new(None),
            }),
            gate,
            config,
            active: Mutex::new(None),
        }
    }

    /// Start scanning, restarting if a scan is already running.
    ///
    /// `filter` narrows discovery to peripherals advertising one of the given
    /// services; `None` falls back to the configured filter.
    ///
    /// # Errors
    ///
    /// - [`Error::AdapterNotReady`] unless the gate's last check succeeded.
    /// - [`Error::ScanError`] if the adapter refuses to start scanning.
    #[tracing::instrument(level = "info", skip_all, fields(filtered = filter.is_some()))]
    pub async fn start(&self, filter: Option<Vec<Uuid>>) -> Result<()> {
        if !self.gate.is_ready() {
            return Err(Error::AdapterNotReady);
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("Scan already running, restarting");
            self.shutdown(previous).await;
        }

        self.shared.registry.clear();
        *self
            .shared
            .last_error
            .write()
            .expect("scan error lock poisoned") = None;

        let request = ScanRequest {
            services: filter.or_else(|| self.config.service_filter.clone()),
            duration: None,
            allow_duplicates: self.config.allow_duplicates,
        };
        let stream = match self.shared.transport.start_scan(request).await {
            Ok(stream) => stream,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Failed to start scan");
                self.shared.record_failure(&message);
                return Err(Error::ScanError(message));
            }
        };

        let cancel = CancellationToken::new();
        self.shared.scanning.store(true, Ordering::SeqCst);
        self.shared.events.send(ClientEvent::ScanStarted);
        let task = tokio::spawn(consume(self.shared.clone(), stream, cancel.clone()));
        *active = Some(ActiveScan { cancel, task });

        info!("Scan started");
        Ok(())
    }

    /// Stop scanning. A no-op when no scan is running.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn stop(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(scan) = active.take() {
            self.shutdown(scan).await;
        }
        Ok(())
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.shared.scanning.load(Ordering::SeqCst)
    }

    /// The error that ended the most recent scan, if it ended with one.
    pub fn last_error(&self) -> Option<Error> {
        self.shared
            .last_error
            .read()
            .expect("scan error lock poisoned")
            .clone()
            .map(Error::ScanError)
    }

    async fn shutdown(&self, scan: ActiveScan) {
        scan.cancel.cancel();
        let _ = scan.task.await;

        // A scan that already ended on an adapter error has stopped itself.
        if self.shared.scanning.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.shared.transport.stop_scan().await {
                warn!(error = %e, "Failed to stop scan");
            }
            self.shared.events.send(ClientEvent::ScanStopped);
            info!("Scan stopped");
        }
    }
}

impl Shared {
    fn record_failure(&self, message: &str) {
        *self.last_error.write().expect("scan error lock poisoned") = Some(message.to_string());
    }
}

async fn consume(shared: Arc<Shared>, mut stream: DiscoveryStream, cancel: CancellationToken) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };

        match item {
            Some(Ok(peripheral)) => {
                let peripheral = shared.registry.upsert(peripheral);
                debug!(device_id = %peripheral.id, name = %peripheral.display_name(), rssi = ?peripheral.rssi, "Discovered");
                shared.events.send(ClientEvent::Discovered { peripheral });
            }
            Some(Err(e)) => {
                let message = e.to_string();
                warn!(error = %message, "Scan failed");
                shared.record_failure(&message);
                if shared.scanning.swap(false, Ordering::SeqCst) {
                    if let Err(e) = shared.transport.stop_scan().await {
                        debug!(error = %e, "Failed to stop scan after error");
                    }
                    shared.events.send(ClientEvent::ScanFailed { error: message });
                }
                break;
            }
            None => {
                debug!("Discovery stream ended");
                if shared.scanning.swap(false, Ordering::SeqCst) {
                    shared.events.send(ClientEvent::ScanStopped);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::mock::{MockAdapter, MockTransport};
    use crate::platform::Platform;
    use aroma_types::Peripheral;

    struct Fixture {
        transport: Arc<MockTransport>,
        gate: Arc<PermissionGate>,
        registry: Arc<DeviceRegistry>,
        events: EventDispatcher,
        scanner: Scanner,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let adapter = Arc::new(MockAdapter::new(Platform::Desktop));
        let gate = Arc::new(PermissionGate::new(adapter, GateConfig::default()));
        let registry = Arc::new(DeviceRegistry::new());
        let events = EventDispatcher::default();
        let scanner = Scanner::new(
            transport.clone(),
            gate.clone(),
            registry.clone(),
            events.clone(),
            ScanConfig::default(),
        );
        Fixture {
            transport,
            gate,
            registry,
            events,
            scanner,
        }
    }

    async fn next_discovery(rx: &mut crate::events::EventReceiver) -> Peripheral {
        loop {
            if let ClientEvent::Discovered { peripheral } = rx.recv().await.unwrap() {
                return peripheral;
            }
        }
    }

    #[tokio::test]
    async fn test_start_requires_ready_gate() {
        let f = fixture();
        let err = f.scanner.start(None).await.unwrap_err();
        assert!(matches!(err, Error::AdapterNotReady));
        assert!(!f.scanner.is_scanning());
        assert_eq!(f.transport.start_scan_count(), 0);
    }

    #[tokio::test]
    async fn test_discoveries_fill_registry() {
        let f = fixture();
        f.gate.ensure_ready().await.unwrap();
        let mut rx = f.events.subscribe();

        f.scanner.start(None).await.unwrap();
        assert!(f.scanner.is_scanning());

        f.transport.emit_advertisement(Peripheral::new("AA:BB", None, Some(-60)));
        let seen = next_discovery(&mut rx).await;
        assert_eq!(seen.display_name(), "Unknown Device");
        assert_eq!(f.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_start_clears_registry_and_restarts() {
        let f = fixture();
        f.gate.ensure_ready().await.unwrap();
        f.registry.upsert(Peripheral::new("OLD", None, None));

        f.scanner.start(None).await.unwrap();
        assert!(f.registry.is_empty());

        f.scanner.start(None).await.unwrap();
        assert!(f.scanner.is_scanning());
        assert_eq!(f.transport.start_scan_count(), 2);
        // The first scan was stopped before the second began.
        assert_eq!(f.transport.stop_scan_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let f = fixture();
        f.scanner.stop().await.unwrap();
        f.scanner.stop().await.unwrap();
        assert_eq!(f.transport.stop_scan_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_emits_event() {
        let f = fixture();
        f.gate.ensure_ready().await.unwrap();
        let mut rx = f.events.subscribe();
        f.scanner.start(None).await.unwrap();
        f.scanner.stop().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ClientEvent::ScanStarted);
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::ScanStopped);
        assert!(!f.scanner.is_scanning());
        assert_eq!(f.transport.stop_scan_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_stops_scan() {
        let f = fixture();
        f.gate.ensure_ready().await.unwrap();
        let mut rx = f.events.subscribe();
        f.scanner.start(None).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::ScanStarted);

        f.transport.emit_scan_error("adapter reset");
        match rx.recv().await.unwrap() {
            ClientEvent::ScanFailed { error } => assert!(error.contains("adapter reset")),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!f.scanner.is_scanning());
        assert!(matches!(f.scanner.last_error(), Some(Error::ScanError(_))));

        // Stopping afterwards does not stop the adapter a second time.
        f.scanner.stop().await.unwrap();
        assert_eq!(f.transport.stop_scan_count(), 1);
    }

    #[tokio::test]
    async fn test_filter_is_passed_through() {
        let f = fixture();
        f.gate.ensure_ready().await.unwrap();
        f.scanner
            .start(Some(vec![aroma_types::uuids::DIFFUSER_SERVICE]))
            .await
            .unwrap();
        let request = f.transport.last_scan_request().unwrap();
        assert_eq!(
            request.services,
            Some(vec![aroma_types::uuids::DIFFUSER_SERVICE])
        );
        assert!(request.duration.is_none());
    }
}
