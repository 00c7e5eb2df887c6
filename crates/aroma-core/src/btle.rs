//! btleplug-backed transport for desktop platforms.
//!
//! [`BtleTransport`] implements [`Transport`] over the first system adapter.
//! Peripherals are addressed by the identifier from
//! [`create_identifier`]: the Bluetooth address on Linux and Windows, the
//! CoreBluetooth UUID on macOS.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral as BtlePeripheral, PeripheralId};
use futures::StreamExt;
use tracing::{debug, info, trace};
use uuid::Uuid;

use aroma_types::Peripheral;

use crate::error::{TransportError, TransportResult};
use crate::events::{AdapterEvent, AdapterEventStream, DiscoveryStream, Notification, NotificationStream};
use crate::platform::{Permission, PermissionStatus, Platform};
use crate::traits::{AdapterControl, AdapterState, ScanRequest, ServiceInfo, Transport};
use crate::util::{create_identifier, format_peripheral_id};

type KnownPeripherals = Arc<RwLock<HashMap<String, BtlePeripheral>>>;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> TransportResult<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::DeviceNotFound("no Bluetooth adapter".to_string()))
}

/// BLE transport over a btleplug adapter.
#[derive(Clone)]
pub struct BtleTransport {
    adapter: Adapter,
    known: KnownPeripherals,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("known", &self.known.read().map(|k| k.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Use the first system adapter.
    pub async fn new() -> TransportResult<Self> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            known: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The underlying adapter, for building a matching [`BtleAdapterControl`].
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn peripheral(&self, id: &str) -> TransportResult<BtlePeripheral> {
        let cached = self
            .known
            .read()
            .expect("peripheral cache lock poisoned")
            .get(id)
            .cloned();
        if let Some(peripheral) = cached {
            return Ok(peripheral);
        }

        // Not seen by a scan in this process; ask the adapter.
        for peripheral in self.adapter.peripherals().await? {
            let identifier = identify(&peripheral).await;
            if identifier == id {
                self.known
                    .write()
                    .expect("peripheral cache lock poisoned")
                    .insert(identifier, peripheral.clone());
                return Ok(peripheral);
            }
        }
        Err(TransportError::DeviceNotFound(id.to_string()))
    }

    async fn characteristic(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<(BtlePeripheral, Characteristic)> {
        let peripheral = self.peripheral(id).await?;
        let found = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or(TransportError::CharacteristicNotFound {
                uuid: characteristic,
            })?;
        Ok((peripheral, found))
    }
}

/// Identifier used by the rest of the crate for a btleplug peripheral.
async fn identify(peripheral: &BtlePeripheral) -> String {
    match peripheral.properties().await {
        Ok(Some(properties)) => create_identifier(&properties.address.to_string(), &peripheral.id()),
        _ => format_peripheral_id(&peripheral.id()),
    }
}

async fn discovered(
    adapter: &Adapter,
    known: &KnownPeripherals,
    pid: &PeripheralId,
) -> Option<TransportResult<Peripheral>> {
    let peripheral = match adapter.peripheral(pid).await {
        Ok(peripheral) => peripheral,
        Err(e) => return Some(Err(e.into())),
    };
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            // Properties can vanish between the event and the lookup.
            debug!(error = %e, "Skipping peripheral without properties");
            return None;
        }
    };

    let id = create_identifier(&properties.address.to_string(), pid);
    known
        .write()
        .expect("peripheral cache lock poisoned")
        .insert(id.clone(), peripheral);
    Some(Ok(Peripheral::new(id, properties.local_name, properties.rssi)))
}

/// Decides which advertisements a scan reports.
///
/// btleplug emits `DeviceDiscovered` once per peripheral and `DeviceUpdated`
/// for every later packet. Updates are reported when they carry a new name,
/// or always with `allow_duplicates`.
#[derive(Debug)]
struct ReportFilter {
    allow_duplicates: bool,
    names: HashMap<String, Option<String>>,
}

impl ReportFilter {
    fn new(allow_duplicates: bool) -> Self {
        Self {
            allow_duplicates,
            names: HashMap::new(),
        }
    }

    /// `repeat` is set for `DeviceUpdated` events.
    fn admit(&mut self, peripheral: &Peripheral, repeat: bool) -> bool {
        let known = self.names.get(&peripheral.id);
        let first = known.is_none();
        let renamed =
            peripheral.name.is_some() && known.is_some_and(|name| *name != peripheral.name);
        if first || renamed {
            self.names
                .insert(peripheral.id.clone(), peripheral.name.clone());
        }
        first || renamed || !repeat || self.allow_duplicates
    }
}

fn adapter_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn start_scan(&self, request: ScanRequest) -> TransportResult<DiscoveryStream> {
        let events = self.adapter.events().await?;
        let filter = ScanFilter {
            services: request.services.unwrap_or_default(),
        };
        self.adapter.start_scan(filter).await?;
        info!(allow_duplicates = request.allow_duplicates, "BLE scan started");

        let adapter = self.adapter.clone();
        let known = self.known.clone();
        let reports = Arc::new(Mutex::new(ReportFilter::new(request.allow_duplicates)));
        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let known = known.clone();
            let reports = reports.clone();
            async move {
                let (pid, repeat) = match event {
                    CentralEvent::DeviceDiscovered(pid) => (pid, false),
                    CentralEvent::DeviceUpdated(pid) => (pid, true),
                    _ => return None,
                };
                match discovered(&adapter, &known, &pid).await? {
                    Ok(peripheral) => {
                        let admit = reports
                            .lock()
                            .expect("scan report lock poisoned")
                            .admit(&peripheral, repeat);
                        admit.then_some(Ok(peripheral))
                    }
                    Err(e) => Some(Err(e)),
                }
            }
        });

        Ok(match request.duration {
            Some(duration) => stream
                .take_until(tokio::time::sleep(duration))
                .boxed(),
            None => stream.boxed(),
        })
    }

    async fn stop_scan(&self) -> TransportResult<()> {
        self.adapter.stop_scan().await?;
        debug!("BLE scan stopped");
        Ok(())
    }

    async fn connect(&self, id: &str) -> TransportResult<()> {
        let peripheral = self.peripheral(id).await?;
        peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> TransportResult<()> {
        let peripheral = self.peripheral(id).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(&self, id: &str) -> TransportResult<Vec<ServiceInfo>> {
        let peripheral = self.peripheral(id).await?;
        peripheral.discover_services().await?;
        let services: Vec<ServiceInfo> = peripheral
            .services()
            .into_iter()
            .map(|service| {
                ServiceInfo::new(
                    service.uuid,
                    service.characteristics.iter().map(|c| c.uuid).collect(),
                )
            })
            .collect();
        debug!(device_id = %id, count = services.len(), "Services discovered");
        Ok(services)
    }

    async fn write(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> TransportResult<()> {
        let (peripheral, characteristic) = self.characteristic(id, service, characteristic).await?;
        peripheral
            .write(&characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<NotificationStream> {
        let (peripheral, characteristic) = self.characteristic(id, service, characteristic).await?;
        peripheral.subscribe(&characteristic).await?;
        let uuid = characteristic.uuid;
        let stream = peripheral.notifications().await?.filter_map(move |n| async move {
            if n.uuid == uuid {
                trace!(len = n.value.len(), "Notification");
                Some(Notification {
                    characteristic: n.uuid,
                    value: n.value,
                })
            } else {
                None
            }
        });
        Ok(stream.boxed())
    }

    async fn unsubscribe(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<()> {
        let (peripheral, characteristic) = self.characteristic(id, service, characteristic).await?;
        peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn events(&self) -> TransportResult<AdapterEventStream> {
        let known = self.known.clone();
        let stream = self.adapter.events().await?.filter_map(move |event| {
            let known = known.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(pid) => {
                        let id = known
                            .read()
                            .expect("peripheral cache lock poisoned")
                            .iter()
                            .find(|(_, p)| p.id() == pid)
                            .map(|(id, _)| id.clone())
                            .unwrap_or_else(|| format_peripheral_id(&pid));
                        Some(AdapterEvent::Disconnected { id })
                    }
                    CentralEvent::StateUpdate(state) => Some(AdapterEvent::StateChanged {
                        state: adapter_state(state),
                    }),
                    _ => None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Adapter control for desktop operating systems.
///
/// Desktop platforms prompt for Bluetooth access on first use, so no
/// permissions are requested, and the adapter cannot be powered on from
/// here.
#[derive(Clone)]
pub struct BtleAdapterControl {
    adapter: Adapter,
}

impl std::fmt::Debug for BtleAdapterControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleAdapterControl").finish_non_exhaustive()
    }
}

impl BtleAdapterControl {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl AdapterControl for BtleAdapterControl {
    fn platform(&self) -> Platform {
        Platform::Desktop
    }

    async fn request_permission(&self, _permission: Permission) -> TransportResult<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn adapter_state(&self) -> TransportResult<AdapterState> {
        Ok(adapter_state(self.adapter.adapter_state().await?))
    }

    async fn enable_adapter(&self) -> TransportResult<()> {
        Err(TransportError::Other(
            "the adapter cannot be enabled programmatically on this platform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_mapping() {
        assert_eq!(adapter_state(CentralState::PoweredOn), AdapterState::PoweredOn);
        assert_eq!(adapter_state(CentralState::PoweredOff), AdapterState::PoweredOff);
        assert_eq!(adapter_state(CentralState::Unknown), AdapterState::Unknown);
    }

    #[test]
    fn test_update_with_late_name_is_reported() {
        let mut filter = ReportFilter::new(false);
        assert!(filter.admit(&Peripheral::new("AA", None, Some(-70)), false));
        // Same nameless packet again.
        assert!(!filter.admit(&Peripheral::new("AA", None, Some(-68)), true));
        assert!(filter.admit(&Peripheral::new("AA", Some("Den".into()), Some(-66)), true));
        assert!(!filter.admit(&Peripheral::new("AA", Some("Den".into()), Some(-60)), true));
        // A nameless packet does not forget the name.
        assert!(!filter.admit(&Peripheral::new("AA", None, Some(-60)), true));
        assert!(!filter.admit(&Peripheral::new("AA", Some("Den".into()), None), true));
    }

    #[test]
    fn test_update_for_unseen_peripheral_is_reported() {
        let mut filter = ReportFilter::new(false);
        assert!(filter.admit(&Peripheral::new("BB", Some("Hall".into()), None), true));
    }

    #[test]
    fn test_allow_duplicates_reports_every_update() {
        let mut filter = ReportFilter::new(true);
        assert!(filter.admit(&Peripheral::new("AA", Some("Den".into()), None), false));
        assert!(filter.admit(&Peripheral::new("AA", Some("Den".into()), Some(-50)), true));
        assert!(filter.admit(&Peripheral::new("AA", None, Some(-52)), true));
    }
}
