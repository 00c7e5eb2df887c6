//! Mock transport and adapter for testing.
//!
//! This module provides test doubles for the [`Transport`] and
//! [`AdapterControl`] traits, so the gate, scanner and session can be
//! exercised without BLE hardware.
//!
//! # Features
//!
//! - **Call recording**: every transport call and every written payload is kept
//! - **Failure injection**: fail connects, writes, disconnects or scan starts
//! - **Latency simulation**: delay connects, writes and service discovery
//!   (uses tokio time, so paused-clock tests stay instant)
//! - **Scripted peers**: diffusers answer the model query on their own;
//!   advertisements, scan errors and link loss are pushed from the test

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use tokio::time::Instant;
use uuid::Uuid;

use aroma_types::Peripheral;
use aroma_types::uuids::{COMMAND_CHARACTERISTIC, DIFFUSER_SERVICE};

use crate::commands::QUERY_MODEL;
use crate::error::{TransportError, TransportResult};
use crate::events::{AdapterEvent, AdapterEventStream, DiscoveryStream, Notification, NotificationStream};
use crate::platform::{Permission, PermissionStatus, Platform};
use crate::traits::{AdapterControl, AdapterState, ScanRequest, ServiceInfo, Transport};

/// A call made on a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
    DiscoverServices(String),
    Write { id: String, data: Vec<u8> },
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Debug, Clone)]
struct MockPeer {
    services: Vec<ServiceInfo>,
    model_response: Option<Vec<u8>>,
}

impl MockPeer {
    fn diffuser(model: Option<&str>) -> Self {
        Self {
            services: vec![ServiceInfo::new(
                DIFFUSER_SERVICE,
                vec![COMMAND_CHARACTERISTIC],
            )],
            model_response: model.map(|m| m.as_bytes().to_vec()),
        }
    }
}

/// A mock BLE transport.
///
/// # Example
///
/// ```
/// use aroma_core::Transport;
/// use aroma_core::mock::MockTransport;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder().diffuser("AA:BB", Some("EA316")).build();
///     transport.connect("AA:BB").await.unwrap();
///     assert!(transport.is_connected("AA:BB"));
/// }
/// ```
pub struct MockTransport {
    peers: RwLock<HashMap<String, MockPeer>>,
    connected: RwLock<HashSet<String>>,
    calls: RwLock<Vec<TransportCall>>,
    last_scan_request: RwLock<Option<ScanRequest>>,
    scan_sender: RwLock<Option<UnboundedSender<TransportResult<Peripheral>>>>,
    event_senders: RwLock<Vec<UnboundedSender<AdapterEvent>>>,
    notification_senders: RwLock<HashMap<String, UnboundedSender<Notification>>>,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Simulated write latency in milliseconds (0 = no delay).
    write_latency_ms: AtomicU64,
    /// Simulated service discovery latency in milliseconds (0 = no delay).
    discovery_latency_ms: AtomicU64,
    /// Simulated disconnect latency in milliseconds (0 = no delay).
    disconnect_latency_ms: AtomicU64,
    connect_failure: RwLock<Option<String>>,
    /// Number of writes to fail before succeeding again.
    remaining_write_failures: AtomicU32,
    fail_disconnect: AtomicBool,
    fail_scan_start: AtomicBool,
    writes_in_flight: AtomicU32,
    max_writes_in_flight: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &*self.connected.read().expect("mock lock poisoned"))
            .field("calls", &self.calls.read().expect("mock lock poisoned").len())
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport with no known peripherals.
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            connected: RwLock::new(HashSet::new()),
            calls: RwLock::new(Vec::new()),
            last_scan_request: RwLock::new(None),
            scan_sender: RwLock::new(None),
            event_senders: RwLock::new(Vec::new()),
            notification_senders: RwLock::new(HashMap::new()),
            connect_latency_ms: AtomicU64::new(0),
            write_latency_ms: AtomicU64::new(0),
            discovery_latency_ms: AtomicU64::new(0),
            disconnect_latency_ms: AtomicU64::new(0),
            connect_failure: RwLock::new(None),
            remaining_write_failures: AtomicU32::new(0),
            fail_disconnect: AtomicBool::new(false),
            fail_scan_start: AtomicBool::new(false),
            writes_in_flight: AtomicU32::new(0),
            max_writes_in_flight: AtomicU32::new(0),
        }
    }

    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    // --- Peers ---

    /// Register a compatible diffuser that does not answer the model query.
    pub fn add_diffuser(&self, id: &str) {
        self.insert_peer(id, MockPeer::diffuser(None));
    }

    /// Register a compatible diffuser that answers the model query with `model`.
    pub fn add_diffuser_with_model(&self, id: &str, model: &str) {
        self.insert_peer(id, MockPeer::diffuser(Some(model)));
    }

    /// Register a peripheral exposing arbitrary services.
    pub fn add_peripheral(&self, id: &str, services: Vec<ServiceInfo>) {
        self.insert_peer(
            id,
            MockPeer {
                services,
                model_response: None,
            },
        );
    }

    fn insert_peer(&self, id: &str, peer: MockPeer) {
        self.peers
            .write()
            .expect("mock lock poisoned")
            .insert(id.to_string(), peer);
    }

    // --- Scripted events ---

    /// Deliver an advertisement to the running scan.
    pub fn emit_advertisement(&self, peripheral: Peripheral) {
        if let Some(sender) = &*self.scan_sender.read().expect("mock lock poisoned") {
            let _ = sender.unbounded_send(Ok(peripheral));
        }
    }

    /// Fail the running scan.
    pub fn emit_scan_error(&self, message: &str) {
        if let Some(sender) = &*self.scan_sender.read().expect("mock lock poisoned") {
            let _ = sender.unbounded_send(Err(TransportError::Other(message.to_string())));
        }
    }

    /// Drop the link to `id` as if the peripheral went away.
    pub fn emit_disconnect(&self, id: &str) {
        self.connected
            .write()
            .expect("mock lock poisoned")
            .remove(id);
        self.notification_senders
            .write()
            .expect("mock lock poisoned")
            .remove(id);
        self.broadcast(AdapterEvent::Disconnected { id: id.to_string() });
    }

    /// Report an adapter power change.
    pub fn emit_adapter_state(&self, state: AdapterState) {
        self.broadcast(AdapterEvent::StateChanged { state });
    }

    /// Push a notification to an active subscription on `id`.
    pub fn notify(&self, id: &str, value: &[u8]) {
        if let Some(sender) = self
            .notification_senders
            .read()
            .expect("mock lock poisoned")
            .get(id)
        {
            let _ = sender.unbounded_send(Notification {
                characteristic: COMMAND_CHARACTERISTIC,
                value: value.to_vec(),
            });
        }
    }

    fn broadcast(&self, event: AdapterEvent) {
        self.event_senders
            .write()
            .expect("mock lock poisoned")
            .retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }

    // --- Failure injection and latency ---

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated write latency.
    pub fn set_write_latency(&self, latency: Duration) {
        self.write_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated service discovery latency.
    pub fn set_discovery_latency(&self, latency: Duration) {
        self.discovery_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated disconnect latency.
    pub fn set_disconnect_latency(&self, latency: Duration) {
        self.disconnect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make every connect fail with `message`, or succeed again with `None`.
    pub fn set_connect_failure(&self, message: Option<&str>) {
        *self.connect_failure.write().expect("mock lock poisoned") = message.map(String::from);
    }

    /// Fail the next `count` writes, then succeed.
    pub fn fail_next_writes(&self, count: u32) {
        self.remaining_write_failures
            .store(count, Ordering::Relaxed);
    }

    /// Make disconnect calls return an error (the link is still dropped).
    pub fn set_disconnect_failure(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::Relaxed);
    }

    /// Make `start_scan` fail.
    pub fn set_scan_start_failure(&self, fail: bool) {
        self.fail_scan_start.store(fail, Ordering::Relaxed);
    }

    // --- Inspection ---

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.read().expect("mock lock poisoned").clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.write().expect("mock lock poisoned").clear();
    }

    /// Payloads written to `id`, including writes that were made to fail.
    pub fn writes_to(&self, id: &str) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write { id: to, data } if to == id => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self, id: &str) -> usize {
        self.count(|call| matches!(call, TransportCall::Connect(to) if to == id))
    }

    pub fn disconnect_count(&self, id: &str) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect(to) if to == id))
    }

    pub fn start_scan_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::StartScan))
    }

    pub fn stop_scan_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::StopScan))
    }

    /// The request passed to the most recent `start_scan`.
    pub fn last_scan_request(&self) -> Option<ScanRequest> {
        self.last_scan_request
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connected
            .read()
            .expect("mock lock poisoned")
            .contains(id)
    }

    /// Whether a notification subscription on `id` is active.
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.notification_senders
            .read()
            .expect("mock lock poisoned")
            .contains_key(id)
    }

    /// Highest number of writes that were ever in progress at once.
    pub fn max_concurrent_writes(&self) -> u32 {
        self.max_writes_in_flight.load(Ordering::Relaxed)
    }

    fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls
            .read()
            .expect("mock lock poisoned")
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.write().expect("mock lock poisoned").push(call);
    }

    fn check_connected(&self, id: &str) -> TransportResult<()> {
        if self.is_connected(id) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn simulate_latency(millis: &AtomicU64) {
        let latency = millis.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    fn answer_model_query(&self, id: &str) {
        let response = self
            .peers
            .read()
            .expect("mock lock poisoned")
            .get(id)
            .and_then(|peer| peer.model_response.clone());
        if let Some(response) = response {
            self.notify(id, &response);
        }
    }
}

/// Decrements the in-flight counter even if the write future is dropped.
struct InFlight<'a>(&'a AtomicU32);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU32, max: &AtomicU32) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_scan(&self, request: ScanRequest) -> TransportResult<DiscoveryStream> {
        self.record(TransportCall::StartScan);
        if self.fail_scan_start.load(Ordering::Relaxed) {
            return Err(TransportError::Other("Mock scan failure".to_string()));
        }
        *self.last_scan_request.write().expect("mock lock poisoned") = Some(request);
        let (sender, receiver) = unbounded();
        *self.scan_sender.write().expect("mock lock poisoned") = Some(sender);
        Ok(receiver.boxed())
    }

    async fn stop_scan(&self) -> TransportResult<()> {
        self.record(TransportCall::StopScan);
        self.scan_sender.write().expect("mock lock poisoned").take();
        Ok(())
    }

    async fn connect(&self, id: &str) -> TransportResult<()> {
        self.record(TransportCall::Connect(id.to_string()));
        Self::simulate_latency(&self.connect_latency_ms).await;

        if let Some(message) = self.connect_failure.read().expect("mock lock poisoned").clone() {
            return Err(TransportError::Other(message));
        }
        if !self.peers.read().expect("mock lock poisoned").contains_key(id) {
            return Err(TransportError::DeviceNotFound(id.to_string()));
        }
        self.connected
            .write()
            .expect("mock lock poisoned")
            .insert(id.to_string());
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> TransportResult<()> {
        self.record(TransportCall::Disconnect(id.to_string()));
        Self::simulate_latency(&self.disconnect_latency_ms).await;
        self.connected
            .write()
            .expect("mock lock poisoned")
            .remove(id);
        self.notification_senders
            .write()
            .expect("mock lock poisoned")
            .remove(id);
        if self.fail_disconnect.load(Ordering::Relaxed) {
            return Err(TransportError::Other("Mock disconnect failure".to_string()));
        }
        Ok(())
    }

    async fn discover_services(&self, id: &str) -> TransportResult<Vec<ServiceInfo>> {
        self.record(TransportCall::DiscoverServices(id.to_string()));
        Self::simulate_latency(&self.discovery_latency_ms).await;
        self.check_connected(id)?;
        Ok(self
            .peers
            .read()
            .expect("mock lock poisoned")
            .get(id)
            .map(|peer| peer.services.clone())
            .unwrap_or_default())
    }

    async fn write(
        &self,
        id: &str,
        _service: Uuid,
        _characteristic: Uuid,
        data: &[u8],
    ) -> TransportResult<()> {
        let _in_flight = InFlight::enter(&self.writes_in_flight, &self.max_writes_in_flight);
        Self::simulate_latency(&self.write_latency_ms).await;
        self.check_connected(id)?;
        self.record(TransportCall::Write {
            id: id.to_string(),
            data: data.to_vec(),
        });

        let injected = self
            .remaining_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::Other("Mock write failure".to_string()));
        }

        if data == [QUERY_MODEL] {
            self.answer_model_query(id);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> TransportResult<NotificationStream> {
        self.record(TransportCall::Subscribe(id.to_string()));
        self.check_connected(id)?;
        let (sender, receiver) = unbounded();
        self.notification_senders
            .write()
            .expect("mock lock poisoned")
            .insert(id.to_string(), sender);
        Ok(receiver.boxed())
    }

    async fn unsubscribe(
        &self,
        id: &str,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> TransportResult<()> {
        self.record(TransportCall::Unsubscribe(id.to_string()));
        self.notification_senders
            .write()
            .expect("mock lock poisoned")
            .remove(id);
        Ok(())
    }

    async fn events(&self) -> TransportResult<AdapterEventStream> {
        let (sender, receiver) = unbounded();
        self.event_senders
            .write()
            .expect("mock lock poisoned")
            .push(sender);
        Ok(receiver.boxed())
    }
}

/// Builder for creating mock transports with custom settings.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    peers: Vec<(String, MockPeer)>,
    connect_latency: Duration,
    write_latency: Duration,
}

impl MockTransportBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compatible diffuser, optionally answering the model query.
    #[must_use]
    pub fn diffuser(mut self, id: &str, model: Option<&str>) -> Self {
        self.peers.push((id.to_string(), MockPeer::diffuser(model)));
        self
    }

    /// Add a peripheral with arbitrary services.
    #[must_use]
    pub fn peripheral(mut self, id: &str, services: Vec<ServiceInfo>) -> Self {
        self.peers.push((
            id.to_string(),
            MockPeer {
                services,
                model_response: None,
            },
        ));
        self
    }

    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    #[must_use]
    pub fn write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Build the mock transport.
    pub fn build(self) -> MockTransport {
        let transport = MockTransport::new();
        for (id, peer) in self.peers {
            transport.insert_peer(&id, peer);
        }
        transport.set_connect_latency(self.connect_latency);
        transport.set_write_latency(self.write_latency);
        transport
    }
}

/// A mock permission/adapter controller.
pub struct MockAdapter {
    platform: Platform,
    permissions: RwLock<HashMap<Permission, PermissionStatus>>,
    requested: RwLock<Vec<Permission>>,
    state: RwLock<AdapterState>,
    /// Time from an enable request to power-on; `None` never powers on.
    enable_delay: Option<Duration>,
    enable_requested_at: RwLock<Option<Instant>>,
    enable_calls: AtomicU32,
    fail_enable: AtomicBool,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("platform", &self.platform)
            .field("state", &*self.state.read().expect("mock lock poisoned"))
            .finish_non_exhaustive()
    }
}

impl MockAdapter {
    /// A powered-on adapter that grants every permission.
    pub fn new(platform: Platform) -> Self {
        MockAdapterBuilder::new().platform(platform).build()
    }

    pub fn builder() -> MockAdapterBuilder {
        MockAdapterBuilder::new()
    }

    pub fn set_adapter_state(&self, state: AdapterState) {
        *self.state.write().expect("mock lock poisoned") = state;
    }

    pub fn set_permission(&self, permission: Permission, status: PermissionStatus) {
        self.permissions
            .write()
            .expect("mock lock poisoned")
            .insert(permission, status);
    }

    pub fn set_enable_failure(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::Relaxed);
    }

    /// Permissions requested so far, in order.
    pub fn requested_permissions(&self) -> Vec<Permission> {
        self.requested.read().expect("mock lock poisoned").clone()
    }

    pub fn enable_calls(&self) -> u32 {
        self.enable_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AdapterControl for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn request_permission(&self, permission: Permission) -> TransportResult<PermissionStatus> {
        self.requested
            .write()
            .expect("mock lock poisoned")
            .push(permission);
        Ok(self
            .permissions
            .read()
            .expect("mock lock poisoned")
            .get(&permission)
            .copied()
            .unwrap_or(PermissionStatus::Granted))
    }

    async fn adapter_state(&self) -> TransportResult<AdapterState> {
        let requested_at = *self.enable_requested_at.read().expect("mock lock poisoned");
        if let (Some(at), Some(delay)) = (requested_at, self.enable_delay) {
            if Instant::now() >= at + delay {
                self.set_adapter_state(AdapterState::PoweredOn);
            }
        }
        Ok(*self.state.read().expect("mock lock poisoned"))
    }

    async fn enable_adapter(&self) -> TransportResult<()> {
        self.enable_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_enable.load(Ordering::Relaxed) {
            return Err(TransportError::Other("Mock enable failure".to_string()));
        }
        *self.enable_requested_at.write().expect("mock lock poisoned") = Some(Instant::now());
        Ok(())
    }
}

/// Builder for [`MockAdapter`].
#[derive(Debug)]
pub struct MockAdapterBuilder {
    platform: Platform,
    permissions: HashMap<Permission, PermissionStatus>,
    state: AdapterState,
    enable_delay: Option<Duration>,
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            permissions: HashMap::new(),
            state: AdapterState::PoweredOn,
            enable_delay: Some(Duration::ZERO),
        }
    }
}

impl MockAdapterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Answer requests for `permission` with `status` (others are granted).
    #[must_use]
    pub fn permission(mut self, permission: Permission, status: PermissionStatus) -> Self {
        self.permissions.insert(permission, status);
        self
    }

    #[must_use]
    pub fn adapter_state(mut self, state: AdapterState) -> Self {
        self.state = state;
        self
    }

    /// Power on this long after an enable request.
    #[must_use]
    pub fn enable_delay(mut self, delay: Duration) -> Self {
        self.enable_delay = Some(delay);
        self
    }

    /// Accept enable requests but never power on.
    #[must_use]
    pub fn enable_never_completes(mut self) -> Self {
        self.enable_delay = None;
        self
    }

    pub fn build(self) -> MockAdapter {
        MockAdapter {
            platform: self.platform,
            permissions: RwLock::new(self.permissions),
            requested: RwLock::new(Vec::new()),
            state: RwLock::new(self.state),
            enable_delay: self.enable_delay,
            enable_requested_at: RwLock::new(None),
            enable_calls: AtomicU32::new(0),
            fail_enable: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_unknown_peer() {
        let transport = MockTransport::new();
        let err = transport.connect("nope").await.unwrap_err();
        assert!(matches!(err, TransportError::DeviceNotFound(_)));
        assert_eq!(transport.connect_count("nope"), 1);
    }

    #[tokio::test]
    async fn test_diffuser_services() {
        let transport = MockTransport::builder().diffuser("AA", None).build();
        assert!(transport.discover_services("AA").await.is_err());

        transport.connect("AA").await.unwrap();
        let services = transport.discover_services("AA").await.unwrap();
        assert_eq!(services.len(), 1);
        assert!(services[0].has_characteristic(COMMAND_CHARACTERISTIC));
    }

    #[tokio::test]
    async fn test_model_query_answered_on_subscription() {
        let transport = MockTransport::builder().diffuser("AA", Some("EA313")).build();
        transport.connect("AA").await.unwrap();
        let mut notifications = transport
            .subscribe("AA", DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC)
            .await
            .unwrap();
        transport
            .write("AA", DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC, &[QUERY_MODEL])
            .await
            .unwrap();
        let notification = notifications.next().await.unwrap();
        assert_eq!(notification.value, b"EA313");

        transport
            .unsubscribe("AA", DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC)
            .await
            .unwrap();
        assert!(!transport.is_subscribed("AA"));
        assert!(notifications.next().await.is_none());
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let transport = MockTransport::builder().diffuser("AA", None).build();
        transport.connect("AA").await.unwrap();
        transport.fail_next_writes(2);

        for expect_ok in [false, false, true] {
            let result = transport
                .write("AA", DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC, &[0xe0])
                .await;
            assert_eq!(result.is_ok(), expect_ok);
        }
        assert_eq!(transport.writes_to("AA").len(), 3);
    }

    #[tokio::test]
    async fn test_emit_disconnect_reaches_event_streams() {
        let transport = MockTransport::builder().diffuser("AA", None).build();
        transport.connect("AA").await.unwrap();
        let mut events = transport.events().await.unwrap();

        transport.emit_disconnect("AA");
        assert_eq!(
            events.next().await.unwrap(),
            AdapterEvent::Disconnected {
                id: "AA".to_string()
            }
        );
        assert!(!transport.is_connected("AA"));
    }

    #[tokio::test]
    async fn test_scan_stream() {
        let transport = MockTransport::new();
        let mut stream = transport.start_scan(ScanRequest::default()).await.unwrap();
        transport.emit_advertisement(Peripheral::new("AA", None, None));
        transport.emit_scan_error("boom");

        assert_eq!(stream.next().await.unwrap().unwrap().id, "AA");
        assert!(stream.next().await.unwrap().is_err());

        transport.stop_scan().await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_adapter_permissions() {
        let adapter = MockAdapter::builder()
            .permission(Permission::Bluetooth, PermissionStatus::Blocked)
            .build();
        assert_eq!(
            adapter.request_permission(Permission::Bluetooth).await.unwrap(),
            PermissionStatus::Blocked
        );
        assert_eq!(
            adapter.request_permission(Permission::FineLocation).await.unwrap(),
            PermissionStatus::Granted
        );
        assert_eq!(adapter.requested_permissions().len(), 2);
    }

    #[tokio::test]
    async fn test_adapter_enable_immediate() {
        let adapter = MockAdapter::builder()
            .adapter_state(AdapterState::PoweredOff)
            .build();
        adapter.enable_adapter().await.unwrap();
        assert_eq!(adapter.adapter_state().await.unwrap(), AdapterState::PoweredOn);
        assert_eq!(adapter.enable_calls(), 1);
    }
}
