//! Connection session state machine.
//!
//! A [`ConnectionSession`] owns at most one link at a time:
//!
//! ```text
//! Idle --connect--> Connecting --> ValidatingServices --> Authenticating --> Ready
//!                        \                 \                    \
//!                         +-----------------+--------------------+--> Failed
//! Ready --disconnect--> Disconnecting --> Idle
//! Ready --link lost--> Idle
//! ```
//!
//! Every transition replaces the published [`SessionSnapshot`]. Observers
//! read it through [`ConnectionSession::watch`].
//!
//! All exits from a link (user disconnect, replacement by a new connect,
//! handshake failure, link loss) share one teardown path: the heartbeat is
//! cancelled, the write queue closed, the disconnect watcher stopped, the
//! transport disconnected where needed, and then the model and device are
//! cleared in the published state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use aroma_types::uuids::{COMMAND_CHARACTERISTIC, DIFFUSER_SERVICE};
use aroma_types::{DeviceName, ModelInfo, Peripheral};

use crate::commands::{Command, MAX_INTENSITY, MIN_INTENSITY, decode_model_response, hex};
use crate::config::SessionConfig;
use crate::error::{Error, Result, TransportResult};
use crate::events::{AdapterEvent, AdapterEventStream, ClientEvent, DisconnectReason, EventDispatcher};
use crate::link::WriteQueue;
use crate::traits::{AdapterState, ServiceInfo, Transport};

/// Intensity levels assumed when the model is unknown.
pub const DEFAULT_LEVELS: u8 = MAX_INTENSITY as u8;

/// Phase of the connection session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    ValidatingServices,
    Authenticating,
    Ready,
    Disconnecting,
    Failed,
}

impl SessionPhase {
    /// Whether a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            SessionPhase::Connecting | SessionPhase::ValidatingServices | SessionPhase::Authenticating
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::ValidatingServices => "validating services",
            SessionPhase::Authenticating => "authenticating",
            SessionPhase::Ready => "ready",
            SessionPhase::Disconnecting => "disconnecting",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the last connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    ConnectTimeout,
    ConnectError(String),
    IncompatibleDevice(Uuid),
    AuthenticationFailed(String),
}

impl FailureReason {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::ConnectTimeout { .. } => FailureReason::ConnectTimeout,
            Error::IncompatibleDevice { missing, .. } => FailureReason::IncompatibleDevice(*missing),
            Error::AuthenticationFailed { reason, .. } => {
                FailureReason::AuthenticationFailed(reason.clone())
            }
            other => FailureReason::ConnectError(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConnectTimeout => write!(f, "connection timed out"),
            FailureReason::ConnectError(reason) => write!(f, "connection failed: {}", reason),
            FailureReason::IncompatibleDevice(missing) => {
                write!(f, "not a compatible diffuser (missing {})", missing)
            }
            FailureReason::AuthenticationFailed(reason) => {
                write!(f, "authentication failed: {}", reason)
            }
        }
    }
}

/// Immutable view of the session, replaced on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// The connected device; set only while ready or disconnecting.
    pub device: Option<Peripheral>,
    /// The device a connection attempt addresses.
    pub target: Option<Peripheral>,
    /// Recognized model identifier; empty until identified.
    pub model_name: String,
    pub model: Option<ModelInfo>,
    /// Last commanded power state.
    pub is_powered_on: bool,
    /// Set only when failed.
    pub failure: Option<FailureReason>,
}

impl SessionSnapshot {
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    /// Intensity levels of the connected model, or [`DEFAULT_LEVELS`] if unknown.
    pub fn total_levels(&self) -> u8 {
        self.model.map_or(DEFAULT_LEVELS, |m| m.levels)
    }
}

/// How a link ended.
enum Ending {
    Idle(DisconnectReason),
    Failed(FailureReason),
}

/// Resources owned by one physical link.
struct Link {
    device_id: String,
    generation: u64,
    queue: Arc<WriteQueue>,
    heartbeat: CancellationToken,
    watcher: CancellationToken,
    lost: CancellationToken,
}

impl Link {
    fn release(&self) {
        self.heartbeat.cancel();
        self.queue.close();
        self.watcher.cancel();
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    events: EventDispatcher,
    state: watch::Sender<SessionSnapshot>,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
    link: StdMutex<Option<Link>>,
    /// Cancellation for the connect currently holding `lifecycle`.
    pending: StdMutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut link) = self.link.lock() {
            if let Some(link) = link.take() {
                link.release();
            }
        }
    }
}

/// The connection session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ConnectionSession")
            .field("phase", &snapshot.phase)
            .field("device", &snapshot.device.as_ref().map(|d| &d.id))
            .finish_non_exhaustive()
    }
}

impl ConnectionSession {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig, events: EventDispatcher) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                events,
                state,
                lifecycle: Mutex::new(()),
                link: StdMutex::new(None),
                pending: StdMutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase
    }

    /// Connect to a diffuser and authenticate.
    ///
    /// An existing session is torn down first. On success the session is
    /// [`SessionPhase::Ready`], the heartbeat is running and the model query
    /// has completed (recognized or not).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectTimeout`] / [`Error::ConnectError`] if the link could not be opened.
    /// - [`Error::IncompatibleDevice`] if the diffuser service or characteristic is missing.
    /// - [`Error::AuthenticationFailed`] if the authentication write fails.
    /// - [`Error::Cancelled`] if [`disconnect`](Self::disconnect) was called meanwhile.
    ///
    /// Each of these leaves the session [`Failed`](SessionPhase::Failed),
    /// except cancellation, which leaves it idle.
    #[tracing::instrument(level = "info", skip_all, fields(device_id = %peripheral.id))]
    pub async fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let cancel = CancellationToken::new();
        *inner.pending.lock().expect("session lock poisoned") = Some(cancel.clone());

        // The old link must be fully closed even if this attempt is cancelled.
        inner.replace_existing().await;

        let result = if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = inner.establish(peripheral) => result,
            }
        };
        inner.pending.lock().expect("session lock poisoned").take();

        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                let ending = match &error {
                    Error::Cancelled => {
                        info!("Connection attempt cancelled");
                        Ending::Idle(DisconnectReason::UserRequested)
                    }
                    other => {
                        warn!(error = %other, "Connection failed");
                        Ending::Failed(FailureReason::from_error(other))
                    }
                };
                // Best effort; the link may never have opened.
                if let Err(e) = inner.teardown(ending, true).await {
                    debug!(error = %e, "Disconnect after failed connect");
                }
                inner.events.send(ClientEvent::ConnectFailed {
                    device_id: peripheral.id.clone(),
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Disconnect from the current device.
    ///
    /// Safe in every phase; from idle this is a no-op. An in-flight
    /// [`connect`](Self::connect) is cancelled. Session cleanup always runs;
    /// with `force` a failing transport disconnect is only logged, otherwise
    /// it is returned as [`Error::DisconnectFailed`] after cleanup.
    #[tracing::instrument(level = "info", skip_all, fields(force))]
    pub async fn disconnect(&self, force: bool) -> Result<()> {
        let inner = &self.inner;
        let pending = inner.pending.lock().expect("session lock poisoned").take();
        if let Some(token) = pending {
            info!("Cancelling in-flight connection attempt");
            token.cancel();
        }

        let _lifecycle = inner.lifecycle.lock().await;
        let snapshot = self.snapshot();
        match snapshot.phase {
            SessionPhase::Idle => {
                debug!("Already idle");
                Ok(())
            }
            SessionPhase::Failed => {
                inner
                    .teardown(Ending::Idle(DisconnectReason::UserRequested), false)
                    .await
                    .ok();
                Ok(())
            }
            phase => {
                let device_id = inner.link_device_id().unwrap_or_default();
                if phase == SessionPhase::Ready {
                    inner.state.send_modify(|s| s.phase = SessionPhase::Disconnecting);
                }
                info!(device_id = %device_id, "Disconnecting");
                match inner
                    .teardown(Ending::Idle(DisconnectReason::UserRequested), true)
                    .await
                {
                    Ok(()) => Ok(()),
                    Err(e) if force => {
                        warn!(device_id = %device_id, error = %e, "Disconnect failed, ignoring");
                        Ok(())
                    }
                    Err(e) => Err(Error::DisconnectFailed {
                        device_id,
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Rename the connected diffuser.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] unless the session is ready.
    /// - [`Error::InvalidName`] if the name fails validation.
    /// - [`Error::CommandFailed`] if the write fails; the session stays ready.
    pub async fn rename(&self, name: &str) -> Result<()> {
        let (queue, device_id) = self.inner.ready_link()?;
        let name = DeviceName::new(name)?;
        self.inner
            .write_command(&queue, &device_id, Command::Rename(name.clone()))
            .await?;
        info!(device_id = %device_id, name = %name, "Renamed");
        self.inner.update_if_ready(&device_id, |s| {
            if let Some(device) = s.device.as_mut() {
                device.name = Some(name.to_string());
            }
        });
        Ok(())
    }

    /// Turn the diffuser on or off.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        let (queue, device_id) = self.inner.ready_link()?;
        self.inner
            .write_command(&queue, &device_id, Command::SetPower(on))
            .await?;
        info!(device_id = %device_id, on, "Power set");
        self.inner
            .update_if_ready(&device_id, |s| s.is_powered_on = on);
        Ok(())
    }

    /// Set the intensity, clamped to the connected model's range.
    ///
    /// Returns the level that was written.
    pub async fn set_intensity(&self, level: i32) -> Result<u8> {
        let (queue, device_id) = self.inner.ready_link()?;
        let total = i32::from(self.snapshot().total_levels());
        let clamped = level.clamp(MIN_INTENSITY, total);
        if clamped != level {
            debug!(requested = level, applied = clamped, "Intensity clamped");
        }
        self.inner
            .write_command(&queue, &device_id, Command::SetIntensity(clamped))
            .await?;
        info!(device_id = %device_id, level = clamped, "Intensity set");
        // Within 1..=20 after clamping.
        Ok(clamped as u8)
    }
}

impl Inner {
    async fn replace_existing(&self) {
        if self.link_device_id().is_none() && self.state.borrow().phase == SessionPhase::Idle {
            return;
        }
        debug!("Replacing existing session");
        if let Err(e) = self
            .teardown(Ending::Idle(DisconnectReason::Replaced), true)
            .await
        {
            debug!(error = %e, "Disconnect of replaced session failed");
        }
    }

    async fn establish(self: &Arc<Self>, peripheral: &Peripheral) -> Result<()> {
        let device_id = peripheral.id.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(SessionSnapshot {
            phase: SessionPhase::Connecting,
            target: Some(peripheral.clone()),
            ..SessionSnapshot::default()
        });
        self.events.send(ClientEvent::Connecting {
            device_id: device_id.clone(),
        });

        let adapter_events = match self.transport.events().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Adapter events unavailable; link loss will not be detected");
                None
            }
        };

        let link = Link {
            device_id: device_id.clone(),
            generation,
            queue: Arc::new(WriteQueue::spawn(
                self.transport.clone(),
                device_id.clone(),
                self.config.write_timeout,
            )),
            heartbeat: CancellationToken::new(),
            watcher: CancellationToken::new(),
            lost: CancellationToken::new(),
        };
        if let Some(stream) = adapter_events {
            spawn_watcher(
                Arc::downgrade(self),
                stream,
                device_id.clone(),
                generation,
                link.watcher.clone(),
                link.lost.clone(),
            );
        }
        let queue = link.queue.clone();
        let heartbeat = link.heartbeat.clone();
        let lost = link.lost.clone();
        *self.link.lock().expect("session lock poisoned") = Some(link);

        tokio::select! {
            biased;
            _ = lost.cancelled() => {
                return Err(Error::ConnectError {
                    device_id,
                    reason: "link lost during connection".to_string(),
                });
            }
            result = self.handshake(&device_id, &queue) => result?,
        }

        self.state.send_replace(SessionSnapshot {
            phase: SessionPhase::Ready,
            device: Some(peripheral.clone()),
            ..SessionSnapshot::default()
        });
        self.events.send(ClientEvent::Connected {
            device: peripheral.clone(),
        });
        info!("Session ready");

        spawn_heartbeat(
            queue.clone(),
            self.events.clone(),
            device_id.clone(),
            self.config.heartbeat_interval,
            heartbeat,
        );
        self.query_model(&device_id, &queue).await;
        Ok(())
    }

    async fn handshake(&self, device_id: &str, queue: &WriteQueue) -> Result<()> {
        let connect_timeout = self.config.connect_timeout;
        match timeout(connect_timeout, self.transport.connect(device_id)).await {
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    device_id: device_id.to_string(),
                    duration: connect_timeout,
                });
            }
            Ok(Err(e)) => return Err(Error::connect_error(device_id, &e)),
            Ok(Ok(())) => debug!("Link established"),
        }

        self.state
            .send_modify(|s| s.phase = SessionPhase::ValidatingServices);
        let discovery_timeout = self.config.discovery_timeout;
        let services = match timeout(discovery_timeout, self.transport.discover_services(device_id))
            .await
        {
            Err(_) => {
                return Err(Error::ConnectError {
                    device_id: device_id.to_string(),
                    reason: format!("service discovery timed out after {:?}", discovery_timeout),
                });
            }
            Ok(Err(e)) => return Err(Error::connect_error(device_id, &e)),
            Ok(Ok(services)) => services,
        };
        validate_services(device_id, &services)?;

        self.state
            .send_modify(|s| s.phase = SessionPhase::Authenticating);
        queue
            .write(&Command::Authenticate)
            .await
            .map_err(|e| Error::AuthenticationFailed {
                device_id: device_id.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Authenticated");
        Ok(())
    }

    /// Ask for the model number once. Failures only leave the model unknown.
    async fn query_model(&self, device_id: &str, queue: &WriteQueue) {
        let mut notifications = match self
            .transport
            .subscribe(device_id, DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Could not subscribe for model response");
                return;
            }
        };

        let answer = match queue.write(&Command::QueryModel).await {
            Ok(()) => timeout(self.config.model_query_timeout, notifications.next())
                .await
                .ok()
                .flatten(),
            Err(e) => {
                warn!(error = %e, "Model query write failed");
                None
            }
        };
        drop(notifications);
        if let Err(e) = self
            .transport
            .unsubscribe(device_id, DIFFUSER_SERVICE, COMMAND_CHARACTERISTIC)
            .await
        {
            debug!(error = %e, "Unsubscribe after model query failed");
        }

        let Some(notification) = answer else {
            debug!("No model response");
            return;
        };
        let response = decode_model_response(&notification.value);
        match ModelInfo::lookup(&response) {
            Some(model) => {
                info!(model = model.name, levels = model.levels, "Model identified");
                self.update_if_ready(device_id, |s| {
                    s.model_name = model.name.to_string();
                    s.model = Some(*model);
                });
                self.events.send(ClientEvent::ModelIdentified {
                    device_id: device_id.to_string(),
                    model_name: model.name.to_string(),
                    levels: model.levels,
                });
            }
            None => debug!(response = %response, raw = %hex(&notification.value), "Unrecognized model"),
        }
    }

    /// The shared cleanup path for every way a link ends.
    ///
    /// Returns the transport disconnect result; state is cleaned up either way.
    async fn teardown(&self, ending: Ending, disconnect_transport: bool) -> TransportResult<()> {
        let link = self.link.lock().expect("session lock poisoned").take();
        let mut result = Ok(());
        if let Some(link) = link {
            link.release();
            if disconnect_transport {
                result = self.transport.disconnect(&link.device_id).await;
            }
        }

        let previous = self.state.borrow().clone();
        let next = match ending {
            Ending::Idle(ref reason) => {
                if let Some(device) = &previous.device {
                    info!(device_id = %device.id, ?reason, "Disconnected");
                    self.events.send(ClientEvent::Disconnected {
                        device_id: device.id.clone(),
                        reason: reason.clone(),
                    });
                }
                SessionSnapshot::default()
            }
            Ending::Failed(reason) => SessionSnapshot {
                phase: SessionPhase::Failed,
                target: previous.target.clone(),
                failure: Some(reason),
                ..SessionSnapshot::default()
            },
        };
        if previous != next {
            self.state.send_replace(next);
        }
        result
    }

    async fn handle_link_lost(&self, generation: u64, reason: DisconnectReason) {
        let _lifecycle = self.lifecycle.lock().await;
        let current = self
            .link
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|link| link.generation);
        if current != Some(generation) || self.state.borrow().phase != SessionPhase::Ready {
            return;
        }
        warn!(?reason, "Link lost");
        // The link is already gone; nothing to disconnect.
        if let Err(e) = self.teardown(Ending::Idle(reason), false).await {
            debug!(error = %e, "Teardown after link loss");
        }
    }

    fn link_device_id(&self) -> Option<String> {
        self.link
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|link| link.device_id.clone())
    }

    fn ready_link(&self) -> Result<(Arc<WriteQueue>, String)> {
        let phase = self.state.borrow().phase;
        if phase != SessionPhase::Ready {
            return Err(Error::NotReady { phase });
        }
        self.link
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|link| (link.queue.clone(), link.device_id.clone()))
            .ok_or(Error::NotReady { phase })
    }

    async fn write_command(&self, queue: &WriteQueue, device_id: &str, command: Command) -> Result<()> {
        queue.write(&command).await.map_err(|e| {
            warn!(device_id = %device_id, command = command.name(), error = %e, "Command failed");
            self.events.send(ClientEvent::CommandFailed {
                device_id: device_id.to_string(),
                command: command.name().to_string(),
                error: e.to_string(),
            });
            Error::command_failed(command.name(), &e)
        })
    }

    fn update_if_ready(&self, device_id: &str, update: impl FnOnce(&mut SessionSnapshot)) {
        self.state.send_if_modified(|s| {
            let same_device = s.device.as_ref().is_some_and(|d| d.id == device_id);
            if s.phase == SessionPhase::Ready && same_device {
                update(s);
                true
            } else {
                false
            }
        });
    }
}

/// Check that the diffuser service and command characteristic are present.
pub fn validate_services(device_id: &str, services: &[ServiceInfo]) -> Result<()> {
    let service = services
        .iter()
        .find(|s| s.uuid == DIFFUSER_SERVICE)
        .ok_or_else(|| Error::IncompatibleDevice {
            device_id: device_id.to_string(),
            missing: DIFFUSER_SERVICE,
        })?;
    if !service.has_characteristic(COMMAND_CHARACTERISTIC) {
        return Err(Error::IncompatibleDevice {
            device_id: device_id.to_string(),
            missing: COMMAND_CHARACTERISTIC,
        });
    }
    Ok(())
}

fn spawn_heartbeat(
    queue: Arc<WriteQueue>,
    events: EventDispatcher,
    device_id: String,
    period: Duration,
    cancel: CancellationToken,
) {
    let first = Instant::now() + period;
    tokio::spawn(async move {
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = queue.write(&Command::Heartbeat) => result,
            };
            match result {
                Ok(()) => trace!(device_id = %device_id, "Heartbeat"),
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "Heartbeat failed");
                    events.send(ClientEvent::HeartbeatFailed {
                        device_id: device_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        debug!(device_id = %device_id, "Heartbeat stopped");
    });
}

fn spawn_watcher(
    session: Weak<Inner>,
    mut events: AdapterEventStream,
    device_id: String,
    generation: u64,
    stop: CancellationToken,
    lost: CancellationToken,
) {
    tokio::spawn(async move {
        let reason = loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                event = events.next() => event,
            };
            match event {
                Some(AdapterEvent::Disconnected { id }) if id == device_id => {
                    break DisconnectReason::LinkLost;
                }
                Some(AdapterEvent::StateChanged {
                    state: AdapterState::PoweredOff | AdapterState::Unavailable,
                }) => break DisconnectReason::AdapterPoweredOff,
                Some(_) => continue,
                None => return,
            }
        };
        lost.cancel();
        if let Some(session) = session.upgrade() {
            session.handle_link_lost(generation, reason).await;
        }
    });
}
