//! Client events and the async streams transports hand out.
//!
//! [`ClientEvent`]s are broadcast to every subscriber of
//! [`DiffuserClient::subscribe`](crate::client::DiffuserClient::subscribe).
//! The stream aliases at the bottom of this module are the shapes a
//! [`Transport`](crate::traits::Transport) returns.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use aroma_types::Peripheral;

use crate::error::TransportResult;
use crate::traits::AdapterState;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Events emitted by the scanner and the session.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ClientEvent {
    /// Scanning started.
    ScanStarted,
    /// Scanning stopped.
    ScanStopped,
    /// The adapter reported an error during scanning; scanning has stopped.
    ScanFailed { error: String },
    /// A peripheral was discovered or updated.
    Discovered { peripheral: Peripheral },
    /// A connection attempt started.
    Connecting { device_id: String },
    /// The session reached the ready state.
    Connected { device: Peripheral },
    /// A connection attempt failed.
    ConnectFailed { device_id: String, error: String },
    /// The session left the ready state.
    Disconnected {
        device_id: String,
        reason: DisconnectReason,
    },
    /// The model query returned a recognized model.
    ModelIdentified {
        device_id: String,
        model_name: String,
        levels: u8,
    },
    /// A heartbeat write failed; the session stays connected.
    HeartbeatFailed { device_id: String, error: String },
    /// A user command failed; the session stays connected.
    CommandFailed {
        device_id: String,
        command: String,
        error: String,
    },
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Normal disconnection requested by user.
    UserRequested,
    /// The session was replaced by a connection to another device.
    Replaced,
    /// The peripheral or the adapter dropped the link.
    LinkLost,
    /// The adapter was powered off.
    AdapterPoweredOff,
}

/// Events reported by the adapter outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// A peripheral's link was dropped.
    Disconnected { id: String },
    /// The adapter power state changed.
    StateChanged { state: AdapterState },
}

/// A notification received on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Characteristic that notified.
    pub characteristic: Uuid,
    /// Notified value.
    pub value: Vec<u8>,
}

/// Sender for client events.
pub type EventSender = broadcast::Sender<ClientEvent>;

/// Receiver for client events.
pub type EventReceiver = broadcast::Receiver<ClientEvent>;

/// Peripherals reported while scanning. An `Err` item ends the scan.
pub type DiscoveryStream = BoxStream<'static, TransportResult<Peripheral>>;

/// Notifications from a subscribed characteristic.
pub type NotificationStream = BoxStream<'static, Notification>;

/// Adapter-reported events.
pub type AdapterEventStream = BoxStream<'static, AdapterEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: ClientEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
