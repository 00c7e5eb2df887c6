//! Bluetooth UUIDs for the diffuser protocol.
//!
//! The whole protocol runs over a single characteristic that accepts
//! writes and emits notifications. Both UUIDs are fixed by the firmware.

use uuid::{Uuid, uuid};

/// Primary diffuser service.
pub const DIFFUSER_SERVICE: Uuid = uuid!("0000fff0-0000-1000-8000-00805f9b34fb");

/// Command characteristic (write with response + notify).
pub const COMMAND_CHARACTERISTIC: Uuid = uuid!("0000fff6-0000-1000-8000-00805f9b34fb");
