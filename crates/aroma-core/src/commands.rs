//! BLE command encoding for diffusers.
//!
//! Every command is a single write (with response) to
//! [`COMMAND_CHARACTERISTIC`](aroma_types::uuids::COMMAND_CHARACTERISTIC).
//! Encoders are pure and return [`Bytes`] ready to hand to the write queue.

use bytes::{BufMut, Bytes, BytesMut};

use aroma_types::DeviceName;

/// Authentication payload. Must be the first write on a new link.
/// Format: `8f "8888OK01"`
pub const AUTHENTICATE: [u8; 9] = [0x8f, 0x38, 0x38, 0x38, 0x38, 0x4f, 0x4b, 0x30, 0x31];

/// Model-number query. The answer arrives as one notification.
pub const QUERY_MODEL: u8 = 0x45;

/// Power command.
/// Format: `[SET_POWER, state, state]`, state: 0x00 = off, 0x01 = on
pub const SET_POWER: u8 = 0x2d;

/// Rename command.
/// Format: `[RENAME, name bytes...]`, one byte per character
pub const RENAME: u8 = 0x22;

/// Keep-alive payload, written every heartbeat interval.
pub const HEARTBEAT: [u8; 3] = [0xe0, 0xaa, 0x55];

/// Intensity command template. The level goes at [`INTENSITY_LEVEL_OFFSET`].
pub const INTENSITY_TEMPLATE: [u8; 18] = [
    0x2a, 0x01, 0x02, 0x01, 0x01, 0x01, 0x03, 0x00, 0x00, 0x17, 0x3b, 0x3e, 0x00, 0x00, 0x00,
    0x0a, 0x00, 0x64,
];

/// Position of the level byte in [`INTENSITY_TEMPLATE`].
pub const INTENSITY_LEVEL_OFFSET: usize = 13;

/// Lowest intensity level.
pub const MIN_INTENSITY: i32 = 1;

/// Highest intensity level any model supports.
pub const MAX_INTENSITY: i32 = 20;

/// A device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate the link.
    Authenticate,
    /// Ask for the model number.
    QueryModel,
    /// Turn the diffuser on or off.
    SetPower(bool),
    /// Set the intensity level. Clamped to [`MIN_INTENSITY`]..=[`MAX_INTENSITY`] on encode.
    SetIntensity(i32),
    /// Rename the diffuser.
    Rename(DeviceName),
    /// Keep the link alive.
    Heartbeat,
}

impl Command {
    /// Encode to the wire payload.
    pub fn encode(&self) -> Bytes {
        match self {
            Command::Authenticate => encode_authenticate(),
            Command::QueryModel => encode_query_model(),
            Command::SetPower(on) => encode_set_power(*on),
            Command::SetIntensity(level) => encode_set_intensity(*level),
            Command::Rename(name) => encode_rename(name),
            Command::Heartbeat => encode_heartbeat(),
        }
    }

    /// Short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Authenticate => "authenticate",
            Command::QueryModel => "query_model",
            Command::SetPower(_) => "set_power",
            Command::SetIntensity(_) => "set_intensity",
            Command::Rename(_) => "rename",
            Command::Heartbeat => "heartbeat",
        }
    }
}

pub fn encode_authenticate() -> Bytes {
    Bytes::from_static(&AUTHENTICATE)
}

pub fn encode_query_model() -> Bytes {
    Bytes::from_static(&[QUERY_MODEL])
}

pub fn encode_set_power(on: bool) -> Bytes {
    let state = u8::from(on);
    Bytes::copy_from_slice(&[SET_POWER, state, state])
}

/// Encode an intensity command. Out-of-range levels are clamped.
///
/// ```
/// use aroma_core::commands::encode_set_intensity;
///
/// assert_eq!(encode_set_intensity(5)[13], 0x05);
/// assert_eq!(encode_set_intensity(0)[13], 0x01);
/// assert_eq!(encode_set_intensity(99)[13], 0x14);
/// ```
pub fn encode_set_intensity(level: i32) -> Bytes {
    let mut payload = INTENSITY_TEMPLATE;
    // Clamped into 1..=20, so the cast is lossless.
    payload[INTENSITY_LEVEL_OFFSET] = level.clamp(MIN_INTENSITY, MAX_INTENSITY) as u8;
    Bytes::copy_from_slice(&payload)
}

pub fn encode_rename(name: &DeviceName) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + name.as_str().len());
    buf.put_u8(RENAME);
    for byte in name.bytes() {
        buf.put_u8(byte);
    }
    buf.freeze()
}

pub fn encode_heartbeat() -> Bytes {
    Bytes::from_static(&HEARTBEAT)
}

/// Decode a model-number notification.
///
/// Each byte is one character (Latin-1). Trailing NULs and whitespace are
/// trimmed.
pub fn decode_model_response(payload: &[u8]) -> String {
    let text: String = payload.iter().map(|&b| char::from(b)).collect();
    text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Render a payload as lowercase hex for logging.
pub fn hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_payload() {
        assert_eq!(hex(&encode_authenticate()), "8f383838384f4b3031");
    }

    #[test]
    fn test_power_payloads() {
        assert_eq!(&encode_set_power(true)[..], &[0x2d, 0x01, 0x01]);
        assert_eq!(&encode_set_power(false)[..], &[0x2d, 0x00, 0x00]);
    }

    #[test]
    fn test_intensity_payload() {
        assert_eq!(
            hex(&encode_set_intensity(5)),
            "2a0102010101030000173b3e0005000a0064"
        );
        assert_eq!(encode_set_intensity(5).len(), 18);
    }

    #[test]
    fn test_intensity_clamps() {
        assert_eq!(encode_set_intensity(0)[INTENSITY_LEVEL_OFFSET], 1);
        assert_eq!(encode_set_intensity(-3)[INTENSITY_LEVEL_OFFSET], 1);
        assert_eq!(encode_set_intensity(21)[INTENSITY_LEVEL_OFFSET], 20);
        assert_eq!(encode_set_intensity(i32::MAX)[INTENSITY_LEVEL_OFFSET], 20);
    }

    #[test]
    fn test_rename_payload() {
        let name = DeviceName::new("Liv").unwrap();
        assert_eq!(&encode_rename(&name)[..], &[0x22, 0x4c, 0x69, 0x76]);

        let name = DeviceName::new("Café").unwrap();
        assert_eq!(&encode_rename(&name)[..], &[0x22, 0x43, 0x61, 0x66, 0xe9]);
    }

    #[test]
    fn test_heartbeat_and_query() {
        assert_eq!(hex(&encode_heartbeat()), "e0aa55");
        assert_eq!(&encode_query_model()[..], &[0x45]);
    }

    #[test]
    fn test_command_dispatch() {
        assert_eq!(Command::Authenticate.encode(), encode_authenticate());
        assert_eq!(Command::SetPower(true).encode(), encode_set_power(true));
        assert_eq!(Command::SetIntensity(7).encode(), encode_set_intensity(7));
        assert_eq!(Command::Heartbeat.name(), "heartbeat");
    }

    #[test]
    fn test_decode_model_response() {
        assert_eq!(decode_model_response(b"EA316"), "EA316");
        assert_eq!(decode_model_response(b"EA313\0\0"), "EA313");
        assert_eq!(decode_model_response(b"EA313 \r\n"), "EA313");
        assert_eq!(decode_model_response(&[0x45, 0xe9]), "E\u{e9}");
        assert_eq!(decode_model_response(&[]), "");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn intensity_level_always_in_range(level in any::<i32>()) {
                let payload = encode_set_intensity(level);
                let encoded = i32::from(payload[INTENSITY_LEVEL_OFFSET]);
                prop_assert!((MIN_INTENSITY..=MAX_INTENSITY).contains(&encoded));
                if (MIN_INTENSITY..=MAX_INTENSITY).contains(&level) {
                    prop_assert_eq!(encoded, level);
                }
                // Everything outside the level byte is the fixed template.
                for (i, byte) in payload.iter().enumerate() {
                    if i != INTENSITY_LEVEL_OFFSET {
                        prop_assert_eq!(*byte, INTENSITY_TEMPLATE[i]);
                    }
                }
            }

            #[test]
            fn decode_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..32)) {
                let decoded = decode_model_response(&payload);
                prop_assert!(decoded.chars().count() <= payload.len());
            }
        }
    }
}
