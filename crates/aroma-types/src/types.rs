//! Core types for diffuser discovery and control.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Name shown for a peripheral that has not advertised one yet.
pub const PLACEHOLDER_NAME: &str = "Unknown Device";

/// Minimum length of a name accepted by the rename command.
pub const MIN_NAME_LEN: usize = 3;

/// A BLE peripheral seen during scanning.
///
/// Peripherals are keyed by [`Peripheral::id`]. The advertised name may be
/// missing from the first advertisement packet and arrive later, so it is
/// kept optional and [`Peripheral::display_name`] falls back to
/// [`PLACEHOLDER_NAME`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Peripheral {
    /// Platform-stable identifier (MAC address on Android/Linux/Windows, UUID on Apple platforms).
    pub id: String,
    /// Advertised local name, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Signal strength in dBm at the last discovery.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rssi: Option<i16>,
    /// When this peripheral was last reported by the adapter.
    pub last_seen: OffsetDateTime,
}

impl Peripheral {
    /// Create a peripheral from a discovery report.
    ///
    /// Blank names are treated as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use aroma_types::Peripheral;
    ///
    /// let p = Peripheral::new("AA:BB", None, Some(-60));
    /// assert_eq!(p.display_name(), "Unknown Device");
    ///
    /// let p = Peripheral::new("AA:BB", Some("Living Room".into()), None);
    /// assert_eq!(p.display_name(), "Living Room");
    /// ```
    pub fn new(id: impl Into<String>, name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            id: id.into(),
            name: name.filter(|n| !n.trim().is_empty()),
            rssi,
            last_seen: OffsetDateTime::now_utc(),
        }
    }

    /// The name to show in a device list; never empty.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(PLACEHOLDER_NAME)
    }

    /// Whether the peripheral has advertised a real name.
    #[must_use]
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    /// Fold a newer discovery report for the same id into this entry.
    ///
    /// A report without a name or RSSI keeps the previously known value.
    pub fn merge(&mut self, newer: Peripheral) {
        debug_assert_eq!(self.id, newer.id);
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.rssi.is_some() {
            self.rssi = newer.rssi;
        }
        self.last_seen = newer.last_seen;
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// A validated name for the rename command.
///
/// The firmware carries one byte per character, so every character must be
/// at or below U+00FF. Surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceName(String);

impl DeviceName {
    /// Validate a name.
    ///
    /// # Examples
    ///
    /// ```
    /// use aroma_types::{DeviceName, ParseError};
    ///
    /// assert!(DeviceName::new("Liv").is_ok());
    /// assert_eq!(DeviceName::new("  "), Err(ParseError::EmptyName));
    /// assert!(DeviceName::new("Li").is_err());
    /// ```
    pub fn new(name: &str) -> ParseResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyName);
        }

        let len = trimmed.chars().count();
        if len < MIN_NAME_LEN {
            return Err(ParseError::NameTooShort {
                min: MIN_NAME_LEN,
                actual: len,
            });
        }

        if let Some((position, character)) =
            trimmed.chars().enumerate().find(|(_, c)| u32::from(*c) > 0xFF)
        {
            return Err(ParseError::UnencodableCharacter {
                character,
                position,
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The validated name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// One byte per character, in order.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        // Validation guarantees every code point fits in a byte.
        self.0.chars().map(|c| u32::from(c) as u8)
    }
}

impl TryFrom<&str> for DeviceName {
    type Error = ParseError;

    fn try_from(value: &str) -> ParseResult<Self> {
        Self::new(value)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Features of a known diffuser model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ModelInfo {
    /// Model identifier reported by the model-number query.
    pub name: &'static str,
    /// Number of intensity levels the model supports.
    pub levels: u8,
}

/// Models the application recognizes.
pub const KNOWN_MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "EA313",
        levels: 9,
    },
    ModelInfo {
        name: "EA316",
        levels: 20,
    },
];

impl ModelInfo {
    /// Match a decoded model response against [`KNOWN_MODELS`].
    ///
    /// An exact match wins; otherwise the first known model whose name
    /// appears inside the response is used. Anything else is not a model.
    ///
    /// # Examples
    ///
    /// ```
    /// use aroma_types::ModelInfo;
    ///
    /// assert_eq!(ModelInfo::lookup("EA316").map(|m| m.levels), Some(20));
    /// assert_eq!(ModelInfo::lookup("\u{1}EA313").map(|m| m.levels), Some(9));
    /// assert!(ModelInfo::lookup("XYZ").is_none());
    /// ```
    #[must_use]
    pub fn lookup(response: &str) -> Option<&'static ModelInfo> {
        let response = response.trim();
        if response.is_empty() {
            return None;
        }
        KNOWN_MODELS
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(response))
            .or_else(|| KNOWN_MODELS.iter().find(|m| response.contains(m.name)))
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} levels)", self.name, self.levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peripheral_without_name_uses_placeholder() {
        let p = Peripheral::new("AA:BB", None, None);
        assert_eq!(p.display_name(), PLACEHOLDER_NAME);
        assert!(!p.display_name().is_empty());
        assert!(!p.has_name());
    }

    #[test]
    fn test_peripheral_blank_name_is_absent() {
        let p = Peripheral::new("AA:BB", Some("   ".to_string()), None);
        assert!(p.name.is_none());
        assert_eq!(p.display_name(), PLACEHOLDER_NAME);
    }

    #[test]
    fn test_merge_keeps_known_name() {
        let mut p = Peripheral::new("AA:BB", Some("Diffuser".to_string()), Some(-70));
        p.merge(Peripheral::new("AA:BB", None, Some(-50)));
        assert_eq!(p.name.as_deref(), Some("Diffuser"));
        assert_eq!(p.rssi, Some(-50));
    }

    #[test]
    fn test_merge_learns_late_name() {
        let mut p = Peripheral::new("AA:BB", None, Some(-70));
        p.merge(Peripheral::new("AA:BB", Some("Bedroom".to_string()), None));
        assert_eq!(p.display_name(), "Bedroom");
        assert_eq!(p.rssi, Some(-70));
    }

    #[test]
    fn test_peripheral_display() {
        let p = Peripheral::new("AA:BB", Some("Hall".to_string()), None);
        assert_eq!(p.to_string(), "Hall (AA:BB)");
    }

    #[test]
    fn test_device_name_validation() {
        assert_eq!(DeviceName::new(""), Err(ParseError::EmptyName));
        assert_eq!(
            DeviceName::new("ab"),
            Err(ParseError::NameTooShort { min: 3, actual: 2 })
        );
        assert_eq!(DeviceName::new("  Liv  ").unwrap().as_str(), "Liv");
        assert!(DeviceName::new("Café").is_ok());
        assert_eq!(
            DeviceName::new("ab→c"),
            Err(ParseError::UnencodableCharacter {
                character: '→',
                position: 2
            })
        );
    }

    #[test]
    fn test_device_name_bytes() {
        let name = DeviceName::new("Liv").unwrap();
        assert_eq!(name.bytes().collect::<Vec<_>>(), vec![0x4C, 0x69, 0x76]);

        let name = DeviceName::new("Café").unwrap();
        assert_eq!(name.bytes().last(), Some(0xE9));
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!(ModelInfo::lookup("EA313").unwrap().levels, 9);
        assert_eq!(ModelInfo::lookup("ea316").unwrap().levels, 20);
        assert_eq!(ModelInfo::lookup("EA316\0").unwrap().name, "EA316");
        assert!(ModelInfo::lookup("").is_none());
        assert!(ModelInfo::lookup("EA999").is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_peripheral_serialization_skips_missing_fields() {
        let p = Peripheral::new("AA:BB", None, None);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"id\":\"AA:BB\""));
        assert!(!json.contains("rssi"));
        assert!(!json.contains("\"name\""));
    }
}
