//! Platform-specific Bluetooth permission and adapter rules.
//!
//! The session layer runs on phones and desktops, and each platform gates
//! BLE access differently.
//!
//! # Platform Differences
//!
//! | Platform | Permissions requested | Can enable adapter | Settings redirect |
//! |----------|-----------------------|--------------------|-------------------|
//! | Android (API < 31) | `ACCESS_FINE_LOCATION` | Yes | `android.settings.BLUETOOTH_SETTINGS` |
//! | Android (API ≥ 31) | `BLUETOOTH_SCAN`, `BLUETOOTH_CONNECT`, `BLUETOOTH_ADVERTISE` | Yes | `android.settings.BLUETOOTH_SETTINGS` |
//! | iOS | Bluetooth usage | No, prompts the user | `App-Prefs:Bluetooth` |
//! | Desktop | None | No | None |
//!
//! Permissions are requested in the listed order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Settings location for Bluetooth on iOS.
pub const IOS_BLUETOOTH_SETTINGS: &str = "App-Prefs:Bluetooth";

/// Intent action for Bluetooth settings on Android.
pub const ANDROID_BLUETOOTH_SETTINGS: &str = "android.settings.BLUETOOTH_SETTINGS";

/// First Android API level with the runtime Bluetooth permissions (Android 12).
pub const ANDROID_RUNTIME_BLUETOOTH_API: u32 = 31;

/// Platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "os", rename_all = "snake_case")]
pub enum Platform {
    /// Android at the given API level.
    Android {
        /// `Build.VERSION.SDK_INT` of the host.
        api_level: u32,
    },
    /// iOS with CoreBluetooth.
    Ios,
    /// macOS, Linux or Windows through btleplug.
    Desktop,
}

impl Platform {
    /// Detect the current platform.
    ///
    /// On Android the API level is not visible from Rust; this assumes the
    /// runtime-permission model. Hosts that know the level should construct
    /// [`Platform::Android`] themselves.
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        {
            Platform::Android {
                api_level: ANDROID_RUNTIME_BLUETOOTH_API,
            }
        }
        #[cfg(target_os = "ios")]
        {
            Platform::Ios
        }
        #[cfg(not(any(target_os = "android", target_os = "ios")))]
        {
            Platform::Desktop
        }
    }

    /// Permissions that must be granted before scanning, in request order.
    pub fn required_permissions(&self) -> &'static [Permission] {
        match self {
            Platform::Android { api_level } if *api_level >= ANDROID_RUNTIME_BLUETOOTH_API => &[
                Permission::BluetoothScan,
                Permission::BluetoothConnect,
                Permission::BluetoothAdvertise,
            ],
            Platform::Android { .. } => &[Permission::FineLocation],
            Platform::Ios => &[Permission::Bluetooth],
            Platform::Desktop => &[],
        }
    }

    /// Where to send the user to fix Bluetooth settings, if the platform has one.
    pub fn bluetooth_settings_url(&self) -> Option<&'static str> {
        match self {
            Platform::Android { .. } => Some(ANDROID_BLUETOOTH_SETTINGS),
            Platform::Ios => Some(IOS_BLUETOOTH_SETTINGS),
            Platform::Desktop => None,
        }
    }

    /// Whether the adapter can be powered on without the user.
    pub fn can_enable_adapter(&self) -> bool {
        matches!(self, Platform::Android { .. })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android { api_level } => write!(f, "Android (API {})", api_level),
            Platform::Ios => write!(f, "iOS"),
            Platform::Desktop => write!(f, "desktop"),
        }
    }
}

/// An OS permission needed for BLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// `ACCESS_FINE_LOCATION`, needed for scanning before Android 12.
    FineLocation,
    /// `BLUETOOTH_SCAN`
    BluetoothScan,
    /// `BLUETOOTH_CONNECT`
    BluetoothConnect,
    /// `BLUETOOTH_ADVERTISE`
    BluetoothAdvertise,
    /// iOS Bluetooth usage authorization.
    Bluetooth,
}

impl Permission {
    /// The platform's identifier for this permission.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FineLocation => "android.permission.ACCESS_FINE_LOCATION",
            Permission::BluetoothScan => "android.permission.BLUETOOTH_SCAN",
            Permission::BluetoothConnect => "android.permission.BLUETOOTH_CONNECT",
            Permission::BluetoothAdvertise => "android.permission.BLUETOOTH_ADVERTISE",
            Permission::Bluetooth => "NSBluetoothAlwaysUsageDescription",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The permission is granted.
    Granted,
    /// The user refused this time.
    Denied,
    /// The user refused permanently; only the settings screen can change it.
    Blocked,
}

impl PermissionStatus {
    /// Whether BLE work may proceed.
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}
