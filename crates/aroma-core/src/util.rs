//! Utility functions for aroma-core.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_debug_wrapper(&format!("{:?}", id))
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    select_identifier(address, || format_peripheral_id(peripheral_id))
}

fn strip_debug_wrapper(debug: &str) -> String {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

fn select_identifier(address: &str, fallback: impl FnOnce() -> String) -> String {
    if address == "00:00:00:00:00:00" {
        fallback()
    } else {
        address.to_string()
    }
}
