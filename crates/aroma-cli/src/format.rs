//! Output formatting for CLI commands.

use anyhow::Result;
use aroma_core::{Peripheral, SessionSnapshot};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::style;

/// Render any serializable value as pretty JSON with a trailing newline.
pub fn as_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

/// Format discovered devices as a table.
///
/// In quiet mode only the identifiers are printed, one per line.
pub fn format_scan_text(devices: &[Peripheral], quiet: bool) -> String {
    if quiet {
        return devices.iter().map(|d| format!("{}\n", d.id)).collect();
    }
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "Identifier")]
        identifier: String,
    }

    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| DeviceRow {
            name: d.display_name().to_string(),
            signal: d
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string()),
            identifier: d.id.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table);

    let noun = if devices.len() == 1 { "device" } else { "devices" };
    format!("Found {} {}\n{}\n", devices.len(), noun, table)
}

/// Format the connected session for `aroma info`.
pub fn format_info_text(snapshot: &SessionSnapshot) -> String {
    use tabled::builder::Builder;

    let mut builder = Builder::default();
    builder.push_record(["Property", "Value"]);
    if let Some(device) = &snapshot.device {
        builder.push_record(["Name", device.display_name()]);
        builder.push_record(["Identifier", device.id.as_str()]);
        if let Some(rssi) = device.rssi {
            builder.push_record(["Signal".to_string(), format!("{} dBm", rssi)]);
        }
    }
    let model = if snapshot.model_name.is_empty() {
        "unknown"
    } else {
        snapshot.model_name.as_str()
    };
    builder.push_record(["Model", model]);
    builder.push_record([
        "Intensity".to_string(),
        format!("1-{}", snapshot.total_levels()),
    ]);

    let mut table = builder.build();
    style::apply_table_style(&mut table);

    format!("Device Information\n{}\n", table)
}

#[cfg(test)]
mod tests {
    use aroma_core::{ModelInfo, SessionPhase};

    use super::*;

    #[test]
    fn test_scan_text_uses_placeholder() {
        let devices = vec![
            Peripheral::new("AA:BB", Some("Living Room".into()), Some(-48)),
            Peripheral::new("CC:DD", None, None),
        ];
        let text = format_scan_text(&devices, false);
        assert!(text.starts_with("Found 2 devices"));
        assert!(text.contains("Name"));
        assert!(text.contains("Identifier"));

        let living = text.lines().find(|l| l.contains("Living Room")).unwrap();
        assert!(living.contains("-48 dBm"));
        assert!(living.contains("AA:BB"));
        let unnamed = text.lines().find(|l| l.contains("CC:DD")).unwrap();
        assert!(unnamed.contains("Unknown Device"));
        assert!(unnamed.contains("N/A"));
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[], false), "No devices found.\n");
    }

    #[test]
    fn test_scan_text_quiet() {
        let devices = vec![
            Peripheral::new("AA:BB", Some("Den".into()), None),
            Peripheral::new("CC:DD", None, None),
        ];
        assert_eq!(format_scan_text(&devices, true), "AA:BB\nCC:DD\n");
        assert_eq!(format_scan_text(&[], true), "");
    }

    #[test]
    fn test_info_text() {
        let snapshot = SessionSnapshot {
            phase: SessionPhase::Ready,
            device: Some(Peripheral::new("AA:BB", Some("Den".into()), None)),
            model_name: "EA313".into(),
            model: ModelInfo::lookup("EA313").copied(),
            ..SessionSnapshot::default()
        };
        let text = format_info_text(&snapshot);
        assert!(text.starts_with("Device Information"));
        let model = text.lines().find(|l| l.contains("Model")).unwrap();
        assert!(model.contains("EA313"));
        let intensity = text.lines().find(|l| l.contains("Intensity")).unwrap();
        assert!(intensity.contains("1-9"));
        assert!(!text.contains("Signal"));

        let text = format_info_text(&SessionSnapshot::default());
        assert!(text.contains("unknown"));
        assert!(text.contains("1-20"));
    }
}
