//! Spinners and table styling for CLI output.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .expect("valid template")
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for scanning operations.
pub fn scanning_spinner(timeout: Duration) -> ProgressBar {
    spinner(format!(
        "Scanning for diffusers... ({})",
        humantime::format_duration(timeout)
    ))
}

/// Create a spinner for finding and connecting to a device.
pub fn connecting_spinner(device: &str) -> ProgressBar {
    spinner(format!("Looking for {}...", device))
}

/// Apply the standard table style.
pub fn apply_table_style(table: &mut tabled::Table) {
    use tabled::settings::Style;
    table.with(Style::rounded());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_messages() {
        let sp = scanning_spinner(Duration::from_secs(10));
        assert!(sp.message().contains("10s"));
        sp.finish_and_clear();

        let sp = connecting_spinner("AA:BB");
        assert!(sp.message().contains("AA:BB"));
        sp.finish_and_clear();
    }

    #[test]
    fn test_table_style_is_rounded() {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["Name", "Den"]);
        let mut table = builder.build();
        apply_table_style(&mut table);
        assert!(table.to_string().starts_with('╭'));
    }
}
