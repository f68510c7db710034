//! Console formatting for probe output. Everything here is pure; the
//! `print_*` helpers only write the formatted text to stdout.

use crate::filter::{one_line, truncate};
use ha_wire::{EntityState, LogEntry};

const BANNER_WIDTH: usize = 60;

pub fn banner(title: &str) -> String {
    let rule = heavy_rule();
    format!("{rule}\n{title}\n{rule}")
}

pub fn heavy_rule() -> String {
    "=".repeat(BANNER_WIDTH)
}

pub fn rule() -> String {
    "-".repeat(BANNER_WIDTH)
}

pub fn step(number: usize, text: &str) -> String {
    format!("[{number}] {text}")
}

/// `- [LEVEL] name: message`, with the message flattened to one line and
/// cut to `max_len` characters. A known timestamp follows the name as `@ ts`.
pub fn format_log_entry(entry: &LogEntry, max_len: usize) -> String {
    let message = truncate(&one_line(&entry.message), max_len);
    if entry.timestamp.is_empty() {
        format!("- [{}] {}: {message}", entry.level, entry.name)
    } else {
        format!(
            "- [{}] {} @ {}: {message}",
            entry.level, entry.name, entry.timestamp
        )
    }
}

pub fn format_state(state: &EntityState) -> String {
    format!("- {} = {}", state.entity_id, state.state)
}

pub fn ok(text: &str) -> String {
    format!("  OK    {text}")
}

pub fn fail(text: &str) -> String {
    format!("  FAIL  {text}")
}

pub fn warn(text: &str) -> String {
    format!("  WARN  {text}")
}

/// Indented continuation line under a check result.
pub fn detail(text: &str) -> String {
    format!("        {text}")
}

pub fn print_banner(title: &str) {
    println!("{}", banner(title));
}

pub fn print_step(number: usize, text: &str) {
    println!("{}", step(number, text));
}

pub fn print_log_entries(entries: &[LogEntry], max_len: usize) {
    for entry in entries {
        println!("{}", format_log_entry(entry, max_len));
    }
}

pub fn print_states(states: &[EntityState]) {
    for state in states {
        println!("{}", format_state(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_wire::LogLevel;

    #[test]
    fn log_entry_line() {
        let entry = LogEntry::new(
            LogLevel::Error,
            "homeassistant.components.mqtt",
            "Disconnected\nfrom broker",
        );
        assert_eq!(
            format_log_entry(&entry, 240),
            "- [ERROR] homeassistant.components.mqtt: Disconnected from broker"
        );
        assert_eq!(
            format_log_entry(&entry, 5),
            "- [ERROR] homeassistant.components.mqtt: Disco..."
        );

        let stamped = entry.with_timestamp("1735689600.5");
        assert_eq!(
            format_log_entry(&stamped, 240),
            "- [ERROR] homeassistant.components.mqtt @ 1735689600.5: Disconnected from broker"
        );
    }

    #[test]
    fn state_line_and_banner() {
        let state = EntityState::new("sensor.esp32p4_wifi", "-61");
        assert_eq!(format_state(&state), "- sensor.esp32p4_wifi = -61");
        let banner = banner("Logs");
        let lines: Vec<_> = banner.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Logs");
        assert_eq!(lines[0].len(), 60);
        assert_eq!(step(2, "States"), "[2] States");
    }
}
