//! Report output
//!
//! This module renders the ordered batch results into a report artifact
//! and publishes it to the client as a data URI.

mod renderer;
mod report;

pub use renderer::{Alignment, Column, ReportRenderer, TextTableRenderer};
pub use report::{LayoutConfig, ReportBuilder};

use std::time::Duration;

const IEC_UNITS: &[u8] = b"KMGTPE";

/// Format a byte count with binary prefixes, e.g. `1.50MB`
///
/// Negative values are sentinels and render as `N/A`.
pub fn format_bytes_iec(bytes: i64) -> String {
    if bytes < 0 {
        return "N/A".to_string();
    }
    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut exponent = 0;
    while value >= 1024.0 && exponent < IEC_UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }

    format!("{:.2}{}B", value, IEC_UNITS[exponent] as char)
}

/// Format a batch duration as `{m}m {s}s`, or `{h}h {m}m {s}s` past an hour
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_iec() {
        assert_eq!(format_bytes_iec(0), "0B");
        assert_eq!(format_bytes_iec(1023), "1023B");
        assert_eq!(format_bytes_iec(1024), "1.00KB");
        assert_eq!(format_bytes_iec(1536 * 1024), "1.50MB");
        assert_eq!(format_bytes_iec(5 * 1024 * 1024 * 1024), "5.00GB");
        assert_eq!(format_bytes_iec(-1), "N/A");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0m 0s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_elapsed(Duration::from_millis(59_900)), "0m 59s");
        assert_eq!(format_elapsed(Duration::from_secs(3600 + 120 + 5)), "1h 2m 5s");
    }
}
