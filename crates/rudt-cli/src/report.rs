//! Text rendering for option maps and socket read-backs

use rudt_transport::{ChannelOption, NativeOption, OptionValue};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Format bytes in human-readable form
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}

/// One `NAME = value` line per option, sizes annotated with their
/// human-readable form. Names are padded to a common column.
#[must_use]
pub fn render_options(options: &BTreeMap<ChannelOption, OptionValue>) -> String {
    let width = options.keys().map(|k| k.name().len()).max().unwrap_or(0);
    let mut out = String::new();

    for (key, value) in options {
        let _ = match value {
            OptionValue::Size(bytes) if *bytes >= 1024 => writeln!(
                out,
                "{:width$} = {} ({})",
                key.name(),
                value,
                format_bytes(*bytes)
            ),
            _ => writeln!(out, "{:width$} = {}", key.name(), value),
        };
    }
    out
}

/// Render read-backs from a socket; failed reads show the OS error
#[must_use]
pub fn render_native(readings: &[(NativeOption, std::io::Result<usize>)]) -> String {
    let mut out = String::new();
    for (option, reading) in readings {
        let _ = match reading {
            Ok(bytes) => writeln!(out, "{option}: {} ({})", bytes, format_bytes(*bytes)),
            Err(e) => writeln!(out, "{option}: unavailable ({e})"),
        };
    }
    out
}
