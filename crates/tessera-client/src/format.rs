//! Human-readable formatting for cell values.

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Formats a byte count with binary-prefix units.
///
/// The value is scaled to the largest unit where it is at least 1. Bytes and
/// scaled values of 10 or more are shown without decimals, everything else
/// with one decimal (dropped when it is zero).
///
/// ```rust
/// use tessera_client::format::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(10240), "10 KB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }
    // 1023.96 KB would print as "1024 KB"
    if unit > 0 && unit < UNITS.len() - 1 && scaled.round() >= 1024.0 {
        scaled /= 1024.0;
        unit += 1;
    }

    if unit == 0 || scaled >= 10.0 {
        return format!("{scaled:.0} {}", UNITS[unit]);
    }

    let text = format!("{scaled:.1}");
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{text} {}", UNITS[unit])
}
