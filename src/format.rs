//! Human-readable units for byte counts and durations.
//!
//! Both functions are pure and total; the aggregator calls them for every
//! formatted field in a report, and the presentation layer never formats
//! anything itself.

const BYTE_UNITS: [&str; 5] = ["bytes", "kB", "MB", "GB", "TB"];

/// Scales a byte count down the 1024 ladder, stopping at the largest unit
/// where the value is still >= 1. TB is never divided further, so very
/// large counts render as e.g. "2048.00 TB".
pub fn format_bytes(size: u64) -> String {
    if size < 1024 {
        return format!("{size} bytes");
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.2} {}", BYTE_UNITS[unit])
}

/// Renders a millisecond duration as ms, seconds, or minutes.
///
/// Boundaries are inclusive on the larger unit: 1000 ms is "1.000 s" and
/// 60000 ms is "1.000 m".
pub fn format_duration(ms: f64) -> String {
    if ms >= 60_000.0 {
        format!("{:.3} m", ms / 1000.0 / 60.0)
    } else if ms >= 1000.0 {
        format!("{:.3} s", ms / 1000.0)
    } else {
        format!("{ms:.3} ms")
    }
}
